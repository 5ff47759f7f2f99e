//! Styled terminal progress for `campflow run`.

use std::time::{Duration, Instant};

use console::{Term, style};
use dashmap::DashMap;

use campflow_core::workflow::progress::{LogLevel, ProgressReporter, StepSummary};

/// Prints step and call lifecycle events to stderr.
///
/// Stdout is left for the final summary so `--json` output stays parseable.
pub struct ConsoleReporter {
    term: Term,
    /// Show external-call lines too.
    detailed: bool,
    calls: DashMap<String, Instant>,
}

impl ConsoleReporter {
    pub fn new(detailed: bool) -> Self {
        Self {
            term: Term::stderr(),
            detailed,
            calls: DashMap::new(),
        }
    }

    fn line(&self, text: String) {
        let _ = self.term.write_line(&text);
    }
}

pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms >= 1_000 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        format!("{ms}ms")
    }
}

impl ProgressReporter for ConsoleReporter {
    fn step_start(&self, step: &str) {
        self.line(format!("  {} {}", style("▸").cyan(), style(step).bold()));
    }

    fn step_end(&self, step: &str, summary: &StepSummary) {
        let took = style(format_duration(summary.duration)).dim();
        if summary.success {
            let message = summary.message.as_deref().unwrap_or("");
            self.line(format!(
                "  {} {step} {took} {}",
                style("✓").green(),
                style(message).dim()
            ));
        } else {
            self.line(format!(
                "  {} {step} {took} {}",
                style("✗").red(),
                style(summary.error.as_deref().unwrap_or("failed")).red()
            ));
        }
    }

    fn call_start(&self, label: &str, preview: &str) {
        self.calls.insert(label.to_string(), Instant::now());
        if self.detailed {
            self.line(format!("    {} {label}: {}", style("→").dim(), style(preview).dim()));
        }
    }

    fn call_end(&self, label: &str, duration: Duration, preview: &str) {
        self.calls.remove(label);
        if self.detailed {
            self.line(format!(
                "    {} {label} ({}) {}",
                style("←").dim(),
                format_duration(duration),
                style(preview).dim()
            ));
        }
    }

    fn log(&self, message: &str, level: LogLevel) {
        match level {
            LogLevel::Debug if !self.detailed => {}
            LogLevel::Debug | LogLevel::Info => self.line(format!("    {}", style(message).dim())),
            LogLevel::Warn => self.line(format!("    {} {message}", style("!").yellow())),
            LogLevel::Error => self.line(format!("    {} {}", style("!").red(), style(message).red())),
        }
    }
}

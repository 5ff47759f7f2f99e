//! Progress and observability reporting.
//!
//! Reporting is infallible by signature: a reporter can never fail a step.

use std::future::Future;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Severity for free-form progress messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// What a finished step reports.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSummary {
    pub success: bool,
    pub cycle_num: u64,
    pub duration: Duration,
    /// Latest message the step appended, if any.
    pub message: Option<String>,
    pub error: Option<String>,
}

/// Receives step and call lifecycle events.
pub trait ProgressReporter: Send + Sync {
    fn step_start(&self, step: &str);

    fn step_end(&self, step: &str, summary: &StepSummary);

    fn call_start(&self, label: &str, preview: &str);

    fn call_end(&self, label: &str, duration: Duration, preview: &str);

    fn log(&self, message: &str, level: LogLevel);
}

/// Bracket `call` with `call_start`/`call_end` events.
pub async fn timed_call<T, E, F>(
    reporter: &dyn ProgressReporter,
    label: &str,
    preview: &str,
    call: F,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    reporter.call_start(label, preview);
    let started = Instant::now();
    let result = call.await;
    let outcome = match &result {
        Ok(_) => "ok".to_string(),
        Err(e) => format!("error: {e}"),
    };
    reporter.call_end(label, started.elapsed(), &outcome);
    result
}

// ---------------------------------------------------------------------------
// TracingReporter
// ---------------------------------------------------------------------------

/// Emits structured `tracing` events and measures step wall time.
#[derive(Default)]
pub struct TracingReporter {
    started: DashMap<String, Instant>,
}

impl TracingReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressReporter for TracingReporter {
    fn step_start(&self, step: &str) {
        self.started.insert(step.to_string(), Instant::now());
        tracing::info!(step, "step started");
    }

    fn step_end(&self, step: &str, summary: &StepSummary) {
        let wall_ms = self
            .started
            .remove(step)
            .map(|(_, started)| started.elapsed().as_millis() as u64)
            .unwrap_or(summary.duration.as_millis() as u64);
        if summary.success {
            tracing::info!(
                step,
                cycle = summary.cycle_num,
                duration_ms = wall_ms,
                message = summary.message.as_deref().unwrap_or(""),
                "step completed"
            );
        } else {
            tracing::error!(
                step,
                cycle = summary.cycle_num,
                duration_ms = wall_ms,
                error = summary.error.as_deref().unwrap_or(""),
                "step failed"
            );
        }
    }

    fn call_start(&self, label: &str, preview: &str) {
        tracing::debug!(call = label, preview, "external call started");
    }

    fn call_end(&self, label: &str, duration: Duration, preview: &str) {
        tracing::debug!(
            call = label,
            duration_ms = duration.as_millis() as u64,
            preview,
            "external call finished"
        );
    }

    fn log(&self, message: &str, level: LogLevel) {
        match level {
            LogLevel::Debug => tracing::debug!("{message}"),
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warn => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        }
    }
}

// ---------------------------------------------------------------------------
// NoopReporter
// ---------------------------------------------------------------------------

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn step_start(&self, _step: &str) {}

    fn step_end(&self, _step: &str, _summary: &StepSummary) {}

    fn call_start(&self, _label: &str, _preview: &str) {}

    fn call_end(&self, _label: &str, _duration: Duration, _preview: &str) {}

    fn log(&self, _message: &str, _level: LogLevel) {}
}

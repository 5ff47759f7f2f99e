//! CLI command definitions for the `campflow` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod progress;
pub mod project;
pub mod run;
pub mod session;

use clap::{Parser, Subcommand};

/// Refine ad campaigns across resumable sessions.
#[derive(Parser)]
#[command(name = "campflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export trace spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true, env = "CAMPFLOW_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new project.
    Create {
        /// Unique project name.
        name: String,

        /// What the campaign promotes.
        #[arg(long, short = 'd')]
        product: Option<String>,

        /// Total campaign budget.
        #[arg(long, short = 'b')]
        budget: Option<f64>,

        /// Owning user identifier.
        #[arg(long)]
        user: Option<String>,
    },

    /// Run one session against a project, uploading the given files.
    Run {
        /// Project name or UUID. Unknown names create the project.
        project: String,

        /// Comma-separated artifact paths (CSV or JSON).
        #[arg(long, short = 'f', value_delimiter = ',')]
        files: Vec<std::path::PathBuf>,

        /// Discard an interrupted flow and start from the entry step.
        #[arg(long)]
        restart: bool,
    },

    /// Show a project's phase, checkpoint and recent sessions.
    Status {
        /// Project name or UUID.
        project: String,

        /// Number of recent sessions to list.
        #[arg(long, default_value = "5")]
        sessions: u32,
    },

    /// List the step cycles recorded for a session.
    Cycles {
        /// Session UUID.
        session: uuid::Uuid,
    },
}

/// Tracing directives for the CLI verbosity flags.
pub fn log_filter(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "warn",
        1 => "info,campflow=debug",
        _ => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_parses_comma_separated_files() {
        let cli = Cli::try_parse_from([
            "campflow", "run", "trail-shoes", "--files", "q1.csv,ab.json", "--restart",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                project,
                files,
                restart,
            } => {
                assert_eq!(project, "trail-shoes");
                assert_eq!(files.len(), 2);
                assert_eq!(files[1], std::path::PathBuf::from("ab.json"));
                assert!(restart);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["campflow", "status", "p", "--json", "-vv"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_log_filter_levels() {
        assert_eq!(log_filter(0, true), "error");
        assert_eq!(log_filter(0, false), "warn");
        assert_eq!(log_filter(1, false), "info,campflow=debug");
        assert_eq!(log_filter(3, false), "trace");
    }
}

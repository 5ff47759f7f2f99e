//! Campflow CLI entry point.
//!
//! Binary name: `campflow`
//!
//! Parses CLI arguments, initializes tracing, the database and adapters, then
//! dispatches to the appropriate command handler.

mod cli;
mod state;

use clap::Parser;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    campflow_observe::tracing_setup::init_tracing(cli::log_filter(cli.verbose, cli.quiet), cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let state = AppState::init().await?;

    let outcome = dispatch(&cli, &state).await;

    campflow_observe::tracing_setup::shutdown_tracing();
    outcome
}

async fn dispatch(cli: &Cli, state: &AppState) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Create {
            name,
            product,
            budget,
            user,
        } => {
            cli::project::create_project(
                state,
                name.clone(),
                product.clone(),
                *budget,
                user.clone(),
                cli.json,
            )
            .await
        }

        Commands::Run {
            project,
            files,
            restart,
        } => {
            let output = cli::run::RunOutput {
                json: cli.json,
                quiet: cli.quiet,
                detailed: cli.verbose > 0,
            };
            cli::run::run_session(state, project, files, *restart, output).await
        }

        Commands::Status { project, sessions } => {
            cli::project::project_status(state, project, *sessions, cli.json).await
        }

        Commands::Cycles { session } => cli::session::list_cycles(state, session, cli.json).await,
    }
}

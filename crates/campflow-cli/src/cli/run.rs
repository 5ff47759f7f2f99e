//! `campflow run`: upload artifacts and drive one session through the flow.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use console::style;

use campflow_core::workflow::progress::{ProgressReporter, TracingReporter};
use campflow_core::workflow::session::{SessionStart, finish_session, prepare_session};
use campflow_types::workflow::{UploadedArtifact, WorkflowState};

use super::progress::ConsoleReporter;
use super::project::resolve_project;
use crate::state::AppState;

/// Output switches for a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOutput {
    pub json: bool,
    pub quiet: bool,
    pub detailed: bool,
}

fn start_label(start: SessionStart) -> &'static str {
    match start {
        SessionStart::Fresh => "fresh",
        SessionStart::Resume => "resume",
        SessionStart::NextFlow => "next_flow",
        SessionStart::ForcedRestart => "forced_restart",
    }
}

/// Read each file and store it in blob storage under the project.
async fn upload_files(
    state: &AppState,
    project_id: &str,
    files: &[PathBuf],
) -> Result<Vec<UploadedArtifact>> {
    let mut uploads = Vec::with_capacity(files.len());
    for path in files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let original_filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("artifact")
            .to_string();
        let storage_path = state
            .blobs
            .upload(project_id, &original_filename, &bytes)
            .await
            .with_context(|| format!("failed to upload {}", path.display()))?;
        tracing::debug!(%storage_path, file = original_filename.as_str(), "artifact uploaded");
        uploads.push(UploadedArtifact {
            storage_path,
            original_filename,
        });
    }
    Ok(uploads)
}

/// Run one session against `project_key`.
pub async fn run_session(
    state: &AppState,
    project_key: &str,
    files: &[PathBuf],
    restart: bool,
    output: RunOutput,
) -> Result<()> {
    let (project, created) = resolve_project(state.projects.as_ref(), project_key, true).await?;
    let uploads = upload_files(state, &project.id.to_string(), files).await?;

    let reporter: Arc<dyn ProgressReporter> = if output.json || output.quiet {
        Arc::new(TracingReporter::new())
    } else {
        Arc::new(ConsoleReporter::new(output.detailed))
    };
    let scheduler = state.scheduler(reporter)?;

    let mut flow = WorkflowState::new(project.id, uploads);
    flow.flow.force_restart = restart;

    let start = prepare_session(state.projects.as_ref(), state.sessions.as_ref(), &mut flow).await?;

    if !output.json && !output.quiet {
        println!();
        println!(
            "  {} {} {}",
            style("⚡").bold(),
            style(&project.name).cyan().bold(),
            style(format!("session #{} ({})", flow.session_num, start_label(start))).dim()
        );
        if created {
            println!("  {}", style("project created").dim());
        }
        println!();
    }

    let result = scheduler.run(&mut flow).await;

    if let Err(e) = finish_session(state.sessions.as_ref(), &flow).await {
        tracing::warn!(error = %e, "failed to close session row");
    }

    if output.json {
        let summary = serde_json::json!({
            "project_id": flow.project_id,
            "session_id": flow.session_id,
            "session_num": flow.session_num,
            "start": start_label(start),
            "executed": result.as_ref().map(|s| s.executed.clone()).unwrap_or_default(),
            "resumed_at": result.as_ref().ok().and_then(|s| s.resumed_at.clone()),
            "flow_status": flow.flow.flow_status,
            "phase": flow.current_phase,
            "iteration": flow.iteration,
            "decision": flow.decision,
            "messages": flow.messages,
            "errors": flow.errors,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if !output.quiet {
        print_summary(&flow);
    }

    result.context("session failed; rerun to resume from the last completed step")?;
    Ok(())
}

fn print_summary(flow: &WorkflowState) {
    println!();
    println!("  {}", style("── Messages ──").dim());
    for message in &flow.messages {
        println!("  {message}");
    }
    println!();
    println!("  {}", style("── Result ──").dim());
    println!("  Flow:      {}", style(flow.flow.flow_status).bold());
    println!("  Phase:     {}", flow.current_phase);
    println!("  Iteration: {}", flow.iteration);
    if let Some(decision) = &flow.decision {
        println!("  Decision:  {}", decision.decision);
    }
    if let Some(session_id) = flow.session_id {
        println!(
            "  Cycles:    {}",
            style(format!("campflow cycles {session_id}")).yellow()
        );
    }
    println!();
}

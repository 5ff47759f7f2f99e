//! `campflow cycles`: the per-step execution log of one session.

use std::time::Duration;

use anyhow::{Result, bail};
use console::style;
use uuid::Uuid;

use campflow_core::repository::session::SessionRepository;

use super::progress::format_duration;
use crate::state::AppState;

/// List the step cycles recorded for a session, in execution order.
pub async fn list_cycles(state: &AppState, session_id: &Uuid, json: bool) -> Result<()> {
    let Some(session) = state.sessions.get_session(session_id).await? else {
        bail!("no session with id {session_id}");
    };
    let cycles = state.sessions.list_cycles(session_id).await?;

    if json {
        let output = serde_json::json!({
            "session": session,
            "cycles": cycles,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Session #{} {}",
        style("⚡").bold(),
        session.session_num,
        style(format!("({})", session.status)).dim()
    );
    println!();

    if cycles.is_empty() {
        println!("  {}", style("No steps recorded.").dim());
        println!();
        return Ok(());
    }

    let total: u64 = cycles.iter().map(|c| c.execution_time_ms).sum();
    for cycle in &cycles {
        let mark = if cycle.success {
            style("✓").green()
        } else {
            style("✗").red()
        };
        println!(
            "  {:>3} {mark} {:<16} {:>8}  {}",
            cycle.cycle_num,
            cycle.step_name,
            format_duration(Duration::from_millis(cycle.execution_time_ms)),
            style(cycle.error.as_deref().unwrap_or("")).red()
        );
    }
    println!();
    println!(
        "  {} steps, {}",
        cycles.len(),
        format_duration(Duration::from_millis(total))
    );
    println!();
    Ok(())
}

//! Project commands: create, status, and name-or-UUID lookup.

use anyhow::{Result, bail};
use console::style;
use uuid::Uuid;

use campflow_core::repository::project::ProjectRepository;
use campflow_core::repository::session::SessionRepository;
use campflow_types::error::RepositoryError;
use campflow_types::project::{NewProject, ProjectRecord};

use crate::state::AppState;

/// Find a project by UUID or name.
///
/// When `create_on_miss` is set, an unknown *name* creates the project.
/// An unknown UUID is always an error.
pub async fn resolve_project<P: ProjectRepository>(
    projects: &P,
    key: &str,
    create_on_miss: bool,
) -> Result<(ProjectRecord, bool)> {
    if let Ok(id) = key.parse::<Uuid>() {
        return match projects.load(&id).await? {
            Some(project) => Ok((project, false)),
            None => bail!("no project with id {id}"),
        };
    }

    if let Some(project) = projects.find_by_name(key).await? {
        return Ok((project, false));
    }
    if !create_on_miss {
        bail!("no project named '{key}'");
    }

    let project = projects
        .create(&NewProject {
            name: key.to_string(),
            ..Default::default()
        })
        .await?;
    tracing::info!(project_id = %project.id, name = key, "project created on first run");
    Ok((project, true))
}

/// Create a new project.
pub async fn create_project(
    state: &AppState,
    name: String,
    product: Option<String>,
    budget: Option<f64>,
    user: Option<String>,
    json: bool,
) -> Result<()> {
    let request = NewProject {
        name,
        user_id: user,
        product_description: product,
        target_budget: budget,
    };
    let project = match state.projects.create(&request).await {
        Ok(project) => project,
        Err(RepositoryError::Conflict(_)) => bail!("a project named '{}' already exists", request.name),
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&project)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Created project {}",
        style("✓").green().bold(),
        style(&project.name).cyan().bold()
    );
    println!("  {}", style(project.id).dim());
    println!();
    println!(
        "  Next: {}",
        style(format!("campflow run {} --files history.csv", project.name)).yellow()
    );
    println!();
    Ok(())
}

/// Show a project's phase, checkpoint and recent sessions.
pub async fn project_status(state: &AppState, key: &str, limit: u32, json: bool) -> Result<()> {
    let (project, _) = resolve_project(state.projects.as_ref(), key, false).await?;
    let sessions = state.sessions.list_sessions(&project.id, limit).await?;

    if json {
        let status = serde_json::json!({
            "project": project,
            "sessions": sessions,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let checkpoint = &project.checkpoint;
    println!();
    println!(
        "  {} {}",
        style("⚡").bold(),
        style(&project.name).cyan().bold()
    );
    println!();
    println!("  {}", style("── Project ──").dim());
    println!("  Phase:      {}", style(project.phase).bold());
    println!("  Iteration:  {}", project.iteration);
    println!("  Sessions:   {}", project.session_count);
    if let Some(product) = &project.product_description {
        println!("  Product:    {product}");
    }
    if let Some(budget) = project.target_budget {
        println!("  Budget:     {budget:.2}");
    }
    println!();

    println!("  {}", style("── Checkpoint ──").dim());
    println!("  Flow:       {}", style(checkpoint.flow_status).bold());
    println!(
        "  Last step:  {}",
        checkpoint.last_completed_step.as_deref().unwrap_or("-")
    );
    println!("  Completed:  {}", checkpoint.completed_steps.join(" → "));
    if let Some(step) = &checkpoint.current_executing_step {
        println!("  Running:    {}", style(step).yellow());
    }
    println!();

    if !project.errors.is_empty() {
        println!("  {}", style("── Errors ──").dim());
        for error in project.errors.iter().rev().take(5) {
            println!("  {} {error}", style("✗").red());
        }
        println!();
    }

    println!("  {}", style("── Recent sessions ──").dim());
    if sessions.is_empty() {
        println!("  {}", style("none yet").dim());
    }
    for session in &sessions {
        let decision = session.decision.map(|d| d.to_string()).unwrap_or_else(|| "-".into());
        println!(
            "  #{:<3} {:<10} {:<11} {}  {}",
            session.session_num,
            session.status.to_string(),
            decision,
            style(session.started_at.format("%Y-%m-%d %H:%M")).dim(),
            style(session.id).dim()
        );
    }
    println!();
    Ok(())
}

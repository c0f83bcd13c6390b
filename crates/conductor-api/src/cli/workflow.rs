//! CLI workflow management subcommands.
//!
//! Provides template browsing, workflow creation (from templates or
//! definition files), execution with live progress, status inspection,
//! checkpoints, and engine statistics.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use tokio::sync::broadcast::error::RecvError;

use conductor_types::event::WorkflowEvent;
use conductor_types::workflow::{RunState, ValueMap, WorkflowId, WorkflowRunStatus, WorkflowStatus};

use crate::state::AppState;

/// Workflow management subcommands.
#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// List available workflow templates.
    Templates {
        /// Only show templates in this category.
        #[arg(long)]
        category: Option<String>,
    },

    /// List template categories.
    Categories,

    /// Create a workflow from a template.
    Create {
        /// Template key (see `cndr workflow templates`).
        template: String,

        /// JSON object with values for the template's parameters.
        #[arg(long)]
        inputs: Option<String>,
    },

    /// Create a workflow from a YAML or JSON definition file.
    #[command(name = "create-file")]
    CreateFile {
        /// Path to the definition file.
        file: PathBuf,
    },

    /// List known workflows.
    #[command(alias = "ls")]
    List,

    /// Show the parallel execution waves of a workflow.
    Plan {
        /// Workflow ID.
        id: String,
    },

    /// Execute a workflow and follow its progress (Ctrl+C cancels).
    Execute {
        /// Workflow ID.
        id: String,
    },

    /// Reload a workflow's stored state and run its unfinished steps.
    Resume {
        /// Workflow ID.
        id: String,
    },

    /// Show the status of a workflow.
    Status {
        /// Workflow ID.
        id: String,
    },

    /// Delete a workflow and everything stored for it.
    #[command(alias = "rm")]
    Delete {
        /// Workflow ID.
        id: String,
    },

    /// Store a named checkpoint (replaces one with the same name).
    Checkpoint {
        /// Workflow ID.
        id: String,

        /// Checkpoint name.
        name: String,

        /// JSON object to store as the checkpoint payload.
        #[arg(long)]
        payload: Option<String>,
    },

    /// List checkpoints of a workflow, oldest first.
    Checkpoints {
        /// Workflow ID.
        id: String,
    },

    /// Print the payload of a named checkpoint.
    Restore {
        /// Workflow ID.
        id: String,

        /// Checkpoint name.
        name: String,
    },

    /// Show aggregate workflow statistics.
    Stats,

    /// List registered node types.
    Nodes,
}

/// Handle a workflow subcommand.
pub async fn handle_workflow_command(
    cmd: WorkflowCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        WorkflowCommand::Templates { category } => {
            handle_templates(category.as_deref(), state, json)
        }
        WorkflowCommand::Categories => handle_categories(state, json),
        WorkflowCommand::Create { template, inputs } => {
            handle_create(&template, inputs.as_deref(), state, json).await
        }
        WorkflowCommand::CreateFile { file } => handle_create_file(&file, state, json).await,
        WorkflowCommand::List => handle_list(state, json),
        WorkflowCommand::Plan { id } => handle_plan(parse_id(&id)?, state, json),
        WorkflowCommand::Execute { id } => handle_run(parse_id(&id)?, false, state, json).await,
        WorkflowCommand::Resume { id } => handle_run(parse_id(&id)?, true, state, json).await,
        WorkflowCommand::Status { id } => handle_status(parse_id(&id)?, state, json).await,
        WorkflowCommand::Delete { id } => handle_delete(parse_id(&id)?, state, json).await,
        WorkflowCommand::Checkpoint { id, name, payload } => {
            handle_checkpoint(parse_id(&id)?, &name, payload.as_deref(), state, json).await
        }
        WorkflowCommand::Checkpoints { id } => {
            handle_checkpoints(parse_id(&id)?, state, json).await
        }
        WorkflowCommand::Restore { id, name } => {
            handle_restore(parse_id(&id)?, &name, state, json).await
        }
        WorkflowCommand::Stats => handle_stats(state, json),
        WorkflowCommand::Nodes => handle_nodes(state, json),
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

fn handle_templates(category: Option<&str>, state: &AppState, json: bool) -> Result<()> {
    let templates = state.workflow_service.list_templates(category);

    if json {
        println!("{}", serde_json::to_string_pretty(&templates)?);
        return Ok(());
    }

    if templates.is_empty() {
        println!();
        match category {
            Some(c) => println!("  No templates in category '{c}'."),
            None => println!("  No templates available."),
        }
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Key").fg(Color::Cyan),
            Cell::new("Name"),
            Cell::new("Category"),
            Cell::new("Steps"),
            Cell::new("Parameters"),
        ]);

    for t in &templates {
        table.add_row(vec![
            Cell::new(&t.key),
            Cell::new(&t.name),
            Cell::new(&t.category),
            Cell::new(t.step_count),
            Cell::new(t.parameters.join(", ")),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

fn handle_categories(state: &AppState, json: bool) -> Result<()> {
    let categories = state.workflow_service.get_categories();
    if json {
        println!("{}", serde_json::to_string_pretty(&categories)?);
    } else {
        println!();
        for c in &categories {
            println!("  {c}");
        }
        println!();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

async fn handle_create(
    template: &str,
    inputs: Option<&str>,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let inputs = match inputs {
        Some(raw) => parse_object(raw, "inputs")?,
        None => ValueMap::new(),
    };

    let created = state
        .workflow_service
        .create_workflow_from_template(template, &inputs)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&created)?);
    } else {
        println!();
        println!(
            "  {} Created workflow from template '{}'",
            style("*").green().bold(),
            style(template).cyan()
        );
        println!("  ID: {}", created.workflow_id);
        println!();
        println!(
            "  Run it: {}",
            style(format!("cndr workflow execute {}", created.workflow_id)).dim()
        );
        println!();
    }
    Ok(())
}

async fn handle_create_file(file: &Path, state: &AppState, json: bool) -> Result<()> {
    let id = state
        .workflow_service
        .create_workflow_from_file(file)
        .await
        .with_context(|| format!("Failed to create workflow from {}", file.display()))?;
    let status = require_status(id, state)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!();
        println!(
            "  {} Created workflow '{}'",
            style("*").green().bold(),
            style(&status.name).cyan()
        );
        println!("  ID: {id}");
        println!("  Steps: {}", status.total_steps);
        println!();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// List / plan / status
// ---------------------------------------------------------------------------

fn handle_list(state: &AppState, json: bool) -> Result<()> {
    let workflows = state.workflow_service.engine().list_workflows();

    if json {
        println!("{}", serde_json::to_string_pretty(&workflows)?);
        return Ok(());
    }

    if workflows.is_empty() {
        println!();
        println!("  No workflows yet.");
        println!(
            "  Create one with: {}",
            style("cndr workflow create <template>").dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(Color::Cyan),
            Cell::new("Name"),
            Cell::new("Status"),
            Cell::new("Progress"),
            Cell::new("Updated"),
        ]);

    for w in &workflows {
        table.add_row(vec![
            Cell::new(w.id),
            Cell::new(&w.name),
            format_status(w.status),
            Cell::new(format!(
                "{}/{} ({:.0}%)",
                w.completed_steps, w.total_steps, w.progress_percentage
            )),
            Cell::new(w.updated_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

fn handle_plan(id: WorkflowId, state: &AppState, json: bool) -> Result<()> {
    let waves = state.workflow_service.engine().execution_plan(id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&waves)?);
        return Ok(());
    }

    println!();
    for (index, wave) in waves.iter().enumerate() {
        println!("  {} {}", style("Wave").bold(), style(index + 1).cyan());
        for step in wave {
            println!(
                "    {} {} {}",
                style(&step.id).cyan(),
                step.name,
                style(format!("[{}]", step.node_type)).dim()
            );
        }
    }
    println!();
    Ok(())
}

async fn handle_status(id: WorkflowId, state: &AppState, json: bool) -> Result<()> {
    let engine = state.workflow_service.engine();
    if engine.get_workflow_status(id).is_none() {
        engine.load_workflow(id).await?;
    }
    let status = require_status(id, state)?;
    let run = engine
        .get_run_state(id)
        .with_context(|| format!("Workflow '{id}' has no run state"))?;

    if json {
        let out = serde_json::json!({ "status": status, "run": run });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    print_summary(&status, &run);
    Ok(())
}

// ---------------------------------------------------------------------------
// Execute / resume
// ---------------------------------------------------------------------------

async fn handle_run(id: WorkflowId, resume: bool, state: &AppState, json: bool) -> Result<()> {
    let engine = Arc::clone(state.workflow_service.engine());
    let mut events = engine.event_bus().subscribe();

    let runner = Arc::clone(&engine);
    let mut run = tokio::spawn(async move {
        if resume {
            runner.resume_workflow(id).await
        } else {
            runner.execute_workflow(id).await
        }
    });

    let mut cancel_sent = false;
    let mut events_open = true;
    let joined = loop {
        tokio::select! {
            joined = &mut run => break joined,
            event = events.recv(), if events_open => match event {
                Ok(event) if !json && event.workflow_id() == id => print_event(&event),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "progress output fell behind");
                }
                Err(RecvError::Closed) => events_open = false,
            },
            signal = tokio::signal::ctrl_c(), if !cancel_sent => {
                cancel_sent = true;
                match signal {
                    Ok(()) => {
                        if !json {
                            println!("  {} Cancelling...", style("!").yellow().bold());
                        }
                        engine.cancel_workflow(id)?;
                    }
                    Err(e) => tracing::warn!(error = %e, "could not listen for Ctrl+C"),
                }
            }
        }
    };

    if !json {
        while let Ok(event) = events.try_recv() {
            if event.workflow_id() == id {
                print_event(&event);
            }
        }
    }

    let completed = joined.context("workflow task panicked")??;
    let status = require_status(id, state)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else if let Some(run) = engine.get_run_state(id) {
        print_summary(&status, &run);
    }

    if !completed {
        bail!("Workflow '{id}' finished with status {}", status.status);
    }
    Ok(())
}

fn print_event(event: &WorkflowEvent) {
    match event {
        WorkflowEvent::RunStarted { pending_steps, .. } => {
            println!();
            println!(
                "  {} Running {} step(s)",
                style(">").cyan().bold(),
                pending_steps
            );
        }
        WorkflowEvent::StepStarted {
            step_id,
            node_type,
            attempt,
            ..
        } => {
            let retry = if *attempt > 1 {
                format!(" (attempt {attempt})")
            } else {
                String::new()
            };
            println!(
                "  {} {} {}{}",
                style("-").dim(),
                style(step_id).cyan(),
                style(format!("[{node_type}]")).dim(),
                retry
            );
        }
        WorkflowEvent::StepCompleted {
            step_id,
            duration_ms,
            ..
        } => {
            println!(
                "  {} {} {}",
                style("*").green().bold(),
                style(step_id).cyan(),
                style(format!("{duration_ms}ms")).dim()
            );
        }
        WorkflowEvent::StepFailed {
            step_id,
            error,
            will_retry,
            ..
        } => {
            let suffix = if *will_retry { ", retrying" } else { "" };
            println!(
                "  {} {} {}{}",
                style("x").red().bold(),
                style(step_id).cyan(),
                style(error).red(),
                suffix
            );
        }
        WorkflowEvent::StepSkipped {
            step_id, reason, ..
        } => {
            println!(
                "  {} {} {}",
                style("~").yellow(),
                style(step_id).cyan(),
                style(reason).dim()
            );
        }
        WorkflowEvent::StatePersistFailed { error, .. } => {
            println!(
                "  {} State not saved: {}",
                style("!").yellow().bold(),
                style(error).yellow()
            );
        }
        WorkflowEvent::WorkflowCreated { .. } | WorkflowEvent::RunFinished { .. } => {}
    }
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

async fn handle_delete(id: WorkflowId, state: &AppState, json: bool) -> Result<()> {
    let deleted = state.workflow_service.engine().delete_workflow(id).await?;
    if !deleted {
        bail!("Workflow '{id}' not found");
    }

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!();
        println!(
            "  {} Deleted workflow '{}'",
            style("*").green().bold(),
            style(id).cyan()
        );
        println!();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Checkpoints
// ---------------------------------------------------------------------------

async fn handle_checkpoint(
    id: WorkflowId,
    name: &str,
    payload: Option<&str>,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let payload = match payload {
        Some(raw) => parse_object(raw, "payload")?,
        None => ValueMap::new(),
    };
    let checkpoint = state
        .workflow_service
        .engine()
        .create_checkpoint(id, name, payload)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&checkpoint)?);
    } else {
        println!();
        println!(
            "  {} Saved checkpoint '{}'",
            style("*").green().bold(),
            style(&checkpoint.name).cyan()
        );
        println!();
    }
    Ok(())
}

async fn handle_checkpoints(id: WorkflowId, state: &AppState, json: bool) -> Result<()> {
    let checkpoints = state.workflow_service.engine().list_checkpoints(id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&checkpoints)?);
        return Ok(());
    }

    if checkpoints.is_empty() {
        println!();
        println!("  No checkpoints for workflow '{id}'.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("Keys"),
            Cell::new("Created"),
        ]);

    for c in &checkpoints {
        table.add_row(vec![
            Cell::new(&c.name),
            Cell::new(c.payload.len()),
            Cell::new(c.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

async fn handle_restore(id: WorkflowId, name: &str, state: &AppState, json: bool) -> Result<()> {
    let payload = state
        .workflow_service
        .engine()
        .restore_checkpoint(id, name)
        .await?
        .with_context(|| format!("Checkpoint '{name}' not found"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!();
        println!("  {} '{}'", style("Checkpoint").bold(), style(name).cyan());
        println!("{}", serde_json::to_string_pretty(&payload)?);
        println!();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Stats / nodes
// ---------------------------------------------------------------------------

fn handle_stats(state: &AppState, json: bool) -> Result<()> {
    let stats = state.workflow_service.get_workflow_statistics();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![Cell::new("Metric").fg(Color::Cyan), Cell::new("Value")]);

    for (label, value) in [
        ("Workflows", stats.total_workflows),
        ("Pending", stats.pending),
        ("Running", stats.running),
        ("Completed", stats.completed),
        ("Failed", stats.failed),
        ("Cancelled", stats.cancelled),
        ("Steps", stats.total_steps),
        ("Steps completed", stats.completed_steps),
        ("Steps failed", stats.failed_steps),
        ("Templates", stats.templates),
    ] {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }

    println!();
    println!(
        "  {} {}",
        style("Storage:").bold(),
        state.workflow_service.engine().store().backend_name()
    );
    println!("{table}");
    println!();
    Ok(())
}

fn handle_nodes(state: &AppState, json: bool) -> Result<()> {
    let nodes = state.workflow_service.engine().registry().available_nodes();
    if json {
        println!("{}", serde_json::to_string_pretty(&nodes)?);
    } else {
        println!();
        for n in &nodes {
            println!("  {n}");
        }
        println!();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_id(raw: &str) -> Result<WorkflowId> {
    raw.parse()
        .with_context(|| format!("Invalid workflow ID: '{raw}'"))
}

fn parse_object(raw: &str, what: &str) -> Result<ValueMap> {
    match serde_json::from_str::<serde_json::Value>(raw)
        .with_context(|| format!("Invalid JSON {what}"))?
    {
        serde_json::Value::Object(map) => Ok(map),
        _ => bail!("{what} must be a JSON object"),
    }
}

fn require_status(id: WorkflowId, state: &AppState) -> Result<WorkflowStatus> {
    state
        .workflow_service
        .get_workflow_status(id)
        .with_context(|| format!("Workflow '{id}' not found"))
}

fn print_summary(status: &WorkflowStatus, run: &RunState) {
    println!();
    println!(
        "  {} {} ({})",
        style("Workflow:").bold(),
        style(&status.name).cyan(),
        status.id
    );
    println!("  Status: {}", format_status_text(status.status));
    println!(
        "  Progress: {}/{} steps ({:.1}%)",
        status.completed_steps, status.total_steps, status.progress_percentage
    );
    if let Some(started) = run.started_at {
        println!("  Started: {}", started.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(completed) = run.completed_at {
        println!("  Finished: {}", completed.format("%Y-%m-%d %H:%M:%S"));
    }
    if status.unpersisted {
        println!(
            "  {}",
            style("Warning: latest state could not be saved").yellow()
        );
    }
    for (step, error) in &run.step_errors {
        println!("  {} {}: {}", style("x").red(), style(step).cyan(), style(error).red());
    }
    println!();
}

fn format_status_text(status: WorkflowRunStatus) -> console::StyledObject<&'static str> {
    let text = status.as_str();
    match status {
        WorkflowRunStatus::Pending => style(text).yellow(),
        WorkflowRunStatus::Running => style(text).blue(),
        WorkflowRunStatus::Completed => style(text).green(),
        WorkflowRunStatus::Failed => style(text).red(),
        WorkflowRunStatus::Cancelled => style(text).color256(3),
    }
}

fn format_status(status: WorkflowRunStatus) -> Cell {
    let cell = Cell::new(status.as_str());
    match status {
        WorkflowRunStatus::Pending => cell.fg(Color::Yellow),
        WorkflowRunStatus::Running => cell.fg(Color::Blue),
        WorkflowRunStatus::Completed => cell.fg(Color::Green),
        WorkflowRunStatus::Failed => cell.fg(Color::Red),
        WorkflowRunStatus::Cancelled => cell.fg(Color::DarkYellow),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_object_accepts_only_objects() {
        let map = parse_object(r#"{"project_path": "."}"#, "inputs").unwrap();
        assert_eq!(map["project_path"], ".");
        assert!(parse_object("[1, 2]", "inputs").is_err());
        assert!(parse_object("not json", "inputs").is_err());
    }

    #[test]
    fn parse_id_rejects_garbage() {
        assert!(parse_id("nope").is_err());
        let id = WorkflowId::new();
        assert_eq!(parse_id(&id.to_string()).unwrap(), id);
    }
}

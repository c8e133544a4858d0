//! `flowline run` and `flowline trigger`.

use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use flowline_core::repository::WorkflowRepository;
use flowline_core::workflow::context::TRIGGER_TYPE_KEY;
use flowline_core::workflow::definition::{discover_workflows, load_workflow_file, validate_workflow};
use flowline_core::workflow::{TriggerOutcome, WorkflowContext};
use flowline_types::execution::{ExecutionLog, ExecutionStatus, LogEntryType};
use serde_json::{Value, json};
use uuid::Uuid;

use super::{format_log_status, format_status, parse_data};
use crate::state::AppState;

const DETAIL_WIDTH: usize = 60;

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

pub async fn handle_run(
    state: &mut AppState,
    file: &Path,
    data: Option<&str>,
    event: Option<&str>,
    resume_with: Option<&str>,
    json: bool,
) -> Result<()> {
    let workflow = load_workflow_file(file)
        .with_context(|| format!("Failed to load {}", file.display()))?;
    validate_workflow(&workflow, state.engine.config())?;
    state.repo.save_workflow(&workflow).await?;

    let mut ctx = WorkflowContext::from_value(parse_data(data)?);
    match event {
        Some(name) => {
            ctx.set_meta("event", Value::String(name.to_string()));
            ctx.set_meta(TRIGGER_TYPE_KEY, json!("event"));
        }
        None => ctx.set_meta(TRIGGER_TYPE_KEY, json!("manual")),
    }

    let mut result = state.engine.execute(&workflow, ctx).await?;

    if result.status == ExecutionStatus::Waiting {
        if let Some(raw) = resume_with {
            let payload: Value = serde_json::from_str(raw)
                .map_err(|e| anyhow::anyhow!("--resume-with is not valid JSON: {e}"))?;
            tracing::info!(execution_id = %result.execution.id, "resuming suspended run");
            result = state.engine.resume(&result.execution.id, payload).await?;
        }
    }

    state.drain_queue().await;

    let execution_id = result.execution.id;
    let execution = state
        .repo
        .get_execution(&execution_id)
        .await?
        .unwrap_or_else(|| result.execution.clone());
    let logs = state.repo.list_logs(&execution_id).await?;

    if json {
        let out = json!({
            "success": result.success,
            "message": result.message,
            "duration_ms": result.duration_ms,
            "execution": execution,
            "context": result.context.to_json(),
            "logs": logs,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        let marker = if result.success {
            style("*").green().bold()
        } else {
            style("x").red().bold()
        };
        println!(
            "  {marker} Workflow '{}' {} in {}ms",
            style(&workflow.name).cyan(),
            status_word(execution.status),
            result.duration_ms
        );
        println!("  Execution: {execution_id}");
        println!("  {}", style(&result.message).dim());
        println!();
        print_logs(&logs);

        if let Some(wait) = &execution.wait {
            println!();
            println!(
                "  Waiting for event '{}'. Resume with: {}",
                style(&wait.descriptor.event).cyan(),
                style(format!(
                    "flowline run {} --resume-with '<json>'",
                    file.display()
                ))
                .dim()
            );
        }
        if state.queue.pending() > 0 {
            println!(
                "  {} delayed unit(s) were not yet due when the command exited",
                state.queue.pending()
            );
        }
        println!();
    }

    if execution.status == ExecutionStatus::Failed {
        anyhow::bail!("workflow '{}' failed: {}", workflow.name, result.message);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

pub async fn handle_trigger(
    state: &mut AppState,
    dir: &Path,
    trigger_type: &str,
    event: Option<&str>,
    data: Option<&str>,
    json: bool,
) -> Result<()> {
    let found = discover_workflows(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?;

    let mut loaded = 0;
    for (path, workflow) in &found {
        if let Err(e) = validate_workflow(workflow, state.engine.config()) {
            tracing::warn!(path = %path.display(), error = %e, "skipping invalid workflow");
            continue;
        }
        state.repo.save_workflow(workflow).await?;
        loaded += 1;
    }
    tracing::debug!(loaded, dir = %dir.display(), "workflows loaded");

    let mut ctx = WorkflowContext::from_value(parse_data(data)?);
    if let Some(name) = event {
        ctx.set_meta("event", Value::String(name.to_string()));
    }

    let outcomes = state.engine.trigger(trigger_type, ctx).await?;
    state.drain_queue().await;

    let mut rows = Vec::with_capacity(outcomes.len());
    for outcome in &outcomes {
        rows.push(outcome_row(state, outcome).await?);
    }

    if json {
        let out: Vec<Value> = rows
            .iter()
            .map(|r| {
                json!({
                    "workflow": r.workflow,
                    "execution_id": r.execution_id.map(|id| id.to_string()),
                    "status": r.status,
                    "detail": r.detail,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    if rows.is_empty() {
        println!(
            "  No workflows matched trigger '{}' ({loaded} loaded).",
            style(trigger_type).cyan()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Workflow").fg(Color::Cyan),
            Cell::new("Execution"),
            Cell::new("Status"),
            Cell::new("Detail"),
        ]);
    for row in &rows {
        let status_cell = match row.status {
            Some(status) => format_status(status),
            None if row.queued => Cell::new("queued").fg(Color::Blue),
            None => Cell::new("error").fg(Color::Red),
        };
        table.add_row(vec![
            Cell::new(&row.workflow),
            Cell::new(
                row.execution_id
                    .map(|id| short_id(&id))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            status_cell,
            Cell::new(truncate(&row.detail, DETAIL_WIDTH)),
        ]);
    }
    println!("{table}");
    println!();
    Ok(())
}

struct OutcomeRow {
    workflow: String,
    execution_id: Option<Uuid>,
    status: Option<ExecutionStatus>,
    queued: bool,
    detail: String,
}

async fn outcome_row(state: &AppState, outcome: &TriggerOutcome) -> Result<OutcomeRow> {
    let name_of = |id: Uuid| async move {
        state
            .repo
            .get_workflow(&id)
            .await
            .ok()
            .flatten()
            .map(|w| w.name)
            .unwrap_or_else(|| id.to_string())
    };

    Ok(match outcome {
        TriggerOutcome::Executed(result) => {
            // Fork branches may have finished after the result was built.
            let status = state
                .repo
                .get_execution(&result.execution.id)
                .await?
                .map(|e| e.status)
                .unwrap_or(result.status);
            OutcomeRow {
                workflow: result.execution.workflow_name.clone(),
                execution_id: Some(result.execution.id),
                status: Some(status),
                queued: false,
                detail: result.message.clone(),
            }
        }
        TriggerOutcome::Queued { workflow_id, unit_id } => {
            let latest = state.repo.executions_for(workflow_id).pop();
            OutcomeRow {
                workflow: name_of(*workflow_id).await,
                execution_id: latest.as_ref().map(|e| e.id),
                status: latest.as_ref().map(|e| e.status),
                queued: true,
                detail: format!("unit {}", short_id(unit_id)),
            }
        }
        TriggerOutcome::Failed { workflow_id, error } => OutcomeRow {
            workflow: name_of(*workflow_id).await,
            execution_id: None,
            status: None,
            queued: false,
            detail: error.clone(),
        },
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn print_logs(logs: &[ExecutionLog]) {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").fg(Color::Cyan),
            Cell::new("Entry"),
            Cell::new("Node"),
            Cell::new("Type"),
            Cell::new("Status"),
            Cell::new("ms"),
            Cell::new("Detail"),
        ]);

    for (i, log) in logs.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(entry_word(log.entry_type)),
            Cell::new(log.node_id.as_deref().unwrap_or("-")),
            Cell::new(log.action_type.as_deref().unwrap_or("-")),
            format_log_status(log.status),
            Cell::new(log.duration_ms),
            Cell::new(truncate(&log_detail(log), DETAIL_WIDTH)),
        ]);
    }
    println!("{table}");
}

fn log_detail(log: &ExecutionLog) -> String {
    if let Some(error) = &log.error {
        return error.clone();
    }
    match &log.output {
        Some(Value::Null) | None => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn entry_word(entry: LogEntryType) -> &'static str {
    match entry {
        LogEntryType::Trigger => "trigger",
        LogEntryType::Condition => "condition",
        LogEntryType::Action => "action",
    }
}

fn status_word(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Pending => "is pending",
        ExecutionStatus::Running => "is running",
        ExecutionStatus::Waiting => "suspended",
        ExecutionStatus::Completed => "completed",
        ExecutionStatus::Failed => "failed",
        ExecutionStatus::Skipped => "was skipped",
    }
}

fn short_id(id: &Uuid) -> String {
    id.to_string().chars().take(8).collect()
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_types::config::EngineConfig;
    use tempfile::TempDir;

    const GREETING: &str = r#"
name: greeting
actions:
  - type: set_variable
    config:
      name: greeting
      value: "Hello {{ user.name }}"
  - type: log
    config:
      message: "{{ greeting }}"
"#;

    fn write(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn run_executes_file_and_records_logs() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "greeting.yaml", GREETING);
        let mut state = AppState::init(EngineConfig::default());

        handle_run(&mut state, &path, Some(r#"{"user":{"name":"Ann"}}"#), None, None, true)
            .await
            .unwrap();

        let workflows = state.repo.list_workflows().await.unwrap();
        let runs = state.repo.executions_for(&workflows[0].id);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, ExecutionStatus::Completed);
        let logs = state.repo.list_logs(&runs[0].id).await.unwrap();
        let last = logs.last().unwrap();
        assert_eq!(last.action_type.as_deref(), Some("log"));
        assert_eq!(last.output.as_ref().unwrap()["logged"], "Hello Ann");
    }

    #[tokio::test]
    async fn failed_run_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            &tmp,
            "broken.yaml",
            "name: broken\nactions:\n  - type: log\n    config: {}\n",
        );
        let mut state = AppState::init(EngineConfig::default());

        let err = handle_run(&mut state, &path, None, None, None, true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[tokio::test]
    async fn suspended_run_resumes_with_payload() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            &tmp,
            "approval.yaml",
            r#"
name: approval
actions:
  - type: wait_for_event
    config:
      event: approved
  - type: log
    config:
      message: "approved by {{ event.by }}"
"#,
        );
        let mut state = AppState::init(EngineConfig::default());

        handle_run(&mut state, &path, None, None, Some(r#"{"by":"ops"}"#), true)
            .await
            .unwrap();

        let wf = &state.repo.list_workflows().await.unwrap()[0];
        let run = &state.repo.executions_for(&wf.id)[0];
        assert_eq!(run.status, ExecutionStatus::Completed);
        let logs = state.repo.list_logs(&run.id).await.unwrap();
        assert_eq!(
            logs.last().unwrap().output.as_ref().unwrap()["logged"],
            "approved by ops"
        );
    }

    #[tokio::test]
    async fn trigger_runs_matching_workflows_only() {
        let tmp = TempDir::new().unwrap();
        write(
            &tmp,
            "signup.yaml",
            r#"
name: on-signup
triggers:
  - type: event
    config: { event: signup }
actions:
  - type: log
    config: { message: "welcome" }
"#,
        );
        write(
            &tmp,
            "other.yaml",
            r#"
name: on-churn
triggers:
  - type: event
    config: { event: churn }
actions:
  - type: log
    config: { message: "bye" }
"#,
        );
        let mut state = AppState::init(EngineConfig::default());

        handle_trigger(&mut state, tmp.path(), "event", Some("signup"), None, true)
            .await
            .unwrap();

        for wf in state.repo.list_workflows().await.unwrap() {
            let runs = state.repo.executions_for(&wf.id);
            match wf.name.as_str() {
                "on-signup" => assert_eq!(runs.len(), 1),
                _ => assert!(runs.is_empty()),
            }
        }
    }

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
    }
}

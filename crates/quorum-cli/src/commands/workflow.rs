//! `quorum workflow` — Run, resume and inspect workflow executions.

use quorum_core::state::AppState;
use quorum_core::ExecutionResult;

use super::print_json;

/// List registered workflows.
pub async fn list(state: &AppState) -> Result<(), String> {
    for workflow in state.engine.definitions() {
        println!("{:<20} {}", workflow.id, workflow.name);
        if !workflow.purpose.is_empty() {
            println!("{:<20} {}", "", workflow.purpose);
        }
        let steps: Vec<String> = workflow
            .steps
            .iter()
            .map(|s| {
                if s.is_suspendable() {
                    format!("{} (suspendable)", s.id)
                } else {
                    s.id.clone()
                }
            })
            .collect();
        println!("{:<20} steps: {}", "", steps.join(" → "));
    }
    Ok(())
}

/// Run a workflow on input given inline or from a file.
pub async fn run(
    state: &AppState,
    workflow_id: &str,
    input: Option<&str>,
    input_file: Option<&str>,
) -> Result<(), String> {
    let raw = match (input, input_file) {
        (Some(inline), _) => inline.to_string(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read input file '{}': {}", path, e))?,
        (None, None) => "{}".to_string(),
    };
    let input = parse_json(&raw, "input")?;

    let result = state
        .engine
        .run(workflow_id, input)
        .await
        .map_err(|e| render_error(&e))?;
    report(&result);
    Ok(())
}

/// Resume a suspended execution with a JSON payload.
pub async fn resume(state: &AppState, execution_id: &str, payload: &str) -> Result<(), String> {
    let payload = parse_json(payload, "payload")?;
    let result = state
        .engine
        .resume(execution_id, payload)
        .await
        .map_err(|e| render_error(&e))?;
    report(&result);
    Ok(())
}

/// Print one execution record, or a summary of recent ones.
pub async fn status(
    state: &AppState,
    execution_id: Option<&str>,
    workflow_id: Option<&str>,
) -> Result<(), String> {
    if let Some(id) = execution_id {
        let record = state
            .engine
            .get(id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("Execution '{}' not found", id))?;
        print_json(&record);
        return Ok(());
    }

    let records = state
        .engine
        .list(workflow_id)
        .await
        .map_err(|e| e.to_string())?;
    if records.is_empty() {
        println!("No executions.");
    }
    for record in records {
        println!(
            "{}  {:<18} {:<10} step {}  {}",
            record.id,
            record.workflow_id,
            record.status,
            record.current_step,
            record.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

fn parse_json(raw: &str, what: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("Invalid JSON {}: {}", what, e))
}

fn render_error(error: &quorum_core::EngineError) -> String {
    serde_json::to_string_pretty(&error.to_body()).unwrap_or_else(|_| error.to_string())
}

fn report(result: &ExecutionResult) {
    match result {
        ExecutionResult::Completed { execution_id, .. } => {
            println!("✅ Execution {} completed", execution_id);
        }
        ExecutionResult::Suspended {
            execution_id,
            reason,
            ..
        } => {
            println!("⏸  Execution {} suspended: {}", execution_id, reason);
            println!(
                "   Resume with: quorum workflow resume {} --payload '<json>'",
                execution_id
            );
        }
    }
    print_json(result);
}

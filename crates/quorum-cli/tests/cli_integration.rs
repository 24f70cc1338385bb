//! Integration tests for the quorum-cli commands.
//!
//! These exercise the same bootstrap the binary uses
//! (`quorum_server::create_app_state`) against file-backed databases.

use serde_json::json;

use quorum_core::models::ExecutionStatus;
use quorum_core::ExecutionResult;
use quorum_server::{create_app_state, ServerConfig};

fn config_in(dir: &tempfile::TempDir) -> ServerConfig {
    ServerConfig {
        db_path: dir.path().join("quorum.db").to_string_lossy().to_string(),
        ..ServerConfig::default()
    }
}

fn inquiry() -> serde_json::Value {
    json!({
        "name": "Grace Hopper",
        "email": "grace@example.org",
        "institution": "Navy Research Lab",
        "researchArea": "other",
        "description": "Compiler accessibility"
    })
}

#[tokio::test]
async fn test_run_then_resume_in_a_later_invocation() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);

    let execution_id = {
        let state = create_app_state(&config).await.unwrap();
        let result = state.engine.run("research-inquiry", inquiry()).await.unwrap();
        assert!(result.is_suspended());
        result.execution_id().to_string()
    };

    let state = create_app_state(&config).await.unwrap();
    let record = state.engine.get(&execution_id).await.unwrap().unwrap();
    assert_eq!(record.status, ExecutionStatus::Suspended);

    let result = state
        .engine
        .resume(&execution_id, json!({ "approved": false, "reviewerNotes": "Not this cycle." }))
        .await
        .unwrap();
    let ExecutionResult::Completed { result, .. } = result else {
        panic!("expected completion");
    };
    assert_eq!(result["status"], "rejected");
}

#[tokio::test]
async fn test_specialist_dir_extends_builtins() {
    let dir = tempfile::tempdir().unwrap();
    let specialists = dir.path().join("specialists");
    std::fs::create_dir(&specialists).unwrap();
    std::fs::write(
        specialists.join("policy-analyst.yaml"),
        r#"
id: policy-analyst
name: Policy Analyst
competencies: ["policy", "regulation"]
system_prompt: You analyze accessibility policy.
"#,
    )
    .unwrap();

    let mut config = config_in(&dir);
    config.specialist_dir = Some(specialists.to_string_lossy().to_string());
    let state = create_app_state(&config).await.unwrap();

    let ids: Vec<&str> = state.specialists.all().iter().map(|s| s.id.as_str()).collect();
    assert!(ids.contains(&"policy-analyst"));
    assert!(ids.contains(&"funding-scout"));
    assert_eq!(ids.len(), 6);
}

#[tokio::test]
async fn test_missing_specialist_dir_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(&dir);
    config.specialist_dir = Some(dir.path().join("nope").to_string_lossy().to_string());
    assert!(create_app_state(&config).await.is_err());
}

#[tokio::test]
async fn test_capabilities_file_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("capabilities.yaml");
    std::fs::write(
        &file,
        r#"
capabilities:
  - kind: static
    name: ops_intel
    description: Mission and roadmap notes
    sections:
      roadmap: "Q3: launch the standards brief"
"#,
    )
    .unwrap();

    let mut config = config_in(&dir);
    config.capabilities_file = Some(file.to_string_lossy().to_string());
    let state = create_app_state(&config).await.unwrap();

    let result = state
        .capabilities
        .call("ops_intel", json!({ "section": "roadmap" }))
        .await;
    assert!(result.success);
    assert_eq!(result.data.unwrap(), json!("Q3: launch the standards brief"));
}

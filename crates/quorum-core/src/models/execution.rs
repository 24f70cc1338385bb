use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Suspended,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// running → {suspended, completed, failed}; suspended → running only.
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Running, Self::Running)
                | (Self::Running, Self::Suspended)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Suspended, Self::Running)
        )
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "suspended" => Ok(Self::Suspended),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(EngineError::Database(format!(
                "unknown execution status '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why and where an execution is paused, plus the state handed to the reviewer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Suspension {
    pub step_id: String,
    pub reason: String,
    #[serde(default)]
    pub state: serde_json::Value,
    pub suspended_at: DateTime<Utc>,
}

/// Failure summary kept on a failed record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionFailure {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
}

impl ExecutionFailure {
    pub fn from_error(error: &EngineError) -> Self {
        let step_id = match error {
            EngineError::ExecutionFailed { step_id, .. } => Some(step_id.clone()),
            _ => None,
        };
        Self {
            kind: error.root_cause().kind().to_string(),
            message: error.to_string(),
            step_id,
        }
    }
}

/// A recovered, non-fatal problem raised while a step ran.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionWarning {
    pub kind: String,
    pub step_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

/// Persisted state of one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub current_step: usize,
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspension: Option<Suspension>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionFailure>,
    #[serde(default)]
    pub warnings: Vec<ExecutionWarning>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn new(workflow_id: &str, data: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.to_string(),
            status: ExecutionStatus::Running,
            current_step: 0,
            data,
            suspension: None,
            result: None,
            error: None,
            warnings: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn transition(&mut self, next: ExecutionStatus) -> Result<(), EngineError> {
        if !self.status.can_transition_to(next) {
            return Err(EngineError::InvariantViolation(format!(
                "execution {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record a completed step and move to the next one.
    pub fn advance(&mut self, data: serde_json::Value) -> Result<(), EngineError> {
        self.transition(ExecutionStatus::Running)?;
        self.data = data;
        self.current_step += 1;
        Ok(())
    }

    pub fn mark_suspended(&mut self, suspension: Suspension) -> Result<(), EngineError> {
        self.transition(ExecutionStatus::Suspended)?;
        self.suspension = Some(suspension);
        Ok(())
    }

    pub fn mark_running(&mut self) -> Result<(), EngineError> {
        self.transition(ExecutionStatus::Running)?;
        self.suspension = None;
        Ok(())
    }

    pub fn mark_completed(&mut self, result: serde_json::Value) -> Result<(), EngineError> {
        self.transition(ExecutionStatus::Completed)?;
        self.result = Some(result);
        Ok(())
    }

    pub fn mark_failed(&mut self, error: &EngineError) -> Result<(), EngineError> {
        self.transition(ExecutionStatus::Failed)?;
        self.error = Some(ExecutionFailure::from_error(error));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suspension() -> Suspension {
        Suspension {
            step_id: "review".to_string(),
            reason: "needs a human".to_string(),
            state: serde_json::json!({}),
            suspended_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_parse_rejects_unknown_values() {
        for status in ["running", "suspended", "completed", "failed"] {
            assert_eq!(status.parse::<ExecutionStatus>().unwrap().as_str(), status);
        }
        let err = "paused".parse::<ExecutionStatus>().unwrap_err();
        assert_eq!(err.kind(), "DatabaseError");
        assert!(err.to_string().contains("'paused'"));
    }

    #[test]
    fn test_suspension_present_iff_suspended() {
        let mut record = ExecutionRecord::new("wf", serde_json::json!({}));
        assert!(record.suspension.is_none());

        record.mark_suspended(suspension()).unwrap();
        assert_eq!(record.status, ExecutionStatus::Suspended);
        assert!(record.suspension.is_some());

        record.mark_running().unwrap();
        assert_eq!(record.status, ExecutionStatus::Running);
        assert!(record.suspension.is_none());
    }

    #[test]
    fn test_suspended_cannot_complete_directly() {
        let mut record = ExecutionRecord::new("wf", serde_json::json!({}));
        record.mark_suspended(suspension()).unwrap();
        let err = record.mark_completed(serde_json::json!({})).unwrap_err();
        assert_eq!(err.kind(), "InvariantViolation");
        assert!(record.mark_failed(&EngineError::Step("x".into())).is_err());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut record = ExecutionRecord::new("wf", serde_json::json!({}));
        record.mark_completed(serde_json::json!({"ok": true})).unwrap();
        assert!(record.status.is_terminal());
        assert!(record.mark_running().is_err());
        assert!(record.advance(serde_json::json!({})).is_err());
    }
}

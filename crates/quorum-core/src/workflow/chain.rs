//! Chain driver: runs a workflow's steps in order against a persisted
//! execution record, pausing on suspend and picking up again on resume.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::error::EngineError;
use crate::models::execution::{ExecutionRecord, ExecutionStatus, ExecutionWarning, Suspension};
use crate::store::ExecutionStore;
use crate::workflow::definition::{WorkflowDefinition, WorkflowRegistry};
use crate::workflow::step::{StepContext, StepOutcome, StepSignals};

/// What `run`/`resume` hand back when the chain stops without an error.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ExecutionResult {
    #[serde(rename_all = "camelCase")]
    Completed {
        execution_id: String,
        result: serde_json::Value,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<ExecutionWarning>,
    },
    #[serde(rename_all = "camelCase")]
    Suspended {
        execution_id: String,
        step_id: String,
        reason: String,
        state: serde_json::Value,
    },
}

impl ExecutionResult {
    pub fn execution_id(&self) -> &str {
        match self {
            Self::Completed { execution_id, .. } | Self::Suspended { execution_id, .. } => execution_id,
        }
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, Self::Suspended { .. })
    }
}

struct EngineInner {
    registry: WorkflowRegistry,
    store: ExecutionStore,
}

/// Owns the registered workflows and the execution record store.
///
/// Cheap to clone; every `run`/`resume` drives its chain on a dedicated
/// tokio task, so a caller that stops awaiting does not stop the chain.
#[derive(Clone)]
pub struct WorkflowEngine {
    inner: Arc<EngineInner>,
}

impl WorkflowEngine {
    pub fn new(registry: WorkflowRegistry, store: ExecutionStore) -> Self {
        Self {
            inner: Arc::new(EngineInner { registry, store }),
        }
    }

    pub fn definitions(&self) -> Vec<Arc<WorkflowDefinition>> {
        self.inner.registry.list()
    }

    pub fn definition(&self, workflow_id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.inner.registry.get(workflow_id)
    }

    pub fn store(&self) -> &ExecutionStore {
        &self.inner.store
    }

    pub async fn get(&self, execution_id: &str) -> Result<Option<ExecutionRecord>, EngineError> {
        self.inner.store.get(execution_id).await
    }

    pub async fn list(&self, workflow_id: Option<&str>) -> Result<Vec<ExecutionRecord>, EngineError> {
        self.inner.store.list(workflow_id).await
    }

    /// Validate `input`, create a record and drive the chain from step 0.
    pub async fn run(
        &self,
        workflow_id: &str,
        input: serde_json::Value,
    ) -> Result<ExecutionResult, EngineError> {
        let workflow = self
            .definition(workflow_id)
            .ok_or_else(|| EngineError::NotFound(format!("workflow '{}'", workflow_id)))?;

        workflow
            .input_schema
            .validate(&input)
            .map_err(EngineError::InputValidation)?;

        let record = ExecutionRecord::new(&workflow.id, input);
        self.inner.store.insert(&record).await?;
        tracing::info!(
            "[Chain] Started execution {} of workflow {}",
            record.id,
            workflow.id
        );

        self.spawn_drive(workflow, record, None).await
    }

    /// Validate `payload` against the paused step's resume shape, claim the
    /// record and continue from that step.
    pub async fn resume(
        &self,
        execution_id: &str,
        payload: serde_json::Value,
    ) -> Result<ExecutionResult, EngineError> {
        let record = self
            .inner
            .store
            .get(execution_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("execution '{}'", execution_id)))?;

        if record.status != ExecutionStatus::Suspended {
            return Err(EngineError::InvalidState {
                execution_id: record.id,
                status: record.status.to_string(),
            });
        }

        let workflow = self.definition(&record.workflow_id).ok_or_else(|| {
            EngineError::NotFound(format!("workflow '{}'", record.workflow_id))
        })?;
        let suspension = record.suspension.as_ref().ok_or_else(|| {
            EngineError::InvariantViolation(format!(
                "execution {} is suspended without a suspension payload",
                record.id
            ))
        })?;
        let step = workflow
            .steps
            .get(record.current_step)
            .filter(|s| s.id == suspension.step_id)
            .ok_or_else(|| {
                EngineError::InvariantViolation(format!(
                    "execution {} is paused at unknown step '{}'",
                    record.id, suspension.step_id
                ))
            })?;
        let resume_schema = step.resume_schema.as_ref().ok_or_else(|| {
            EngineError::InvariantViolation(format!("step '{}' has no resume shape", step.id))
        })?;

        // Rejected payloads leave the record untouched.
        resume_schema
            .validate(&payload)
            .map_err(EngineError::InputValidation)?;

        let claimed = match self.inner.store.claim_suspended(&record).await? {
            Some(claimed) => claimed,
            None => {
                let status = self
                    .inner
                    .store
                    .get(execution_id)
                    .await?
                    .map(|r| match r.suspension {
                        // Resumed and paused again elsewhere since our read.
                        Some(later) => format!("{} at step '{}'", r.status, later.step_id),
                        None => r.status.to_string(),
                    })
                    .unwrap_or_else(|| "missing".to_string());
                return Err(EngineError::InvalidState {
                    execution_id: execution_id.to_string(),
                    status,
                });
            }
        };
        tracing::info!(
            "[Chain] Resuming execution {} at step '{}'",
            claimed.id,
            step.id
        );

        self.spawn_drive(workflow, claimed, Some(payload)).await
    }

    async fn spawn_drive(
        &self,
        workflow: Arc<WorkflowDefinition>,
        record: ExecutionRecord,
        resume_data: Option<serde_json::Value>,
    ) -> Result<ExecutionResult, EngineError> {
        let execution_id = record.id.clone();
        let engine = self.clone();
        let handle = tokio::spawn(async move { engine.drive(workflow, record, resume_data).await });

        match handle.await {
            Ok(result) => result,
            Err(join_err) => {
                let err = EngineError::Internal(format!("workflow driver task failed: {}", join_err));
                if let Ok(Some(mut record)) = self.inner.store.get(&execution_id).await {
                    if record.status == ExecutionStatus::Running {
                        self.persist_failure(&mut record, &err).await;
                    }
                }
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        workflow: Arc<WorkflowDefinition>,
        mut record: ExecutionRecord,
        mut resume_data: Option<serde_json::Value>,
    ) -> Result<ExecutionResult, EngineError> {
        while let Some(step) = workflow.steps.get(record.current_step) {
            let signals = StepSignals::default();
            let ctx = StepContext::new(
                &record.id,
                &workflow.id,
                &step.id,
                record.data.clone(),
                resume_data.take(),
                signals.clone(),
            );

            tracing::info!(
                "[Chain] {} step {}/{} '{}'",
                record.id,
                record.current_step + 1,
                workflow.steps.len(),
                step.id
            );
            let outcome = step.handler().execute(ctx).await;
            record.warnings.extend(signals.take_warnings());

            let outcome = match outcome {
                StepOutcome::Continue(_) if signals.suspend_calls() > 0 => {
                    StepOutcome::Fail(EngineError::InvariantViolation(format!(
                        "step '{}' called suspend but returned data",
                        step.id
                    )))
                }
                StepOutcome::Suspend { .. } if signals.suspend_calls() > 1 => {
                    StepOutcome::Fail(EngineError::InvariantViolation(format!(
                        "step '{}' called suspend {} times",
                        step.id,
                        signals.suspend_calls()
                    )))
                }
                StepOutcome::Suspend { .. } if !step.is_suspendable() => {
                    StepOutcome::Fail(EngineError::InvariantViolation(format!(
                        "step '{}' is not suspendable",
                        step.id
                    )))
                }
                StepOutcome::Suspend { ref reason, .. } if reason.trim().is_empty() => {
                    StepOutcome::Fail(EngineError::InvariantViolation(format!(
                        "step '{}' suspended without a reason",
                        step.id
                    )))
                }
                other => other,
            };

            match outcome {
                StepOutcome::Continue(data) => {
                    record.advance(data)?;
                    self.inner.store.save(&record).await?;
                }
                StepOutcome::Suspend { reason, state } => {
                    record.mark_suspended(Suspension {
                        step_id: step.id.clone(),
                        reason: reason.clone(),
                        state: state.clone(),
                        suspended_at: Utc::now(),
                    })?;
                    self.inner.store.save(&record).await?;
                    tracing::info!(
                        "[Chain] Execution {} suspended at '{}': {}",
                        record.id,
                        step.id,
                        reason
                    );
                    return Ok(ExecutionResult::Suspended {
                        execution_id: record.id,
                        step_id: step.id.clone(),
                        reason,
                        state,
                    });
                }
                StepOutcome::Fail(err) => {
                    let err = err.in_step(&step.id);
                    tracing::error!("[Chain] Execution {} failed: {}", record.id, err);
                    self.persist_failure(&mut record, &err).await;
                    return Err(err);
                }
            }
        }

        if let Err(errors) = workflow.result_schema.validate(&record.data) {
            let err = EngineError::ResultValidation(errors);
            tracing::error!(
                "[Chain] Execution {} produced an invalid result: {}",
                record.id,
                err
            );
            self.persist_failure(&mut record, &err).await;
            return Err(err);
        }

        let result = record.data.clone();
        record.mark_completed(result.clone())?;
        self.inner.store.save(&record).await?;
        tracing::info!("[Chain] Execution {} completed", record.id);

        Ok(ExecutionResult::Completed {
            execution_id: record.id,
            result,
            warnings: record.warnings,
        })
    }

    async fn persist_failure(&self, record: &mut ExecutionRecord, err: &EngineError) {
        if let Err(e) = record.mark_failed(err) {
            tracing::error!("[Chain] {}", e);
            return;
        }
        if let Err(e) = self.inner.store.save(record).await {
            tracing::error!("[Chain] Failed to persist failure of {}: {}", record.id, e);
        }
    }
}

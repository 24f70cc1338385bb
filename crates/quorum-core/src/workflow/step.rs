//! Step contract: what a step receives, and the tagged outcome it returns.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::EngineError;
use crate::models::execution::ExecutionWarning;

/// Result of executing one step.
#[derive(Debug)]
pub enum StepOutcome {
    /// Continue with this data as the new context.
    Continue(serde_json::Value),
    /// Halt the chain; the record is persisted as suspended.
    Suspend {
        reason: String,
        state: serde_json::Value,
    },
    /// Abort the execution.
    Fail(EngineError),
}

impl StepOutcome {
    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(EngineError::Step(message.into()))
    }
}

impl From<Result<serde_json::Value, EngineError>> for StepOutcome {
    fn from(result: Result<serde_json::Value, EngineError>) -> Self {
        match result {
            Ok(data) => Self::Continue(data),
            Err(e) => Self::Fail(e),
        }
    }
}

/// Side channel the chain inspects after a step returns.
#[derive(Clone, Default)]
pub(crate) struct StepSignals {
    suspend_calls: Arc<AtomicUsize>,
    warnings: Arc<Mutex<Vec<ExecutionWarning>>>,
}

impl StepSignals {
    pub(crate) fn suspend_calls(&self) -> usize {
        self.suspend_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn take_warnings(&self) -> Vec<ExecutionWarning> {
        self.warnings
            .lock()
            .map(|mut w| std::mem::take(&mut *w))
            .unwrap_or_default()
    }
}

/// Everything a step sees while it runs.
pub struct StepContext {
    pub execution_id: String,
    pub workflow_id: String,
    pub step_id: String,
    /// Accumulated data context.
    pub data: serde_json::Value,
    /// Validated resume payload; only set when re-entering a paused step.
    pub resume_data: Option<serde_json::Value>,
    signals: StepSignals,
}

impl StepContext {
    pub(crate) fn new(
        execution_id: &str,
        workflow_id: &str,
        step_id: &str,
        data: serde_json::Value,
        resume_data: Option<serde_json::Value>,
        signals: StepSignals,
    ) -> Self {
        Self {
            execution_id: execution_id.to_string(),
            workflow_id: workflow_id.to_string(),
            step_id: step_id.to_string(),
            data,
            resume_data,
            signals,
        }
    }

    /// Build a detached context, e.g. to unit-test a handler directly.
    pub fn detached(step_id: &str, data: serde_json::Value, resume_data: Option<serde_json::Value>) -> Self {
        Self::new("detached", "detached", step_id, data, resume_data, StepSignals::default())
    }

    /// Request suspension. Return the value from the step; calling this
    /// more than once, or calling it and then returning `Continue`, fails
    /// the execution.
    pub fn suspend(&self, reason: impl Into<String>, state: serde_json::Value) -> StepOutcome {
        self.signals.suspend_calls.fetch_add(1, Ordering::SeqCst);
        StepOutcome::Suspend {
            reason: reason.into(),
            state,
        }
    }

    /// Record a recovered problem on the execution.
    pub fn warn(&self, kind: &str, message: impl Into<String>, details: serde_json::Value) {
        if let Ok(mut warnings) = self.signals.warnings.lock() {
            warnings.push(ExecutionWarning {
                kind: kind.to_string(),
                step_id: self.step_id.clone(),
                message: message.into(),
                details,
            });
        }
    }

    pub fn is_resuming(&self) -> bool {
        self.resume_data.is_some()
    }

    /// Read a string field from the data context.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }
}

#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn execute(&self, ctx: StepContext) -> StepOutcome;
}

/// Adapts an async closure into a `StepHandler`.
pub struct FnStep<F>(pub F);

#[async_trait]
impl<F, Fut> StepHandler for FnStep<F>
where
    F: Fn(StepContext) -> Fut + Send + Sync,
    Fut: Future<Output = StepOutcome> + Send + 'static,
{
    async fn execute(&self, ctx: StepContext) -> StepOutcome {
        (self.0)(ctx).await
    }
}

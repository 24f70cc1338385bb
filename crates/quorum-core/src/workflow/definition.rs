//! Workflow and step definitions.
//!
//! Definitions are built once at process start, registered into a
//! `WorkflowRegistry`, and read-only from then on.
//!
//! ```ignore
//! let workflow = WorkflowDefinition::builder("greeting", "Greeting")
//!     .purpose("Say hello")
//!     .input(input_shape)
//!     .result(result_shape)
//!     .then(StepDefinition::transform("greet", |ctx| async move {
//!         StepOutcome::Continue(serde_json::json!({ "message": "hi" }))
//!     }))
//!     .build()?;
//! ```

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use crate::error::EngineError;
use crate::workflow::shape::OutputSchema;
use crate::workflow::step::{FnStep, StepContext, StepHandler, StepOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    Transform,
    Agent,
    SuspendableAgent,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transform => "transform",
            Self::Agent => "agent",
            Self::SuspendableAgent => "suspendable-agent",
        }
    }
}

/// One step of a chain. The resume shape is present iff the step is suspendable.
#[derive(Clone)]
pub struct StepDefinition {
    pub id: String,
    pub kind: StepKind,
    pub resume_schema: Option<OutputSchema>,
    handler: Arc<dyn StepHandler>,
}

impl StepDefinition {
    pub fn transform<F, Fut>(id: &str, f: F) -> Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StepOutcome> + Send + 'static,
    {
        Self {
            id: id.to_string(),
            kind: StepKind::Transform,
            resume_schema: None,
            handler: Arc::new(FnStep(f)),
        }
    }

    pub fn agent(id: &str, handler: impl StepHandler + 'static) -> Self {
        Self {
            id: id.to_string(),
            kind: StepKind::Agent,
            resume_schema: None,
            handler: Arc::new(handler),
        }
    }

    pub fn suspendable<F, Fut>(id: &str, resume_schema: OutputSchema, f: F) -> Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StepOutcome> + Send + 'static,
    {
        Self::suspendable_handler(id, resume_schema, FnStep(f))
    }

    pub fn suspendable_handler(
        id: &str,
        resume_schema: OutputSchema,
        handler: impl StepHandler + 'static,
    ) -> Self {
        Self {
            id: id.to_string(),
            kind: StepKind::SuspendableAgent,
            resume_schema: Some(resume_schema),
            handler: Arc::new(handler),
        }
    }

    pub fn handler(&self) -> Arc<dyn StepHandler> {
        self.handler.clone()
    }

    pub fn is_suspendable(&self) -> bool {
        self.kind == StepKind::SuspendableAgent
    }
}

impl std::fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepDefinition")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("resume_schema", &self.resume_schema)
            .finish()
    }
}

/// An immutable, ordered chain of steps with declared input and result shapes.
#[derive(Debug)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    pub purpose: String,
    pub input_schema: OutputSchema,
    pub result_schema: OutputSchema,
    pub steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    pub fn builder(id: &str, name: &str) -> WorkflowBuilder {
        WorkflowBuilder {
            id: id.to_string(),
            name: name.to_string(),
            purpose: String::new(),
            input_schema: None,
            result_schema: None,
            steps: Vec::new(),
        }
    }

    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            purpose: self.purpose.clone(),
            input_schema: self.input_schema.document().clone(),
            result_schema: self.result_schema.document().clone(),
            steps: self
                .steps
                .iter()
                .map(|s| StepSummary {
                    id: s.id.clone(),
                    kind: s.kind,
                    resume_schema: s.resume_schema.as_ref().map(|r| r.document().clone()),
                })
                .collect(),
        }
    }
}

pub struct WorkflowBuilder {
    id: String,
    name: String,
    purpose: String,
    input_schema: Option<OutputSchema>,
    result_schema: Option<OutputSchema>,
    steps: Vec<StepDefinition>,
}

impl WorkflowBuilder {
    pub fn purpose(mut self, purpose: &str) -> Self {
        self.purpose = purpose.to_string();
        self
    }

    pub fn input(mut self, schema: OutputSchema) -> Self {
        self.input_schema = Some(schema);
        self
    }

    pub fn result(mut self, schema: OutputSchema) -> Self {
        self.result_schema = Some(schema);
        self
    }

    pub fn then(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    pub fn build(self) -> Result<WorkflowDefinition, EngineError> {
        let invalid = |msg: String| EngineError::InvariantViolation(format!("workflow '{}': {}", self.id, msg));

        let input_schema = self
            .input_schema
            .clone()
            .ok_or_else(|| invalid("missing input shape".to_string()))?;
        let result_schema = self
            .result_schema
            .clone()
            .ok_or_else(|| invalid("missing result shape".to_string()))?;

        if self.steps.is_empty() {
            return Err(invalid("has no steps".to_string()));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(invalid(format!("duplicate step id '{}'", step.id)));
            }
            if step.is_suspendable() != step.resume_schema.is_some() {
                return Err(invalid(format!(
                    "step '{}' must declare a resume shape iff it is suspendable",
                    step.id
                )));
            }
        }

        Ok(WorkflowDefinition {
            id: self.id,
            name: self.name,
            purpose: self.purpose,
            input_schema,
            result_schema,
            steps: self.steps,
        })
    }
}

/// Serializable view of a definition (shapes included, handlers omitted).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    pub purpose: String,
    pub input_schema: serde_json::Value,
    pub result_schema: serde_json::Value,
    pub steps: Vec<StepSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSummary {
    pub id: String,
    pub kind: StepKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_schema: Option<serde_json::Value>,
}

/// Workflows known to the process, keyed by id.
#[derive(Default)]
pub struct WorkflowRegistry {
    workflows: HashMap<String, Arc<WorkflowDefinition>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, workflow: WorkflowDefinition) -> Result<(), EngineError> {
        if self.workflows.contains_key(&workflow.id) {
            return Err(EngineError::InvariantViolation(format!(
                "workflow '{}' is already registered",
                workflow.id
            )));
        }
        tracing::info!(
            "[Registry] Registered workflow: {} ({} step(s))",
            workflow.id,
            workflow.steps.len()
        );
        self.workflows.insert(workflow.id.clone(), Arc::new(workflow));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.workflows.get(id).cloned()
    }

    pub fn list(&self) -> Vec<Arc<WorkflowDefinition>> {
        let mut all: Vec<_> = self.workflows.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}

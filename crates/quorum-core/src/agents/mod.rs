//! Agents — anything that turns a prompt into text.
//!
//! `Specialist` wraps one `SpecialistDef` and a model caller; the
//! orchestrator (see `orchestration`) implements the same trait on top of
//! a roster of specialists.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::workflow::agent_caller::{AgentCaller, AgentRequest};
use crate::workflow::specialist::SpecialistDef;

/// A recovered problem an agent wants surfaced on the execution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentWarning {
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct AgentOutput {
    pub text: String,
    pub warnings: Vec<AgentWarning>,
}

impl AgentOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            warnings: Vec::new(),
        }
    }
}

#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, prompt: &str) -> Result<AgentOutput, EngineError>;
}

/// A single specialist. It answers tasks and never delegates.
pub struct Specialist {
    def: SpecialistDef,
    caller: Arc<dyn AgentCaller>,
}

impl Specialist {
    pub fn new(def: SpecialistDef, caller: Arc<dyn AgentCaller>) -> Self {
        Self { def, caller }
    }

    pub fn def(&self) -> &SpecialistDef {
        &self.def
    }

    pub fn id(&self) -> &str {
        &self.def.id
    }

    fn request(&self, task: &str) -> AgentRequest {
        let mut user_prompt = task.to_string();
        if let Some(reminder) = self.def.role_reminder.as_deref().filter(|r| !r.is_empty()) {
            user_prompt.push_str("\n\n---\n**Reminder:** ");
            user_prompt.push_str(reminder);
        }

        AgentRequest {
            system_prompt: self.def.system_prompt.clone(),
            user_prompt,
            model: self.def.default_model.clone(),
            ..AgentRequest::default()
        }
    }
}

#[async_trait]
impl Agent for Specialist {
    fn name(&self) -> &str {
        &self.def.id
    }

    async fn generate(&self, prompt: &str) -> Result<AgentOutput, EngineError> {
        let response = self
            .caller
            .call(&self.request(prompt))
            .await
            .map_err(|e| EngineError::Agent(format!("{}: {}", self.def.id, e)))?;

        if response.content.trim().is_empty() {
            return Err(EngineError::Agent(format!("{}: empty response", self.def.id)));
        }
        Ok(AgentOutput::text(response.content))
    }
}

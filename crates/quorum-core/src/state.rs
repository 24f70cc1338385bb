//! Shared application state for the axum server.

use std::sync::Arc;

use crate::agents::Agent;
use crate::db::Database;
use crate::error::EngineError;
use crate::flows::{builtin_workflows, ops_orchestrator};
use crate::gateway::AgentRuntimeClient;
use crate::store::ExecutionStore;
use crate::tools::CapabilityRegistry;
use crate::workflow::agent_caller::AgentCaller;
use crate::workflow::chain::WorkflowEngine;
use crate::workflow::specialist::SpecialistLoader;

/// Shared state accessible by all API handlers.
pub struct AppStateInner {
    pub db: Database,
    pub engine: WorkflowEngine,
    pub gateway: AgentRuntimeClient,
    pub capabilities: Arc<CapabilityRegistry>,
    pub specialists: SpecialistLoader,
}

pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    /// Wire the built-in workflows to an ops orchestrator over `specialists`.
    pub fn new(
        db: Database,
        specialists: SpecialistLoader,
        caller: Arc<dyn AgentCaller>,
        capabilities: CapabilityRegistry,
        gateway: AgentRuntimeClient,
    ) -> Result<Self, EngineError> {
        let capabilities = Arc::new(capabilities);
        let orchestrator = ops_orchestrator(&specialists, caller, capabilities.clone())?;
        let ops_agent: Arc<dyn Agent> = Arc::new(orchestrator);
        let registry = builtin_workflows(ops_agent, capabilities.clone())?;
        let engine = WorkflowEngine::new(registry, ExecutionStore::new(db.clone()));

        Ok(Self {
            db,
            engine,
            gateway,
            capabilities,
            specialists,
        })
    }
}

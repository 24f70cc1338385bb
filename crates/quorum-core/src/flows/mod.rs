//! Built-in workflows and the ops orchestrator that backs them.

pub mod research_inquiry;
pub mod strategy_cycle;

use std::sync::Arc;
use std::time::Duration;

use crate::agents::{Agent, Specialist};
use crate::error::EngineError;
use crate::orchestration::Orchestrator;
use crate::tools::CapabilityRegistry;
use crate::workflow::agent_caller::AgentCaller;
use crate::workflow::definition::WorkflowRegistry;
use crate::workflow::specialist::SpecialistLoader;

pub use research_inquiry::research_inquiry;
pub use strategy_cycle::strategy_cycle;

const SPECIALIST_TIMEOUT: Duration = Duration::from_secs(240);

/// Orchestrator over every loaded specialist. Read-only `ops_intel` and
/// `crm_query` are gathered first when they are registered. Each
/// specialist keeps only the capabilities this deployment registers.
pub fn ops_orchestrator(
    specialists: &SpecialistLoader,
    caller: Arc<dyn AgentCaller>,
    capabilities: Arc<CapabilityRegistry>,
) -> Result<Orchestrator, EngineError> {
    let roster = specialists.all().into_iter().map(|def| {
        let mut def = def.clone();
        def.capabilities.retain(|name| {
            let known = capabilities.contains(name);
            if !known {
                tracing::debug!("[Flows] {} loses unregistered capability {}", def.id, name);
            }
            known
        });
        Specialist::new(def, caller.clone())
    });

    let mut builder = Orchestrator::builder("ops-orchestrator")
        .roster(roster)
        .synthesizer(caller)
        .timeout(SPECIALIST_TIMEOUT);

    for (capability, args) in [
        ("ops_intel", serde_json::json!({ "section": "roadmap" })),
        ("crm_query", serde_json::json!({})),
    ] {
        if capabilities.get(capability).is_some_and(|c| c.read_only()) {
            builder = builder.context_call(capability, args);
        }
    }

    builder.capabilities(capabilities).build()
}

/// Registry holding every built-in workflow.
pub fn builtin_workflows(
    ops_agent: Arc<dyn Agent>,
    capabilities: Arc<CapabilityRegistry>,
) -> Result<WorkflowRegistry, EngineError> {
    let mut registry = WorkflowRegistry::new();
    registry.register(research_inquiry()?)?;
    registry.register(strategy_cycle(ops_agent, capabilities)?)?;
    Ok(registry)
}

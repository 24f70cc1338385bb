//! Workflow engine — ordered step chains that can suspend and resume.
//!
//! # Architecture
//!
//! ```text
//! WorkflowBuilder ──► WorkflowDefinition ──► WorkflowRegistry
//!                                                 │
//!                      run / resume ──────► WorkflowEngine ──► ExecutionStore
//!                                                 │
//!                                     StepHandler (transform | agent)
//!                                                 │
//!                                  SchemaValidatedStep ──► Agent
//! ```

pub mod agent_caller;
pub mod chain;
pub mod definition;
pub mod shape;
pub mod specialist;
pub mod step;
pub mod validated;

pub use agent_caller::{AgentCaller, HttpAgentCaller};
pub use chain::{ExecutionResult, WorkflowEngine};
pub use definition::{StepDefinition, StepKind, WorkflowDefinition, WorkflowRegistry};
pub use shape::OutputSchema;
pub use specialist::{SpecialistDef, SpecialistLoader};
pub use step::{StepContext, StepHandler, StepOutcome};
pub use validated::{AgentStep, SchemaValidatedStep};

//! Quorum Core — durable workflow chains with schema-validated agent steps.
//!
//! This crate contains the engine, the execution record store, specialist
//! orchestration and the agent-runtime gateway client. It has **no HTTP
//! framework dependency** by default, making it suitable for use in:
//!
//! - HTTP servers (via `quorum-server`)
//! - CLI tools (via `quorum-cli`)
//!
//! # Feature Flags
//!
//! - `axum` — Enables `IntoResponse` impl on `EngineError` for use in axum handlers.

pub mod agents;
pub mod db;
pub mod error;
pub mod flows;
pub mod gateway;
pub mod models;
pub mod orchestration;
pub mod state;
pub mod store;
pub mod tools;
pub mod workflow;

// Convenience re-exports
pub use db::Database;
pub use error::EngineError;
pub use state::{AppState, AppStateInner};
pub use workflow::{ExecutionResult, WorkflowEngine};

//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and reuses
//! the quorum-core engine through `AppState`.

pub mod server;
pub mod specialist;
pub mod workflow;

use quorum_core::state::AppState;
use quorum_server::ServerConfig;

/// Initialize a shared `AppState` the same way the server does.
pub async fn init_state(config: &ServerConfig) -> AppState {
    quorum_server::create_app_state(config)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Failed to initialize '{}': {}", config.db_path, e);
            std::process::exit(1);
        })
}

/// Pretty-print a serializable value to stdout.
pub fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Failed to render output: {}", e),
    }
}

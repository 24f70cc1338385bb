//! Quorum Server - HTTP surface for the workflow engine
//!
//! A standalone Rust backend server providing:
//! - Workflow execution and resume over a RESTful axum API
//! - SQLite-backed execution records (rusqlite)
//! - An authenticated proxy to the external agent runtime
//!
//! All `/api/*` routes except `/api/health` sit behind a bearer gate.

pub mod api;
pub mod auth;
pub mod config;

pub use config::ServerConfig;
pub use quorum_core::state;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use quorum_core::gateway::AgentRuntimeClient;
use quorum_core::tools::CapabilityRegistry;
use quorum_core::workflow::agent_caller::{AgentCallConfig, HttpAgentCaller};
use quorum_core::workflow::specialist::SpecialistLoader;
use quorum_core::Database;

use self::auth::ApiSecret;
use self::state::{AppState, AppStateInner};

/// Create a shared `AppState` from the server configuration.
///
/// Loads the specialist roster and declared capabilities, then wires the
/// built-in workflows.
pub async fn create_app_state(config: &ServerConfig) -> Result<AppState, String> {
    let db = Database::open(&config.db_path)
        .map_err(|e| format!("Failed to open database: {}", e))?;

    let mut specialists = SpecialistLoader::with_builtins();
    if let Some(ref dir) = config.specialist_dir {
        let loaded = specialists.load_dir(Path::new(dir))?;
        tracing::info!("Loaded {} specialist(s) from {}", loaded, dir);
    }

    let mut capabilities = CapabilityRegistry::new();
    if let Some(ref file) = config.capabilities_file {
        let loaded = capabilities
            .load_file(Path::new(file))
            .map_err(|e| format!("Failed to load capabilities: {}", e))?;
        tracing::info!("Loaded {} capability(ies) from {}", loaded, file);
    }

    let agent_config = AgentCallConfig::from_env();
    if agent_config.api_key.is_empty() {
        tracing::warn!("No model API key configured; agent steps will fail until one is set");
    }
    let caller = Arc::new(HttpAgentCaller::new(agent_config));
    let gateway = AgentRuntimeClient::new(&config.agent_runtime_url, &config.agent_runtime_secret);
    if !gateway.is_configured() {
        tracing::warn!("QUORUM_AGENT_RUNTIME_SECRET is not set; agent proxy routes will return 503");
    }

    let state = AppStateInner::new(db, specialists, caller, capabilities, gateway)
        .map_err(|e| format!("Failed to build workflow registry: {}", e))?;
    Ok(Arc::new(state))
}

/// Build the full router: gated API routes plus the open health check.
pub fn build_router(state: AppState, secret: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = api::api_router().layer(from_fn_with_state(
        ApiSecret::new(secret),
        auth::require_bearer,
    ));

    Router::new()
        .merge(protected)
        .route("/api/health", axum::routing::get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the Quorum server.
///
/// Returns the actual address the server is listening on.
pub async fn start_server(config: ServerConfig) -> Result<SocketAddr, String> {
    // Initialize tracing
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quorum_server=info,quorum_core=info,tower_http=info".into()),
        )
        .try_init();

    if config.api_secret.trim().is_empty() {
        return Err("QUORUM_API_SECRET must be set; refusing to start without API auth".to_string());
    }

    tracing::info!(
        "Starting Quorum server on {}:{}",
        config.host,
        config.port
    );

    let state = create_app_state(&config).await?;

    start_server_with_state(config, state).await
}

/// Start the HTTP server with a pre-built `AppState`.
pub async fn start_server_with_state(
    config: ServerConfig,
    state: AppState,
) -> Result<SocketAddr, String> {
    if config.api_secret.trim().is_empty() {
        return Err("QUORUM_API_SECRET must be set; refusing to start without API auth".to_string());
    }

    spawn_retention_purge(&config, state.clone());
    let app = build_router(state, &config.api_secret);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    let local_addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get local address: {}", e))?;

    tracing::info!("Quorum server listening on {}", local_addr);

    // Spawn the server in a background task
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok(local_addr)
}

/// Periodically drop completed and failed executions past retention.
fn spawn_retention_purge(config: &ServerConfig, state: AppState) {
    let retention = config.retention();
    let mut interval = tokio::time::interval(config.purge_interval());

    tokio::spawn(async move {
        loop {
            interval.tick().await;
            let cutoff = chrono::Utc::now() - retention;
            if let Err(e) = state.engine.store().purge_terminal_before(cutoff).await {
                tracing::warn!("[ExecutionStore] Retention purge failed: {}", e);
            }
        }
    });
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "server": "quorum-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

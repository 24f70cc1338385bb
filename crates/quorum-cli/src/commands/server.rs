//! `quorum server` — Start the Quorum HTTP server.

use quorum_server::ServerConfig;

pub async fn run(config: ServerConfig) -> Result<(), String> {
    println!("Starting Quorum server on {}:{}...", config.host, config.port);

    let addr = quorum_server::start_server(config).await?;
    println!("Quorum server listening on http://{}", addr);

    // Keep the process running until interrupted
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for Ctrl+C: {}", e))?;

    println!("\nShutting down...");
    Ok(())
}

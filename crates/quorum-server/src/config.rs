//! Server configuration, read from `QUORUM_*` environment variables.

use std::time::Duration;

pub const DEFAULT_AGENT_RUNTIME_URL: &str = "http://localhost:3141";

/// Configuration for the Quorum server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    /// Bearer token every protected route requires. Must be non-empty.
    pub api_secret: String,
    pub agent_runtime_url: String,
    pub agent_runtime_secret: String,
    /// Extra specialist definitions merged over the built-in roster.
    pub specialist_dir: Option<String>,
    pub capabilities_file: Option<String>,
    /// Finished executions older than this are purged.
    pub retention_days: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3210,
            db_path: "quorum.db".to_string(),
            api_secret: String::new(),
            agent_runtime_url: DEFAULT_AGENT_RUNTIME_URL.to_string(),
            agent_runtime_secret: String::new(),
            specialist_dir: None,
            capabilities_file: None,
            retention_days: 30,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by whichever `QUORUM_*` variables are set.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        Self {
            host: var("QUORUM_HOST").unwrap_or(defaults.host),
            port: var("QUORUM_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            db_path: var("QUORUM_DB_PATH").unwrap_or(defaults.db_path),
            api_secret: var("QUORUM_API_SECRET").unwrap_or_default(),
            agent_runtime_url: var("QUORUM_AGENT_RUNTIME_URL").unwrap_or(defaults.agent_runtime_url),
            agent_runtime_secret: var("QUORUM_AGENT_RUNTIME_SECRET").unwrap_or_default(),
            specialist_dir: var("QUORUM_SPECIALIST_DIR"),
            capabilities_file: var("QUORUM_CAPABILITIES_FILE"),
            retention_days: var("QUORUM_RETENTION_DAYS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.retention_days),
        }
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }

    /// How often the retention purge runs.
    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(60 * 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.agent_runtime_url, "http://localhost:3141");
        assert_eq!(config.retention_days, 30);
        assert!(config.api_secret.is_empty());
        assert_eq!(config.retention(), chrono::Duration::days(30));
    }
}

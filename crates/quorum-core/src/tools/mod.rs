//! Capability registry — named functions agents and steps call as black boxes.
//!
//! Capabilities are flagged read-only or not; the orchestrator only accepts
//! read-only ones for its context-gathering phase.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Result of a capability call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(data: impl Serialize) -> Self {
        Self {
            success: true,
            data: Some(serde_json::to_value(data).unwrap_or_default()),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }

    /// Convert into a `Result`, failing on unsuccessful calls.
    pub fn into_result(self, capability: &str) -> Result<serde_json::Value, EngineError> {
        if self.success {
            Ok(self.data.unwrap_or(serde_json::Value::Null))
        } else {
            Err(EngineError::Step(format!(
                "capability '{}' failed: {}",
                capability,
                self.error.unwrap_or_else(|| "unknown error".to_string())
            )))
        }
    }
}

#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// Read-only capabilities never modify external state.
    fn read_only(&self) -> bool;
    async fn call(&self, args: serde_json::Value) -> ToolResult;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityInfo {
    pub name: String,
    pub description: String,
    pub read_only: bool,
}

/// Capabilities by name. Built at startup, shared read-only afterwards.
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, capability: impl Capability + 'static) {
        let capability: Arc<dyn Capability> = Arc::new(capability);
        tracing::debug!(
            "[Capabilities] Registered {} (read_only: {})",
            capability.name(),
            capability.read_only()
        );
        self.capabilities
            .insert(capability.name().to_string(), capability);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    pub async fn call(&self, name: &str, args: serde_json::Value) -> ToolResult {
        match self.get(name) {
            Some(capability) => capability.call(args).await,
            None => ToolResult::error(format!("Unknown capability: {}", name)),
        }
    }

    pub fn list(&self) -> Vec<CapabilityInfo> {
        let mut all: Vec<_> = self
            .capabilities
            .values()
            .map(|c| CapabilityInfo {
                name: c.name().to_string(),
                description: c.description().to_string(),
                read_only: c.read_only(),
            })
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Register every capability declared in a YAML file.
    pub fn load_file(&mut self, path: &Path) -> Result<usize, EngineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Internal(format!(
                "failed to read capabilities file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let file: CapabilityFile = serde_yaml::from_str(&content).map_err(|e| {
            EngineError::Internal(format!(
                "failed to parse capabilities file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let count = file.capabilities.len();
        for spec in file.capabilities {
            match spec {
                CapabilitySpec::Static(capability) => self.register(capability),
                CapabilitySpec::Http(capability) => self.register(capability),
            }
        }
        tracing::info!(
            "[Capabilities] Loaded {} capabilities from {}",
            count,
            path.display()
        );
        Ok(count)
    }
}

type CapabilityFuture = Pin<Box<dyn Future<Output = ToolResult> + Send>>;

/// Capability backed by an async closure.
pub struct FnCapability {
    name: String,
    description: String,
    read_only: bool,
    f: Box<dyn Fn(serde_json::Value) -> CapabilityFuture + Send + Sync>,
}

impl FnCapability {
    pub fn new<F, Fut>(name: &str, description: &str, read_only: bool, f: F) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            read_only,
            f: Box::new(move |args| Box::pin(f(args))),
        }
    }
}

#[async_trait]
impl Capability for FnCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    async fn call(&self, args: serde_json::Value) -> ToolResult {
        (self.f)(args).await
    }
}

#[derive(Debug, Deserialize)]
struct CapabilityFile {
    #[serde(default)]
    capabilities: Vec<CapabilitySpec>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum CapabilitySpec {
    Static(StaticCapability),
    Http(HttpCapability),
}

/// Read-only lookup over fixed sections of JSON/YAML knowledge.
///
/// Called with `{ "<key>": "<section>" }`; `all_sections` (or no key)
/// lists what is available.
#[derive(Debug, Clone, Deserialize)]
pub struct StaticCapability {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_key")]
    pub key: String,
    pub sections: BTreeMap<String, serde_json::Value>,
}

fn default_key() -> String {
    "section".to_string()
}

impl StaticCapability {
    pub fn new(name: &str, description: &str, sections: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            key: default_key(),
            sections,
        }
    }
}

#[async_trait]
impl Capability for StaticCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn call(&self, args: serde_json::Value) -> ToolResult {
        let available: Vec<&String> = self.sections.keys().collect();
        match args.get(&self.key).and_then(|v| v.as_str()) {
            None | Some("all_sections") => ToolResult::success(serde_json::json!({ "sections": available })),
            Some(section) => match self.sections.get(section) {
                Some(data) => ToolResult::success(data),
                None => ToolResult::error(format!(
                    "Section \"{}\" not found. Available: {}",
                    section,
                    available
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )),
            },
        }
    }
}

/// Capability served by an HTTP endpoint: arguments are POSTed as JSON and
/// the JSON reply becomes the result data.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpCapability {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub read_only: bool,
    /// Environment variable holding a bearer token, if the endpoint needs one.
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(skip)]
    client: reqwest::Client,
}

#[async_trait]
impl Capability for HttpCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    async fn call(&self, args: serde_json::Value) -> ToolResult {
        let mut request = self.client.post(&self.url).json(&args);
        if let Some(token) = self.token_env.as_deref().and_then(|var| std::env::var(var).ok()) {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return ToolResult::error(format!("{} unreachable: {}", self.name, e)),
        };
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return ToolResult::error(format!("{} returned {}: {}", self.name, status, body));
        }
        match response.json::<serde_json::Value>().await {
            Ok(data) => ToolResult::success(data),
            Err(e) => ToolResult::error(format!("{} returned invalid JSON: {}", self.name, e)),
        }
    }
}

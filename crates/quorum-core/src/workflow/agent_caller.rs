//! Agent caller — one model call over HTTP.
//!
//! Specialists, the orchestrator's synthesizer and schema-validated steps
//! all go through the `AgentCaller` trait, so tests can swap in scripted
//! callers without touching the network.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

static ENV_REF: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\$\{([^}]+)\}").expect("env reference pattern"));

/// Wire format spoken by the model endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFlavor {
    /// Messages API (`POST {base}/v1/messages`).
    Anthropic,
    /// Chat completions (`POST {base}/chat/completions`).
    OpenAi,
}

impl ApiFlavor {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "messages" => Some(Self::Anthropic),
            "openai" | "chat-completions" => Some(Self::OpenAi),
            _ => None,
        }
    }
}

/// Endpoint settings shared by every call made through one caller.
#[derive(Debug, Clone)]
pub struct AgentCallConfig {
    pub flavor: ApiFlavor,
    pub base_url: String,
    pub api_key: String,
    /// Model used when a request does not name one.
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for AgentCallConfig {
    fn default() -> Self {
        Self {
            flavor: ApiFlavor::Anthropic,
            base_url: "https://api.anthropic.com".to_string(),
            api_key: String::new(),
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 4096,
            timeout: Duration::from_secs(300),
        }
    }
}

impl AgentCallConfig {
    /// Read `ANTHROPIC_BASE_URL`, `ANTHROPIC_AUTH_TOKEN`/`ANTHROPIC_API_KEY`,
    /// `ANTHROPIC_MODEL` and `QUORUM_AGENT_API` (`anthropic` or `openai`).
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let base_url = resolve_env_vars("${ANTHROPIC_BASE_URL:-https://api.anthropic.com}");
        let api_key = std::env::var("ANTHROPIC_AUTH_TOKEN")
            .or_else(|_| std::env::var("ANTHROPIC_API_KEY"))
            .unwrap_or_default();
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or(defaults.model);
        let flavor = std::env::var("QUORUM_AGENT_API")
            .ok()
            .and_then(|v| ApiFlavor::parse(&v))
            .unwrap_or(defaults.flavor);

        Self {
            flavor,
            base_url,
            api_key,
            model,
            ..Self::default()
        }
    }
}

/// A single prompt sent to a model.
#[derive(Debug, Clone, Default)]
pub struct AgentRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl AgentRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub content: String,
    pub model: String,
    pub usage: Option<UsageInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageInfo {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

#[async_trait]
pub trait AgentCaller: Send + Sync {
    async fn call(&self, request: &AgentRequest) -> Result<AgentResponse, String>;
}

/// `AgentCaller` backed by an HTTP model endpoint.
pub struct HttpAgentCaller {
    client: reqwest::Client,
    config: AgentCallConfig,
}

impl HttpAgentCaller {
    pub fn new(config: AgentCallConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(config.timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            config,
        }
    }

    pub fn config(&self) -> &AgentCallConfig {
        &self.config
    }

    async fn post(
        &self,
        url: &str,
        body: &serde_json::Value,
        auth: (&str, String),
    ) -> Result<serde_json::Value, String> {
        let mut request = self
            .client
            .post(url)
            .header(auth.0, auth.1)
            .header("content-type", "application/json");
        if self.config.flavor == ApiFlavor::Anthropic {
            request = request.header("anthropic-version", "2023-06-01");
        }

        let response = request
            .json(body)
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {}", e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| format!("Failed to read response body: {}", e))?;

        if !status.is_success() {
            return Err(format!("API returned {}: {}", status, text));
        }

        serde_json::from_str(&text).map_err(|e| format!("Failed to parse response JSON: {}", e))
    }

    async fn call_messages(&self, request: &AgentRequest, model: &str) -> Result<AgentResponse, String> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));

        let mut body = serde_json::json!({
            "model": model,
            "max_tokens": request.max_tokens.unwrap_or(self.config.max_tokens),
            "messages": [{ "role": "user", "content": request.user_prompt }],
        });
        if !request.system_prompt.is_empty() {
            body["system"] = serde_json::Value::String(request.system_prompt.clone());
        }
        if let Some(temp) = request.temperature {
            body["temperature"] = serde_json::json!(temp);
        }

        tracing::debug!("[AgentCaller] POST {} (model: {})", url, model);
        let json = self
            .post(&url, &body, ("x-api-key", self.config.api_key.clone()))
            .await?;

        let content = json
            .get("content")
            .and_then(|c| c.as_array())
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                    .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        let usage = json.get("usage").map(|u| UsageInfo {
            input_tokens: u.get("input_tokens").and_then(|v| v.as_u64()),
            output_tokens: u.get("output_tokens").and_then(|v| v.as_u64()),
        });

        Ok(AgentResponse {
            content,
            model: json
                .get("model")
                .and_then(|m| m.as_str())
                .unwrap_or(model)
                .to_string(),
            usage,
        })
    }

    async fn call_chat_completions(
        &self,
        request: &AgentRequest,
        model: &str,
    ) -> Result<AgentResponse, String> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let mut messages = Vec::new();
        if !request.system_prompt.is_empty() {
            messages.push(serde_json::json!({ "role": "system", "content": request.system_prompt }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": request.user_prompt }));

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "max_tokens": request.max_tokens.unwrap_or(self.config.max_tokens),
        });
        if let Some(temp) = request.temperature {
            body["temperature"] = serde_json::json!(temp);
        }

        tracing::debug!("[AgentCaller] POST {} (model: {})", url, model);
        let json = self
            .post(
                &url,
                &body,
                ("Authorization", format!("Bearer {}", self.config.api_key)),
            )
            .await?;

        let content = json
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .unwrap_or("")
            .to_string();

        let usage = json.get("usage").map(|u| UsageInfo {
            input_tokens: u
                .get("prompt_tokens")
                .or_else(|| u.get("input_tokens"))
                .and_then(|v| v.as_u64()),
            output_tokens: u
                .get("completion_tokens")
                .or_else(|| u.get("output_tokens"))
                .and_then(|v| v.as_u64()),
        });

        Ok(AgentResponse {
            content,
            model: json
                .get("model")
                .and_then(|m| m.as_str())
                .unwrap_or(model)
                .to_string(),
            usage,
        })
    }
}

#[async_trait]
impl AgentCaller for HttpAgentCaller {
    async fn call(&self, request: &AgentRequest) -> Result<AgentResponse, String> {
        if self.config.api_key.is_empty() {
            return Err("no model API key configured".to_string());
        }
        let model = request.model.as_deref().unwrap_or(&self.config.model);
        match self.config.flavor {
            ApiFlavor::Anthropic => self.call_messages(request, model).await,
            ApiFlavor::OpenAi => self.call_chat_completions(request, model).await,
        }
    }
}

/// Resolve environment variable references in a string.
/// Supports `${ENV_VAR}` and `${ENV_VAR:-default}` syntax.
pub fn resolve_env_vars(input: &str) -> String {
    ENV_REF
        .replace_all(input, |caps: &regex::Captures| {
            let var_expr = &caps[1];
            if let Some(idx) = var_expr.find(":-") {
                let var_name = &var_expr[..idx];
                let default_val = &var_expr[idx + 2..];
                std::env::var(var_name).unwrap_or_else(|_| default_val.to_string())
            } else {
                std::env::var(var_expr).unwrap_or_else(|_| format!("${{{}}}", var_expr))
            }
        })
        .to_string()
}

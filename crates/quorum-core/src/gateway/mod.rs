//! Agent-runtime gateway — forwards chat requests to the external agent
//! runtime and fans verification prompts out to several of its agents.
//!
//! Runtimes expose their routes either at `/agents/*` or `/api/agents/*`;
//! `forward` tries both.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::EngineError;

pub const DEFAULT_VERIFY_AGENTS: &[&str] = &["ops", "assistant"];

#[derive(Clone)]
pub struct AgentRuntimeClient {
    client: reqwest::Client,
    base_url: String,
    secret: String,
}

impl AgentRuntimeClient {
    pub fn new(base_url: &str, secret: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            secret: secret.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_configured(&self) -> bool {
        !self.secret.is_empty()
    }

    /// POST `body` to `path`, then to `/api{path}` if the first answer is
    /// 404 or 405. Returns the first response that is a success or any
    /// other status; when both candidates are 404/405, the last one.
    pub async fn forward(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, EngineError> {
        if !self.is_configured() {
            return Err(EngineError::Gateway(
                "agent runtime secret is not configured".to_string(),
            ));
        }

        let candidates = [path.to_string(), format!("/api{}", path)];
        let mut fallback = None;

        for candidate in &candidates {
            let url = format!("{}{}", self.base_url, candidate);
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.secret)
                .json(body)
                .send()
                .await
                .map_err(|e| {
                    tracing::error!("[Gateway] Failed to reach {}: {}", url, e);
                    EngineError::Gateway(format!("failed to reach agent runtime: {}", e))
                })?;

            let status = response.status().as_u16();
            if response.status().is_success() || (status != 404 && status != 405) {
                tracing::debug!("[Gateway] {} -> {}", candidate, status);
                return Ok(response);
            }
            tracing::debug!("[Gateway] {} -> {}, trying next path", candidate, status);
            fallback = Some(response);
        }

        fallback.ok_or_else(|| EngineError::Gateway("no candidate path attempted".to_string()))
    }

    /// Ask one runtime agent for a text answer.
    pub async fn query_text(&self, agent_id: &str, input: &str) -> VerifyResult {
        let started = Instant::now();
        let body = serde_json::json!({ "input": input, "userId": "quorum-verify" });
        let elapsed = |started: Instant| started.elapsed().as_millis() as u64;

        let response = match self.forward(&format!("/agents/{}/text", agent_id), &body).await {
            Ok(response) => response,
            Err(e) => return VerifyResult::failed(agent_id, e.to_string(), elapsed(started)),
        };

        if !response.status().is_success() {
            let raw = response.text().await.unwrap_or_default();
            return VerifyResult::failed(agent_id, normalize_error_payload(&raw), elapsed(started));
        }

        match response.json::<serde_json::Value>().await {
            Ok(data) => VerifyResult {
                agent: agent_id.to_string(),
                response: extract_text(&data),
                duration_ms: elapsed(started),
                error: None,
            },
            Err(e) => VerifyResult::failed(agent_id, e.to_string(), elapsed(started)),
        }
    }

    /// Send the same input to every agent concurrently and compare answers.
    pub async fn verify(&self, input: &str, agents: &[String]) -> VerifyReport {
        let results =
            futures::future::join_all(agents.iter().map(|agent| self.query_text(agent, input))).await;

        let answers: Vec<&str> = results
            .iter()
            .filter(|r| r.error.is_none())
            .map(|r| r.response.as_str())
            .collect();
        let agreement = Agreement::from_responses(&answers);
        tracing::info!(
            "[Gateway] Verified across {} agent(s): {:?} agreement",
            results.len(),
            agreement
        );

        VerifyReport {
            input: input.to_string(),
            results,
            agreement,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResult {
    pub agent: String,
    pub response: String,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerifyResult {
    fn failed(agent: &str, error: String, duration_ms: u64) -> Self {
        Self {
            agent: agent.to_string(),
            response: String::new(),
            duration_ms,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Agreement {
    High,
    Medium,
    Low,
}

impl Agreement {
    /// Keyword overlap (words longer than four characters) between the
    /// first two answers. Fewer than two answers counts as high.
    pub fn from_responses(responses: &[&str]) -> Self {
        let [first, second, ..] = responses else {
            return Self::High;
        };

        let keywords = |text: &str| -> HashSet<String> {
            text.to_lowercase()
                .split_whitespace()
                .filter(|w| w.chars().count() > 4)
                .map(str::to_string)
                .collect()
        };
        let a = keywords(*first);
        let b = keywords(*second);
        let shared = a.intersection(&b).count();
        let overlap = shared as f64 / a.len().max(b.len()).max(1) as f64;

        if overlap < 0.2 {
            Self::Low
        } else if overlap < 0.4 {
            Self::Medium
        } else {
            Self::High
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub input: String,
    pub results: Vec<VerifyResult>,
    pub agreement: Agreement,
    pub timestamp: DateTime<Utc>,
}

/// Prefer `details`, then `error`, then `message` from a JSON error body;
/// anything else is returned unchanged.
pub fn normalize_error_payload(raw: &str) -> String {
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .and_then(|v| {
            ["details", "error", "message"].iter().find_map(|key| {
                v.get(*key)
                    .and_then(|f| f.as_str())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
        })
        .unwrap_or_else(|| raw.to_string())
}

fn extract_text(data: &serde_json::Value) -> String {
    ["text", "output", "message"]
        .iter()
        .find_map(|key| data.get(*key).and_then(|v| v.as_str()))
        .or_else(|| data.pointer("/data/text").and_then(|v| v.as_str()))
        .unwrap_or("")
        .to_string()
}

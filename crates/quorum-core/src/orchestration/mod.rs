//! Orchestrator — delegates one task to several specialists and folds
//! their answers into one.
//!
//! Per task:
//!   1. Gather context from read-only capabilities (`gather_context`)
//!   2. Pick the specialists whose competencies the task spans
//!   3. Fan out one `DelegationRequest` per specialist, concurrently
//!   4. Wait for every result, success or error
//!   5. Synthesize, attributing each contribution and naming failures
//!
//! `delegate` only accepts a `GatheredContext`, so step 1 cannot be skipped.
//! Each specialist sees only the context gathered from capabilities in its
//! own `capabilities` list. Specialists are plain `Specialist`s and cannot
//! delegate further, so every request is issued at depth 1.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;

use crate::agents::{Agent, AgentOutput, AgentWarning, Specialist};
use crate::error::{DelegationFailure, EngineError};
use crate::tools::{CapabilityInfo, CapabilityRegistry, ToolResult};
use crate::workflow::agent_caller::{AgentCaller, AgentRequest};
use crate::workflow::specialist::SpecialistDef;

const SYNTHESIS_SYSTEM_PROMPT: &str = "You merge answers from several specialists into one \
response. Keep every concrete item, resolve contradictions explicitly, and attribute each \
contribution to the specialist that made it.";

// ─── Context gathering ────────────────────────────────────────────────────

/// A read-only capability call made before any delegation.
#[derive(Debug, Clone)]
pub struct ContextCall {
    pub capability: String,
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextEntry {
    pub capability: String,
    pub args: serde_json::Value,
    pub result: ToolResult,
}

/// Proof that context gathering ran. Only `Orchestrator::gather_context`
/// constructs one.
#[derive(Debug, Clone)]
pub struct GatheredContext {
    entries: Vec<ContextEntry>,
}

impl GatheredContext {
    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    /// Successful results from the capabilities `granted` accepts, rendered
    /// for inclusion in a delegation prompt.
    pub fn render(&self, granted: impl Fn(&str) -> bool) -> String {
        self.entries
            .iter()
            .filter(|e| e.result.success && granted(&e.capability))
            .map(|e| {
                let data = e.result.data.clone().unwrap_or_default();
                let body = match data {
                    serde_json::Value::String(s) => s,
                    other => serde_json::to_string_pretty(&other).unwrap_or_default(),
                };
                format!("### {} {}\n{}", e.capability, e.args, body)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn warnings(&self) -> Vec<AgentWarning> {
        self.entries
            .iter()
            .filter(|e| !e.result.success)
            .map(|e| AgentWarning {
                kind: "ContextGatheringFailure".to_string(),
                message: format!(
                    "context capability '{}' failed: {}",
                    e.capability,
                    e.result.error.as_deref().unwrap_or("unknown error")
                ),
                details: serde_json::json!({ "capability": e.capability, "args": e.args }),
            })
            .collect()
    }
}

// ─── Delegation ───────────────────────────────────────────────────────────

/// One task for one specialist. `depth` counts hops from the orchestrator.
#[derive(Debug, Clone)]
pub struct DelegationRequest {
    pub agent: String,
    pub task: String,
    pub depth: u8,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationResult {
    pub agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DelegationResult {
    pub fn is_usable(&self) -> bool {
        self.error.is_none() && self.output.as_deref().is_some_and(|o| !o.trim().is_empty())
    }
}

/// The folded answer for one task.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub text: String,
    pub contributors: Vec<String>,
    pub failures: Vec<DelegationFailure>,
    pub warnings: Vec<AgentWarning>,
}

// ─── Orchestrator ─────────────────────────────────────────────────────────

pub struct Orchestrator {
    name: String,
    roster: Vec<Arc<Specialist>>,
    capabilities: Arc<CapabilityRegistry>,
    context_calls: Vec<ContextCall>,
    synthesizer: Option<Arc<dyn AgentCaller>>,
    timeout: Option<Duration>,
}

pub struct OrchestratorBuilder {
    name: String,
    roster: Vec<Arc<Specialist>>,
    capabilities: Arc<CapabilityRegistry>,
    context_calls: Vec<ContextCall>,
    synthesizer: Option<Arc<dyn AgentCaller>>,
    timeout: Option<Duration>,
}

impl OrchestratorBuilder {
    pub fn specialist(mut self, specialist: Specialist) -> Self {
        self.roster.push(Arc::new(specialist));
        self
    }

    pub fn roster(mut self, specialists: impl IntoIterator<Item = Specialist>) -> Self {
        self.roster.extend(specialists.into_iter().map(Arc::new));
        self
    }

    pub fn capabilities(mut self, capabilities: Arc<CapabilityRegistry>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn context_call(mut self, capability: &str, args: serde_json::Value) -> Self {
        self.context_calls.push(ContextCall {
            capability: capability.to_string(),
            args,
        });
        self
    }

    /// Caller used to merge multiple answers. Without one, answers are
    /// concatenated with attribution headers.
    pub fn synthesizer(mut self, caller: Arc<dyn AgentCaller>) -> Self {
        self.synthesizer = Some(caller);
        self
    }

    /// Per-specialist time limit; a timeout counts as that specialist failing.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<Orchestrator, EngineError> {
        if self.roster.is_empty() {
            return Err(EngineError::InvariantViolation(format!(
                "orchestrator '{}' has no specialists",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for specialist in &self.roster {
            if !seen.insert(specialist.id().to_string()) {
                return Err(EngineError::InvariantViolation(format!(
                    "orchestrator '{}' lists specialist '{}' twice",
                    self.name,
                    specialist.id()
                )));
            }
        }

        for specialist in &self.roster {
            if let Some(unknown) = specialist
                .def()
                .capabilities
                .iter()
                .find(|name| !self.capabilities.contains(name))
            {
                return Err(EngineError::InvariantViolation(format!(
                    "specialist '{}' lists unregistered capability '{}'",
                    specialist.id(),
                    unknown
                )));
            }
        }

        for call in &self.context_calls {
            match self.capabilities.get(&call.capability) {
                Some(cap) if cap.read_only() => {}
                Some(_) => {
                    return Err(EngineError::InvariantViolation(format!(
                        "context capability '{}' is not read-only",
                        call.capability
                    )))
                }
                None => {
                    return Err(EngineError::InvariantViolation(format!(
                        "context capability '{}' is not registered",
                        call.capability
                    )))
                }
            }
        }

        Ok(Orchestrator {
            name: self.name,
            roster: self.roster,
            capabilities: self.capabilities,
            context_calls: self.context_calls,
            synthesizer: self.synthesizer,
            timeout: self.timeout,
        })
    }
}

impl Orchestrator {
    pub fn builder(name: &str) -> OrchestratorBuilder {
        OrchestratorBuilder {
            name: name.to_string(),
            roster: Vec::new(),
            capabilities: Arc::new(CapabilityRegistry::new()),
            context_calls: Vec::new(),
            synthesizer: None,
            timeout: None,
        }
    }

    pub fn specialists(&self) -> impl Iterator<Item = &SpecialistDef> {
        self.roster.iter().map(|s| s.def())
    }

    /// Run every configured context call, in order. Failed calls are kept
    /// and later surfaced as warnings; they do not stop delegation.
    pub async fn gather_context(&self) -> GatheredContext {
        let mut entries = Vec::with_capacity(self.context_calls.len());
        for call in &self.context_calls {
            let result = self.capabilities.call(&call.capability, call.args.clone()).await;
            if !result.success {
                tracing::warn!(
                    "[Orchestrator] {} context call {} failed: {:?}",
                    self.name,
                    call.capability,
                    result.error
                );
            }
            entries.push(ContextEntry {
                capability: call.capability.clone(),
                args: call.args.clone(),
                result,
            });
        }
        GatheredContext { entries }
    }

    /// Specialists whose competencies appear in the task, or the whole
    /// roster when none match.
    pub fn select(&self, task: &str) -> Vec<Arc<Specialist>> {
        let matched: Vec<_> = self
            .roster
            .iter()
            .filter(|s| s.def().covers(task))
            .cloned()
            .collect();
        if matched.is_empty() {
            self.roster.clone()
        } else {
            matched
        }
    }

    /// Resolve an explicit target list against the roster.
    pub fn select_targets(&self, ids: &[&str]) -> Result<Vec<Arc<Specialist>>, EngineError> {
        ids.iter()
            .map(|id| {
                self.roster
                    .iter()
                    .find(|s| s.id() == *id)
                    .cloned()
                    .ok_or_else(|| EngineError::NotFound(format!("specialist '{}'", id)))
            })
            .collect()
    }

    /// One request per target, each scoped to that specialist's
    /// capability subset.
    pub fn requests(
        &self,
        context: &GatheredContext,
        task: &str,
        targets: &[Arc<Specialist>],
    ) -> Vec<DelegationRequest> {
        targets
            .iter()
            .map(|s| {
                let granted: Vec<CapabilityInfo> = s
                    .def()
                    .capabilities
                    .iter()
                    .filter_map(|name| self.capabilities.get(name))
                    .map(|c| CapabilityInfo {
                        name: c.name().to_string(),
                        description: c.description().to_string(),
                        read_only: c.read_only(),
                    })
                    .collect();
                let rendered = context.render(|name| granted.iter().any(|g| g.name == name));
                DelegationRequest {
                    agent: s.id().to_string(),
                    task: build_delegation_prompt(s.def(), task, &rendered, &granted, targets.len()),
                    depth: 1,
                }
            })
            .collect()
    }

    /// Fan out to `targets` concurrently and wait for all of them.
    pub async fn delegate(
        &self,
        context: &GatheredContext,
        task: &str,
        targets: &[Arc<Specialist>],
    ) -> Result<Vec<DelegationResult>, EngineError> {
        let requests = self.requests(context, task, targets);

        tracing::info!(
            "[Orchestrator] {} delegating to {} specialist(s): {}",
            self.name,
            requests.len(),
            requests
                .iter()
                .map(|r| r.agent.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let handles: Vec<_> = targets
            .iter()
            .cloned()
            .zip(requests)
            .map(|(specialist, request)| {
                let timeout = self.timeout;
                tokio::spawn(async move {
                    let started = Instant::now();
                    let outcome = match timeout {
                        Some(limit) => {
                            match tokio::time::timeout(limit, specialist.generate(&request.task)).await {
                                Ok(result) => result.map_err(|e| e.to_string()),
                                Err(_) => Err(format!("timed out after {:?}", limit)),
                            }
                        }
                        None => specialist
                            .generate(&request.task)
                            .await
                            .map_err(|e| e.to_string()),
                    };
                    let duration_ms = started.elapsed().as_millis() as u64;
                    match outcome {
                        Ok(output) => DelegationResult {
                            agent: request.agent,
                            output: Some(output.text),
                            duration_ms,
                            error: None,
                        },
                        Err(error) => DelegationResult {
                            agent: request.agent,
                            output: None,
                            duration_ms,
                            error: Some(error),
                        },
                    }
                })
            })
            .collect();

        let ids: Vec<String> = targets.iter().map(|s| s.id().to_string()).collect();
        let joined = futures::future::join_all(handles).await;

        Ok(joined
            .into_iter()
            .zip(ids)
            .map(|(joined, agent)| {
                joined.unwrap_or_else(|e| DelegationResult {
                    agent,
                    output: None,
                    duration_ms: 0,
                    error: Some(format!("specialist task aborted: {}", e)),
                })
            })
            .collect())
    }

    /// Fold all results into one answer.
    pub async fn synthesize(
        &self,
        task: &str,
        results: Vec<DelegationResult>,
    ) -> Result<Synthesis, EngineError> {
        let (usable, failed): (Vec<_>, Vec<_>) = results.into_iter().partition(|r| r.is_usable());

        let failures: Vec<DelegationFailure> = failed
            .into_iter()
            .map(|r| DelegationFailure {
                error: r.error.unwrap_or_else(|| "empty output".to_string()),
                agent: r.agent,
            })
            .collect();

        if usable.is_empty() {
            tracing::error!(
                "[Orchestrator] {}: every specialist failed ({})",
                self.name,
                failures.len()
            );
            return Err(EngineError::DelegationTotalFailure { failures });
        }

        let contributions: Vec<(String, String)> = usable
            .into_iter()
            .map(|r| (r.agent, r.output.unwrap_or_default()))
            .collect();
        let contributors: Vec<String> = contributions.iter().map(|(a, _)| a.clone()).collect();

        let mut warnings = Vec::new();
        let mut text = match contributions.as_slice() {
            [(_, only)] => only.clone(),
            _ => match self.merge(task, &contributions).await {
                Ok(merged) => merged,
                Err(e) => {
                    tracing::warn!(
                        "[Orchestrator] {} synthesizer failed, concatenating: {}",
                        self.name,
                        e
                    );
                    warnings.push(AgentWarning {
                        kind: "SynthesisFallback".to_string(),
                        message: format!("synthesizer unavailable: {}", e),
                        details: serde_json::Value::Null,
                    });
                    attributed_sections(&contributions)
                }
            },
        };

        if !failures.is_empty() {
            tracing::warn!(
                "[Orchestrator] {}: {} of {} specialist(s) failed",
                self.name,
                failures.len(),
                failures.len() + contributors.len()
            );
            text.push_str("\n\n---\nNot included (specialist failures): ");
            text.push_str(
                &failures
                    .iter()
                    .map(|f| format!("{} ({})", f.agent, f.error))
                    .collect::<Vec<_>>()
                    .join("; "),
            );
            warnings.extend(failures.iter().map(|f| AgentWarning {
                kind: "DelegationPartialFailure".to_string(),
                message: format!("specialist '{}' failed: {}", f.agent, f.error),
                details: serde_json::json!({ "agent": f.agent, "error": f.error }),
            }));
        }

        Ok(Synthesis {
            text,
            contributors,
            failures,
            warnings,
        })
    }

    async fn merge(&self, task: &str, contributions: &[(String, String)]) -> Result<String, String> {
        let Some(caller) = &self.synthesizer else {
            return Ok(attributed_sections(contributions));
        };

        let prompt = format!(
            "Task:\n{}\n\nSpecialist answers:\n\n{}\n\nProduce the final answer to the task. \
             Attribute contributions by specialist name.",
            task,
            attributed_sections(contributions)
        );
        let response = caller
            .call(&AgentRequest::new(SYNTHESIS_SYSTEM_PROMPT, prompt))
            .await?;
        if response.content.trim().is_empty() {
            return Err("synthesizer returned an empty response".to_string());
        }
        Ok(response.content)
    }

    /// Gather, select, delegate and synthesize.
    pub async fn run_task(&self, task: &str) -> Result<Synthesis, EngineError> {
        let context = self.gather_context().await;
        let targets = self.select(task);
        let results = self.delegate(&context, task, &targets).await?;
        let mut synthesis = self.synthesize(task, results).await?;
        let mut warnings = context.warnings();
        warnings.append(&mut synthesis.warnings);
        synthesis.warnings = warnings;
        Ok(synthesis)
    }
}

#[async_trait]
impl Agent for Orchestrator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<AgentOutput, EngineError> {
        let synthesis = self.run_task(prompt).await?;
        Ok(AgentOutput {
            text: synthesis.text,
            warnings: synthesis.warnings,
        })
    }
}

fn attributed_sections(contributions: &[(String, String)]) -> String {
    contributions
        .iter()
        .map(|(agent, output)| format!("## From {}\n{}", agent, output.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn build_delegation_prompt(
    specialist: &SpecialistDef,
    task: &str,
    context: &str,
    capabilities: &[CapabilityInfo],
    roster_size: usize,
) -> String {
    let mut prompt = String::new();
    if !context.is_empty() {
        prompt.push_str("## Context\n");
        prompt.push_str(context);
        prompt.push_str("\n\n");
    }
    if !capabilities.is_empty() {
        prompt.push_str("## Capabilities\n");
        for cap in capabilities {
            let access = if cap.read_only { "read-only" } else { "read-write" };
            prompt.push_str(&format!("- {} ({}): {}\n", cap.name, access, cap.description));
        }
        prompt.push('\n');
    }
    prompt.push_str("## Task\n");
    prompt.push_str(task);
    prompt.push_str("\n\n## Scope\n");
    if roster_size > 1 {
        prompt.push_str(&format!(
            "You are one of {} specialists working on this task. ",
            roster_size
        ));
    }
    if specialist.competencies.is_empty() {
        prompt.push_str("Answer from your own area of expertise.");
    } else {
        prompt.push_str(&format!(
            "Answer only the parts within your competencies: {}.",
            specialist.competencies.join(", ")
        ));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{FnCapability, StaticCapability};
    use crate::workflow::agent_caller::AgentResponse;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Replies with a fixed string, or fails if the reply is `Err`.
    struct Fixed(Result<&'static str, &'static str>);

    #[async_trait]
    impl AgentCaller for Fixed {
        async fn call(&self, _request: &AgentRequest) -> Result<AgentResponse, String> {
            self.0
                .map(|content| AgentResponse {
                    content: content.to_string(),
                    model: "test".to_string(),
                    usage: None,
                })
                .map_err(str::to_string)
        }
    }

    struct Capture(Mutex<Vec<String>>);

    #[async_trait]
    impl AgentCaller for Capture {
        async fn call(&self, request: &AgentRequest) -> Result<AgentResponse, String> {
            self.0.lock().unwrap().push(request.user_prompt.clone());
            Ok(AgentResponse {
                content: "ok".to_string(),
                model: "test".to_string(),
                usage: None,
            })
        }
    }

    fn def(id: &str, competencies: &[&str]) -> SpecialistDef {
        SpecialistDef {
            id: id.to_string(),
            name: id.to_string(),
            description: None,
            competencies: competencies.iter().map(|s| s.to_string()).collect(),
            capabilities: Vec::new(),
            system_prompt: format!("You are {}", id),
            role_reminder: None,
            default_model: None,
        }
    }

    fn granted(id: &str, capabilities: &[&str]) -> SpecialistDef {
        SpecialistDef {
            capabilities: capabilities.iter().map(|s| s.to_string()).collect(),
            ..def(id, &[])
        }
    }

    fn specialist(id: &str, reply: Result<&'static str, &'static str>) -> Specialist {
        Specialist::new(def(id, &[]), Arc::new(Fixed(reply)))
    }

    #[test]
    fn test_build_rejects_writable_context_capability() {
        let mut registry = CapabilityRegistry::new();
        registry.register(FnCapability::new("crm_add_note", "", false, |_| async {
            ToolResult::success("saved")
        }));
        let err = Orchestrator::builder("ops")
            .specialist(specialist("a", Ok("x")))
            .capabilities(Arc::new(registry))
            .context_call("crm_add_note", serde_json::json!({}))
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("not read-only"));
    }

    #[test]
    fn test_build_rejects_unregistered_specialist_capability() {
        let err = Orchestrator::builder("ops")
            .specialist(Specialist::new(granted("scout", &["crm_query"]), Arc::new(Fixed(Ok("x")))))
            .build()
            .err()
            .unwrap();
        assert_eq!(err.kind(), "InvariantViolation");
        assert!(err.to_string().contains("'crm_query'"));
    }

    #[test]
    fn test_build_rejects_empty_and_duplicate_roster() {
        assert!(Orchestrator::builder("ops").build().is_err());
        assert!(Orchestrator::builder("ops")
            .specialist(specialist("a", Ok("x")))
            .specialist(specialist("a", Ok("y")))
            .build()
            .is_err());
    }

    #[test]
    fn test_select_by_competency_with_fallback() {
        let orchestrator = Orchestrator::builder("ops")
            .specialist(Specialist::new(def("scout", &["grant"]), Arc::new(Fixed(Ok("x")))))
            .specialist(Specialist::new(def("seo", &["keyword"]), Arc::new(Fixed(Ok("x")))))
            .build()
            .unwrap();

        let picked: Vec<_> = orchestrator
            .select("find a grant")
            .iter()
            .map(|s| s.id().to_string())
            .collect();
        assert_eq!(picked, vec!["scout"]);
        assert_eq!(orchestrator.select("something unrelated").len(), 2);
        assert!(orchestrator.select_targets(&["ghost"]).is_err());
    }

    #[tokio::test]
    async fn test_one_failure_is_named_in_synthesis() {
        let orchestrator = Orchestrator::builder("ops")
            .specialist(specialist("funding-scout", Ok("Apply to NSF SBIR")))
            .specialist(specialist("board-recruiter", Err("rate limited")))
            .specialist(specialist("seo-strategist", Ok("Target 'kinetic equity'")))
            .build()
            .unwrap();

        let synthesis = orchestrator.run_task("Plan the quarter").await.unwrap();
        assert!(synthesis.text.contains("## From funding-scout"));
        assert!(synthesis.text.contains("## From seo-strategist"));
        assert!(synthesis.text.contains("board-recruiter"));
        assert!(synthesis.text.contains("rate limited"));
        assert_eq!(synthesis.contributors.len(), 2);
        assert_eq!(synthesis.failures[0].agent, "board-recruiter");
        assert_eq!(synthesis.warnings[0].kind, "DelegationPartialFailure");
    }

    #[tokio::test]
    async fn test_total_failure() {
        let orchestrator = Orchestrator::builder("ops")
            .specialist(specialist("a", Err("down")))
            .specialist(specialist("b", Err("down")))
            .build()
            .unwrap();

        let err = orchestrator.generate("anything").await.unwrap_err();
        let EngineError::DelegationTotalFailure { failures } = err else {
            panic!("expected DelegationTotalFailure");
        };
        assert_eq!(failures.len(), 2);
    }

    #[tokio::test]
    async fn test_synthesizer_merges_and_falls_back() {
        let merged = Orchestrator::builder("ops")
            .specialist(specialist("a", Ok("alpha")))
            .specialist(specialist("b", Ok("beta")))
            .synthesizer(Arc::new(Fixed(Ok("alpha and beta, merged"))))
            .build()
            .unwrap();
        assert_eq!(merged.generate("t").await.unwrap().text, "alpha and beta, merged");

        let fallback = Orchestrator::builder("ops")
            .specialist(specialist("a", Ok("alpha")))
            .specialist(specialist("b", Ok("beta")))
            .synthesizer(Arc::new(Fixed(Err("synth down"))))
            .build()
            .unwrap();
        let output = fallback.generate("t").await.unwrap();
        assert!(output.text.contains("## From a\nalpha"));
        assert_eq!(output.warnings[0].kind, "SynthesisFallback");
    }

    #[tokio::test]
    async fn test_context_reaches_specialists() {
        let mut sections = BTreeMap::new();
        sections.insert("roadmap".to_string(), serde_json::json!("Launch pilot in May"));
        let mut registry = CapabilityRegistry::new();
        registry.register(StaticCapability::new("ops_intel", "", sections));

        let capture = Arc::new(Capture(Mutex::new(Vec::new())));
        let orchestrator = Orchestrator::builder("ops")
            .specialist(Specialist::new(granted("a", &["ops_intel"]), capture.clone()))
            .capabilities(Arc::new(registry))
            .context_call("ops_intel", serde_json::json!({ "section": "roadmap" }))
            .build()
            .unwrap();

        orchestrator.generate("Plan").await.unwrap();
        let prompts = capture.0.lock().unwrap();
        assert!(prompts[0].contains("Launch pilot in May"));
        assert!(prompts[0].contains("## Task\nPlan"));
    }

    #[tokio::test]
    async fn test_requests_are_scoped_to_each_specialists_capabilities() {
        let mut sections = BTreeMap::new();
        sections.insert("roadmap".to_string(), serde_json::json!("Launch pilot in May"));
        let mut registry = CapabilityRegistry::new();
        registry.register(StaticCapability::new("ops_intel", "Ops notes", sections));
        registry.register(FnCapability::new("crm_query", "Contact pipeline", true, |_| async {
            ToolResult::success(serde_json::json!({ "contacts": ["Ada Foundation"] }))
        }));

        let orchestrator = Orchestrator::builder("ops")
            .specialist(Specialist::new(
                granted("scout", &["crm_query", "ops_intel"]),
                Arc::new(Fixed(Ok("x"))),
            ))
            .specialist(Specialist::new(granted("seo", &["ops_intel"]), Arc::new(Fixed(Ok("x")))))
            .specialist(Specialist::new(granted("writer", &[]), Arc::new(Fixed(Ok("x")))))
            .capabilities(Arc::new(registry))
            .context_call("ops_intel", serde_json::json!({ "section": "roadmap" }))
            .context_call("crm_query", serde_json::json!({}))
            .build()
            .unwrap();

        let context = orchestrator.gather_context().await;
        let targets = orchestrator.select("anything");
        let requests = orchestrator.requests(&context, "Plan", &targets);
        assert!(requests.iter().all(|r| r.depth == 1));

        let scout = &requests[0].task;
        assert!(scout.contains("Ada Foundation"));
        assert!(scout.contains("Launch pilot in May"));
        assert!(scout.contains("- crm_query (read-only): Contact pipeline"));

        let seo = &requests[1].task;
        assert!(seo.contains("Launch pilot in May"));
        assert!(!seo.contains("Ada Foundation"));
        assert!(!seo.contains("crm_query"));

        let writer = &requests[2].task;
        assert!(!writer.contains("## Context"));
        assert!(!writer.contains("## Capabilities"));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        struct Slow;

        #[async_trait]
        impl AgentCaller for Slow {
            async fn call(&self, _request: &AgentRequest) -> Result<AgentResponse, String> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Err("unreachable".to_string())
            }
        }

        let orchestrator = Orchestrator::builder("ops")
            .specialist(specialist("fast", Ok("done")))
            .specialist(Specialist::new(def("slow", &[]), Arc::new(Slow)))
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap();

        let synthesis = orchestrator.run_task("t").await.unwrap();
        assert_eq!(synthesis.contributors, vec!["fast"]);
        assert_eq!(synthesis.failures[0].error, "timed out after 50ms");
    }
}

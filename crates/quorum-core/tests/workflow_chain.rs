//! End-to-end behavior of the built-in workflows against a real store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use quorum_core::agents::{Agent, AgentOutput, Specialist};
use quorum_core::flows::strategy_cycle::*;
use quorum_core::flows::{research_inquiry, research_inquiry::BOARD_REVIEW_REASON};
use quorum_core::models::ExecutionStatus;
use quorum_core::orchestration::Orchestrator;
use quorum_core::store::ExecutionStore;
use quorum_core::tools::{CapabilityRegistry, FnCapability, ToolResult};
use quorum_core::workflow::definition::{StepDefinition, WorkflowDefinition, WorkflowRegistry};
use quorum_core::workflow::agent_caller::{AgentCaller, AgentRequest, AgentResponse};
use quorum_core::workflow::shape::OutputSchema;
use quorum_core::workflow::specialist::SpecialistDef;
use quorum_core::workflow::step::StepOutcome;
use quorum_core::workflow::validated::{AgentStep, SchemaValidatedStep};
use quorum_core::{Database, EngineError, ExecutionResult, WorkflowEngine};

fn research_engine(db: Database) -> WorkflowEngine {
    let mut registry = WorkflowRegistry::new();
    registry.register(research_inquiry().unwrap()).unwrap();
    WorkflowEngine::new(registry, ExecutionStore::new(db))
}

fn inquiry(area: &str) -> Value {
    json!({
        "name": "Ada Byron",
        "email": "ada@example.org",
        "institution": "Analytical Society",
        "researchArea": area,
        "description": "Accessible transit routing"
    })
}

#[tokio::test]
async fn known_area_is_acknowledged_immediately() {
    let engine = research_engine(Database::open_in_memory().unwrap());
    let result = engine.run("research-inquiry", inquiry("sensory-safety")).await.unwrap();

    let ExecutionResult::Completed { result, .. } = result else {
        panic!("expected completion, got {:?}", result);
    };
    assert_eq!(result["status"], "acknowledged");
    assert_eq!(result["charterStandard"], "Grandin Standard");
    assert!(result["inquiryId"].as_str().unwrap().starts_with("INQ-"));
}

#[tokio::test]
async fn unclassified_area_waits_for_board_then_resumes() {
    let engine = research_engine(Database::open_in_memory().unwrap());
    let suspended = engine.run("research-inquiry", inquiry("other")).await.unwrap();

    let ExecutionResult::Suspended { execution_id, step_id, reason, state } = suspended else {
        panic!("expected suspension");
    };
    assert_eq!(step_id, "route-inquiry");
    assert_eq!(reason, BOARD_REVIEW_REASON);
    assert_eq!(state["institution"], "Analytical Society");

    let record = engine.get(&execution_id).await.unwrap().unwrap();
    assert_eq!(record.status, ExecutionStatus::Suspended);

    let resumed = engine
        .resume(&execution_id, json!({ "approved": true }))
        .await
        .unwrap();
    let ExecutionResult::Completed { result, .. } = resumed else {
        panic!("expected completion");
    };
    assert_eq!(result["status"], "acknowledged");
    assert!(result["message"].as_str().unwrap().contains("ada@example.org"));

    let record = engine.get(&execution_id).await.unwrap().unwrap();
    assert_eq!(record.status, ExecutionStatus::Completed);
    assert!(record.suspension.is_none());
}

#[tokio::test]
async fn rejected_inquiry_carries_reviewer_notes() {
    let engine = research_engine(Database::open_in_memory().unwrap());
    let id = engine
        .run("research-inquiry", inquiry("other"))
        .await
        .unwrap()
        .execution_id()
        .to_string();

    let resumed = engine
        .resume(&id, json!({ "approved": false, "reviewerNotes": "Out of scope." }))
        .await
        .unwrap();
    let ExecutionResult::Completed { result, .. } = resumed else {
        panic!("expected completion");
    };
    assert_eq!(result["status"], "rejected");
    assert!(result["message"].as_str().unwrap().ends_with("Out of scope."));
}

#[tokio::test]
async fn invalid_resume_payload_leaves_record_suspended() {
    let engine = research_engine(Database::open_in_memory().unwrap());
    let id = engine
        .run("research-inquiry", inquiry("other"))
        .await
        .unwrap()
        .execution_id()
        .to_string();
    let before = engine.get(&id).await.unwrap().unwrap();

    let err = engine.resume(&id, json!({ "approved": "yes" })).await.unwrap_err();
    assert_eq!(err.kind(), "InputValidationError");

    let after = engine.get(&id).await.unwrap().unwrap();
    assert_eq!(after.status, ExecutionStatus::Suspended);
    assert_eq!(after.suspension, before.suspension);
    assert_eq!(after.updated_at, before.updated_at);
}

#[tokio::test]
async fn second_resume_is_rejected() {
    let engine = research_engine(Database::open_in_memory().unwrap());
    let id = engine
        .run("research-inquiry", inquiry("other"))
        .await
        .unwrap()
        .execution_id()
        .to_string();

    engine.resume(&id, json!({ "approved": true })).await.unwrap();
    let err = engine.resume(&id, json!({ "approved": true })).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState { .. }));
}

#[tokio::test]
async fn concurrent_resumes_have_one_winner() {
    let engine = research_engine(Database::open_in_memory().unwrap());
    let id = engine
        .run("research-inquiry", inquiry("other"))
        .await
        .unwrap()
        .execution_id()
        .to_string();

    let (a, b) = tokio::join!(
        engine.resume(&id, json!({ "approved": true })),
        engine.resume(&id, json!({ "approved": false })),
    );
    let outcomes = [a.is_ok(), b.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
}

#[tokio::test]
async fn resume_survives_a_new_engine_over_the_same_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quorum.db");
    let path = path.to_str().unwrap();

    let id = {
        let engine = research_engine(Database::open(path).unwrap());
        engine
            .run("research-inquiry", inquiry("other"))
            .await
            .unwrap()
            .execution_id()
            .to_string()
    };

    let engine = research_engine(Database::open(path).unwrap());
    let resumed = engine.resume(&id, json!({ "approved": true })).await.unwrap();
    assert!(!resumed.is_suspended());
}

#[tokio::test]
async fn a_chain_can_pause_twice() {
    let approval = || {
        OutputSchema::new(
            "Approval",
            json!({
                "type": "object",
                "required": ["ok"],
                "properties": { "ok": { "type": "boolean" } }
            }),
        )
        .unwrap()
    };
    let gate = |key: &'static str| {
        move |ctx: quorum_core::workflow::step::StepContext| async move {
            match &ctx.resume_data {
                Some(payload) => {
                    let mut data = ctx.data.clone();
                    data[key] = payload["ok"].clone();
                    StepOutcome::Continue(data)
                }
                None => ctx.suspend(format!("{} sign-off", key), json!({})),
            }
        }
    };
    let workflow = WorkflowDefinition::builder("two-gates", "Two gates")
        .input(OutputSchema::new("In", json!({ "type": "object" })).unwrap())
        .result(
            OutputSchema::new(
                "Out",
                json!({ "type": "object", "required": ["legal", "finance"] }),
            )
            .unwrap(),
        )
        .then(StepDefinition::suspendable("legal", approval(), gate("legal")))
        .then(StepDefinition::suspendable("finance", approval(), gate("finance")))
        .build()
        .unwrap();
    let mut registry = WorkflowRegistry::new();
    registry.register(workflow).unwrap();
    let engine = WorkflowEngine::new(
        registry,
        ExecutionStore::new(Database::open_in_memory().unwrap()),
    );

    let first = engine.run("two-gates", json!({})).await.unwrap();
    let id = first.execution_id().to_string();
    let ExecutionResult::Suspended { step_id, .. } = first else {
        panic!("expected first pause");
    };
    assert_eq!(step_id, "legal");

    let second = engine.resume(&id, json!({ "ok": true })).await.unwrap();
    let ExecutionResult::Suspended { step_id, .. } = second else {
        panic!("expected second pause");
    };
    assert_eq!(step_id, "finance");

    let done = engine.resume(&id, json!({ "ok": false })).await.unwrap();
    let ExecutionResult::Completed { result, .. } = done else {
        panic!("expected completion");
    };
    assert_eq!(result, json!({ "legal": true, "finance": false }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_resumes_cannot_reach_the_next_pause() {
    fn flag_shape(key: &str) -> OutputSchema {
        OutputSchema::new(
            key,
            json!({
                "type": "object",
                "required": [key],
                "properties": { key: { "type": "boolean" } }
            }),
        )
        .unwrap()
    }

    for _ in 0..20 {
        let foreign_payloads = Arc::new(AtomicUsize::new(0));
        let seen = foreign_payloads.clone();
        let workflow = WorkflowDefinition::builder("a-then-b", "A then B")
            .input(OutputSchema::new("In", json!({ "type": "object" })).unwrap())
            .result(OutputSchema::new("Out", json!({ "type": "object" })).unwrap())
            .then(StepDefinition::suspendable("a", flag_shape("a"), |ctx| async move {
                match &ctx.resume_data {
                    Some(_) => StepOutcome::Continue(ctx.data.clone()),
                    None => ctx.suspend("need a", json!({})),
                }
            }))
            .then(StepDefinition::suspendable("b", flag_shape("b"), move |ctx| {
                let seen = seen.clone();
                async move {
                    match &ctx.resume_data {
                        Some(payload) => {
                            if payload.get("b").is_none() {
                                seen.fetch_add(1, Ordering::SeqCst);
                            }
                            StepOutcome::Continue(ctx.data.clone())
                        }
                        None => ctx.suspend("need b", json!({})),
                    }
                }
            }))
            .build()
            .unwrap();
        let mut registry = WorkflowRegistry::new();
        registry.register(workflow).unwrap();
        let engine = WorkflowEngine::new(
            registry,
            ExecutionStore::new(Database::open_in_memory().unwrap()),
        );

        let id = engine
            .run("a-then-b", json!({}))
            .await
            .unwrap()
            .execution_id()
            .to_string();

        let (first, second) = tokio::join!(
            tokio::spawn({
                let engine = engine.clone();
                let id = id.clone();
                async move { engine.resume(&id, json!({ "a": true })).await }
            }),
            tokio::spawn({
                let engine = engine.clone();
                let id = id.clone();
                async move { engine.resume(&id, json!({ "a": true })).await }
            }),
        );
        let outcomes = [first.unwrap(), second.unwrap()];

        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, EngineError::InvalidState { .. })));
        assert_eq!(foreign_payloads.load(Ordering::SeqCst), 0);

        let record = engine.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, ExecutionStatus::Suspended);
        assert_eq!(record.suspension.unwrap().step_id, "b");
    }
}

// ─── Orchestrated agent step ──────────────────────────────────────────────

struct Replies(Result<&'static str, &'static str>);

#[async_trait]
impl AgentCaller for Replies {
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

fn roster_member(id: &str, reply: Result<&'static str, &'static str>) -> Specialist {
    let def = SpecialistDef {
        id: id.to_string(),
        name: id.to_string(),
        description: None,
        competencies: vec![],
        capabilities: vec![],
        system_prompt: format!("You are {}", id),
        role_reminder: None,
        default_model: None,
    };
    Specialist::new(def, Arc::new(Replies(reply)))
}

#[tokio::test]
async fn one_failed_specialist_still_completes_with_a_recorded_warning() {
    let orchestrator = Orchestrator::builder("ops")
        .specialist(roster_member("funding-scout", Ok(r#"{"summary": "Apply to the NSF SBIR"}"#)))
        .specialist(roster_member("board-recruiter", Err("rate limited")))
        .build()
        .unwrap();
    let brief = OutputSchema::new(
        "Brief",
        json!({
            "type": "object",
            "required": ["summary"],
            "properties": { "summary": { "type": "string" } }
        }),
    )
    .unwrap();
    let workflow = WorkflowDefinition::builder("ops-brief", "Ops brief")
        .input(OutputSchema::new("In", json!({ "type": "object" })).unwrap())
        .result(brief.clone())
        .then(StepDefinition::agent(
            "brief",
            AgentStep::from_template(
                SchemaValidatedStep::new(Arc::new(orchestrator), brief).with_max_retries(0),
                "Brief the team on ${topic}",
            ),
        ))
        .build()
        .unwrap();
    let mut registry = WorkflowRegistry::new();
    registry.register(workflow).unwrap();
    let engine = WorkflowEngine::new(
        registry,
        ExecutionStore::new(Database::open_in_memory().unwrap()),
    );

    let result = engine.run("ops-brief", json!({ "topic": "funding" })).await.unwrap();
    let ExecutionResult::Completed { execution_id, result, warnings } = result else {
        panic!("expected completion, got {:?}", result);
    };
    assert_eq!(result["summary"], "Apply to the NSF SBIR");
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, "DelegationPartialFailure");
    assert_eq!(warnings[0].step_id, "brief");
    assert!(warnings[0].message.contains("board-recruiter"));
    assert_eq!(warnings[0].details["error"], "rate limited");

    let record = engine.get(&execution_id).await.unwrap().unwrap();
    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(record.warnings, warnings);
}

// ─── Strategy cycle ───────────────────────────────────────────────────────

struct ScriptedPlanner {
    replies: Vec<String>,
    calls: AtomicUsize,
}

impl ScriptedPlanner {
    fn new(replies: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            replies,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for ScriptedPlanner {
    fn name(&self) -> &str {
        "scripted-planner"
    }

    async fn generate(&self, prompt: &str) -> Result<AgentOutput, EngineError> {
        assert!(prompt.contains("totalContacts"));
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.replies.get(n).or(self.replies.last()).cloned().unwrap_or_default();
        Ok(AgentOutput::text(reply))
    }
}

fn crm() -> Arc<CapabilityRegistry> {
    let mut registry = CapabilityRegistry::new();
    registry.register(FnCapability::new("crm_query", "CRM contacts", true, |_| async {
        ToolResult::success(json!({
            "contacts": [
                { "stage": "identified", "type": "grant", "priority": 1 },
                { "stage": "committed", "type": "foundation", "priority": 2 }
            ]
        }))
    }));
    Arc::new(registry)
}

fn piece(i: usize) -> ContentPiece {
    ContentPiece {
        working_title: format!("Piece {}", i),
        content_type: ContentType::Explainer,
        audience: "funders".into(),
        key_thesis: "Access is infrastructure".into(),
        main_sections: vec!["Problem".into(), "Evidence".into(), "Proposal".into()],
        search_entity_targets: vec!["accessibility standards".into()],
        authority_and_seo_rationale: "Owns the term".into(),
        effort_probability: EffortProbability::Balanced,
        verification_status: VerificationStatus::Verified,
        verification_checklist: vec![],
    }
}

fn valid_plan() -> StrategyCycleResult {
    StrategyCycleResult {
        cycle_summary: "Focus on two grant deadlines".into(),
        crm_pipeline_summary: Default::default(),
        funding_pipeline: (0..5)
            .map(|i| FundingLead {
                name: format!("Fund {}", i),
                funding_type: FundingType::Grant,
                thematic_fit: "disability research".into(),
                location: "US".into(),
                amount_range: "$50k-$100k".into(),
                deadline: "TBD".into(),
                eligibility_notes: "501(c)(3)".into(),
                priority_score: 3,
                effort_probability: EffortProbability::LowEffortHighProbability,
                recommended_next_step: "Email program officer".into(),
                verification_status: VerificationStatus::NeedsVerification,
                verification_checklist: vec!["Confirm deadline".into()],
            })
            .collect(),
        board_advisor_pipeline: (0..5)
            .map(|i| BoardCandidate {
                name: format!("Candidate {}", i),
                role_type: BoardRoleType::Governance,
                current_role_org: "Nonprofit".into(),
                location: "EU".into(),
                expertise_tags: vec!["governance".into()],
                lived_experience: "Not disclosed".into(),
                potential_contribution: "Audit committee".into(),
                priority_score: 2,
                contact_path: ContactPath::IntroNeeded,
                key_risks_or_conflicts: "None known".into(),
                verification_status: VerificationStatus::Verified,
                verification_checklist: vec![],
            })
            .collect(),
        domain_ownership_map: (0..10)
            .map(|i| DomainConcept {
                concept: format!("Concept {}", i),
                description: "A measurable standard".into(),
                why_it_matters: "Procurement".into(),
                current_external_leaders_or_sources: vec!["W3C".into()],
                differentiator_angle: "Lived experience".into(),
                suggested_formats: vec!["brief".into()],
                verification_status: VerificationStatus::Verified,
                verification_checklist: vec![],
            })
            .collect(),
        thought_leadership_seo_plan: ContentPlan {
            pillar_pages: (0..3).map(piece).collect(),
            supporting_pieces: (0..5).map(piece).collect(),
            top_priority_pieces: (0..5).map(piece).collect(),
        },
        iteration_loop: IterationLoop {
            highest_leverage_next_actions: (0..3)
                .map(|i| ActionItem {
                    action: format!("Action {}", i),
                    owner: "founder".into(),
                    timeline: "this week".into(),
                    priority: Level::High,
                    effort_probability: EffortProbability::Balanced,
                })
                .collect(),
            missing_founder_information: vec![],
            risks_ethics_reputation: vec![],
        },
    }
}

fn strategy_engine(agent: Arc<dyn Agent>) -> WorkflowEngine {
    let mut registry = WorkflowRegistry::new();
    registry.register(strategy_cycle(agent, crm()).unwrap()).unwrap();
    WorkflowEngine::new(
        registry,
        ExecutionStore::new(Database::open_in_memory().unwrap()),
    )
}

#[tokio::test]
async fn strategy_cycle_recovers_after_one_bad_answer() {
    let valid = serde_json::to_string(&valid_plan()).unwrap();
    let planner = ScriptedPlanner::new(vec![
        "Here is my plan: funding looks promising.".to_string(),
        format!("```json\n{}\n```", valid),
    ]);
    let engine = strategy_engine(planner.clone());

    let result = engine
        .run(
            "strategy-cycle",
            json!({ "objective": "Grow funding pipeline", "cycleType": "weekly" }),
        )
        .await
        .unwrap();
    let ExecutionResult::Completed { result, .. } = result else {
        panic!("expected completion");
    };
    assert_eq!(planner.calls(), 2);
    assert_eq!(result["fundingPipeline"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn strategy_cycle_gives_up_after_three_attempts() {
    let planner = ScriptedPlanner::new(vec![r#"{"cycleSummary": "incomplete"}"#.to_string()]);
    let engine = strategy_engine(planner.clone());

    let err = engine
        .run(
            "strategy-cycle",
            json!({ "objective": "Grow funding pipeline", "cycleType": "sprint" }),
        )
        .await
        .unwrap_err();
    assert_eq!(planner.calls(), 3);

    let EngineError::ExecutionFailed { step_id, source } = &err else {
        panic!("expected a step failure, got {:?}", err);
    };
    assert_eq!(step_id, "plan-cycle");
    assert!(matches!(
        source.as_ref(),
        EngineError::SchemaValidationExhausted { attempts: 3, .. }
    ));

    let records = engine.list(Some("strategy-cycle")).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ExecutionStatus::Failed);
    let failure = records[0].error.as_ref().unwrap();
    assert_eq!(failure.kind, "SchemaValidationExhausted");
    assert_eq!(failure.step_id.as_deref(), Some("plan-cycle"));
}

#[tokio::test]
async fn strategy_cycle_requires_crm_capability() {
    let planner = ScriptedPlanner::new(vec![]);
    let mut registry = WorkflowRegistry::new();
    registry
        .register(strategy_cycle(planner.clone(), Arc::new(CapabilityRegistry::new())).unwrap())
        .unwrap();
    let engine = WorkflowEngine::new(
        registry,
        ExecutionStore::new(Database::open_in_memory().unwrap()),
    );

    let err = engine
        .run("strategy-cycle", json!({ "objective": "x", "cycleType": "weekly" }))
        .await
        .unwrap_err();
    assert_eq!(err.root_cause().kind(), "StepError");
    assert_eq!(planner.calls(), 0);
}

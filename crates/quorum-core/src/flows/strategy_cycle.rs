//! Strategy cycle: snapshot the CRM pipeline, then have the orchestrator
//! produce a schema-enforced plan (funding, board, domain map, content,
//! next actions).

use std::collections::BTreeMap;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::agents::Agent;
use crate::error::EngineError;
use crate::tools::CapabilityRegistry;
use crate::workflow::definition::{StepDefinition, WorkflowDefinition};
use crate::workflow::shape::OutputSchema;
use crate::workflow::step::{StepContext, StepOutcome};
use crate::workflow::validated::{AgentStep, SchemaValidatedStep};

pub const WORKFLOW_ID: &str = "strategy-cycle";
pub const CRM_QUERY: &str = "crm_query";
const MAX_RETRIES: u32 = 2;

// ─── Input ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CycleType {
    Weekly,
    Biweekly,
    Sprint,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PriorityFocus {
    Funding,
    BoardRecruitment,
    DomainIntelligence,
    Seo,
    ThoughtLeadership,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StrategyCycleInput {
    /// What the cycle should optimize for.
    pub objective: String,
    pub cycle_type: CycleType,
    #[serde(default = "default_horizon")]
    #[schemars(range(min = 7, max = 120))]
    pub planning_horizon_days: u32,
    #[serde(default = "default_geography")]
    pub geography_focus: Vec<String>,
    #[serde(default = "default_priorities")]
    pub priority_focus: Vec<PriorityFocus>,
}

fn default_horizon() -> u32 {
    30
}

fn default_geography() -> Vec<String> {
    vec!["US".to_string(), "EU".to_string(), "Global Online".to_string()]
}

fn default_priorities() -> Vec<PriorityFocus> {
    vec![
        PriorityFocus::Funding,
        PriorityFocus::ThoughtLeadership,
        PriorityFocus::Seo,
    ]
}

// ─── Result ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum EffortProbability {
    #[serde(rename = "low-effort/high-probability")]
    LowEffortHighProbability,
    #[serde(rename = "high-effort/low-probability")]
    HighEffortLowProbability,
    Balanced,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    NeedsVerification,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FundingType {
    Grant,
    Foundation,
    Corporate,
    ImpactInvestor,
    StrategicAlliance,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FundingLead {
    pub name: String,
    #[serde(rename = "type")]
    pub funding_type: FundingType,
    pub thematic_fit: String,
    pub location: String,
    pub amount_range: String,
    /// Absolute date when available, otherwise "TBD".
    pub deadline: String,
    pub eligibility_notes: String,
    #[schemars(range(min = 1, max = 5))]
    pub priority_score: u8,
    pub effort_probability: EffortProbability,
    pub recommended_next_step: String,
    pub verification_status: VerificationStatus,
    #[serde(default)]
    pub verification_checklist: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BoardRoleType {
    Governance,
    DomainExpert,
    Policy,
    Philanthropy,
    AiEsg,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ContactPath {
    Direct,
    IntroNeeded,
    ColdOutreach,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BoardCandidate {
    pub name: String,
    pub role_type: BoardRoleType,
    pub current_role_org: String,
    pub location: String,
    #[schemars(length(min = 1))]
    pub expertise_tags: Vec<String>,
    /// Only publicly disclosed information.
    pub lived_experience: String,
    pub potential_contribution: String,
    #[schemars(range(min = 1, max = 5))]
    pub priority_score: u8,
    pub contact_path: ContactPath,
    pub key_risks_or_conflicts: String,
    pub verification_status: VerificationStatus,
    #[serde(default)]
    pub verification_checklist: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DomainConcept {
    pub concept: String,
    pub description: String,
    pub why_it_matters: String,
    #[schemars(length(min = 1))]
    pub current_external_leaders_or_sources: Vec<String>,
    pub differentiator_angle: String,
    #[schemars(length(min = 1))]
    pub suggested_formats: Vec<String>,
    pub verification_status: VerificationStatus,
    #[serde(default)]
    pub verification_checklist: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    PillarPage,
    SupportingArticle,
    ResearchBrief,
    Explainer,
    WhitePaper,
    StandardsProposal,
    GlossaryTerm,
    Webinar,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContentPiece {
    pub working_title: String,
    pub content_type: ContentType,
    pub audience: String,
    pub key_thesis: String,
    #[schemars(length(min = 3))]
    pub main_sections: Vec<String>,
    #[schemars(length(min = 1))]
    pub search_entity_targets: Vec<String>,
    pub authority_and_seo_rationale: String,
    pub effort_probability: EffortProbability,
    pub verification_status: VerificationStatus,
    #[serde(default)]
    pub verification_checklist: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContentPlan {
    #[schemars(length(min = 3))]
    pub pillar_pages: Vec<ContentPiece>,
    #[schemars(length(min = 5))]
    pub supporting_pieces: Vec<ContentPiece>,
    #[schemars(length(min = 5, max = 10))]
    pub top_priority_pieces: Vec<ContentPiece>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActionItem {
    pub action: String,
    pub owner: String,
    pub timeline: String,
    pub priority: Level,
    pub effort_probability: EffortProbability,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RiskItem {
    pub risk: String,
    pub severity: Level,
    pub mitigation: String,
    pub needs_human_decision: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IterationLoop {
    #[schemars(length(min = 3, max = 5))]
    pub highest_leverage_next_actions: Vec<ActionItem>,
    #[serde(default)]
    pub missing_founder_information: Vec<String>,
    #[serde(default)]
    pub risks_ethics_reputation: Vec<RiskItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StrategyCycleResult {
    pub cycle_summary: String,
    #[serde(default)]
    pub crm_pipeline_summary: BTreeMap<String, u64>,
    #[schemars(length(min = 5))]
    pub funding_pipeline: Vec<FundingLead>,
    #[schemars(length(min = 5))]
    pub board_advisor_pipeline: Vec<BoardCandidate>,
    #[schemars(length(min = 10, max = 30))]
    pub domain_ownership_map: Vec<DomainConcept>,
    pub thought_leadership_seo_plan: ContentPlan,
    pub iteration_loop: IterationLoop,
}

// ─── Steps ────────────────────────────────────────────────────────────────

/// Stage/type counts over CRM contacts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSnapshot {
    pub total_contacts: usize,
    /// Priority 1-2 contacts not yet committed or declined.
    pub high_priority_open: usize,
    pub stage_summary: BTreeMap<String, usize>,
    pub type_summary: BTreeMap<String, usize>,
}

impl PipelineSnapshot {
    pub fn from_contacts(contacts: &[serde_json::Value]) -> Self {
        let mut snapshot = Self {
            total_contacts: contacts.len(),
            ..Self::default()
        };
        for contact in contacts {
            let stage = contact.get("stage").and_then(|v| v.as_str()).unwrap_or("unknown");
            let kind = contact.get("type").and_then(|v| v.as_str()).unwrap_or("unknown");
            *snapshot.stage_summary.entry(stage.to_string()).or_default() += 1;
            *snapshot.type_summary.entry(kind.to_string()).or_default() += 1;

            let priority = contact.get("priority").and_then(|v| v.as_u64()).unwrap_or(u64::MAX);
            if priority <= 2 && !matches!(stage, "committed" | "declined") {
                snapshot.high_priority_open += 1;
            }
        }
        snapshot
    }
}

async fn load_snapshot(capabilities: Arc<CapabilityRegistry>, ctx: StepContext) -> StepOutcome {
    if !capabilities.contains(CRM_QUERY) {
        return StepOutcome::fail(format!(
            "capability '{}' is required for the strategy cycle",
            CRM_QUERY
        ));
    }

    let data = match capabilities
        .call(CRM_QUERY, serde_json::json!({ "limit": 1000 }))
        .await
        .into_result(CRM_QUERY)
    {
        Ok(data) => data,
        Err(e) => return StepOutcome::Fail(e),
    };
    let contacts = data
        .get("contacts")
        .and_then(|c| c.as_array())
        .cloned()
        .unwrap_or_default();
    let snapshot = PipelineSnapshot::from_contacts(&contacts);

    let input: StrategyCycleInput = match serde_json::from_value(ctx.data) {
        Ok(input) => input,
        Err(e) => return StepOutcome::fail(format!("invalid cycle input: {}", e)),
    };
    let mut data = match serde_json::to_value(&input) {
        Ok(data) => data,
        Err(e) => return StepOutcome::fail(e.to_string()),
    };
    data["pipelineSnapshot"] = serde_json::to_value(&snapshot).unwrap_or_default();
    StepOutcome::Continue(data)
}

fn cycle_prompt(data: &serde_json::Value) -> String {
    let list = |key: &str| {
        data.get(key)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default()
    };
    let text = |key: &str| data.get(key).map(|v| match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    });

    format!(
        "Run one {cycle} operations cycle.\n\n\
         Objective:\n{objective}\n\n\
         Planning horizon:\n{horizon} days\n\n\
         Geography focus:\n{geography}\n\n\
         Priority focus:\n{priorities}\n\n\
         Live CRM pipeline snapshot (must use this):\n{snapshot}\n\n\
         Required process:\n\
         1. Cover funding, board/advisor recruitment, domain intelligence, and SEO/thought leadership.\n\
         2. Never fabricate people, grants, or organizations.\n\
         3. If any entry is uncertain, set verificationStatus=needs_verification and list specific \
         verificationChecklist items.\n\
         4. Prefer absolute dates and concrete next actions.",
        cycle = text("cycleType").unwrap_or_default(),
        objective = text("objective").unwrap_or_default(),
        horizon = text("planningHorizonDays").unwrap_or_default(),
        geography = list("geographyFocus"),
        priorities = list("priorityFocus"),
        snapshot = data
            .get("pipelineSnapshot")
            .and_then(|s| serde_json::to_string_pretty(s).ok())
            .unwrap_or_default(),
    )
}

/// `agent` is normally the ops orchestrator; the snapshot step needs the
/// `crm_query` capability.
pub fn strategy_cycle(
    agent: Arc<dyn Agent>,
    capabilities: Arc<CapabilityRegistry>,
) -> Result<WorkflowDefinition, EngineError> {
    let result_shape = OutputSchema::of::<StrategyCycleResult>()?;
    let plan = SchemaValidatedStep::new(agent, result_shape.clone()).with_max_retries(MAX_RETRIES);

    WorkflowDefinition::builder(WORKFLOW_ID, "Strategy Cycle Workflow")
        .purpose(
            "Run a multi-agent strategy cycle with schema-enforced outputs for funding, board, \
             domain intelligence, and SEO/thought leadership",
        )
        .input(OutputSchema::of::<StrategyCycleInput>()?)
        .result(result_shape)
        .then(StepDefinition::transform("load-pipeline-snapshot", move |ctx| {
            load_snapshot(capabilities.clone(), ctx)
        }))
        .then(StepDefinition::agent(
            "plan-cycle",
            AgentStep::from_fn(plan, cycle_prompt),
        ))
        .build()
}

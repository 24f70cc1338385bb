//! Research inquiry intake: classify an inquiry by research area, then
//! acknowledge it or hold it for board review.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::EngineError;
use crate::workflow::definition::{StepDefinition, WorkflowDefinition};
use crate::workflow::shape::OutputSchema;
use crate::workflow::step::{StepContext, StepOutcome};

pub const WORKFLOW_ID: &str = "research-inquiry";
pub const BOARD_REVIEW_REASON: &str = "Board review required for unclassified research area";

const RESEARCH_AREAS: &[&str] = &[
    "sensory-safety",
    "kinetic-equity",
    "algorithmic-accountability",
    "spatial-justice",
    "other",
];

/// Charter standard covering a research area.
pub fn charter_standard(area: &str) -> &'static str {
    match area {
        "sensory-safety" => "Grandin Standard",
        "kinetic-equity" => "Heumann Standard",
        "algorithmic-accountability" => "Crenshaw Standard",
        "spatial-justice" => "Heumann & Crenshaw Standards",
        _ => "General Charter",
    }
}

/// Resume payload for the board-review pause.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BoardDecision {
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_notes: Option<String>,
}

fn input_shape() -> Result<OutputSchema, EngineError> {
    OutputSchema::new(
        "ResearchInquiry",
        json!({
            "type": "object",
            "required": ["name", "email", "institution", "researchArea", "description"],
            "properties": {
                "name": { "type": "string", "description": "Applicant's full name" },
                "email": {
                    "type": "string",
                    "pattern": "^[^@\\s]+@[^@\\s]+\\.[^@\\s]+$",
                    "description": "Contact email"
                },
                "institution": { "type": "string", "description": "University or organization" },
                "researchArea": { "enum": RESEARCH_AREAS, "description": "Primary research area" },
                "description": { "type": "string", "description": "Brief description of proposed research" }
            }
        }),
    )
}

fn result_shape() -> Result<OutputSchema, EngineError> {
    OutputSchema::new(
        "ResearchInquiryResult",
        json!({
            "type": "object",
            "required": ["status", "inquiryId", "charterStandard", "message"],
            "properties": {
                "status": { "enum": ["acknowledged", "board-review", "rejected"] },
                "inquiryId": { "type": "string" },
                "charterStandard": { "type": "string" },
                "message": { "type": "string" }
            },
            "additionalProperties": false
        }),
    )
}

fn inquiry_id() -> String {
    format!("INQ-{}", to_base36(chrono::Utc::now().timestamp_millis().max(0) as u64))
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

async fn classify(ctx: StepContext) -> StepOutcome {
    let id = inquiry_id();
    let standard = charter_standard(ctx.str_field("researchArea").unwrap_or("other"));
    tracing::info!(
        "[ResearchInquiry] {}: {} ({}) -> {}",
        id,
        ctx.str_field("name").unwrap_or_default(),
        ctx.str_field("institution").unwrap_or_default(),
        standard
    );

    let mut data = ctx.data;
    match data.as_object_mut() {
        Some(map) => {
            map.insert("inquiryId".to_string(), json!(id));
            map.insert("charterStandard".to_string(), json!(standard));
            StepOutcome::Continue(data)
        }
        None => StepOutcome::fail("inquiry must be an object"),
    }
}

async fn route(ctx: StepContext) -> StepOutcome {
    let field = |key: &str| ctx.str_field(key).unwrap_or_default().to_string();
    let (id, standard, email) = (field("inquiryId"), field("charterStandard"), field("email"));

    if let Some(resume) = &ctx.resume_data {
        let decision: BoardDecision = match serde_json::from_value(resume.clone()) {
            Ok(decision) => decision,
            Err(e) => return StepOutcome::fail(format!("invalid board decision: {}", e)),
        };
        let (status, message) = if decision.approved {
            (
                "acknowledged",
                format!(
                    "Your inquiry has been approved. A member of the research team will contact you at {} \
                     to discuss next steps regarding the {}.",
                    email, standard
                ),
            )
        } else {
            (
                "rejected",
                format!(
                    "Thank you for your interest. Unfortunately, we are unable to proceed with this inquiry \
                     at this time. {}",
                    decision.reviewer_notes.unwrap_or_default()
                )
                .trim_end()
                .to_string(),
            )
        };
        return StepOutcome::Continue(json!({
            "status": status,
            "inquiryId": id,
            "charterStandard": standard,
            "message": message,
        }));
    }

    if ctx.str_field("researchArea") != Some("other") {
        tracing::info!("[ResearchInquiry] Auto-acknowledged: {}", id);
        return StepOutcome::Continue(json!({
            "status": "acknowledged",
            "inquiryId": id,
            "charterStandard": standard,
            "message": format!(
                "Thank you, {}. Your inquiry ({}) regarding the {} has been received and acknowledged. \
                 We will be in touch at {}.",
                field("name"), id, standard, email
            ),
        }));
    }

    tracing::info!("[ResearchInquiry] Requires board review: {}", id);
    ctx.suspend(
        BOARD_REVIEW_REASON,
        json!({
            "inquiryId": id,
            "name": field("name"),
            "institution": field("institution"),
            "description": field("description"),
        }),
    )
}

pub fn research_inquiry() -> Result<WorkflowDefinition, EngineError> {
    WorkflowDefinition::builder(WORKFLOW_ID, "Research Inquiry Workflow")
        .purpose("Process research partnership and fellowship inquiries, classify by area, and route for review")
        .input(input_shape()?)
        .result(result_shape()?)
        .then(StepDefinition::transform("classify-inquiry", classify))
        .then(StepDefinition::suspendable(
            "route-inquiry",
            OutputSchema::of::<BoardDecision>()?,
            route,
        ))
        .build()
}

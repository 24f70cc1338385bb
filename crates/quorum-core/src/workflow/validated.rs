//! Schema-validated agent calls.
//!
//! `SchemaValidatedStep` turns free agent text into a value that satisfies
//! an `OutputSchema`, re-prompting with the validation errors until it
//! converges or the retry budget runs out. `AgentStep` plugs it into a
//! workflow chain.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;

use crate::agents::{Agent, AgentWarning};
use crate::error::{EngineError, FieldError};
use crate::workflow::shape::OutputSchema;
use crate::workflow::step::{StepContext, StepHandler, StepOutcome};

pub const DEFAULT_MAX_RETRIES: u32 = 2;

static FENCED_BLOCK: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("fenced block pattern")
});

static PLACEHOLDER: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\$\{([A-Za-z0-9_.]+)\}").expect("placeholder pattern"));

/// A value that passed validation, plus how many attempts it took.
#[derive(Debug, Clone)]
pub struct ValidatedOutput {
    pub value: serde_json::Value,
    pub attempts: u32,
    pub warnings: Vec<AgentWarning>,
}

pub struct SchemaValidatedStep {
    agent: Arc<dyn Agent>,
    schema: OutputSchema,
    max_retries: u32,
}

impl SchemaValidatedStep {
    pub fn new(agent: Arc<dyn Agent>, schema: OutputSchema) -> Self {
        Self {
            agent,
            schema,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn schema(&self) -> &OutputSchema {
        &self.schema
    }

    /// Call the agent up to `max_retries + 1` times. Agent errors count as
    /// failed attempts.
    pub async fn invoke(&self, prompt: &str) -> Result<ValidatedOutput, EngineError> {
        let base_prompt = format!(
            "{}\n\nRespond with a single JSON value that satisfies this JSON Schema ({}). \
             Do not add commentary outside the JSON.\n```json\n{}\n```",
            prompt,
            self.schema.name(),
            self.schema.describe()
        );
        let total = self.max_retries + 1;

        let mut attempt_prompt = base_prompt.clone();
        let mut last_output = String::new();
        let mut last_errors = Vec::new();

        for attempt in 1..=total {
            match self.agent.generate(&attempt_prompt).await {
                Ok(output) => {
                    last_output = output.text;
                    last_errors = match extract_json(&last_output) {
                        Some(value) => match self.schema.validate(&value) {
                            Ok(()) => {
                                tracing::debug!(
                                    "[ValidatedStep] {} converged on attempt {}/{}",
                                    self.agent.name(),
                                    attempt,
                                    total
                                );
                                // Warnings from rejected attempts are dropped with their answers.
                                return Ok(ValidatedOutput {
                                    value,
                                    attempts: attempt,
                                    warnings: output.warnings,
                                });
                            }
                            Err(errors) => errors,
                        },
                        None => vec![FieldError::new("", "response did not contain a JSON value")],
                    };
                }
                Err(e) => {
                    last_errors = vec![FieldError::new("", format!("agent call failed: {}", e))];
                }
            }

            tracing::warn!(
                "[ValidatedStep] {} attempt {}/{} rejected: {} error(s)",
                self.agent.name(),
                attempt,
                total,
                last_errors.len()
            );
            attempt_prompt = correction_prompt(&base_prompt, &last_errors);
        }

        Err(EngineError::SchemaValidationExhausted {
            attempts: total,
            last_output,
            errors: last_errors,
        })
    }
}

fn correction_prompt(base_prompt: &str, errors: &[FieldError]) -> String {
    let corrections = errors
        .iter()
        .map(|e| format!("- {}", e))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{}\n\nYour previous response was rejected. Fix these problems and answer again:\n{}",
        base_prompt, corrections
    )
}

/// Pull a JSON value out of agent text: the whole text, then fenced code
/// blocks, then the first balanced `{...}` that parses.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    for caps in FENCED_BLOCK.captures_iter(text) {
        if let Ok(value) = serde_json::from_str(caps[1].trim()) {
            return Some(value);
        }
    }

    let bytes = text.as_bytes();
    let mut start = 0;
    while let Some(offset) = text[start..].find('{') {
        let open = start + offset;
        if let Some(close) = balanced_end(bytes, open) {
            if let Ok(value) = serde_json::from_str(&text[open..=close]) {
                return Some(value);
            }
        }
        start = open + 1;
    }
    None
}

/// Index of the brace closing the object opened at `open`, skipping strings.
fn balanced_end(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Replace `${path.to.field}` with values from `data`. Strings are inserted
/// as-is, other values as pretty JSON; unknown paths are left untouched.
pub fn render_template(template: &str, data: &serde_json::Value) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures| {
            let pointer = format!("/{}", caps[1].replace('.', "/"));
            match data.pointer(&pointer) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(value) => serde_json::to_string_pretty(value).unwrap_or_default(),
                None => caps[0].to_string(),
            }
        })
        .to_string()
}

type PromptFn = dyn Fn(&serde_json::Value) -> String + Send + Sync;

enum PromptSource {
    Template(String),
    Builder(Box<PromptFn>),
}

/// Workflow step that prompts an agent and validates its answer.
///
/// Without an `output_key` the validated value becomes the new data
/// context; with one it is merged into the existing context under that key.
pub struct AgentStep {
    validated: SchemaValidatedStep,
    prompt: PromptSource,
    output_key: Option<String>,
}

impl AgentStep {
    pub fn from_template(validated: SchemaValidatedStep, template: &str) -> Self {
        Self {
            validated,
            prompt: PromptSource::Template(template.to_string()),
            output_key: None,
        }
    }

    pub fn from_fn<F>(validated: SchemaValidatedStep, f: F) -> Self
    where
        F: Fn(&serde_json::Value) -> String + Send + Sync + 'static,
    {
        Self {
            validated,
            prompt: PromptSource::Builder(Box::new(f)),
            output_key: None,
        }
    }

    pub fn with_output_key(mut self, key: &str) -> Self {
        self.output_key = Some(key.to_string());
        self
    }

    fn build_prompt(&self, data: &serde_json::Value) -> String {
        match &self.prompt {
            PromptSource::Template(template) => render_template(template, data),
            PromptSource::Builder(f) => f(data),
        }
    }
}

#[async_trait]
impl StepHandler for AgentStep {
    async fn execute(&self, ctx: StepContext) -> StepOutcome {
        let prompt = self.build_prompt(&ctx.data);
        let output = match self.validated.invoke(&prompt).await {
            Ok(output) => output,
            Err(e) => return StepOutcome::Fail(e),
        };

        for warning in output.warnings {
            ctx.warn(&warning.kind, warning.message, warning.details);
        }
        if output.attempts > 1 {
            tracing::info!(
                "[ValidatedStep] '{}' needed {} attempts",
                ctx.step_id,
                output.attempts
            );
        }

        match &self.output_key {
            None => StepOutcome::Continue(output.value),
            Some(key) => {
                let mut data = ctx.data;
                match data.as_object_mut() {
                    Some(map) => {
                        map.insert(key.clone(), output.value);
                        StepOutcome::Continue(data)
                    }
                    None => StepOutcome::fail(format!(
                        "cannot store '{}' on a non-object data context",
                        key
                    )),
                }
            }
        }
    }
}

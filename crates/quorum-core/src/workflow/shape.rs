//! Declared shapes for workflow inputs, results, resume payloads and agent
//! output.
//!
//! A shape is a draft-07 JSON Schema document compiled once with
//! `jsonschema`. Shapes can be written as literal JSON or derived from a
//! Rust type through `schemars`:
//!
//! ```ignore
//! #[derive(schemars::JsonSchema)]
//! struct Approval { approved: bool }
//!
//! let shape = OutputSchema::of::<Approval>()?;
//! shape.validate(&serde_json::json!({ "approved": true }))?;
//! ```

use std::sync::Arc;

use jsonschema::{Draft, JSONSchema};
use schemars::JsonSchema;

use crate::error::{EngineError, FieldError};

/// A compiled, named shape. Cheap to clone.
#[derive(Clone)]
pub struct OutputSchema {
    name: String,
    document: Arc<serde_json::Value>,
    compiled: Arc<JSONSchema>,
}

impl OutputSchema {
    /// Compile a literal JSON Schema document.
    pub fn new(name: impl Into<String>, document: serde_json::Value) -> Result<Self, EngineError> {
        let name = name.into();
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&document)
            .map_err(|e| EngineError::InvariantViolation(format!("Invalid shape '{}': {}", name, e)))?;

        Ok(Self {
            name,
            document: Arc::new(document),
            compiled: Arc::new(compiled),
        })
    }

    /// Derive the shape from a Rust type.
    pub fn of<T: JsonSchema>() -> Result<Self, EngineError> {
        let generator = schemars::generate::SchemaSettings::draft07().into_generator();
        let schema = generator.into_root_schema_for::<T>();
        let document = serde_json::to_value(&schema)
            .map_err(|e| EngineError::Internal(format!("Failed to serialize schema: {}", e)))?;
        Self::new(T::schema_name().to_string(), document)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn document(&self) -> &serde_json::Value {
        &self.document
    }

    /// Check an instance, returning every violation rather than the first.
    pub fn validate(&self, instance: &serde_json::Value) -> Result<(), Vec<FieldError>> {
        match self.compiled.validate(instance) {
            Ok(()) => Ok(()),
            Err(errors) => Err(errors
                .map(|e| FieldError::new(e.instance_path.to_string(), e.to_string()))
                .collect()),
        }
    }

    pub fn is_valid(&self, instance: &serde_json::Value) -> bool {
        self.compiled.is_valid(instance)
    }

    /// Pretty-printed schema, for embedding in agent prompts.
    pub fn describe(&self) -> String {
        serde_json::to_string_pretty(self.document.as_ref()).unwrap_or_default()
    }
}

impl std::fmt::Debug for OutputSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSchema").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    #[allow(dead_code)]
    struct Review {
        approved: bool,
        #[serde(default)]
        reviewer_notes: Option<String>,
    }

    #[test]
    fn test_literal_shape_reports_all_violations() {
        let shape = OutputSchema::new(
            "contact",
            serde_json::json!({
                "type": "object",
                "required": ["name", "email"],
                "properties": {
                    "name": { "type": "string" },
                    "email": { "type": "string" }
                }
            }),
        )
        .unwrap();

        assert!(shape.validate(&serde_json::json!({ "name": "a", "email": "b" })).is_ok());

        let errors = shape
            .validate(&serde_json::json!({ "name": 3 }))
            .unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.path == "/name"));
        assert!(errors.iter().any(|e| e.message.contains("email")));
    }

    #[test]
    fn test_derived_shape() {
        let shape = OutputSchema::of::<Review>().unwrap();
        assert_eq!(shape.name(), "Review");
        assert!(shape.is_valid(&serde_json::json!({ "approved": true })));
        assert!(shape.is_valid(&serde_json::json!({ "approved": false, "reviewerNotes": "scope" })));
        assert!(!shape.is_valid(&serde_json::json!({ "approved": "yes" })));
        assert!(!shape.is_valid(&serde_json::json!({})));
    }

    #[test]
    fn test_invalid_schema_is_rejected() {
        let err = OutputSchema::new("broken", serde_json::json!({ "type": 12 })).unwrap_err();
        assert_eq!(err.kind(), "InvariantViolation");
    }
}

//! Output schema contracts for step payloads.
//!
//! Each step declares the structural contract its AI response must
//! satisfy: a closed list of typed fields. Validation checks presence and
//! type; domain-level counts and ratios are the quality gates' job. The
//! same contract renders into the prompt so the model sees exactly what is
//! expected, and into repair prompts quoting the violation.

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Expected type for one payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A non-empty string.
    String,
    /// Any JSON number.
    Number,
    /// An array with at least `min_items` elements.
    Array { min_items: usize },
    /// A JSON object.
    Object,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::String => write!(f, "string"),
            FieldKind::Number => write!(f, "number"),
            FieldKind::Array { min_items } => write!(f, "array (min {min_items} items)"),
            FieldKind::Object => write!(f, "object"),
        }
    }
}

/// One field in an output schema.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Top-level field name.
    pub name: &'static str,
    /// Expected type.
    pub kind: FieldKind,
    /// Whether the field must be present.
    pub required: bool,
}

impl FieldSpec {
    /// A required field.
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    /// An optional field.
    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

/// Schema violation with every issue found, for the repair prompt.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("payload violates schema '{schema}': {}", issues.join("; "))]
pub struct SchemaViolation {
    /// Name of the violated schema.
    pub schema: String,
    /// All issues found, field by field.
    pub issues: Vec<String>,
}

/// Structural contract an AI response must satisfy.
#[derive(Debug, Clone)]
pub struct OutputSchema {
    /// Schema name, shown in violations and prompts.
    pub name: &'static str,
    /// Top-level fields.
    pub fields: Vec<FieldSpec>,
}

impl OutputSchema {
    /// Create a schema from its field list.
    pub fn new(name: &'static str, fields: Vec<FieldSpec>) -> Self {
        Self { name, fields }
    }

    /// Validate a payload against this schema.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaViolation`] listing every issue found.
    pub fn validate(&self, payload: &Value) -> Result<(), SchemaViolation> {
        let mut issues = Vec::new();

        let Some(object) = payload.as_object() else {
            return Err(SchemaViolation {
                schema: self.name.to_string(),
                issues: vec!["payload must be a JSON object".to_string()],
            });
        };

        for field in &self.fields {
            match object.get(field.name) {
                None if field.required => {
                    issues.push(format!("missing required field '{}'", field.name));
                }
                None => {}
                Some(value) => {
                    if let Some(issue) = Self::check_kind(field, value) {
                        issues.push(issue);
                    }
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(SchemaViolation {
                schema: self.name.to_string(),
                issues,
            })
        }
    }

    fn check_kind(field: &FieldSpec, value: &Value) -> Option<String> {
        match field.kind {
            FieldKind::String => match value.as_str() {
                Some(text) if !text.trim().is_empty() => None,
                Some(_) => Some(format!("field '{}' must be a non-empty string", field.name)),
                None => Some(format!("field '{}' must be a string", field.name)),
            },
            FieldKind::Number => value
                .as_f64()
                .is_none()
                .then(|| format!("field '{}' must be a number", field.name)),
            FieldKind::Array { min_items } => match value.as_array() {
                Some(items) if items.len() >= min_items => None,
                Some(items) => Some(format!(
                    "field '{}' has {} items, needs at least {min_items}",
                    field.name,
                    items.len()
                )),
                None => Some(format!("field '{}' must be an array", field.name)),
            },
            FieldKind::Object => value
                .as_object()
                .is_none()
                .then(|| format!("field '{}' must be an object", field.name)),
        }
    }

    /// Render the contract for the prompt body.
    pub fn contract(&self) -> String {
        let mut lines = vec![format!(
            "Respond with a single JSON object ({} schema) containing:",
            self.name
        )];
        for field in &self.fields {
            lines.push(format!(
                "- \"{}\": {}{}",
                field.name,
                field.kind,
                if field.required { "" } else { " (optional)" }
            ));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> OutputSchema {
        OutputSchema::new(
            "test-brief",
            vec![
                FieldSpec::required("summary", FieldKind::String),
                FieldSpec::required("items", FieldKind::Array { min_items: 2 }),
                FieldSpec::optional("score", FieldKind::Number),
            ],
        )
    }

    #[test]
    fn test_valid_payload() {
        let payload = json!({"summary": "A plan", "items": [1, 2], "score": 0.8});
        assert!(schema().validate(&payload).is_ok());
    }

    #[test]
    fn test_optional_field_absent() {
        let payload = json!({"summary": "A plan", "items": [1, 2, 3]});
        assert!(schema().validate(&payload).is_ok());
    }

    #[test]
    fn test_missing_required_field() {
        let payload = json!({"items": [1, 2]});
        let violation = schema().validate(&payload).unwrap_err();
        assert_eq!(violation.issues.len(), 1);
        assert!(violation.issues[0].contains("summary"));
    }

    #[test]
    fn test_wrong_types_collected_together() {
        let payload = json!({"summary": 42, "items": "not an array", "score": "high"});
        let violation = schema().validate(&payload).unwrap_err();
        assert_eq!(violation.issues.len(), 3);
        assert!(violation.to_string().contains("test-brief"));
    }

    #[test]
    fn test_array_min_items() {
        let payload = json!({"summary": "ok", "items": [1]});
        let violation = schema().validate(&payload).unwrap_err();
        assert!(violation.issues[0].contains("at least 2"));
    }

    #[test]
    fn test_empty_string_rejected() {
        let payload = json!({"summary": "   ", "items": [1, 2]});
        let violation = schema().validate(&payload).unwrap_err();
        assert!(violation.issues[0].contains("non-empty"));
    }

    #[test]
    fn test_non_object_payload() {
        let violation = schema().validate(&json!([1, 2, 3])).unwrap_err();
        assert!(violation.issues[0].contains("JSON object"));
    }

    #[test]
    fn test_contract_rendering() {
        let contract = schema().contract();
        assert!(contract.contains("test-brief"));
        assert!(contract.contains("\"summary\": string"));
        assert!(contract.contains("min 2 items"));
        assert!(contract.contains("(optional)"));
    }
}

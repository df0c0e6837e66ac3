use serde_json::{Map, Value, json};

use crate::model::DocType;

mod registry;

pub use registry::SchemaRegistry;

/// Declared shape of a schema field. The closed set keeps validation and
/// JSON-schema generation table-driven instead of reflective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Str,
    StrList,
    Int,
    Float,
    Map,
    /// List of `{step_number, instruction, …}` objects.
    StepList,
    Date,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Str => "string",
            FieldKind::StrList => "list[string]",
            FieldKind::Int => "integer",
            FieldKind::Float => "number",
            FieldKind::Map => "object",
            FieldKind::StepList => "list[step]",
            FieldKind::Date => "date",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub description: &'static str,
}

/// Static descriptor of one record class: field table, required fields for
/// completeness scoring, primary-key fields for deduplication.
#[derive(Debug, Clone, Copy)]
pub struct SchemaDescriptor {
    pub name: &'static str,
    pub doc_type: DocType,
    pub description: &'static str,
    pub fields: &'static [FieldSpec],
    pub required_fields: &'static [&'static str],
    pub primary_key_fields: &'static [&'static str],
}

impl SchemaDescriptor {
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validate extracted data against the field table. Returns one message
    /// per violation; an empty vec means the data is valid. Unknown extra
    /// fields are allowed (the data map is open-shape).
    pub fn validate(&self, data: &Value) -> Vec<String> {
        let Some(map) = data.as_object() else {
            return vec!["data: expected a JSON object".to_string()];
        };

        let mut errors = Vec::new();

        for name in self.required_fields {
            match map.get(*name) {
                None | Some(Value::Null) => errors.push(format!("{name}: field required")),
                Some(value) if !is_filled(value) => {
                    errors.push(format!("{name}: must not be empty"))
                }
                Some(_) => {}
            }
        }

        for spec in self.fields {
            let Some(value) = map.get(spec.name) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            if let Some(message) = check_kind(spec, value) {
                errors.push(message);
            }
        }

        errors
    }

    /// JSON schema handed to the LLM extractor.
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        for spec in self.fields {
            properties.insert(spec.name.to_string(), kind_schema(spec));
        }
        json!({
            "title": self.name,
            "description": self.description,
            "type": "object",
            "properties": Value::Object(properties),
            "required": self.required_fields,
        })
    }

    /// Human-readable field table for the LLM prompt.
    pub fn describe(&self) -> String {
        let mut lines = vec![format!("Schema: {}", self.name)];
        lines.push(format!("Description: {}", self.description));
        lines.push("\nFields:".to_string());
        for spec in self.fields {
            let req = if spec.required { "required" } else { "optional" };
            lines.push(format!(
                "  - {} ({}, {}): {}",
                spec.name,
                spec.kind.as_str(),
                req,
                spec.description
            ));
        }
        lines.join("\n")
    }
}

fn kind_schema(spec: &FieldSpec) -> Value {
    match spec.kind {
        FieldKind::Str => json!({ "type": "string", "description": spec.description }),
        FieldKind::StrList => json!({
            "type": "array",
            "items": { "type": "string" },
            "description": spec.description,
        }),
        FieldKind::Int => json!({ "type": "integer", "description": spec.description }),
        FieldKind::Float => json!({ "type": "number", "description": spec.description }),
        FieldKind::Map => json!({ "type": "object", "description": spec.description }),
        FieldKind::StepList => json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "step_number": { "type": "integer" },
                    "instruction": { "type": "string" },
                },
                "required": ["step_number", "instruction"],
            },
            "description": spec.description,
        }),
        FieldKind::Date => {
            json!({ "type": "string", "format": "date", "description": spec.description })
        }
    }
}

fn check_kind(spec: &FieldSpec, value: &Value) -> Option<String> {
    let ok = match spec.kind {
        FieldKind::Str | FieldKind::Date => value.is_string(),
        FieldKind::StrList => value
            .as_array()
            .is_some_and(|items| items.iter().all(|v| v.is_string())),
        FieldKind::Int => value.is_i64() || value.is_u64(),
        FieldKind::Float => value.is_number(),
        FieldKind::Map => value.is_object(),
        FieldKind::StepList => value.as_array().is_some_and(|items| {
            items
                .iter()
                .all(|v| v.get("instruction").is_some_and(Value::is_string))
        }),
    };

    if ok {
        None
    } else {
        Some(format!("{}: expected {}", spec.name, spec.kind.as_str()))
    }
}

/// A value counts as filled when it is not null, not a blank string, not an
/// empty list and not an empty map.
pub fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validate_flags_missing_required_fields() {
        let schema = SchemaRegistry::global().schema_for(DocType::Objection);
        let errors = schema.validate(&json!({ "id": "OBJ-001" }));
        assert!(errors.iter().any(|e| e.starts_with("objection_text:")));
        assert!(errors.iter().any(|e| e.starts_with("response:")));
    }

    #[test]
    fn validate_flags_kind_mismatch() {
        let schema = SchemaRegistry::global().schema_for(DocType::SafetyNotes);
        let errors = schema.validate(&json!({
            "product_id": "70000",
            "warnings": "not a list",
        }));
        assert!(errors.iter().any(|e| e.contains("expected list[string]")));
    }

    #[test]
    fn validate_accepts_complete_data() {
        let schema = SchemaRegistry::global().schema_for(DocType::Faq);
        let errors = schema.validate(&json!({
            "question": "Wie installiere ich X?",
            "answer": "Setup starten.",
        }));
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    }

    #[test]
    fn empty_required_list_is_an_error() {
        let schema = SchemaRegistry::global().schema_for(DocType::ContentGuidelines);
        let errors = schema.validate(&json!({
            "topic": "Social Media",
            "dos": [],
            "donts": ["keine Superlative"],
        }));
        assert!(errors.iter().any(|e| e.starts_with("dos:")));
    }

    #[test]
    fn json_schema_lists_required_fields() {
        let schema = SchemaRegistry::global().schema_for(DocType::TrainingModule);
        let value = schema.json_schema();
        let required = value["required"].as_array().unwrap();
        assert_eq!(required.len(), 3);
        assert!(value["properties"]["objectives"]["type"] == "array");
    }
}

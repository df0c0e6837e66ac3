use serde_json::Value;
use serde::Serialize;

use crate::model::DocType;
use crate::schema::{SchemaRegistry, is_filled};

#[derive(Debug, Clone, Serialize)]
pub struct CompletenessDetails {
    pub score: f64,
    pub total_required: usize,
    pub filled_required: usize,
    pub missing_fields: Vec<String>,
    pub optional_filled: usize,
    pub total_optional: usize,
}

/// Fraction of required fields that carry a non-empty value; 1.0 when the
/// schema requires nothing.
pub fn score(doc_type: DocType, data: &Value) -> f64 {
    let schema = SchemaRegistry::global().schema_for(doc_type);
    let required = schema.required_fields;
    if required.is_empty() {
        return 1.0;
    }

    let filled = required
        .iter()
        .filter(|field| field_is_filled(data, field))
        .count();
    filled as f64 / required.len() as f64
}

/// Ordered list of required fields without a value.
pub fn missing(doc_type: DocType, data: &Value) -> Vec<String> {
    let schema = SchemaRegistry::global().schema_for(doc_type);
    schema
        .required_fields
        .iter()
        .filter(|field| !field_is_filled(data, field))
        .map(|field| field.to_string())
        .collect()
}

pub fn details(doc_type: DocType, data: &Value) -> CompletenessDetails {
    let schema = SchemaRegistry::global().schema_for(doc_type);
    let required = schema.required_fields;

    let mut filled_required = 0;
    let mut missing_fields = Vec::new();
    for field in required {
        if field_is_filled(data, field) {
            filled_required += 1;
        } else {
            missing_fields.push(field.to_string());
        }
    }

    let optional: Vec<&str> = schema
        .fields
        .iter()
        .map(|spec| spec.name)
        .filter(|name| !required.contains(name))
        .collect();
    let optional_filled = optional
        .iter()
        .filter(|field| field_is_filled(data, field))
        .count();

    let score = if required.is_empty() {
        1.0
    } else {
        filled_required as f64 / required.len() as f64
    };

    CompletenessDetails {
        score: (score * 100.0).round() / 100.0,
        total_required: required.len(),
        filled_required,
        missing_fields,
        optional_filled,
        total_optional: optional.len(),
    }
}

fn field_is_filled(data: &Value, field: &str) -> bool {
    data.get(field).is_some_and(is_filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn all_required_filled_scores_one() {
        let data = json!({
            "id": "OBJ-001",
            "objection_text": "Das ist zu teuer",
            "response": "Verstehe ich, aber...",
        });
        assert_eq!(score(DocType::Objection, &data), 1.0);
    }

    #[test]
    fn missing_required_lowers_score() {
        let data = json!({
            "id": "OBJ-001",
            "objection_text": "Das ist zu teuer",
        });
        let s = score(DocType::Objection, &data);
        assert!((s - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_values_count_as_missing() {
        let data = json!({
            "id": "OBJ-001",
            "objection_text": "",
            "response": "Antwort",
        });
        assert!(score(DocType::Objection, &data) < 1.0);
        assert_eq!(missing(DocType::Objection, &data), vec!["objection_text"]);
    }

    #[test]
    fn optional_fields_do_not_affect_score() {
        let data = json!({
            "id": "OBJ-001",
            "objection_text": "Einwand",
            "response": "Antwort",
        });
        assert_eq!(score(DocType::Objection, &data), 1.0);
    }

    #[test]
    fn score_is_always_in_unit_interval() {
        for doc_type in DocType::ALL {
            let empty = json!({});
            let s = score(doc_type, &empty);
            assert!((0.0..=1.0).contains(&s));
        }
    }

    #[test]
    fn details_break_down_required_and_optional() {
        let data = json!({
            "id": "OBJ-001",
            "objection_text": "Einwand",
            "category": "Preis",
        });
        let d = details(DocType::Objection, &data);
        assert_eq!(d.total_required, 3);
        assert_eq!(d.filled_required, 2);
        assert_eq!(d.missing_fields, vec!["response"]);
        assert_eq!(d.optional_filled, 1);
        assert_eq!(d.total_optional, 2);
    }
}

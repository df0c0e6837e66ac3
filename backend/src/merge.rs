use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::{ProposedUpdate, Record, UpdateStatus};
use crate::schema::SchemaDescriptor;
use crate::storage::Tables;

/// Deterministic primary key: each primary-key field lower-cased, trimmed
/// and clipped to 100 chars, fields joined by `"|"`, the result clipped to
/// 500 chars. Stable across re-extractions of the same entity, which is
/// what collapses deduplication.
pub fn compute_primary_key(schema: &SchemaDescriptor, data: &Value) -> String {
    let mut parts = Vec::with_capacity(schema.primary_key_fields.len());
    for field in schema.primary_key_fields {
        let part = match data.get(*field) {
            Some(Value::String(s)) => clip_chars(s.to_lowercase().trim(), 100),
            Some(Value::Null) | None => String::new(),
            Some(other) => clip_chars(&other.to_string(), 100),
        };
        parts.push(part);
    }
    clip_chars(&parts.join("|"), 500)
}

fn clip_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

/// Structured diff between two data maps:
/// `{added, removed, changed: {field: {old, new}}, unchanged}`.
/// Comparisons ignore list order.
pub fn compute_diff(old_data: &Value, new_data: &Value) -> Value {
    let empty = Map::new();
    let old = old_data.as_object().unwrap_or(&empty);
    let new = new_data.as_object().unwrap_or(&empty);

    let mut added = Map::new();
    let mut removed = Map::new();
    let mut changed = Map::new();
    let mut unchanged = Map::new();

    for (field, value) in new {
        match old.get(field) {
            None => {
                added.insert(field.clone(), value.clone());
            }
            Some(old_value) if values_equal(old_value, value) => {
                unchanged.insert(field.clone(), old_value.clone());
            }
            Some(old_value) => {
                changed.insert(
                    field.clone(),
                    json!({ "old": old_value, "new": value }),
                );
            }
        }
    }

    for (field, value) in old {
        if !new.contains_key(field) {
            removed.insert(field.clone(), value.clone());
        }
    }

    json!({
        "added": added,
        "removed": removed,
        "changed": changed,
        "unchanged": unchanged,
    })
}

/// Deep equality that treats lists as unordered.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    normalize(a) == normalize(b)
}

fn normalize(value: &Value) -> Value {
    match value {
        Value::Array(items) => {
            let mut normalized: Vec<Value> = items.iter().map(normalize).collect();
            normalized.sort_by_key(|v| v.to_string());
            Value::Array(normalized)
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), normalize(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Reconciliation of re-extracted entities against the approved knowledge
/// base, plus the moderator-gated application of the resulting updates.
pub struct MergeEngine {
    tables: Arc<Tables>,
}

impl MergeEngine {
    pub fn new(tables: Arc<Tables>) -> Self {
        Self { tables }
    }

    /// Only approved records participate in deduplication; pending ones may
    /// coexist with the same key until a moderator decides.
    pub async fn find_existing(&self, schema_type: &str, primary_key: &str) -> Option<Record> {
        self.tables
            .find_approved_record(schema_type, primary_key)
            .await
    }

    /// Wrap new data for an existing approved record as a pending update
    /// carrying the structured diff. The existing record is not touched.
    pub async fn create_proposed_update(
        &self,
        existing: &Record,
        new_data: Value,
        source_document_id: Option<Uuid>,
    ) -> ProposedUpdate {
        let diff = compute_diff(&existing.data, &new_data);
        let update = ProposedUpdate {
            id: Uuid::new_v4(),
            record_id: existing.id,
            source_document_id,
            new_data,
            diff,
            status: UpdateStatus::Pending,
            created_at: Utc::now(),
            reviewed_at: None,
            reviewed_by: None,
        };
        self.tables
            .proposed_updates
            .insert(update.id, update.clone())
            .await;
        update
    }

    /// Apply a pending update: the target record takes the new data, its
    /// version increments, and the update is closed as approved. The status
    /// check and the close happen under the table's write lock, so a racing
    /// second reviewer observes the terminal status and gets a conflict.
    pub async fn apply_update(&self, update_id: Uuid, reviewer: &str) -> AppResult<Record> {
        let update = self.close_update(update_id, UpdateStatus::Approved, reviewer).await?;

        let record = self
            .tables
            .records
            .update(update.record_id, |record| {
                record.data = update.new_data.clone();
                record.version += 1;
                record.updated_at = Utc::now();
                record.clone()
            })
            .await
            .ok_or_else(|| {
                AppError::NotFound(format!("record not found: {}", update.record_id))
            })?;

        Ok(record)
    }

    /// Reject a pending update; the record is untouched.
    pub async fn reject_update(&self, update_id: Uuid, reviewer: &str) -> AppResult<ProposedUpdate> {
        self.close_update(update_id, UpdateStatus::Rejected, reviewer).await
    }

    async fn close_update(
        &self,
        update_id: Uuid,
        status: UpdateStatus,
        reviewer: &str,
    ) -> AppResult<ProposedUpdate> {
        self.tables
            .proposed_updates
            .update(update_id, |update| {
                if update.status != UpdateStatus::Pending {
                    return Err(AppError::Conflict("update is not pending".to_string()));
                }
                update.status = status;
                update.reviewed_at = Some(Utc::now());
                update.reviewed_by = Some(reviewer.to_string());
                Ok(update.clone())
            })
            .await
            .ok_or_else(|| AppError::NotFound(format!("proposed update not found: {update_id}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DocType;
    use crate::schema::SchemaRegistry;
    use serde_json::json;

    fn schema(doc_type: DocType) -> &'static SchemaDescriptor {
        SchemaRegistry::global().schema_for(doc_type)
    }

    #[test]
    fn primary_key_single_field() {
        let data = json!({ "id": "OBJ-001", "objection_text": "Test" });
        assert_eq!(compute_primary_key(schema(DocType::Objection), &data), "obj-001");
    }

    #[test]
    fn primary_key_multiple_fields() {
        let data = json!({
            "title": "Sales Training",
            "version": "1.0",
            "content": "Training content",
        });
        assert_eq!(
            compute_primary_key(schema(DocType::TrainingModule), &data),
            "sales training|1.0"
        );
    }

    #[test]
    fn primary_key_is_pure_and_case_folding() {
        let a = json!({ "question": "  Wie installiere ich X?  " });
        let b = json!({ "question": "WIE INSTALLIERE ICH x?" });
        let s = schema(DocType::Faq);
        assert_eq!(compute_primary_key(s, &a), compute_primary_key(s, &a));
        assert_eq!(compute_primary_key(s, &a), compute_primary_key(s, &b));
        assert_eq!(compute_primary_key(s, &a), "wie installiere ich x?");
    }

    #[test]
    fn primary_key_clips_long_values() {
        let long = "x".repeat(400);
        let data = json!({ "title": long, "scenario": "y".repeat(400) });
        let key = compute_primary_key(schema(DocType::PitchScript), &data);
        assert_eq!(key.chars().count(), 201); // 100 + "|" + 100
    }

    #[test]
    fn missing_key_field_yields_empty_part() {
        let data = json!({ "topic": "DSGVO" });
        assert_eq!(compute_primary_key(schema(DocType::ComplianceNotes), &data), "dsgvo|");
    }

    #[test]
    fn diff_classifies_fields() {
        let old = json!({ "id": "001", "name": "Old Name", "gone": "x" });
        let new = json!({ "id": "001", "name": "New Name", "fresh": "y" });

        let diff = compute_diff(&old, &new);
        assert_eq!(diff["added"]["fresh"], "y");
        assert_eq!(diff["removed"]["gone"], "x");
        assert_eq!(diff["changed"]["name"]["old"], "Old Name");
        assert_eq!(diff["changed"]["name"]["new"], "New Name");
        assert_eq!(diff["unchanged"]["id"], "001");
    }

    #[test]
    fn diff_ignores_list_order() {
        let old = json!({ "tags": ["a", "b", "c"] });
        let new = json!({ "tags": ["c", "a", "b"] });
        let diff = compute_diff(&old, &new);
        assert!(diff["changed"].as_object().unwrap().is_empty());
        assert!(diff["unchanged"].as_object().unwrap().contains_key("tags"));
    }

    #[test]
    fn identical_data_has_no_changes() {
        let data = json!({ "id": "001", "name": "Test" });
        let diff = compute_diff(&data, &data);
        assert!(diff["added"].as_object().unwrap().is_empty());
        assert!(diff["removed"].as_object().unwrap().is_empty());
        assert!(diff["changed"].as_object().unwrap().is_empty());
        assert_eq!(diff["unchanged"].as_object().unwrap().len(), 2);
    }

    /// Applying the diff to the old data must reproduce the new data
    /// (modulo list order).
    #[test]
    fn diff_round_trips() {
        let old = json!({
            "id": "001",
            "name": "Old",
            "tags": ["x", "y"],
            "legacy": true,
        });
        let new = json!({
            "id": "001",
            "name": "New",
            "tags": ["y", "x"],
            "extra": { "nested": [1, 2] },
        });

        let diff = compute_diff(&old, &new);
        let rebuilt = apply_diff(&old, &diff);
        assert!(values_equal(&rebuilt, &new));
    }

    fn apply_diff(old: &Value, diff: &Value) -> Value {
        let mut map = old.as_object().cloned().unwrap_or_default();
        for (field, value) in diff["added"].as_object().unwrap() {
            map.insert(field.clone(), value.clone());
        }
        for field in diff["removed"].as_object().unwrap().keys() {
            map.remove(field);
        }
        for (field, change) in diff["changed"].as_object().unwrap() {
            map.insert(field.clone(), change["new"].clone());
        }
        Value::Object(map)
    }
}

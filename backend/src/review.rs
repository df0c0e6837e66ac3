use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::completeness;
use crate::error::{AppError, AppResult};
use crate::merge::MergeEngine;
use crate::model::{ProposedUpdate, Record, RecordStatus};
use crate::schema::SchemaRegistry;
use crate::storage::Tables;

/// Moderator-facing state transitions on records and proposed updates.
/// Every successful mutation writes exactly one audit entry; illegal
/// transitions return `Conflict` and leave no trace in the log.
pub struct ReviewController {
    tables: Arc<Tables>,
    merge: MergeEngine,
}

impl ReviewController {
    pub fn new(tables: Arc<Tables>) -> Self {
        let merge = MergeEngine::new(tables.clone());
        Self { tables, merge }
    }

    pub async fn approve(
        &self,
        record_id: Uuid,
        actor: &str,
        reason: Option<String>,
    ) -> AppResult<Record> {
        let record = self
            .tables
            .records
            .update(record_id, |record| {
                if record.status == RecordStatus::Approved {
                    return Err(AppError::Conflict("record is already approved".to_string()));
                }
                if record.status == RecordStatus::Rejected {
                    return Err(AppError::Conflict(
                        "record is rejected and cannot be approved".to_string(),
                    ));
                }
                record.status = RecordStatus::Approved;
                record.updated_at = Utc::now();
                Ok(record.clone())
            })
            .await
            .ok_or_else(|| AppError::NotFound(format!("record not found: {record_id}")))??;

        self.tables
            .audit(
                "approve",
                "Record",
                record_id,
                actor,
                reason.map(|r| json!({ "reason": r })),
            )
            .await;
        self.tables.sync_all().await?;
        Ok(record)
    }

    /// Re-rejecting a rejected record is a no-op and not audited, nothing
    /// changed; rejecting an approved record is a conflict.
    pub async fn reject(
        &self,
        record_id: Uuid,
        actor: &str,
        reason: Option<String>,
    ) -> AppResult<Record> {
        let outcome = self
            .tables
            .records
            .update(record_id, |record| {
                match record.status {
                    RecordStatus::Approved => Err(AppError::Conflict(
                        "record is approved and cannot be rejected".to_string(),
                    )),
                    RecordStatus::Rejected => Ok((record.clone(), false)),
                    _ => {
                        record.status = RecordStatus::Rejected;
                        record.updated_at = Utc::now();
                        Ok((record.clone(), true))
                    }
                }
            })
            .await
            .ok_or_else(|| AppError::NotFound(format!("record not found: {record_id}")))??;

        let (record, mutated) = outcome;
        if mutated {
            self.tables
                .audit(
                    "reject",
                    "Record",
                    record_id,
                    actor,
                    reason.map(|r| json!({ "reason": r })),
                )
                .await;
            self.tables.sync_all().await?;
        }
        Ok(record)
    }

    /// Overwrite a record's data and recompute its completeness; the status
    /// is untouched. Only non-terminal records are editable.
    pub async fn edit(&self, record_id: Uuid, new_data: Value, actor: &str) -> AppResult<Record> {
        let current = self.tables.record(record_id).await?;
        if current.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "record in status {} cannot be edited",
                current.status.as_str()
            )));
        }

        // The schema descriptor is reachable by name even when the source
        // document is long gone.
        let schema = SchemaRegistry::global().schema_by_name(&current.schema_type)?;
        let score = completeness::score(schema.doc_type, &new_data);
        let updated_fields: Vec<String> = new_data
            .as_object()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();

        let record = self
            .tables
            .records
            .update(record_id, |record| {
                record.data = new_data.clone();
                record.completeness_score = score;
                record.updated_at = Utc::now();
                record.clone()
            })
            .await
            .ok_or_else(|| AppError::NotFound(format!("record not found: {record_id}")))?;

        self.tables
            .audit(
                "edit",
                "Record",
                record_id,
                actor,
                Some(json!({ "updated_fields": updated_fields })),
            )
            .await;
        self.tables.sync_all().await?;
        Ok(record)
    }

    pub async fn approve_update(&self, update_id: Uuid, actor: &str) -> AppResult<Record> {
        let record = self.merge.apply_update(update_id, actor).await?;

        self.tables
            .audit(
                "approve_update",
                "ProposedUpdate",
                update_id,
                actor,
                Some(json!({ "record_id": record.id.to_string() })),
            )
            .await;
        self.tables.sync_all().await?;
        Ok(record)
    }

    pub async fn reject_update(
        &self,
        update_id: Uuid,
        actor: &str,
        reason: Option<String>,
    ) -> AppResult<ProposedUpdate> {
        let update = self.merge.reject_update(update_id, actor).await?;

        self.tables
            .audit(
                "reject_update",
                "ProposedUpdate",
                update_id,
                actor,
                Some(json!({
                    "record_id": update.record_id.to_string(),
                    "reason": reason,
                })),
            )
            .await;
        self.tables.sync_all().await?;
        Ok(update)
    }
}

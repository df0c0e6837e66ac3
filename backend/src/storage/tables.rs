use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::{
    AuditLog, Chunk, Department, Document, DocumentStatus, Evidence, ProposedUpdate, Record,
    RecordAttachment, RecordStatus, UpdateStatus,
};

use super::table::{JsonTable, TableConfig};
use super::{StorageManager, Table};

/// The seven tables of the core, plus the domain queries and cascade rules
/// the pipeline and review controller rely on. The underlying store is the
/// single source of truth; every mutation of one stage is flushed together
/// via `sync_all`.
pub struct Tables {
    pub documents: Arc<JsonTable<Document>>,
    pub chunks: Arc<JsonTable<Chunk>>,
    pub records: Arc<JsonTable<Record>>,
    pub evidence: Arc<JsonTable<Evidence>>,
    pub proposed_updates: Arc<JsonTable<ProposedUpdate>>,
    pub audit_logs: Arc<JsonTable<AuditLog>>,
    pub attachments: Arc<JsonTable<RecordAttachment>>,
}

impl Tables {
    pub fn new(working_dir: &Path) -> Self {
        let table = |namespace: &str| TableConfig {
            working_dir: working_dir.to_path_buf(),
            namespace: namespace.to_string(),
        };

        Self {
            documents: Arc::new(JsonTable::new(table("documents"))),
            chunks: Arc::new(JsonTable::new(table("chunks"))),
            records: Arc::new(JsonTable::new(table("records"))),
            evidence: Arc::new(JsonTable::new(table("evidence"))),
            proposed_updates: Arc::new(JsonTable::new(table("proposed_updates"))),
            audit_logs: Arc::new(JsonTable::new(table("audit_logs"))),
            attachments: Arc::new(JsonTable::new(table("record_attachments"))),
        }
    }

    pub fn register(&self, manager: &mut StorageManager) {
        manager.register(self.documents.clone());
        manager.register(self.chunks.clone());
        manager.register(self.records.clone());
        manager.register(self.evidence.clone());
        manager.register(self.proposed_updates.clone());
        manager.register(self.audit_logs.clone());
        manager.register(self.attachments.clone());
    }

    pub async fn sync_all(&self) -> Result<()> {
        self.documents.sync_if_dirty().await?;
        self.chunks.sync_if_dirty().await?;
        self.records.sync_if_dirty().await?;
        self.evidence.sync_if_dirty().await?;
        self.proposed_updates.sync_if_dirty().await?;
        self.audit_logs.sync_if_dirty().await?;
        self.attachments.sync_if_dirty().await?;
        Ok(())
    }

    /// Append one audit entry. The log is append-only; nothing ever updates
    /// or deletes entries.
    pub async fn audit(
        &self,
        action: &str,
        entity_type: &str,
        entity_id: Uuid,
        actor: &str,
        details: Option<Value>,
    ) {
        let entry = AuditLog {
            id: Uuid::new_v4(),
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id,
            actor: actor.to_string(),
            details,
            timestamp: Utc::now(),
        };
        self.audit_logs.insert(entry.id, entry).await;
    }

    pub async fn audit_tail(&self, limit: usize) -> Vec<AuditLog> {
        let mut entries = self.audit_logs.all().await;
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit);
        entries
    }

    // --- documents ---

    pub async fn document(&self, id: Uuid) -> AppResult<Document> {
        self.documents
            .get(id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("document not found: {id}")))
    }

    pub async fn list_documents(
        &self,
        department: Option<Department>,
        status: Option<DocumentStatus>,
        page: usize,
        limit: usize,
    ) -> (Vec<Document>, usize) {
        let mut docs = self
            .documents
            .filter(|d| {
                department.is_none_or(|dept| d.department == dept)
                    && status.is_none_or(|s| d.status == s)
            })
            .await;
        docs.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        paginate(docs, page, limit)
    }

    pub async fn set_document_status(
        &self,
        id: Uuid,
        status: DocumentStatus,
        error_message: Option<String>,
    ) -> AppResult<()> {
        self.documents
            .update(id, |doc| {
                doc.status = status;
                if error_message.is_some() {
                    doc.error_message = error_message;
                }
            })
            .await
            .ok_or_else(|| AppError::NotFound(format!("document not found: {id}")))
    }

    pub async fn chunks_for_document(&self, document_id: Uuid) -> Vec<Chunk> {
        let mut chunks = self
            .chunks
            .filter(|c| c.document_id == document_id)
            .await;
        chunks.sort_by_key(|c| c.chunk_index);
        chunks
    }

    pub async fn records_for_document(&self, document_id: Uuid) -> Vec<Record> {
        let mut records = self
            .records
            .filter(|r| r.document_id == Some(document_id))
            .await;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        records
    }

    /// Delete a document and everything it owns. Returns the blob paths the
    /// caller should remove best-effort (the document file plus any
    /// attachment files of cascaded records).
    pub async fn delete_document_cascade(&self, id: Uuid) -> AppResult<Vec<String>> {
        let document = self.document(id).await?;
        let mut blob_paths = vec![document.blob_path.clone()];

        let records = self.records.delete_where(|_, r| r.document_id == Some(id)).await;
        for (record_id, _) in &records {
            blob_paths.extend(self.delete_record_children(*record_id).await);
        }

        let chunks = self.chunks.delete_where(|_, c| c.document_id == id).await;
        let chunk_ids: HashSet<Uuid> = chunks.iter().map(|(id, _)| *id).collect();
        // Evidence keeps its row when the chunk goes away, the back-reference
        // is just nulled.
        self.evidence
            .update_where(|_, ev| {
                if ev.chunk_id.is_some_and(|cid| chunk_ids.contains(&cid)) {
                    ev.chunk_id = None;
                    true
                } else {
                    false
                }
            })
            .await;

        self.documents.delete(&[id]).await;
        Ok(blob_paths)
    }

    // --- records ---

    pub async fn record(&self, id: Uuid) -> AppResult<Record> {
        self.records
            .get(id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("record not found: {id}")))
    }

    pub async fn find_approved_record(&self, schema_type: &str, primary_key: &str) -> Option<Record> {
        self.records
            .find(|r| {
                r.status == RecordStatus::Approved
                    && r.schema_type == schema_type
                    && r.primary_key == primary_key
            })
            .await
    }

    pub async fn review_queue(
        &self,
        department: Option<Department>,
        schema_type: Option<&str>,
        status: Option<RecordStatus>,
        sort_by: &str,
        page: usize,
        limit: usize,
    ) -> (Vec<Record>, usize) {
        let mut records = self
            .records
            .filter(|r| {
                let status_ok = match status {
                    Some(s) => r.status == s,
                    None => matches!(r.status, RecordStatus::Pending | RecordStatus::NeedsReview),
                };
                status_ok
                    && department.is_none_or(|dept| r.department == dept)
                    && schema_type.is_none_or(|s| r.schema_type == s)
            })
            .await;

        match sort_by {
            "created" => records.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            "updated" => records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at)),
            // Least complete first, so reviewers see the gaps.
            _ => records.sort_by(|a, b| {
                a.completeness_score
                    .partial_cmp(&b.completeness_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            }),
        }

        paginate(records, page, limit)
    }

    pub async fn approved_records(
        &self,
        department: Option<Department>,
        schema_type: Option<&str>,
    ) -> Vec<Record> {
        self.records
            .filter(|r| {
                r.status == RecordStatus::Approved
                    && department.is_none_or(|dept| r.department == dept)
                    && schema_type.is_none_or(|s| r.schema_type == s)
            })
            .await
    }

    pub async fn evidence_for_record(&self, record_id: Uuid) -> Vec<Evidence> {
        self.evidence.filter(|e| e.record_id == record_id).await
    }

    pub async fn attachments_for_record(&self, record_id: Uuid) -> Vec<RecordAttachment> {
        let mut attachments = self
            .attachments
            .filter(|a| a.record_id == record_id)
            .await;
        attachments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        attachments
    }

    /// Delete a record and everything it owns. Returns attachment blob paths
    /// for best-effort removal.
    pub async fn delete_record_cascade(&self, id: Uuid) -> AppResult<Vec<String>> {
        self.record(id).await?;
        let blob_paths = self.delete_record_children(id).await;
        self.records.delete(&[id]).await;
        Ok(blob_paths)
    }

    async fn delete_record_children(&self, record_id: Uuid) -> Vec<String> {
        self.evidence
            .delete_where(|_, e| e.record_id == record_id)
            .await;
        self.proposed_updates
            .delete_where(|_, u| u.record_id == record_id)
            .await;
        self.attachments
            .delete_where(|_, a| a.record_id == record_id)
            .await
            .into_iter()
            .map(|(_, a)| a.blob_path)
            .collect()
    }

    // --- proposed updates ---

    pub async fn proposed_update(&self, id: Uuid) -> AppResult<ProposedUpdate> {
        self.proposed_updates
            .get(id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("proposed update not found: {id}")))
    }

    pub async fn pending_updates(&self, page: usize, limit: usize) -> (Vec<ProposedUpdate>, usize) {
        let mut updates = self
            .proposed_updates
            .filter(|u| u.status == UpdateStatus::Pending)
            .await;
        updates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        paginate(updates, page, limit)
    }
}

fn paginate<T>(items: Vec<T>, page: usize, limit: usize) -> (Vec<T>, usize) {
    let total = items.len();
    let page = page.max(1);
    let limit = limit.clamp(1, 100);
    let start = (page - 1) * limit;
    let slice = if start >= total {
        Vec::new()
    } else {
        items
            .into_iter()
            .skip(start)
            .take(limit)
            .collect()
    };
    (slice, total)
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::extractors::{EvidencePointer, ExtractionContext, Extractor};
use crate::merge::{MergeEngine, compute_primary_key};
use crate::model::{Chunk, Document, DocumentStatus, Evidence, Record, RecordStatus};
use crate::parsers::{ParsedDocument, parse_file};
use crate::schema::SchemaRegistry;
use crate::completeness;
use crate::storage::{BlobStore, Tables};

use super::chunker::{Chunker, ChunkerConfig, Embedder, HashEmbedder};

/// One extraction candidate on its way into the store.
struct Candidate {
    data: Value,
    schema_type: String,
    evidence: Vec<EvidencePointer>,
    confidence: f64,
    needs_review: bool,
    source_section: Option<String>,
}

/// Orchestrates parse → chunk → extract → merge for one uploaded document
/// and drives the document status machine. Stages run strictly
/// sequentially; every transition is persisted before the next stage
/// begins.
pub struct IngestionPipeline {
    tables: Arc<Tables>,
    blob: Arc<dyn BlobStore>,
    extractor: Arc<dyn Extractor>,
    merge: MergeEngine,
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
}

impl IngestionPipeline {
    pub fn new(
        tables: Arc<Tables>,
        blob: Arc<dyn BlobStore>,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        Self {
            merge: MergeEngine::new(tables.clone()),
            tables,
            blob,
            extractor,
            chunker: Chunker::new(ChunkerConfig::default()),
            embedder: Arc::new(HashEmbedder),
        }
    }

    /// Run the full pipeline. Returns the number of records created; errors
    /// have already been recorded on the document row when this returns
    /// `Err`, and the caller decides about retries.
    pub async fn process(&self, document_id: Uuid) -> AppResult<usize> {
        let document = self.tables.document(document_id).await?;
        info!(document_id = %document_id, filename = %document.filename, "starting ingestion");

        self.transition(document_id, DocumentStatus::Parsing).await?;
        let parsed = match self.parse_stage(&document).await {
            Ok(parsed) => parsed,
            Err(err) => {
                return self
                    .fail(document_id, DocumentStatus::ParseFailed, err)
                    .await;
            }
        };
        for warning in &parsed.warnings {
            warn!(document_id = %document_id, warning = %warning, "parser warning");
        }

        let chunks = match self.chunk_stage(&document, &parsed).await {
            Ok(chunks) => chunks,
            Err(err) => {
                return self
                    .fail(document_id, DocumentStatus::ParseFailed, err)
                    .await;
            }
        };

        self.transition(document_id, DocumentStatus::Extracting)
            .await?;
        let records_created = match self.extract_stage(&document, &parsed, &chunks).await {
            Ok(count) => count,
            Err(err) => {
                return self
                    .fail(document_id, DocumentStatus::ExtractionFailed, err)
                    .await;
            }
        };

        self.tables
            .audit(
                "records_extracted",
                "Document",
                document_id,
                "system",
                Some(json!({ "records_created": records_created })),
            )
            .await;

        self.transition(document_id, DocumentStatus::PendingReview)
            .await?;
        self.tables
            .audit(
                "ingestion_complete",
                "Document",
                document_id,
                "system",
                Some(json!({
                    "records_created": records_created,
                    "chunks_created": chunks.len(),
                })),
            )
            .await;
        self.tables.sync_all().await?;

        info!(
            document_id = %document_id,
            records = records_created,
            chunks = chunks.len(),
            "ingestion complete"
        );
        Ok(records_created)
    }

    async fn transition(&self, document_id: Uuid, status: DocumentStatus) -> AppResult<()> {
        self.tables
            .set_document_status(document_id, status, None)
            .await?;
        self.tables.sync_all().await?;
        Ok(())
    }

    /// Record the failure on the document row, audit it, and re-raise.
    async fn fail<T>(
        &self,
        document_id: Uuid,
        status: DocumentStatus,
        err: AppError,
    ) -> AppResult<T> {
        let message = err.to_string();
        if let Err(status_err) = self
            .tables
            .set_document_status(document_id, status, Some(message.clone()))
            .await
        {
            warn!(document_id = %document_id, error = %status_err, "failed to record failure state");
        }
        self.tables
            .audit(
                "ingestion_failed",
                "Document",
                document_id,
                "system",
                Some(json!({ "error": message, "status": status.as_str() })),
            )
            .await;
        if let Err(sync_err) = self.tables.sync_all().await {
            warn!(document_id = %document_id, error = %sync_err, "failed to persist failure state");
        }
        Err(err)
    }

    /// Download the blob to a temp file, dispatch to the parser selected by
    /// extension, and delete the temp file regardless of outcome.
    async fn parse_stage(&self, document: &Document) -> AppResult<ParsedDocument> {
        let bytes = self
            .blob
            .get(&document.blob_path)
            .await
            .map_err(|err| AppError::Upstream(format!("blob download failed: {err:#}")))?;

        let extension = PathBuf::from(&document.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default();
        let temp_path = std::env::temp_dir().join(format!("ingest-{}{}", document.id, extension));

        tokio::fs::write(&temp_path, &bytes)
            .await
            .map_err(|err| AppError::Internal(err.into()))?;

        let parse_path = temp_path.clone();
        let result = tokio::task::spawn_blocking(move || parse_file(&parse_path)).await;
        if let Err(err) = tokio::fs::remove_file(&temp_path).await {
            warn!(path = %temp_path.display(), error = %err, "failed to remove temp file");
        }

        result.map_err(|err| AppError::Internal(anyhow!("parser task failed: {err}")))?
    }

    /// Persist all chunks with their embeddings before extraction begins.
    async fn chunk_stage(
        &self,
        document: &Document,
        parsed: &ParsedDocument,
    ) -> AppResult<Vec<Chunk>> {
        let text_chunks = self.chunker.create_chunks(parsed);
        let mut chunks = Vec::with_capacity(text_chunks.len());

        for tc in text_chunks {
            let chunk = Chunk {
                id: Uuid::new_v4(),
                document_id: document.id,
                section_path: tc.section_path,
                embedding: self.embedder.embed(&tc.text),
                text: tc.text,
                confidence: tc.confidence,
                start_offset: tc.start_offset,
                end_offset: tc.end_offset,
                chunk_index: tc.chunk_index,
            };
            self.tables.chunks.insert(chunk.id, chunk.clone()).await;
            chunks.push(chunk);
        }

        self.tables.sync_all().await?;
        Ok(chunks)
    }

    /// Extract over the whole parsed text and reconcile every candidate
    /// with the approved knowledge base.
    async fn extract_stage(
        &self,
        document: &Document,
        parsed: &ParsedDocument,
        chunks: &[Chunk],
    ) -> AppResult<usize> {
        let schema = SchemaRegistry::global().schema_for(document.doc_type);
        let ctx = ExtractionContext {
            department: document.department,
            doc_type: document.doc_type,
            document_id: document.id,
            filename: document.filename.clone(),
            chunk_index: 0,
        };

        let result = self
            .extractor
            .extract(&parsed.raw_text, schema, &ctx)
            .await
            .map_err(|err| AppError::Upstream(format!("extraction failed: {err:#}")))?;

        let mut candidates = Vec::new();
        if !result.records.is_empty() {
            for record in result.records {
                candidates.push(Candidate {
                    data: record.data,
                    schema_type: record.schema_type,
                    evidence: record.evidence,
                    confidence: record.confidence,
                    needs_review: false,
                    source_section: record.source_section,
                });
            }
        } else if let Some(data) = result.data {
            candidates.push(Candidate {
                data,
                schema_type: schema.name.to_string(),
                evidence: result.evidence,
                confidence: result.confidence,
                needs_review: result.needs_review || !result.valid,
                source_section: None,
            });
        }

        let mut records_created = 0;
        for candidate in candidates {
            if self.reconcile(document, chunks, candidate).await? {
                records_created += 1;
            }
        }

        self.tables.sync_all().await?;
        Ok(records_created)
    }

    /// Returns true when a fresh record was created, false when the
    /// candidate collapsed into a proposed update on an approved record.
    async fn reconcile(
        &self,
        document: &Document,
        chunks: &[Chunk],
        candidate: Candidate,
    ) -> AppResult<bool> {
        let Candidate {
            mut data,
            schema_type,
            evidence,
            confidence,
            needs_review,
            source_section,
        } = candidate;

        let schema = SchemaRegistry::global().schema_for(document.doc_type);
        let primary_key = compute_primary_key(schema, &data);

        if let Some(existing) = self.merge.find_existing(&schema_type, &primary_key).await {
            info!(
                record_id = %existing.id,
                primary_key = %primary_key,
                "duplicate of approved record, creating proposed update"
            );
            self.merge
                .create_proposed_update(&existing, data, Some(document.id))
                .await;
            return Ok(false);
        }

        if let (Some(section), Some(map)) = (source_section, data.as_object_mut()) {
            map.insert("_source_section".to_string(), json!(section));
        }

        let status = if needs_review || confidence < 0.5 {
            RecordStatus::NeedsReview
        } else {
            RecordStatus::Pending
        };

        let record = Record {
            id: Uuid::new_v4(),
            document_id: Some(document.id),
            department: document.department,
            schema_type,
            primary_key,
            completeness_score: completeness::score(document.doc_type, &data),
            data,
            status,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let record_id = record.id;
        self.tables.records.insert(record_id, record).await;

        for pointer in evidence {
            let chunk_id = chunks
                .iter()
                .find(|c| Some(c.chunk_index) == pointer.chunk_index)
                .or_else(|| chunks.first())
                .map(|c| c.id);

            let row = Evidence {
                id: Uuid::new_v4(),
                record_id,
                chunk_id,
                field_path: pointer.field_path,
                excerpt: clip_chars(&pointer.excerpt, 1000),
                start_offset: pointer.start_offset,
                end_offset: pointer.end_offset,
            };
            self.tables.evidence.insert(row.id, row).await;
        }

        Ok(true)
    }
}

fn clip_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::config::LlmConfig;
use crate::error::{AppError, AppResult};
use crate::model::{Department, DocType};
use crate::schema::SchemaDescriptor;

mod claude;
mod evidence;
mod stub;

pub use claude::ClaudeExtractor;
pub use evidence::anchor_evidence;
pub use stub::StubExtractor;

/// Context handed to an extractor alongside the text.
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    pub department: Department,
    pub doc_type: DocType,
    pub document_id: Uuid,
    pub filename: String,
    pub chunk_index: usize,
}

/// Pointer from an extracted field back to the source text.
#[derive(Debug, Clone, Serialize)]
pub struct EvidencePointer {
    /// Dotted path with array indices, e.g. `"steps[0].instruction"`.
    pub field_path: String,
    pub excerpt: String,
    pub chunk_index: Option<usize>,
    pub start_offset: Option<usize>,
    pub end_offset: Option<usize>,
}

/// A single candidate record produced by multi-record extraction.
#[derive(Debug, Clone)]
pub struct ExtractedRecord {
    pub data: Value,
    pub schema_type: String,
    pub evidence: Vec<EvidencePointer>,
    pub confidence: f64,
    pub source_section: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    /// Single-record shape (legacy); `None` in multi-record mode.
    pub data: Option<Value>,
    pub records: Vec<ExtractedRecord>,
    pub valid: bool,
    pub errors: Vec<String>,
    pub evidence: Vec<EvidencePointer>,
    pub confidence: f64,
    pub needs_review: bool,
    pub raw_response: Option<String>,
}

/// The single extraction contract both implementations satisfy. Dispatch
/// happens once at startup via `for_config`; beyond this boundary nothing
/// cares which variant is running.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        text: &str,
        schema: &'static SchemaDescriptor,
        ctx: &ExtractionContext,
    ) -> Result<ExtractionResult>;
}

pub fn for_config(config: &LlmConfig) -> AppResult<Arc<dyn Extractor>> {
    match config.provider.as_str() {
        "claude" => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                AppError::Validation("ANTHROPIC_API_KEY is not configured".to_string())
            })?;
            Ok(Arc::new(ClaudeExtractor::new(
                api_key,
                config.model.clone(),
                None,
            )))
        }
        "stub" => Ok(Arc::new(StubExtractor::default())),
        other => {
            warn!(provider = other, "unknown llm provider, using stub extractor");
            Ok(Arc::new(StubExtractor::default()))
        }
    }
}

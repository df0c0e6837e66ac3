use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::model::{Document, Evidence, ProposedUpdate, Record, RecordAttachment};

fn default_page() -> usize {
    1
}

fn default_limit() -> usize {
    20
}

fn default_search_limit() -> usize {
    10
}

#[derive(Debug, Deserialize)]
pub struct DocumentListQuery {
    pub department: Option<String>,
    pub status: Option<String>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Deserialize)]
pub struct ReviewListQuery {
    pub department: Option<String>,
    pub schema_type: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub department: Option<String>,
    #[serde(rename = "schema")]
    pub schema_type: Option<String>,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// Body of approve/reject calls.
#[derive(Debug, Deserialize)]
pub struct ReviewAction {
    pub actor: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Body of record edits.
#[derive(Debug, Deserialize)]
pub struct RecordUpdate {
    pub data_json: Value,
}

#[derive(Debug, Serialize)]
pub struct DocumentListResponse {
    pub documents: Vec<Document>,
    pub total: usize,
    pub page: usize,
    pub pages: usize,
}

#[derive(Debug, Serialize)]
pub struct AttachmentResponse {
    pub id: Uuid,
    pub filename: String,
    pub file_type: String,
    pub file_size: String,
    pub url: String,
    pub created_at: String,
}

impl AttachmentResponse {
    pub fn new(attachment: RecordAttachment, url: String) -> Self {
        Self {
            id: attachment.id,
            filename: attachment.filename,
            file_type: attachment.file_type,
            file_size: attachment.file_size,
            url,
            created_at: attachment.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecordResponse {
    #[serde(flatten)]
    pub record: Record,
    pub evidence: Vec<Evidence>,
    pub attachments: Vec<AttachmentResponse>,
}

#[derive(Debug, Serialize)]
pub struct RecordListResponse {
    pub records: Vec<Record>,
    pub total: usize,
    pub page: usize,
    pub pages: usize,
}

#[derive(Debug, Serialize)]
pub struct UpdateListResponse {
    pub updates: Vec<ProposedUpdate>,
    pub total: usize,
    pub page: usize,
    pub pages: usize,
}

#[derive(Debug, Serialize)]
pub struct SearchResult {
    pub record_id: Uuid,
    pub department: String,
    pub schema_type: String,
    pub primary_key: String,
    pub data_json: Value,
    pub evidence: Vec<Evidence>,
    pub relevance_score: f64,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub total: usize,
    pub query: String,
}

pub fn page_count(total: usize, limit: usize) -> usize {
    total.div_ceil(limit.max(1))
}

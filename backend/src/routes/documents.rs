use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde_json::{Value, json};
use tracing::warn;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::{Department, DocumentStatus};

use super::AppState;
use super::types::{DocumentListQuery, DocumentListResponse, page_count};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/documents", get(list_documents))
        .route("/documents/{id}", get(get_document).delete(delete_document))
        .route("/documents/{id}/status", get(document_status))
        .route("/documents/{id}/chunks", get(document_chunks))
        .route("/documents/{id}/records", get(document_records))
}

async fn list_documents(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DocumentListQuery>,
) -> AppResult<Json<DocumentListResponse>> {
    let department = parse_department(query.department.as_deref())?;
    let status = match query.status.as_deref() {
        Some(value) => Some(
            DocumentStatus::parse(value)
                .ok_or_else(|| AppError::Validation(format!("unknown status: {value}")))?,
        ),
        None => None,
    };

    let limit = query.limit.clamp(1, 100);
    let (documents, total) = state
        .tables
        .list_documents(department, status, query.page, limit)
        .await;

    Ok(Json(DocumentListResponse {
        documents,
        total,
        page: query.page.max(1),
        pages: page_count(total, limit),
    }))
}

async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let document = state.tables.document(id).await?;
    Ok(Json(json!(document)))
}

async fn document_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let document = state.tables.document(id).await?;

    let progress = match document.status {
        DocumentStatus::Parsing => Some("parsing document"),
        DocumentStatus::Extracting => Some("extracting records"),
        DocumentStatus::PendingReview => Some("ready for review"),
        DocumentStatus::Completed => Some("completed"),
        _ => None,
    };
    let errors: Vec<&String> = document.error_message.iter().collect();

    Ok(Json(json!({
        "id": document.id,
        "status": document.status,
        "progress": progress,
        "errors": errors,
    })))
}

async fn document_chunks(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    state.tables.document(id).await?;
    let chunks = state.tables.chunks_for_document(id).await;

    let chunks: Vec<Value> = chunks
        .into_iter()
        .map(|c| {
            json!({
                "id": c.id,
                "section_path": c.section_path,
                "text": c.text,
                "confidence": c.confidence,
                "chunk_index": c.chunk_index,
            })
        })
        .collect();

    Ok(Json(json!({ "document_id": id.to_string(), "chunks": chunks })))
}

async fn document_records(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    state.tables.document(id).await?;
    let records = state.tables.records_for_document(id).await;

    let records: Vec<Value> = records
        .into_iter()
        .map(|r| {
            json!({
                "id": r.id,
                "schema_type": r.schema_type,
                "primary_key": r.primary_key,
                "status": r.status,
                "completeness_score": r.completeness_score,
                "data_json": r.data,
            })
        })
        .collect();

    Ok(Json(json!({ "document_id": id.to_string(), "records": records })))
}

/// Operator delete: cascades to chunks and records, then removes the
/// underlying blobs best-effort.
async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let blob_paths = state.tables.delete_document_cascade(id).await?;

    for path in blob_paths {
        if let Err(err) = state.blob.delete(&path).await {
            warn!(path = %path, error = %err, "failed to delete blob");
        }
    }

    state
        .tables
        .audit("delete", "Document", id, "operator", None)
        .await;
    state.tables.sync_all().await?;

    Ok(Json(json!({
        "message": "document deleted",
        "document_id": id.to_string(),
    })))
}

pub(super) fn parse_department(value: Option<&str>) -> AppResult<Option<Department>> {
    match value {
        Some(value) => Department::parse(value)
            .map(Some)
            .ok_or_else(|| AppError::Validation(format!("unknown department: {value}"))),
        None => Ok(None),
    }
}

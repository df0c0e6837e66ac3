use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    routing::{delete, get, post},
};
use chrono::Utc;
use serde_json::{Value, json};
use tracing::warn;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::{RecordAttachment, RecordStatus};

use super::AppState;
use super::documents::parse_department;
use super::types::{
    AttachmentResponse, PageQuery, RecordListResponse, RecordResponse, RecordUpdate, ReviewAction,
    ReviewListQuery, UpdateListResponse, page_count,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/review", get(list_review_queue))
        .route("/review/updates/pending", get(list_pending_updates))
        .route("/review/updates/{id}", get(get_proposed_update))
        .route("/review/updates/{id}/approve", post(approve_update))
        .route("/review/updates/{id}/reject", post(reject_update))
        .route("/review/{id}", get(get_record).put(edit_record))
        .route("/review/{id}/approve", post(approve_record))
        .route("/review/{id}/reject", post(reject_record))
        .route(
            "/review/{id}/attachments",
            get(list_attachments).post(upload_attachments),
        )
        .route(
            "/review/{id}/attachments/{attachment_id}",
            delete(delete_attachment),
        )
}

/// Review queue: pending and needs_review records by default, least
/// complete first.
async fn list_review_queue(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReviewListQuery>,
) -> AppResult<Json<RecordListResponse>> {
    let department = parse_department(query.department.as_deref())?;
    let status = match query.status.as_deref() {
        Some(value) => Some(
            RecordStatus::parse(value)
                .ok_or_else(|| AppError::Validation(format!("unknown status: {value}")))?,
        ),
        None => None,
    };
    let sort_by = query.sort_by.as_deref().unwrap_or("completeness");
    if !matches!(sort_by, "completeness" | "created" | "updated") {
        return Err(AppError::Validation(format!("unknown sort field: {sort_by}")));
    }

    let limit = query.limit.clamp(1, 100);
    let (records, total) = state
        .tables
        .review_queue(
            department,
            query.schema_type.as_deref(),
            status,
            sort_by,
            query.page,
            limit,
        )
        .await;

    Ok(Json(RecordListResponse {
        records,
        total,
        page: query.page.max(1),
        pages: page_count(total, limit),
    }))
}

/// One record with its evidence and attachments; each attachment carries a
/// short-lived signed URL.
async fn get_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<RecordResponse>> {
    let record = state.tables.record(id).await?;
    let evidence = state.tables.evidence_for_record(id).await;
    let ttl = state.config.storage.url_ttl_secs;
    let attachments = state
        .tables
        .attachments_for_record(id)
        .await
        .into_iter()
        .map(|a| {
            let url = state.blob.sign(&a.blob_path, ttl);
            AttachmentResponse::new(a, url)
        })
        .collect();

    Ok(Json(RecordResponse {
        record,
        evidence,
        attachments,
    }))
}

async fn approve_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(action): Json<ReviewAction>,
) -> AppResult<Json<Value>> {
    state.review.approve(id, &action.actor, action.reason).await?;
    Ok(Json(json!({ "message": "record approved", "record_id": id.to_string() })))
}

async fn reject_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(action): Json<ReviewAction>,
) -> AppResult<Json<Value>> {
    state.review.reject(id, &action.actor, action.reason).await?;
    Ok(Json(json!({ "message": "record rejected", "record_id": id.to_string() })))
}

async fn edit_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(update): Json<RecordUpdate>,
) -> AppResult<Json<Value>> {
    state.review.edit(id, update.data_json, "user").await?;
    Ok(Json(json!({ "message": "record updated", "record_id": id.to_string() })))
}

async fn list_pending_updates(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<UpdateListResponse>> {
    let limit = query.limit.clamp(1, 100);
    let (updates, total) = state.tables.pending_updates(query.page, limit).await;
    Ok(Json(UpdateListResponse {
        updates,
        total,
        page: query.page.max(1),
        pages: page_count(total, limit),
    }))
}

async fn get_proposed_update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let update = state.tables.proposed_update(id).await?;
    Ok(Json(json!(update)))
}

async fn approve_update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(action): Json<ReviewAction>,
) -> AppResult<Json<Value>> {
    state.review.approve_update(id, &action.actor).await?;
    Ok(Json(json!({ "message": "update approved", "update_id": id.to_string() })))
}

async fn reject_update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(action): Json<ReviewAction>,
) -> AppResult<Json<Value>> {
    state
        .review
        .reject_update(id, &action.actor, action.reason)
        .await?;
    Ok(Json(json!({ "message": "update rejected", "update_id": id.to_string() })))
}

async fn upload_attachments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    state.tables.record(id).await?;

    let mut uploaded = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::Validation(format!("invalid multipart payload: {err}")))?
    {
        if !matches!(field.name(), Some("files") | Some("file")) {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::Validation("uploaded file missing filename".into()))?;
        let file_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|err| AppError::Validation(format!("failed to read upload field: {err}")))?;

        let blob_path = format!("attachments/{id}/{filename}");
        state
            .blob
            .put(&blob_path, &bytes)
            .await
            .map_err(|err| AppError::Upstream(format!("attachment upload failed: {err:#}")))?;

        let attachment = RecordAttachment {
            id: Uuid::new_v4(),
            record_id: id,
            filename: filename.clone(),
            file_type: file_type.clone(),
            blob_path,
            file_size: human_size(bytes.len()),
            created_at: Utc::now(),
        };
        state
            .tables
            .attachments
            .insert(attachment.id, attachment)
            .await;

        uploaded.push(json!({ "filename": filename, "file_type": file_type }));
    }

    state
        .tables
        .audit(
            "attach",
            "Record",
            id,
            "user",
            Some(json!({ "files": uploaded.len() })),
        )
        .await;
    state.tables.sync_all().await?;

    Ok(Json(json!({
        "message": format!("{} file(s) uploaded", uploaded.len()),
        "files": uploaded,
    })))
}

async fn list_attachments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    state.tables.record(id).await?;
    let ttl = state.config.storage.url_ttl_secs;

    let attachments: Vec<AttachmentResponse> = state
        .tables
        .attachments_for_record(id)
        .await
        .into_iter()
        .map(|a| {
            let url = state.blob.sign(&a.blob_path, ttl);
            AttachmentResponse::new(a, url)
        })
        .collect();

    Ok(Json(json!({ "attachments": attachments })))
}

/// Blob-store failures during deletion are logged and swallowed; the row is
/// gone either way.
async fn delete_attachment(
    State(state): State<Arc<AppState>>,
    Path((id, attachment_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Value>> {
    let attachment = state
        .tables
        .attachments
        .get(attachment_id)
        .await
        .filter(|a| a.record_id == id)
        .ok_or_else(|| AppError::NotFound(format!("attachment not found: {attachment_id}")))?;

    state.tables.attachments.delete(&[attachment_id]).await;
    if let Err(err) = state.blob.delete(&attachment.blob_path).await {
        warn!(path = %attachment.blob_path, error = %err, "failed to delete attachment blob");
    }

    state
        .tables
        .audit(
            "delete_attachment",
            "Record",
            id,
            "user",
            Some(json!({ "attachment_id": attachment_id.to_string() })),
        )
        .await;
    state.tables.sync_all().await?;

    Ok(Json(json!({
        "message": "attachment deleted",
        "attachment_id": attachment_id.to_string(),
    })))
}

fn human_size(bytes: usize) -> String {
    if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

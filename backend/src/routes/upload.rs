use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Multipart, State},
    routing::{get, post},
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::{Confidentiality, Department, DocType, Document, DocumentStatus};
use crate::parsers;
use crate::pipeline::IngestJob;
use crate::schema::SchemaRegistry;

use super::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/upload", post(upload_documents))
        .route("/upload/doc-types", get(doc_types))
}

struct UploadForm {
    files: Vec<(String, Vec<u8>)>,
    department: Department,
    doc_type: DocType,
    version_date: DateTime<Utc>,
    owner: String,
    confidentiality: Confidentiality,
}

/// Multipart upload of one or more documents. Each file gets its own result
/// entry; a bad file never fails the whole batch.
async fn upload_documents(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> AppResult<Json<Value>> {
    let mut form = read_form(multipart).await?;

    let registry = SchemaRegistry::global();
    if !registry.is_permitted(form.department, form.doc_type) {
        return Err(AppError::Validation(format!(
            "doc type '{}' is not permitted for department '{}'",
            form.doc_type.as_str(),
            form.department.as_str()
        )));
    }

    let mut results: Vec<Value> = Vec::new();
    let mut uploaded = 0usize;

    let files = std::mem::take(&mut form.files);
    for (filename, bytes) in files {
        if !parsers::is_supported(&filename) {
            results.push(json!({
                "filename": filename,
                "error": "unsupported file type",
            }));
            continue;
        }

        match store_document(&state, &form, &filename, &bytes).await {
            Ok(document_id) => {
                uploaded += 1;
                results.push(json!({
                    "document_id": document_id.to_string(),
                    "filename": filename,
                    "status": "processing",
                }));
            }
            Err(err) => {
                warn!(filename = %filename, error = %err, "upload failed");
                results.push(json!({
                    "filename": filename,
                    "error": err.to_string(),
                }));
            }
        }
    }

    let failed = results.len() - uploaded;
    Ok(Json(json!({
        "uploaded": uploaded,
        "failed": failed,
        "results": results,
    })))
}

async fn store_document(
    state: &Arc<AppState>,
    form: &UploadForm,
    filename: &str,
    bytes: &[u8],
) -> AppResult<Uuid> {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default();
    let blob_path = format!("documents/{}{}", Uuid::new_v4(), extension);

    state
        .blob
        .put(&blob_path, bytes)
        .await
        .map_err(|err| AppError::Upstream(format!("blob upload failed: {err:#}")))?;

    let document = Document {
        id: Uuid::new_v4(),
        filename: filename.to_string(),
        department: form.department,
        doc_type: form.doc_type,
        version_date: form.version_date,
        owner: form.owner.clone(),
        confidentiality: form.confidentiality,
        status: DocumentStatus::Uploading,
        blob_path,
        error_message: None,
        uploaded_at: Utc::now(),
    };
    let document_id = document.id;
    state.tables.documents.insert(document_id, document).await;

    state
        .tables
        .audit(
            "upload",
            "Document",
            document_id,
            &form.owner,
            Some(json!({
                "filename": filename,
                "department": form.department.as_str(),
            })),
        )
        .await;
    state.tables.sync_all().await?;

    if let Err(err) = state.jobs.send(IngestJob { document_id }).await {
        warn!(document_id = %document_id, error = %err, "failed to dispatch ingestion job");
    }

    info!(document_id = %document_id, filename, "document uploaded");
    Ok(document_id)
}

async fn read_form(mut multipart: Multipart) -> AppResult<UploadForm> {
    let mut files = Vec::new();
    let mut department = None;
    let mut doc_type = None;
    let mut version_date = None;
    let mut owner = None;
    let mut confidentiality = Confidentiality::Internal;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::Validation(format!("invalid multipart payload: {err}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" | "file" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::Validation("uploaded file missing filename".into()))?;
                let bytes = field.bytes().await.map_err(|err| {
                    AppError::Validation(format!("failed to read upload field: {err}"))
                })?;
                files.push((filename, bytes.to_vec()));
            }
            "department" => {
                let value = text_field(field).await?;
                department = Some(Department::parse(&value).ok_or_else(|| {
                    AppError::Validation(format!("unknown department: {value}"))
                })?);
            }
            "doc_type" => {
                let value = text_field(field).await?;
                doc_type = Some(DocType::parse(&value).ok_or_else(|| {
                    AppError::Validation(format!("unknown doc type: {value}"))
                })?);
            }
            "version_date" => {
                let value = text_field(field).await?;
                version_date = Some(parse_version_date(&value)?);
            }
            "owner" => owner = Some(text_field(field).await?),
            "confidentiality" => {
                let value = text_field(field).await?;
                confidentiality = Confidentiality::parse(&value).ok_or_else(|| {
                    AppError::Validation(format!("unknown confidentiality: {value}"))
                })?;
            }
            _ => {}
        }
    }

    if files.is_empty() {
        return Err(AppError::Validation("no files in upload".into()));
    }

    Ok(UploadForm {
        files,
        department: department
            .ok_or_else(|| AppError::Validation("department is required".into()))?,
        doc_type: doc_type.ok_or_else(|| AppError::Validation("doc_type is required".into()))?,
        version_date: version_date
            .ok_or_else(|| AppError::Validation("version_date is required".into()))?,
        owner: owner.ok_or_else(|| AppError::Validation("owner is required".into()))?,
        confidentiality,
    })
}

async fn text_field(field: axum::extract::multipart::Field<'_>) -> AppResult<String> {
    field
        .text()
        .await
        .map_err(|err| AppError::Validation(format!("failed to read form field: {err}")))
}

fn parse_version_date(value: &str) -> AppResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::MIN).and_utc());
    }
    Err(AppError::Validation(format!(
        "version_date is not an ISO 8601 date: {value}"
    )))
}

/// Permitted doc types per department, for upload form dropdowns.
async fn doc_types() -> Json<Value> {
    let registry = SchemaRegistry::global();
    let map: serde_json::Map<String, Value> = Department::ALL
        .iter()
        .map(|dept| {
            let types: Vec<&str> = registry
                .types_for(*dept)
                .iter()
                .map(|t| t.as_str())
                .collect();
            (dept.as_str().to_string(), json!(types))
        })
        .collect();
    Json(Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_date_accepts_common_iso_shapes() {
        assert!(parse_version_date("2026-01-15T10:30:00Z").is_ok());
        assert!(parse_version_date("2026-01-15T10:30:00+02:00").is_ok());
        assert!(parse_version_date("2026-01-15T10:30:00").is_ok());
        assert!(parse_version_date("2026-01-15").is_ok());
        assert!(parse_version_date("15.01.2026").is_err());
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use chrono::{Duration, Utc};
use serde_json::{Value, json};

use crate::completeness;
use crate::error::AppResult;
use crate::model::{Department, RecordStatus};
use crate::schema::SchemaRegistry;

use super::AppState;
use super::types::ActivityQuery;

const STALE_AFTER_DAYS: i64 = 180;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/dashboard/stats", get(dashboard_stats))
        .route("/dashboard/activity", get(dashboard_activity))
}

async fn dashboard_stats(State(state): State<Arc<AppState>>) -> AppResult<Json<Value>> {
    let total_documents = state.tables.documents.len().await;
    let records = state.tables.records.all().await;

    let pending_reviews = records
        .iter()
        .filter(|r| matches!(r.status, RecordStatus::Pending | RecordStatus::NeedsReview))
        .count();
    let approved_records = records
        .iter()
        .filter(|r| r.status == RecordStatus::Approved)
        .count();
    let rejected_records = records
        .iter()
        .filter(|r| r.status == RecordStatus::Rejected)
        .count();

    // Average completeness of approved records per department.
    let mut completeness_by_department = BTreeMap::new();
    for dept in Department::ALL {
        let scores: Vec<f64> = records
            .iter()
            .filter(|r| r.department == dept && r.status == RecordStatus::Approved)
            .map(|r| r.completeness_score)
            .collect();
        let avg = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        completeness_by_department
            .insert(dept.as_str(), (avg * 100.0).round() / 100.0);
    }

    // Approved records untouched for half a year.
    let cutoff = Utc::now() - Duration::days(STALE_AFTER_DAYS);
    let mut stale: Vec<&crate::model::Record> = records
        .iter()
        .filter(|r| r.status == RecordStatus::Approved && r.updated_at < cutoff)
        .collect();
    stale.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
    let stale_records: Vec<Value> = stale
        .iter()
        .take(10)
        .map(|r| {
            let age_months = (Utc::now() - r.updated_at).num_days() / 30;
            json!({
                "record_id": r.id.to_string(),
                "schema_type": r.schema_type,
                "primary_key": r.primary_key,
                "age_months": age_months,
            })
        })
        .collect();

    // Most frequently missing required fields across the review queue.
    let registry = SchemaRegistry::global();
    let mut missing_counts: BTreeMap<(String, String), usize> = BTreeMap::new();
    for record in records
        .iter()
        .filter(|r| matches!(r.status, RecordStatus::Pending | RecordStatus::NeedsReview))
        .take(100)
    {
        let Ok(schema) = registry.schema_by_name(&record.schema_type) else {
            continue;
        };
        for field in completeness::missing(schema.doc_type, &record.data) {
            *missing_counts
                .entry((record.schema_type.clone(), field))
                .or_insert(0) += 1;
        }
    }
    let mut top_missing: Vec<(&(String, String), &usize)> = missing_counts.iter().collect();
    top_missing.sort_by(|a, b| b.1.cmp(a.1));
    let top_missing_fields: Vec<Value> = top_missing
        .into_iter()
        .take(10)
        .map(|((schema_type, field), count)| {
            json!({
                "schema_type": schema_type,
                "field": field,
                "count": count,
            })
        })
        .collect();

    Ok(Json(json!({
        "total_documents": total_documents,
        "pending_reviews": pending_reviews,
        "approved_records": approved_records,
        "rejected_records": rejected_records,
        "completeness_by_department": completeness_by_department,
        "stale_records": stale_records,
        "top_missing_fields": top_missing_fields,
    })))
}

/// Most recent audit-log entries.
async fn dashboard_activity(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ActivityQuery>,
) -> AppResult<Json<Value>> {
    let limit = query.limit.clamp(1, 100);
    let entries = state.tables.audit_tail(limit).await;

    let activity: Vec<Value> = entries
        .into_iter()
        .map(|e| {
            json!({
                "id": e.id,
                "action": e.action,
                "entity_type": e.entity_type,
                "entity_id": e.entity_id,
                "actor": e.actor,
                "details": e.details,
                "timestamp": e.timestamp.to_rfc3339(),
            })
        })
        .collect();

    Ok(Json(json!({ "activity": activity })))
}

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde_json::{Value, json};

use crate::error::AppResult;
use crate::model::RecordStatus;
use crate::schema::SchemaRegistry;
use crate::search;

use super::AppState;
use super::documents::parse_department;
use super::types::{SearchQuery, SearchResponse, SearchResult};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/knowledge/search", get(search_knowledge))
        .route("/knowledge/schemas", get(list_schemas))
        .route("/knowledge/stats", get(knowledge_stats))
}

/// Query surface for agents and integrations. Only approved records are
/// visible here.
async fn search_knowledge(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<SearchResponse>> {
    let department = parse_department(query.department.as_deref())?;
    let limit = query.limit.clamp(1, 100);

    let hits = search::search(
        &state.tables,
        &query.q,
        department,
        query.schema_type.as_deref(),
        limit,
    )
    .await;

    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        let evidence = state.tables.evidence_for_record(hit.record.id).await;
        results.push(SearchResult {
            record_id: hit.record.id,
            department: hit.record.department.as_str().to_string(),
            schema_type: hit.record.schema_type,
            primary_key: hit.record.primary_key,
            data_json: hit.record.data,
            evidence,
            relevance_score: hit.relevance_score,
        });
    }

    Ok(Json(SearchResponse {
        total: results.len(),
        results,
        query: query.q,
    }))
}

/// All registered schemas with their field tables.
async fn list_schemas() -> Json<Value> {
    let mut out = serde_json::Map::new();
    for schema in SchemaRegistry::global().all_schemas() {
        let fields: Vec<Value> = schema
            .fields
            .iter()
            .map(|f| {
                json!({
                    "name": f.name,
                    "type": f.kind.as_str(),
                    "required": f.required,
                    "description": f.description,
                })
            })
            .collect();

        out.insert(
            schema.name.to_string(),
            json!({
                "required_fields": schema.required_fields,
                "primary_key_fields": schema.primary_key_fields,
                "fields": fields,
            }),
        );
    }
    Json(Value::Object(out))
}

async fn knowledge_stats(State(state): State<Arc<AppState>>) -> AppResult<Json<Value>> {
    let records = state.tables.records.all().await;

    let mut by_status: BTreeMap<&str, usize> = BTreeMap::new();
    let mut by_department: BTreeMap<&str, usize> = BTreeMap::new();
    let mut by_schema: BTreeMap<String, usize> = BTreeMap::new();

    for record in &records {
        *by_status.entry(record.status.as_str()).or_insert(0) += 1;
        if record.status == RecordStatus::Approved {
            *by_department
                .entry(record.department.as_str())
                .or_insert(0) += 1;
            *by_schema.entry(record.schema_type.clone()).or_insert(0) += 1;
        }
    }

    let total_approved = by_status.get("approved").copied().unwrap_or(0);
    Ok(Json(json!({
        "by_status": by_status,
        "by_department": by_department,
        "by_schema": by_schema,
        "total_approved": total_approved,
    })))
}

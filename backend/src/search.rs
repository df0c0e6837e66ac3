use std::sync::Arc;

use crate::model::{Department, Record};
use crate::storage::Tables;

/// One scored hit; evidence is attached by the route layer.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: Record,
    pub relevance_score: f64,
}

/// Substring relevance over approved records only:
/// `score = (2·[q in primary_key] + min(0.5·count(q in data), 3)) · (0.5 + 0.5·completeness)`,
/// case-insensitive. Records scoring 0 are dropped; results come back sorted
/// descending and clipped to `limit`.
pub async fn search(
    tables: &Arc<Tables>,
    query: &str,
    department: Option<Department>,
    schema_type: Option<&str>,
    limit: usize,
) -> Vec<ScoredRecord> {
    let query_lower = query.to_lowercase();
    let candidates = tables.approved_records(department, schema_type).await;

    let mut results: Vec<ScoredRecord> = candidates
        .into_iter()
        .filter_map(|record| {
            let score = relevance(&record, &query_lower);
            (score > 0.0).then_some(ScoredRecord {
                record,
                relevance_score: score,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(limit);
    results
}

pub fn relevance(record: &Record, query_lower: &str) -> f64 {
    if query_lower.is_empty() {
        return 0.0;
    }

    let mut score = 0.0;

    if record.primary_key.to_lowercase().contains(query_lower) {
        score += 2.0;
    }

    let data_str = record.data.to_string().to_lowercase();
    let occurrences = count_occurrences(&data_str, query_lower);
    if occurrences > 0 {
        score += (occurrences as f64 * 0.5).min(3.0);
    }

    score *= 0.5 + record.completeness_score * 0.5;
    (score * 100.0).round() / 100.0
}

fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut start = 0;
    while let Some(idx) = haystack[start..].find(needle) {
        count += 1;
        start += idx + needle.len();
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Department, RecordStatus};
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn record(primary_key: &str, data: serde_json::Value, completeness: f64) -> Record {
        Record {
            id: Uuid::new_v4(),
            document_id: None,
            department: Department::Sales,
            schema_type: "Objection".to_string(),
            primary_key: primary_key.to_string(),
            data,
            completeness_score: completeness,
            status: RecordStatus::Approved,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn primary_key_hit_plus_data_occurrences() {
        let r = record(
            "obj-teuer",
            json!({ "objection_text": "Das ist mir zu teuer", "response": "teuer ist relativ" }),
            1.0,
        );
        // 2.0 (pk) + 2 occurrences * 0.5 = 3.0, scaled by (0.5 + 0.5) = 1.0
        assert_eq!(relevance(&r, "teuer"), 3.0);
    }

    #[test]
    fn data_occurrences_are_capped() {
        let many = vec!["teuer"; 20].join(" ");
        let r = record("other", json!({ "text": many }), 1.0);
        assert_eq!(relevance(&r, "teuer"), 3.0);
    }

    #[test]
    fn completeness_scales_the_score() {
        let r = record("obj-1", json!({ "text": "teuer" }), 0.0);
        // 0.5 occurrence score * 0.5 completeness factor
        assert_eq!(relevance(&r, "teuer"), 0.25);
    }

    #[test]
    fn no_match_scores_zero() {
        let r = record("obj-1", json!({ "text": "etwas anderes" }), 1.0);
        assert_eq!(relevance(&r, "teuer"), 0.0);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let r = record("obj-1", json!({ "text": "ZU TEUER" }), 1.0);
        assert!(relevance(&r, "teuer") > 0.0);
    }
}

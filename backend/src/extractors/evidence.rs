use serde_json::Value;

use super::EvidencePointer;

/// Anchor extracted values back into the source text. Every string longer
/// than three characters is probed by its first 50 characters
/// (case-insensitively); a hit yields an excerpt of ±50 characters around
/// the match plus the exact offsets. Lists recurse as `field[i]`, maps as
/// `field.key`.
pub fn anchor_evidence(data: &Value, text: &str, chunk_index: usize) -> Vec<EvidencePointer> {
    let text_lower = text.to_lowercase();
    let mut pointers = Vec::new();

    if let Some(map) = data.as_object() {
        for (field, value) in map {
            find_evidence(value, field, text, &text_lower, chunk_index, &mut pointers);
        }
    }

    pointers
}

fn find_evidence(
    value: &Value,
    field_path: &str,
    text: &str,
    text_lower: &str,
    chunk_index: usize,
    out: &mut Vec<EvidencePointer>,
) {
    match value {
        Value::String(s) if s.len() > 3 => {
            let value_lower = s.to_lowercase();
            let probe: String = value_lower.chars().take(50).collect();
            if probe.is_empty() {
                return;
            }
            if let Some(idx) = text_lower.find(&probe) {
                let end = idx + s.len();
                let excerpt_start = floor_boundary(text, idx.saturating_sub(50));
                let excerpt_end = ceil_boundary(text, end.saturating_add(50).min(text.len()));
                let excerpt = text
                    .get(excerpt_start..excerpt_end)
                    .unwrap_or_default()
                    .to_string();

                out.push(EvidencePointer {
                    field_path: field_path.to_string(),
                    excerpt,
                    chunk_index: Some(chunk_index),
                    start_offset: Some(idx),
                    end_offset: Some(end),
                });
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                find_evidence(
                    item,
                    &format!("{field_path}[{i}]"),
                    text,
                    text_lower,
                    chunk_index,
                    out,
                );
            }
        }
        Value::Object(map) => {
            for (key, inner) in map {
                find_evidence(
                    inner,
                    &format!("{field_path}.{key}"),
                    text,
                    text_lower,
                    chunk_index,
                    out,
                );
            }
        }
        _ => {}
    }
}

fn floor_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

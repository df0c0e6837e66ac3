use std::collections::BTreeSet;
use std::sync::LazyLock;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value, json};

use crate::schema::{FieldKind, FieldSpec, SchemaDescriptor};

use super::{EvidencePointer, ExtractedRecord, ExtractionContext, ExtractionResult, Extractor};

/// Field-name patterns tried in order, German first. A pattern is matched
/// both inline (`"titel: value"`) and as a markdown heading with the value
/// in the following block.
static FIELD_PATTERNS: &[(&str, &[&str])] = &[
    ("title", &["titel:", "überschrift:", "name:"]),
    ("question", &["frage:", "question:"]),
    ("answer", &["antwort:", "answer:", "lösung:"]),
    ("content", &["inhalt:", "content:", "text:"]),
    ("description", &["beschreibung:", "description:"]),
    ("problem", &["problem:", "fehler:", "issue:"]),
    ("solution", &["lösung:", "solution:"]),
    ("steps", &["schritte:", "steps:", "anleitung:"]),
    ("name", &["name:", "bezeichnung:"]),
    ("id", &["id:", "nummer:", "kennung:"]),
    ("artnr", &["artikelnummer:", "artnr:", "art.nr:", "art-nr:"]),
    ("version", &["version:", "v.:"]),
    ("subject", &["betreff:", "subject:"]),
    ("body", &["text:", "body:", "inhalt:"]),
    ("warnings", &["warnung:", "warning:", "achtung:", "vorsicht:"]),
    ("requirements", &["anforderung:", "requirement:"]),
    ("objection_text", &["einwand:", "objection:"]),
    ("response", &["antwort:", "response:", "erwiderung:"]),
    ("role", &["rolle:", "position:", "role:"]),
    ("category", &["kategorie:", "category:"]),
];

static TITEL_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)Titel:\s*").unwrap());
static TITEL_HEAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^Titel:\s*(.+?)(?:\s*Beschreibung:|$)").unwrap());
static MD_HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(#{1,3})\s+(.+)$").unwrap());

/// Rule-based extractor for development and stereotyped document shapes.
/// Detects multiple entities per document and never fails the pipeline: a
/// text nothing matches simply yields zero records.
#[derive(Debug, Default, Clone)]
pub struct StubExtractor;

#[async_trait]
impl Extractor for StubExtractor {
    async fn extract(
        &self,
        text: &str,
        schema: &'static SchemaDescriptor,
        ctx: &ExtractionContext,
    ) -> Result<ExtractionResult> {
        let sections = split_into_sections(text);

        if sections.len() > 1 {
            let records: Vec<ExtractedRecord> = sections
                .iter()
                .filter_map(|(title, body)| extract_record(body, title, schema, ctx))
                .collect();

            let confidence = if records.is_empty() { 0.3 } else { 0.7 };
            Ok(ExtractionResult {
                data: None,
                valid: !records.is_empty(),
                errors: Vec::new(),
                evidence: Vec::new(),
                confidence,
                needs_review: records.is_empty(),
                raw_response: Some(format!("Extracted {} records", records.len())),
                records,
            })
        } else {
            Ok(extract_single(text, schema, ctx))
        }
    }
}

/// Split a document into candidate entity sections. `"Titel:"` markers win
/// when at least two are present; markdown headings are the fallback; the
/// whole text is the last resort.
fn split_into_sections(text: &str) -> Vec<(String, String)> {
    let marker_positions: Vec<usize> = TITEL_MARKER.find_iter(text).map(|m| m.start()).collect();

    if marker_positions.len() >= 2 {
        let mut sections = Vec::new();
        for (i, start) in marker_positions.iter().enumerate() {
            let end = marker_positions
                .get(i + 1)
                .copied()
                .unwrap_or(text.len());
            let slice = text[*start..end].trim();

            let title = match TITEL_HEAD.captures(slice) {
                Some(caps) => first_line_clipped(caps[1].trim(), 100),
                None => clip_chars(slice.get(7..).unwrap_or_default().trim(), 100),
            };

            // Very short slices and intros without a description are noise.
            if slice.chars().count() > 200 && slice.contains("Beschreibung:") {
                sections.push((title, slice.to_string()));
            }
        }
        return sections;
    }

    // Fallback: markdown headings with substantial bodies.
    let mut sections = Vec::new();
    let mut current_title: Option<String> = None;
    let mut current_content: Vec<&str> = Vec::new();

    for line in text.lines() {
        if let Some(caps) = MD_HEADING.captures(line) {
            if let Some(title) = current_title.take() {
                let content = current_content.join("\n");
                if content.chars().count() > 100 {
                    sections.push((title, content));
                }
            }
            current_title = Some(caps[2].trim().to_string());
            current_content.clear();
        } else {
            current_content.push(line);
        }
    }
    if let Some(title) = current_title {
        let content = current_content.join("\n");
        if content.chars().count() > 100 {
            sections.push((title, content));
        }
    }

    if sections.is_empty() {
        let first_line = first_line_clipped(text, 100);
        sections.push((first_line, text.to_string()));
    }
    sections
}

fn extract_record(
    text: &str,
    section_title: &str,
    schema: &'static SchemaDescriptor,
    ctx: &ExtractionContext,
) -> Option<ExtractedRecord> {
    let mut data = Map::new();
    let mut evidence = Vec::new();

    // The section title always doubles as the record title.
    data.insert("title".to_string(), json!(section_title));
    evidence.push(EvidencePointer {
        field_path: "title".to_string(),
        excerpt: section_title.to_string(),
        chunk_index: Some(ctx.chunk_index),
        start_offset: None,
        end_offset: None,
    });

    for spec in schema.fields {
        if spec.name == "title" {
            continue;
        }
        if let (Some(value), excerpt) = extract_field(text, spec) {
            data.insert(spec.name.to_string(), value);
            if let Some(excerpt) = excerpt {
                evidence.push(EvidencePointer {
                    field_path: spec.name.to_string(),
                    excerpt: clip_chars(&excerpt, 500),
                    chunk_index: Some(ctx.chunk_index),
                    start_offset: None,
                    end_offset: None,
                });
            }
        }
    }

    if schema.name == "ProductSpec" {
        extract_product_fields(text, &mut data);
    }

    // The synthetic title alone is not a capture unless the schema really
    // has a title field.
    if data.len() == 1 && schema.field("title").is_none() {
        return None;
    }

    let data = Value::Object(data);
    let errors = schema.validate(&data);

    Some(ExtractedRecord {
        data,
        schema_type: schema.name.to_string(),
        evidence,
        confidence: if errors.is_empty() { 0.6 } else { 0.4 },
        source_section: Some(section_title.to_string()),
    })
}

/// Single-record extraction over the whole text (legacy shape).
fn extract_single(
    text: &str,
    schema: &'static SchemaDescriptor,
    ctx: &ExtractionContext,
) -> ExtractionResult {
    let mut data = Map::new();
    let mut evidence = Vec::new();

    for spec in schema.fields {
        if let (Some(value), excerpt) = extract_field(text, spec) {
            data.insert(spec.name.to_string(), value);
            if let Some(excerpt) = excerpt {
                evidence.push(EvidencePointer {
                    field_path: spec.name.to_string(),
                    excerpt: clip_chars(&excerpt, 500),
                    chunk_index: Some(ctx.chunk_index),
                    start_offset: None,
                    end_offset: None,
                });
            }
        }
    }

    if schema.name == "ProductSpec" {
        extract_product_fields(text, &mut data);
    }

    let data = Value::Object(data);
    let errors = schema.validate(&data);
    let valid = errors.is_empty();
    let has_data = !data.as_object().map(Map::is_empty).unwrap_or(true);
    let raw_response = serde_json::to_string_pretty(&data).ok();

    ExtractionResult {
        data: has_data.then_some(data),
        records: Vec::new(),
        valid,
        errors,
        evidence,
        confidence: if valid { 0.6 } else { 0.3 },
        needs_review: !valid,
        raw_response,
    }
}

fn extract_field(text: &str, spec: &FieldSpec) -> (Option<Value>, Option<String>) {
    let fallback_patterns = [format!("{}:", spec.name.to_lowercase())];
    let patterns: Vec<&str> = FIELD_PATTERNS
        .iter()
        .find(|(name, _)| *name == spec.name)
        .map(|(_, patterns)| patterns.to_vec())
        .unwrap_or_else(|| fallback_patterns.iter().map(String::as_str).collect());

    for pattern in &patterns {
        // Inline `"pattern value"` capture, first match wins.
        let inline = Regex::new(&format!(r"(?i){}\s*([^\n]+)", regex::escape(pattern)))
            .expect("inline field pattern");
        if let Some(caps) = inline.captures(text) {
            let excerpt = caps[1].trim().to_string();
            return (coerce(&excerpt, spec.kind), Some(excerpt));
        }

        // Markdown-labelled value: `## Question` followed by the answer in
        // the next block.
        let label = pattern.trim_end_matches(':');
        if let Some(block) = heading_value(text, label) {
            return (coerce(&block, spec.kind), Some(block));
        }
    }

    // Heuristic fallbacks mirror the shapes seen in real uploads.
    if matches!(spec.name, "title" | "name") {
        let first_line = text.lines().next().unwrap_or_default().trim();
        if !first_line.is_empty() && first_line.chars().count() < 200 {
            return (Some(json!(first_line)), Some(first_line.to_string()));
        }
    }
    if matches!(spec.name, "content" | "body") {
        let value = clip_chars(text.trim(), 5000);
        let excerpt = format!("{}...", clip_chars(text, 200));
        return (Some(json!(value)), Some(excerpt));
    }

    (None, None)
}

/// Value of a `#`-heading whose title equals `label`: the text between that
/// heading line and the next heading (or the end of the document).
fn heading_value(text: &str, label: &str) -> Option<String> {
    let heading = Regex::new(&format!(
        r"(?im)^#{{1,6}}[ \t]*{}[ \t]*$",
        regex::escape(label)
    ))
    .expect("heading pattern");
    let m = heading.find(text)?;

    let rest = &text[m.end()..];
    let next = Regex::new(r"(?m)^#{1,6}\s").unwrap();
    let end = next.find(rest).map(|n| n.start()).unwrap_or(rest.len());
    let value = rest[..end].trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn coerce(raw: &str, kind: FieldKind) -> Option<Value> {
    static INT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());
    static FLOAT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(?:[.,]\d+)?").unwrap());

    match kind {
        FieldKind::StrList => {
            let items: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            Some(json!(items))
        }
        FieldKind::StepList => {
            let steps: Vec<Value> = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .enumerate()
                .map(|(i, s)| json!({ "step_number": i + 1, "instruction": s }))
                .collect();
            Some(json!(steps))
        }
        FieldKind::Int => INT
            .find(raw)
            .and_then(|m| m.as_str().parse::<i64>().ok())
            .map(|n| json!(n)),
        FieldKind::Float => FLOAT
            .find(raw)
            .and_then(|m| m.as_str().replace(',', ".").parse::<f64>().ok())
            .map(|n| json!(n)),
        _ => Some(json!(raw)),
    }
}

/// Domain regexes for product-spec documents: article numbers, cable type
/// specs, numbered application steps, feature bullets and media filenames.
fn extract_product_fields(text: &str, data: &mut Map<String, Value>) {
    static DESCRIPTION: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?is)Beschreibung:\s*(.+?)(?:Welche Kabeltypen|Weitere Informationen|Anwendung:|$)")
            .unwrap()
    });
    static ARTNR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{5})[_\-]").unwrap());
    static KABEL_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?is)Welche Kabeltypen.+?bearbeiten\?(.+?)(?:Weitere Informationen|Anwendung:|$)")
            .unwrap()
    });
    static KABEL_TYPE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"([A-Z]{2,}[-\s]?[A-Z]*\s+\d+x[\d,]+\s*mm²)").unwrap()
    });
    static ANWENDUNG: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?is)Anwendung[^:\n]*:\s*(.+?)(?:Titel:|Umsetzung als Column|$)").unwrap()
    });
    static BULLET_STEP: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^\s*(?:\d+\.|-|•)\s*(.+)$").unwrap());
    static FEATURE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^\s*(?:-|•)\s*((?:TÜV|Wabenstruktur|Klingen mit|Sicherheitsverschluss)[^\n]*)")
            .unwrap()
    });
    static MEDIA: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)(\d{5}_\S+\.(?:jpg|jpeg|png|tif))").unwrap());

    if !data.contains_key("description") {
        if let Some(caps) = DESCRIPTION.captures(text) {
            let collapsed = caps[1].split_whitespace().collect::<Vec<_>>().join(" ");
            data.insert("description".into(), json!(clip_chars(&collapsed, 2000)));
        }
    }

    if let Some(caps) = ARTNR.captures(text) {
        data.insert("artnr".into(), json!(caps[1].to_string()));
    }

    if let Some(caps) = KABEL_BLOCK.captures(text) {
        let cables: BTreeSet<String> = KABEL_TYPE
            .captures_iter(&caps[1])
            .map(|c| c[1].trim().to_string())
            .collect();
        if !cables.is_empty() {
            data.insert("kabeltypen".into(), json!(cables));
        }
    }

    if let Some(caps) = ANWENDUNG.captures(text) {
        let steps: Vec<String> = BULLET_STEP
            .captures_iter(&caps[1])
            .take(20)
            .map(|c| c[1].trim().to_string())
            .collect();
        if !steps.is_empty() {
            data.insert("anwendung".into(), json!(steps));
        }
    }

    let features: Vec<String> = FEATURE
        .captures_iter(text)
        .map(|c| c[1].trim().to_string())
        .collect();
    if !features.is_empty() {
        data.insert("features".into(), json!(features));
    }

    let media: BTreeSet<String> = MEDIA
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect();
    if !media.is_empty() {
        data.insert("medien".into(), json!(media));
    }
}

fn first_line_clipped(text: &str, max_chars: usize) -> String {
    clip_chars(text.lines().next().unwrap_or_default().trim(), max_chars)
}

fn clip_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use docx_rs::{DocumentChild, ParagraphChild, RunChild, read_docx};
use regex::Regex;
use tracing::warn;

use super::{ParsedDocument, ParsedSection, build_section_path, clamp_offsets};

static HEADING_STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:heading|überschrift|berschrift)\s*([1-6])").unwrap());

pub fn parse(path: &Path) -> Result<ParsedDocument> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;

    let docx = match read_docx(&bytes) {
        Ok(docx) => docx,
        Err(err) => {
            // Corrupted packages with broken part references still carry the
            // body XML; fall back to raw text extraction before giving up.
            warn!(error = %err, "docx reader failed, trying raw XML fallback");
            return parse_fallback(&bytes, &err.to_string());
        }
    };

    let mut sections: Vec<ParsedSection> = Vec::new();
    let mut raw_parts: Vec<String> = Vec::new();
    let mut current_offset = 0usize;

    let mut current_title: Option<String> = None;
    let mut current_level = 0usize;
    let mut current_content: Vec<String> = Vec::new();
    let mut section_start = 0usize;

    let save_section = |sections: &mut Vec<ParsedSection>,
                            content: &mut Vec<String>,
                            title: &Option<String>,
                            level: usize,
                            start: usize,
                            end: usize| {
        if content.is_empty() {
            return;
        }
        let path = build_section_path(sections, level);
        sections.push(ParsedSection {
            title: title.clone(),
            content: content.join("\n"),
            level,
            start_offset: start,
            end_offset: end,
            path,
        });
        content.clear();
    };

    for child in &docx.document.children {
        let DocumentChild::Paragraph(paragraph) = child else {
            continue;
        };
        let text = paragraph_text(paragraph);
        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        let level = paragraph
            .property
            .style
            .as_ref()
            .map(|style| heading_level(&style.val))
            .unwrap_or(0);

        if level > 0 {
            save_section(
                &mut sections,
                &mut current_content,
                &current_title,
                current_level,
                section_start,
                current_offset,
            );
            current_title = Some(text.to_string());
            current_level = level;
            section_start = current_offset;
        } else {
            current_content.push(text.to_string());
        }

        raw_parts.push(text.to_string());
        current_offset += text.len() + 1;
    }

    save_section(
        &mut sections,
        &mut current_content,
        &current_title,
        current_level,
        section_start,
        current_offset,
    );

    let raw_text = raw_parts.join("\n");
    if sections.is_empty() && !raw_text.is_empty() {
        sections.push(ParsedSection {
            title: None,
            content: raw_text.clone(),
            level: 0,
            start_offset: 0,
            end_offset: raw_text.len(),
            path: String::new(),
        });
    }
    clamp_offsets(&mut sections, raw_text.len());

    Ok(ParsedDocument {
        raw_text,
        sections,
        metadata: core_properties(&bytes),
        confidence: 1.0,
        file_type: "docx".to_string(),
        warnings: Vec::new(),
    })
}

/// Title, author and creation date from `docProps/core.xml`, when the
/// package carries them. Absent or unreadable properties just leave the
/// metadata map empty.
fn core_properties(bytes: &[u8]) -> BTreeMap<String, String> {
    static TITLE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<dc:title[^>]*>([^<]*)</dc:title>").unwrap());
    static CREATOR: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<dc:creator[^>]*>([^<]*)</dc:creator>").unwrap());
    static CREATED: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<dcterms:created[^>]*>([^<]*)</dcterms:created>").unwrap());

    let mut metadata = BTreeMap::new();

    let Ok(mut archive) = zip::ZipArchive::new(Cursor::new(bytes)) else {
        return metadata;
    };
    let mut xml = String::new();
    match archive.by_name("docProps/core.xml") {
        Ok(mut part) => {
            if part.read_to_string(&mut xml).is_err() {
                return metadata;
            }
        }
        Err(_) => return metadata,
    }

    for (key, pattern) in [("title", &TITLE), ("author", &CREATOR), ("created", &CREATED)] {
        if let Some(caps) = pattern.captures(&xml) {
            let value = caps[1].trim();
            if !value.is_empty() {
                metadata.insert(key.to_string(), value.to_string());
            }
        }
    }

    metadata
}

fn paragraph_text(paragraph: &docx_rs::Paragraph) -> String {
    let mut out = String::new();
    for child in &paragraph.children {
        let ParagraphChild::Run(run) = child else {
            continue;
        };
        for run_child in &run.children {
            match run_child {
                RunChild::Text(text) => out.push_str(&text.text),
                RunChild::Tab(_) => out.push('\t'),
                _ => {}
            }
        }
    }
    out
}

fn heading_level(style_val: &str) -> usize {
    if let Some(caps) = HEADING_STYLE.captures(style_val) {
        return caps[1].parse().unwrap_or(1);
    }
    if style_val.eq_ignore_ascii_case("title") || style_val.eq_ignore_ascii_case("titel") {
        return 1;
    }
    0
}

/// Pull the visible text straight out of `word/document.xml`. One level-0
/// section, confidence 0.7, with a warning on the document.
fn parse_fallback(bytes: &[u8], reader_error: &str) -> Result<ParsedDocument> {
    static TEXT_TAG: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<w:t[^>]*>([^<]*)</w:t>").unwrap());

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| anyhow!("not a readable docx package: {err} (reader: {reader_error})"))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|err| anyhow!("document body missing: {err} (reader: {reader_error})"))?
        .read_to_string(&mut xml)?;

    let parts: Vec<&str> = TEXT_TAG
        .captures_iter(&xml)
        .map(|caps| caps.get(1).unwrap().as_str())
        .collect();
    let raw_text = parts.join(" ");
    if raw_text.trim().is_empty() {
        return Err(anyhow!(
            "no text recoverable from document body (reader: {reader_error})"
        ));
    }

    let sections = vec![ParsedSection {
        title: None,
        content: raw_text.clone(),
        level: 0,
        start_offset: 0,
        end_offset: raw_text.len(),
        path: String::new(),
    }];

    Ok(ParsedDocument {
        raw_text,
        sections,
        metadata: core_properties(bytes),
        confidence: 0.7,
        file_type: "docx".to_string(),
        warnings: vec![format!(
            "document read with fallback parser (broken references): {reader_error}"
        )],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn heading_styles_map_to_levels() {
        assert_eq!(heading_level("Heading1"), 1);
        assert_eq!(heading_level("Heading 3"), 3);
        assert_eq!(heading_level("berschrift2"), 2);
        assert_eq!(heading_level("Title"), 1);
        assert_eq!(heading_level("Normal"), 0);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let mut file = NamedTempFile::with_suffix(".docx").unwrap();
        file.write_all(b"this is not a zip archive at all").unwrap();
        assert!(parse(file.path()).is_err());
    }

    fn plain_zip(core_xml: Option<&str>) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(Cursor::new(&mut buf));
            writer
                .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            writer
                .write_all(b"<w:document><w:t>Hallo</w:t><w:t xml:space=\"preserve\"> Welt</w:t></w:document>")
                .unwrap();
            if let Some(core_xml) = core_xml {
                writer
                    .start_file("docProps/core.xml", zip::write::SimpleFileOptions::default())
                    .unwrap();
                writer.write_all(core_xml.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        buf
    }

    #[test]
    fn fallback_recovers_body_text_from_plain_zip() {
        // A zip that docx-rs rejects but whose document.xml still has text.
        let buf = plain_zip(None);

        let doc = parse_fallback(&buf, "missing part").unwrap();
        assert_eq!(doc.raw_text, "Hallo  Welt");
        assert_eq!(doc.confidence, 0.7);
        assert_eq!(doc.sections.len(), 1);
        assert!(!doc.warnings.is_empty());
        assert!(doc.metadata.is_empty());
    }

    #[test]
    fn core_properties_come_from_doc_props_part() {
        let buf = plain_zip(Some(
            "<cp:coreProperties>\
             <dc:title>Montageanleitung</dc:title>\
             <dc:creator>Anna Schmidt</dc:creator>\
             <dcterms:created xsi:type=\"dcterms:W3CDTF\">2024-03-01T09:00:00Z</dcterms:created>\
             </cp:coreProperties>",
        ));

        let metadata = core_properties(&buf);
        assert_eq!(metadata.get("title").map(String::as_str), Some("Montageanleitung"));
        assert_eq!(metadata.get("author").map(String::as_str), Some("Anna Schmidt"));
        assert_eq!(
            metadata.get("created").map(String::as_str),
            Some("2024-03-01T09:00:00Z")
        );

        // The fallback path carries the same metadata.
        let doc = parse_fallback(&buf, "missing part").unwrap();
        assert_eq!(doc.metadata.get("author").map(String::as_str), Some("Anna Schmidt"));
    }

    #[test]
    fn missing_or_empty_core_properties_yield_no_metadata() {
        let buf = plain_zip(Some("<cp:coreProperties><dc:title></dc:title></cp:coreProperties>"));
        assert!(core_properties(&buf).is_empty());
        assert!(core_properties(b"not a zip archive").is_empty());
    }
}

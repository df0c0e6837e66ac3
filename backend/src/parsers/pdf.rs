use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use lopdf::Document;
use tracing::warn;

use super::{ParsedDocument, ParsedSection};

const FIDELITY_WARNING: &str =
    "PDF extraction is text-only; formatting, tables and images may not be captured correctly";

/// Per-page text extraction. Every page becomes a `"Page N"` section at
/// level 1; confidence is fixed at 0.7. A file that cannot be opened yields
/// an empty document with confidence 0.0 instead of an error.
pub fn parse(path: &Path) -> Result<ParsedDocument> {
    let mut warnings = vec![FIDELITY_WARNING.to_string()];

    let document = match Document::load(path) {
        Ok(document) => document,
        Err(err) => {
            warnings.push(format!("failed to read PDF: {err}"));
            return Ok(ParsedDocument {
                raw_text: String::new(),
                sections: Vec::new(),
                metadata: Default::default(),
                confidence: 0.0,
                file_type: "pdf".to_string(),
                warnings,
            });
        }
    };

    let pages = document.get_pages();
    let mut raw_text = String::new();
    let mut sections = Vec::new();

    for page_number in pages.keys() {
        let page_text = match document.extract_text(&[*page_number]) {
            Ok(text) => text,
            Err(err) => {
                warn!(page = page_number, error = %err, "failed to extract page text");
                warnings.push(format!("page {page_number}: {err}"));
                continue;
            }
        };
        let page_text = page_text.trim().to_string();
        if page_text.is_empty() {
            continue;
        }

        if !raw_text.is_empty() {
            raw_text.push_str("\n\n");
        }
        let start = raw_text.len();
        raw_text.push_str(&page_text);

        sections.push(ParsedSection {
            title: Some(format!("Page {page_number}")),
            content: page_text,
            level: 1,
            start_offset: start,
            end_offset: raw_text.len(),
            path: String::new(),
        });
    }

    let mut metadata = BTreeMap::new();
    metadata.insert("page_count".to_string(), pages.len().to_string());

    Ok(ParsedDocument {
        raw_text,
        sections,
        metadata,
        confidence: 0.7,
        file_type: "pdf".to_string(),
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn unreadable_pdf_degrades_to_empty_document() {
        let mut file = NamedTempFile::with_suffix(".pdf").unwrap();
        file.write_all(b"definitely not a pdf").unwrap();

        let doc = parse(file.path()).unwrap();
        assert_eq!(doc.confidence, 0.0);
        assert!(doc.raw_text.is_empty());
        assert!(doc.warnings.len() >= 2);
    }
}

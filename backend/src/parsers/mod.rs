use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::error::{AppError, AppResult};

mod docx;
mod markdown;
mod pdf;
mod tabular;

pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    ".docx", ".doc", ".md", ".markdown", ".csv", ".xlsx", ".xls", ".pdf",
];

/// A titled or untitled hierarchical block of a parsed document. Offsets are
/// measured against the produced `raw_text`, not the source bytes, and
/// always satisfy `0 <= start <= end <= raw_text.len()`.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedSection {
    pub title: Option<String>,
    pub content: String,
    /// Heading level; 0 = body text without a heading.
    pub level: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    /// `" > "`-joined chain of ancestor titles.
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ParsedDocument {
    pub raw_text: String,
    pub sections: Vec<ParsedSection>,
    pub metadata: BTreeMap<String, String>,
    pub confidence: f32,
    pub file_type: String,
    pub warnings: Vec<String>,
}

/// Parse a file by its (lowercased) extension. The registry is closed: an
/// unknown extension is a validation error, parser failures surface as
/// upstream errors for the pipeline to record on the document row.
pub fn parse_file(path: &Path) -> AppResult<ParsedDocument> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let parsed = match ext.as_str() {
        "docx" | "doc" => docx::parse(path),
        "md" | "markdown" => markdown::parse(path),
        "csv" | "xlsx" | "xls" => tabular::parse(path, &ext),
        "pdf" => pdf::parse(path),
        _ => {
            return Err(AppError::Validation(format!(
                "no parser registered for file type: .{ext}"
            )));
        }
    };

    parsed.map_err(|err| AppError::Upstream(format!("failed to parse {ext} file: {err:#}")))
}

pub fn is_supported(filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    SUPPORTED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Hierarchical path from already-collected sections: the chain of titles of
/// the nearest ancestors with a strictly smaller level.
pub(crate) fn build_section_path(sections: &[ParsedSection], current_level: usize) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let mut level = current_level;
    for section in sections.iter().rev() {
        if section.level > 0 && section.level < level {
            if let Some(title) = section.title.as_deref() {
                parts.insert(0, title);
                level = section.level;
            }
        }
    }
    parts.join(" > ")
}

/// Clamp section offsets into the raw text. Parsers accumulate offsets while
/// walking their input; the final join can be one separator shorter.
pub(crate) fn clamp_offsets(sections: &mut [ParsedSection], raw_len: usize) {
    for section in sections {
        section.start_offset = section.start_offset.min(raw_len);
        section.end_offset = section.end_offset.clamp(section.start_offset, raw_len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_extension_is_a_validation_error() {
        let err = parse_file(Path::new("notes.txt")).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn supported_extension_check_is_case_insensitive() {
        assert!(is_supported("Bericht.DOCX"));
        assert!(is_supported("liste.csv"));
        assert!(!is_supported("archiv.tar.gz"));
    }

    #[test]
    fn section_path_walks_ancestors() {
        let mk = |title: &str, level: usize| ParsedSection {
            title: Some(title.to_string()),
            content: String::new(),
            level,
            start_offset: 0,
            end_offset: 0,
            path: String::new(),
        };
        let sections = vec![mk("Chapter 1", 1), mk("1.1", 2)];
        assert_eq!(build_section_path(&sections, 3), "Chapter 1 > 1.1");
        assert_eq!(build_section_path(&sections, 2), "Chapter 1");
        assert_eq!(build_section_path(&sections, 1), "");
    }
}

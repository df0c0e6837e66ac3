use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use super::{ParsedDocument, ParsedSection, build_section_path};

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(#{1,6})[ \t]+(.+)$").unwrap());

pub fn parse(path: &Path) -> Result<ParsedDocument> {
    let raw_text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let mut sections: Vec<ParsedSection> = Vec::new();
    let headings: Vec<_> = HEADING.captures_iter(&raw_text).collect();

    if headings.is_empty() {
        sections.push(ParsedSection {
            title: None,
            content: raw_text.trim().to_string(),
            level: 0,
            start_offset: 0,
            end_offset: raw_text.len(),
            path: String::new(),
        });
    } else {
        let first_start = headings[0].get(0).unwrap().start();
        if first_start > 0 {
            let pre = raw_text[..first_start].trim();
            if !pre.is_empty() {
                sections.push(ParsedSection {
                    title: None,
                    content: pre.to_string(),
                    level: 0,
                    start_offset: 0,
                    end_offset: first_start,
                    path: String::new(),
                });
            }
        }

        for (i, caps) in headings.iter().enumerate() {
            let whole = caps.get(0).unwrap();
            let level = caps[1].len();
            let title = caps[2].trim().to_string();

            let content_start = (whole.end() + 1).min(raw_text.len());
            let content_end = headings
                .get(i + 1)
                .map(|next| next.get(0).unwrap().start())
                .unwrap_or(raw_text.len());
            let content = raw_text[content_start..content_end].trim().to_string();

            let path = build_section_path(&sections, level);
            sections.push(ParsedSection {
                title: Some(title),
                content,
                level,
                start_offset: whole.start(),
                end_offset: content_end,
                path,
            });
        }
    }

    Ok(ParsedDocument {
        metadata: extract_frontmatter(&raw_text),
        raw_text,
        sections,
        confidence: 1.0,
        file_type: "markdown".to_string(),
        warnings: Vec::new(),
    })
}

/// Leading `---` frontmatter parsed as simple `key: value` pairs.
fn extract_frontmatter(text: &str) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    if let Some(rest) = text.strip_prefix("---") {
        if let Some(end) = rest.find("\n---\n") {
            for line in rest[..end].lines() {
                if let Some((key, value)) = line.split_once(':') {
                    let key = key.trim();
                    if !key.is_empty() {
                        metadata.insert(key.to_string(), value.trim().to_string());
                    }
                }
            }
        }
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn parse_str(content: &str) -> ParsedDocument {
        let mut file = NamedTempFile::with_suffix(".md").unwrap();
        file.write_all(content.as_bytes()).unwrap();
        parse(file.path()).unwrap()
    }

    #[test]
    fn splits_on_atx_headings() {
        let doc = parse_str("# FAQ\n## Question\nWie installiere ich X?\n## Answer\n1. Download\n2. Run setup");

        assert_eq!(doc.confidence, 1.0);
        let titles: Vec<_> = doc
            .sections
            .iter()
            .filter_map(|s| s.title.as_deref())
            .collect();
        assert_eq!(titles, vec!["FAQ", "Question", "Answer"]);

        let question = doc.sections.iter().find(|s| s.title.as_deref() == Some("Question")).unwrap();
        assert_eq!(question.content, "Wie installiere ich X?");
        assert_eq!(question.path, "FAQ");
        assert_eq!(question.level, 2);
    }

    #[test]
    fn body_before_first_heading_is_a_level_zero_section() {
        let doc = parse_str("intro text\n\n# Heading\ncontent");
        assert_eq!(doc.sections[0].level, 0);
        assert_eq!(doc.sections[0].content, "intro text");
    }

    #[test]
    fn no_headings_yields_single_section() {
        let doc = parse_str("just some prose\nwithout structure");
        assert_eq!(doc.sections.len(), 1);
        assert!(doc.sections[0].title.is_none());
    }

    #[test]
    fn offsets_stay_inside_raw_text() {
        let doc = parse_str("# A\ncontent a\n## B\ncontent b\n# C");
        for section in &doc.sections {
            assert!(section.start_offset <= section.end_offset);
            assert!(section.end_offset <= doc.raw_text.len());
        }
    }

    #[test]
    fn frontmatter_becomes_metadata() {
        let doc = parse_str("---\nauthor: Anna\nversion: 2.0\n---\n# Doc\ntext");
        assert_eq!(doc.metadata.get("author").map(String::as_str), Some("Anna"));
        assert_eq!(doc.metadata.get("version").map(String::as_str), Some("2.0"));
    }
}

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use calamine::{Data, Reader, open_workbook_auto};

use super::{ParsedDocument, ParsedSection};

/// CSV and spreadsheet files: the header row names the columns, every data
/// row becomes one section titled `"Row N"` with `"col: value"` lines (empty
/// cells omitted). A file that cannot be read yields an empty document with
/// confidence 0.0 and the error as a warning.
pub fn parse(path: &Path, ext: &str) -> Result<ParsedDocument> {
    let rows = match read_rows(path, ext) {
        Ok(rows) => rows,
        Err(err) => {
            return Ok(ParsedDocument {
                raw_text: String::new(),
                sections: Vec::new(),
                metadata: Default::default(),
                confidence: 0.0,
                file_type: ext.to_string(),
                warnings: vec![format!("failed to read file: {err:#}")],
            });
        }
    };

    let mut iter = rows.into_iter();
    let headers = iter.next().unwrap_or_default();

    let mut raw_text = headers.join(" | ");
    let mut sections = Vec::new();
    let mut row_count = 0usize;

    for (idx, row) in iter.enumerate() {
        let mut lines = Vec::new();
        for (col, value) in headers.iter().zip(row.iter()) {
            if !value.trim().is_empty() {
                lines.push(format!("{col}: {}", value.trim()));
            }
        }
        let row_text = lines.join("\n");
        row_count += 1;

        raw_text.push_str("\n\n");
        let start = raw_text.len();
        raw_text.push_str(&row_text);

        sections.push(ParsedSection {
            title: Some(format!("Row {}", idx + 1)),
            content: row_text,
            level: 1,
            start_offset: start,
            end_offset: raw_text.len(),
            path: String::new(),
        });
    }

    let mut metadata = BTreeMap::new();
    metadata.insert("columns".to_string(), headers.join(", "));
    metadata.insert("row_count".to_string(), row_count.to_string());
    metadata.insert("column_count".to_string(), headers.len().to_string());

    Ok(ParsedDocument {
        raw_text,
        sections,
        metadata,
        confidence: 1.0,
        file_type: ext.to_string(),
        warnings: Vec::new(),
    })
}

fn read_rows(path: &Path, ext: &str) -> Result<Vec<Vec<String>>> {
    if ext == "csv" {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;
        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(rows)
    } else {
        let mut workbook = open_workbook_auto(path)?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| anyhow::anyhow!("workbook has no sheets"))??;
        let rows = range
            .rows()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect();
        Ok(rows)
    }
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn parse_csv(content: &str) -> ParsedDocument {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        file.write_all(content.as_bytes()).unwrap();
        parse(file.path(), "csv").unwrap()
    }

    #[test]
    fn each_row_becomes_a_section() {
        let doc = parse_csv("name,value,description\nItem1,100,First item\nItem2,200,Second item\n");

        assert_eq!(doc.confidence, 1.0);
        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.sections[0].title.as_deref(), Some("Row 1"));
        assert!(doc.sections[0].content.contains("name: Item1"));
        assert!(doc.sections[0].content.contains("value: 100"));
        assert_eq!(doc.metadata.get("row_count").map(String::as_str), Some("2"));
    }

    #[test]
    fn empty_cells_are_omitted() {
        let doc = parse_csv("a,b\n1,\n");
        assert_eq!(doc.sections[0].content, "a: 1");
    }

    #[test]
    fn offsets_point_into_raw_text() {
        let doc = parse_csv("col\nfirst\nsecond\n");
        for section in &doc.sections {
            assert_eq!(
                &doc.raw_text[section.start_offset..section.end_offset],
                section.content
            );
        }
    }

    #[test]
    fn unreadable_spreadsheet_degrades_to_empty_document() {
        let mut file = NamedTempFile::with_suffix(".xlsx").unwrap();
        file.write_all(b"not a spreadsheet").unwrap();
        let doc = parse(file.path(), "xlsx").unwrap();
        assert_eq!(doc.confidence, 0.0);
        assert!(doc.sections.is_empty());
        assert!(!doc.warnings.is_empty());
    }
}

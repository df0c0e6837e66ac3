use sha2::{Digest, Sha256};

use crate::parsers::{ParsedDocument, ParsedSection};

/// The chunker approximates one token as four characters.
const CHARS_PER_TOKEN: usize = 4;

pub const EMBEDDING_DIM: usize = 1536;

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Target chunk size in tokens.
    pub max_chunk_size: usize,
    /// Overlap carried into the next chunk, in tokens.
    pub overlap: usize,
    /// Chunks below this size are merged forward instead of emitted.
    pub min_chunk_size: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 500,
            overlap: 50,
            min_chunk_size: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextChunk {
    pub text: String,
    pub section_path: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub chunk_index: usize,
    pub confidence: f32,
}

pub struct Chunker {
    max_chars: usize,
    overlap_chars: usize,
    min_chars: usize,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self {
            max_chars: config.max_chunk_size * CHARS_PER_TOKEN,
            overlap_chars: config.overlap * CHARS_PER_TOKEN,
            min_chars: config.min_chunk_size * CHARS_PER_TOKEN,
        }
    }

    /// Split a parsed document into bounded, overlapping chunks with dense
    /// `chunk_index` values starting at 0. Every chunk inherits the parse
    /// confidence and carries its section path.
    pub fn create_chunks(&self, parsed: &ParsedDocument) -> Vec<TextChunk> {
        let mut chunks = Vec::new();

        for section in &parsed.sections {
            if section.content.trim().is_empty() {
                continue;
            }
            let path = section_path(section);
            self.split_text(
                &section.content,
                &path,
                section.start_offset,
                parsed.confidence,
                &mut chunks,
            );
        }

        // No sections at all: chunk the raw text as one synthetic section.
        if chunks.is_empty() && !parsed.raw_text.trim().is_empty() {
            self.split_text(&parsed.raw_text, "", 0, parsed.confidence, &mut chunks);
        }

        chunks
    }

    fn split_text(
        &self,
        text: &str,
        section_path: &str,
        base_offset: usize,
        confidence: f32,
        chunks: &mut Vec<TextChunk>,
    ) {
        let emit = |text: &str, start: usize, chunks: &mut Vec<TextChunk>| {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return;
            }
            chunks.push(TextChunk {
                text: trimmed.to_string(),
                section_path: section_path.to_string(),
                start_offset: start,
                end_offset: start + trimmed.len(),
                chunk_index: chunks.len(),
                confidence,
            });
        };

        if text.len() <= self.max_chars {
            emit(text, base_offset, chunks);
            return;
        }

        let mut current = String::new();
        let mut current_start = base_offset;
        let mut cursor = 0usize;

        for para in text.split("\n\n") {
            let para_start = base_offset + cursor;
            cursor += para.len() + 2;

            let para = para.trim();
            if para.is_empty() {
                continue;
            }

            if !current.is_empty() && current.len() + para.len() + 2 > self.max_chars {
                if current.len() >= self.min_chars {
                    emit(&current, current_start, chunks);

                    // Seed the next chunk with the tail of the previous one
                    // for continuity across the boundary.
                    let overlap = char_suffix(&current, self.overlap_chars);
                    current_start = para_start.saturating_sub(overlap.len() + 2);
                    current = if overlap.is_empty() {
                        para.to_string()
                    } else {
                        format!("{overlap}\n\n{para}")
                    };
                } else {
                    current.push_str("\n\n");
                    current.push_str(para);
                }
            } else if current.is_empty() {
                current = para.to_string();
                current_start = para_start;
            } else {
                current.push_str("\n\n");
                current.push_str(para);
            }
        }

        emit(&current, current_start, chunks);
    }
}

fn section_path(section: &ParsedSection) -> String {
    match section.title.as_deref() {
        Some(title) if section.path.is_empty() => title.to_string(),
        Some(title) => format!("{} > {}", section.path, title),
        None => section.path.clone(),
    }
}

/// Last `max_chars` characters of `s`, respecting char boundaries.
fn char_suffix(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        return s.to_string();
    }
    s.chars().skip(count - max_chars).collect()
}

/// Embedding seam. Today a deterministic hash projection; swap in a real
/// model behind the same call.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// SHA-256-derived vector, each dimension normalized to [-1, 1].
#[derive(Debug, Default, Clone)]
pub struct HashEmbedder;

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        (0..EMBEDDING_DIM)
            .map(|i| (digest[i % digest.len()] as f32 / 255.0) * 2.0 - 1.0)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::ParsedSection;

    fn doc_with_sections(sections: Vec<ParsedSection>) -> ParsedDocument {
        let raw_text = sections
            .iter()
            .map(|s| s.content.clone())
            .collect::<Vec<_>>()
            .join("\n\n");
        ParsedDocument {
            raw_text,
            sections,
            metadata: Default::default(),
            confidence: 1.0,
            file_type: "markdown".into(),
            warnings: Vec::new(),
        }
    }

    fn section(title: Option<&str>, path: &str, content: String) -> ParsedSection {
        ParsedSection {
            title: title.map(str::to_string),
            content,
            level: if title.is_some() { 1 } else { 0 },
            start_offset: 0,
            end_offset: 0,
            path: path.to_string(),
        }
    }

    #[test]
    fn short_section_is_one_chunk() {
        let chunker = Chunker::new(ChunkerConfig::default());
        let doc = doc_with_sections(vec![section(Some("Intro"), "", "short text".into())]);

        let chunks = chunker.create_chunks(&doc);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "short text");
        assert_eq!(chunks[0].section_path, "Intro");
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[test]
    fn long_section_splits_with_dense_indices_and_overlap() {
        let chunker = Chunker::new(ChunkerConfig {
            max_chunk_size: 25,
            overlap: 5,
            min_chunk_size: 10,
        });
        let paragraphs: Vec<String> = (0..12)
            .map(|i| format!("paragraph number {i} with some filler words inside"))
            .collect();
        let doc = doc_with_sections(vec![section(
            Some("Long"),
            "Chapter 1",
            paragraphs.join("\n\n"),
        )]);

        let chunks = chunker.create_chunks(&doc);
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert!(chunk.start_offset <= chunk.end_offset);
            assert_eq!(chunk.section_path, "Chapter 1 > Long");
        }

        // Overlap: the tail of one chunk reappears at the head of the next.
        let tail: String = char_suffix(&chunks[0].text, 10);
        assert!(chunks[1].text.contains(tail.trim()));
    }

    #[test]
    fn document_without_sections_chunks_raw_text() {
        let doc = ParsedDocument {
            raw_text: "free-floating text without any structure".into(),
            sections: Vec::new(),
            metadata: Default::default(),
            confidence: 0.7,
            file_type: "pdf".into(),
            warnings: Vec::new(),
        };

        let chunks = Chunker::new(ChunkerConfig::default()).create_chunks(&doc);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section_path, "");
        assert_eq!(chunks[0].confidence, 0.7);
    }

    #[test]
    fn chunk_confidence_inherits_parse_confidence() {
        let mut doc = doc_with_sections(vec![section(Some("S"), "", "text".into())]);
        doc.confidence = 0.7;
        let chunks = Chunker::new(ChunkerConfig::default()).create_chunks(&doc);
        assert_eq!(chunks[0].confidence, 0.7);
    }

    #[test]
    fn hash_embedding_is_deterministic_and_bounded() {
        let embedder = HashEmbedder;
        let a = embedder.embed("Das ist mir zu teuer");
        let b = embedder.embed("Das ist mir zu teuer");
        let c = embedder.embed("something else");

        assert_eq!(a.len(), EMBEDDING_DIM);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(|v| (-1.0..=1.0).contains(v)));
    }
}

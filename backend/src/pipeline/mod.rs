mod chunker;
mod ingestion;
mod worker;

pub use chunker::{Chunker, ChunkerConfig, EMBEDDING_DIM, Embedder, HashEmbedder, TextChunk};
pub use ingestion::IngestionPipeline;
pub use worker::{IngestJob, spawn_workers};

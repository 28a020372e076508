//! Document ingestion pipeline: chunking, content cache, and orchestration.

pub mod cache;
pub mod chunking;
mod service;
pub mod types;

pub use cache::{CacheDiff, CacheEntry, CacheFile, ContentCache, cache_path_for, document_identity};
pub use chunking::{PARAGRAPH_SEPARATOR, chunk_document, compute_content_hash, read_document};
pub use service::{EPISODE_SPACING, IngestionOrchestrator, reference_time_for};
pub use types::{
    CacheError, Chunk, ChunkFailure, ChunkingError, IngestError, IngestMode, IngestionReport,
    RunStage,
};

//! Core data types and error definitions for the ingestion pipeline.

use crate::graph::GraphError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while reading a document and turning it into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible size threshold.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Source document could not be read.
    #[error("failed to read document {}: {source}", path.display())]
    Read {
        /// Document we attempted to read.
        path: PathBuf,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while persisting the content cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Cache file or its directory could not be written.
    #[error("failed to persist cache {}: {source}", path.display())]
    Persist {
        /// Cache file we attempted to write.
        path: PathBuf,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },
    /// Cache contents could not be serialized.
    #[error("failed to serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors that abort an ingestion run before a report can be produced.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Document could not be read or chunked.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Graph engine rejected a run-level operation (clear, schema setup).
    #[error("Graph engine unavailable during {operation}: {source}")]
    Graph {
        /// Operation that failed.
        operation: &'static str,
        /// Underlying client error.
        #[source]
        source: GraphError,
    },
    /// Emptied cache could not be saved ahead of clearing the graph; nothing was cleared.
    #[error("Failed to reset cache before clearing the graph: {0}")]
    CacheReset(#[source] CacheError),
}

/// Bounded-size unit of document text submitted as one episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 1-based position of the chunk within the parsed document.
    pub sequence_number: usize,
    /// Trimmed chunk text.
    pub content: String,
    /// Hex digest of `content`; the chunk's durable identity.
    pub content_hash: String,
}

impl Chunk {
    /// Build a chunk, trimming the content and deriving its hash.
    pub fn new(sequence_number: usize, content: impl Into<String>) -> Self {
        let mut content = content.into();
        let trimmed = content.trim();
        if trimmed.len() != content.len() {
            content = trimmed.to_string();
        }
        let content_hash = super::chunking::compute_content_hash(&content);
        Self {
            sequence_number,
            content,
            content_hash,
        }
    }
}

/// How a run treats previously ingested content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    /// Submit every chunk, optionally wiping the graph first.
    Full {
        /// Clear all graph data before ingesting.
        clear_existing: bool,
    },
    /// Submit only chunks whose content hash is not cached yet.
    Incremental,
}

impl IngestMode {
    /// Episode name for a chunk submitted in this mode.
    pub fn episode_name(self, sequence_number: usize) -> String {
        match self {
            Self::Full { .. } => format!("Chunk {sequence_number}"),
            Self::Incremental => format!("Chunk {sequence_number} (Updated)"),
        }
    }

    /// Provenance string attached to episodes submitted in this mode.
    pub fn source_description(self, document_name: &str) -> String {
        match self {
            Self::Full { .. } => format!("Ingested from {document_name}"),
            Self::Incremental => format!("Reingested from {document_name}"),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Full { .. } => "full",
            Self::Incremental => "incremental",
        }
    }
}

impl fmt::Display for IngestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Linear lifecycle of one ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    /// Nothing has happened yet.
    Idle,
    /// Document text and cache state are in memory.
    Loaded,
    /// Document has been split into chunks.
    Chunked,
    /// Chunks have been partitioned into pending and skipped.
    Diffed,
    /// Episodes are being submitted.
    Submitting,
    /// Cache delta has been persisted (or persistence was attempted).
    Committed,
    /// Run finished and produced a report.
    Done,
    /// Run aborted without a report.
    Failed,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Loaded => "loaded",
            Self::Chunked => "chunked",
            Self::Diffed => "diffed",
            Self::Submitting => "submitting",
            Self::Committed => "committed",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Episode submission that did not reach the graph engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFailure {
    /// Sequence number of the failed chunk.
    pub sequence_number: usize,
    /// Content hash withheld from the cache so the chunk is retried next run.
    pub content_hash: String,
    /// Rendered client error.
    pub error: String,
}

/// Summary of a completed ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionReport {
    /// File name used as the document identity.
    pub document: String,
    /// Mode the run executed in.
    pub mode: IngestMode,
    /// Number of chunks produced from the document.
    pub total_chunks: usize,
    /// Chunks skipped because their hash was already cached.
    pub skipped_unchanged: usize,
    /// Chunks skipped because an identical chunk appeared earlier in the document.
    pub duplicates: usize,
    /// Episodes accepted by the graph engine.
    pub submitted: usize,
    /// Episodes the graph engine rejected.
    pub failed: usize,
    /// Details for every failed submission.
    pub failures: Vec<ChunkFailure>,
    /// Cache persistence failure, when the delta could not be saved.
    pub cache_error: Option<String>,
}

impl IngestionReport {
    pub(crate) fn new(document: String, mode: IngestMode, total_chunks: usize) -> Self {
        Self {
            document,
            mode,
            total_chunks,
            skipped_unchanged: 0,
            duplicates: 0,
            submitted: 0,
            failed: 0,
            failures: Vec::new(),
            cache_error: None,
        }
    }

    pub(crate) fn record_failure(&mut self, chunk: &Chunk, error: &GraphError) {
        self.failed += 1;
        self.failures.push(ChunkFailure {
            sequence_number: chunk.sequence_number,
            content_hash: chunk.content_hash.clone(),
            error: error.to_string(),
        });
    }

    /// Whether every pending chunk was submitted and the cache was saved.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.cache_error.is_none()
    }
}

impl fmt::Display for IngestionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Document:  {} ({} run)", self.document, self.mode)?;
        writeln!(f, "Chunks:    {}", self.total_chunks)?;
        writeln!(
            f,
            "Skipped:   {} unchanged, {} duplicate",
            self.skipped_unchanged, self.duplicates
        )?;
        writeln!(f, "Submitted: {}", self.submitted)?;
        write!(f, "Failed:    {}", self.failed)?;
        for failure in &self.failures {
            write!(
                f,
                "\n  chunk {} ({}): {}",
                failure.sequence_number, failure.content_hash, failure.error
            )?;
        }
        if let Some(error) = &self.cache_error {
            write!(f, "\nCache not saved: {error}")?;
        }
        Ok(())
    }
}

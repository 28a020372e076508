//! Progress reporting for ingestion runs.
//!
//! The orchestrator never writes to the console itself; it announces what it is doing to a
//! [`ProgressObserver`]. [`TracingProgress`] turns those events into log lines.

use crate::graph::GraphError;
use crate::processing::{Chunk, IngestionReport, RunStage};
use time::OffsetDateTime;

/// Something that happened during an ingestion run.
#[derive(Debug)]
pub enum ProgressEvent<'a> {
    /// The run moved to a new stage.
    Stage(RunStage),
    /// The document was split into chunks.
    Chunked {
        /// Number of chunks produced.
        total: usize,
    },
    /// Chunks were partitioned against the cache.
    Diffed {
        /// Chunks that will be submitted.
        pending: usize,
        /// Chunks skipped because they are cached.
        unchanged: usize,
        /// Chunks skipped as in-document duplicates.
        duplicates: usize,
    },
    /// One episode was accepted by the graph engine.
    ChunkSubmitted {
        /// 0-based submission index within the run.
        index: usize,
        /// Number of chunks this run attempts to submit.
        of: usize,
        /// The submitted chunk.
        chunk: &'a Chunk,
        /// Reference time assigned to the episode.
        reference_time: OffsetDateTime,
    },
    /// One episode was rejected; the chunk stays uncached.
    ChunkFailed {
        /// 0-based submission index within the run.
        index: usize,
        /// The rejected chunk.
        chunk: &'a Chunk,
        /// Client error.
        error: &'a GraphError,
    },
    /// The run produced its report.
    Finished(&'a IngestionReport),
}

/// Receiver of [`ProgressEvent`]s.
pub trait ProgressObserver: Send + Sync {
    /// Handle one event. Called synchronously from the run.
    fn on_event(&self, event: ProgressEvent<'_>);
}

/// Observer that logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressObserver for TracingProgress {
    fn on_event(&self, event: ProgressEvent<'_>) {
        match event {
            ProgressEvent::Stage(stage) => tracing::debug!(%stage, "Run stage"),
            ProgressEvent::Chunked { total } => tracing::info!(total, "Parsed chunks"),
            ProgressEvent::Diffed {
                pending,
                unchanged,
                duplicates,
            } => {
                if pending == 0 {
                    tracing::info!(unchanged, duplicates, "No changes detected; nothing to ingest");
                } else {
                    tracing::info!(pending, unchanged, duplicates, "Found new or changed chunks");
                }
            }
            ProgressEvent::ChunkSubmitted {
                index,
                of,
                chunk,
                reference_time,
            } => tracing::info!(
                chunk = chunk.sequence_number,
                progress = %format!("{}/{}", index + 1, of),
                %reference_time,
                "Added chunk to the graph"
            ),
            ProgressEvent::ChunkFailed {
                index,
                chunk,
                error,
            } => tracing::warn!(
                chunk = chunk.sequence_number,
                index,
                hash = %chunk.content_hash,
                %error,
                "Failed to add chunk; it will be retried on the next run"
            ),
            ProgressEvent::Finished(report) => tracing::info!(
                document = %report.document,
                mode = %report.mode,
                total = report.total_chunks,
                skipped = report.skipped_unchanged,
                duplicates = report.duplicates,
                submitted = report.submitted,
                failed = report.failed,
                "Ingestion finished"
            ),
        }
    }
}

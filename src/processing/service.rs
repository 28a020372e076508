//! Ingestion orchestrator coordinating chunking, the content cache, and the graph engine.

use crate::{
    graph::{Episode, EpisodeSource, GraphClient},
    processing::{
        cache::{CacheDiff, ContentCache, cache_path_for, document_identity},
        chunking::{chunk_document, read_document},
        types::{Chunk, IngestError, IngestMode, IngestionReport, RunStage},
    },
    progress::{ProgressEvent, ProgressObserver, TracingProgress},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// Spacing between the reference times of consecutive episodes in one run.
pub const EPISODE_SPACING: Duration = Duration::seconds(10);

/// Reference time of the `index`-th episode submitted in a run started at `run_start`.
pub fn reference_time_for(run_start: OffsetDateTime, index: usize) -> OffsetDateTime {
    let steps = i32::try_from(index).unwrap_or(i32::MAX);
    run_start + EPISODE_SPACING * steps
}

/// Drives one document through chunking, cache diffing, and sequential episode submission.
///
/// Runs against the same document must not overlap; the cache file is not locked.
pub struct IngestionOrchestrator {
    client: Arc<dyn GraphClient>,
    cache_dir: PathBuf,
    chunk_size: usize,
    observer: Arc<dyn ProgressObserver>,
}

impl IngestionOrchestrator {
    /// Build an orchestrator that logs progress through `tracing`.
    pub fn new(client: Arc<dyn GraphClient>, cache_dir: impl Into<PathBuf>, chunk_size: usize) -> Self {
        Self {
            client,
            cache_dir: cache_dir.into(),
            chunk_size,
            observer: Arc::new(TracingProgress),
        }
    }

    /// Replace the progress observer.
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Ingest `document`, stamping episodes relative to the current instant.
    pub async fn run(
        &self,
        document: &Path,
        mode: IngestMode,
    ) -> Result<IngestionReport, IngestError> {
        self.run_at(document, mode, OffsetDateTime::now_utc()).await
    }

    /// Ingest `document`, stamping episodes relative to `run_start`.
    ///
    /// The graph client is closed before returning, whatever the outcome.
    pub async fn run_at(
        &self,
        document: &Path,
        mode: IngestMode,
        run_start: OffsetDateTime,
    ) -> Result<IngestionReport, IngestError> {
        self.observer.on_event(ProgressEvent::Stage(RunStage::Idle));
        tracing::info!(document = %document.display(), %mode, "Starting ingestion");

        let outcome = self.execute(document, mode, run_start).await;

        if let Err(error) = self.client.close().await {
            tracing::warn!(%error, "Failed to close graph client");
        }

        match &outcome {
            Ok(report) => {
                self.observer.on_event(ProgressEvent::Finished(report));
                self.observer.on_event(ProgressEvent::Stage(RunStage::Done));
            }
            Err(error) => {
                tracing::error!(document = %document.display(), %error, "Ingestion failed");
                self.observer.on_event(ProgressEvent::Stage(RunStage::Failed));
            }
        }
        outcome
    }

    async fn execute(
        &self,
        document: &Path,
        mode: IngestMode,
        run_start: OffsetDateTime,
    ) -> Result<IngestionReport, IngestError> {
        let text = read_document(document).await?;
        let document_name = document_identity(document);
        let mut cache = ContentCache::load(cache_path_for(&self.cache_dir, document)).await;
        self.observer.on_event(ProgressEvent::Stage(RunStage::Loaded));

        let chunks = chunk_document(&text, self.chunk_size)?;
        let total = chunks.len();
        self.observer.on_event(ProgressEvent::Stage(RunStage::Chunked));
        self.observer.on_event(ProgressEvent::Chunked { total });

        let diff = match mode {
            IngestMode::Full { clear_existing } => {
                if clear_existing {
                    self.clear_graph(&mut cache).await?;
                }
                CacheDiff::all_new(chunks)
            }
            IngestMode::Incremental => cache.diff(chunks),
        };
        self.observer.on_event(ProgressEvent::Stage(RunStage::Diffed));
        self.observer.on_event(ProgressEvent::Diffed {
            pending: diff.pending.len(),
            unchanged: diff.unchanged,
            duplicates: diff.duplicates,
        });

        let mut report = IngestionReport::new(document_name, mode, total);
        report.skipped_unchanged = diff.unchanged;
        report.duplicates = diff.duplicates;

        if !diff.pending.is_empty() {
            self.client
                .initialize_schema()
                .await
                .map_err(|source| IngestError::Graph {
                    operation: "initialize_schema",
                    source,
                })?;
            self.observer
                .on_event(ProgressEvent::Stage(RunStage::Submitting));
            self.submit(&diff.pending, mode, run_start, &mut cache, &mut report)
                .await;
        }

        if let Err(error) = cache.commit().await {
            tracing::error!(
                path = %cache.path().display(),
                %error,
                "Failed to persist cache; submitted chunks will be resubmitted next run"
            );
            report.cache_error = Some(error.to_string());
        }
        self.observer
            .on_event(ProgressEvent::Stage(RunStage::Committed));

        Ok(report)
    }

    /// Wipe the cache and then the graph it describes.
    ///
    /// The emptied cache reaches disk before the graph is touched. A cache file listing
    /// episodes that no longer exist would make later runs skip them for good.
    async fn clear_graph(&self, cache: &mut ContentCache) -> Result<(), IngestError> {
        cache.reset();
        cache.commit().await.map_err(IngestError::CacheReset)?;

        tracing::info!("Clearing existing graph data");
        self.client
            .clear_all()
            .await
            .map_err(|source| IngestError::Graph {
                operation: "clear_all",
                source,
            })
    }

    async fn submit(
        &self,
        pending: &[Chunk],
        mode: IngestMode,
        run_start: OffsetDateTime,
        cache: &mut ContentCache,
        report: &mut IngestionReport,
    ) {
        let of = pending.len();
        for (index, chunk) in pending.iter().enumerate() {
            let reference_time = reference_time_for(run_start, index);
            let episode = Episode {
                name: mode.episode_name(chunk.sequence_number),
                body: chunk.content.clone(),
                source: EpisodeSource::Text,
                source_description: mode.source_description(&report.document),
                reference_time,
            };

            match self.client.add_episode(&episode).await {
                Ok(()) => {
                    cache.stage(chunk, OffsetDateTime::now_utc());
                    report.submitted += 1;
                    self.observer.on_event(ProgressEvent::ChunkSubmitted {
                        index,
                        of,
                        chunk,
                        reference_time,
                    });
                }
                Err(error) => {
                    report.record_failure(chunk, &error);
                    self.observer.on_event(ProgressEvent::ChunkFailed {
                        index,
                        chunk,
                        error: &error,
                    });
                }
            }
        }
    }
}

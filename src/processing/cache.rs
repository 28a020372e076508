//! Content-addressed cache of chunks already submitted to the graph engine.
//!
//! One JSON file per document identity records every content hash that reached the engine:
//!
//! ```json
//! { "chunks": { "<sha256 hex>": { "chunk_number": 4, "last_ingested": "2025-01-01T00:00:00Z" } } }
//! ```
//!
//! The cache only grows. Entries for a run are staged in memory and written in a single atomic
//! rename by [`ContentCache::commit`]; an unreadable or corrupt file is treated as empty so that
//! the worst outcome is resubmission, never a silently skipped chunk.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use time::{
    OffsetDateTime, PrimitiveDateTime, format_description::well_known::Rfc3339,
    macros::format_description,
};

use super::types::{CacheError, Chunk};

const CACHE_FILE_SUFFIX: &str = ".cache.json";

/// Ingestion metadata recorded for one content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Sequence number of the chunk when it was cached; diagnostic only.
    pub chunk_number: usize,
    /// When the chunk was recorded as submitted.
    #[serde(with = "timestamp")]
    pub last_ingested: OffsetDateTime,
}

/// On-disk representation of a document cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheFile {
    /// Cached entries keyed by content hash.
    #[serde(default)]
    pub chunks: BTreeMap<String, CacheEntry>,
}

/// Chunks partitioned against the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheDiff {
    /// Chunks that still need to be submitted, in document order.
    pub pending: Vec<Chunk>,
    /// Chunks whose hash is already cached.
    pub unchanged: usize,
    /// Chunks identical to an earlier chunk of the same document.
    pub duplicates: usize,
}

impl CacheDiff {
    /// Treat every chunk as new, still collapsing in-document duplicates.
    pub fn all_new(chunks: Vec<Chunk>) -> Self {
        partition(chunks, |_| false)
    }
}

/// Persisted content cache for one document.
#[derive(Debug)]
pub struct ContentCache {
    path: PathBuf,
    file: CacheFile,
    staged: BTreeMap<String, CacheEntry>,
    dirty: bool,
}

impl ContentCache {
    /// Load the cache at `path`, degrading to an empty cache when it is missing or unreadable.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<CacheFile>(&raw) {
                Ok(file) => file,
                Err(error) => {
                    tracing::warn!(
                        path = %path.display(),
                        %error,
                        "Cache file is malformed; treating every chunk as new"
                    );
                    CacheFile::default()
                }
            },
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No cache file yet; starting empty");
                CacheFile::default()
            }
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    %error,
                    "Cache file unreadable; treating every chunk as new"
                );
                CacheFile::default()
            }
        };

        tracing::debug!(path = %path.display(), entries = file.chunks.len(), "Cache loaded");
        Self {
            path,
            file,
            staged: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of committed entries.
    pub fn len(&self) -> usize {
        self.file.chunks.len()
    }

    /// Whether no entries have been committed.
    pub fn is_empty(&self) -> bool {
        self.file.chunks.is_empty()
    }

    /// Whether `content_hash` is recorded as already submitted.
    pub fn contains(&self, content_hash: &str) -> bool {
        self.file.chunks.contains_key(content_hash)
    }

    /// Committed entry for `content_hash`, if any.
    pub fn entry(&self, content_hash: &str) -> Option<&CacheEntry> {
        self.file.chunks.get(content_hash)
    }

    /// Partition `chunks` into cached and pending ones.
    pub fn diff(&self, chunks: Vec<Chunk>) -> CacheDiff {
        partition(chunks, |hash| self.contains(hash))
    }

    /// Record a successfully submitted chunk; persisted by the next [`commit`](Self::commit).
    pub fn stage(&mut self, chunk: &Chunk, ingested_at: OffsetDateTime) {
        self.staged.insert(
            chunk.content_hash.clone(),
            CacheEntry {
                chunk_number: chunk.sequence_number,
                last_ingested: ingested_at,
            },
        );
        self.dirty = true;
    }

    /// Number of entries waiting for [`commit`](Self::commit).
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Forget every entry, committed or staged. The next commit rewrites the file.
    pub fn reset(&mut self) {
        self.file.chunks.clear();
        self.staged.clear();
        self.dirty = true;
    }

    /// Atomically persist staged entries, returning how many were added.
    ///
    /// Nothing is written when nothing changed. On failure, staged entries stay staged and the
    /// file on disk is untouched.
    pub async fn commit(&mut self) -> Result<usize, CacheError> {
        if !self.dirty {
            return Ok(0);
        }

        let mut merged = self.file.clone();
        merged
            .chunks
            .extend(self.staged.iter().map(|(hash, entry)| (hash.clone(), entry.clone())));
        let mut bytes = serde_json::to_vec_pretty(&merged)?;
        bytes.push(b'\n');

        let target = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&target, &bytes))
            .await
            .map_err(std::io::Error::other)
            .and_then(|written| written)
            .map_err(|source| CacheError::Persist {
                path: self.path.clone(),
                source,
            })?;

        let committed = self.staged.len();
        self.file = merged;
        self.staged.clear();
        self.dirty = false;
        tracing::debug!(
            path = %self.path.display(),
            committed,
            entries = self.file.chunks.len(),
            "Cache committed"
        );
        Ok(committed)
    }
}

/// File name used as a document's identity.
pub fn document_identity(document: &Path) -> String {
    document
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| document.display().to_string())
}

/// Cache file location for `document` inside `cache_dir`.
pub fn cache_path_for(cache_dir: &Path, document: &Path) -> PathBuf {
    cache_dir.join(format!("{}{CACHE_FILE_SUFFIX}", document_identity(document)))
}

fn partition(chunks: Vec<Chunk>, is_cached: impl Fn(&str) -> bool) -> CacheDiff {
    let mut seen = HashSet::new();
    let mut diff = CacheDiff::default();

    for chunk in chunks {
        if is_cached(&chunk.content_hash) {
            diff.unchanged += 1;
        } else if seen.insert(chunk.content_hash.clone()) {
            diff.pending.push(chunk);
        } else {
            diff.duplicates += 1;
        }
    }

    diff
}

/// Write `bytes` next to `path` and rename over it. Blocking.
fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    std::fs::create_dir_all(dir)?;
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|error| error.error)?;
    Ok(())
}

/// Parse RFC 3339, falling back to offset-less ISO-8601 interpreted as UTC.
fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(parsed) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(parsed);
    }
    let naive = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
    );
    PrimitiveDateTime::parse(raw, naive)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

mod timestamp {
    use serde::{Deserialize, Deserializer, Serializer, de, ser};
    use time::{OffsetDateTime, format_description::well_known::Rfc3339};

    pub(super) fn serialize<S: Serializer>(
        value: &OffsetDateTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let formatted = value.format(&Rfc3339).map_err(ser::Error::custom)?;
        serializer.serialize_str(&formatted)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<OffsetDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp '{raw}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn chunks(contents: &[&str]) -> Vec<Chunk> {
        contents
            .iter()
            .enumerate()
            .map(|(idx, content)| Chunk::new(idx + 1, *content))
            .collect()
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::load(dir.path().join("doc.txt.cache.json")).await;
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt.cache.json");
        std::fs::write(&path, "{ \"chunks\": { not json").unwrap();
        let cache = ContentCache::load(&path).await;
        assert!(cache.is_empty());
        assert_eq!(cache.diff(chunks(&["a", "b"])).pending.len(), 2);
    }

    #[tokio::test]
    async fn diff_skips_cached_hashes_regardless_of_position() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ContentCache::load(dir.path().join("doc.txt.cache.json")).await;
        for chunk in chunks(&["alpha", "beta"]) {
            cache.stage(&chunk, datetime!(2025-01-01 00:00 UTC));
        }
        cache.commit().await.unwrap();

        let diff = cache.diff(chunks(&["beta", "gamma", "alpha"]));
        assert_eq!(diff.unchanged, 2);
        assert_eq!(diff.duplicates, 0);
        assert_eq!(diff.pending.len(), 1);
        assert_eq!(diff.pending[0].content, "gamma");
        assert_eq!(diff.pending[0].sequence_number, 2);
    }

    #[test]
    fn duplicate_chunks_collapse_to_first_occurrence() {
        let diff = CacheDiff::all_new(chunks(&["same", "other", "same"]));
        let numbers: Vec<_> = diff.pending.iter().map(|c| c.sequence_number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(diff.duplicates, 1);
        assert_eq!(diff.unchanged, 0);
    }

    #[tokio::test]
    async fn staged_entries_are_invisible_until_committed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt.cache.json");
        let mut cache = ContentCache::load(&path).await;
        let chunk = Chunk::new(1, "alpha");

        cache.stage(&chunk, datetime!(2025-01-01 00:00 UTC));
        assert!(!cache.contains(&chunk.content_hash));
        assert!(!path.exists());
        assert_eq!(cache.staged_len(), 1);

        assert_eq!(cache.commit().await.unwrap(), 1);
        assert!(cache.contains(&chunk.content_hash));
        assert!(ContentCache::load(&path).await.contains(&chunk.content_hash));
    }

    #[tokio::test]
    async fn commit_without_changes_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt.cache.json");
        std::fs::write(&path, "not even json").unwrap();

        let mut cache = ContentCache::load(&path).await;
        assert_eq!(cache.commit().await.unwrap(), 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "not even json");
    }

    #[tokio::test]
    async fn commit_creates_missing_cache_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/.cache/doc.txt.cache.json");
        let mut cache = ContentCache::load(&path).await;
        cache.stage(&Chunk::new(1, "alpha"), datetime!(2025-01-01 00:00 UTC));
        cache.commit().await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn failed_commit_keeps_entries_staged() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();

        let mut cache = ContentCache::load(blocker.join("doc.txt.cache.json")).await;
        cache.stage(&Chunk::new(1, "alpha"), datetime!(2025-01-01 00:00 UTC));
        let error = cache.commit().await.unwrap_err();
        assert!(matches!(error, CacheError::Persist { .. }));
        assert_eq!(cache.staged_len(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn reset_rewrites_file_without_prior_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt.cache.json");
        let mut cache = ContentCache::load(&path).await;
        cache.stage(&Chunk::new(1, "alpha"), datetime!(2025-01-01 00:00 UTC));
        cache.commit().await.unwrap();

        let mut reloaded = ContentCache::load(&path).await;
        reloaded.reset();
        reloaded.commit().await.unwrap();
        assert!(ContentCache::load(&path).await.is_empty());
    }

    #[tokio::test]
    async fn cache_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt.cache.json");
        let original = r#"{
  "chunks": {
    "3f1c": { "chunk_number": 4, "last_ingested": "2025-03-01T12:30:15.250Z" },
    "9ab0": { "chunk_number": 1, "last_ingested": "2025-03-01T12:30:05+02:00" }
  }
}"#;
        std::fs::write(&path, original).unwrap();
        let expected: CacheFile = serde_json::from_str(original).unwrap();

        let mut cache = ContentCache::load(&path).await;
        cache.reset();
        for (hash, entry) in &expected.chunks {
            cache.staged.insert(hash.clone(), entry.clone());
        }
        cache.commit().await.unwrap();

        let written: CacheFile =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, expected);
    }

    #[test]
    fn naive_iso_timestamps_are_read_as_utc() {
        let file: CacheFile = serde_json::from_str(
            r#"{"chunks": {"abc": {"chunk_number": 2, "last_ingested": "2025-03-01T12:30:15.123456"}}}"#,
        )
        .unwrap();
        assert_eq!(
            file.chunks["abc"].last_ingested,
            datetime!(2025-03-01 12:30:15.123456 UTC)
        );
    }

    #[test]
    fn cache_path_uses_document_file_name() {
        let path = cache_path_for(Path::new(".cache"), Path::new("/data/wizard_of_oz/woo.txt"));
        assert_eq!(path, Path::new(".cache/woo.txt.cache.json"));
    }
}

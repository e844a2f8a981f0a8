//! Disk-backed response cache.
//!
//! [`ResponseCache`] memoizes completions as one JSON file per entry,
//! named `<digest>.json`, under a configured directory. Entries are
//! write-once: the first successful response for a digest is kept and
//! every later identical request reads it back. Nothing expires; entries
//! go away only through [`ResponseCache::clear`].
//!
//! # Concurrency
//!
//! Writes go to a uniquely named temporary file in the cache directory and
//! are renamed into place, so a reader never sees a half-written entry and
//! concurrent writers of different digests never interfere. Two writers of
//! the same digest produce identical content, so whichever rename lands
//! last is harmless.
//!
//! # Memory front
//!
//! An optional moka LRU sits in front of the directory so hot entries skip
//! the file read. It holds copies of on-disk entries only and is dropped
//! wholesale on `clear`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::key::CacheDigest;
use crate::telemetry;
use crate::types::{Completion, RequestDescriptor};
use crate::{Result, SlipstreamError};

/// Default cache directory, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = "_slipstream_cache";

/// Configuration for the response cache.
///
/// ```rust
/// # use slipstream::CacheConfig;
/// let config = CacheConfig::new("/tmp/slipstream-cache").memory_entries(0);
/// assert_eq!(config.memory_entries, 0);
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding one file per entry. Created on open.
    pub dir: PathBuf,
    /// Capacity of the in-memory front. 0 disables it. Default: 1,024.
    pub memory_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_CACHE_DIR),
            memory_entries: 1_024,
        }
    }
}

impl CacheConfig {
    /// Config rooted at `dir` with the default memory front.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    /// Set the capacity of the in-memory front (0 disables it).
    pub fn memory_entries(mut self, n: u64) -> Self {
        self.memory_entries = n;
        self
    }
}

/// One persisted request/response pair.
///
/// The completion is stored flat (`response`, `model`, `actual_model`, ...)
/// next to the run tag and index of the descriptor that produced it, which
/// is what filtered [`clear`](ResponseCache::clear) matches against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(flatten)]
    pub completion: Completion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

impl CacheEntry {
    /// Build the entry recorded for `descriptor`'s response.
    pub fn new(completion: Completion, descriptor: &RequestDescriptor) -> Self {
        Self {
            completion,
            run: descriptor.run.clone(),
            index: Some(descriptor.index),
        }
    }

    /// Whether a clear filter selects this entry.
    ///
    /// Matches by substring on the run tag, the requested model and the
    /// model that actually answered.
    pub fn matches(&self, filter: &str) -> bool {
        self.run.as_deref().is_some_and(|run| run.contains(filter))
            || self.completion.model.contains(filter)
            || self.completion.actual_model.contains(filter)
    }
}

/// Write-once, read-many memoization store.
pub struct ResponseCache {
    dir: PathBuf,
    memory: Option<Cache<CacheDigest, CacheEntry>>,
    tmp_seq: AtomicU64,
}

impl ResponseCache {
    /// Open (and create if needed) the cache directory.
    pub async fn open(config: &CacheConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.dir).await?;
        let memory = (config.memory_entries > 0).then(|| {
            Cache::builder()
                .max_capacity(config.memory_entries)
                .build()
        });
        Ok(Self {
            dir: config.dir.clone(),
            memory,
            tmp_seq: AtomicU64::new(0),
        })
    }

    /// Directory holding the entries.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, digest: &CacheDigest) -> PathBuf {
        self.dir.join(digest.file_name())
    }

    /// Look up an entry, treating any storage problem as a miss.
    ///
    /// Corrupt or unreadable files are logged and reported as `None`, so the
    /// caller simply re-fetches and overwrites them.
    pub async fn get(&self, digest: &CacheDigest) -> Option<CacheEntry> {
        match self.try_get(digest).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(digest = digest.short(), error = %e, "ignoring unreadable cache entry");
                None
            }
        }
    }

    /// Look up an entry, surfacing storage problems.
    ///
    /// `Ok(None)` on a plain miss, `Err(CacheCorrupt)` when the file exists
    /// but does not decode. Emits cache hit/miss metrics.
    pub async fn try_get(&self, digest: &CacheDigest) -> Result<Option<CacheEntry>> {
        if let Some(memory) = &self.memory {
            if let Some(entry) = memory.get(digest).await {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
                debug!(digest = digest.short(), "cache hit (memory)");
                return Ok(Some(entry));
            }
        }

        let bytes = match tokio::fs::read(self.path_for(digest)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
                return Ok(None);
            }
            Err(e) => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
                return Err(e.into());
            }
        };

        let entry: CacheEntry = serde_json::from_slice(&bytes).map_err(|e| {
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
            SlipstreamError::CacheCorrupt {
                digest: digest.to_string(),
                reason: e.to_string(),
            }
        })?;

        metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
        debug!(digest = digest.short(), "cache hit (disk)");
        if let Some(memory) = &self.memory {
            memory.insert(digest.clone(), entry.clone()).await;
        }
        Ok(Some(entry))
    }

    /// Whether a readable entry exists for `digest`.
    pub async fn contains(&self, digest: &CacheDigest) -> bool {
        self.get(digest).await.is_some()
    }

    /// Persist an entry.
    ///
    /// A digest that already has a readable file is left untouched, so
    /// repeated writes are no-ops. A corrupt file is replaced.
    pub async fn put(&self, digest: &CacheDigest, entry: &CacheEntry) -> Result<()> {
        let path = self.path_for(digest);
        if self.read_entry(&path).await.is_some() {
            debug!(digest = digest.short(), "cache entry already present");
            return Ok(());
        }

        let bytes = serde_json::to_vec(entry)?;
        let tmp = self.dir.join(format!(
            ".{}.{}.{}.tmp",
            digest,
            std::process::id(),
            self.tmp_seq.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        if let Some(memory) = &self.memory {
            memory.insert(digest.clone(), entry.clone()).await;
        }
        debug!(digest = digest.short(), "cache entry written");
        Ok(())
    }

    /// Delete entries, returning how many were removed.
    ///
    /// Without a filter every entry (and any stray temporary file) goes.
    /// With a filter, an entry is removed when its digest starts with the
    /// filter or [`CacheEntry::matches`] it; undecodable entries are kept
    /// since nothing can be said about what they belong to.
    pub async fn clear(&self, filter: Option<&str>) -> Result<usize> {
        if let Some(memory) = &self.memory {
            memory.invalidate_all();
        }

        let mut removed = 0;
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            if name.starts_with('.') && name.ends_with(".tmp") {
                if filter.is_none() {
                    remove_if_present(&path).await?;
                }
                continue;
            }

            let Some(digest) = name.strip_suffix(".json").and_then(CacheDigest::parse) else {
                continue;
            };

            let selected = match filter {
                None => true,
                Some(f) if digest.as_str().starts_with(f) => true,
                Some(f) => self
                    .read_entry(&path)
                    .await
                    .is_some_and(|entry| entry.matches(f)),
            };

            if selected && remove_if_present(&path).await? {
                removed += 1;
            }
        }

        debug!(removed, filter, "cache cleared");
        Ok(removed)
    }

    /// Number of entries on disk.
    pub async fn len(&self) -> Result<usize> {
        let mut count = 0;
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let name = item.file_name();
            let is_entry = name
                .to_str()
                .and_then(|n| n.strip_suffix(".json"))
                .and_then(CacheDigest::parse)
                .is_some();
            if is_entry {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    async fn read_entry(&self, path: &Path) -> Option<CacheEntry> {
        let bytes = tokio::fs::read(path).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

/// Remove a file, tolerating a concurrent delete.
async fn remove_if_present(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

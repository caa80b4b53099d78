//! Content-addressed cache for filter resolution results.
//!
//! It is cheaper to store resolved results than to ask a knowledge-base
//! service the same question again. A record is keyed by
//! (filter, dataset, annotator-or-sentinel) and carries a checksum over the
//! *input* entity set that produced it, so staleness is detected without
//! storing any history: if the current input hashes differently, the record
//! is recomputed and overwritten in place.
//!
//! For a full reset of the disk cache, remove the cache directory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::filter::definition::ResolutionScope;
use crate::filter::EntitySet;

fn lock_err(context: &'static str) -> CacheError {
    CacheError::LockPoisoned { context }
}

/// Stable, order-insensitive content hash over a candidate entity set.
///
/// The set iterates in sorted order and every element is length-prefixed,
/// so the digest depends only on set membership, never on insertion order
/// or element boundaries.
#[must_use]
pub fn input_checksum(entities: &EntitySet) -> String {
    let mut hasher = blake3::Hasher::new();
    for entity in entities {
        hasher.update(&(entity.len() as u64).to_le_bytes());
        hasher.update(entity.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Key of one cached resolution result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Filter name.
    pub filter: String,
    /// Dataset name.
    pub dataset: String,
    /// Annotator name, or the gold standard sentinel.
    pub annotator: String,
}

impl CacheKey {
    /// Builds the key for a filter name and resolution scope.
    #[must_use]
    pub fn new(filter: impl Into<String>, scope: &ResolutionScope) -> Self {
        Self {
            filter: filter.into(),
            dataset: scope.dataset().to_string(),
            annotator: scope.annotator_key().to_string(),
        }
    }

    fn file_name(&self) -> String {
        fn normalize(s: &str) -> String {
            s.replace(['/', ' ', ':'], "_")
        }
        format!(
            "{}_{}_{}.json",
            normalize(&self.filter),
            normalize(&self.annotator),
            normalize(&self.dataset)
        )
    }
}

/// One persisted resolution result together with its input checksum.
///
/// The checksum covers the full candidate set that was resolved, not the
/// resolved subset; freshness means "the same question was asked", not
/// "the same answer came back".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResult {
    /// The cache key this record belongs to.
    pub key: CacheKey,
    /// Entities that satisfied the filter predicate.
    pub resolved: EntitySet,
    /// Checksum over the input entity set.
    pub checksum: String,
}

impl CachedResult {
    /// Creates a cached result from a resolution outcome.
    #[must_use]
    pub fn new(key: CacheKey, resolved: EntitySet, checksum: impl Into<String>) -> Self {
        Self {
            key,
            resolved,
            checksum: checksum.into(),
        }
    }
}

/// A persisted store of resolution results keyed by
/// (filter, dataset, annotator-or-sentinel).
///
/// Implementations must support concurrent access from unrelated keys
/// without cross-caller blocking; racing writers to the same key may
/// interleave, but the surviving record must be internally consistent
/// (last writer wins, checksum matching its own payload).
pub trait FilterCache: Send + Sync {
    /// Fetches the record for a key, if any.
    ///
    /// Presence alone says nothing about validity; use [`FilterCache::is_fresh`].
    fn get(&self, key: &CacheKey) -> Result<Option<CachedResult>, CacheError>;

    /// Stores a record, overwriting any previous record for the same key.
    fn put(&self, result: CachedResult) -> Result<(), CacheError>;

    /// Returns true if a record exists for `key` and its stored checksum
    /// equals `checksum`.
    fn is_fresh(&self, key: &CacheKey, checksum: &str) -> Result<bool, CacheError> {
        Ok(self
            .get(key)?
            .is_some_and(|record| record.checksum == checksum))
    }
}

/// Thread-safe in-memory cache for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryFilterCache {
    records: RwLock<HashMap<CacheKey, CachedResult>>,
}

impl MemoryFilterCache {
    /// Creates a new empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    ///
    /// # Errors
    /// [`CacheError::LockPoisoned`] if a writer panicked.
    pub fn len(&self) -> Result<usize, CacheError> {
        Ok(self.records.read().map_err(|_| lock_err("memory.len"))?.len())
    }

    /// Returns true if the cache holds no records.
    ///
    /// # Errors
    /// [`CacheError::LockPoisoned`] if a writer panicked.
    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }
}

impl FilterCache for MemoryFilterCache {
    fn get(&self, key: &CacheKey) -> Result<Option<CachedResult>, CacheError> {
        let records = self.records.read().map_err(|_| lock_err("memory.get"))?;
        Ok(records.get(key).cloned())
    }

    fn put(&self, result: CachedResult) -> Result<(), CacheError> {
        let mut records = self.records.write().map_err(|_| lock_err("memory.put"))?;
        records.insert(result.key.clone(), result);
        Ok(())
    }
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Disk-backed cache: one JSON file per key under a cache directory.
///
/// Each overwrite goes through a uniquely named temporary file in the same
/// directory followed by a rename, so callers never observe a partially
/// written record. An unreadable or undecodable file counts as a miss, not
/// an error; the next write replaces it.
#[derive(Debug)]
pub struct DiskFilterCache {
    dir: PathBuf,
}

impl DiskFilterCache {
    /// Opens a disk cache, creating the directory if needed.
    ///
    /// # Errors
    /// [`CacheError::Io`] if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, CacheError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| CacheError::Io {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { dir })
    }

    /// The cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

impl FilterCache for DiskFilterCache {
    fn get(&self, key: &CacheKey) -> Result<Option<CachedResult>, CacheError> {
        let path = self.record_path(key);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                log::warn!("cache read failed for {}: {e}; treating as miss", path.display());
                return Ok(None);
            }
        };

        match serde_json::from_str::<CachedResult>(&text) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                log::warn!(
                    "cache record {} is undecodable: {e}; treating as miss",
                    path.display()
                );
                Ok(None)
            }
        }
    }

    fn put(&self, result: CachedResult) -> Result<(), CacheError> {
        let path = self.record_path(&result.key);
        let json = serde_json::to_string_pretty(&result).map_err(|e| CacheError::Encode {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        // Unique temp name so racing writers of the same key never share a
        // partially written file; the rename decides the winner.
        let tmp = self.dir.join(format!(
            ".{}.tmp.{}.{}",
            result.key.file_name(),
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, json).map_err(|e| CacheError::Io {
            path: tmp.display().to_string(),
            reason: e.to_string(),
        })?;
        fs::rename(&tmp, &path).map_err(|e| CacheError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        log::debug!("cache record {} written", path.display());
        Ok(())
    }
}

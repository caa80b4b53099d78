//! Composable decorators around an [`EntityResolver`].
//!
//! Every decorator is semantically transparent: whitelisting, chunking and
//! caching may change how many calls reach the base resolver, never what
//! the resolution returns. The pipeline factory assembles them in the order
//! whitelist → cache → chunk → base, so the cache checksum covers exactly
//! the set that would be sent onward and a hit skips every remote batch.

use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::error::ResolutionError;
use crate::filter::cache::{input_checksum, CacheKey, CachedResult, FilterCache};
use crate::filter::definition::{FilterDefinition, ResolutionScope};
use crate::filter::resolver::EntityResolver;
use crate::filter::EntitySet;

static IRI_RE: OnceLock<Regex> = OnceLock::new();

// Light syntactic check: scheme, authority/path, no whitespace or angle
// brackets inside. Optional surrounding angle brackets are accepted.
fn is_valid_iri(uri: &str) -> bool {
    let re = IRI_RE.get_or_init(|| {
        Regex::new(r#"^<?[A-Za-z][A-Za-z0-9+.-]*://[^\s<>"{}|\\^`]+>?$"#)
            .unwrap_or_else(|e| unreachable!("static IRI regex must compile: {e}"))
    });
    re.is_match(uri)
}

/// Pre-filters candidate URIs against the definition's whitelist before
/// anything reaches the delegate.
///
/// A URI passes if it is syntactically a valid IRI and contains one of the
/// whitelist entries as a substring. With an empty whitelist the input is
/// delegated unchanged. Filtering is idempotent: applying the stage twice
/// yields the same set as applying it once.
pub struct WhitelistResolver {
    delegate: Box<dyn EntityResolver>,
}

impl WhitelistResolver {
    /// Wraps a delegate resolver.
    #[must_use]
    pub fn new(delegate: Box<dyn EntityResolver>) -> Self {
        Self { delegate }
    }
}

impl EntityResolver for WhitelistResolver {
    fn resolve(
        &self,
        entities: &EntitySet,
        definition: &FilterDefinition,
        scope: &ResolutionScope,
    ) -> Result<EntitySet, ResolutionError> {
        if definition.whitelist.is_empty() {
            return self.delegate.resolve(entities, definition, scope);
        }

        let allowed: EntitySet = entities
            .iter()
            .filter(|uri| {
                is_valid_iri(uri)
                    && definition
                        .whitelist
                        .iter()
                        .any(|prefix| uri.contains(prefix.as_str()))
            })
            .cloned()
            .collect();

        let dropped = entities.len() - allowed.len();
        if dropped > 0 {
            log::debug!(
                "whitelist for filter '{}' dropped {dropped} of {} candidates",
                definition.name,
                entities.len()
            );
        }
        self.delegate.resolve(&allowed, definition, scope)
    }
}

/// Splits oversized candidate sets into batches and unions the partial
/// results.
///
/// Batches are issued sequentially to bound concurrent load on the backing
/// service. Batch boundaries carry no semantic meaning; any batch failure
/// aborts the whole resolution rather than silently dropping its slice.
pub struct ChunkResolver {
    delegate: Box<dyn EntityResolver>,
}

impl ChunkResolver {
    /// Wraps a delegate resolver.
    #[must_use]
    pub fn new(delegate: Box<dyn EntityResolver>) -> Self {
        Self { delegate }
    }
}

impl EntityResolver for ChunkResolver {
    fn resolve(
        &self,
        entities: &EntitySet,
        definition: &FilterDefinition,
        scope: &ResolutionScope,
    ) -> Result<EntitySet, ResolutionError> {
        let chunk_size = definition.chunk_size;
        if chunk_size == 0 || entities.len() <= chunk_size {
            return self.delegate.resolve(entities, definition, scope);
        }

        let candidates: Vec<&String> = entities.iter().collect();
        let mut resolved = EntitySet::new();
        for (batch, slice) in candidates.chunks(chunk_size).enumerate() {
            let chunk: EntitySet = slice.iter().map(|s| (*s).clone()).collect();
            match self.delegate.resolve(&chunk, definition, scope) {
                Ok(partial) => resolved.extend(partial),
                Err(e) => {
                    return Err(ResolutionError::ChunkAborted {
                        batch,
                        source: Box::new(e),
                    })
                }
            }
        }
        Ok(resolved)
    }
}

/// Returns a cached resolution when the current input set hashes to the
/// stored checksum; otherwise delegates and overwrites the record.
///
/// A delegate failure leaves the cache untouched, so a stale-but-valid
/// record stays available for the next run. Cache write failures are logged
/// and never fail the resolution that produced the value.
pub struct CacheResolver {
    delegate: Box<dyn EntityResolver>,
    cache: Arc<dyn FilterCache>,
}

impl CacheResolver {
    /// Wraps a delegate resolver with the given cache backend.
    #[must_use]
    pub fn new(delegate: Box<dyn EntityResolver>, cache: Arc<dyn FilterCache>) -> Self {
        Self { delegate, cache }
    }
}

impl EntityResolver for CacheResolver {
    fn resolve(
        &self,
        entities: &EntitySet,
        definition: &FilterDefinition,
        scope: &ResolutionScope,
    ) -> Result<EntitySet, ResolutionError> {
        let checksum = input_checksum(entities);
        let key = CacheKey::new(definition.name.clone(), scope);

        match self.cache.get(&key) {
            Ok(Some(record)) if record.checksum == checksum => {
                log::debug!(
                    "cache hit for filter '{}' on {}/{}",
                    key.filter,
                    key.dataset,
                    key.annotator
                );
                return Ok(record.resolved);
            }
            Ok(_) => {}
            Err(e) => log::warn!("cache read failed, treating as miss: {e}"),
        }

        let resolved = self.delegate.resolve(entities, definition, scope)?;
        if let Err(e) = self
            .cache
            .put(CachedResult::new(key, resolved.clone(), checksum))
        {
            log::warn!("cache write failed, result not persisted: {e}");
        }
        Ok(resolved)
    }
}

//! The entity-resolution filtering pipeline.
//!
//! A filter selects a subset of entity URIs out of annotated documents by
//! asking a knowledge source which candidates satisfy a predicate. The
//! pipeline is composed of decorators around a base [`resolver::EntityResolver`]:
//! whitelisting pre-filters candidates, chunking bounds batch sizes against
//! remote services, and a content-addressed cache avoids re-asking questions
//! whose input has not changed. All stages are semantically transparent;
//! they change cost, never results.

pub mod cache;
pub mod decorators;
pub mod definition;
pub mod document;
pub mod factory;
pub mod resolver;
pub mod wrapper;

use std::collections::BTreeSet;

/// A flat set of entity URIs.
///
/// Sorted iteration gives the content checksum a canonical order and makes
/// chunk boundaries deterministic.
pub type EntitySet = BTreeSet<String>;

pub use cache::{input_checksum, CacheKey, CachedResult, DiskFilterCache, FilterCache, MemoryFilterCache};
pub use decorators::{CacheResolver, ChunkResolver, WhitelistResolver};
pub use definition::{
    FilterDefinition, ResolutionScope, GOLD_STANDARD_SENTINEL, IDENTITY_FILTER_NAME,
};
pub use document::{Document, Marking};
pub use factory::{BaseResolverFn, FilterHolder, FilterPipelineFactory, FilterSettings};
pub use resolver::{EntityResolver, IdentityResolver, LocalKnowledgeResolver};
pub use wrapper::{FilterWrapper, IdentityWrapper, ResolvingWrapper};

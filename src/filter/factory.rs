//! Assembly of ready-to-use filter pipelines.
//!
//! The factory reads filter definitions, assembles the decorator chain
//! around a base resolver for each of them, and produces a [`FilterHolder`]
//! with the identity filter always in first position. Stages whose
//! configuration makes them a no-op (empty whitelist, chunk size 0,
//! caching disabled) are skipped entirely.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{BenchResult, ConfigError};
use crate::filter::cache::FilterCache;
use crate::filter::decorators::{CacheResolver, ChunkResolver, WhitelistResolver};
use crate::filter::definition::FilterDefinition;
use crate::filter::document::Document;
use crate::filter::resolver::EntityResolver;
use crate::filter::wrapper::{FilterWrapper, IdentityWrapper, ResolvingWrapper};

/// Builds a base resolver for one filter definition.
///
/// The factory calls this once per definition; constructors may do the I/O
/// they need (e.g. loading a local knowledge file), and construction
/// failures are startup-fatal.
pub type BaseResolverFn<'a> = dyn Fn(&FilterDefinition) -> BenchResult<Box<dyn EntityResolver>> + 'a;

/// Filter configuration as loaded from a settings file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSettings {
    /// Whether resolution results are cached.
    #[serde(default = "default_cache")]
    pub cache: bool,
    /// Whitelist applied to every definition that does not carry its own.
    #[serde(default)]
    pub whitelist: Vec<String>,
    /// The filter definitions, in declaration order.
    pub filters: Vec<FilterDefinition>,
}

const fn default_cache() -> bool {
    true
}

impl FilterSettings {
    /// Loads settings from a JSON file.
    ///
    /// # Errors
    /// [`ConfigError::MalformedSettings`] if the file is unreadable or does
    /// not deserialize.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ConfigError::MalformedSettings {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let settings: Self =
            serde_json::from_str(&text).map_err(|e| ConfigError::MalformedSettings {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(settings)
    }

    /// The definitions with the global whitelist folded into every
    /// definition that declares none of its own.
    #[must_use]
    pub fn effective_definitions(&self) -> Vec<FilterDefinition> {
        self.filters
            .iter()
            .map(|def| {
                if def.whitelist.is_empty() && !self.whitelist.is_empty() {
                    FilterDefinition {
                        whitelist: self.whitelist.clone(),
                        ..def.clone()
                    }
                } else {
                    def.clone()
                }
            })
            .collect()
    }
}

/// A named set of ready-to-use filter wrappers, in declaration order, with
/// the identity filter always first.
pub struct FilterHolder {
    wrappers: Vec<Arc<dyn FilterWrapper>>,
}

impl fmt::Debug for FilterHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .wrappers
            .iter()
            .map(|w| w.definition().name.as_str())
            .collect();
        f.debug_struct("FilterHolder").field("filters", &names).finish()
    }
}

impl FilterHolder {
    /// A holder containing only the identity filter, used for experiment
    /// types that are never filtered.
    #[must_use]
    pub fn identity_only() -> Self {
        Self {
            wrappers: vec![Arc::new(IdentityWrapper::new())],
        }
    }

    /// The wrappers in declaration order.
    #[must_use]
    pub fn wrappers(&self) -> &[Arc<dyn FilterWrapper>] {
        &self.wrappers
    }

    /// Looks up a wrapper by filter name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&Arc<dyn FilterWrapper>> {
        self.wrappers.iter().find(|w| w.definition().name == name)
    }

    /// Number of wrappers, identity included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.wrappers.len()
    }

    /// Always false: the identity wrapper is present in every holder.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.wrappers.is_empty()
    }

    /// Runs every non-identity filter over the gold standard once, warming
    /// the cache so later annotator runs do not pay for it.
    ///
    /// Best-effort: an individual warm-up failure is logged and skipped,
    /// the run itself will retry (and surface) the failure.
    pub fn precache_gold_standard(&self, documents: &[Document], dataset: &str) {
        for wrapper in &self.wrappers {
            if wrapper.definition().is_identity() {
                continue;
            }
            if let Err(e) = wrapper.filter_gold_standard(documents, dataset) {
                log::warn!(
                    "gold standard warm-up failed for filter '{}' on {dataset}: {e}",
                    wrapper.definition().name
                );
            }
        }
    }
}

/// Assembles decorator chains into filter wrappers.
///
/// The cache instance is injected here rather than resolved from global
/// state, so tests can run against an in-memory cache.
pub struct FilterPipelineFactory {
    cache: Arc<dyn FilterCache>,
    enable_cache: bool,
}

impl FilterPipelineFactory {
    /// Creates a factory using the given cache backend.
    #[must_use]
    pub fn new(cache: Arc<dyn FilterCache>, enable_cache: bool) -> Self {
        Self {
            cache,
            enable_cache,
        }
    }

    /// Builds a holder for the given definitions.
    ///
    /// Definitions are validated (non-empty unique names, no reserved
    /// names), the base resolver is constructed per definition, and the
    /// chain is assembled outermost-first: whitelist, cache, chunking,
    /// base. The identity wrapper is always prepended.
    ///
    /// # Errors
    /// [`ConfigError`] for invalid definitions; whatever the base resolver
    /// constructor raises. All are fatal, no partial holder is returned.
    pub fn build_holder(
        &self,
        definitions: &[FilterDefinition],
        base_for: &BaseResolverFn<'_>,
    ) -> BenchResult<FilterHolder> {
        validate_definitions(definitions)?;

        let mut wrappers: Vec<Arc<dyn FilterWrapper>> =
            Vec::with_capacity(definitions.len() + 1);
        wrappers.push(Arc::new(IdentityWrapper::new()));

        for definition in definitions {
            let mut chain = base_for(definition)?;
            if definition.chunk_size > 0 {
                chain = Box::new(ChunkResolver::new(chain));
            }
            if self.enable_cache {
                chain = Box::new(CacheResolver::new(chain, self.cache.clone()));
            }
            if !definition.whitelist.is_empty() {
                chain = Box::new(WhitelistResolver::new(chain));
            }
            log::info!("loaded filter '{}'", definition.name);
            wrappers.push(Arc::new(ResolvingWrapper::new(definition.clone(), chain)));
        }

        Ok(FilterHolder { wrappers })
    }
}

fn validate_definitions(definitions: &[FilterDefinition]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for definition in definitions {
        if definition.name.is_empty() {
            return Err(ConfigError::EmptyFilterName);
        }
        if definition.is_identity() {
            return Err(ConfigError::ReservedFilterName {
                name: definition.name.clone(),
            });
        }
        if !seen.insert(definition.name.as_str()) {
            return Err(ConfigError::DuplicateFilterName {
                name: definition.name.clone(),
            });
        }
    }
    Ok(())
}

//! The entity resolution capability and its base implementations.
//!
//! An [`EntityResolver`] answers "which of these URIs satisfy the filter
//! predicate" against a knowledge source. Remote implementations (SPARQL
//! endpoints and the like) live outside this crate and are injected through
//! the pipeline factory; this module ships the always-pass identity resolver
//! and a resolver backed by a local knowledge file.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{ConfigError, ResolutionError};
use crate::filter::definition::{FilterDefinition, ResolutionScope};
use crate::filter::EntitySet;

/// Resolves the subset of a candidate entity set that satisfies a filter
/// predicate within a given scope.
///
/// Implementations must never mutate their input, and must evaluate the
/// predicate independently per entity: `resolve(A ∪ B)` has to equal
/// `resolve(A) ∪ resolve(B)` for any partition of the input, which is what
/// makes the chunking decorator semantically transparent.
pub trait EntityResolver: Send + Sync {
    /// Returns the subset of `entities` satisfying the filter predicate.
    ///
    /// # Errors
    /// [`ResolutionError`] if the backing service is unreachable or returns
    /// malformed data.
    fn resolve(
        &self,
        entities: &EntitySet,
        definition: &FilterDefinition,
        scope: &ResolutionScope,
    ) -> Result<EntitySet, ResolutionError>;
}

/// The always-pass resolver: every candidate satisfies the predicate.
///
/// Backs the identity filter and is useful as an inert chain terminator in
/// tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl IdentityResolver {
    /// Creates a new identity resolver.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl EntityResolver for IdentityResolver {
    fn resolve(
        &self,
        entities: &EntitySet,
        _definition: &FilterDefinition,
        _scope: &ResolutionScope,
    ) -> Result<EntitySet, ResolutionError> {
        Ok(entities.clone())
    }
}

/// A parsed predicate template: `?v <predicate> <object>`.
///
/// The marker `?v` stands for the candidate entity and must appear in
/// subject position. `*` in predicate or object position matches anything.
#[derive(Debug, Clone)]
struct TriplePattern {
    predicate: Option<String>,
    object: Option<String>,
}

impl TriplePattern {
    fn parse(filter: &str, template: &str) -> Result<Self, ConfigError> {
        let tokens: Vec<&str> = template.split_whitespace().collect();
        if tokens.len() != 3 {
            return Err(ConfigError::InvalidPredicateTemplate {
                filter: filter.to_string(),
                reason: format!("expected 3 tokens, found {}", tokens.len()),
            });
        }
        if tokens[0] != "?v" {
            return Err(ConfigError::InvalidPredicateTemplate {
                filter: filter.to_string(),
                reason: "injection marker '?v' must be the subject".to_string(),
            });
        }
        if tokens[1] == "?v" || tokens[2] == "?v" {
            return Err(ConfigError::InvalidPredicateTemplate {
                filter: filter.to_string(),
                reason: "injection marker '?v' may only appear once".to_string(),
            });
        }

        let wildcard = |t: &str| {
            if t == "*" {
                None
            } else {
                Some(t.to_string())
            }
        };
        Ok(Self {
            predicate: wildcard(tokens[1]),
            object: wildcard(tokens[2]),
        })
    }

    fn matches(&self, predicate: &str, object: &str) -> bool {
        self.predicate.as_deref().map_or(true, |p| p == predicate)
            && self.object.as_deref().map_or(true, |o| o == object)
    }
}

/// A resolver backed by a local knowledge file, loaded once at construction.
///
/// The file is line-oriented: three whitespace-separated terms per line
/// (`subject predicate object`), `#` starts a comment. The whole index is
/// held in memory, so keep local knowledge files small.
pub struct LocalKnowledgeResolver {
    pattern: TriplePattern,
    by_subject: HashMap<String, Vec<(String, String)>>,
}

impl LocalKnowledgeResolver {
    /// Loads the knowledge file named by the definition's service location
    /// and parses its predicate template.
    ///
    /// # Errors
    /// [`ConfigError`] if the file is unreadable or malformed, or the
    /// template does not parse. Both are startup-fatal by contract.
    pub fn open(definition: &FilterDefinition) -> Result<Self, ConfigError> {
        let pattern = TriplePattern::parse(&definition.name, &definition.predicate_template)?;
        let location = &definition.service_location;
        let text = fs::read_to_string(Path::new(location)).map_err(|e| {
            ConfigError::UnreachableResource {
                location: location.clone(),
                reason: e.to_string(),
            }
        })?;

        let mut by_subject: HashMap<String, Vec<(String, String)>> = HashMap::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let terms: Vec<&str> = line.split_whitespace().collect();
            if terms.len() != 3 {
                return Err(ConfigError::UnreachableResource {
                    location: location.clone(),
                    reason: format!("line {}: expected 3 terms, found {}", lineno + 1, terms.len()),
                });
            }
            by_subject
                .entry(terms[0].to_string())
                .or_default()
                .push((terms[1].to_string(), terms[2].to_string()));
        }

        log::debug!(
            "loaded knowledge file {location}: {} subjects",
            by_subject.len()
        );
        Ok(Self {
            pattern,
            by_subject,
        })
    }

    fn satisfies(&self, entity: &str) -> bool {
        self.by_subject
            .get(entity)
            .is_some_and(|triples| triples.iter().any(|(p, o)| self.pattern.matches(p, o)))
    }
}

impl EntityResolver for LocalKnowledgeResolver {
    fn resolve(
        &self,
        entities: &EntitySet,
        _definition: &FilterDefinition,
        _scope: &ResolutionScope,
    ) -> Result<EntitySet, ResolutionError> {
        Ok(entities
            .iter()
            .filter(|e| self.satisfies(e))
            .cloned()
            .collect())
    }
}

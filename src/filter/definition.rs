//! Filter definitions and resolution scopes.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Reserved annotator-name component used in cache keys for gold standard
/// requests. Never a legal annotator name; see [`ResolutionScope::annotator_result`].
pub const GOLD_STANDARD_SENTINEL: &str = "gt";

/// Name of the always-present identity filter.
pub const IDENTITY_FILTER_NAME: &str = "nofilter";

/// An immutable description of one entity filter.
///
/// Created at configuration-load time and never mutated afterwards.
/// Equality is structural over all fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterDefinition {
    /// Unique filter name, used as a cache-key and registry-key component.
    pub name: String,
    /// Query text with an injection marker for the entity batch.
    pub predicate_template: String,
    /// Ordered list of URI-prefix strings; empty allows all URIs.
    #[serde(default)]
    pub whitelist: Vec<String>,
    /// Remote endpoint URL or local resource path backing this filter.
    pub service_location: String,
    /// Maximum entity batch size per resolver call; 0 means unbounded.
    #[serde(default)]
    pub chunk_size: usize,
}

impl FilterDefinition {
    /// Creates a new filter definition.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        predicate_template: impl Into<String>,
        whitelist: Vec<String>,
        service_location: impl Into<String>,
        chunk_size: usize,
    ) -> Self {
        Self {
            name: name.into(),
            predicate_template: predicate_template.into(),
            whitelist,
            service_location: service_location.into(),
            chunk_size,
        }
    }

    /// The definition backing the identity (no-op) filter.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            name: IDENTITY_FILTER_NAME.to_string(),
            predicate_template: String::new(),
            whitelist: Vec::new(),
            service_location: String::new(),
            chunk_size: 0,
        }
    }

    /// Returns true if this is the identity filter definition.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.name == IDENTITY_FILTER_NAME
    }
}

/// The scope a resolution request runs under: either the gold standard of a
/// dataset, or one annotator's result on a dataset.
///
/// The original system passed an empty annotator name to mean "gold
/// standard" and substituted a sentinel deep in the cache layer; the tagged
/// union makes the distinction explicit and keeps the sentinel confined to
/// persisted key material.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResolutionScope {
    /// A request against the reference annotations of a dataset.
    GoldStandard {
        /// Dataset name.
        dataset: String,
    },
    /// A request against one annotator's output on a dataset.
    AnnotatorResult {
        /// Dataset name.
        dataset: String,
        /// Annotator name.
        annotator: String,
    },
}

impl ResolutionScope {
    /// Creates a gold standard scope.
    #[must_use]
    pub fn gold_standard(dataset: impl Into<String>) -> Self {
        Self::GoldStandard {
            dataset: dataset.into(),
        }
    }

    /// Creates an annotator result scope.
    ///
    /// # Errors
    /// Rejects annotator names equal to the gold standard sentinel, which
    /// would otherwise collapse two distinct cache keys into one.
    pub fn annotator_result(
        dataset: impl Into<String>,
        annotator: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let annotator = annotator.into();
        if annotator == GOLD_STANDARD_SENTINEL {
            return Err(ConfigError::ReservedAnnotatorName { name: annotator });
        }
        Ok(Self::AnnotatorResult {
            dataset: dataset.into(),
            annotator,
        })
    }

    /// The dataset name this scope refers to.
    #[must_use]
    pub fn dataset(&self) -> &str {
        match self {
            Self::GoldStandard { dataset } | Self::AnnotatorResult { dataset, .. } => dataset,
        }
    }

    /// The annotator-name component used in persisted cache keys:
    /// the annotator name, or the reserved sentinel for gold standard scopes.
    #[must_use]
    pub fn annotator_key(&self) -> &str {
        match self {
            Self::GoldStandard { .. } => GOLD_STANDARD_SENTINEL,
            Self::AnnotatorResult { annotator, .. } => annotator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_structural_equality() {
        let a = FilterDefinition::new(
            "persons",
            "?v <rdf:type> <dbo:Person>",
            vec!["http://dbpedia.org/".to_string()],
            "data/persons.nt",
            100,
        );
        let b = a.clone();
        assert_eq!(a, b);

        let c = FilterDefinition { chunk_size: 50, ..b };
        assert_ne!(a, c);
    }

    #[test]
    fn test_identity_definition() {
        let id = FilterDefinition::identity();
        assert!(id.is_identity());
        assert_eq!(id.name, IDENTITY_FILTER_NAME);
        assert!(id.whitelist.is_empty());
        assert_eq!(id.chunk_size, 0);
    }

    #[test]
    fn test_scope_annotator_key() {
        let gold = ResolutionScope::gold_standard("kore50");
        assert_eq!(gold.dataset(), "kore50");
        assert_eq!(gold.annotator_key(), GOLD_STANDARD_SENTINEL);

        let ann = ResolutionScope::annotator_result("kore50", "spotlight").unwrap();
        assert_eq!(ann.dataset(), "kore50");
        assert_eq!(ann.annotator_key(), "spotlight");
    }

    #[test]
    fn test_scope_rejects_sentinel_annotator() {
        let err = ResolutionScope::annotator_result("kore50", GOLD_STANDARD_SENTINEL);
        assert!(matches!(
            err,
            Err(ConfigError::ReservedAnnotatorName { .. })
        ));
    }

    #[test]
    fn test_definition_serde_round_trip() {
        let def = FilterDefinition::new(
            "places",
            "?v <rdf:type> <dbo:Place>",
            vec![],
            "http://example.org/sparql",
            0,
        );
        let json = serde_json::to_string(&def).unwrap();
        let back: FilterDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(def, back);
    }
}

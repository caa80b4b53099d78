//! Adapters between annotated documents and the flat URI sets the resolver
//! pipeline consumes.
//!
//! A wrapper flattens every filterable marking across all documents into one
//! entity set, resolves it through its decorator chain, and rebuilds the
//! document list keeping only markings whose URIs intersect the resolved
//! subset. Document ordering and per-document marking ordering are
//! preserved; only intra-document marking membership changes.

use crate::error::ResolutionError;
use crate::filter::definition::{FilterDefinition, ResolutionScope};
use crate::filter::document::{Document, Marking};
use crate::filter::resolver::EntityResolver;
use crate::filter::EntitySet;

/// Applies one configured filter to gold standards and annotator results.
pub trait FilterWrapper: Send + Sync {
    /// The definition of the filter this wrapper applies.
    fn definition(&self) -> &FilterDefinition;

    /// Filters the gold standard of a dataset.
    ///
    /// # Errors
    /// [`ResolutionError`] if the resolver chain fails.
    fn filter_gold_standard(
        &self,
        documents: &[Document],
        dataset: &str,
    ) -> Result<Vec<Document>, ResolutionError>;

    /// Filters one annotator's result on a dataset.
    ///
    /// # Errors
    /// [`ResolutionError`] if the resolver chain fails.
    fn filter_annotator_result(
        &self,
        documents: &[Document],
        dataset: &str,
        annotator: &str,
    ) -> Result<Vec<Document>, ResolutionError>;
}

/// The identity wrapper: returns its input untouched.
///
/// Always present in every holder so an unfiltered result exists for each
/// experiment; it bypasses whitelisting, chunking and caching entirely.
#[derive(Debug)]
pub struct IdentityWrapper {
    definition: FilterDefinition,
}

impl IdentityWrapper {
    /// Creates the identity wrapper.
    #[must_use]
    pub fn new() -> Self {
        Self {
            definition: FilterDefinition::identity(),
        }
    }
}

impl Default for IdentityWrapper {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterWrapper for IdentityWrapper {
    fn definition(&self) -> &FilterDefinition {
        &self.definition
    }

    fn filter_gold_standard(
        &self,
        documents: &[Document],
        _dataset: &str,
    ) -> Result<Vec<Document>, ResolutionError> {
        Ok(documents.to_vec())
    }

    fn filter_annotator_result(
        &self,
        documents: &[Document],
        _dataset: &str,
        _annotator: &str,
    ) -> Result<Vec<Document>, ResolutionError> {
        Ok(documents.to_vec())
    }
}

/// A wrapper around one configured resolver chain.
pub struct ResolvingWrapper {
    definition: FilterDefinition,
    chain: Box<dyn EntityResolver>,
}

impl ResolvingWrapper {
    /// Creates a wrapper for a definition and its assembled chain.
    #[must_use]
    pub fn new(definition: FilterDefinition, chain: Box<dyn EntityResolver>) -> Self {
        Self { definition, chain }
    }

    fn filter_scoped(
        &self,
        documents: &[Document],
        scope: &ResolutionScope,
    ) -> Result<Vec<Document>, ResolutionError> {
        let candidates = collect_entity_uris(documents);
        let resolved = self.chain.resolve(&candidates, &self.definition, scope)?;
        Ok(retain_resolved_markings(documents, &resolved))
    }
}

impl FilterWrapper for ResolvingWrapper {
    fn definition(&self) -> &FilterDefinition {
        &self.definition
    }

    fn filter_gold_standard(
        &self,
        documents: &[Document],
        dataset: &str,
    ) -> Result<Vec<Document>, ResolutionError> {
        self.filter_scoped(documents, &ResolutionScope::gold_standard(dataset))
    }

    fn filter_annotator_result(
        &self,
        documents: &[Document],
        dataset: &str,
        annotator: &str,
    ) -> Result<Vec<Document>, ResolutionError> {
        // The scope constructor rejects the gold standard sentinel, so a
        // misnamed annotator cannot collide with gold standard records
        // even when this is called outside the planning layer.
        let scope = ResolutionScope::annotator_result(dataset, annotator).map_err(|_| {
            ResolutionError::ReservedAnnotator {
                name: annotator.to_string(),
            }
        })?;
        self.filter_scoped(documents, &scope)
    }
}

/// Flattens all filterable marking URIs across documents into one set.
///
/// Duplicates collapse harmlessly; resolution is a set operation.
fn collect_entity_uris(documents: &[Document]) -> EntitySet {
    let mut uris = EntitySet::new();
    let mut unfilterable = 0usize;
    for document in documents {
        for marking in &document.markings {
            if marking.is_filterable() {
                uris.extend(marking.uris().iter().cloned());
            } else {
                unfilterable += 1;
            }
        }
    }
    if unfilterable > 0 {
        log::warn!("{unfilterable} markings carry no URIs and cannot be filtered");
    }
    uris
}

/// Rebuilds the document list, keeping only markings whose URI set
/// intersects the resolved set. Unfilterable markings are dropped.
fn retain_resolved_markings(documents: &[Document], resolved: &EntitySet) -> Vec<Document> {
    documents
        .iter()
        .map(|document| {
            let markings: Vec<Marking> = document
                .markings
                .iter()
                .filter(|marking| {
                    if !marking.is_filterable() {
                        log::warn!(
                            "dropping unfilterable marking in document {}",
                            document.uri
                        );
                        return false;
                    }
                    marking.uris().iter().any(|uri| resolved.contains(uri))
                })
                .cloned()
                .collect();
            Document::new(document.uri.clone(), markings)
        })
        .collect()
}

//! The document and marking model the filter layer operates on.
//!
//! This is a reduced form of the benchmark's annotation model: a document
//! carries an ordered list of markings, and a marking either links to
//! knowledge-base entities (a meaning), carries type URIs (a typed span),
//! or is a plain text span with no URIs at all. Plain spans cannot be
//! filtered and are dropped with a log message during filtering.

use serde::{Deserialize, Serialize};

/// One annotation inside a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Marking {
    /// A disambiguated annotation linking to one or more entity URIs.
    Meaning {
        /// Entity URIs this annotation links to.
        uris: Vec<String>,
    },
    /// A span annotated with entity type URIs.
    TypedSpan {
        /// Start offset in the document text.
        start: usize,
        /// Span length.
        length: usize,
        /// Type URIs assigned to the span.
        types: Vec<String>,
    },
    /// A plain span without any URIs; not filterable.
    Span {
        /// Start offset in the document text.
        start: usize,
        /// Span length.
        length: usize,
    },
}

impl Marking {
    /// The URIs this marking contributes to entity resolution: the linked
    /// entity URIs for a meaning, the type URIs for a typed span, nothing
    /// for a plain span.
    #[must_use]
    pub fn uris(&self) -> &[String] {
        match self {
            Self::Meaning { uris } => uris,
            Self::TypedSpan { types, .. } => types,
            Self::Span { .. } => &[],
        }
    }

    /// Returns true if this marking kind participates in filtering.
    #[must_use]
    pub const fn is_filterable(&self) -> bool {
        matches!(self, Self::Meaning { .. } | Self::TypedSpan { .. })
    }
}

/// A document with its annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Document URI.
    pub uri: String,
    /// Annotations in document order.
    pub markings: Vec<Marking>,
}

impl Document {
    /// Creates a document.
    #[must_use]
    pub fn new(uri: impl Into<String>, markings: Vec<Marking>) -> Self {
        Self {
            uri: uri.into(),
            markings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marking_uris() {
        let meaning = Marking::Meaning {
            uris: vec!["http://a.org/x".to_string()],
        };
        assert_eq!(meaning.uris(), ["http://a.org/x".to_string()]);
        assert!(meaning.is_filterable());

        let typed = Marking::TypedSpan {
            start: 0,
            length: 5,
            types: vec!["http://t.org/Person".to_string()],
        };
        assert_eq!(typed.uris(), ["http://t.org/Person".to_string()]);
        assert!(typed.is_filterable());

        let span = Marking::Span { start: 0, length: 5 };
        assert!(span.uris().is_empty());
        assert!(!span.is_filterable());
    }
}

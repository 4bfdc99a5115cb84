//! Search filters over chunk attributes.

use std::collections::BTreeMap;

use serde_json::Value;

use quiver_core::{Chunk, DocumentId};

/// A filter narrowing search results to admissible chunks.
///
/// Filters are applied to candidates before the final top-k selection, so
/// every returned hit is admissible.
///
/// # Example
///
/// ```ignore
/// use quiver::SearchFilter;
///
/// let filter = SearchFilter::new()
///     .in_document(doc_id)
///     .metadata_eq("lang", "en");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    /// Restrict hits to chunks of this document.
    pub document_id: Option<DocumentId>,
    /// Equality predicates over chunk metadata; all must match.
    pub metadata: BTreeMap<String, Value>,
}

impl SearchFilter {
    /// Create an empty (match-all) filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict hits to chunks belonging to `document_id`.
    #[must_use]
    pub fn in_document(mut self, document_id: DocumentId) -> Self {
        self.document_id = Some(document_id);
        self
    }

    /// Require `key` to equal `value` in chunk metadata.
    #[must_use]
    pub fn metadata_eq(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether this filter admits every chunk.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.document_id.is_none() && self.metadata.is_empty()
    }

    /// Whether `chunk` passes the filter.
    #[must_use]
    pub fn matches(&self, chunk: &Chunk) -> bool {
        if let Some(document_id) = self.document_id {
            if chunk.document_id != Some(document_id) {
                return false;
            }
        }
        self.metadata.iter().all(|(key, value)| chunk.metadata.get(key) == Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_core::{ChunkId, LibraryId, Metadata};

    fn chunk(document_id: Option<DocumentId>, metadata: Metadata) -> Chunk {
        Chunk::new(
            ChunkId::new(1),
            LibraryId::new(1),
            document_id,
            0,
            "text",
            vec![1.0, 0.0],
            metadata,
        )
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = SearchFilter::new();
        assert!(filter.is_empty());
        assert!(filter.matches(&chunk(None, Metadata::new())));
    }

    #[test]
    fn document_filter() {
        let doc = DocumentId::new(5);
        let filter = SearchFilter::new().in_document(doc);
        assert!(filter.matches(&chunk(Some(doc), Metadata::new())));
        assert!(!filter.matches(&chunk(Some(DocumentId::new(6)), Metadata::new())));
        assert!(!filter.matches(&chunk(None, Metadata::new())));
    }

    #[test]
    fn metadata_filter_requires_all_pairs() {
        let mut meta = Metadata::new();
        meta.insert("lang", "en");
        meta.insert("page", 3);

        let filter = SearchFilter::new().metadata_eq("lang", "en").metadata_eq("page", 3);
        assert!(filter.matches(&chunk(None, meta.clone())));

        let stricter = filter.metadata_eq("author", "ada");
        assert!(!stricter.matches(&chunk(None, meta)));
    }
}

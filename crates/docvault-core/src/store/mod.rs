//! Backend abstraction for docvault.
//!
//! The [`DocumentBackend`] trait is the capability set every storage
//! backend offers: store, search, list and clear. The storage orchestrator
//! holds a primary and a fallback backend behind this trait and tries them
//! in order, so callers never pick a backend themselves.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::StorageResult;
use crate::models::{DocumentSummary, NewDocument, SearchResult, StoredDocumentRecord};

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`store`](DocumentBackend::store) | Persist a cleaned document |
/// | [`search`](DocumentBackend::search) | Ranked search, highest score first |
/// | [`list`](DocumentBackend::list) | Summaries of stored documents |
/// | [`clear`](DocumentBackend::clear) | Remove stored documents |
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &str;

    /// Persist a document. Returns the number of records written.
    async fn store(&self, doc: &NewDocument) -> StorageResult<usize>;

    /// Return up to `top_k` results sorted by score, descending.
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        user_id: Option<&str>,
    ) -> StorageResult<Vec<SearchResult>>;

    /// Summaries of stored documents, optionally filtered by user.
    async fn list(&self, user_id: Option<&str>) -> StorageResult<Vec<DocumentSummary>>;

    /// Remove stored documents. Returns the number of records removed when
    /// the backend can tell.
    async fn clear(&self, user_id: Option<&str>) -> StorageResult<usize>;
}

/// Collapse per-chunk records into one summary per `file_name`.
///
/// The first record seen for a name wins; later ones are dropped.
pub fn summarize_by_file_name<'a, I>(records: I) -> Vec<DocumentSummary>
where
    I: IntoIterator<Item = &'a StoredDocumentRecord>,
{
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.file_name.clone()))
        .map(DocumentSummary::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(file: &str, idx: usize) -> StoredDocumentRecord {
        StoredDocumentRecord {
            id: format!("{}_1_chunk_{}", file, idx),
            file_name: file.to_string(),
            file_type: "text/plain".to_string(),
            content: String::new(),
            timestamp: "2024-01-01T00:00:00.000Z".to_string(),
            user_id: "u".to_string(),
            chunk_index: idx,
            total_chunks: 2,
            chunk_length: 0,
        }
    }

    #[test]
    fn test_summarize_keeps_first_per_name() {
        let records = vec![record("a", 1), record("b", 0), record("a", 0), record("b", 1)];
        let summaries = summarize_by_file_name(&records);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].file_name, "a");
        assert_eq!(summaries[1].file_name, "b");
        assert_eq!(summaries[0].total_chunks, 2);
    }
}

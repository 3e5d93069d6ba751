//! In-memory vector [`DocumentBackend`] for tests and embedded use.
//!
//! Stores per-chunk records exactly like the remote index does and answers
//! queries with brute-force cosine similarity over every stored vector.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;

use crate::embedding::{cosine_similarity, EmbeddingProvider, HashEmbedder};
use crate::error::{StorageError, StorageResult};
use crate::models::{
    sort_by_score_desc, DocumentSummary, NewDocument, ResultMetadata, SearchResult, VectorRecord,
};
use crate::records::{prepare_records, RecordLimits};

use super::{summarize_by_file_name, DocumentBackend};

/// In-memory vector backend.
pub struct InMemoryBackend {
    records: RwLock<Vec<VectorRecord>>,
    limits: RecordLimits,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::with_limits(RecordLimits::default())
    }

    pub fn with_limits(limits: RecordLimits) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            limits,
            embedder: Arc::new(HashEmbedder),
        }
    }

    /// Number of stored chunk records.
    pub fn len(&self) -> usize {
        self.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, Vec<VectorRecord>>> {
        self.records
            .read()
            .map_err(|_| StorageError::Remote(anyhow!("in-memory backend lock poisoned")))
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, Vec<VectorRecord>>> {
        self.records
            .write()
            .map_err(|_| StorageError::Remote(anyhow!("in-memory backend lock poisoned")))
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_user(record: &VectorRecord, user_id: Option<&str>) -> bool {
    user_id.map_or(true, |u| record.metadata.user_id == u)
}

#[async_trait]
impl DocumentBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn store(&self, doc: &NewDocument) -> StorageResult<usize> {
        let prepared = prepare_records(doc, self.limits, self.embedder.as_ref(), Utc::now());
        let count = prepared.len();
        let mut records = self.write()?;
        for record in prepared {
            records.retain(|r| r.id() != record.id());
            records.push(record);
        }
        Ok(count)
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        user_id: Option<&str>,
    ) -> StorageResult<Vec<SearchResult>> {
        let query_vec = self.embedder.embed(query);
        let records = self.read()?;
        let mut results: Vec<SearchResult> = records
            .iter()
            .filter(|r| matches_user(r, user_id))
            .map(|r| SearchResult {
                score: (cosine_similarity(&query_vec, &r.values) as f64).clamp(0.0, 1.0),
                metadata: ResultMetadata::from(&r.metadata),
            })
            .collect();
        sort_by_score_desc(&mut results);
        results.truncate(top_k);
        Ok(results)
    }

    async fn list(&self, user_id: Option<&str>) -> StorageResult<Vec<DocumentSummary>> {
        let records = self.read()?;
        Ok(summarize_by_file_name(
            records
                .iter()
                .filter(|r| matches_user(r, user_id))
                .map(|r| &r.metadata),
        ))
    }

    async fn clear(&self, user_id: Option<&str>) -> StorageResult<usize> {
        let mut records = self.write()?;
        let before = records.len();
        records.retain(|r| !matches_user(r, user_id));
        Ok(before - records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(name: &str, user: &str, content: &str) -> NewDocument {
        NewDocument {
            file_name: name.to_string(),
            file_type: "text/plain".to_string(),
            content: content.to_string(),
            user_id: user.to_string(),
        }
    }

    #[tokio::test]
    async fn test_store_and_search_ranks_relevant_first() {
        let backend = InMemoryBackend::new();
        backend
            .store(&doc(
                "k8s.md",
                "u1",
                "Kubernetes cluster deployment with helm charts.",
            ))
            .await
            .unwrap();
        backend
            .store(&doc(
                "bread.md",
                "u1",
                "Sourdough bread needs patience and flour.",
            ))
            .await
            .unwrap();

        let results = backend
            .search("helm charts simplify kubernetes deployment", 5, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].metadata.file_name, "k8s.md");
        assert!(results[0].score >= results[1].score);
        assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.score)));
    }

    #[tokio::test]
    async fn test_user_filter_and_clear() {
        let backend = InMemoryBackend::new();
        backend
            .store(&doc("a.txt", "alice", "Alice wrote this sentence."))
            .await
            .unwrap();
        backend
            .store(&doc("b.txt", "bob", "Bob wrote this other sentence."))
            .await
            .unwrap();

        let alice = backend.list(Some("alice")).await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].file_name, "a.txt");

        let removed = backend.clear(Some("alice")).await.unwrap();
        assert_eq!(removed, 1);
        assert!(backend.list(Some("alice")).await.unwrap().is_empty());
        assert_eq!(backend.list(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_groups_chunks_by_file_name() {
        let backend = InMemoryBackend::with_limits(RecordLimits {
            max_chunk_chars: 20,
            metadata_content_limit: 1000,
        });
        let written = backend
            .store(&doc(
                "long.txt",
                "u",
                "One sentence here. Another sentence here. A third one.",
            ))
            .await
            .unwrap();
        assert_eq!(written, 3);
        assert_eq!(backend.len(), 3);

        let listed = backend.list(Some("u")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].total_chunks, 3);
    }
}

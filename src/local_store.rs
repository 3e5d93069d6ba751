//! SQLite-backed local fallback store.
//!
//! Holds one unordered collection of whole-document records, serialized as
//! a JSON array under a single storage key. Every mutation reads, modifies
//! and writes the whole collection inside one transaction; this path only
//! carries traffic while the remote index is unavailable.
//!
//! Search is naive keyword matching: a record matches when any lowercase
//! query token is a substring of its file name or content, and records are
//! ranked by how many distinct tokens they contain.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use docvault_core::error::{StorageError, StorageResult};
use docvault_core::models::{
    non_empty, DocumentSummary, NewDocument, ResultMetadata, SearchResult,
};
use docvault_core::store::DocumentBackend;

use crate::{db, migrate};

/// One whole document as persisted by the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRecord {
    pub id: String,
    pub file_name: String,
    pub file_type: String,
    pub content: String,
    pub timestamp: String,
    #[serde(default)]
    pub user_id: String,
}

impl LocalRecord {
    fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            file_name: self.file_name.clone(),
            file_type: self.file_type.clone(),
            timestamp: self.timestamp.clone(),
            user_id: non_empty(&self.user_id),
            total_chunks: 1,
        }
    }

    fn metadata(&self) -> ResultMetadata {
        ResultMetadata {
            file_name: self.file_name.clone(),
            file_type: self.file_type.clone(),
            content: self.content.clone(),
            timestamp: self.timestamp.clone(),
            user_id: non_empty(&self.user_id),
        }
    }
}

/// Score assigned to the result at `rank`: 0.9, 0.8, … floored at 0.1.
pub fn synthesized_score(rank: usize) -> f64 {
    (0.9 - 0.1 * rank as f64).max(0.1)
}

pub struct LocalStore {
    pool: SqlitePool,
    storage_key: String,
    /// Held across every read-modify-write; SQLite cannot upgrade two
    /// overlapping deferred transactions to writers.
    write_lock: Mutex<()>,
}

impl LocalStore {
    pub fn new(pool: SqlitePool, storage_key: impl Into<String>) -> Self {
        Self {
            pool,
            storage_key: storage_key.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Open (creating if needed) the database at `path` and run migrations.
    pub async fn open(path: &Path, storage_key: impl Into<String>) -> anyhow::Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool, storage_key))
    }

    /// Append one record for the whole document.
    pub async fn store(
        &self,
        file_name: &str,
        file_type: &str,
        content: &str,
        user_id: &str,
    ) -> StorageResult<LocalRecord> {
        self.store_at(file_name, file_type, content, user_id, Utc::now())
            .await
    }

    async fn store_at(
        &self,
        file_name: &str,
        file_type: &str,
        content: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<LocalRecord> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(StorageError::local)?;
        let mut records = self.load(&mut tx).await?;

        let base_id = format!("{}_{}", file_name, now.timestamp_millis());
        let mut id = base_id.clone();
        let mut suffix = 1;
        while records.iter().any(|r| r.id == id) {
            id = format!("{}-{}", base_id, suffix);
            suffix += 1;
        }

        let record = LocalRecord {
            id,
            file_name: file_name.to_string(),
            file_type: file_type.to_string(),
            content: content.to_string(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            user_id: user_id.to_string(),
        };
        records.push(record.clone());

        self.save(&mut tx, &records).await?;
        tx.commit().await.map_err(StorageError::local)?;

        debug!(id = %record.id, total = records.len(), "stored local record");
        Ok(record)
    }

    /// Keyword search over stored records.
    ///
    /// Ties keep insertion order. Scores are synthesized from rank so the
    /// result shape matches the remote path.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        user_id: Option<&str>,
    ) -> StorageResult<Vec<SearchResult>> {
        let query_lower = query.to_lowercase();
        let mut terms: Vec<&str> = Vec::new();
        for term in query_lower.split_whitespace() {
            if !terms.contains(&term) {
                terms.push(term);
            }
        }
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let records = self.records(user_id).await?;
        let mut matched: Vec<(usize, &LocalRecord)> = records
            .iter()
            .filter_map(|r| {
                let haystack = format!("{} {}", r.file_name, r.content).to_lowercase();
                let hits = terms.iter().filter(|t| haystack.contains(*t)).count();
                (hits > 0).then_some((hits, r))
            })
            .collect();

        // `sort_by` is stable, so equal hit counts stay in insertion order.
        matched.sort_by(|a, b| b.0.cmp(&a.0));
        matched.truncate(top_k);

        Ok(matched
            .into_iter()
            .enumerate()
            .map(|(rank, (_, r))| SearchResult {
                score: synthesized_score(rank),
                metadata: r.metadata(),
            })
            .collect())
    }

    /// Raw records, optionally filtered by user, in insertion order.
    pub async fn records(&self, user_id: Option<&str>) -> StorageResult<Vec<LocalRecord>> {
        let mut tx = self.pool.begin().await.map_err(StorageError::local)?;
        let records = self.load(&mut tx).await?;
        tx.commit().await.map_err(StorageError::local)?;

        Ok(match user_id {
            Some(u) => records.into_iter().filter(|r| r.user_id == u).collect(),
            None => records,
        })
    }

    /// Remove the whole collection, whoever owns its records.
    pub async fn clear(&self) -> StorageResult<usize> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(StorageError::local)?;
        let removed = self.load(&mut tx).await?.len();
        sqlx::query("DELETE FROM collections WHERE storage_key = ?")
            .bind(&self.storage_key)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::local)?;
        tx.commit().await.map_err(StorageError::local)?;
        Ok(removed)
    }

    /// Read the collection. Corrupt state is logged and read as empty.
    async fn load(&self, tx: &mut Transaction<'_, Sqlite>) -> StorageResult<Vec<LocalRecord>> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT value FROM collections WHERE storage_key = ?")
                .bind(&self.storage_key)
                .fetch_optional(&mut **tx)
                .await
                .map_err(StorageError::local)?;

        let Some(raw) = raw else {
            return Ok(Vec::new());
        };

        match serde_json::from_str::<Vec<LocalRecord>>(&raw) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!(
                    storage_key = %self.storage_key,
                    error = %e,
                    "local collection is corrupt; treating it as empty"
                );
                Ok(Vec::new())
            }
        }
    }

    async fn save(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        records: &[LocalRecord],
    ) -> StorageResult<()> {
        let value = serde_json::to_string(records)
            .map_err(|e| StorageError::local(anyhow!("failed to serialize collection: {}", e)))?;
        sqlx::query(
            r#"
            INSERT INTO collections (storage_key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(storage_key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&self.storage_key)
        .bind(&value)
        .bind(Utc::now().timestamp())
        .execute(&mut **tx)
        .await
        .map_err(StorageError::local)?;
        Ok(())
    }
}

#[async_trait]
impl DocumentBackend for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn store(&self, doc: &NewDocument) -> StorageResult<usize> {
        LocalStore::store(self, &doc.file_name, &doc.file_type, &doc.content, &doc.user_id)
            .await?;
        Ok(1)
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        user_id: Option<&str>,
    ) -> StorageResult<Vec<SearchResult>> {
        LocalStore::search(self, query, top_k, user_id).await
    }

    async fn list(&self, user_id: Option<&str>) -> StorageResult<Vec<DocumentSummary>> {
        Ok(self
            .records(user_id)
            .await?
            .iter()
            .map(LocalRecord::summary)
            .collect())
    }

    async fn clear(&self, _user_id: Option<&str>) -> StorageResult<usize> {
        LocalStore::clear(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    async fn open_store(tmp: &TempDir) -> LocalStore {
        LocalStore::open(&tmp.path().join("local.sqlite"), "uploaded_documents")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_store_and_list() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        let record = store
            .store("notes.txt", "text/plain", "Some notes about Rust.", "u1")
            .await
            .unwrap();
        assert!(record.id.starts_with("notes.txt_"));

        let listed = DocumentBackend::list(&store, Some("u1")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].file_name, "notes.txt");
        assert_eq!(listed[0].total_chunks, 1);
        assert!(DocumentBackend::list(&store, Some("u2"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_search_ranks_by_distinct_token_hits() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        store
            .store("b.txt", "text/plain", "Only mentions rust here.", "u")
            .await
            .unwrap();
        store
            .store(
                "a.txt",
                "text/plain",
                "Rust ownership rules make borrowing safe.",
                "u",
            )
            .await
            .unwrap();
        store
            .store("c.txt", "text/plain", "Nothing relevant at all.", "u")
            .await
            .unwrap();

        let results = store.search("Rust ownership borrowing", 10, None).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].metadata.file_name, "a.txt");
        assert_eq!(results[1].metadata.file_name, "b.txt");
        assert!((results[0].score - 0.9).abs() < 1e-9);
        assert!((results[1].score - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_search_matches_file_name_and_keeps_insertion_order_on_ties() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        store
            .store("budget.xlsx", "sheet", "Quarterly figures.", "u")
            .await
            .unwrap();
        store
            .store("plan.txt", "text/plain", "The budget is tight.", "u")
            .await
            .unwrap();

        let results = store.search("BUDGET", 10, None).await.unwrap();
        let names: Vec<_> = results.iter().map(|r| r.metadata.file_name.as_str()).collect();
        assert_eq!(names, vec!["budget.xlsx", "plan.txt"]);
    }

    #[tokio::test]
    async fn test_search_truncates_and_floors_scores() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        for i in 0..12 {
            store
                .store(&format!("f{}.txt", i), "text/plain", "shared keyword", "u")
                .await
                .unwrap();
        }

        let results = store.search("keyword", 11, None).await.unwrap();
        assert_eq!(results.len(), 11);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert!((results[10].score - 0.1).abs() < 1e-9);
        assert!(store.search("   ", 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_same_millisecond_ids_stay_unique() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

        let a = store
            .store_at("x.txt", "text/plain", "first", "u", now)
            .await
            .unwrap();
        let b = store
            .store_at("x.txt", "text/plain", "second", "u", now)
            .await
            .unwrap();
        assert_eq!(a.id, format!("x.txt_{}", now.timestamp_millis()));
        assert_eq!(b.id, format!("x.txt_{}-1", now.timestamp_millis()));
    }

    #[tokio::test]
    async fn test_corrupt_collection_reads_as_empty() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        sqlx::query("INSERT INTO collections (storage_key, value, updated_at) VALUES (?, ?, 0)")
            .bind("uploaded_documents")
            .bind("{not json")
            .execute(&store.pool)
            .await
            .unwrap();

        assert!(store.records(None).await.unwrap().is_empty());

        // Writing over corrupt state replaces it.
        store
            .store("ok.txt", "text/plain", "recovered content", "u")
            .await
            .unwrap();
        assert_eq!(store.records(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_is_unconditional() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        store.store("a.txt", "t", "alpha", "alice").await.unwrap();
        store.store("b.txt", "t", "beta", "bob").await.unwrap();

        let removed = DocumentBackend::clear(&store, Some("alice")).await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.records(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_collections_are_isolated_by_storage_key() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("shared.sqlite");
        let first = LocalStore::open(&path, "first").await.unwrap();
        let second = LocalStore::open(&path, "second").await.unwrap();

        first.store("a.txt", "t", "alpha", "u").await.unwrap();
        assert_eq!(first.records(None).await.unwrap().len(), 1);
        assert!(second.records(None).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_stores_all_succeed() {
        let tmp = TempDir::new().unwrap();
        let store = std::sync::Arc::new(open_store(&tmp).await);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .store(&format!("doc{}.txt", i), "text/plain", "parallel upload", "u")
                        .await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.records(None).await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_empty_user_is_omitted_from_results() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        store
            .store("anon.txt", "text/plain", "anonymous upload", "")
            .await
            .unwrap();

        let results = store.search("anonymous", 5, None).await.unwrap();
        assert_eq!(results[0].metadata.user_id, None);
        let json = serde_json::to_value(&results[0].metadata).unwrap();
        assert!(json.get("userId").is_none());

        let listed = DocumentBackend::list(&store, None).await.unwrap();
        assert_eq!(listed[0].user_id, None);
    }
}

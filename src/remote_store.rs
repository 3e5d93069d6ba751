//! [`DocumentBackend`] on top of the remote vector index.
//!
//! Store chunks, embeds and upserts; search embeds the query and asks the
//! index for its nearest neighbours; list and clear go through a broad probe
//! query because the index offers no native enumeration.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use docvault_core::embedding::{EmbeddingProvider, HashEmbedder};
use docvault_core::error::StorageResult;
use docvault_core::models::{
    sort_by_score_desc, DocumentSummary, NewDocument, ResultMetadata, SearchResult,
};
use docvault_core::records::{prepare_records, RecordLimits};
use docvault_core::store::{summarize_by_file_name, DocumentBackend};

use crate::index_client::RemoteIndexClient;

pub struct RemoteBackend {
    client: Arc<RemoteIndexClient>,
    limits: RecordLimits,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl RemoteBackend {
    pub fn new(client: Arc<RemoteIndexClient>, limits: RecordLimits) -> Self {
        Self {
            client,
            limits,
            embedder: Arc::new(HashEmbedder),
        }
    }
}

#[async_trait]
impl DocumentBackend for RemoteBackend {
    fn name(&self) -> &str {
        "remote"
    }

    async fn store(&self, doc: &NewDocument) -> StorageResult<usize> {
        let records = prepare_records(doc, self.limits, self.embedder.as_ref(), Utc::now());
        if records.is_empty() {
            debug!(file_name = %doc.file_name, "no chunks to upsert");
            return Ok(0);
        }
        let report = self.client.upsert(&records).await?;
        info!(
            file_name = %doc.file_name,
            chunks = records.len(),
            upserted = report.succeeded_items,
            "stored document in remote index"
        );
        Ok(report.succeeded_items)
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        user_id: Option<&str>,
    ) -> StorageResult<Vec<SearchResult>> {
        let vector = self.embedder.embed(query);
        let matches = self.client.query(&vector, top_k, user_id).await?;

        let mut results: Vec<SearchResult> = matches
            .into_iter()
            .map(|m| SearchResult {
                score: m.score.clamp(0.0, 1.0),
                metadata: ResultMetadata::from(&m.metadata.unwrap_or_default()),
            })
            .collect();
        sort_by_score_desc(&mut results);
        results.truncate(top_k);
        Ok(results)
    }

    async fn list(&self, user_id: Option<&str>) -> StorageResult<Vec<DocumentSummary>> {
        let matches = self.client.list_matches(user_id).await?;
        Ok(summarize_by_file_name(
            matches.iter().filter_map(|m| m.metadata.as_ref()),
        ))
    }

    /// With a user, deletes that user's records by id; without one, empties
    /// the whole index and reports zero since the count is unknown.
    async fn clear(&self, user_id: Option<&str>) -> StorageResult<usize> {
        match user_id {
            Some(user) => {
                let ids = self.client.matching_ids(Some(user)).await?;
                let report = self.client.delete_many(&ids).await?;
                info!(user_id = user, deleted = report.succeeded_items, "cleared remote records");
                Ok(report.succeeded_items)
            }
            None => {
                self.client.delete_all().await?;
                info!("cleared every remote record");
                Ok(0)
            }
        }
    }
}

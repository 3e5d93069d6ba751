//! Storage orchestrator.
//!
//! [`DocumentStorage`] is the only entry point the CLI and the HTTP API
//! use. It holds an optional primary backend (normally the remote vector
//! index) and the local fallback store. Each store, search and list call
//! commits to exactly one backend: the primary if it answers, otherwise the
//! fallback. Results from the two are never merged.
//!
//! Configuration errors from the primary are returned as-is and never turn
//! into a fallback attempt. A missing credential is an operator mistake,
//! not an outage.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Serialize;
use tracing::{info, warn};

use docvault_core::clean::clean_content;
use docvault_core::error::{StorageError, StorageResult};
use docvault_core::models::{sort_by_score_desc, Backend, DocumentSummary, NewDocument, SearchResult};
use docvault_core::records::RecordLimits;
use docvault_core::store::DocumentBackend;

use crate::config::Config;
use crate::index_client::RemoteIndexClient;
use crate::local_store::LocalStore;
use crate::remote_store::RemoteBackend;

/// Orchestrator tuning.
#[derive(Debug, Clone, Copy)]
pub struct StorageSettings {
    /// Cleaned content at or below this many characters is skipped.
    pub min_content_chars: usize,
    /// Deadline for one primary call; expiry counts as a remote failure.
    pub operation_timeout: Option<Duration>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            min_content_chars: 50,
            operation_timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StoreOutcome {
    Stored { backend: Backend, records: usize },
    Skipped { cleaned_chars: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub backend: Backend,
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentListing {
    pub backend: Backend,
    pub documents: Vec<DocumentSummary>,
}

/// Which sides a clear reached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClearReport {
    pub local_cleared: bool,
    pub local_removed: usize,
    pub remote_cleared: bool,
    pub remote_removed: usize,
}

pub struct DocumentStorage {
    primary: Option<Arc<dyn DocumentBackend>>,
    fallback: Arc<dyn DocumentBackend>,
    settings: StorageSettings,
}

impl DocumentStorage {
    pub fn new(
        primary: Option<Arc<dyn DocumentBackend>>,
        fallback: Arc<dyn DocumentBackend>,
        settings: StorageSettings,
    ) -> Self {
        Self {
            primary,
            fallback,
            settings,
        }
    }

    /// Open the local store and, when `[remote]` is configured, wire up the
    /// remote index as primary. The remote is not contacted here.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let local = LocalStore::open(&config.local.path, config.local.storage_key.clone()).await?;
        let limits: RecordLimits = config.chunking.record_limits();

        let primary: Option<Arc<dyn DocumentBackend>> = config.remote.as_ref().map(|remote| {
            let client = Arc::new(RemoteIndexClient::from_config(remote));
            Arc::new(RemoteBackend::new(client, limits)) as Arc<dyn DocumentBackend>
        });
        if primary.is_none() {
            info!("no [remote] section configured; running local-only");
        }

        Ok(Self::new(
            primary,
            Arc::new(local),
            StorageSettings {
                min_content_chars: config.chunking.min_content_chars,
                operation_timeout: config.retrieval.operation_timeout(),
            },
        ))
    }

    pub fn has_remote(&self) -> bool {
        self.primary.is_some()
    }

    /// Clean and store a document in exactly one backend.
    pub async fn store_document(
        &self,
        file_name: &str,
        file_type: &str,
        content: &str,
        user_id: &str,
    ) -> StorageResult<StoreOutcome> {
        let cleaned = clean_content(content);
        let cleaned_chars = cleaned.chars().count();
        if cleaned_chars <= self.settings.min_content_chars {
            warn!(
                file_name,
                cleaned_chars,
                min = self.settings.min_content_chars,
                "content too short after cleaning; not stored"
            );
            return Ok(StoreOutcome::Skipped { cleaned_chars });
        }

        let doc = NewDocument {
            file_name: file_name.to_string(),
            file_type: file_type.to_string(),
            content: cleaned,
            user_id: user_id.to_string(),
        };
        let (backend, records) = self
            .with_fallback("store", |b| {
                let doc = &doc;
                async move { b.store(doc).await }
            })
            .await?;
        info!(file_name, %backend, records, "document stored");
        Ok(StoreOutcome::Stored { backend, records })
    }

    pub async fn search_documents(
        &self,
        query: &str,
        top_k: usize,
        user_id: Option<&str>,
    ) -> StorageResult<SearchResponse> {
        let (backend, mut results) = self
            .with_fallback("search", |b| async move { b.search(query, top_k, user_id).await })
            .await?;
        sort_by_score_desc(&mut results);
        results.truncate(top_k);
        info!(%backend, hits = results.len(), "search served");
        Ok(SearchResponse { backend, results })
    }

    pub async fn list_user_documents(&self, user_id: Option<&str>) -> StorageResult<DocumentListing> {
        let (backend, documents) = self
            .with_fallback("list", |b| async move { b.list(user_id).await })
            .await?;
        Ok(DocumentListing { backend, documents })
    }

    /// Clear the local store unconditionally, then the remote index.
    /// Fails only when neither side could be cleared. A remote configuration
    /// error is returned as-is in that case.
    pub async fn clear_user_documents(&self, user_id: Option<&str>) -> StorageResult<ClearReport> {
        let mut report = ClearReport::default();

        let local_err = match self.fallback.clear(user_id).await {
            Ok(removed) => {
                report.local_cleared = true;
                report.local_removed = removed;
                None
            }
            Err(e) => {
                warn!(error = %e, "failed to clear local store");
                Some(e)
            }
        };

        let Some(primary) = &self.primary else {
            return match local_err {
                Some(e) => Err(e),
                None => Ok(report),
            };
        };

        let remote_err = match self.call_primary(primary.as_ref(), |b| b.clear(user_id)).await {
            Ok(removed) => {
                report.remote_cleared = true;
                report.remote_removed = removed;
                None
            }
            Err(e) if e.is_configuration() && local_err.is_some() => return Err(e),
            Err(e) => {
                warn!(error = %e, "failed to clear remote index");
                Some(e)
            }
        };

        match (local_err, remote_err) {
            (Some(local), Some(remote)) => Err(StorageError::BothBackendsFailed {
                operation: "clear",
                primary: Box::new(remote),
                fallback: Box::new(local),
            }),
            _ => {
                info!(?user_id, ?report, "documents cleared");
                Ok(report)
            }
        }
    }

    /// Run `op` against the primary, falling back to the local store on any
    /// non-configuration failure.
    async fn with_fallback<'a, T, F, Fut>(
        &'a self,
        operation: &'static str,
        op: F,
    ) -> StorageResult<(Backend, T)>
    where
        F: Fn(&'a dyn DocumentBackend) -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let Some(primary) = &self.primary else {
            return Ok((Backend::Local, op(self.fallback.as_ref()).await?));
        };

        let primary_err = match self.call_primary(primary.as_ref(), &op).await {
            Ok(value) => return Ok((Backend::Remote, value)),
            Err(e) if e.is_configuration() => return Err(e),
            Err(e) => e,
        };

        warn!(
            operation,
            primary = primary.name(),
            fallback = self.fallback.name(),
            error = %primary_err,
            "primary backend failed; using fallback"
        );

        match op(self.fallback.as_ref()).await {
            Ok(value) => Ok((Backend::Local, value)),
            Err(fallback_err) => Err(StorageError::BothBackendsFailed {
                operation,
                primary: Box::new(primary_err),
                fallback: Box::new(fallback_err),
            }),
        }
    }

    async fn call_primary<'a, T, F, Fut>(
        &self,
        primary: &'a dyn DocumentBackend,
        op: F,
    ) -> StorageResult<T>
    where
        F: FnOnce(&'a dyn DocumentBackend) -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        match self.settings.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, op(primary))
                .await
                .unwrap_or_else(|_| {
                    Err(StorageError::remote(anyhow!(
                        "{} did not answer within {:?}",
                        primary.name(),
                        limit
                    )))
                }),
            None => op(primary).await,
        }
    }
}

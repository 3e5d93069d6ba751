//! Client for a single named index on a hosted vector-similarity service.
//!
//! Speaks the Pinecone-style REST API: a control plane (`controller_url`)
//! that lists and creates indexes, and a per-index data plane (`host`) that
//! upserts, queries and deletes vectors.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized ──connect()──▶ Connecting ──▶ Ready ──▶ Ready (reused)
//!                                  │
//!                                  └── error ──▶ Uninitialized
//! ```
//!
//! The ready handle is created on first use and memoized behind a mutex, so
//! concurrent first calls connect exactly once. Connecting:
//!
//! 1. Fails fast with [`StorageError::Configuration`] if no API key is set.
//! 2. Lists indexes and looks for the configured name.
//! 3. If absent, creates it (dimension 384, cosine metric) and polls
//!    `describe_index_stats` until it answers or the poll budget runs out.
//!    Running out only logs a warning; the first real operation will then
//!    fail and the caller can fall back.
//!
//! # Batching
//!
//! Upserts and deletes are sent in batches governed by a [`BatchPolicy`]
//! (batch size plus an inter-batch delay for rate limiting). A failed batch
//! is logged and skipped; the call only fails when no batch succeeds.

use anyhow::{anyhow, bail, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use docvault_core::embedding::probe_vector;
use docvault_core::error::{StorageError, StorageResult};
use docvault_core::models::{StoredDocumentRecord, VectorRecord};

use crate::config::{RemoteConfig, MAX_QUERY_TOP_K};

const API_VERSION: &str = "2024-07";

/// Batch size and inter-batch delay for a batched remote operation.
#[derive(Debug, Clone, Copy)]
pub struct BatchPolicy {
    pub batch_size: usize,
    pub delay: Duration,
}

impl BatchPolicy {
    pub fn new(batch_size: usize, delay: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            delay,
        }
    }

    /// A policy with no inter-batch delay.
    pub fn immediate(batch_size: usize) -> Self {
        Self::new(batch_size, Duration::ZERO)
    }
}

/// How long to wait for a freshly created index to become queryable.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

/// Everything the client needs to know about its index.
#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub index_name: String,
    pub controller_url: String,
    pub dimension: usize,
    pub metric: String,
    pub cloud: String,
    pub region: String,
    pub timeout: Duration,
    pub ready_poll: PollPolicy,
    pub upsert: BatchPolicy,
    pub delete: BatchPolicy,
    pub list_top_k: usize,
}

impl IndexSettings {
    pub fn from_config(config: &RemoteConfig) -> Self {
        Self {
            index_name: config.index_name.clone(),
            controller_url: config.controller_url.trim_end_matches('/').to_string(),
            dimension: config.dimension,
            metric: config.metric.clone(),
            cloud: config.cloud.clone(),
            region: config.region.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            ready_poll: PollPolicy {
                attempts: config.ready_poll_attempts,
                interval: Duration::from_millis(config.ready_poll_interval_ms),
            },
            upsert: BatchPolicy::new(
                config.upsert_batch_size,
                Duration::from_millis(config.upsert_batch_delay_ms),
            ),
            delete: BatchPolicy::new(
                config.delete_batch_size,
                Duration::from_millis(config.delete_batch_delay_ms),
            ),
            list_top_k: config.list_top_k.min(MAX_QUERY_TOP_K),
        }
    }
}

/// Outcome of a batched operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Number of batches attempted.
    pub batches: usize,
    /// Items carried by batches that succeeded.
    pub succeeded_items: usize,
    /// Zero-based indices of batches that failed.
    pub failed_batches: Vec<usize>,
}

impl BatchReport {
    pub fn all_failed(&self) -> bool {
        self.batches > 0 && self.failed_batches.len() == self.batches
    }
}

/// Send `items` in batches, continuing past failed batches.
///
/// Sleeps `policy.delay` between consecutive batches. Never fails itself;
/// per-batch errors are logged and recorded in the returned report.
pub async fn run_batches<'a, T, F, Fut>(
    operation: &str,
    items: &'a [T],
    policy: BatchPolicy,
    mut send: F,
) -> BatchReport
where
    F: FnMut(&'a [T]) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let batch_size = policy.batch_size.max(1);
    let total = items.len().div_ceil(batch_size);
    let mut report = BatchReport::default();

    for (i, batch) in items.chunks(batch_size).enumerate() {
        if i > 0 && !policy.delay.is_zero() {
            tokio::time::sleep(policy.delay).await;
        }
        report.batches += 1;
        match send(batch).await {
            Ok(()) => {
                report.succeeded_items += batch.len();
                debug!(operation, batch = i + 1, total, size = batch.len(), "batch sent");
            }
            Err(e) => {
                warn!(
                    operation,
                    batch = i + 1,
                    total,
                    error = %format!("{:#}", e),
                    "batch failed; continuing with remaining batches"
                );
                report.failed_batches.push(i);
            }
        }
    }

    report
}

/// A single query hit as returned by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub metadata: Option<StoredDocumentRecord>,
}

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexDescription>,
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    name: String,
    #[serde(default)]
    host: Option<String>,
}

#[derive(Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'a str,
    spec: serde_json::Value,
}

#[derive(Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a StoredDocumentRecord,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Clone)]
struct IndexHandle {
    http: reqwest::Client,
    host: String,
}

/// Client for one named remote vector index.
pub struct RemoteIndexClient {
    settings: IndexSettings,
    api_key: Option<String>,
    handle: Mutex<Option<IndexHandle>>,
}

impl RemoteIndexClient {
    pub fn new(settings: IndexSettings, api_key: Option<String>) -> Self {
        Self {
            settings,
            api_key,
            handle: Mutex::new(None),
        }
    }

    /// Build a client whose API key comes from the environment variable
    /// named by `remote.api_key_env`. A missing variable is reported on
    /// first use, not here.
    pub fn from_config(config: &RemoteConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env).ok();
        Self::new(IndexSettings::from_config(config), api_key)
    }

    /// Whether a ready handle is memoized.
    pub async fn is_ready(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    /// Upsert records in batches. Fails only if every batch fails.
    pub async fn upsert(&self, records: &[VectorRecord]) -> StorageResult<BatchReport> {
        if records.is_empty() {
            return Ok(BatchReport::default());
        }
        let handle = self.connect().await?;
        let url = format!("{}/vectors/upsert", handle.host);

        let report = run_batches("upsert", records, self.settings.upsert, |batch| {
            let body = UpsertRequest {
                vectors: batch
                    .iter()
                    .map(|r| UpsertVector {
                        id: r.id(),
                        values: &r.values,
                        metadata: &r.metadata,
                    })
                    .collect(),
            };
            let http = &handle.http;
            let url = &url;
            async move {
                post_json::<serde_json::Value, _>(http, url, &body).await?;
                Ok(())
            }
        })
        .await;

        if report.all_failed() {
            return Err(StorageError::remote(anyhow!(
                "all {} upsert batches to index '{}' failed",
                report.batches,
                self.settings.index_name
            )));
        }
        info!(
            index = %self.settings.index_name,
            upserted = report.succeeded_items,
            failed_batches = report.failed_batches.len(),
            "upserted vectors"
        );
        Ok(report)
    }

    /// Similarity query. Matches come back sorted by score, descending.
    pub async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        user_id: Option<&str>,
    ) -> StorageResult<Vec<QueryMatch>> {
        let handle = self.connect().await?;
        let body = QueryRequest {
            vector,
            top_k: top_k.clamp(1, MAX_QUERY_TOP_K),
            include_metadata: true,
            filter: user_id.map(user_filter),
        };
        let response: QueryResponse =
            post_json(&handle.http, &format!("{}/query", handle.host), &body)
                .await
                .map_err(StorageError::Remote)?;

        let mut matches = response.matches;
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(matches)
    }

    /// Every record matching the user filter, via a broad probe query.
    pub async fn list_matches(&self, user_id: Option<&str>) -> StorageResult<Vec<QueryMatch>> {
        let probe = probe_vector(self.settings.dimension);
        self.query(&probe, self.settings.list_top_k, user_id).await
    }

    /// Ids of every record matching the user filter.
    pub async fn matching_ids(&self, user_id: Option<&str>) -> StorageResult<Vec<String>> {
        Ok(self
            .list_matches(user_id)
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect())
    }

    /// Delete records by id in batches. Fails only if every batch fails.
    pub async fn delete_many(&self, ids: &[String]) -> StorageResult<BatchReport> {
        if ids.is_empty() {
            return Ok(BatchReport::default());
        }
        let handle = self.connect().await?;
        let url = format!("{}/vectors/delete", handle.host);

        let report = run_batches("delete", ids, self.settings.delete, |batch| {
            let body = serde_json::json!({ "ids": batch });
            let http = &handle.http;
            let url = &url;
            async move {
                post_json::<serde_json::Value, _>(http, url, &body).await?;
                Ok(())
            }
        })
        .await;

        if report.all_failed() {
            return Err(StorageError::remote(anyhow!(
                "all {} delete batches to index '{}' failed",
                report.batches,
                self.settings.index_name
            )));
        }
        Ok(report)
    }

    /// Delete every vector in the index.
    pub async fn delete_all(&self) -> StorageResult<()> {
        let handle = self.connect().await?;
        post_json::<serde_json::Value, _>(
            &handle.http,
            &format!("{}/vectors/delete", handle.host),
            &serde_json::json!({ "deleteAll": true }),
        )
        .await
        .map_err(StorageError::Remote)?;
        Ok(())
    }

    /// Return the memoized handle, connecting first if needed.
    async fn connect(&self) -> StorageResult<IndexHandle> {
        let mut guard = self.handle.lock().await;
        if let Some(handle) = guard.as_ref() {
            return Ok(handle.clone());
        }

        let api_key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                StorageError::Configuration(format!(
                    "no API key configured for remote index '{}'",
                    self.settings.index_name
                ))
            })?;
        let http = build_http_client(api_key, self.settings.timeout)
            .map_err(|e| StorageError::Configuration(format!("{:#}", e)))?;

        info!(index = %self.settings.index_name, "connecting to remote index");
        let host = self
            .resolve_host(&http)
            .await
            .map_err(StorageError::Remote)?;

        let handle = IndexHandle { http, host };
        *guard = Some(handle.clone());
        info!(index = %self.settings.index_name, host = %handle.host, "remote index ready");
        Ok(handle)
    }

    async fn resolve_host(&self, http: &reqwest::Client) -> Result<String> {
        let name = &self.settings.index_name;
        let list: IndexList = get_json(http, &format!("{}/indexes", self.settings.controller_url))
            .await
            .context("failed to list indexes")?;

        if let Some(existing) = list.indexes.into_iter().find(|i| &i.name == name) {
            let host = match existing.host.filter(|h| !h.is_empty()) {
                Some(host) => host,
                None => self.describe_index_host(http).await?,
            };
            return Ok(normalize_host(&host));
        }

        info!(index = %name, dimension = self.settings.dimension, "creating remote index");
        let host = match self.create_index(http).await? {
            Some(host) => host,
            None => self.describe_index_host(http).await?,
        };
        let host = normalize_host(&host);
        self.wait_until_ready(http, &host).await;
        Ok(host)
    }

    /// Issue the create request. A `409 Conflict` means another client won
    /// the race, which is as good as success.
    async fn create_index(&self, http: &reqwest::Client) -> Result<Option<String>> {
        let body = CreateIndexRequest {
            name: &self.settings.index_name,
            dimension: self.settings.dimension,
            metric: &self.settings.metric,
            spec: serde_json::json!({
                "serverless": { "cloud": self.settings.cloud, "region": self.settings.region }
            }),
        };
        let url = format!("{}/indexes", self.settings.controller_url);
        let response = http
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {}", url))?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            debug!(index = %self.settings.index_name, "index already exists");
            return Ok(None);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("POST {} failed ({}): {}", url, status, text);
        }
        let created: IndexDescription = response
            .json()
            .await
            .context("invalid create-index response")?;
        Ok(created.host.filter(|h| !h.is_empty()))
    }

    async fn describe_index_host(&self, http: &reqwest::Client) -> Result<String> {
        let description: IndexDescription = get_json(
            http,
            &format!(
                "{}/indexes/{}",
                self.settings.controller_url, self.settings.index_name
            ),
        )
        .await
        .context("failed to describe index")?;
        description
            .host
            .filter(|h| !h.is_empty())
            .ok_or_else(|| anyhow!("index '{}' has no host yet", self.settings.index_name))
    }

    /// Poll `describe_index_stats` until it answers. Returns whether the
    /// index became ready within the poll budget.
    async fn wait_until_ready(&self, http: &reqwest::Client, host: &str) -> bool {
        let policy = self.settings.ready_poll;
        let url = format!("{}/describe_index_stats", host);

        for attempt in 1..=policy.attempts {
            match post_json::<serde_json::Value, _>(http, &url, &serde_json::json!({})).await {
                Ok(_) => {
                    info!(index = %self.settings.index_name, attempt, "index is ready");
                    return true;
                }
                Err(e) => {
                    debug!(attempt, error = %format!("{:#}", e), "index not ready yet");
                }
            }
            if attempt < policy.attempts {
                tokio::time::sleep(policy.interval).await;
            }
        }

        warn!(
            index = %self.settings.index_name,
            attempts = policy.attempts,
            "index did not report ready; proceeding anyway"
        );
        false
    }
}

fn user_filter(user_id: &str) -> serde_json::Value {
    serde_json::json!({ "userId": { "$eq": user_id } })
}

/// Hosts come back without a scheme; default to HTTPS.
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

fn build_http_client(api_key: &str, timeout: Duration) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        "Api-Key",
        HeaderValue::from_str(api_key).context("invalid API key header value")?,
    );
    headers.insert("X-Pinecone-API-Version", HeaderValue::from_static(API_VERSION));
    reqwest::Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .context("failed to build HTTP client")
}

async fn get_json<T: DeserializeOwned>(http: &reqwest::Client, url: &str) -> Result<T> {
    let response = http
        .get(url)
        .send()
        .await
        .with_context(|| format!("GET {}", url))?;
    decode(response, "GET", url).await
}

async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
    http: &reqwest::Client,
    url: &str,
    body: &B,
) -> Result<T> {
    let response = http
        .post(url)
        .json(body)
        .send()
        .await
        .with_context(|| format!("POST {}", url))?;
    decode(response, "POST", url).await
}

async fn decode<T: DeserializeOwned>(
    response: reqwest::Response,
    method: &str,
    url: &str,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        bail!("{} {} failed ({}): {}", method, url, status, text);
    }
    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        // Some endpoints answer 200 with an empty body.
        return serde_json::from_str("{}").with_context(|| format!("{} {}: empty body", method, url));
    }
    serde_json::from_slice(&bytes).with_context(|| format!("{} {}: invalid JSON body", method, url))
}

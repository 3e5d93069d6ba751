//! TOML configuration for docvault.
//!
//! ```toml
//! [local]
//! path = "./data/docvault.sqlite"
//! storage_key = "uploaded_documents"
//!
//! [chunking]
//! max_chunk_chars = 800
//! min_content_chars = 50
//!
//! [remote]
//! index_name = "documents"
//! api_key_env = "PINECONE_API_KEY"
//!
//! [server]
//! bind = "127.0.0.1:7341"
//! ```
//!
//! The `[remote]` section is optional. Without it every operation is served
//! by the local store.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use docvault_core::embedding::EMBEDDING_DIMS;
use docvault_core::records::RecordLimits;

/// Upper bound the remote service accepts for a single query.
pub const MAX_QUERY_TOP_K: usize = 10_000;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub local: LocalConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocalConfig {
    pub path: PathBuf,
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
}

fn default_storage_key() -> String {
    "uploaded_documents".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
    /// Cleaned content at or below this length is not stored.
    #[serde(default = "default_min_content_chars")]
    pub min_content_chars: usize,
    #[serde(default = "default_metadata_content_limit")]
    pub metadata_content_limit: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: default_max_chunk_chars(),
            min_content_chars: default_min_content_chars(),
            metadata_content_limit: default_metadata_content_limit(),
        }
    }
}

impl ChunkingConfig {
    pub fn record_limits(&self) -> RecordLimits {
        RecordLimits {
            max_chunk_chars: self.max_chunk_chars,
            metadata_content_limit: self.metadata_content_limit,
        }
    }
}

fn default_max_chunk_chars() -> usize {
    800
}
fn default_min_content_chars() -> usize {
    50
}
fn default_metadata_content_limit() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    /// Deadline for a single primary-backend call. Expiry falls back to the
    /// local store.
    #[serde(default)]
    pub operation_timeout_secs: Option<u64>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            operation_timeout_secs: None,
        }
    }
}

impl RetrievalConfig {
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs.map(Duration::from_secs)
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    pub index_name: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_controller_url")]
    pub controller_url: String,
    #[serde(default = "default_cloud")]
    pub cloud: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default = "default_metric")]
    pub metric: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_ready_poll_attempts")]
    pub ready_poll_attempts: u32,
    #[serde(default = "default_ready_poll_interval_ms")]
    pub ready_poll_interval_ms: u64,
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub upsert_batch_delay_ms: u64,
    #[serde(default = "default_delete_batch_size")]
    pub delete_batch_size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub delete_batch_delay_ms: u64,
    #[serde(default = "default_list_top_k")]
    pub list_top_k: usize,
}

fn default_api_key_env() -> String {
    "PINECONE_API_KEY".to_string()
}
fn default_controller_url() -> String {
    "https://api.pinecone.io".to_string()
}
fn default_cloud() -> String {
    "aws".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_dimension() -> usize {
    EMBEDDING_DIMS
}
fn default_metric() -> String {
    "cosine".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_ready_poll_attempts() -> u32 {
    30
}
fn default_ready_poll_interval_ms() -> u64 {
    2000
}
fn default_upsert_batch_size() -> usize {
    10
}
fn default_delete_batch_size() -> usize {
    100
}
fn default_batch_delay_ms() -> u64 {
    200
}
fn default_list_top_k() -> usize {
    MAX_QUERY_TOP_K
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.local.storage_key.trim().is_empty() {
        anyhow::bail!("local.storage_key must not be empty");
    }

    if config.chunking.max_chunk_chars == 0 {
        anyhow::bail!("chunking.max_chunk_chars must be > 0");
    }

    if config.retrieval.default_top_k == 0 {
        anyhow::bail!("retrieval.default_top_k must be >= 1");
    }

    if let Some(remote) = &config.remote {
        if remote.index_name.trim().is_empty() {
            anyhow::bail!("remote.index_name must not be empty");
        }
        if remote.dimension != EMBEDDING_DIMS {
            anyhow::bail!(
                "remote.dimension must be {} to match the embedder, got {}",
                EMBEDDING_DIMS,
                remote.dimension
            );
        }
        if remote.upsert_batch_size == 0 || remote.delete_batch_size == 0 {
            anyhow::bail!("remote batch sizes must be > 0");
        }
        if remote.list_top_k == 0 || remote.list_top_k > MAX_QUERY_TOP_K {
            anyhow::bail!("remote.list_top_k must be in [1, {}]", MAX_QUERY_TOP_K);
        }
        // Scores are read as similarities in [0, 1], higher is better.
        if remote.metric != "cosine" {
            anyhow::bail!(
                "Unsupported remote.metric: '{}'. Only cosine is supported.",
                remote.metric
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
[local]
path = "/tmp/dv.sqlite"
"#,
        )
        .unwrap();
        validate(&config).unwrap();
        assert_eq!(config.local.storage_key, "uploaded_documents");
        assert_eq!(config.chunking.max_chunk_chars, 800);
        assert_eq!(config.chunking.min_content_chars, 50);
        assert!(config.remote.is_none());
        assert_eq!(config.server.bind, "127.0.0.1:7341");
    }

    #[test]
    fn test_remote_defaults() {
        let config: Config = toml::from_str(
            r#"
[local]
path = "/tmp/dv.sqlite"

[remote]
index_name = "documents"
"#,
        )
        .unwrap();
        validate(&config).unwrap();
        let remote = config.remote.unwrap();
        assert_eq!(remote.api_key_env, "PINECONE_API_KEY");
        assert_eq!(remote.dimension, 384);
        assert_eq!(remote.metric, "cosine");
        assert_eq!(remote.ready_poll_attempts, 30);
        assert_eq!(remote.ready_poll_interval_ms, 2000);
        assert_eq!(remote.upsert_batch_size, 10);
        assert_eq!(remote.upsert_batch_delay_ms, 200);
        assert_eq!(remote.delete_batch_size, 100);
        assert_eq!(remote.list_top_k, 10_000);
    }

    #[test]
    fn test_rejects_mismatched_dimension() {
        let config: Config = toml::from_str(
            r#"
[local]
path = "/tmp/dv.sqlite"

[remote]
index_name = "documents"
dimension = 1536
"#,
        )
        .unwrap();
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("remote.dimension"));
    }

    #[test]
    fn test_rejects_zero_chunk_size() {
        let config: Config = toml::from_str(
            r#"
[local]
path = "/tmp/dv.sqlite"

[chunking]
max_chunk_chars = 0
"#,
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_non_cosine_metric() {
        for metric in ["euclidean", "dotproduct"] {
            let config: Config = toml::from_str(&format!(
                r#"
[local]
path = "/tmp/dv.sqlite"

[remote]
index_name = "documents"
metric = "{}"
"#,
                metric
            ))
            .unwrap();
            let err = validate(&config).unwrap_err().to_string();
            assert!(err.contains("remote.metric"), "{}", err);
        }
    }
}

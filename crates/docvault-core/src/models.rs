//! Core data models used throughout docvault.
//!
//! These types represent the chunks, stored records, search results and
//! document summaries that flow through the store and retrieval pipeline.
//! Types that cross the remote wire or the local collection serialize with
//! camelCase field names.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A sentence-aligned slice of a document body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
    /// Zero-based, dense position within the source text.
    pub index: usize,
    pub total_chunks: usize,
}

/// Input to a backend's `store` operation, after content cleaning.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub file_name: String,
    pub file_type: String,
    pub content: String,
    pub user_id: String,
}

/// One stored chunk of a document, as held by a vector backend.
///
/// A multi-chunk upload produces several records sharing `file_name` and
/// `timestamp` but with distinct `id` and `chunk_index`. Missing fields
/// deserialize to defaults so partial remote metadata still parses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoredDocumentRecord {
    pub id: String,
    pub file_name: String,
    pub file_type: String,
    /// Chunk text, capped for metadata size.
    pub content: String,
    /// ISO-8601 creation time shared by every chunk of one upload.
    pub timestamp: String,
    pub user_id: String,
    #[serde(deserialize_with = "lenient_count")]
    pub chunk_index: usize,
    #[serde(deserialize_with = "lenient_count")]
    pub total_chunks: usize,
    /// Length of the full chunk text in characters, before capping.
    #[serde(deserialize_with = "lenient_count")]
    pub chunk_length: usize,
}

/// Vector services hand numeric metadata back as floats (`3.0`).
fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    let value = f64::deserialize(deserializer)?;
    Ok(if value.is_finite() && value > 0.0 {
        value as usize
    } else {
        0
    })
}

/// A stored record paired with its embedding, ready for upsert.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub values: Vec<f32>,
    pub metadata: StoredDocumentRecord,
}

impl VectorRecord {
    pub fn id(&self) -> &str {
        &self.metadata.id
    }
}

/// Metadata returned with every search hit, whichever backend served it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    pub file_name: String,
    pub file_type: String,
    pub content: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// A single ranked hit. `score` is in `[0, 1]`, higher is more relevant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub score: f64,
    pub metadata: ResultMetadata,
}

/// One entry of a document listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub file_name: String,
    pub file_type: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub total_chunks: usize,
}

impl From<&StoredDocumentRecord> for ResultMetadata {
    fn from(record: &StoredDocumentRecord) -> Self {
        ResultMetadata {
            file_name: record.file_name.clone(),
            file_type: record.file_type.clone(),
            content: record.content.clone(),
            timestamp: record.timestamp.clone(),
            user_id: non_empty(&record.user_id),
        }
    }
}

impl From<&StoredDocumentRecord> for DocumentSummary {
    fn from(record: &StoredDocumentRecord) -> Self {
        DocumentSummary {
            file_name: record.file_name.clone(),
            file_type: record.file_type.clone(),
            timestamp: record.timestamp.clone(),
            user_id: non_empty(&record.user_id),
            total_chunks: record.total_chunks,
        }
    }
}

/// `None` for an empty string; records store "no user" as `""`.
pub fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Which backend satisfied an orchestrator operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Remote,
    Local,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Remote => write!(f, "remote"),
            Backend::Local => write!(f, "local"),
        }
    }
}

/// Sort results by score, highest first. Ties keep their incoming order.
pub fn sort_by_score_desc(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

//! Turning a cleaned document into embedded, per-chunk records.
//!
//! Vector backends (the remote index and the in-memory backend) store one
//! record per chunk. Both build those records here so ids, metadata caps
//! and timestamps are identical whichever backend accepts the document.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::chunk::chunk_text;
use crate::embedding::EmbeddingProvider;
use crate::models::{NewDocument, StoredDocumentRecord, VectorRecord};

/// Chunking and metadata limits applied when preparing records.
#[derive(Debug, Clone, Copy)]
pub struct RecordLimits {
    /// Maximum characters per chunk.
    pub max_chunk_chars: usize,
    /// Maximum characters of chunk text kept in record metadata.
    pub metadata_content_limit: usize,
}

impl Default for RecordLimits {
    fn default() -> Self {
        Self {
            max_chunk_chars: 800,
            metadata_content_limit: 1000,
        }
    }
}

/// Chunk, embed and wrap a document into [`VectorRecord`]s.
///
/// Records come back in ascending `chunk_index` order and share one
/// timestamp. Ids follow `"{file_name}_{millis}_chunk_{index}"`.
pub fn prepare_records(
    doc: &NewDocument,
    limits: RecordLimits,
    embedder: &dyn EmbeddingProvider,
    now: DateTime<Utc>,
) -> Vec<VectorRecord> {
    let timestamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);
    let millis = now.timestamp_millis();

    chunk_text(&doc.content, limits.max_chunk_chars)
        .into_iter()
        .map(|chunk| {
            let values = embedder.embed(&chunk.text);
            VectorRecord {
                values,
                metadata: StoredDocumentRecord {
                    id: format!("{}_{}_chunk_{}", doc.file_name, millis, chunk.index),
                    file_name: doc.file_name.clone(),
                    file_type: doc.file_type.clone(),
                    content: cap_chars(&chunk.text, limits.metadata_content_limit),
                    timestamp: timestamp.clone(),
                    user_id: doc.user_id.clone(),
                    chunk_index: chunk.index,
                    total_chunks: chunk.total_chunks,
                    chunk_length: chunk.text.chars().count(),
                },
            }
        })
        .collect()
}

/// Truncate to at most `limit` characters on a char boundary.
pub fn cap_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{HashEmbedder, EMBEDDING_DIMS};
    use chrono::TimeZone;

    fn doc(content: &str) -> NewDocument {
        NewDocument {
            file_name: "notes.txt".to_string(),
            file_type: "text/plain".to_string(),
            content: content.to_string(),
            user_id: "user-1".to_string(),
        }
    }

    #[test]
    fn test_records_share_timestamp_and_have_unique_ids() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let text = "First sentence here. Second sentence here. Third sentence here.";
        let limits = RecordLimits {
            max_chunk_chars: 25,
            metadata_content_limit: 1000,
        };
        let records = prepare_records(&doc(text), limits, &HashEmbedder, now);

        assert_eq!(records.len(), 3);
        for (i, r) in records.iter().enumerate() {
            assert_eq!(r.metadata.chunk_index, i);
            assert_eq!(r.metadata.total_chunks, 3);
            assert_eq!(r.metadata.timestamp, "2024-05-01T12:00:00.000Z");
            assert_eq!(r.values.len(), EMBEDDING_DIMS);
            assert_eq!(r.id(), format!("notes.txt_{}_chunk_{}", now.timestamp_millis(), i));
        }
    }

    #[test]
    fn test_metadata_content_is_capped() {
        let text = format!("{}.", "x".repeat(50));
        let limits = RecordLimits {
            max_chunk_chars: 800,
            metadata_content_limit: 10,
        };
        let records = prepare_records(&doc(&text), limits, &HashEmbedder, Utc::now());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].metadata.content, "x".repeat(10));
        assert_eq!(records[0].metadata.chunk_length, 51);
    }

    #[test]
    fn test_cap_chars_multibyte() {
        assert_eq!(cap_chars("héllo", 2), "hé");
        assert_eq!(cap_chars("abc", 10), "abc");
        assert_eq!(cap_chars("abc", 0), "");
    }
}

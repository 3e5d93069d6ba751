//! Deterministic hash-based text embeddings and vector utilities.
//!
//! [`HashEmbedder`] turns text into a 384-dimensional, L2-normalized vector
//! without a trained model. Text that shares distinctive tokens lands in
//! similar directions, which is enough for cosine ranking against a remote
//! vector index or the in-memory backend.
//!
//! # Algorithm
//!
//! 1. Normalize: lowercase, replace every non-word character with a space,
//!    collapse whitespace.
//! 2. Tokenize on whitespace and drop tokens of two characters or fewer.
//! 3. For each distinct token (first-occurrence order, position `w`):
//!    `weight = tf × ln(|unique| / (1 + w))`.
//! 4. Run 5 seeded hash passes per token. Each hash feeds three dimensions:
//!    `sin(h·0.001)`, `cos(h·0.001)` and `tan(h·0.0001)`, scaled by `weight`.
//! 5. Positional encoding over the first 50 tokens: `0.1 / (i + 1)` into a
//!    position-seeded hash dimension.
//! 6. Document features in dimensions 0–3: mean word length, Shannon
//!    entropy of the token distribution, sentence count and token count.
//! 7. L2-normalize. Text without any token stays the zero vector.
//!
//! The output is bit-for-bit reproducible for a given input.

use std::collections::HashMap;

use tracing::warn;

/// Dimensionality of every vector produced by [`HashEmbedder`].
pub const EMBEDDING_DIMS: usize = 384;

const HASH_PASSES: u64 = 5;
const POSITIONAL_TOKENS: usize = 50;
const HASH_MASK: u64 = 0x7fff_ffff;

/// Trait for embedding providers.
///
/// Implementations must be deterministic for a given input and must not
/// fail: a provider that cannot embed returns a usable fallback vector.
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier.
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality.
    fn dims(&self) -> usize;
    /// Embed a single text.
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Feature-hashing embedder producing [`EMBEDDING_DIMS`]-wide vectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashEmbedder;

impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "feature-hash-384"
    }

    fn dims(&self) -> usize {
        EMBEDDING_DIMS
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        embed(text)
    }
}

/// Embed `text` into a normalized [`EMBEDDING_DIMS`]-wide vector.
///
/// Never fails: if the projection produces a non-finite component the
/// caller gets a random unit vector instead, which still compares sanely
/// against other embeddings.
///
/// ```rust
/// use docvault_core::embedding::{embed, EMBEDDING_DIMS};
///
/// let v = embed("Rust ownership and borrowing rules");
/// assert_eq!(v.len(), EMBEDDING_DIMS);
/// assert_eq!(v, embed("Rust ownership and borrowing rules"));
/// ```
pub fn embed(text: &str) -> Vec<f32> {
    let raw = project(text);
    if raw.iter().any(|x| !x.is_finite()) {
        warn!(
            text_len = text.len(),
            "hash projection produced non-finite values; using fallback vector"
        );
        return fallback_vector(EMBEDDING_DIMS);
    }
    normalize(&raw).into_iter().map(|x| x as f32).collect()
}

fn project(text: &str) -> Vec<f64> {
    let mut vector = vec![0.0f64; EMBEDDING_DIMS];

    let normalized = normalize_text(text);
    let words: Vec<&str> = normalized
        .split_whitespace()
        .filter(|w| w.chars().count() > 2)
        .collect();

    if words.is_empty() {
        return vector;
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut unique_words: Vec<&str> = Vec::new();
    for &word in &words {
        let count = counts.entry(word).or_insert(0);
        if *count == 0 {
            unique_words.push(word);
        }
        *count += 1;
    }

    let total = words.len() as f64;
    let unique = unique_words.len() as f64;

    for (word_index, word) in unique_words.iter().enumerate() {
        let tf = counts[word] as f64 / total;
        let weight = tf * (unique / (1.0 + word_index as f64)).ln();

        for seed in 0..HASH_PASSES {
            let hash = word_hash(word, seed * 31);
            let h = hash as f64;
            vector[dim(hash)] += weight * (h * 0.001).sin();
            vector[dim(hash * 31)] += weight * (h * 0.001).cos();
            vector[dim(hash * 97)] += weight * (h * 0.0001).tan();
        }
    }

    for (i, word) in words.iter().take(POSITIONAL_TOKENS).enumerate() {
        let hash = word_hash(word, i as u64);
        vector[dim(hash)] += 1.0 / (i as f64 + 1.0) * 0.1;
    }

    let avg_word_len = words.iter().map(|w| w.chars().count()).sum::<usize>() as f64 / total;
    let entropy: f64 = unique_words
        .iter()
        .map(|w| {
            let p = counts[w] as f64 / total;
            -p * p.log2()
        })
        .sum();

    vector[0] += avg_word_len * 0.01;
    vector[1] += entropy * 0.01;
    vector[2] += sentence_count(text) as f64 * 0.001;
    vector[3] += total * 0.0001;

    vector
}

/// Lowercase, replace non-word characters with spaces, collapse whitespace.
fn normalize_text(text: &str) -> String {
    let replaced: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `hash = ((hash << 5) - hash + unit + salt) & 0x7fffffff` over UTF-16 units.
///
/// Masking every step keeps the running value within 31 bits, so the
/// shifted and multiplied intermediates never leave `u64`.
fn word_hash(word: &str, salt: u64) -> u64 {
    word.encode_utf16().fold(0u64, |hash, unit| {
        ((hash << 5).wrapping_sub(hash) + unit as u64 + salt) & HASH_MASK
    })
}

fn dim(hash: u64) -> usize {
    (hash % EMBEDDING_DIMS as u64) as usize
}

fn sentence_count(text: &str) -> usize {
    text.split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count()
}

fn normalize(vector: &[f64]) -> Vec<f64> {
    let norm = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|x| x / norm).collect()
}

/// A random unit vector used when the projection cannot be trusted.
pub fn fallback_vector(dims: usize) -> Vec<f32> {
    let raw: Vec<f64> = (0..dims).map(|_| rand::random::<f64>() - 0.5).collect();
    normalize(&raw).into_iter().map(|x| x as f32).collect()
}

/// A uniform unit vector, used as a neutral probe for broad listing queries.
pub fn probe_vector(dims: usize) -> Vec<f32> {
    if dims == 0 {
        return Vec::new();
    }
    vec![1.0 / (dims as f32).sqrt(); dims]
}

/// Euclidean norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let text = "The quick brown fox jumps over the lazy dog. Twice!";
        let a = embed(text);
        let b = embed(text);
        assert_eq!(a.len(), EMBEDDING_DIMS);
        assert!(a.iter().zip(&b).all(|(x, y)| x.to_bits() == y.to_bits()));
    }

    #[test]
    fn test_normalized() {
        for text in [
            "hello world from the embedding module",
            "one",
            "Numbers 12345 and symbols #@! mixed with words",
            "Ünïcödé wörds should wörk too",
        ] {
            let v = embed(text);
            let norm = l2_norm(&v);
            assert!((norm - 1.0).abs() < 1e-4, "norm {} for {:?}", norm, text);
        }
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let v = embed("");
        assert_eq!(v.len(), EMBEDDING_DIMS);
        assert!(v.iter().all(|&x| x == 0.0));
        assert!(embed("  ... !!! ").iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_only_short_tokens_is_zero_vector() {
        assert!(embed("a an to of").iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(
            normalize_text("  Hello,   WORLD!\n snake_case-words "),
            "hello world snake_case words"
        );
    }

    #[test]
    fn test_word_hash_masks_to_31_bits() {
        let long = "z".repeat(200);
        for salt in [0, 31, 124] {
            assert!(word_hash(&long, salt) <= HASH_MASK);
        }
        assert_eq!(word_hash("", 5), 0);
        // 'a' = 97: (0 << 5) - 0 + 97 + 0
        assert_eq!(word_hash("a", 0), 97);
        // then 'b' = 98: 97 * 31 + 98
        assert_eq!(word_hash("ab", 0), 97 * 31 + 98);
    }

    #[test]
    fn test_shared_tokens_score_higher() {
        let base = embed("kubernetes cluster deployment with helm charts");
        let related = embed("helm charts simplify kubernetes deployment");
        let unrelated = embed("sourdough bread needs patience and flour");
        assert!(cosine_similarity(&base, &related) > cosine_similarity(&base, &unrelated));
    }

    #[test]
    fn test_sentence_count() {
        assert_eq!(sentence_count("One. Two! Three? "), 3);
        assert_eq!(sentence_count("..."), 0);
        assert_eq!(sentence_count("no terminator"), 1);
    }

    #[test]
    fn test_fallback_and_probe_are_unit_vectors() {
        assert!((l2_norm(&fallback_vector(EMBEDDING_DIMS)) - 1.0).abs() < 1e-4);
        assert!((l2_norm(&probe_vector(EMBEDDING_DIMS)) - 1.0).abs() < 1e-4);
        assert!(probe_vector(0).is_empty());
    }

    #[test]
    fn test_provider_trait() {
        let provider = HashEmbedder;
        assert_eq!(provider.dims(), EMBEDDING_DIMS);
        assert_eq!(provider.embed("same input"), embed("same input"));
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_empty_and_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }
}

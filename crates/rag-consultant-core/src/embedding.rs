//! Embedding provider trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that every embedding backend implements,
//! plus pure helpers for vector serialization and similarity.
//!
//! Concrete providers (fastembed, OpenAI, Ollama) live in the
//! `rag-consultant` app crate.

use async_trait::async_trait;

use crate::error::{RagError, Result};

/// An embedding model pinned by name.
///
/// Implementations must be deterministic: the same model and text yield the
/// same vector, otherwise vectors stored at build time cannot be compared
/// with query vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts. Each text is embedded independently; the
    /// output has one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(RagError::Embedding {
                provider: self.model_name().to_string(),
                message: format!("expected 1 vector, got {}", vectors.len()),
            });
        }
        Ok(vectors.remove(0))
    }
}

/// Check that a provider returned one vector of the declared size per input.
///
/// A wrong count is a provider failure; a wrong dimensionality means the
/// configured `dims` does not describe the model, which is a configuration
/// problem.
pub fn check_vectors(embedder: &dyn Embedder, inputs: usize, vectors: &[Vec<f32>]) -> Result<()> {
    if vectors.len() != inputs {
        return Err(RagError::Embedding {
            provider: embedder.model_name().to_string(),
            message: format!("expected {} vectors, got {}", inputs, vectors.len()),
        });
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != embedder.dims()) {
        return Err(RagError::Configuration(format!(
            "embedding model '{}' returned {} dimensions, expected {}",
            embedder.model_name(),
            bad.len(),
            embedder.dims()
        )));
    }
    Ok(())
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use rag_consultant_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
///
/// Trailing bytes that do not form a whole `f32` are ignored; callers that
/// care check `blob.len() == dims * 4` first.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors of
/// different lengths, or zero vectors.
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

/// Inner product of two vectors; `0.0` when lengths differ.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the read path the retriever needs: a
//! declared model/dimensionality/metric and a top-k query. Implementations
//! are immutable once built so a single handle can serve concurrent queries
//! without locking.
//!
//! Persistence is not part of this trait; the app crate writes and reads
//! the on-disk format and hands back an [`InMemoryIndex`].

pub mod memory;

pub use memory::InMemoryIndex;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::embedding::{cosine_similarity, dot_product};
use crate::error::{RagError, Result};
use crate::models::ScoredChunk;

/// Similarity metric an index was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    /// Raw inner product. Only meaningful with normalized embeddings.
    Dot,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::Dot => "dot",
        }
    }

    /// Similarity between two vectors under this metric; higher is closer.
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::Cosine => cosine_similarity(a, b),
            Metric::Dot => dot_product(a, b),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cosine" => Ok(Metric::Cosine),
            "dot" => Ok(Metric::Dot),
            other => Err(RagError::Configuration(format!(
                "unknown similarity metric: '{}'. Use cosine or dot.",
                other
            ))),
        }
    }
}

/// What an index declares about its vectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexMeta {
    /// Embedding model used at build time.
    pub model: String,
    pub dims: usize,
    pub metric: Metric,
}

/// Read-only nearest-neighbour search over indexed chunks.
pub trait VectorIndex: Send + Sync {
    fn meta(&self) -> &IndexMeta;

    /// Number of indexed chunks.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return at most `k` chunks by descending similarity to `vector`.
    ///
    /// Ties keep indexing order. `k` larger than the index is clamped.
    ///
    /// # Errors
    ///
    /// [`RagError::Configuration`] when `vector` does not have the index's
    /// dimensionality.
    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;
}

//! In-memory [`VectorIndex`] implementation.
//!
//! Holds every [`IndexedChunk`] in a `Vec` in indexing order. Search is
//! brute-force similarity over all stored vectors followed by a stable sort,
//! which keeps results deterministic and tie-breaks by indexing order.

use crate::error::{RagError, Result};
use crate::models::{IndexedChunk, ScoredChunk};

use super::{IndexMeta, VectorIndex};

/// Immutable in-memory vector index.
#[derive(Debug, Clone)]
pub struct InMemoryIndex {
    meta: IndexMeta,
    entries: Vec<IndexedChunk>,
}

impl InMemoryIndex {
    /// Build an index from entries in indexing order.
    ///
    /// # Errors
    ///
    /// [`RagError::Retrieval`] if any entry's embedding does not match
    /// `meta.dims`; such an index is unusable.
    pub fn new(meta: IndexMeta, entries: Vec<IndexedChunk>) -> Result<Self> {
        if let Some((pos, bad)) = entries
            .iter()
            .enumerate()
            .find(|(_, e)| e.embedding.len() != meta.dims)
        {
            return Err(RagError::Retrieval(format!(
                "index entry {} has {} dimensions, index declares {}",
                pos,
                bad.embedding.len(),
                meta.dims
            )));
        }
        Ok(Self { meta, entries })
    }

    /// An index with no entries.
    pub fn empty(meta: IndexMeta) -> Self {
        Self {
            meta,
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[IndexedChunk] {
        &self.entries
    }
}

impl VectorIndex for InMemoryIndex {
    fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if vector.len() != self.meta.dims {
            return Err(RagError::Configuration(format!(
                "query vector has {} dimensions but the index was built with {} ({})",
                vector.len(),
                self.meta.dims,
                self.meta.model
            )));
        }
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let metric = self.meta.metric;
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(pos, e)| {
                let score = metric.score(vector, &e.embedding);
                // NaN (e.g. from a corrupt vector) ranks last.
                (pos, if score.is_nan() { f32::NEG_INFINITY } else { score })
            })
            .collect();

        // sort_by is stable, so equal scores keep indexing order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k.min(self.entries.len()));

        Ok(scored
            .into_iter()
            .map(|(pos, score)| ScoredChunk {
                chunk: self.entries[pos].chunk.clone(),
                score,
            })
            .collect())
    }
}

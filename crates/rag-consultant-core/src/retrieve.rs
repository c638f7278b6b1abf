//! Top-k retrieval: embed the question, query the index.
//!
//! The retriever holds only shared read-only handles (embedder and index),
//! so one instance can serve any number of concurrent queries.

use std::sync::Arc;

use tracing::debug;

use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::models::RetrievalResult;
use crate::store::{IndexMeta, VectorIndex};

/// Verify that `embedder` produces vectors comparable with the index.
///
/// A different model or dimensionality is a configuration error: retrying
/// cannot fix it, the index must be rebuilt or the config corrected.
pub fn check_compatible(embedder: &dyn Embedder, meta: &IndexMeta) -> Result<()> {
    if embedder.model_name() != meta.model {
        return Err(RagError::Configuration(format!(
            "index was built with embedding model '{}' but '{}' is configured",
            meta.model,
            embedder.model_name()
        )));
    }
    if embedder.dims() != meta.dims {
        return Err(RagError::Configuration(format!(
            "index has {} dimensions but embedding model '{}' produces {}",
            meta.dims,
            embedder.model_name(),
            embedder.dims()
        )));
    }
    Ok(())
}

/// Embed `query` and return the `k` most similar indexed chunks.
///
/// An empty index yields an empty result without calling the embedder.
pub async fn retrieve(
    query: &str,
    k: usize,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
) -> Result<RetrievalResult> {
    if index.is_empty() || k == 0 {
        debug!(k, index_len = index.len(), "nothing to retrieve");
        return Ok(RetrievalResult::default());
    }

    let vector = embedder
        .embed_one(query)
        .await
        .map_err(RagError::into_retrieval)?;
    let hits = index.query(&vector, k)?;

    debug!(
        k,
        hits = hits.len(),
        top_score = hits.first().map(|h| h.score),
        "retrieved chunks"
    );
    Ok(RetrievalResult::new(hits))
}

/// Retrieval bound to one embedder, one index and a default `k`.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
}

impl Retriever {
    /// # Errors
    ///
    /// [`RagError::Configuration`] if the embedder does not match the
    /// index's declared model and dimensionality.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        top_k: usize,
    ) -> Result<Self> {
        check_compatible(embedder.as_ref(), index.meta())?;
        Ok(Self {
            embedder,
            index,
            top_k,
        })
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn index(&self) -> &dyn VectorIndex {
        self.index.as_ref()
    }

    pub async fn retrieve(&self, query: &str) -> Result<RetrievalResult> {
        self.retrieve_k(query, self.top_k).await
    }

    pub async fn retrieve_k(&self, query: &str, k: usize) -> Result<RetrievalResult> {
        retrieve(query, k, self.embedder.as_ref(), self.index.as_ref()).await
    }
}

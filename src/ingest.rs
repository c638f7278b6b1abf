//! Offline index build.
//!
//! Coordinates the full rebuild: load corpus → chunk → embed → persist.
//! Any failure aborts the build before anything is published; the previous
//! index (if any) stays in place.

use anyhow::Result;
use rag_consultant_core::chunk::{split_documents, ChunkParams};
use rag_consultant_core::embedding::{check_vectors, Embedder};
use rag_consultant_core::models::{Chunk, IndexedChunk};
use rag_consultant_core::store::IndexMeta;
use rag_consultant_core::RagError;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::index;
use crate::loader::{self, Corpus};

/// Counts from one build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub files: usize,
    pub documents: usize,
    pub chunks: usize,
    pub embedded: usize,
}

/// Load and chunk the corpus without embedding anything.
pub fn prepare(config: &Config) -> Result<(Corpus, Vec<Chunk>), RagError> {
    let params = config.chunking.params()?;
    let corpus = loader::load_documents(&config.documents)?;
    let chunks = split_documents(&corpus.documents, params.chunk_size(), params.chunk_overlap())?;
    Ok((corpus, chunks))
}

/// Embed every chunk, batch by batch, in chunk order.
pub async fn embed_chunks(
    embedder: &dyn Embedder,
    chunks: Vec<Chunk>,
    batch_size: usize,
) -> Result<Vec<IndexedChunk>, RagError> {
    let mut entries = Vec::with_capacity(chunks.len());
    let total = chunks.len();
    let mut pending = chunks.into_iter().peekable();

    while pending.peek().is_some() {
        let batch: Vec<Chunk> = pending.by_ref().take(batch_size.max(1)).collect();
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        // A wrong vector count is a provider failure; wrong dimensions are
        // a configuration error and pass through unchanged.
        let vectors = embedder
            .embed(&texts)
            .await
            .and_then(|vectors| check_vectors(embedder, batch.len(), &vectors).map(|()| vectors))
            .map_err(|e| match e {
                RagError::Embedding { provider, message } => {
                    RagError::Ingestion(format!("embedding failed ({}): {}", provider, message))
                }
                other => other,
            })?;
        entries.extend(
            batch
                .into_iter()
                .zip(vectors)
                .map(|(chunk, embedding)| IndexedChunk { chunk, embedding }),
        );
        debug!(embedded = entries.len(), total, "embedding progress");
    }
    Ok(entries)
}

/// Full rebuild of the index at `config.index.path` with `embedder`.
pub async fn build_index(config: &Config, embedder: &dyn Embedder) -> Result<BuildReport, RagError> {
    let params: ChunkParams = config.chunking.params()?;
    let (corpus, chunks) = prepare(config)?;
    let mut report = BuildReport {
        files: corpus.files.len(),
        documents: corpus.documents.len(),
        chunks: chunks.len(),
        embedded: 0,
    };

    if chunks.is_empty() {
        warn!(
            files = report.files,
            "documents contain no extractable text; writing an empty index"
        );
    }

    let entries = embed_chunks(embedder, chunks, config.embedding.batch_size).await?;
    report.embedded = entries.len();

    let meta = IndexMeta {
        model: embedder.model_name().to_string(),
        dims: embedder.dims(),
        metric: config.retrieval.metric,
    };
    index::persist(&config.index.path, &meta, params, &entries).await?;

    info!(
        files = report.files,
        documents = report.documents,
        chunks = report.chunks,
        "build complete"
    );
    Ok(report)
}

/// `consult build`: rebuild the index, or with `dry_run` only count.
pub async fn run_build(config: &Config, dry_run: bool) -> Result<()> {
    if dry_run {
        let (corpus, chunks) = prepare(config)?;
        println!("build (dry-run)");
        println!("  files found: {}", corpus.files.len());
        println!("  documents: {}", corpus.documents.len());
        println!("  chunks: {}", chunks.len());
        return Ok(());
    }

    let embedder = create_embedder(&config.embedding)?;
    let report = build_index(config, embedder.as_ref()).await?;

    println!("build");
    println!("  files: {}", report.files);
    println!("  documents: {}", report.documents);
    println!("  chunks written: {}", report.chunks);
    println!("  embedding model: {} ({} dims)", embedder.model_name(), embedder.dims());
    println!("  index: {}", config.index.path.display());
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Length-based vectors; records batch sizes.
    struct CountingEmbedder {
        batches: Mutex<Vec<usize>>,
        fail_after: Option<usize>,
        calls: AtomicUsize,
        /// Length of the vectors actually returned.
        returned_dims: usize,
    }

    impl CountingEmbedder {
        fn new(fail_after: Option<usize>) -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                fail_after,
                calls: AtomicUsize::new(0),
                returned_dims: 2,
            }
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> rag_consultant_core::Result<Vec<Vec<f32>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_after.is_some_and(|n| call >= n) {
                return Err(RagError::Embedding {
                    provider: "counting".into(),
                    message: "rate limited".into(),
                });
            }
            self.batches.lock().unwrap().push(texts.len());
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![1.0; self.returned_dims];
                    v[0] = t.len() as f32;
                    v
                })
                .collect())
        }
    }

    fn chunk(text: &str) -> Chunk {
        let docs = [rag_consultant_core::models::Document::new("a.md", text)];
        split_documents(&docs, 1000, 0).unwrap().remove(0)
    }

    #[tokio::test]
    async fn test_embeds_in_batches_preserving_order() {
        let e = CountingEmbedder::new(None);
        let chunks: Vec<Chunk> = ["a", "bb", "ccc", "dddd", "eeeee"].iter().map(|t| chunk(t)).collect();
        let entries = embed_chunks(&e, chunks, 2).await.unwrap();
        assert_eq!(*e.batches.lock().unwrap(), vec![2, 2, 1]);
        let lens: Vec<f32> = entries.iter().map(|x| x.embedding[0]).collect();
        assert_eq!(lens, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[tokio::test]
    async fn test_embedding_failure_is_ingestion_error() {
        let e = CountingEmbedder::new(Some(1));
        let chunks: Vec<Chunk> = ["a", "b", "c"].iter().map(|t| chunk(t)).collect();
        let err = embed_chunks(&e, chunks, 1).await.unwrap_err();
        assert!(matches!(err, RagError::Ingestion(_)));
    }

    #[tokio::test]
    async fn test_wrong_dimensions_fail_the_build() {
        let e = CountingEmbedder {
            returned_dims: 3,
            ..CountingEmbedder::new(None)
        };
        let chunks: Vec<Chunk> = ["a", "b"].iter().map(|t| chunk(t)).collect();
        let err = embed_chunks(&e, chunks, 8).await.unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)), "{}", err);
    }
}

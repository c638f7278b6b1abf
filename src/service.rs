//! Process-wide query service.
//!
//! [`RagService`] owns the read-only resources every query needs: the
//! embedder, the loaded index, the prompt template and the generator. It is
//! created once per process by [`shared`] and then handed out as an
//! `Arc`, so concurrent queries share one index in memory.

use anyhow::{Context, Result};
use rag_consultant_core::embedding::Embedder;
use rag_consultant_core::generate::Generator;
use rag_consultant_core::pipeline::{Answer, Pipeline};
use rag_consultant_core::retrieve::Retriever;
use rag_consultant_core::store::{InMemoryIndex, VectorIndex};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::{Config, Credentials};
use crate::embedding::create_embedder;
use crate::generator::create_generator;
use crate::index;

static SERVICE: OnceCell<Arc<RagService>> = OnceCell::const_new();

pub struct RagService {
    pipeline: Pipeline,
}

impl RagService {
    /// Resolve credentials, load the index and connect the providers.
    ///
    /// The credential check runs first: without it nothing can be served,
    /// so there is no point loading models or the index.
    pub async fn initialize(config: &Config) -> Result<Self> {
        let credentials = Credentials::from_env(&config.generation)?;
        let embedder = create_embedder(&config.embedding)?;
        let index = index::load(&config.index.path).await?;
        let generator = create_generator(&config.generation, &credentials)?;
        Self::from_parts(config, embedder, index, generator)
    }

    /// Assemble a service from already-built parts.
    pub fn from_parts(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        index: InMemoryIndex,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        if index.meta().metric != config.retrieval.metric {
            warn!(
                index_metric = %index.meta().metric,
                configured = %config.retrieval.metric,
                "index was built for a different metric; using the index's"
            );
        }
        let chunks = index.len();
        let index: Arc<dyn VectorIndex> = Arc::new(index);
        let retriever = Retriever::new(embedder, index, config.retrieval.top_k)
            .context("embedding model does not match the index; rebuild with `consult build`")?;
        let template = config.prompt.template()?;

        info!(
            chunks,
            top_k = config.retrieval.top_k,
            generator = generator.model_name(),
            "query service ready"
        );
        Ok(Self {
            pipeline: Pipeline::new(retriever, template, generator),
        })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub async fn answer(&self, question: &str) -> rag_consultant_core::Result<Answer> {
        self.pipeline.answer(question).await
    }

    pub async fn answer_top_k(&self, question: &str, k: usize) -> rag_consultant_core::Result<Answer> {
        self.pipeline.answer_top_k(question, k).await
    }
}

/// The process-wide service, initialised on first call.
///
/// Concurrent first callers wait for a single initialisation. A failed
/// initialisation is not cached, so a later call may retry.
pub async fn shared(config: &Config) -> Result<Arc<RagService>> {
    SERVICE
        .get_or_try_init(|| async { RagService::initialize(config).await.map(Arc::new) })
        .await
        .cloned()
}

//! Concrete embedding providers.
//!
//! Each provider implements the core [`Embedder`] trait:
//! - **[`LocalEmbedder`]**: runs the model in-process via fastembed; the
//!   model is downloaded once, loaded on first use and kept for the life of
//!   the process.
//! - **[`OpenAIEmbedder`]**: `POST https://api.openai.com/v1/embeddings`.
//! - **[`OllamaEmbedder`]**: `POST {url}/api/embed` on a local Ollama.
//!
//! Every batch returned by a provider is checked against the configured
//! dimensionality before it leaves this module.
//!
//! # Retry Strategy
//!
//! The HTTP providers retry transient failures with exponential backoff:
//! - HTTP 429 and 5xx: retry
//! - other 4xx: fail immediately
//! - network errors: retry
//! - backoff 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::bail;
use async_trait::async_trait;
use rag_consultant_core::embedding::{check_vectors, Embedder};
use rag_consultant_core::{RagError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Build the embedder named by `config.provider`.
pub fn create_embedder(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!(
            "The local embedding provider requires building with --features local-embeddings"
        ),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Dimensionality of the local models we know about.
pub fn known_local_dims(model: &str) -> Option<usize> {
    match model {
        "all-minilm-l6-v2" | "bge-small-en-v1.5" | "multilingual-e5-small" => Some(384),
        "bge-base-en-v1.5" | "nomic-embed-text-v1" | "nomic-embed-text-v1.5"
        | "multilingual-e5-base" => Some(768),
        "bge-large-en-v1.5" | "multilingual-e5-large" => Some(1024),
        _ => None,
    }
}

fn provider_error(provider: &str, message: impl std::fmt::Display) -> RagError {
    RagError::Embedding {
        provider: provider.to_string(),
        message: message.to_string(),
    }
}

// ============ Local (fastembed) ============

#[cfg(feature = "local-embeddings")]
type SharedModel = Arc<std::sync::Mutex<fastembed::TextEmbedding>>;

/// In-process embedding with a pinned fastembed model.
#[cfg(feature = "local-embeddings")]
pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: tokio::sync::OnceCell<SharedModel>,
}

#[cfg(feature = "local-embeddings")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        // Reject unknown names before any download is attempted.
        fastembed_model(&config.model)?;
        let dims = match (config.dims, known_local_dims(&config.model)) {
            (Some(configured), Some(known)) if configured != known => {
                return Err(RagError::Configuration(format!(
                    "embedding.dims = {} but local model '{}' produces {}",
                    configured, config.model, known
                ))
                .into())
            }
            (Some(d), _) | (None, Some(d)) => d,
            (None, None) => bail!("embedding.dims required for local model '{}'", config.model),
        };
        Ok(Self {
            model_name: config.model.clone(),
            dims,
            batch_size: config.batch_size,
            model: tokio::sync::OnceCell::new(),
        })
    }

    async fn model(&self) -> Result<SharedModel> {
        let kind = fastembed_model(&self.model_name)?;
        let name = self.model_name.clone();
        self.model
            .get_or_try_init(|| async move {
                debug!(model = %name, "loading local embedding model");
                tokio::task::spawn_blocking(move || {
                    fastembed::TextEmbedding::try_new(
                        fastembed::InitOptions::new(kind).with_show_download_progress(true),
                    )
                    .map(|m| Arc::new(std::sync::Mutex::new(m)))
                    .map_err(|e| {
                        provider_error("local", format!("failed to initialize model: {}", e))
                    })
                })
                .await
                .map_err(|e| provider_error("local", e))?
            })
            .await
            .cloned()
    }
}

#[cfg(feature = "local-embeddings")]
fn fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    use fastembed::EmbeddingModel as M;
    Ok(match name {
        "all-minilm-l6-v2" => M::AllMiniLML6V2,
        "bge-small-en-v1.5" => M::BGESmallENV15,
        "bge-base-en-v1.5" => M::BGEBaseENV15,
        "bge-large-en-v1.5" => M::BGELargeENV15,
        "nomic-embed-text-v1" => M::NomicEmbedTextV1,
        "nomic-embed-text-v1.5" => M::NomicEmbedTextV15,
        "multilingual-e5-small" => M::MultilingualE5Small,
        "multilingual-e5-base" => M::MultilingualE5Base,
        "multilingual-e5-large" => M::MultilingualE5Large,
        other => {
            return Err(RagError::Configuration(format!(
                "Unknown local embedding model: '{}'. Supported models: \
                 all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
                 nomic-embed-text-v1, nomic-embed-text-v1.5, \
                 multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
                other
            )))
        }
    })
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.model().await?;
        let batch = texts.to_vec();
        let batch_size = self.batch_size;

        let vectors = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| provider_error("local", "embedding model lock poisoned"))?;
            model
                .embed(batch, Some(batch_size))
                .map_err(|e| provider_error("local", e))
        })
        .await
        .map_err(|e| provider_error("local", e))??;

        check_vectors(self, texts.len(), &vectors)?;
        Ok(vectors)
    }
}

// ============ HTTP providers ============

/// Settings shared by the HTTP providers.
struct HttpSettings {
    client: reqwest::Client,
    max_retries: u32,
    batch_size: usize,
}

impl HttpSettings {
    fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            max_retries: config.max_retries,
            batch_size: config.batch_size.max(1),
        })
    }

    /// POST `body` and return the JSON response, retrying transient failures.
    async fn post_json(
        &self,
        provider: &str,
        url: &str,
        bearer: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                warn!(provider, attempt, delay_secs = delay.as_secs(), "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(url).json(body);
            if let Some(key) = bearer {
                request = request.bearer_auth(key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json()
                            .await
                            .map_err(|e| provider_error(provider, format!("invalid JSON: {}", e)));
                    }
                    let body_text = response.text().await.unwrap_or_default();
                    let err = provider_error(provider, format!("API error {}: {}", status, body_text));
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    last_err = Some(provider_error(
                        provider,
                        format!("request to {} failed: {}", url, e),
                    ));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| provider_error(provider, "embedding failed after retries")))
    }
}

fn parse_vector(value: &serde_json::Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

/// `data[].embedding` ordered by `data[].index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| provider_error("openai", "response is missing the data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let vector = item
            .get("embedding")
            .and_then(parse_vector)
            .ok_or_else(|| provider_error("openai", "response item has no numeric embedding"))?;
        indexed.push((index, vector));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| provider_error("ollama", "response is missing the embeddings array"))?
        .iter()
        .map(|e| {
            parse_vector(e).ok_or_else(|| provider_error("ollama", "embedding is not a numeric array"))
        })
        .collect()
}

/// OpenAI embeddings API. Requires `OPENAI_API_KEY`.
pub struct OpenAIEmbedder {
    model: String,
    dims: usize,
    api_key: String,
    http: HttpSettings,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                RagError::Configuration(
                    "OPENAI_API_KEY is not set; the openai embedding provider needs it".into(),
                )
            })?;
        Ok(Self {
            model: config.model.clone(),
            dims,
            api_key,
            http: HttpSettings::new(config)?,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.http.batch_size) {
            let body = serde_json::json!({ "model": self.model, "input": batch });
            let json = self
                .http
                .post_json("openai", OPENAI_EMBEDDINGS_URL, Some(&self.api_key), &body)
                .await?;
            let vectors = parse_openai_response(&json)?;
            check_vectors(self, batch.len(), &vectors)?;
            out.extend(vectors);
        }
        Ok(out)
    }
}

/// Embeddings from a local Ollama instance.
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    http: HttpSettings,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string());
        Ok(Self {
            model: config.model.clone(),
            dims,
            url: url.trim_end_matches('/').to_string(),
            http: HttpSettings::new(config)?,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let endpoint = format!("{}/api/embed", self.url);
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.http.batch_size) {
            let body = serde_json::json!({ "model": self.model, "input": batch });
            let json = self.http.post_json("ollama", &endpoint, None, &body).await?;
            let vectors = parse_ollama_response(&json)?;
            check_vectors(self, batch.len(), &vectors)?;
            out.extend(vectors);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_openai_response_reordered_by_index() {
        let json = json!({
            "data": [
                { "index": 1, "embedding": [0.5, 0.5] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.5, 0.5]]);
    }

    #[test]
    fn test_openai_response_missing_data() {
        let err = parse_openai_response(&json!({ "error": "nope" })).unwrap_err();
        assert!(matches!(err, RagError::Embedding { .. }));
    }

    #[test]
    fn test_ollama_response() {
        let json = json!({ "embeddings": [[0.1, 0.2], [0.3, 0.4]] });
        assert_eq!(parse_ollama_response(&json).unwrap().len(), 2);
        assert!(parse_ollama_response(&json!({ "embeddings": [["x"]] })).is_err());
    }

    #[test]
    fn test_known_dims() {
        assert_eq!(known_local_dims("all-minilm-l6-v2"), Some(384));
        assert_eq!(known_local_dims("bge-large-en-v1.5"), Some(1024));
        assert_eq!(known_local_dims("mystery"), None);
    }

    #[test]
    fn test_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "carrier-pigeon".into(),
            ..EmbeddingConfig::default()
        };
        assert!(create_embedder(&config).is_err());
    }

    #[test]
    fn test_ollama_requires_dims() {
        let config = EmbeddingConfig {
            provider: "ollama".into(),
            model: "nomic-embed-text".into(),
            ..EmbeddingConfig::default()
        };
        assert!(OllamaEmbedder::new(&config).is_err());
        let config = EmbeddingConfig {
            dims: Some(768),
            ..config
        };
        let e = OllamaEmbedder::new(&config).unwrap();
        assert_eq!(e.dims(), 768);
        assert_eq!(e.url, OLLAMA_DEFAULT_URL);
    }

    #[cfg(feature = "local-embeddings")]
    #[test]
    fn test_local_dims_mismatch_rejected() {
        let config = EmbeddingConfig {
            dims: Some(512),
            ..EmbeddingConfig::default()
        };
        let err = LocalEmbedder::new(&config).err().unwrap();
        assert!(err.to_string().contains("384"));
    }

    #[cfg(feature = "local-embeddings")]
    #[test]
    fn test_local_unknown_model_rejected() {
        let config = EmbeddingConfig {
            model: "definitely-not-a-model".into(),
            ..EmbeddingConfig::default()
        };
        assert!(LocalEmbedder::new(&config).is_err());
    }
}

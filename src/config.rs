//! TOML configuration, environment overrides, and credentials.
//!
//! Every section is optional; the defaults describe the stock deployment
//! (PDF guides under `data/documents`, a local `all-minilm-l6-v2` embedder,
//! Gemini for generation). After the file is parsed, a handful of
//! environment variables may override individual values:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `CONSULT_INDEX_PATH` | `[index].path` |
//! | `EMBEDDING_MODEL` | `[embedding].model` |
//! | `LLM_MODEL` | `[generation].model` |
//!
//! Credentials are never read from the file. See [`Credentials::from_env`].

use anyhow::{Context, Result};
use rag_consultant_core::chunk::ChunkParams;
use rag_consultant_core::prompt::{PromptTemplate, DEFAULT_PERSONA, DEFAULT_TEMPLATE};
use rag_consultant_core::store::Metric;
use rag_consultant_core::RagError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "./config/consult.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("data/index.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    #[serde(default = "default_documents_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            root: default_documents_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_documents_root() -> PathBuf {
    PathBuf::from("data/documents")
}

fn default_include_globs() -> Vec<String> {
    ["pdf", "docx", "pptx", "xlsx", "md", "txt"]
        .iter()
        .map(|ext| format!("**/*.{}", ext))
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> Result<ChunkParams, RagError> {
        ChunkParams::new(self.chunk_size, self.chunk_overlap)
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Required for `openai` and `ollama`; known local models fill it in.
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Ollama base URL.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_embedding_model() -> String {
    "all-minilm-l6-v2".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub metric: Metric,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            metric: Metric::default(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL override, e.g. an OpenAI-compatible gateway.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            temperature: default_temperature(),
            timeout_secs: default_generation_timeout_secs(),
            url: None,
        }
    }
}

impl GenerationConfig {
    /// Environment variable holding the API key for this provider.
    pub fn api_key_var(&self) -> &'static str {
        match self.provider.as_str() {
            "openai" => "OPENAI_API_KEY",
            _ => "GOOGLE_API_KEY",
        }
    }
}

fn default_generation_provider() -> String {
    "gemini".to_string()
}
fn default_generation_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_generation_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PromptConfig {
    /// Who the assistant claims to be.
    #[serde(default)]
    pub persona: Option<String>,
    /// Full instruction template; must contain `{context}` and `{question}`.
    #[serde(default)]
    pub template: Option<String>,
}

impl PromptConfig {
    pub fn template(&self) -> Result<PromptTemplate, RagError> {
        PromptTemplate::with_persona(
            self.template.as_deref().unwrap_or(DEFAULT_TEMPLATE),
            self.persona.as_deref().unwrap_or(DEFAULT_PERSONA),
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

/// Load configuration.
///
/// With `path = None` the default location is used if it exists, otherwise
/// built-in defaults apply. An explicit path must exist. Environment
/// overrides are applied before validation.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(p) => parse_file(p)?,
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                parse_file(default)?
            } else {
                tracing::debug!("no config file at {}, using defaults", DEFAULT_CONFIG_PATH);
                Config::default()
            }
        }
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

fn parse_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Apply environment overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(path) = set("CONSULT_INDEX_PATH") {
        config.index.path = PathBuf::from(path);
    }
    if let Some(model) = set("EMBEDDING_MODEL") {
        config.embedding.model = model;
    }
    if let Some(model) = set("LLM_MODEL") {
        config.generation.model = model;
    }
}

fn invalid(message: impl Into<String>) -> anyhow::Error {
    RagError::Configuration(message.into()).into()
}

/// Fail-fast checks. Every error is a [`RagError::Configuration`].
pub fn validate(config: &Config) -> Result<()> {
    config.chunking.params()?;

    if config.retrieval.top_k < 1 {
        return Err(invalid("retrieval.top_k must be >= 1"));
    }

    if !(0.0..=2.0).contains(&config.generation.temperature) {
        return Err(invalid("generation.temperature must be in [0.0, 2.0]"));
    }

    match config.embedding.provider.as_str() {
        "local" => {}
        "openai" | "ollama" => {
            if config.embedding.dims.unwrap_or(0) == 0 {
                return Err(invalid(format!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                )));
            }
        }
        other => {
            return Err(invalid(format!(
                "Unknown embedding provider: '{}'. Must be local, openai, or ollama.",
                other
            )))
        }
    }

    if config.embedding.batch_size == 0 {
        return Err(invalid("embedding.batch_size must be > 0"));
    }

    match config.generation.provider.as_str() {
        "gemini" | "openai" => {}
        other => {
            return Err(invalid(format!(
                "Unknown generation provider: '{}'. Must be gemini or openai.",
                other
            )))
        }
    }

    config.prompt.template()?;
    Ok(())
}

/// Secrets resolved from the environment at startup.
#[derive(Clone)]
pub struct Credentials {
    pub generation_api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("generation_api_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Resolve the generator API key.
    ///
    /// # Errors
    ///
    /// [`RagError::Configuration`] naming the missing variable. No query can
    /// be served without it, so callers treat this as fatal.
    pub fn from_env(generation: &GenerationConfig) -> Result<Self, RagError> {
        Self::from_lookup(generation, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(generation: &GenerationConfig, lookup: F) -> Result<Self, RagError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = generation.api_key_var();
        match lookup(var).filter(|v| !v.trim().is_empty()) {
            Some(key) => Ok(Self {
                generation_api_key: key,
            }),
            None => Err(RagError::Configuration(format!(
                "{} is not set; the '{}' generator cannot be used without it",
                var, generation.provider
            ))),
        }
    }
}

//! Text generator abstraction.
//!
//! A [`Generator`] turns a fully assembled prompt into answer text. Concrete
//! backends (Gemini, OpenAI-compatible chat) live in the app crate.

use async_trait::async_trait;
use serde::Serialize;

/// Model selection for a generator backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationSettings {
    pub model: String,
    /// Sampling temperature; low values keep answers close to the context.
    pub temperature: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            temperature: 0.1,
        }
    }
}

/// A hosted or local language model.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Model identifier used for logging and error reports.
    fn model_name(&self) -> &str;

    /// Produce answer text for `prompt`.
    ///
    /// Fails with [`RagError::Generation`](crate::RagError::Generation) on
    /// provider errors, timeouts, or an empty completion.
    async fn generate(&self, prompt: &str) -> crate::Result<String>;
}

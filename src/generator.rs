//! Hosted language model backends.
//!
//! Both backends send the rendered prompt verbatim as a single user message
//! at the configured temperature and return the completion text unmodified.
//! Failures are not retried: a provider error, a timeout, or an empty
//! completion becomes [`RagError::Generation`] and is shown to the user.

use async_trait::async_trait;
use rag_consultant_core::generate::{GenerationSettings, Generator};
use rag_consultant_core::{RagError, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{Credentials, GenerationConfig};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Build the generator named by `config.provider`.
pub fn create_generator(
    config: &GenerationConfig,
    credentials: &Credentials,
) -> anyhow::Result<Arc<dyn Generator>> {
    let settings = GenerationSettings {
        model: config.model.clone(),
        temperature: config.temperature,
    };
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    let key = credentials.generation_api_key.clone();

    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiGenerator {
            settings,
            base_url: base_url(config, GEMINI_BASE_URL),
            api_key: key,
            client,
        })),
        "openai" => Ok(Arc::new(OpenAIGenerator {
            settings,
            base_url: base_url(config, OPENAI_BASE_URL),
            api_key: key,
            client,
        })),
        other => anyhow::bail!("Unknown generation provider: {}", other),
    }
}

fn base_url(config: &GenerationConfig, default: &str) -> String {
    config
        .url
        .as_deref()
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

fn failure(provider: &str, message: impl std::fmt::Display) -> RagError {
    RagError::Generation {
        provider: provider.to_string(),
        message: message.to_string(),
    }
}

/// POST `body`, returning the JSON response of a 2xx reply.
async fn post(
    provider: &str,
    request: reqwest::RequestBuilder,
    body: &Value,
) -> Result<Value> {
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| failure(provider, format!("request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(failure(provider, format!("API error {}: {}", status, text)));
    }
    response
        .json()
        .await
        .map_err(|e| failure(provider, format!("invalid JSON: {}", e)))
}

fn non_empty(provider: &str, text: String) -> Result<String> {
    if text.trim().is_empty() {
        return Err(failure(provider, "model returned an empty answer"));
    }
    Ok(text)
}

// ============ Gemini ============

/// Google Gemini `generateContent`.
pub struct GeminiGenerator {
    settings: GenerationSettings,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

fn gemini_body(prompt: &str, temperature: f32) -> Value {
    json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        "generationConfig": { "temperature": temperature }
    })
}

/// Concatenated text parts of the first candidate.
fn parse_gemini_response(json: &Value) -> Result<String> {
    if let Some(reason) = json
        .pointer("/promptFeedback/blockReason")
        .and_then(Value::as_str)
    {
        return Err(failure("gemini", format!("prompt blocked: {}", reason)));
    }

    let candidate = json
        .pointer("/candidates/0")
        .ok_or_else(|| failure("gemini", "response has no candidates"))?;
    let text: String = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate
            .get("finishReason")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        return Err(failure(
            "gemini",
            format!("model returned an empty answer (finish reason: {})", reason),
        ));
    }
    Ok(text)
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.settings.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, self.settings.model
        );
        debug!(model = %self.settings.model, prompt_chars = prompt.len(), "calling gemini");
        let request = self.client.post(&url).header("x-goog-api-key", &self.api_key);
        let json = post(
            "gemini",
            request,
            &gemini_body(prompt, self.settings.temperature),
        )
        .await?;
        parse_gemini_response(&json)
    }
}

// ============ OpenAI-compatible chat ============

/// OpenAI `chat/completions` (or any compatible gateway via `url`).
pub struct OpenAIGenerator {
    settings: GenerationSettings,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

fn openai_body(model: &str, prompt: &str, temperature: f32) -> Value {
    json!({
        "model": model,
        "messages": [{ "role": "user", "content": prompt }],
        "temperature": temperature
    })
}

fn parse_openai_response(json: &Value) -> Result<String> {
    let text = json
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| failure("openai", "response has no message content"))?;
    non_empty("openai", text.to_string())
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.settings.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.settings.model, prompt_chars = prompt.len(), "calling openai");
        let request = self.client.post(&url).bearer_auth(&self.api_key);
        let json = post(
            "openai",
            request,
            &openai_body(&self.settings.model, prompt, self.settings.temperature),
        )
        .await?;
        parse_openai_response(&json)
    }
}

//! OpenRouter client.
//!
//! OpenRouter is OpenAI-compatible but asks callers to identify
//! themselves with `HTTP-Referer` and `X-Title` headers.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::openai_compat::{DEFAULT_TIMEOUT, ModelEntry, OpenAiCompatClient};
use crate::traits::LlmClient;
use crate::types::{Completion, GenerationParams, Message};
use crate::Result;

/// Default API base URL.
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Environment variable holding the API key.
pub const OPENROUTER_API_KEY_ENV: &str = "OPENROUTER_API_KEY";

pub const DEFAULT_REFERER: &str = "http://localhost:3000";
pub const DEFAULT_APP_NAME: &str = "Slipstream Analyzer";

/// Models offered by [`OpenRouterClient::list_models_or_default`] when the
/// `/models` listing is unavailable.
pub const DEFAULT_MODELS: &[&str] = &[
    "cohere/command-r-plus-08-2024",
    "cohere/command-a",
    "openai/gpt-4o",
    "openai/gpt-4o-mini",
    "openai/gpt-3.5-turbo",
    "anthropic/claude-3-opus-20240229",
    "anthropic/claude-3-sonnet-20240229",
    "google/gemini-pro",
];

/// Approximate USD prices per 1K tokens: (model, input, output).
const PRICE_TABLE: &[(&str, f64, f64)] = &[
    ("cohere/command-r-plus-08-2024", 0.003, 0.015),
    ("cohere/command-a", 0.002, 0.010),
    ("openai/gpt-4o", 0.005, 0.015),
    ("openai/gpt-4o-mini", 0.000_15, 0.000_6),
    ("openai/gpt-3.5-turbo", 0.000_5, 0.001_5),
    ("anthropic/claude-3-opus-20240229", 0.015, 0.075),
    ("anthropic/claude-3-sonnet-20240229", 0.003, 0.015),
    ("google/gemini-pro", 0.000_125, 0.000_375),
];

/// Per-1K rates for models missing from the table.
const DEFAULT_PRICE: (f64, f64) = (0.002, 0.006);

/// Connection settings for [`OpenRouterClient`].
#[derive(Debug, Clone)]
pub struct OpenRouterOptions {
    pub base_url: String,
    pub referer: String,
    pub app_name: String,
    pub timeout: Duration,
}

impl Default for OpenRouterOptions {
    fn default() -> Self {
        Self {
            base_url: OPENROUTER_BASE_URL.to_string(),
            referer: DEFAULT_REFERER.to_string(),
            app_name: DEFAULT_APP_NAME.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Client for the OpenRouter API.
#[derive(Clone)]
pub struct OpenRouterClient {
    inner: OpenAiCompatClient,
}

impl OpenRouterClient {
    /// Create a client with default options.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_options(api_key, &OpenRouterOptions::default())
    }

    pub fn with_options(api_key: impl Into<String>, options: &OpenRouterOptions) -> Result<Self> {
        let inner =
            OpenAiCompatClient::new("openrouter", api_key, &options.base_url, options.timeout)?
                .with_header("HTTP-Referer", &options.referer)?
                .with_header("X-Title", &options.app_name)?;
        Ok(Self { inner })
    }

    /// Models available through OpenRouter, with pricing when reported.
    pub async fn list_models(&self) -> Result<Vec<ModelEntry>> {
        self.inner.list_models().await
    }

    /// Like [`list_models`](Self::list_models), but falls back to
    /// [`DEFAULT_MODELS`] (without pricing) when the listing fails.
    pub async fn list_models_or_default(&self) -> Vec<ModelEntry> {
        match self.list_models().await {
            Ok(models) => models,
            Err(e) => {
                warn!(error = %e, "model listing unavailable, using defaults");
                DEFAULT_MODELS
                    .iter()
                    .map(|id| ModelEntry {
                        id: (*id).to_string(),
                        name: None,
                        context_length: None,
                        pricing: None,
                    })
                    .collect()
            }
        }
    }
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    fn name(&self) -> &str {
        "openrouter"
    }

    fn cache_tag(&self) -> Option<String> {
        self.inner.cache_tag()
    }

    async fn complete(
        &self,
        messages: &[Message],
        model: &str,
        params: &GenerationParams,
    ) -> Result<Completion> {
        self.inner.complete(messages, model, params).await
    }
}

/// Rough USD cost of a request from the static price table.
pub fn estimate_cost(model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
    let (input, output) = PRICE_TABLE
        .iter()
        .find(|(name, _, _)| *name == model)
        .map(|&(_, input, output)| (input, output))
        .unwrap_or(DEFAULT_PRICE);
    f64::from(input_tokens) / 1000.0 * input + f64::from(output_tokens) / 1000.0 * output
}

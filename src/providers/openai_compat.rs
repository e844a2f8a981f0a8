//! OpenAI-compatible chat completions client.
//!
//! Both routing services this crate talks to (Martian, OpenRouter) expose
//! the OpenAI `/chat/completions` and `/models` endpoints, so one client
//! handles the wire format; the provider modules only add base URLs,
//! headers and extra body fields.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::traits::LlmClient;
use crate::types::{Completion, GenerationParams, Message, Usage};
use crate::{Result, SlipstreamError};

/// Default client-level request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for any OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct OpenAiCompatClient {
    name: String,
    api_key: String,
    base_url: String,
    http: Client,
    headers: HeaderMap,
    extra_body: Option<Map<String, Value>>,
}

impl OpenAiCompatClient {
    /// Create a client named `name` for `base_url` (without trailing
    /// `/chat/completions`).
    pub fn new(
        name: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build().map_err(|e| {
            SlipstreamError::Configuration(format!("failed to build HTTP client: {e}"))
        })?;

        Ok(Self {
            name: name.into(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            headers: HeaderMap::new(),
            extra_body: None,
        })
    }

    /// Add a header sent with every request.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| SlipstreamError::Configuration(format!("invalid header name: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| SlipstreamError::Configuration(format!("invalid header value: {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Merge `extra` (a JSON object) into every request body.
    ///
    /// Keys must not repeat the standard fields (`model`, `messages`,
    /// sampling parameters).
    pub fn with_extra_body(mut self, extra: Value) -> Result<Self> {
        match extra {
            Value::Object(map) => {
                self.extra_body = Some(map);
                Ok(self)
            }
            other => Err(SlipstreamError::InvalidInput(format!(
                "extra body must be a JSON object, got {other}"
            ))),
        }
    }

    /// Same client pointed at a different base URL.
    pub fn with_base_url(&self, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..self.clone()
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List the models the endpoint advertises (`GET /models`).
    pub async fn list_models(&self) -> Result<Vec<ModelEntry>> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .headers(self.headers.clone())
            .send()
            .await?;
        let response = check_status(response, "models").await?;
        let body: ModelsResponse = response.json().await?;
        Ok(body.data)
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    /// The extra body, as JSON, when one is set.
    fn cache_tag(&self) -> Option<String> {
        self.extra_body
            .as_ref()
            .and_then(|extra| serde_json::to_string(extra).ok())
    }

    async fn complete(
        &self,
        messages: &[Message],
        model: &str,
        params: &GenerationParams,
    ) -> Result<Completion> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            top_p: params.top_p,
            extra: self.extra_body.as_ref(),
        };

        let start = Instant::now();
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .headers(self.headers.clone())
            .json(&request)
            .send()
            .await?;
        let response = check_status(response, model).await?;
        let body: ChatResponseBody = response.json().await?;
        debug!(
            provider = %self.name,
            model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "chat completion received"
        );

        into_completion(body, model)
    }
}

/// Map a non-success status to the matching error.
async fn check_status(response: Response, model: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();

    Err(match status.as_u16() {
        401 | 403 => SlipstreamError::AuthenticationFailed,
        404 => SlipstreamError::ModelNotFound(model.to_string()),
        429 => SlipstreamError::RateLimited { retry_after },
        code => SlipstreamError::Api {
            status: code,
            message: error_message(&body).unwrap_or_else(|| status.to_string()),
        },
    })
}

/// Pull a readable message out of an error body.
///
/// Handles `{"error": {"message": ...}}`, `{"error": "..."}` and plain text.
fn error_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return Some(body.to_string());
    };
    match json.get("error") {
        Some(Value::String(msg)) => Some(msg.clone()),
        Some(err) => err
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some(err.to_string())),
        None => Some(body.to_string()),
    }
}

fn into_completion(body: ChatResponseBody, requested: &str) -> Result<Completion> {
    let text = body
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or(SlipstreamError::EmptyResponse)?;

    Ok(Completion {
        text,
        model: requested.to_string(),
        actual_model: body
            .model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| requested.to_string()),
        usage: body.usage,
        cost: body.cost,
    })
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    extra: Option<&'a Map<String, Value>>,
}

#[derive(Deserialize)]
struct ChatResponseBody {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    cost: Option<f64>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// `/models` list response.
#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

/// A single model advertised by an endpoint.
///
/// Only `id` is guaranteed; OpenRouter also fills in context length and
/// per-token pricing (string-encoded decimals).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<ModelPricing>,
}

/// Per-token prices as reported by the endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelPricing {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub completion: Option<String>,
}

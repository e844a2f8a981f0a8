//! Martian model router client.
//!
//! Martian serves direct model names from its v2 gateway and automatic
//! routing (`model = "router"`) from the v1 endpoint. Router requests may
//! carry a `router_constraint` extra body built by [`routing_constraint`].

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::openai_compat::{DEFAULT_TIMEOUT, OpenAiCompatClient};
use crate::traits::LlmClient;
use crate::types::{Completion, GenerationParams, Message};
use crate::Result;

/// Default gateway base URL.
pub const MARTIAN_BASE_URL: &str = "https://withmartian.com/api/openai/v2";

/// Environment variable holding the API key.
pub const MARTIAN_API_KEY_ENV: &str = "MARTIAN_API_KEY";

/// Model name that asks Martian to pick the model.
pub const ROUTER_MODEL: &str = "router";

/// Client for the Martian gateway and router.
#[derive(Clone)]
pub struct MartianClient {
    gateway: OpenAiCompatClient,
    router: OpenAiCompatClient,
}

impl MartianClient {
    /// Create a client against the public gateway.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, MARTIAN_BASE_URL, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    ///
    /// When `base_url` contains `/v2`, router requests go to the same URL
    /// with `/v1` instead.
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let gateway = OpenAiCompatClient::new("martian", api_key, base_url, timeout)?;
        let router = if base_url.contains("/v2") {
            gateway.with_base_url(base_url.replace("/v2", "/v1"))
        } else {
            gateway.clone()
        };
        Ok(Self { gateway, router })
    }

    /// Attach a router constraint (see [`routing_constraint`]) to every
    /// request.
    pub fn with_routing_constraint(self, constraint: Value) -> Result<Self> {
        Ok(Self {
            gateway: self.gateway.with_extra_body(constraint.clone())?,
            router: self.router.with_extra_body(constraint)?,
        })
    }

    /// Base URL used for `model`.
    pub fn endpoint_for(&self, model: &str) -> &str {
        self.client_for(model).base_url()
    }

    /// Model identifiers the gateway advertises.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let models = self.gateway.list_models().await?;
        Ok(models.into_iter().map(|m| m.id).collect())
    }

    fn client_for(&self, model: &str) -> &OpenAiCompatClient {
        if model == ROUTER_MODEL {
            &self.router
        } else {
            &self.gateway
        }
    }
}

#[async_trait]
impl LlmClient for MartianClient {
    fn name(&self) -> &str {
        "martian"
    }

    fn cache_tag(&self) -> Option<String> {
        self.gateway.cache_tag()
    }

    async fn complete(
        &self,
        messages: &[Message],
        model: &str,
        params: &GenerationParams,
    ) -> Result<Completion> {
        self.client_for(model).complete(messages, model, params).await
    }
}

/// Build the router constraint extra body.
///
/// A cost limit takes precedence over a quality target; with neither,
/// there is no constraint.
pub fn routing_constraint(cost_limit: Option<f64>, quality_target: Option<f64>) -> Option<Value> {
    let (kind, value) = match (cost_limit, quality_target) {
        (Some(cost), _) => ("cost_constraint", cost),
        (None, Some(quality)) => ("quality_constraint", quality),
        (None, None) => return None,
    };
    Some(json!({
        "router_constraint": {
            kind: { "value": { "numeric_value": value } }
        }
    }))
}

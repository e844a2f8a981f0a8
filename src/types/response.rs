//! Completion response types

use serde::{Deserialize, Serialize};

/// A successful chat completion.
///
/// This is also the persisted cache value, so field names follow the
/// on-disk layout (`response`, `model`, `actual_model`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// Generated text.
    #[serde(rename = "response")]
    pub text: String,
    /// Model identifier that was requested.
    pub model: String,
    /// Model that actually served the request (differs under routing).
    pub actual_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Provider-reported cost in USD, when the provider returns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

impl Completion {
    /// Whether a router picked a different model than the one requested.
    pub fn was_rerouted(&self) -> bool {
        self.model != self.actual_model
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

//! Slipstream error types

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Slipstream error types
#[derive(Debug, thiserror::Error)]
pub enum SlipstreamError {
    // Provider/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("empty response from model")]
    EmptyResponse,

    /// A success status whose body could not be decoded.
    #[error("invalid response body: {0}")]
    InvalidResponse(String),

    // Request errors
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    // Cache errors
    /// A cache file exists but could not be decoded.
    #[error("corrupt cache entry {digest}: {reason}")]
    CacheCorrupt { digest: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Configuration errors
    #[error("no provider configured")]
    NoProvider,

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Coarse failure class recorded for a failed unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Expected to resolve on retry (service unavailable, rate limit, network).
    Transient,
    /// Retry cannot help (bad request, auth, unknown model).
    Permanent,
    /// A transient failure that persisted through every allowed attempt.
    Exhausted,
}

impl SlipstreamError {
    /// Whether retrying the same request may succeed.
    ///
    /// Transport failures, rate limiting and 5xx gateway statuses
    /// (500, 502, 503, 504) are transient. Everything else is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            SlipstreamError::Http(_) | SlipstreamError::RateLimited { .. } => true,
            SlipstreamError::Api { status, .. } => matches!(status, 500 | 502 | 503 | 504),
            _ => false,
        }
    }

    /// Server-provided delay hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SlipstreamError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Classify this error for per-unit diagnostics.
    pub fn kind(&self) -> FailureKind {
        if self.is_transient() {
            FailureKind::Transient
        } else {
            FailureKind::Permanent
        }
    }
}

impl From<reqwest::Error> for SlipstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SlipstreamError::InvalidResponse(err.to_string())
        } else {
            SlipstreamError::Http(err.to_string())
        }
    }
}

/// Result type alias for Slipstream operations
pub type Result<T> = std::result::Result<T, SlipstreamError>;

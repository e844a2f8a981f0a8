//! Core LlmClient trait

use async_trait::async_trait;

use crate::Result;
use crate::types::{Completion, GenerationParams, Message};

/// A chat completion backend.
///
/// Implementations return [`Completion`] on success. Failures are
/// [`SlipstreamError`](crate::SlipstreamError) values whose
/// [`is_transient()`](crate::SlipstreamError::is_transient) classification
/// drives retry in the dispatcher; clients themselves never retry.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Client name, used to select it from a descriptor and in logs/metrics.
    fn name(&self) -> &str;

    /// Client state besides the descriptor that changes responses, such as
    /// a routing constraint sent in every request body.
    ///
    /// Folded into the cache key so differently configured clients never
    /// share entries. `None` when responses depend on the descriptor alone.
    fn cache_tag(&self) -> Option<String> {
        None
    }

    /// Send one chat completion request.
    async fn complete(
        &self,
        messages: &[Message],
        model: &str,
        params: &GenerationParams,
    ) -> Result<Completion>;
}

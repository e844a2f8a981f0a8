//! Request descriptors: the unit of work submitted to the dispatcher.

use serde::{Deserialize, Serialize};

use super::message::Message;
use super::options::GenerationParams;

/// Everything that determines a single request's response.
///
/// A descriptor is both the input to [`key_for`](crate::cache::key_for)
/// and the unit of work handed to
/// [`Dispatcher::dispatch`](crate::dispatch::Dispatcher::dispatch).
/// Two descriptors that differ in any field are distinct requests.
///
/// ```rust
/// # use slipstream::RequestDescriptor;
/// let d = RequestDescriptor::new("Summarize the details.", "gpt-4o-mini")
///     .system("Answer in one sentence.")
///     .payload("What are the three branches of government?")
///     .run("run_0")
///     .index(3);
/// assert_eq!(d.messages().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    /// Main prompt text.
    pub prompt: String,
    /// Optional system prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Auxiliary text appended to the user message (e.g. a secondary question).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// Target model identifier (or router name).
    pub model: String,
    /// Client to send this request through; the dispatcher default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Experiment or run tag, used to keep repeated runs apart and to
    /// selectively clear cached entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
    /// Repetition index within a run.
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub params: GenerationParams,
}

impl RequestDescriptor {
    /// Create a descriptor for `prompt` against `model`, index 0.
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            payload: None,
            model: model.into(),
            provider: None,
            run: None,
            index: 0,
            params: GenerationParams::default(),
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn run(mut self, run: impl Into<String>) -> Self {
        self.run = Some(run.into());
        self
    }

    pub fn index(mut self, index: u32) -> Self {
        self.index = index;
        self
    }

    pub fn params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// Expand into `n` descriptors with indices `0..n`.
    ///
    /// Repeated sampling of one prompt is the common case: each copy gets
    /// its own index and therefore its own cache entry.
    pub fn repeat(&self, n: u32) -> Vec<RequestDescriptor> {
        (0..n).map(|i| self.clone().index(i)).collect()
    }

    /// Render the chat messages sent upstream.
    ///
    /// Optional system message first, then one user message with the
    /// payload appended after a blank line.
    pub fn messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system {
            messages.push(Message::system(system.as_str()));
        }
        let user = match &self.payload {
            Some(payload) => format!("{}\n\n{}", self.prompt, payload),
            None => self.prompt.clone(),
        };
        messages.push(Message::user(user));
        messages
    }
}

//! LLM client implementations and the retry policy applied around them.
//!
//! Every backend speaks the OpenAI chat completions dialect, so
//! [`OpenAiCompatClient`] carries the wire format and the Martian and
//! OpenRouter clients add their endpoint quirks on top.

pub mod martian;
pub mod openai_compat;
pub mod openrouter;
pub mod retry;

pub use martian::{MartianClient, routing_constraint};
pub use openai_compat::{ModelEntry, ModelPricing, OpenAiCompatClient};
pub use openrouter::{OpenRouterClient, OpenRouterOptions, estimate_cost};
pub use retry::{Backoff, RetryConfig, RetryOutcome, Sleeper, TokioSleeper, with_retry};

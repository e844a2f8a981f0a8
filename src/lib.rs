//! Slipstream - cached, bounded-parallel request harness for LLM routers
//!
//! This crate sends batches of chat requests to OpenAI-compatible routing
//! services (Martian, OpenRouter), memoizes every response on disk under a
//! digest of the request, and returns results in submission order.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use slipstream::{
//!     CacheConfig, Dispatcher, NoProgress, OpenRouterClient, RequestDescriptor, ResponseCache,
//! };
//!
//! #[tokio::main]
//! async fn main() -> slipstream::Result<()> {
//!     let cache = ResponseCache::open(&CacheConfig::new("_slipstream_cache")).await?;
//!     let dispatcher = Dispatcher::builder()
//!         .cache(Arc::new(cache))
//!         .client(Arc::new(OpenRouterClient::new("sk-or-your-key")?))
//!         .workers(4)
//!         .build()?;
//!
//!     let batch = RequestDescriptor::new("Summarize the text.", "openai/gpt-4o-mini")
//!         .payload("The three branches of government are ...")
//!         .run("run_0")
//!         .repeat(10);
//!
//!     let outcome = dispatcher.dispatch(&batch, &NoProgress).await;
//!     for completion in outcome.completions() {
//!         println!("{}: {}", completion.actual_model, completion.text);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
#[cfg(feature = "cli")]
pub mod config;
pub mod dispatch;
pub mod error;
pub mod providers;
pub mod stats;
pub mod telemetry;
pub mod traits;
pub mod types;

// Re-export main types at crate root
pub use cache::{
    CacheConfig, CacheDigest, CacheEntry, ResponseCache, key_for, key_for_route,
};
pub use dispatch::{
    BatchOutcome, Dispatcher, DispatcherBuilder, LogProgress, NoProgress, ProgressSink,
    ResponseSource, UnitOutcome, UnitSlot,
};
pub use error::{FailureKind, Result, SlipstreamError};
pub use providers::{
    Backoff, MartianClient, OpenAiCompatClient, OpenRouterClient, OpenRouterOptions, RetryConfig,
    Sleeper, TokioSleeper,
};
pub use traits::LlmClient;
pub use types::{Completion, GenerationParams, Message, RequestDescriptor, Role, Usage};

/// Crate version.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

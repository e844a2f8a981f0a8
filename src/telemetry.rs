//! Telemetry metric name constants.
//!
//! Consumers install their own `metrics` recorder (e.g. prometheus, statsd);
//! without a recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `slipstream_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `provider`: client name (e.g. "martian", "openrouter")
//! - `status`: "ok" or "error" for requests, "done" or "failed" for units
//! - `source`: where a completed unit's response came from: "upstream", "cache", "shared"
//! - `direction`: "prompt" or "completion"

/// Total upstream chat completion calls that reached a terminal result
/// (after retries).
///
/// Labels: `provider`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "slipstream_requests_total";

/// Upstream call duration in seconds, retries and backoff included.
///
/// Labels: `provider`.
pub const REQUEST_DURATION_SECONDS: &str = "slipstream_request_duration_seconds";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `provider`.
pub const RETRIES_TOTAL: &str = "slipstream_retries_total";

/// Total tokens consumed.
///
/// Labels: `provider`, `direction` ("prompt" | "completion").
pub const TOKENS_TOTAL: &str = "slipstream_tokens_total";

/// Total response cache hits.
pub const CACHE_HITS_TOTAL: &str = "slipstream_cache_hits_total";

/// Total response cache misses (absent or corrupt entries).
pub const CACHE_MISSES_TOTAL: &str = "slipstream_cache_misses_total";

/// Total dispatched units that reached a terminal state.
///
/// Labels: `status` ("done" | "failed"), plus `source` on done units.
pub const UNITS_TOTAL: &str = "slipstream_units_total";

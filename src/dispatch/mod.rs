//! Bounded-parallel, cache-first batch dispatch.
//!
//! [`Dispatcher::dispatch`] takes a slice of descriptors and returns a
//! [`BatchOutcome`] with one slot per descriptor, in submission order.
//!
//! Descriptors that hash to the same [`CacheDigest`] form a single unit of
//! work, so a batch never calls upstream twice for the same content. The
//! digest covers the provider a descriptor resolves to and that client's
//! cache tag. Units run as tokio tasks, at most `workers` at a time. Each
//! unit reads the cache, and on a miss calls its client under the retry
//! policy and writes the response back. A failed unit only empties its own
//! slots.

mod outcome;
mod progress;

pub use outcome::{BatchOutcome, ResponseSource, UnitOutcome, UnitSlot};
pub use progress::{LogProgress, NoProgress, ProgressSink};

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::cache::{CacheDigest, CacheEntry, ResponseCache, key_for_route};
use crate::error::FailureKind;
use crate::providers::retry::{RetryConfig, RetryOutcome, Sleeper, TokioSleeper, with_retry};
use crate::telemetry;
use crate::traits::LlmClient;
use crate::types::RequestDescriptor;
use crate::{Result, SlipstreamError};

/// Default number of units in flight.
pub const DEFAULT_WORKERS: usize = 8;

/// Runs batches of descriptors against the configured clients.
pub struct Dispatcher {
    cache: Arc<ResponseCache>,
    clients: HashMap<String, Arc<dyn LlmClient>>,
    default_provider: String,
    workers: usize,
    retry: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    cache: Option<Arc<ResponseCache>>,
    clients: HashMap<String, Arc<dyn LlmClient>>,
    first_client: Option<String>,
    default_provider: Option<String>,
    workers: usize,
    retry: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            cache: None,
            clients: HashMap::new(),
            first_client: None,
            default_provider: None,
            workers: DEFAULT_WORKERS,
            retry: RetryConfig::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Response cache consulted before every upstream call. Required.
    pub fn cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Register a client under its [`name`](LlmClient::name).
    ///
    /// The first client registered is the default unless
    /// [`default_provider`](Self::default_provider) says otherwise.
    pub fn client(mut self, client: Arc<dyn LlmClient>) -> Self {
        let name = client.name().to_string();
        if self.first_client.is_none() {
            self.first_client = Some(name.clone());
        }
        self.clients.insert(name, client);
        self
    }

    /// Client used by descriptors without a provider selector.
    pub fn default_provider(mut self, name: impl Into<String>) -> Self {
        self.default_provider = Some(name.into());
        self
    }

    /// Maximum number of units in flight. Default: 8.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the timer used between retries.
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn build(self) -> Result<Dispatcher> {
        let cache = self
            .cache
            .ok_or_else(|| SlipstreamError::Configuration("response cache not set".into()))?;
        if self.workers == 0 {
            return Err(SlipstreamError::Configuration(
                "worker limit must be at least 1".into(),
            ));
        }
        let default_provider = self
            .default_provider
            .or(self.first_client)
            .ok_or(SlipstreamError::NoProvider)?;
        if !self.clients.contains_key(&default_provider) {
            return Err(SlipstreamError::UnknownProvider(default_provider));
        }

        Ok(Dispatcher {
            cache,
            clients: self.clients,
            default_provider,
            workers: self.workers,
            retry: self.retry,
            sleeper: self.sleeper,
        })
    }
}

/// Descriptors sharing one digest: the first one is sent, the rest copy
/// its outcome.
struct Unit {
    lead: usize,
    members: Vec<usize>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// Provider `descriptor` is sent through.
    pub fn provider_for<'a>(&'a self, descriptor: &'a RequestDescriptor) -> &'a str {
        descriptor
            .provider
            .as_deref()
            .unwrap_or(&self.default_provider)
    }

    /// Cache digest of `descriptor` as this dispatcher would send it: keyed
    /// on the resolved provider and that client's cache tag.
    pub fn digest_for(&self, descriptor: &RequestDescriptor) -> CacheDigest {
        let provider = self.provider_for(descriptor);
        let tag = self
            .clients
            .get(provider)
            .and_then(|client| client.cache_tag());
        key_for_route(descriptor, provider, tag.as_deref())
    }

    /// Run every descriptor and collect the results by original index.
    ///
    /// Units are spawned onto the runtime, at most `workers` at a time, so
    /// on a multi-threaded runtime they run in parallel. Returns once every
    /// slot is terminal. Never fails as a whole: per-descriptor errors are
    /// recorded in their slots.
    pub async fn dispatch(
        &self,
        descriptors: &[RequestDescriptor],
        progress: &dyn ProgressSink,
    ) -> BatchOutcome {
        let total = descriptors.len();
        let digests: Vec<CacheDigest> = descriptors.iter().map(|d| self.digest_for(d)).collect();
        let units = group_by_digest(&digests);
        info!(
            total,
            distinct = units.len(),
            workers = self.workers,
            "dispatching batch"
        );

        let mut pending = units.into_iter();
        let mut running = JoinSet::new();
        let mut outcomes: Vec<Option<UnitOutcome>> = vec![None; total];
        let mut completed = 0;
        loop {
            while running.len() < self.workers {
                let Some(unit) = pending.next() else {
                    break;
                };
                let job = self.job(&descriptors[unit.lead], &digests[unit.lead]);
                running.spawn(async move {
                    let outcome = job.run().await;
                    (unit, outcome)
                });
            }

            let Some(joined) = running.join_next().await else {
                break;
            };
            let (unit, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    warn!(error = %e, "dispatch unit aborted");
                    continue;
                }
            };
            for &i in &unit.members {
                let slot_outcome = if i == unit.lead {
                    outcome.clone()
                } else {
                    outcome.shared()
                };
                record_unit(&slot_outcome);
                outcomes[i] = Some(slot_outcome);
                completed += 1;
                progress.advance(completed, total);
            }
        }

        let slots = digests
            .into_iter()
            .zip(outcomes)
            .enumerate()
            .map(|(index, (digest, outcome))| UnitSlot {
                index,
                digest,
                outcome: outcome.unwrap_or_else(|| UnitOutcome::Failed {
                    kind: FailureKind::Permanent,
                    message: "unit did not complete".into(),
                    attempts: 0,
                }),
            })
            .collect();

        let batch = BatchOutcome::from_slots(slots);
        progress.finish(batch.filled(), batch.absent());
        info!(
            filled = batch.filled(),
            absent = batch.absent(),
            "batch complete"
        );
        batch
    }

    fn job(&self, descriptor: &RequestDescriptor, digest: &CacheDigest) -> Job {
        let provider = self.provider_for(descriptor).to_string();
        Job {
            client: self.clients.get(&provider).cloned(),
            provider,
            descriptor: descriptor.clone(),
            digest: digest.clone(),
            cache: Arc::clone(&self.cache),
            retry: self.retry.clone(),
            sleeper: Arc::clone(&self.sleeper),
        }
    }
}

/// Everything one unit needs, owned so it can run as its own task.
struct Job {
    descriptor: RequestDescriptor,
    digest: CacheDigest,
    provider: String,
    client: Option<Arc<dyn LlmClient>>,
    cache: Arc<ResponseCache>,
    retry: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl Job {
    async fn run(self) -> UnitOutcome {
        let Job {
            descriptor,
            digest,
            provider,
            client,
            cache,
            retry,
            sleeper,
        } = self;

        if let Some(entry) = cache.get(&digest).await {
            return UnitOutcome::Done {
                completion: entry.completion,
                source: ResponseSource::Cache,
                attempts: 0,
            };
        }

        let Some(client) = client else {
            let err = SlipstreamError::UnknownProvider(provider);
            return failed(&digest, &err, 0);
        };

        let messages = descriptor.messages();
        let start = Instant::now();
        let RetryOutcome { result, attempts } =
            with_retry(&retry, sleeper.as_ref(), &provider, || {
                client.complete(&messages, &descriptor.model, &descriptor.params)
            })
            .await;
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS, "provider" => provider.clone())
            .record(start.elapsed().as_secs_f64());

        match result {
            Ok(completion) => {
                metrics::counter!(telemetry::REQUESTS_TOTAL, "provider" => provider.clone(), "status" => "ok")
                    .increment(1);
                if let Some(usage) = &completion.usage {
                    metrics::counter!(telemetry::TOKENS_TOTAL, "provider" => provider.clone(), "direction" => "prompt")
                        .increment(u64::from(usage.prompt_tokens));
                    metrics::counter!(telemetry::TOKENS_TOTAL, "provider" => provider.clone(), "direction" => "completion")
                        .increment(u64::from(usage.completion_tokens));
                }

                let entry = CacheEntry::new(completion, &descriptor);
                if let Err(e) = cache.put(&digest, &entry).await {
                    warn!(digest = digest.short(), error = %e, "failed to write cache entry");
                }
                UnitOutcome::Done {
                    completion: entry.completion,
                    source: ResponseSource::Upstream,
                    attempts,
                }
            }
            Err(e) => {
                metrics::counter!(telemetry::REQUESTS_TOTAL, "provider" => provider, "status" => "error")
                    .increment(1);
                failed(&digest, &e, attempts)
            }
        }
    }
}

/// Record a terminal failure. A transient error that reaches here has used
/// up its attempts and is reported as exhausted.
fn failed(digest: &CacheDigest, err: &SlipstreamError, attempts: u32) -> UnitOutcome {
    warn!(digest = digest.short(), attempts, error = %err, "unit failed");
    let kind = match err.kind() {
        FailureKind::Transient => FailureKind::Exhausted,
        kind => kind,
    };
    UnitOutcome::Failed {
        kind,
        message: err.to_string(),
        attempts,
    }
}

fn record_unit(outcome: &UnitOutcome) {
    match outcome {
        UnitOutcome::Done { source, .. } => {
            metrics::counter!(telemetry::UNITS_TOTAL, "status" => "done", "source" => source.as_str())
                .increment(1);
        }
        UnitOutcome::Failed { .. } => {
            metrics::counter!(telemetry::UNITS_TOTAL, "status" => "failed").increment(1);
        }
    }
}

/// Group indices by digest, in order of first appearance.
fn group_by_digest(digests: &[CacheDigest]) -> Vec<Unit> {
    let mut units: Vec<Unit> = Vec::new();
    let mut seen: HashMap<&CacheDigest, usize> = HashMap::new();
    for (i, digest) in digests.iter().enumerate() {
        match seen.entry(digest) {
            Entry::Occupied(e) => units[*e.get()].members.push(i),
            Entry::Vacant(e) => {
                e.insert(units.len());
                units.push(Unit {
                    lead: i,
                    members: vec![i],
                });
            }
        }
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key_for;

    #[test]
    fn grouping_keeps_first_appearance_order() {
        let a = key_for(&RequestDescriptor::new("a", "m"));
        let b = key_for(&RequestDescriptor::new("b", "m"));
        let units = group_by_digest(&[a.clone(), b.clone(), a.clone(), b, a]);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].lead, 0);
        assert_eq!(units[0].members, vec![0, 2, 4]);
        assert_eq!(units[1].lead, 1);
        assert_eq!(units[1].members, vec![1, 3]);
    }

    #[test]
    fn grouping_empty_batch() {
        assert!(group_by_digest(&[]).is_empty());
    }
}

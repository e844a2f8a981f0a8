//! Per-slot and per-batch results.

use serde::{Deserialize, Serialize};

use crate::cache::CacheDigest;
use crate::error::FailureKind;
use crate::types::Completion;

/// Where a successful slot's response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    /// Fetched from the client during this batch.
    Upstream,
    /// Read from the response cache.
    Cache,
    /// Copied from an identical descriptor earlier in the same batch.
    Shared,
}

impl ResponseSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseSource::Upstream => "upstream",
            ResponseSource::Cache => "cache",
            ResponseSource::Shared => "shared",
        }
    }
}

/// Terminal state of one slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitOutcome {
    Done {
        completion: Completion,
        source: ResponseSource,
        /// Upstream calls made for this slot (0 for cache and shared).
        attempts: u32,
    },
    Failed {
        kind: FailureKind,
        message: String,
        attempts: u32,
    },
}

impl UnitOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, UnitOutcome::Done { .. })
    }

    pub fn completion(&self) -> Option<&Completion> {
        match self {
            UnitOutcome::Done { completion, .. } => Some(completion),
            UnitOutcome::Failed { .. } => None,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            UnitOutcome::Done { attempts, .. } | UnitOutcome::Failed { attempts, .. } => *attempts,
        }
    }

    /// The outcome recorded for a duplicate of this slot's descriptor.
    pub(crate) fn shared(&self) -> Self {
        match self {
            UnitOutcome::Done { completion, .. } => UnitOutcome::Done {
                completion: completion.clone(),
                source: ResponseSource::Shared,
                attempts: 0,
            },
            UnitOutcome::Failed { kind, message, .. } => UnitOutcome::Failed {
                kind: *kind,
                message: message.clone(),
                attempts: 0,
            },
        }
    }
}

/// One submitted descriptor's result, at its original position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSlot {
    pub index: usize,
    pub digest: CacheDigest,
    #[serde(flatten)]
    pub outcome: UnitOutcome,
}

/// All slots of a dispatched batch, in submission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    total: usize,
    filled: usize,
    absent: usize,
    slots: Vec<UnitSlot>,
}

impl BatchOutcome {
    pub(crate) fn from_slots(slots: Vec<UnitSlot>) -> Self {
        let filled = slots.iter().filter(|s| s.outcome.is_done()).count();
        Self {
            total: slots.len(),
            filled,
            absent: slots.len() - filled,
            slots,
        }
    }

    /// Number of submitted descriptors.
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Slots holding a completion.
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Slots whose unit failed.
    pub fn absent(&self) -> usize {
        self.absent
    }

    pub fn slots(&self) -> &[UnitSlot] {
        &self.slots
    }

    pub fn get(&self, index: usize) -> Option<&UnitSlot> {
        self.slots.get(index)
    }

    /// Successful completions in submission order; failed slots are skipped.
    pub fn completions(&self) -> Vec<&Completion> {
        self.slots
            .iter()
            .filter_map(|s| s.outcome.completion())
            .collect()
    }

    /// Owned variant of [`completions`](Self::completions).
    pub fn into_completions(self) -> Vec<Completion> {
        self.slots
            .into_iter()
            .filter_map(|s| match s.outcome {
                UnitOutcome::Done { completion, .. } => Some(completion),
                UnitOutcome::Failed { .. } => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RequestDescriptor;
    use crate::cache::key_for;

    fn done(text: &str) -> UnitOutcome {
        UnitOutcome::Done {
            completion: Completion {
                text: text.into(),
                model: "m".into(),
                actual_model: "m".into(),
                usage: None,
                cost: None,
            },
            source: ResponseSource::Upstream,
            attempts: 1,
        }
    }

    fn failed() -> UnitOutcome {
        UnitOutcome::Failed {
            kind: FailureKind::Permanent,
            message: "boom".into(),
            attempts: 1,
        }
    }

    fn slot(index: usize, outcome: UnitOutcome) -> UnitSlot {
        UnitSlot {
            index,
            digest: key_for(&RequestDescriptor::new("p", "m").index(index as u32)),
            outcome,
        }
    }

    #[test]
    fn completions_skip_failed_slots_in_order() {
        let batch = BatchOutcome::from_slots(vec![
            slot(0, done("a")),
            slot(1, failed()),
            slot(2, done("c")),
        ]);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.filled(), 2);
        assert_eq!(batch.absent(), 1);
        let texts: Vec<&str> = batch.completions().iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "c"]);
    }

    #[test]
    fn shared_outcome_has_no_attempts() {
        let shared = done("a").shared();
        assert!(matches!(
            shared,
            UnitOutcome::Done {
                source: ResponseSource::Shared,
                attempts: 0,
                ..
            }
        ));
        assert_eq!(failed().shared().attempts(), 0);
    }

    #[test]
    fn slot_serializes_flat_with_status_tag() {
        let json = serde_json::to_value(slot(1, failed())).unwrap();
        assert_eq!(json["index"], 1);
        assert_eq!(json["status"], "failed");
        assert_eq!(json["kind"], "permanent");
        assert_eq!(json["message"], "boom");
    }
}

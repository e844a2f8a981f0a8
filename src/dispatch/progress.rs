//! Batch progress reporting.

use tracing::{debug, info};

/// Receives progress while a batch runs.
///
/// `advance` is called once per filled slot, in completion order, from the
/// dispatcher's collecting loop (never concurrently).
pub trait ProgressSink: Send + Sync {
    /// `completed` of `total` slots are now terminal.
    fn advance(&self, completed: usize, total: usize);

    /// The batch is done: `filled` slots succeeded, `absent` failed.
    fn finish(&self, filled: usize, absent: usize) {
        let _ = (filled, absent);
    }
}

/// Discards progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn advance(&self, _completed: usize, _total: usize) {}
}

/// Reports progress through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn advance(&self, completed: usize, total: usize) {
        debug!(completed, total, "batch progress");
    }

    fn finish(&self, filled: usize, absent: usize) {
        info!(filled, absent, "batch finished");
    }
}

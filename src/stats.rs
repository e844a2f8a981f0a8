//! Response-consistency statistics.
//!
//! A run scores each repeated response against a reference (typically the
//! cosine similarity of embeddings). [`RunStats`] summarises one run's
//! scores; [`AggregateStats`] summarises several runs into a fingerprint
//! that can be compared across models with [`AggregateStats::distance`].

use serde::{Deserialize, Serialize};

/// Summary of one run's similarity scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    pub min: f64,
    pub max: f64,
    /// `(max - min) / mean`, 0 when the mean is not positive.
    pub range_ratio: f64,
    /// Half the range ratio.
    pub cv: f64,
    /// `1 - (max - min) / (1 - min)`, 0 when `min >= 1`.
    pub consistency: f64,
}

impl RunStats {
    /// Summarise `scores`. `None` for an empty run.
    pub fn from_scores(scores: &[f64]) -> Option<Self> {
        let (mean, std) = mean_std(scores)?;
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let spread = max - min;

        let range_ratio = if mean > 0.0 { spread / mean } else { 0.0 };
        let headroom = 1.0 - min;
        let consistency = if headroom > 0.0 {
            1.0 - spread / headroom
        } else {
            0.0
        };

        Some(Self {
            mean,
            std,
            min,
            max,
            range_ratio,
            cv: range_ratio / 2.0,
            consistency,
        })
    }
}

/// Mean and population standard deviation of each run metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub runs: usize,
    pub cv_mean: f64,
    pub cv_std: f64,
    pub range_mean: f64,
    pub range_std: f64,
    pub consistency_mean: f64,
    pub consistency_std: f64,
}

impl AggregateStats {
    /// Aggregate per-run summaries. `None` when there are no runs.
    pub fn from_runs(runs: &[RunStats]) -> Option<Self> {
        let cvs: Vec<f64> = runs.iter().map(|r| r.cv).collect();
        let ranges: Vec<f64> = runs.iter().map(|r| r.range_ratio).collect();
        let consistencies: Vec<f64> = runs.iter().map(|r| r.consistency).collect();

        let (cv_mean, cv_std) = mean_std(&cvs)?;
        let (range_mean, range_std) = mean_std(&ranges)?;
        let (consistency_mean, consistency_std) = mean_std(&consistencies)?;

        Some(Self {
            runs: runs.len(),
            cv_mean,
            cv_std,
            range_mean,
            range_std,
            consistency_mean,
            consistency_std,
        })
    }

    /// Euclidean distance between two fingerprints over the metric means.
    pub fn distance(&self, other: &AggregateStats) -> f64 {
        ((self.cv_mean - other.cv_mean).powi(2)
            + (self.range_mean - other.range_mean).powi(2)
            + (self.consistency_mean - other.consistency_mean).powi(2))
        .sqrt()
    }

    /// The candidate whose fingerprint is nearest to `self`.
    pub fn closest<'a, K>(
        &self,
        candidates: impl IntoIterator<Item = (K, &'a AggregateStats)>,
    ) -> Option<(K, f64)> {
        candidates
            .into_iter()
            .map(|(key, stats)| (key, self.distance(stats)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// Cosine similarity of two vectors.
///
/// 0 when the lengths differ or either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}

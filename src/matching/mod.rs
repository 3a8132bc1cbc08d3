//! Motif matching and scoring.
//!
//! Compares discovered motif matrices against the injected ground truth.
//! Everything here is pure: no RNG, no IO, identical inputs give identical
//! records.

mod engine;
mod metrics;

pub use engine::{match_motif, MatchRecord};
pub use metrics::{Combine, MatchMode, Metric};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised for individual malformed matrices. Non-fatal: the affected
/// record is excluded from aggregates and the run continues.
#[derive(Debug, Error)]
pub enum MatchError {
    /// A matrix has no positions.
    #[error("Motif matrix '{0}' is empty")]
    EmptyMatrix(String),

    /// A matrix does not have one column per nucleotide.
    #[error("Motif matrix '{id}' has {cols} columns, expected 4")]
    BadShape { id: String, cols: usize },

    /// A matrix contains NaN or infinite probabilities.
    #[error("Motif matrix '{0}' contains non-finite values")]
    NonFinite(String),
}

/// Matching parameters, loaded verbatim from the experiment config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchParams {
    /// Alignment mode.
    #[serde(rename = "match")]
    pub mode: MatchMode,
    /// Column-similarity metric.
    pub metric: Metric,
    /// How per-column scores aggregate into the final score.
    pub combine: Combine,
    /// Match threshold. Similarity metrics match at `score >= min_score`,
    /// distance metrics at `score <= min_score`.
    pub min_score: f64,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self {
            mode: MatchMode::Partial,
            metric: Metric::Seqcor,
            combine: Combine::Mean,
            min_score: 0.7,
        }
    }
}

impl MatchParams {
    /// Checks the threshold is usable.
    pub fn validate(&self) -> Result<(), String> {
        if !self.min_score.is_finite() {
            return Err(format!("min_score must be finite, got {}", self.min_score));
        }
        Ok(())
    }
}

//! motifab: benchmark pipeline for de novo motif discovery tools.
//!
//! Generates synthetic FASTA datasets with a known motif injected at
//! controlled rates, sweeps external discovery tools over the combinatorial
//! parameter space, and scores the recovered motifs against the ground truth.

pub mod cli;
pub mod config;
pub mod dataset;
pub mod denovo;
pub mod ledger;
pub mod matching;
pub mod model;
pub mod pipeline;
pub mod results;

// Re-export commonly used error types
pub use config::ConfigError;
pub use denovo::{SchedulerError, ToolError};
pub use ledger::LedgerError;
pub use matching::MatchError;

//! Result reconciliation: parsing discovered motifs, scoring them against the
//! ground truth, CSV exports, and heatmap grids.

mod export;
mod heatmap;
mod parser;

pub use export::write_dumps;
pub use heatmap::{write_heatmaps, HeatmapGrid};
pub use parser::{parse_results, parse_stats_str, tool_from_motif_id, ScoredMotif};

use thiserror::Error;

/// Errors fatal to the results stage. Per-unit file problems are demoted to
/// warnings inside the parser; these are the failures that make the whole
/// stage output meaningless.
#[derive(Debug, Error)]
pub enum ResultsError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Ledger(#[from] crate::ledger::LedgerError),

    #[error(transparent)]
    Dataset(#[from] crate::dataset::DatasetError),
}

impl ResultsError {
    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

//! Synthetic dataset generation: motif matrices, FASTA synthesis, and
//! motif injection.

mod fasta;
mod generator;
mod injector;
mod motif;

pub use fasta::{read_fasta, synthesize_records, write_fasta, FastaRecord};
pub use generator::{DatasetGenerator, GenerateSummary};
pub use injector::{inject_motif, InjectionReport};
pub use motif::MotifMatrix;

use thiserror::Error;

/// Errors raised while building motifs or generating datasets. Fatal to the
/// generation stage.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// IO failure reading or writing dataset files.
    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A motif file or consensus string could not be interpreted.
    #[error("Invalid motif: {0}")]
    InvalidMotif(String),

    /// A FASTA file was malformed.
    #[error("Invalid FASTA at {path}: {message}")]
    InvalidFasta { path: String, message: String },

    /// Ledger failure during unit registration.
    #[error(transparent)]
    Ledger(#[from] crate::ledger::LedgerError),
}

impl DatasetError {
    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

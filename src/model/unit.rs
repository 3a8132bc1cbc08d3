//! Work-unit records and the status state machine.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::key::UnitKey;

/// Lifecycle status of a work unit.
///
/// `pending -> running -> {completed | completed_with_errors | failed_denovo}`.
/// A unit found `running` after a crash is demoted to `failed_denovo` by
/// ledger recovery so it becomes retry-eligible instead of being silently
/// trusted or skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Pending,
    Running,
    Completed,
    CompletedWithErrors,
    FailedDenovo,
}

impl UnitStatus {
    /// Whether the unit reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UnitStatus::Completed | UnitStatus::CompletedWithErrors | UnitStatus::FailedDenovo
        )
    }

    /// Whether discovery produced usable outputs.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            UnitStatus::Completed | UnitStatus::CompletedWithErrors
        )
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitStatus::Pending => "pending",
            UnitStatus::Running => "running",
            UnitStatus::Completed => "completed",
            UnitStatus::CompletedWithErrors => "completed_with_errors",
            UnitStatus::FailedDenovo => "failed_denovo",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for UnitStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(UnitStatus::Pending),
            "running" => Ok(UnitStatus::Running),
            "completed" => Ok(UnitStatus::Completed),
            "completed_with_errors" => Ok(UnitStatus::CompletedWithErrors),
            "failed_denovo" => Ok(UnitStatus::FailedDenovo),
            other => Err(format!("unknown unit status '{}'", other)),
        }
    }
}

/// One work unit as stored in the ledger.
#[derive(Debug, Clone)]
pub struct WorkUnit {
    /// Composite key; unique per unit.
    pub key: UnitKey,
    /// Current lifecycle status.
    pub status: UnitStatus,
    /// Generated test FASTA (shared by all units of the same replicate).
    pub test_fasta: Option<PathBuf>,
    /// Generated background FASTA (shared per combination).
    pub background_fasta: Option<PathBuf>,
    /// Output directory of the discovery run.
    pub output_dir: Option<PathBuf>,
    /// Discovered-motif PFM file reported by the tool.
    pub motif_file: Option<PathBuf>,
    /// Per-background significance stats file reported by the tool.
    pub stats_file: Option<PathBuf>,
    /// Number of sequences that actually received an injection.
    pub injected_count: Option<u32>,
    /// Digest of the generation parameters this unit was built with.
    pub params_digest: Option<String>,
    /// Error detail for failed or error-flagged units.
    pub error: Option<String>,
    /// When the unit was first registered.
    pub created_at: DateTime<Utc>,
    /// Re-stamped on every ledger mutation.
    pub updated_at: DateTime<Utc>,
}

/// Partial update applied to a ledger entry.
///
/// Absent fields keep their prior values; the ledger merges rather than
/// replaces. Built with the same chained style the rest of the codebase uses.
#[derive(Debug, Clone, Default)]
pub struct UnitUpdate {
    pub status: Option<UnitStatus>,
    pub test_fasta: Option<PathBuf>,
    pub background_fasta: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub motif_file: Option<PathBuf>,
    pub stats_file: Option<PathBuf>,
    pub injected_count: Option<u32>,
    pub params_digest: Option<String>,
    pub error: Option<String>,
}

impl UnitUpdate {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the status.
    pub fn with_status(mut self, status: UnitStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the test FASTA path.
    pub fn with_test_fasta(mut self, path: impl Into<PathBuf>) -> Self {
        self.test_fasta = Some(path.into());
        self
    }

    /// Sets the background FASTA path.
    pub fn with_background_fasta(mut self, path: impl Into<PathBuf>) -> Self {
        self.background_fasta = Some(path.into());
        self
    }

    /// Sets the discovery output directory.
    pub fn with_output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Sets the discovered-motif file path.
    pub fn with_motif_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.motif_file = Some(path.into());
        self
    }

    /// Sets the stats file path.
    pub fn with_stats_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stats_file = Some(path.into());
        self
    }

    /// Sets the realized injected-sequence count.
    pub fn with_injected_count(mut self, count: u32) -> Self {
        self.injected_count = Some(count);
        self
    }

    /// Sets the generation-parameter digest.
    pub fn with_params_digest(mut self, digest: impl Into<String>) -> Self {
        self.params_digest = Some(digest.into());
        self
    }

    /// Sets the error detail.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// SHA-256 digest (hex) of any serializable parameter set.
///
/// Stored on each unit so a later run can detect config drift at an existing
/// key: same key + different digest means the unit is stale and must be
/// regenerated even without `force`.
pub fn params_digest<T: Serialize>(params: &T) -> String {
    // Serialization of our config types cannot fail; fall back to an empty
    // document rather than poisoning the digest path.
    let bytes = serde_json::to_vec(params).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let out = hasher.finalize();
    out.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BackgroundType;

    #[test]
    fn test_status_round_trip() {
        for status in [
            UnitStatus::Pending,
            UnitStatus::Running,
            UnitStatus::Completed,
            UnitStatus::CompletedWithErrors,
            UnitStatus::FailedDenovo,
        ] {
            let parsed: UnitStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("done".parse::<UnitStatus>().is_err());
    }

    #[test]
    fn test_status_classification() {
        assert!(!UnitStatus::Pending.is_terminal());
        assert!(!UnitStatus::Running.is_terminal());
        assert!(UnitStatus::Completed.is_terminal());
        assert!(UnitStatus::FailedDenovo.is_terminal());
        assert!(UnitStatus::CompletedWithErrors.is_success());
        assert!(!UnitStatus::FailedDenovo.is_success());
    }

    #[test]
    fn test_update_builder() {
        let update = UnitUpdate::new()
            .with_status(UnitStatus::Completed)
            .with_motif_file("/tmp/out/gimme.denovo.pfm")
            .with_injected_count(50)
            .with_error("partial stats");

        assert_eq!(update.status, Some(UnitStatus::Completed));
        assert_eq!(
            update.motif_file,
            Some(PathBuf::from("/tmp/out/gimme.denovo.pfm"))
        );
        assert_eq!(update.injected_count, Some(50));
        assert_eq!(update.error.as_deref(), Some("partial stats"));
        assert!(update.test_fasta.is_none());
    }

    #[test]
    fn test_params_digest_stability() {
        let key = UnitKey::new(100, 0.5, 1, BackgroundType::Random, "MEME");
        let a = params_digest(&key);
        let b = params_digest(&key);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let other = UnitKey::new(100, 0.5, 2, BackgroundType::Random, "MEME");
        assert_ne!(a, params_digest(&other));
    }
}

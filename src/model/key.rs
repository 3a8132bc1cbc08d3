//! Composite work-unit keys and the Cartesian sweep expansion.
//!
//! Every unit of work in the pipeline is identified by one
//! (dataset size, injection rate, replicate, background type, tool)
//! combination. Keys are derived deterministically from configuration so
//! that regenerating with identical settings reproduces identical keys,
//! which is what makes skip-if-exists logic possible.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Background model handed to the external discovery tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundType {
    /// First-order random sequences generated by the tool itself.
    Random,
    /// Sampled from the configured genome.
    Genomic,
    /// GC-matched sampling from the configured genome.
    Gc,
    /// The background FASTA generated alongside the dataset.
    Custom,
}

impl BackgroundType {
    /// Whether this background requires a genome FASTA to be configured.
    pub fn requires_genome(&self) -> bool {
        matches!(self, BackgroundType::Genomic | BackgroundType::Gc)
    }
}

impl fmt::Display for BackgroundType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackgroundType::Random => "random",
            BackgroundType::Genomic => "genomic",
            BackgroundType::Gc => "gc",
            BackgroundType::Custom => "custom",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for BackgroundType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(BackgroundType::Random),
            "genomic" => Ok(BackgroundType::Genomic),
            "gc" => Ok(BackgroundType::Gc),
            "custom" => Ok(BackgroundType::Custom),
            other => Err(format!("unknown background type '{}'", other)),
        }
    }
}

/// Composite key uniquely identifying one work unit.
///
/// The injection rate is stored as integer percent so the key is `Eq + Hash`
/// without floating-point equality headaches. [`UnitKey::injection_rate`]
/// recovers the fractional form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitKey {
    /// Number of sequences in the test set.
    pub seq_amount: u32,
    /// Injection rate in percent (e.g. 50 for 0.5).
    pub rate_pct: u32,
    /// 1-based replicate index.
    pub replicate: u32,
    /// Background model for the discovery run.
    pub background: BackgroundType,
    /// External discovery tool name.
    pub tool: String,
}

impl UnitKey {
    /// Builds a key from a fractional injection rate.
    pub fn new(
        seq_amount: u32,
        injection_rate: f64,
        replicate: u32,
        background: BackgroundType,
        tool: impl Into<String>,
    ) -> Self {
        Self {
            seq_amount,
            rate_pct: (injection_rate * 100.0).round() as u32,
            replicate,
            background,
            tool: tool.into(),
        }
    }

    /// Fractional injection rate recovered from the percent form.
    pub fn injection_rate(&self) -> f64 {
        self.rate_pct as f64 / 100.0
    }

    /// Name of the (seq_amount, injection_rate) combination this key belongs to.
    pub fn combo_name(&self) -> String {
        format!("len_{}_rate_{}", self.seq_amount, self.rate_pct)
    }

    /// Name of the replicate dataset shared by all (background, tool) pairs.
    pub fn replicate_name(&self) -> String {
        format!("{}_rep_{}", self.combo_name(), self.replicate)
    }

    /// Canonical key string used as the ledger primary key.
    pub fn name(&self) -> String {
        format!(
            "{}_{}_{}",
            self.replicate_name(),
            self.background,
            self.tool
        )
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The sweep dimensions expanded into concrete unit keys.
#[derive(Debug, Clone)]
pub struct SweepDimensions {
    pub seq_amounts: Vec<u32>,
    pub injection_rates: Vec<f64>,
    pub n_replicates: u32,
    pub backgrounds: Vec<BackgroundType>,
    pub tools: Vec<String>,
}

impl SweepDimensions {
    /// Expands the full Cartesian product into unit keys.
    ///
    /// Ordering is deterministic: seq_amount, then rate, then replicate,
    /// then background, then tool.
    pub fn expand(&self) -> Vec<UnitKey> {
        let mut keys = Vec::with_capacity(
            self.seq_amounts.len()
                * self.injection_rates.len()
                * self.n_replicates as usize
                * self.backgrounds.len()
                * self.tools.len(),
        );
        for &seq_amount in &self.seq_amounts {
            for &rate in &self.injection_rates {
                for replicate in 1..=self.n_replicates {
                    for &background in &self.backgrounds {
                        for tool in &self.tools {
                            keys.push(UnitKey::new(seq_amount, rate, replicate, background, tool));
                        }
                    }
                }
            }
        }
        keys
    }

    /// Keys grouped by replicate dataset: one entry per
    /// (seq_amount, rate, replicate) with the (background, tool) fan-out.
    pub fn replicate_groups(&self) -> Vec<(u32, f64, u32, Vec<UnitKey>)> {
        let mut groups = Vec::new();
        for &seq_amount in &self.seq_amounts {
            for &rate in &self.injection_rates {
                for replicate in 1..=self.n_replicates {
                    let mut keys = Vec::new();
                    for &background in &self.backgrounds {
                        for tool in &self.tools {
                            keys.push(UnitKey::new(seq_amount, rate, replicate, background, tool));
                        }
                    }
                    groups.push((seq_amount, rate, replicate, keys));
                }
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn dims() -> SweepDimensions {
        SweepDimensions {
            seq_amounts: vec![100, 500],
            injection_rates: vec![0.1, 0.5],
            n_replicates: 3,
            backgrounds: vec![BackgroundType::Random, BackgroundType::Gc],
            tools: vec!["MEME".to_string(), "Homer".to_string()],
        }
    }

    #[test]
    fn test_key_name_format() {
        let key = UnitKey::new(100, 0.5, 2, BackgroundType::Gc, "MEME");
        assert_eq!(key.combo_name(), "len_100_rate_50");
        assert_eq!(key.replicate_name(), "len_100_rate_50_rep_2");
        assert_eq!(key.name(), "len_100_rate_50_rep_2_gc_MEME");
    }

    #[test]
    fn test_injection_rate_round_trip() {
        let key = UnitKey::new(100, 0.3, 1, BackgroundType::Random, "MEME");
        assert_eq!(key.rate_pct, 30);
        assert!((key.injection_rate() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_expand_is_exact_cartesian_product() {
        let keys = dims().expand();
        assert_eq!(keys.len(), 2 * 2 * 3 * 2 * 2);

        // No duplicates
        let unique: HashSet<String> = keys.iter().map(|k| k.name()).collect();
        assert_eq!(unique.len(), keys.len());

        // Spot-check membership
        assert!(unique.contains("len_500_rate_10_rep_3_random_Homer"));
        assert!(unique.contains("len_100_rate_50_rep_1_gc_MEME"));
    }

    #[test]
    fn test_expand_is_deterministic() {
        assert_eq!(dims().expand(), dims().expand());
    }

    #[test]
    fn test_replicate_groups_cover_expansion() {
        let d = dims();
        let groups = d.replicate_groups();
        assert_eq!(groups.len(), 2 * 2 * 3);
        let total: usize = groups.iter().map(|(_, _, _, keys)| keys.len()).sum();
        assert_eq!(total, d.expand().len());
    }

    #[test]
    fn test_background_type_parse() {
        assert_eq!(
            "genomic".parse::<BackgroundType>().unwrap(),
            BackgroundType::Genomic
        );
        assert!("promoter".parse::<BackgroundType>().is_err());
        assert!(BackgroundType::Gc.requires_genome());
        assert!(!BackgroundType::Custom.requires_genome());
    }
}

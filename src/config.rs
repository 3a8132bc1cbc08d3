//! Experiment configuration.
//!
//! A single JSON document describes the whole sweep: ground-truth motif,
//! combination dimensions, generation parameters, discovery settings, matching
//! parameters, and export dumps. The document is loaded once, validated, and
//! never written back; all run-time state lives in the ledger.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::matching::MatchParams;
use crate::model::{BackgroundType, SweepDimensions};

/// Discovery tools the external runner understands.
pub const AVAILABLE_TOOLS: &[&str] = &[
    "BioProspector",
    "MEME",
    "Homer",
    "AMD",
    "ChIPMunk",
    "DiNAMO",
    "DREME",
    "GADEM",
    "HMS",
    "Improbizer",
    "MDmodule",
    "MEMEW",
    "MotifSampler",
    "Posmo",
    "ProSampler",
    "RPMCMC",
    "Trawler",
    "Weeder",
    "XXmotif",
    "YAMDA",
];

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error while reading or writing the config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid JSON or misses required fields.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Ground-truth motif source.
///
/// Exactly one of a PFM file (counts), a PPM file (probabilities), or a
/// consensus string may be given. Deserialization goes through
/// [`RawMotifSpec`] so a document carrying zero or multiple source keys is
/// rejected outright instead of one key winning silently.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawMotifSpec", into = "RawMotifSpec")]
pub enum MotifSpec {
    /// Position frequency matrix file (counts per column).
    Pfm { pfm: PathBuf },
    /// Position probability matrix file.
    Ppm { ppm: PathBuf },
    /// IUPAC consensus string, optionally blurred per position.
    Consensus {
        consensus: String,
        mutation_rate: Option<f64>,
    },
}

/// On-disk shape of [`MotifSpec`]: all source keys optional, so that
/// mutually exclusive keys can be checked after parsing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawMotifSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pfm: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ppm: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    consensus: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mutation_rate: Option<f64>,
}

impl TryFrom<RawMotifSpec> for MotifSpec {
    type Error = String;

    fn try_from(raw: RawMotifSpec) -> Result<Self, Self::Error> {
        match (raw.pfm, raw.ppm, raw.consensus) {
            (Some(pfm), None, None) => {
                if raw.mutation_rate.is_some() {
                    return Err(
                        "motif.mutation_rate is only valid with a consensus source".to_string(),
                    );
                }
                Ok(Self::Pfm { pfm })
            }
            (None, Some(ppm), None) => {
                if raw.mutation_rate.is_some() {
                    return Err(
                        "motif.mutation_rate is only valid with a consensus source".to_string(),
                    );
                }
                Ok(Self::Ppm { ppm })
            }
            (None, None, Some(consensus)) => Ok(Self::Consensus {
                consensus,
                mutation_rate: raw.mutation_rate,
            }),
            (None, None, None) => {
                Err("motif requires one of pfm, ppm, or consensus".to_string())
            }
            _ => Err("motif sources pfm, ppm, and consensus are mutually exclusive".to_string()),
        }
    }
}

impl From<MotifSpec> for RawMotifSpec {
    fn from(spec: MotifSpec) -> Self {
        match spec {
            MotifSpec::Pfm { pfm } => Self {
                pfm: Some(pfm),
                ..Self::default()
            },
            MotifSpec::Ppm { ppm } => Self {
                ppm: Some(ppm),
                ..Self::default()
            },
            MotifSpec::Consensus {
                consensus,
                mutation_rate,
            } => Self {
                consensus: Some(consensus),
                mutation_rate,
                ..Self::default()
            },
        }
    }
}

/// Sweep dimensions: which combinations of dataset size and injection rate
/// to generate, and how many replicates of each.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    pub seq_amounts: Vec<u32>,
    pub injection_rates: Vec<f64>,
    pub n_replicates: u32,
}

/// Dataset synthesis parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Length of every synthesized sequence.
    #[serde(default = "default_seq_length")]
    pub seq_length: u32,
    /// Target GC fraction of synthesized sequences.
    #[serde(default = "default_gc_content")]
    pub gc_content: f64,
    /// Number of sequences in the shared background FASTA per combination.
    #[serde(default = "default_background_length")]
    pub background_length: u32,
    /// Regenerate datasets even when valid artifacts already exist.
    #[serde(default)]
    pub force: bool,
    /// Base seed mixed into each unit's RNG stream.
    #[serde(default)]
    pub seed: u64,
}

fn default_seq_length() -> u32 {
    200
}

fn default_gc_content() -> f64 {
    0.5
}

fn default_background_length() -> u32 {
    1000
}

/// Discovery-stage parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenovoConfig {
    /// Background models handed to the discovery tool.
    pub background_types: Vec<BackgroundType>,
    /// External tools to benchmark.
    pub tools: Vec<String>,
    /// CPUs allotted to each tool invocation.
    #[serde(default = "default_ncpus")]
    pub ncpus: u32,
    /// Maximum concurrently running tool invocations.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    /// Re-dispatch units that previously failed.
    #[serde(default)]
    pub rerun_failed: bool,
    /// Re-run every unit regardless of status.
    #[serde(default)]
    pub force: bool,
    /// Genome FASTA, required by genomic and gc backgrounds.
    #[serde(default)]
    pub genome: Option<PathBuf>,
    /// Discovery command name. Overridable for testing.
    #[serde(default = "default_command")]
    pub command: String,
}

fn default_ncpus() -> u32 {
    1
}

fn default_max_parallel() -> usize {
    4
}

fn default_command() -> String {
    "gimme".to_string()
}

/// One CSV export: a filename plus row filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpConfig {
    pub filename: String,
    #[serde(default)]
    pub only_matches: bool,
    #[serde(default)]
    pub only_significant: bool,
}

/// Export-stage parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_dumps")]
    pub dumps: Vec<DumpConfig>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dumps: default_dumps(),
        }
    }
}

fn default_dumps() -> Vec<DumpConfig> {
    vec![
        DumpConfig {
            filename: "all_discovered_motifs.csv".to_string(),
            only_matches: false,
            only_significant: false,
        },
        DumpConfig {
            filename: "matched_discovered_motifs.csv".to_string(),
            only_matches: true,
            only_significant: false,
        },
        DumpConfig {
            filename: "significant_discovered_motifs.csv".to_string(),
            only_matches: true,
            only_significant: true,
        },
    ]
}

/// Top-level experiment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotifabConfig {
    /// Root directory for datasets, discovery outputs, exports, and the ledger.
    pub output_dir: PathBuf,
    /// Ground-truth motif to inject.
    pub motif: MotifSpec,
    pub sweep: SweepConfig,
    #[serde(default = "default_generation")]
    pub generation: GenerationConfig,
    pub denovo: DenovoConfig,
    pub matching: MatchParams,
    #[serde(default)]
    pub export: ExportConfig,
    /// Stop the pipeline after the discovery stage if any unit failed.
    #[serde(default)]
    pub halt_on_failed_units: bool,
}

fn default_generation() -> GenerationConfig {
    GenerationConfig {
        seq_length: default_seq_length(),
        gc_content: default_gc_content(),
        background_length: default_background_length(),
        force: false,
        seed: 0,
    }
}

impl MotifabConfig {
    /// Loads and validates a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as pretty JSON. Used by `init` only; the
    /// pipeline never writes the config back.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), raw)?;
        Ok(())
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep.seq_amounts.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "sweep.seq_amounts cannot be empty".to_string(),
            ));
        }

        if self.sweep.seq_amounts.contains(&0) {
            return Err(ConfigError::ValidationFailed(
                "sweep.seq_amounts must be greater than 0".to_string(),
            ));
        }

        if self.sweep.injection_rates.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "sweep.injection_rates cannot be empty".to_string(),
            ));
        }

        for &rate in &self.sweep.injection_rates {
            if !(rate > 0.0 && rate <= 1.0) {
                return Err(ConfigError::ValidationFailed(format!(
                    "injection rate {} must be in (0, 1]",
                    rate
                )));
            }
        }

        if self.sweep.n_replicates == 0 {
            return Err(ConfigError::ValidationFailed(
                "sweep.n_replicates must be greater than 0".to_string(),
            ));
        }

        if self.generation.seq_length == 0 {
            return Err(ConfigError::ValidationFailed(
                "generation.seq_length must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.generation.gc_content) {
            return Err(ConfigError::ValidationFailed(
                "generation.gc_content must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.denovo.background_types.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "denovo.background_types cannot be empty".to_string(),
            ));
        }

        if self.denovo.tools.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "denovo.tools cannot be empty".to_string(),
            ));
        }

        for tool in &self.denovo.tools {
            if !AVAILABLE_TOOLS.contains(&tool.as_str()) {
                return Err(ConfigError::ValidationFailed(format!(
                    "unknown discovery tool '{}'",
                    tool
                )));
            }
        }

        if self.denovo.max_parallel == 0 {
            return Err(ConfigError::ValidationFailed(
                "denovo.max_parallel must be greater than 0".to_string(),
            ));
        }

        if self.denovo.ncpus == 0 {
            return Err(ConfigError::ValidationFailed(
                "denovo.ncpus must be greater than 0".to_string(),
            ));
        }

        let needs_genome = self
            .denovo
            .background_types
            .iter()
            .any(|bg| bg.requires_genome());
        if needs_genome && self.denovo.genome.is_none() {
            return Err(ConfigError::ValidationFailed(
                "genomic and gc backgrounds require denovo.genome".to_string(),
            ));
        }

        if let MotifSpec::Consensus {
            consensus,
            mutation_rate,
        } = &self.motif
        {
            if consensus.is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "motif.consensus cannot be empty".to_string(),
                ));
            }
            if let Some(rate) = mutation_rate {
                if !(0.0..=1.0).contains(rate) {
                    return Err(ConfigError::ValidationFailed(
                        "motif.mutation_rate must be between 0.0 and 1.0".to_string(),
                    ));
                }
                // Blurring is only meaningful over unambiguous bases.
                if !consensus
                    .chars()
                    .all(|c| matches!(c.to_ascii_uppercase(), 'A' | 'C' | 'G' | 'T'))
                {
                    return Err(ConfigError::ValidationFailed(
                        "motif.mutation_rate requires an ACGT-only consensus".to_string(),
                    ));
                }
            }
        }

        self.matching.validate().map_err(|e| {
            ConfigError::ValidationFailed(format!("matching: {}", e))
        })?;

        if self.export.dumps.iter().any(|d| d.filename.is_empty()) {
            return Err(ConfigError::ValidationFailed(
                "export dump filenames cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// The sweep expanded to concrete dimensions, ready for key generation.
    pub fn dimensions(&self) -> SweepDimensions {
        SweepDimensions {
            seq_amounts: self.sweep.seq_amounts.clone(),
            injection_rates: self.sweep.injection_rates.clone(),
            n_replicates: self.sweep.n_replicates,
            backgrounds: self.denovo.background_types.clone(),
            tools: self.denovo.tools.clone(),
        }
    }

    /// Path of the ledger database inside the output directory.
    pub fn ledger_path(&self) -> PathBuf {
        self.output_dir.join("ledger.db")
    }

    /// A small template configuration written by `init`.
    pub fn template() -> Self {
        Self {
            output_dir: PathBuf::from("./motifab_out"),
            motif: MotifSpec::Consensus {
                consensus: "TGASTCA".to_string(),
                mutation_rate: None,
            },
            sweep: SweepConfig {
                seq_amounts: vec![100, 500],
                injection_rates: vec![0.1, 0.5],
                n_replicates: 3,
            },
            generation: default_generation(),
            denovo: DenovoConfig {
                background_types: vec![BackgroundType::Random, BackgroundType::Custom],
                tools: vec![
                    "BioProspector".to_string(),
                    "MEME".to_string(),
                    "Homer".to_string(),
                ],
                ncpus: default_ncpus(),
                max_parallel: default_max_parallel(),
                rerun_failed: false,
                force: false,
                genome: None,
                command: default_command(),
            },
            matching: MatchParams::default(),
            export: ExportConfig::default(),
            halt_on_failed_units: false,
        }
    }
}

//! Dataset generation over the combinatorial sweep.
//!
//! For every (seq_amount, injection_rate, replicate) a test FASTA is
//! synthesized with the ground-truth motif injected, plus one shared
//! background FASTA per (seq_amount, injection_rate) combination. Each
//! replicate then fans out into one pending ledger unit per
//! (background, tool) pair.

use std::fs;
use std::path::PathBuf;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, info};

use super::{inject_motif, synthesize_records, write_fasta, DatasetError, MotifMatrix};
use crate::config::{MotifabConfig, MotifSpec};
use crate::ledger::Ledger;
use crate::model::{params_digest, UnitKey, UnitStatus, UnitUpdate};

/// Outcome of one generation pass, counted in replicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateSummary {
    /// Replicates (re)generated this pass.
    pub created: usize,
    /// Replicates skipped because valid artifacts already existed.
    pub retained: usize,
    /// Of `created`, how many were regenerated only because of `force`.
    pub forced: usize,
}

/// Everything that determines a replicate's dataset bytes. Hashed into the
/// per-unit parameter digest so config drift at an existing key is detected.
#[derive(Serialize)]
struct GenParams<'a> {
    seq_amount: u32,
    rate_pct: u32,
    replicate: u32,
    seq_length: u32,
    gc_content: f64,
    background_length: u32,
    seed: u64,
    motif: &'a MotifSpec,
}

pub struct DatasetGenerator<'a> {
    config: &'a MotifabConfig,
    ledger: &'a Ledger,
    motif: MotifMatrix,
}

impl<'a> DatasetGenerator<'a> {
    pub fn new(config: &'a MotifabConfig, ledger: &'a Ledger) -> Result<Self, DatasetError> {
        let motif = MotifMatrix::from_spec(&config.motif)?;
        Ok(Self {
            config,
            ledger,
            motif,
        })
    }

    /// The ground-truth motif built from the configured source.
    pub fn motif(&self) -> &MotifMatrix {
        &self.motif
    }

    /// Generates (or retains) every replicate dataset and registers the
    /// pending work units.
    pub async fn generate(&self) -> Result<GenerateSummary, DatasetError> {
        let datasets_dir = self.config.output_dir.join("datasets");
        let force = self.config.generation.force;
        let mut summary = GenerateSummary::default();

        for (seq_amount, rate, replicate, keys) in self.config.dimensions().replicate_groups() {
            // All keys of a replicate share the same dataset, so any key
            // works for naming.
            let first = match keys.first() {
                Some(first) => first,
                None => continue,
            };
            let combo_dir = datasets_dir.join(first.combo_name());
            let test_path = combo_dir.join(format!("{}.fa", first.replicate_name()));
            let bg_path = combo_dir.join("background.fa");

            let params = GenParams {
                seq_amount,
                rate_pct: first.rate_pct,
                replicate,
                seq_length: self.config.generation.seq_length,
                gc_content: self.config.generation.gc_content,
                background_length: self.config.generation.background_length,
                seed: self.config.generation.seed,
                motif: &self.config.motif,
            };
            let digest = params_digest(&params);

            let was_current = self
                .replicate_is_current(&keys, &digest, &test_path, &bg_path)
                .await?;
            if !force && was_current {
                debug!(replicate = %first.replicate_name(), "Dataset retained");
                summary.retained += 1;
                continue;
            }

            fs::create_dir_all(&combo_dir).map_err(|e| DatasetError::io(&combo_dir, e))?;

            let mut rng = ChaCha8Rng::seed_from_u64(seed_from_digest(&digest));
            let mut records = synthesize_records(
                &first.replicate_name(),
                seq_amount,
                self.config.generation.seq_length,
                self.config.generation.gc_content,
                &mut rng,
            );
            let report = inject_motif(&mut records, &self.motif, rate, &mut rng);
            write_fasta(&test_path, &records)?;

            if force || !bg_path.exists() {
                self.write_background(&bg_path, first)?;
            }

            info!(
                replicate = %first.replicate_name(),
                injected = report.injected,
                requested = report.requested,
                "Dataset generated"
            );

            for key in &keys {
                self.ledger
                    .upsert(
                        key,
                        UnitUpdate::new()
                            .with_status(UnitStatus::Pending)
                            .with_test_fasta(&test_path)
                            .with_background_fasta(&bg_path)
                            .with_params_digest(&digest)
                            .with_injected_count(report.injected),
                    )
                    .await?;
                self.ledger.clear_error(key).await?;
            }

            summary.created += 1;
            if force && was_current {
                summary.forced += 1;
            }
        }

        info!(
            created = summary.created,
            retained = summary.retained,
            forced = summary.forced,
            "Generation pass complete"
        );
        Ok(summary)
    }

    /// A replicate is current when every unit is registered with a matching
    /// digest and both FASTA artifacts are present on disk.
    async fn replicate_is_current(
        &self,
        keys: &[UnitKey],
        digest: &str,
        test_path: &PathBuf,
        bg_path: &PathBuf,
    ) -> Result<bool, DatasetError> {
        for key in keys {
            match self.ledger.get(key).await? {
                Some(unit) if unit.params_digest.as_deref() == Some(digest) => {}
                _ => return Ok(false),
            }
        }
        Ok(test_path.is_file() && bg_path.is_file())
    }

    fn write_background(&self, bg_path: &PathBuf, key: &UnitKey) -> Result<(), DatasetError> {
        let bg_seed_input = format!("{}_background_{}", key.combo_name(), self.config.generation.seed);
        let mut rng = ChaCha8Rng::seed_from_u64(seed_from_digest(&params_digest(&bg_seed_input)));
        let records = synthesize_records(
            &format!("{}_bg", key.combo_name()),
            self.config.generation.background_length,
            self.config.generation.seq_length,
            self.config.generation.gc_content,
            &mut rng,
        );
        write_fasta(bg_path, &records)
    }
}

/// First 16 hex digits of the digest as a u64 seed.
fn seed_from_digest(digest: &str) -> u64 {
    u64::from_str_radix(&digest[..16.min(digest.len())], 16).unwrap_or(0)
}

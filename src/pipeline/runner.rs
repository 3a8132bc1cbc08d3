//! Stage sequencing for the full benchmark run.
//!
//! Stages: generate datasets, run discovery, parse/score/export, heatmaps.
//! Failed units are reported but do not stop downstream stages unless
//! `halt_on_failed_units` is set.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::MotifabConfig;
use crate::dataset::{DatasetError, DatasetGenerator, GenerateSummary, MotifMatrix};
use crate::denovo::{DiscoveryTool, RunSummary, Scheduler, SchedulerError};
use crate::ledger::{Ledger, LedgerError};
use crate::results::{parse_results, write_dumps, write_heatmaps, ResultsError, ScoredMotif};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Results(#[from] ResultsError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// What a full run did, stage by stage.
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub generate: GenerateSummary,
    pub discovery: RunSummary,
    pub exports: BTreeMap<String, PathBuf>,
    pub heatmap_files: Vec<PathBuf>,
    /// Downstream stages were skipped because of failed units.
    pub halted: bool,
}

impl PipelineReport {
    /// Whether the run should map to a non-zero process exit.
    pub fn has_failures(&self) -> bool {
        self.discovery.has_failures()
    }
}

/// Drives the stages over one configuration and ledger.
pub struct Pipeline {
    config: MotifabConfig,
    ledger: Ledger,
    tool: Arc<dyn DiscoveryTool>,
}

impl Pipeline {
    pub fn new(config: MotifabConfig, ledger: Ledger, tool: Arc<dyn DiscoveryTool>) -> Self {
        Self {
            config,
            ledger,
            tool,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Stage 1: dataset generation and unit registration.
    pub async fn generate(&self) -> Result<GenerateSummary, PipelineError> {
        let generator = DatasetGenerator::new(&self.config, &self.ledger)?;
        Ok(generator.generate().await?)
    }

    /// Stage 2: discovery over all eligible units.
    pub async fn denovo(&self) -> Result<RunSummary, PipelineError> {
        let scheduler = Scheduler::new(&self.config, self.ledger.clone(), self.tool.clone());
        Ok(scheduler.run().await?)
    }

    /// Stage 3: parse, score, and export.
    pub async fn parse(
        &self,
    ) -> Result<(Vec<ScoredMotif>, BTreeMap<String, PathBuf>), PipelineError> {
        let ground_truth = MotifMatrix::from_spec(&self.config.motif)?;
        let rows = parse_results(&self.config, &self.ledger, &ground_truth).await?;
        let exports = write_dumps(&self.config, &self.ledger, &rows).await?;
        Ok((rows, exports))
    }

    /// Stage 4: heatmap grids.
    pub async fn heatmaps(&self, rows: &[ScoredMotif]) -> Result<Vec<PathBuf>, PipelineError> {
        Ok(write_heatmaps(&self.config, &self.ledger, rows).await?)
    }

    /// Runs every stage in order.
    pub async fn run_all(&self) -> Result<PipelineReport, PipelineError> {
        let mut report = PipelineReport {
            generate: self.generate().await?,
            ..Default::default()
        };

        report.discovery = self.denovo().await?;
        if report.discovery.has_failures() {
            warn!(
                failed = report.discovery.failed,
                "Discovery stage finished with failed units"
            );
            if self.config.halt_on_failed_units {
                report.halted = true;
                return Ok(report);
            }
        }

        let (rows, exports) = self.parse().await?;
        report.exports = exports;
        report.heatmap_files = self.heatmaps(&rows).await?;

        info!(
            datasets = report.generate.created,
            units = report.discovery.dispatched,
            exports = report.exports.len(),
            "Pipeline complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::denovo::{ToolError, ToolOutputs, ToolRequest};
    use crate::model::{BackgroundType, UnitStatus};
    use async_trait::async_trait;

    /// Writes a plausible discovery output for every request, optionally
    /// failing for one tool.
    struct FixtureTool {
        fail_tool: Option<String>,
    }

    #[async_trait]
    impl DiscoveryTool for FixtureTool {
        async fn run(&self, request: &ToolRequest) -> Result<ToolOutputs, ToolError> {
            if self.fail_tool.as_deref() == Some(request.key.tool.as_str()) {
                return Err(ToolError::NonZeroExit {
                    code: Some(1),
                    stderr: "no motifs".to_string(),
                });
            }
            tokio::fs::create_dir_all(&request.output_dir)
                .await
                .map_err(|source| ToolError::Spawn {
                    command: request.command.clone(),
                    source,
                })?;

            let motif = crate::dataset::MotifMatrix::from_consensus(
                "gimme_1_MEME_w7_1",
                "TGACTCA",
                None,
            )
            .map_err(|_| ToolError::MissingOutput(request.motif_file()))?;
            tokio::fs::write(request.motif_file(), motif.to_pfm_string())
                .await
                .map_err(|source| ToolError::Spawn {
                    command: request.command.clone(),
                    source,
                })?;
            tokio::fs::write(
                request.stats_file(),
                "motif\tphyper_at_fpr\ngimme_1_MEME_w7_1\t0.001\n",
            )
            .await
            .map_err(|source| ToolError::Spawn {
                command: request.command.clone(),
                source,
            })?;

            Ok(ToolOutputs {
                motif_file: request.motif_file(),
                stats_file: request.stats_file(),
                errors_detected: false,
                log_excerpt: None,
            })
        }
    }

    fn small_config(dir: &std::path::Path) -> MotifabConfig {
        let mut config = MotifabConfig::template();
        config.output_dir = dir.to_path_buf();
        config.sweep.seq_amounts = vec![100];
        config.sweep.injection_rates = vec![0.5];
        config.sweep.n_replicates = 1;
        config.generation.seq_length = 40;
        config.generation.background_length = 10;
        config.denovo.background_types = vec![BackgroundType::Random];
        config.denovo.tools = vec!["MEME".to_string()];
        config.denovo.max_parallel = 2;
        config
    }

    #[tokio::test]
    async fn test_run_all_happy_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(dir.path());
        let ledger = Ledger::open_in_memory().await.unwrap();
        let pipeline = Pipeline::new(config, ledger, Arc::new(FixtureTool { fail_tool: None }));

        let report = pipeline.run_all().await.unwrap();
        assert_eq!(report.generate.created, 1);
        assert_eq!(report.discovery.succeeded, 1);
        assert!(!report.has_failures());
        assert!(!report.halted);
        assert_eq!(report.exports.len(), 3);
        assert!(!report.heatmap_files.is_empty());

        let units = pipeline.ledger().all_units().await.unwrap();
        assert!(units.iter().all(|u| u.status == UnitStatus::Completed));
    }

    #[tokio::test]
    async fn test_failures_reported_but_downstream_runs() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config(dir.path());
        config.denovo.tools = vec!["MEME".to_string(), "Homer".to_string()];
        let ledger = Ledger::open_in_memory().await.unwrap();
        let pipeline = Pipeline::new(
            config,
            ledger,
            Arc::new(FixtureTool {
                fail_tool: Some("Homer".to_string()),
            }),
        );

        let report = pipeline.run_all().await.unwrap();
        assert!(report.has_failures());
        assert!(!report.halted);
        // Exports still written from the surviving unit
        assert_eq!(report.exports.len(), 3);
    }

    #[tokio::test]
    async fn test_halt_on_failed_units() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config(dir.path());
        config.halt_on_failed_units = true;
        let ledger = Ledger::open_in_memory().await.unwrap();
        let pipeline = Pipeline::new(
            config,
            ledger,
            Arc::new(FixtureTool {
                fail_tool: Some("MEME".to_string()),
            }),
        );

        let report = pipeline.run_all().await.unwrap();
        assert!(report.has_failures());
        assert!(report.halted);
        assert!(report.exports.is_empty());
    }
}

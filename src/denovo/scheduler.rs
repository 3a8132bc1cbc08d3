//! Bounded-parallel dispatch of discovery units.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::{DiscoveryTool, ToolRequest};
use crate::config::MotifabConfig;
use crate::ledger::{Ledger, LedgerError, PendingFilter};
use crate::model::{UnitStatus, UnitUpdate, WorkUnit};
use thiserror::Error;

/// Errors fatal to the discovery stage. Individual tool failures are not
/// errors at this level; they land in the [`RunSummary`].
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A worker task panicked or was cancelled.
    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// End-of-run accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub dispatched: usize,
    pub succeeded: usize,
    pub completed_with_errors: usize,
    pub failed: usize,
    pub failed_keys: Vec<String>,
}

impl RunSummary {
    /// Whether any unit ended in `failed_denovo`.
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Dispatches eligible units to the discovery tool, at most `max_parallel`
/// at a time.
pub struct Scheduler {
    ledger: Ledger,
    tool: Arc<dyn DiscoveryTool>,
    config: MotifabConfig,
}

impl Scheduler {
    pub fn new(config: &MotifabConfig, ledger: Ledger, tool: Arc<dyn DiscoveryTool>) -> Self {
        Self {
            ledger,
            tool,
            config: config.clone(),
        }
    }

    /// Runs the discovery stage over all eligible units.
    ///
    /// Eligibility: `pending` always; `failed_denovo` when `rerun_failed`;
    /// everything when `force`. A unit failure never aborts the run.
    pub async fn run(&self) -> Result<RunSummary, SchedulerError> {
        // Units left running by a crashed process become retry-eligible.
        self.ledger.recover_interrupted().await?;

        let filter = if self.config.denovo.force {
            PendingFilter::All
        } else if self.config.denovo.rerun_failed {
            PendingFilter::PendingAndFailed
        } else {
            PendingFilter::PendingOnly
        };

        let units = self.ledger.eligible(filter).await?;
        if units.is_empty() {
            warn!("No units eligible for discovery");
            return Ok(RunSummary::default());
        }
        info!(count = units.len(), max_parallel = self.config.denovo.max_parallel, "Dispatching units");

        let semaphore = Arc::new(Semaphore::new(self.config.denovo.max_parallel));
        let mut tasks = JoinSet::new();
        let mut summary = RunSummary {
            dispatched: units.len(),
            ..Default::default()
        };

        for unit in units {
            let request = match self.build_request(&unit) {
                Some(request) => request,
                None => {
                    // Dataset artifacts were never registered for this unit.
                    self.ledger
                        .upsert(
                            &unit.key,
                            UnitUpdate::new()
                                .with_status(UnitStatus::FailedDenovo)
                                .with_error("dataset artifacts missing"),
                        )
                        .await?;
                    summary.failed += 1;
                    summary.failed_keys.push(unit.key.name());
                    continue;
                }
            };

            let permit = semaphore.clone();
            let ledger = self.ledger.clone();
            let tool = self.tool.clone();
            tasks.spawn(async move {
                // Holding the permit for the whole unit bounds concurrency.
                // The semaphore outlives every task and is never closed.
                let _permit = permit
                    .acquire_owned()
                    .await
                    .expect("scheduler semaphore closed");
                run_unit(ledger, tool, request).await
            });
        }

        while let Some(result) = tasks.join_next().await {
            let (key_name, status) = result??;
            match status {
                UnitStatus::Completed => summary.succeeded += 1,
                UnitStatus::CompletedWithErrors => {
                    summary.succeeded += 1;
                    summary.completed_with_errors += 1;
                }
                _ => {
                    summary.failed += 1;
                    summary.failed_keys.push(key_name);
                }
            }
        }
        summary.failed_keys.sort();

        if summary.has_failures() {
            error!(
                failed = summary.failed,
                keys = ?summary.failed_keys,
                "Discovery finished with failures"
            );
        } else {
            info!(succeeded = summary.succeeded, "Discovery finished");
        }
        Ok(summary)
    }

    fn build_request(&self, unit: &WorkUnit) -> Option<ToolRequest> {
        let test_fasta = unit.test_fasta.clone()?;
        let background_fasta = unit.background_fasta.clone()?;
        Some(ToolRequest {
            key: unit.key.clone(),
            test_fasta,
            background_fasta,
            output_dir: self.config.output_dir.join("denovo").join(unit.key.name()),
            genome: self.config.denovo.genome.clone(),
            ncpus: self.config.denovo.ncpus,
            command: self.config.denovo.command.clone(),
        })
    }
}

/// Runs one unit through its full status lifecycle. Every transition is a
/// durable ledger write before the next step starts.
async fn run_unit(
    ledger: Ledger,
    tool: Arc<dyn DiscoveryTool>,
    request: ToolRequest,
) -> Result<(String, UnitStatus), LedgerError> {
    let key = request.key.clone();

    ledger
        .upsert(
            &key,
            UnitUpdate::new()
                .with_status(UnitStatus::Running)
                .with_output_dir(&request.output_dir),
        )
        .await?;
    ledger.clear_error(&key).await?;

    let status = match tool.run(&request).await {
        Ok(outputs) => {
            let status = if outputs.errors_detected {
                UnitStatus::CompletedWithErrors
            } else {
                UnitStatus::Completed
            };
            let mut update = UnitUpdate::new()
                .with_status(status)
                .with_motif_file(outputs.motif_file)
                .with_stats_file(outputs.stats_file);
            if let Some(line) = outputs.log_excerpt {
                update = update.with_error(line);
            }
            ledger.upsert(&key, update).await?;
            status
        }
        Err(e) => {
            warn!(unit = %key, error = %e, "Unit failed");
            ledger
                .upsert(
                    &key,
                    UnitUpdate::new()
                        .with_status(UnitStatus::FailedDenovo)
                        .with_error(e.to_string()),
                )
                .await?;
            UnitStatus::FailedDenovo
        }
    };

    Ok((key.name(), status))
}

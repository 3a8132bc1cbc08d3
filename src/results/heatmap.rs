//! Discovery heatmap grids.
//!
//! For each (tool, background) pair a grid is built with injection rates as
//! rows and dataset sizes as columns; each cell counts the replicates that
//! recovered the injected motif at least once. Grids are emitted as CSV files
//! plus a JSON index; image rendering is left to downstream plotting.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use super::{ResultsError, ScoredMotif};
use crate::config::MotifabConfig;
use crate::ledger::Ledger;
use crate::model::BackgroundType;

/// One count grid for a (tool, background) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapGrid {
    pub tool: String,
    pub background: BackgroundType,
    pub only_significant: bool,
    /// Row labels, ascending.
    pub rates_pct: Vec<u32>,
    /// Column labels, ascending.
    pub seq_amounts: Vec<u32>,
    /// `counts[row][col]` = replicates with at least one matching motif.
    pub counts: Vec<Vec<u32>>,
}

impl HeatmapGrid {
    fn build(
        rows: &[ScoredMotif],
        tool: &str,
        background: BackgroundType,
        only_significant: bool,
    ) -> Self {
        let rates_pct: Vec<u32> = rows
            .iter()
            .map(|r| r.key.rate_pct)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let seq_amounts: Vec<u32> = rows
            .iter()
            .map(|r| r.key.seq_amount)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let counts = rates_pct
            .iter()
            .map(|&rate| {
                seq_amounts
                    .iter()
                    .map(|&amount| {
                        let replicates: BTreeSet<u32> = rows
                            .iter()
                            .filter(|r| {
                                r.key.rate_pct == rate
                                    && r.key.seq_amount == amount
                                    && r.key.background == background
                                    && r.tool == tool
                                    && r.is_match
                                    && (!only_significant || r.significant)
                            })
                            .map(|r| r.key.replicate)
                            .collect();
                        replicates.len() as u32
                    })
                    .collect()
            })
            .collect();

        Self {
            tool: tool.to_string(),
            background,
            only_significant,
            rates_pct,
            seq_amounts,
            counts,
        }
    }

    fn filename(&self) -> String {
        let suffix = if self.only_significant { "_sig" } else { "" };
        format!("{}_{}{}.csv", self.tool, self.background, suffix)
    }

    fn to_csv(&self) -> String {
        let mut out = String::from("injection_rate");
        for amount in &self.seq_amounts {
            out.push_str(&format!(",{}", amount));
        }
        out.push('\n');
        for (row, &rate) in self.rates_pct.iter().enumerate() {
            out.push_str(&format!("{}", rate as f64 / 100.0));
            for cell in &self.counts[row] {
                out.push_str(&format!(",{}", cell));
            }
            out.push('\n');
        }
        out
    }
}

#[derive(Serialize)]
struct IndexEntry {
    tool: String,
    background: String,
    only_significant: bool,
    path: String,
}

/// Builds and writes all heatmap grids under `heatmaps/`, in both plain and
/// significance-gated variants, and records the index in ledger meta
/// `generated_heatmaps`.
pub async fn write_heatmaps(
    config: &MotifabConfig,
    ledger: &Ledger,
    rows: &[ScoredMotif],
) -> Result<Vec<PathBuf>, ResultsError> {
    let out_dir = config.output_dir.join("heatmaps");
    fs::create_dir_all(&out_dir).map_err(|e| ResultsError::io(&out_dir, e))?;

    let tools: BTreeSet<&str> = rows.iter().map(|r| r.tool.as_str()).collect();
    let backgrounds: BTreeSet<BackgroundType> = rows.iter().map(|r| r.key.background).collect();

    let mut written = Vec::new();
    let mut index = Vec::new();
    for tool in &tools {
        for &background in &backgrounds {
            for only_significant in [false, true] {
                let grid = HeatmapGrid::build(rows, tool, background, only_significant);
                let path = out_dir.join(grid.filename());
                fs::write(&path, grid.to_csv()).map_err(|e| ResultsError::io(&path, e))?;
                index.push(IndexEntry {
                    tool: grid.tool.clone(),
                    background: background.to_string(),
                    only_significant,
                    path: path.display().to_string(),
                });
                written.push(path);
            }
        }
    }

    let index_path = out_dir.join("index.json");
    fs::write(&index_path, serde_json::to_string_pretty(&index)?)
        .map_err(|e| ResultsError::io(&index_path, e))?;
    ledger
        .set_meta("generated_heatmaps", &serde_json::to_string(&index)?)
        .await?;
    written.push(index_path);

    info!(grids = index.len(), "Wrote heatmap grids");
    Ok(written)
}

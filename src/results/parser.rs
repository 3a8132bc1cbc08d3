//! Parsing and scoring of discovery outputs.
//!
//! For every successful unit, the discovered-motif PFM file and the
//! per-background stats file are read, each motif is matched against the
//! ground truth, and one [`ScoredMotif`] row is produced per discovered
//! motif. Missing or malformed per-unit files are warnings, not failures.

use std::collections::HashMap;
use std::fs;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, warn};

use super::ResultsError;
use crate::config::MotifabConfig;
use crate::dataset::MotifMatrix;
use crate::ledger::Ledger;
use crate::matching::match_motif;
use crate::model::{UnitKey, WorkUnit};

/// Significance threshold on the hypergeometric p-value.
const P_THRESHOLD: f64 = 0.05;

/// One scored discovered motif, the row unit of all exports.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMotif {
    pub key: UnitKey,
    pub motif_id: String,
    /// Tool derived from the motif id, which can differ from the unit's tool
    /// when a combined runner emits merged ids.
    pub tool: String,
    pub consensus: String,
    pub p_value: Option<f64>,
    pub significant: bool,
    pub score: Option<f64>,
    pub is_match: bool,
}

/// Extracts the originating tool from a motif id.
///
/// Combined-runner ids look like `GimmeMotifs_{i}`; per-tool ids look like
/// `gimme_{i}_{tool}_w{width}_{k}`.
pub fn tool_from_motif_id(motif_id: &str) -> &str {
    static PER_TOOL: OnceLock<Regex> = OnceLock::new();
    // Literal pattern, cannot fail to compile.
    let re = PER_TOOL
        .get_or_init(|| Regex::new(r"^gimme_\d+_([A-Za-z0-9]+)_w\d+").expect("literal regex"));

    if motif_id.starts_with("GimmeMotifs_") {
        return "GimmeMotifs";
    }
    if let Some(caps) = re.captures(motif_id) {
        if let Some(m) = caps.get(1) {
            return m.as_str();
        }
    }
    "unknown"
}

/// Parses the `phyper_at_fpr` column of a stats file into a per-motif map.
///
/// Format: optional `#` comment lines, one tab-separated header row, then one
/// row per motif with the motif id in the first column.
pub fn parse_stats_str(raw: &str) -> HashMap<String, f64> {
    let mut pmap = HashMap::new();
    let mut p_idx: Option<usize> = None;
    let mut saw_header = false;

    for line in raw.lines() {
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.trim_end().split('\t').collect();
        if !saw_header {
            saw_header = true;
            p_idx = parts.iter().position(|c| *c == "phyper_at_fpr");
            if p_idx.is_none() {
                return pmap;
            }
            continue;
        }
        let idx = match p_idx {
            Some(idx) => idx,
            None => return pmap,
        };
        if let Some(raw_p) = parts.get(idx) {
            if let Ok(p) = raw_p.parse::<f64>() {
                pmap.insert(parts[0].to_string(), p);
            }
        }
    }
    pmap
}

/// Parses and scores every successful unit in the ledger.
pub async fn parse_results(
    config: &MotifabConfig,
    ledger: &Ledger,
    ground_truth: &MotifMatrix,
) -> Result<Vec<ScoredMotif>, ResultsError> {
    let truths = vec![(
        ground_truth.id().to_string(),
        ground_truth.matrix().clone(),
    )];

    let mut rows = Vec::new();
    for unit in ledger.all_units().await? {
        if !unit.status.is_success() {
            continue;
        }
        rows.extend(score_unit(config, &unit, &truths));
    }

    info!(rows = rows.len(), "Parsed discovery results");
    Ok(rows)
}

fn score_unit(
    config: &MotifabConfig,
    unit: &WorkUnit,
    truths: &[(String, ndarray::Array2<f64>)],
) -> Vec<ScoredMotif> {
    let motif_file = match &unit.motif_file {
        Some(path) => path.clone(),
        None => {
            warn!(unit = %unit.key, "Completed unit has no motif file recorded");
            return Vec::new();
        }
    };

    let motifs = match MotifMatrix::parse_file(&motif_file) {
        Ok(motifs) => motifs,
        Err(e) => {
            warn!(unit = %unit.key, error = %e, "Skipping unreadable motif file");
            return Vec::new();
        }
    };

    let pmap = unit
        .stats_file
        .as_ref()
        .and_then(|path| match fs::read_to_string(path) {
            Ok(raw) => Some(parse_stats_str(&raw)),
            Err(e) => {
                warn!(unit = %unit.key, error = %e, "Stats file unreadable");
                None
            }
        })
        .unwrap_or_default();

    let mut rows = Vec::new();
    for motif in motifs {
        let record = match match_motif(motif.id(), motif.matrix(), truths, &config.matching) {
            Ok(record) => record,
            Err(e) => {
                // Malformed matrix: exclude this record from aggregates.
                warn!(unit = %unit.key, motif = motif.id(), error = %e, "Skipping unmatched motif");
                continue;
            }
        };

        let p_value = pmap.get(motif.id()).copied();
        rows.push(ScoredMotif {
            key: unit.key.clone(),
            motif_id: motif.id().to_string(),
            tool: tool_from_motif_id(motif.id()).to_string(),
            consensus: motif.consensus(),
            p_value,
            significant: p_value.map(|p| p < P_THRESHOLD).unwrap_or(false),
            score: Some(record.score),
            is_match: record.is_match,
        });
    }
    rows
}

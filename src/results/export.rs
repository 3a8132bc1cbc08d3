//! CSV exports of scored motifs.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use tracing::info;

use super::{ResultsError, ScoredMotif};
use crate::config::MotifabConfig;
use crate::ledger::Ledger;

const HEADERS: &[&str] = &[
    "dataset_length",
    "injection_rate",
    "replicate",
    "background",
    "tool",
    "motif_id",
    "motif_consensus",
    "p_value",
    "significant",
    "match_score",
    "is_match",
];

/// Writes every configured dump and records the paths in ledger meta
/// `parsed_results`. Returns the written paths keyed by dump filename.
pub async fn write_dumps(
    config: &MotifabConfig,
    ledger: &Ledger,
    rows: &[ScoredMotif],
) -> Result<BTreeMap<String, PathBuf>, ResultsError> {
    let out_dir = config.output_dir.join("results");
    fs::create_dir_all(&out_dir).map_err(|e| ResultsError::io(&out_dir, e))?;

    // Grouped order: combination, replicate, tool, motif id.
    let mut sorted: Vec<&ScoredMotif> = rows.iter().collect();
    sorted.sort_by(|a, b| {
        a.key
            .name()
            .cmp(&b.key.name())
            .then_with(|| a.tool.cmp(&b.tool))
            .then_with(|| a.motif_id.cmp(&b.motif_id))
    });

    let mut written = BTreeMap::new();
    for dump in &config.export.dumps {
        let path = out_dir.join(&dump.filename);
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(HEADERS)?;

        for row in &sorted {
            if dump.only_matches && !row.is_match {
                continue;
            }
            if dump.only_significant && !row.significant {
                continue;
            }
            writer.write_record([
                row.key.seq_amount.to_string(),
                format!("{}", row.key.injection_rate()),
                row.key.replicate.to_string(),
                row.key.background.to_string(),
                row.tool.clone(),
                row.motif_id.clone(),
                row.consensus.clone(),
                row.p_value.map(|p| p.to_string()).unwrap_or_default(),
                row.significant.to_string(),
                row.score.map(|s| s.to_string()).unwrap_or_default(),
                row.is_match.to_string(),
            ])?;
        }
        writer.flush().map_err(|e| ResultsError::io(&path, e))?;
        info!(dump = %dump.filename, path = %path.display(), "Wrote export");
        written.insert(dump.filename.clone(), path);
    }

    let meta: BTreeMap<&String, String> = written
        .iter()
        .map(|(name, path)| (name, path.display().to_string()))
        .collect();
    ledger
        .set_meta("parsed_results", &serde_json::to_string(&meta)?)
        .await?;

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BackgroundType, UnitKey};

    fn row(replicate: u32, motif_id: &str, is_match: bool, significant: bool) -> ScoredMotif {
        ScoredMotif {
            key: UnitKey::new(100, 0.5, replicate, BackgroundType::Random, "MEME"),
            motif_id: motif_id.to_string(),
            tool: "MEME".to_string(),
            consensus: "TGACTCA".to_string(),
            p_value: significant.then_some(0.01),
            significant,
            score: Some(0.9),
            is_match,
        }
    }

    fn count_data_rows(path: &PathBuf) -> usize {
        let raw = std::fs::read_to_string(path).unwrap();
        raw.lines().count() - 1
    }

    #[tokio::test]
    async fn test_dump_filters() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MotifabConfig::template();
        config.output_dir = dir.path().to_path_buf();

        let rows = vec![
            row(1, "gimme_1_MEME_w7_1", true, true),
            row(1, "gimme_2_MEME_w7_1", true, false),
            row(2, "gimme_3_MEME_w7_1", false, false),
        ];

        let ledger = Ledger::open_in_memory().await.unwrap();
        let written = write_dumps(&config, &ledger, &rows).await.unwrap();
        assert_eq!(written.len(), 3);

        assert_eq!(count_data_rows(&written["all_discovered_motifs.csv"]), 3);
        assert_eq!(count_data_rows(&written["matched_discovered_motifs.csv"]), 2);
        assert_eq!(
            count_data_rows(&written["significant_discovered_motifs.csv"]),
            1
        );

        // Paths recorded in ledger meta
        let meta = ledger.get_meta("parsed_results").await.unwrap().unwrap();
        assert!(meta.contains("all_discovered_motifs.csv"));
    }

    #[tokio::test]
    async fn test_dump_header_and_row_shape() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MotifabConfig::template();
        config.output_dir = dir.path().to_path_buf();

        let ledger = Ledger::open_in_memory().await.unwrap();
        let rows = vec![row(1, "gimme_1_MEME_w7_1", true, true)];
        let written = write_dumps(&config, &ledger, &rows).await.unwrap();

        let raw = std::fs::read_to_string(&written["all_discovered_motifs.csv"]).unwrap();
        let mut lines = raw.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("dataset_length,injection_rate,replicate"));
        let data = lines.next().unwrap();
        assert!(data.starts_with("100,0.5,1,random,MEME,gimme_1_MEME_w7_1,TGACTCA"));
    }
}

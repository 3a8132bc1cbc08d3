//! Position probability matrices for injected and discovered motifs.

use std::fs;
use std::path::Path;

use ndarray::Array2;
use rand::Rng;

use super::DatasetError;
use crate::config::MotifSpec;

const BASES: [char; 4] = ['A', 'C', 'G', 'T'];

/// Pseudocount applied when normalizing count rows.
const PSEUDOCOUNT: f64 = 1e-4;

/// A motif as a row-per-position, 4-column (A C G T) probability matrix.
/// Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct MotifMatrix {
    id: String,
    matrix: Array2<f64>,
}

impl MotifMatrix {
    /// Builds the ground-truth motif from its configured source.
    pub fn from_spec(spec: &MotifSpec) -> Result<Self, DatasetError> {
        match spec {
            MotifSpec::Pfm { pfm } => Self::first_from_file(pfm, "ground_truth"),
            MotifSpec::Ppm { ppm } => Self::first_from_file(ppm, "ground_truth"),
            MotifSpec::Consensus {
                consensus,
                mutation_rate,
            } => Self::from_consensus("ground_truth", consensus, *mutation_rate),
        }
    }

    /// Builds a matrix from an IUPAC consensus string.
    ///
    /// With a `mutation_rate` (ACGT-only consensus), each position keeps its
    /// base with probability `1 - rate` and spreads `rate` evenly over the
    /// other three. Without one, ambiguity codes spread probability evenly
    /// over their base set.
    pub fn from_consensus(
        id: impl Into<String>,
        consensus: &str,
        mutation_rate: Option<f64>,
    ) -> Result<Self, DatasetError> {
        if consensus.is_empty() {
            return Err(DatasetError::InvalidMotif(
                "consensus string is empty".to_string(),
            ));
        }

        let mut matrix = Array2::zeros((consensus.chars().count(), 4));
        for (row, c) in consensus.chars().enumerate() {
            let bases = iupac_bases(c).ok_or_else(|| {
                DatasetError::InvalidMotif(format!("'{}' is not an IUPAC code", c))
            })?;
            match mutation_rate {
                Some(rate) if bases.len() == 1 => {
                    for col in 0..4 {
                        matrix[[row, col]] = if bases.contains(&col) {
                            1.0 - rate
                        } else {
                            rate / 3.0
                        };
                    }
                }
                _ => {
                    let p = 1.0 / bases.len() as f64;
                    for &col in &bases {
                        matrix[[row, col]] = p;
                    }
                }
            }
        }

        Ok(Self {
            id: id.into(),
            matrix,
        })
    }

    /// Parses all motifs from a PFM/PPM file (`>id` headers followed by rows
    /// of 4 values). Rows are normalized to probabilities, so count matrices
    /// and probability matrices parse identically.
    pub fn parse_file(path: impl AsRef<Path>) -> Result<Vec<Self>, DatasetError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| DatasetError::io(path, e))?;
        Self::parse_str(&raw).map_err(|message| {
            DatasetError::InvalidMotif(format!("{}: {}", path.display(), message))
        })
    }

    /// Parses motifs from PFM-format text.
    pub fn parse_str(raw: &str) -> Result<Vec<Self>, String> {
        let mut motifs = Vec::new();
        let mut current_id: Option<String> = None;
        let mut rows: Vec<[f64; 4]> = Vec::new();

        let mut flush = |id: Option<String>, rows: &mut Vec<[f64; 4]>| -> Result<(), String> {
            if let Some(id) = id {
                if rows.is_empty() {
                    return Err(format!("motif '{}' has no rows", id));
                }
                let mut matrix = Array2::zeros((rows.len(), 4));
                for (r, row) in rows.iter().enumerate() {
                    for c in 0..4 {
                        matrix[[r, c]] = row[c];
                    }
                }
                motifs.push(MotifMatrix { id, matrix });
                rows.clear();
            }
            Ok(())
        };

        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(id) = line.strip_prefix('>') {
                flush(current_id.take(), &mut rows)?;
                current_id = Some(id.trim().to_string());
            } else {
                if current_id.is_none() {
                    return Err(format!("row before any '>' header: '{}'", line));
                }
                let values: Vec<f64> = line
                    .split_whitespace()
                    .map(|v| v.parse::<f64>())
                    .collect::<Result<_, _>>()
                    .map_err(|e| format!("bad row '{}': {}", line, e))?;
                if values.len() != 4 {
                    return Err(format!(
                        "expected 4 values per row, got {} in '{}'",
                        values.len(),
                        line
                    ));
                }
                rows.push(normalize_row(&values));
            }
        }
        flush(current_id, &mut rows)?;

        Ok(motifs)
    }

    fn first_from_file(path: &Path, id: &str) -> Result<Self, DatasetError> {
        let motifs = Self::parse_file(path)?;
        let first = motifs.into_iter().next().ok_or_else(|| {
            DatasetError::InvalidMotif(format!("{}: no motifs in file", path.display()))
        })?;
        Ok(Self {
            id: id.to_string(),
            matrix: first.matrix,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn width(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    /// Draws one concrete instance, weighted per column.
    pub fn sample(&self, rng: &mut impl Rng) -> String {
        let mut out = String::with_capacity(self.width());
        for row in 0..self.width() {
            let draw: f64 = rng.gen();
            let mut acc = 0.0;
            let mut picked = 3;
            for col in 0..4 {
                acc += self.matrix[[row, col]];
                if draw < acc {
                    picked = col;
                    break;
                }
            }
            out.push(BASES[picked]);
        }
        out
    }

    /// Highest-probability base per position.
    pub fn consensus(&self) -> String {
        (0..self.width())
            .map(|row| {
                let mut best = 0;
                for col in 1..4 {
                    if self.matrix[[row, col]] > self.matrix[[row, best]] {
                        best = col;
                    }
                }
                BASES[best]
            })
            .collect()
    }

    /// Renders the motif in PFM format.
    pub fn to_pfm_string(&self) -> String {
        let mut out = format!(">{}\n", self.id);
        for row in 0..self.width() {
            let cells: Vec<String> = (0..4)
                .map(|col| format!("{:.4}", self.matrix[[row, col]]))
                .collect();
            out.push_str(&cells.join("\t"));
            out.push('\n');
        }
        out
    }
}

fn normalize_row(values: &[f64]) -> [f64; 4] {
    let total: f64 = values.iter().sum();
    let mut row = [0.0; 4];
    for i in 0..4 {
        row[i] = (values[i] + PSEUDOCOUNT) / (total + 4.0 * PSEUDOCOUNT);
    }
    row
}

fn iupac_bases(c: char) -> Option<Vec<usize>> {
    // Column order A C G T
    let bases = match c.to_ascii_uppercase() {
        'A' => vec![0],
        'C' => vec![1],
        'G' => vec![2],
        'T' => vec![3],
        'R' => vec![0, 2],
        'Y' => vec![1, 3],
        'S' => vec![1, 2],
        'W' => vec![0, 3],
        'K' => vec![2, 3],
        'M' => vec![0, 1],
        'B' => vec![1, 2, 3],
        'D' => vec![0, 2, 3],
        'H' => vec![0, 1, 3],
        'V' => vec![0, 1, 2],
        'N' => vec![0, 1, 2, 3],
        _ => return None,
    };
    Some(bases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_consensus_exact() {
        let motif = MotifMatrix::from_consensus("m", "ACGT", None).unwrap();
        assert_eq!(motif.width(), 4);
        assert_eq!(motif.matrix()[[0, 0]], 1.0);
        assert_eq!(motif.matrix()[[1, 1]], 1.0);
        assert_eq!(motif.consensus(), "ACGT");

        let mut rng = ChaCha8Rng::seed_from_u64(7);
        assert_eq!(motif.sample(&mut rng), "ACGT");
    }

    #[test]
    fn test_consensus_iupac_spread() {
        let motif = MotifMatrix::from_consensus("m", "SN", None).unwrap();
        // S = C or G
        assert_eq!(motif.matrix()[[0, 1]], 0.5);
        assert_eq!(motif.matrix()[[0, 2]], 0.5);
        assert_eq!(motif.matrix()[[0, 0]], 0.0);
        // N = uniform
        assert_eq!(motif.matrix()[[1, 3]], 0.25);
    }

    #[test]
    fn test_consensus_mutation_rate() {
        let motif = MotifMatrix::from_consensus("m", "AC", Some(0.3)).unwrap();
        assert!((motif.matrix()[[0, 0]] - 0.7).abs() < 1e-12);
        assert!((motif.matrix()[[0, 1]] - 0.1).abs() < 1e-12);
        let row_sum: f64 = (0..4).map(|c| motif.matrix()[[1, c]]).sum();
        assert!((row_sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_consensus_rejected() {
        assert!(MotifMatrix::from_consensus("m", "", None).is_err());
        assert!(MotifMatrix::from_consensus("m", "AXC", None).is_err());
    }

    #[test]
    fn test_parse_pfm_counts_and_probs() {
        let raw = "\
>GimmeMotifs_1
10 0 0 0
0 10 0 0
>GimmeMotifs_2
0.25 0.25 0.25 0.25
";
        let motifs = MotifMatrix::parse_str(raw).unwrap();
        assert_eq!(motifs.len(), 2);
        assert_eq!(motifs[0].id(), "GimmeMotifs_1");
        assert_eq!(motifs[0].width(), 2);
        // Counts normalized to probabilities
        assert!(motifs[0].matrix()[[0, 0]] > 0.99);
        let row_sum: f64 = (0..4).map(|c| motifs[0].matrix()[[0, c]]).sum();
        assert!((row_sum - 1.0).abs() < 1e-9);
        assert!((motifs[1].matrix()[[0, 2]] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(MotifMatrix::parse_str("0.25 0.25 0.25 0.25").is_err());
        assert!(MotifMatrix::parse_str(">m\n0.5 0.5").is_err());
        assert!(MotifMatrix::parse_str(">m\na b c d").is_err());
        assert!(MotifMatrix::parse_str(">m\n").is_err());
    }

    #[test]
    fn test_pfm_round_trip() {
        let motif = MotifMatrix::from_consensus("jaspar", "TGACTCA", Some(0.12)).unwrap();
        let rendered = motif.to_pfm_string();
        let parsed = MotifMatrix::parse_str(&rendered).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].id(), "jaspar");
        assert_eq!(parsed[0].width(), motif.width());
        assert_eq!(parsed[0].consensus(), "TGACTCA");
    }

    #[test]
    fn test_sample_respects_distribution() {
        let motif = MotifMatrix::from_consensus("m", "A", Some(0.3)).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let draws = 2000;
        let a_count = (0..draws)
            .filter(|_| motif.sample(&mut rng) == "A")
            .count();
        let frac = a_count as f64 / draws as f64;
        assert!((frac - 0.7).abs() < 0.05, "A fraction was {}", frac);
    }

    #[test]
    fn test_from_spec_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("motif.pfm");
        std::fs::write(&path, ">jun\n8 1 1 0\n0 0 0 10\n").unwrap();

        let motif = MotifMatrix::from_spec(&MotifSpec::Pfm { pfm: path }).unwrap();
        assert_eq!(motif.id(), "ground_truth");
        assert_eq!(motif.width(), 2);
        assert_eq!(motif.consensus(), "AT");
    }
}

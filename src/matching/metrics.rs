//! Column-level similarity and distance metrics.

use serde::{Deserialize, Serialize};

/// Pseudo-probability floor used inside log terms.
const LOG_FLOOR: f64 = 1e-6;

/// Uniform background probability per nucleotide.
pub const UNIFORM_BG: [f64; 4] = [0.25, 0.25, 0.25, 0.25];

/// Alignment mode for comparing two matrices of possibly different widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Score every column of the wider matrix at every offset; positions the
    /// narrower matrix does not cover are scored against the uniform
    /// background.
    Total,
    /// Best offset, scoring only the overlapping columns.
    Partial,
    /// Best offset plus the best contiguous sub-window of the overlap.
    Subtotal,
}

/// How per-column scores aggregate into a single score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combine {
    Mean,
    Sum,
}

impl Combine {
    pub fn apply(&self, scores: &[f64]) -> f64 {
        let sum: f64 = scores.iter().sum();
        match self {
            Combine::Sum => sum,
            Combine::Mean => {
                if scores.is_empty() {
                    0.0
                } else {
                    sum / scores.len() as f64
                }
            }
        }
    }
}

/// Column-similarity metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Pearson correlation of log-odds weights.
    Seqcor,
    /// Pearson correlation of probabilities.
    Pcc,
    /// Euclidean distance.
    Ed,
    /// Weighted information content overlap.
    Wic,
    /// Chi-square distance.
    Chisq,
    /// Symmetric average Kullback-Leibler divergence, sign-flipped so larger
    /// is more similar (maximum 0 for identical columns).
    Akl,
    /// Sum of squared differences.
    Ssd,
}

impl Metric {
    /// Whether smaller scores mean closer matches.
    pub fn is_distance(&self) -> bool {
        matches!(self, Metric::Ed | Metric::Chisq | Metric::Ssd)
    }

    /// Scores one pair of probability columns.
    pub fn column_score(&self, a: &[f64; 4], b: &[f64; 4]) -> f64 {
        match self {
            Metric::Seqcor => pearson(&log_odds(a), &log_odds(b)),
            Metric::Pcc => pearson(a, b),
            Metric::Ed => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y).powi(2))
                .sum::<f64>()
                .sqrt(),
            Metric::Wic => wic(a, b),
            Metric::Chisq => a
                .iter()
                .zip(b)
                .map(|(x, y)| {
                    let denom = x + y;
                    if denom > 0.0 {
                        (x - y).powi(2) / denom
                    } else {
                        0.0
                    }
                })
                .sum(),
            Metric::Akl => -0.5 * (kl(a, b) + kl(b, a)),
            Metric::Ssd => a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum(),
        }
    }

    /// Score normalized so that larger always means more similar, for
    /// threshold comparison and tie-breaking.
    pub fn normalize_direction(&self, score: f64) -> f64 {
        if self.is_distance() {
            -score
        } else {
            score
        }
    }
}

fn log_odds(p: &[f64; 4]) -> [f64; 4] {
    let mut out = [0.0; 4];
    for (i, &v) in p.iter().enumerate() {
        out[i] = (v.max(LOG_FLOOR) / 0.25).log2();
    }
    out
}

/// Pearson correlation over two 4-vectors. Identical vectors give 1.0; if
/// either vector has zero variance and they differ, the correlation is
/// undefined and we return 0.0.
fn pearson(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    if a == b {
        return 1.0;
    }
    let mean_a: f64 = a.iter().sum::<f64>() / 4.0;
    let mean_b: f64 = b.iter().sum::<f64>() / 4.0;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..4 {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let denom = (var_a * var_b).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        cov / denom
    }
}

/// Shared information content: for each base, the sign-agreeing part of the
/// per-base information contribution `p * log2(p / 0.25)`.
fn wic(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let mut total = 0.0;
    for i in 0..4 {
        let ia = a[i] * (a[i].max(LOG_FLOOR) / 0.25).log2();
        let ib = b[i] * (b[i].max(LOG_FLOOR) / 0.25).log2();
        if ia.signum() == ib.signum() {
            total += ia.abs().min(ib.abs()) * ia.signum();
        }
    }
    total
}

fn kl(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let p = x.max(LOG_FLOOR);
            let q = y.max(LOG_FLOOR);
            p * (p / q).log2()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEAKED: [f64; 4] = [0.85, 0.05, 0.05, 0.05];
    const SHIFTED: [f64; 4] = [0.05, 0.85, 0.05, 0.05];

    #[test]
    fn test_identical_columns_score_metric_max() {
        assert!((Metric::Seqcor.column_score(&PEAKED, &PEAKED) - 1.0).abs() < 1e-12);
        assert!((Metric::Pcc.column_score(&PEAKED, &PEAKED) - 1.0).abs() < 1e-12);
        assert_eq!(Metric::Ed.column_score(&PEAKED, &PEAKED), 0.0);
        assert_eq!(Metric::Ssd.column_score(&PEAKED, &PEAKED), 0.0);
        assert_eq!(Metric::Chisq.column_score(&PEAKED, &PEAKED), 0.0);
        assert!(Metric::Akl.column_score(&PEAKED, &PEAKED).abs() < 1e-12);
    }

    #[test]
    fn test_disjoint_columns_score_worse() {
        for metric in [Metric::Seqcor, Metric::Pcc, Metric::Wic, Metric::Akl] {
            let same = metric.column_score(&PEAKED, &PEAKED);
            let diff = metric.column_score(&PEAKED, &SHIFTED);
            assert!(diff < same, "{:?}: {} !< {}", metric, diff, same);
        }
        for metric in [Metric::Ed, Metric::Chisq, Metric::Ssd] {
            let same = metric.column_score(&PEAKED, &PEAKED);
            let diff = metric.column_score(&PEAKED, &SHIFTED);
            assert!(diff > same, "{:?}: {} !> {}", metric, diff, same);
        }
    }

    #[test]
    fn test_direction_classification() {
        assert!(Metric::Ed.is_distance());
        assert!(Metric::Chisq.is_distance());
        assert!(Metric::Ssd.is_distance());
        assert!(!Metric::Seqcor.is_distance());
        assert!(!Metric::Akl.is_distance());
    }

    #[test]
    fn test_normalize_direction_orders_both_kinds() {
        // Closer match must normalize to the larger value for both kinds.
        let d_close = Metric::Ed.normalize_direction(0.1);
        let d_far = Metric::Ed.normalize_direction(0.9);
        assert!(d_close > d_far);

        let s_close = Metric::Pcc.normalize_direction(0.9);
        let s_far = Metric::Pcc.normalize_direction(0.1);
        assert!(s_close > s_far);
    }

    #[test]
    fn test_uniform_column_pearson_guard() {
        let uniform = UNIFORM_BG;
        // Zero variance against a differing column is undefined, not NaN.
        let score = Metric::Pcc.column_score(&uniform, &PEAKED);
        assert_eq!(score, 0.0);
        // Identical uniform columns are a perfect match.
        assert_eq!(Metric::Pcc.column_score(&uniform, &uniform), 1.0);
    }

    #[test]
    fn test_combine_modes() {
        let scores = [0.5, 1.0, 1.5];
        assert!((Combine::Mean.apply(&scores) - 1.0).abs() < 1e-12);
        assert!((Combine::Sum.apply(&scores) - 3.0).abs() < 1e-12);
        assert_eq!(Combine::Mean.apply(&[]), 0.0);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&Metric::Seqcor).unwrap(), "\"seqcor\"");
        assert_eq!(
            serde_json::from_str::<MatchMode>("\"subtotal\"").unwrap(),
            MatchMode::Subtotal
        );
        assert_eq!(
            serde_json::from_str::<Combine>("\"mean\"").unwrap(),
            Combine::Mean
        );
    }
}

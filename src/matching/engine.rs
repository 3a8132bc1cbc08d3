//! Alignment and scoring of motif matrix pairs.

use ndarray::Array2;

use super::metrics::{MatchMode, UNIFORM_BG};
use super::{MatchError, MatchParams};

/// Minimum overlapping columns considered in partial/subtotal alignment.
const MIN_OVERLAP: usize = 3;

/// Outcome of matching one discovered motif against the ground-truth set.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRecord {
    pub discovered_id: String,
    /// Best-scoring ground truth, `None` when no ground truths were given.
    pub ground_truth_id: Option<String>,
    /// Aggregated score in the metric's native direction.
    pub score: f64,
    /// Whether the score passed the threshold in the metric's direction.
    pub is_match: bool,
}

/// Matches one discovered matrix against all ground truths.
///
/// Deterministic: the best direction-normalized score wins; exact ties go to
/// the earliest-listed ground truth.
pub fn match_motif(
    discovered_id: &str,
    discovered: &Array2<f64>,
    ground_truths: &[(String, Array2<f64>)],
    params: &MatchParams,
) -> Result<MatchRecord, MatchError> {
    validate_matrix(discovered_id, discovered)?;

    let mut best: Option<(usize, f64)> = None;
    for (idx, (id, truth)) in ground_truths.iter().enumerate() {
        validate_matrix(id, truth)?;
        let score = score_pair(discovered, truth, params);
        let normalized = params.metric.normalize_direction(score);
        let better = match best {
            None => true,
            Some((_, best_norm)) => normalized > best_norm,
        };
        if better {
            best = Some((idx, normalized));
        }
    }

    match best {
        None => Ok(MatchRecord {
            discovered_id: discovered_id.to_string(),
            ground_truth_id: None,
            score: 0.0,
            is_match: false,
        }),
        Some((idx, normalized)) => {
            let score = params.metric.normalize_direction(normalized);
            let is_match = normalized >= params.metric.normalize_direction(params.min_score);
            Ok(MatchRecord {
                discovered_id: discovered_id.to_string(),
                ground_truth_id: Some(ground_truths[idx].0.clone()),
                score,
                is_match,
            })
        }
    }
}

fn validate_matrix(id: &str, matrix: &Array2<f64>) -> Result<(), MatchError> {
    if matrix.nrows() == 0 {
        return Err(MatchError::EmptyMatrix(id.to_string()));
    }
    if matrix.ncols() != 4 {
        return Err(MatchError::BadShape {
            id: id.to_string(),
            cols: matrix.ncols(),
        });
    }
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(MatchError::NonFinite(id.to_string()));
    }
    Ok(())
}

/// Best aggregated score over all alignments of the two matrices.
fn score_pair(a: &Array2<f64>, b: &Array2<f64>, params: &MatchParams) -> f64 {
    // Orient so `long` is at least as wide as `short`; metrics are symmetric.
    let (long, short) = if a.nrows() >= b.nrows() {
        (a, b)
    } else {
        (b, a)
    };

    match params.mode {
        MatchMode::Total => score_total(long, short, params),
        MatchMode::Partial => score_overlap(long, short, params, false),
        MatchMode::Subtotal => score_overlap(long, short, params, true),
    }
}

/// Total mode: the narrower matrix slides fully inside the wider one, and
/// every column of the wider matrix is scored; uncovered columns score
/// against the uniform background.
fn score_total(long: &Array2<f64>, short: &Array2<f64>, params: &MatchParams) -> f64 {
    let l = long.nrows();
    let s = short.nrows();

    let mut best = f64::NEG_INFINITY;
    for offset in 0..=(l - s) {
        let mut columns = Vec::with_capacity(l);
        for i in 0..l {
            let long_col = row(long, i);
            let score = if i >= offset && i < offset + s {
                params.metric.column_score(&long_col, &row(short, i - offset))
            } else {
                params.metric.column_score(&long_col, &UNIFORM_BG)
            };
            columns.push(score);
        }
        let aggregated = params.combine.apply(&columns);
        let normalized = params.metric.normalize_direction(aggregated);
        if normalized > best {
            best = normalized;
        }
    }
    params.metric.normalize_direction(best)
}

/// Partial/subtotal mode: overhanging offsets allowed down to a minimum
/// overlap; only overlapping columns are scored. Subtotal additionally
/// considers every contiguous sub-window of the overlap.
fn score_overlap(
    long: &Array2<f64>,
    short: &Array2<f64>,
    params: &MatchParams,
    sub_windows: bool,
) -> f64 {
    let l = long.nrows() as i64;
    let s = short.nrows() as i64;
    let min_overlap = MIN_OVERLAP.min(short.nrows()) as i64;

    let mut best = f64::NEG_INFINITY;
    for offset in (min_overlap - s)..=(l - min_overlap) {
        let start = offset.max(0);
        let end = (offset + s).min(l);
        let overlap = end - start;
        if overlap < min_overlap {
            continue;
        }

        let mut columns = Vec::with_capacity(overlap as usize);
        for i in start..end {
            let long_col = row(long, i as usize);
            let short_col = row(short, (i - offset) as usize);
            columns.push(params.metric.column_score(&long_col, &short_col));
        }

        if sub_windows {
            let min_window = MIN_OVERLAP.min(columns.len());
            for width in min_window..=columns.len() {
                for window in columns.windows(width) {
                    let aggregated = params.combine.apply(window);
                    let normalized = params.metric.normalize_direction(aggregated);
                    if normalized > best {
                        best = normalized;
                    }
                }
            }
        } else {
            let aggregated = params.combine.apply(&columns);
            let normalized = params.metric.normalize_direction(aggregated);
            if normalized > best {
                best = normalized;
            }
        }
    }
    params.metric.normalize_direction(best)
}

fn row(matrix: &Array2<f64>, i: usize) -> [f64; 4] {
    [
        matrix[[i, 0]],
        matrix[[i, 1]],
        matrix[[i, 2]],
        matrix[[i, 3]],
    ]
}

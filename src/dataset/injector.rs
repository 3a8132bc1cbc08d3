//! Motif injection into synthesized test sequences.

use rand::seq::index;
use rand::Rng;

use super::{FastaRecord, MotifMatrix};

/// What actually happened during one injection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionReport {
    /// `round(rate * n)` as derived from the config.
    pub requested: u32,
    /// Sequences that actually received an instance.
    pub injected: u32,
}

/// Injects a sampled motif instance into `round(rate * n)` distinct records.
///
/// Each chosen record gets a fresh instance drawn from the matrix, written
/// over the existing bases at a random offset (replacement, so sequence
/// length is preserved). Records shorter than the motif are skipped, which
/// is the only way `injected` can fall below `requested`.
pub fn inject_motif(
    records: &mut [FastaRecord],
    motif: &MotifMatrix,
    rate: f64,
    rng: &mut impl Rng,
) -> InjectionReport {
    let requested = (rate * records.len() as f64).round() as u32;
    let count = (requested as usize).min(records.len());
    let width = motif.width();

    let mut injected = 0u32;
    for idx in index::sample(rng, records.len(), count) {
        let record = &mut records[idx];
        if record.sequence.len() < width {
            continue;
        }
        let instance = motif.sample(rng);
        let offset = rng.gen_range(0..=record.sequence.len() - width);
        record
            .sequence
            .replace_range(offset..offset + width, &instance);
        injected += 1;
    }

    InjectionReport {
        requested,
        injected,
    }
}

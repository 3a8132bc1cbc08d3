//! FASTA reading, writing, and random sequence synthesis.

use std::fs;
use std::path::Path;

use rand::Rng;

use super::DatasetError;

const LINE_WIDTH: usize = 80;

/// One FASTA record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    pub id: String,
    pub sequence: String,
}

/// Reads a FASTA file, joining wrapped sequence lines.
pub fn read_fasta(path: impl AsRef<Path>) -> Result<Vec<FastaRecord>, DatasetError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|e| DatasetError::io(path, e))?;

    let mut records = Vec::new();
    let mut current: Option<FastaRecord> = None;
    for line in raw.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        if let Some(id) = line.strip_prefix('>') {
            if let Some(record) = current.take() {
                records.push(record);
            }
            current = Some(FastaRecord {
                id: id.trim().to_string(),
                sequence: String::new(),
            });
        } else {
            match current.as_mut() {
                Some(record) => record.sequence.push_str(line.trim()),
                None => {
                    return Err(DatasetError::InvalidFasta {
                        path: path.display().to_string(),
                        message: format!("sequence before any '>' header: '{}'", line),
                    })
                }
            }
        }
    }
    if let Some(record) = current {
        records.push(record);
    }

    Ok(records)
}

/// Writes records with sequence lines wrapped at 80 columns.
pub fn write_fasta(path: impl AsRef<Path>, records: &[FastaRecord]) -> Result<(), DatasetError> {
    let path = path.as_ref();
    let mut out = String::new();
    for record in records {
        out.push('>');
        out.push_str(&record.id);
        out.push('\n');
        let bytes = record.sequence.as_bytes();
        for chunk in bytes.chunks(LINE_WIDTH) {
            // Sequences are ASCII nucleotides
            out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
            out.push('\n');
        }
    }
    fs::write(path, out).map_err(|e| DatasetError::io(path, e))
}

/// Synthesizes `n` random sequences of the given length with the target GC
/// fraction: G and C each drawn at `gc / 2`, A and T at `(1 - gc) / 2`.
pub fn synthesize_records(
    prefix: &str,
    n: u32,
    length: u32,
    gc_content: f64,
    rng: &mut impl Rng,
) -> Vec<FastaRecord> {
    let weights = [
        (1.0 - gc_content) / 2.0, // A
        gc_content / 2.0,         // C
        gc_content / 2.0,         // G
        (1.0 - gc_content) / 2.0, // T
    ];
    let bases = ['A', 'C', 'G', 'T'];

    (1..=n)
        .map(|i| {
            let sequence = (0..length)
                .map(|_| {
                    let draw: f64 = rng.gen();
                    let mut acc = 0.0;
                    let mut picked = 3;
                    for (idx, &w) in weights.iter().enumerate() {
                        acc += w;
                        if draw < acc {
                            picked = idx;
                            break;
                        }
                    }
                    bases[picked]
                })
                .collect();
            FastaRecord {
                id: format!("{}_{}", prefix, i),
                sequence,
            }
        })
        .collect()
}

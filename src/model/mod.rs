//! Work-unit model: composite keys, status machine, and ledger records.

mod key;
mod unit;

pub use key::{BackgroundType, SweepDimensions, UnitKey};
pub use unit::{params_digest, UnitStatus, UnitUpdate, WorkUnit};

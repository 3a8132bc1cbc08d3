//! Persistent run ledger backed by embedded SQLite.

mod store;

pub use store::{Ledger, LedgerError, PendingFilter};

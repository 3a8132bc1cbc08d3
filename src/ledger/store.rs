//! SQLite-backed work-unit ledger.
//!
//! Every state transition in the pipeline flows through [`Ledger::upsert`],
//! which merges a partial update into the stored row inside a single
//! transaction. The ledger is the source of truth for unit status; the
//! filesystem is only consulted as artifact validation during generation.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{BackgroundType, UnitKey, UnitStatus, UnitUpdate, WorkUnit};

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be interpreted.
    #[error("Corrupt ledger row for '{key}': {message}")]
    CorruptRow { key: String, message: String },
}

/// Status filter for [`Ledger::eligible`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingFilter {
    /// Only `pending` units.
    PendingOnly,
    /// `pending` plus `failed_denovo` units.
    PendingAndFailed,
    /// Every unit regardless of status.
    All,
}

/// Work-unit ledger over a SQLite pool.
#[derive(Debug, Clone)]
pub struct Ledger {
    pool: SqlitePool,
}

impl Ledger {
    /// Opens (creating if necessary) the ledger database at `path` and runs
    /// the schema migration.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let ledger = Self { pool };
        ledger.migrate().await?;
        info!(path = %path.as_ref().display(), "Ledger opened");
        Ok(ledger)
    }

    /// In-memory ledger for tests.
    pub async fn open_in_memory() -> Result<Self, LedgerError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(LedgerError::Database)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let ledger = Self { pool };
        ledger.migrate().await?;
        Ok(ledger)
    }

    async fn migrate(&self) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS work_units (
                key TEXT PRIMARY KEY,
                seq_amount INTEGER NOT NULL,
                rate_pct INTEGER NOT NULL,
                replicate INTEGER NOT NULL,
                background TEXT NOT NULL,
                tool TEXT NOT NULL,
                status TEXT NOT NULL,
                test_fasta TEXT,
                background_fasta TEXT,
                output_dir TEXT,
                motif_file TEXT,
                stats_file TEXT,
                injected_count INTEGER,
                params_digest TEXT,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_units_status ON work_units(status)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Fetches one unit by key.
    pub async fn get(&self, key: &UnitKey) -> Result<Option<WorkUnit>, LedgerError> {
        let row = sqlx::query("SELECT * FROM work_units WHERE key = ?")
            .bind(key.name())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_unit).transpose()
    }

    /// Inserts or partially updates a unit.
    ///
    /// Absent fields of the update keep their stored values (`COALESCE` on the
    /// conflict path). `updated_at` is re-stamped on every call; `created_at`
    /// is set only on first insert. The whole operation is one statement, so
    /// it commits atomically.
    pub async fn upsert(&self, key: &UnitKey, update: UnitUpdate) -> Result<(), LedgerError> {
        let now = Utc::now().to_rfc3339();
        let status = update.status.map(|s| s.to_string());

        sqlx::query(
            r#"
            INSERT INTO work_units (
                key, seq_amount, rate_pct, replicate, background, tool,
                status, test_fasta, background_fasta, output_dir, motif_file,
                stats_file, injected_count, params_digest, error,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, COALESCE(?, 'pending'), ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                status = COALESCE(excluded.status, work_units.status),
                test_fasta = COALESCE(excluded.test_fasta, work_units.test_fasta),
                background_fasta = COALESCE(excluded.background_fasta, work_units.background_fasta),
                output_dir = COALESCE(excluded.output_dir, work_units.output_dir),
                motif_file = COALESCE(excluded.motif_file, work_units.motif_file),
                stats_file = COALESCE(excluded.stats_file, work_units.stats_file),
                injected_count = COALESCE(excluded.injected_count, work_units.injected_count),
                params_digest = COALESCE(excluded.params_digest, work_units.params_digest),
                error = COALESCE(excluded.error, work_units.error),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key.name())
        .bind(key.seq_amount as i64)
        .bind(key.rate_pct as i64)
        .bind(key.replicate as i64)
        .bind(key.background.to_string())
        .bind(&key.tool)
        .bind(status)
        .bind(update.test_fasta.as_ref().map(path_str))
        .bind(update.background_fasta.as_ref().map(path_str))
        .bind(update.output_dir.as_ref().map(path_str))
        .bind(update.motif_file.as_ref().map(path_str))
        .bind(update.stats_file.as_ref().map(path_str))
        .bind(update.injected_count.map(|c| c as i64))
        .bind(update.params_digest)
        .bind(update.error)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        debug!(unit = %key, "Ledger upsert");
        Ok(())
    }

    /// Clears a unit's error detail. `COALESCE` merging cannot null a column,
    /// so retry paths call this before re-dispatch.
    pub async fn clear_error(&self, key: &UnitKey) -> Result<(), LedgerError> {
        sqlx::query("UPDATE work_units SET error = NULL, updated_at = ? WHERE key = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(key.name())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All units, ordered by key for deterministic iteration.
    pub async fn all_units(&self) -> Result<Vec<WorkUnit>, LedgerError> {
        let rows = sqlx::query("SELECT * FROM work_units ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_unit).collect()
    }

    /// Units eligible for dispatch under the given filter.
    pub async fn eligible(&self, filter: PendingFilter) -> Result<Vec<WorkUnit>, LedgerError> {
        let query = match filter {
            PendingFilter::PendingOnly => {
                "SELECT * FROM work_units WHERE status = 'pending' ORDER BY key"
            }
            PendingFilter::PendingAndFailed => {
                "SELECT * FROM work_units WHERE status IN ('pending', 'failed_denovo') ORDER BY key"
            }
            PendingFilter::All => "SELECT * FROM work_units ORDER BY key",
        };

        let rows = sqlx::query(query).fetch_all(&self.pool).await?;
        rows.into_iter().map(row_to_unit).collect()
    }

    /// Demotes units left `running` by a crashed process to `failed_denovo`
    /// so a later run with `rerun_failed` picks them up. Returns how many
    /// units were recovered.
    pub async fn recover_interrupted(&self) -> Result<u64, LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE work_units
            SET status = 'failed_denovo', error = 'interrupted', updated_at = ?
            WHERE status = 'running'
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        let recovered = result.rows_affected();
        if recovered > 0 {
            info!(count = recovered, "Recovered interrupted units");
        }
        Ok(recovered)
    }

    /// Per-status unit counts, for `status` reporting.
    pub async fn status_counts(&self) -> Result<Vec<(UnitStatus, u64)>, LedgerError> {
        let rows =
            sqlx::query("SELECT status, COUNT(*) as n FROM work_units GROUP BY status ORDER BY status")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|row| {
                let raw: String = row.get("status");
                let n: i64 = row.get("n");
                let status = raw
                    .parse::<UnitStatus>()
                    .map_err(|message| LedgerError::CorruptRow {
                        key: "<status>".to_string(),
                        message,
                    })?;
                Ok((status, n as u64))
            })
            .collect()
    }

    /// Stores a derived-aggregate entry (export paths, heatmap paths).
    pub async fn set_meta(&self, key: &str, value: &str) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO meta (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetches a derived-aggregate entry.
    pub async fn get_meta(&self, key: &str) -> Result<Option<String>, LedgerError> {
        let row = sqlx::query("SELECT value FROM meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("value")))
    }
}

fn path_str(path: &PathBuf) -> String {
    path.to_string_lossy().into_owned()
}

fn row_to_unit(row: sqlx::sqlite::SqliteRow) -> Result<WorkUnit, LedgerError> {
    let key_name: String = row.get("key");
    let background_raw: String = row.get("background");
    let status_raw: String = row.get("status");

    let background =
        background_raw
            .parse::<BackgroundType>()
            .map_err(|message| LedgerError::CorruptRow {
                key: key_name.clone(),
                message,
            })?;
    let status = status_raw
        .parse::<UnitStatus>()
        .map_err(|message| LedgerError::CorruptRow {
            key: key_name.clone(),
            message,
        })?;

    let seq_amount: i64 = row.get("seq_amount");
    let rate_pct: i64 = row.get("rate_pct");
    let replicate: i64 = row.get("replicate");
    let tool: String = row.get("tool");

    let key = UnitKey {
        seq_amount: seq_amount as u32,
        rate_pct: rate_pct as u32,
        replicate: replicate as u32,
        background,
        tool,
    };

    let created_at = parse_timestamp(&key_name, row.get("created_at"))?;
    let updated_at = parse_timestamp(&key_name, row.get("updated_at"))?;

    Ok(WorkUnit {
        key,
        status,
        test_fasta: opt_path(row.get("test_fasta")),
        background_fasta: opt_path(row.get("background_fasta")),
        output_dir: opt_path(row.get("output_dir")),
        motif_file: opt_path(row.get("motif_file")),
        stats_file: opt_path(row.get("stats_file")),
        injected_count: row
            .get::<Option<i64>, _>("injected_count")
            .map(|c| c as u32),
        params_digest: row.get("params_digest"),
        error: row.get("error"),
        created_at,
        updated_at,
    })
}

fn opt_path(value: Option<String>) -> Option<PathBuf> {
    value.map(PathBuf::from)
}

fn parse_timestamp(key: &str, raw: String) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LedgerError::CorruptRow {
            key: key.to_string(),
            message: format!("bad timestamp '{}': {}", raw, e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::params_digest;

    fn key(replicate: u32) -> UnitKey {
        UnitKey::new(100, 0.5, replicate, BackgroundType::Random, "MEME")
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        let k = key(1);

        ledger
            .upsert(
                &k,
                UnitUpdate::new()
                    .with_status(UnitStatus::Pending)
                    .with_test_fasta("/tmp/test.fa"),
            )
            .await
            .unwrap();

        let unit = ledger.get(&k).await.unwrap().unwrap();
        assert_eq!(unit.key, k);
        assert_eq!(unit.status, UnitStatus::Pending);
        assert_eq!(unit.test_fasta, Some(PathBuf::from("/tmp/test.fa")));
        assert!(unit.motif_file.is_none());
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        assert!(ledger.get(&key(9)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_partial_merge_keeps_prior_fields() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        let k = key(1);
        let digest = params_digest(&k);

        ledger
            .upsert(
                &k,
                UnitUpdate::new()
                    .with_status(UnitStatus::Pending)
                    .with_test_fasta("/tmp/test.fa")
                    .with_params_digest(&digest),
            )
            .await
            .unwrap();

        // Update only the status; paths must survive.
        ledger
            .upsert(&k, UnitUpdate::new().with_status(UnitStatus::Running))
            .await
            .unwrap();

        let unit = ledger.get(&k).await.unwrap().unwrap();
        assert_eq!(unit.status, UnitStatus::Running);
        assert_eq!(unit.test_fasta, Some(PathBuf::from("/tmp/test.fa")));
        assert_eq!(unit.params_digest, Some(digest));
    }

    #[tokio::test]
    async fn test_updated_at_restamped() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        let k = key(1);

        ledger
            .upsert(&k, UnitUpdate::new().with_status(UnitStatus::Pending))
            .await
            .unwrap();
        let before = ledger.get(&k).await.unwrap().unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        ledger
            .upsert(&k, UnitUpdate::new().with_status(UnitStatus::Running))
            .await
            .unwrap();
        let after = ledger.get(&k).await.unwrap().unwrap();

        assert_eq!(after.created_at, before.created_at);
        assert!(after.updated_at > before.updated_at);
    }

    #[tokio::test]
    async fn test_eligible_filters() {
        let ledger = Ledger::open_in_memory().await.unwrap();

        ledger
            .upsert(&key(1), UnitUpdate::new().with_status(UnitStatus::Pending))
            .await
            .unwrap();
        ledger
            .upsert(
                &key(2),
                UnitUpdate::new().with_status(UnitStatus::FailedDenovo),
            )
            .await
            .unwrap();
        ledger
            .upsert(&key(3), UnitUpdate::new().with_status(UnitStatus::Completed))
            .await
            .unwrap();

        let pending = ledger.eligible(PendingFilter::PendingOnly).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].key.replicate, 1);

        let retry = ledger
            .eligible(PendingFilter::PendingAndFailed)
            .await
            .unwrap();
        assert_eq!(retry.len(), 2);

        let all = ledger.eligible(PendingFilter::All).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_recover_interrupted() {
        let ledger = Ledger::open_in_memory().await.unwrap();

        ledger
            .upsert(&key(1), UnitUpdate::new().with_status(UnitStatus::Running))
            .await
            .unwrap();
        ledger
            .upsert(&key(2), UnitUpdate::new().with_status(UnitStatus::Completed))
            .await
            .unwrap();

        let recovered = ledger.recover_interrupted().await.unwrap();
        assert_eq!(recovered, 1);

        let unit = ledger.get(&key(1)).await.unwrap().unwrap();
        assert_eq!(unit.status, UnitStatus::FailedDenovo);
        assert_eq!(unit.error.as_deref(), Some("interrupted"));

        // Completed units untouched
        let done = ledger.get(&key(2)).await.unwrap().unwrap();
        assert_eq!(done.status, UnitStatus::Completed);
    }

    #[tokio::test]
    async fn test_clear_error() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        let k = key(1);
        ledger
            .upsert(
                &k,
                UnitUpdate::new()
                    .with_status(UnitStatus::FailedDenovo)
                    .with_error("exit 1"),
            )
            .await
            .unwrap();

        ledger.clear_error(&k).await.unwrap();
        let unit = ledger.get(&k).await.unwrap().unwrap();
        assert!(unit.error.is_none());
    }

    #[tokio::test]
    async fn test_status_counts() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        ledger
            .upsert(&key(1), UnitUpdate::new().with_status(UnitStatus::Pending))
            .await
            .unwrap();
        ledger
            .upsert(&key(2), UnitUpdate::new().with_status(UnitStatus::Pending))
            .await
            .unwrap();
        ledger
            .upsert(&key(3), UnitUpdate::new().with_status(UnitStatus::Completed))
            .await
            .unwrap();

        let counts = ledger.status_counts().await.unwrap();
        let pending = counts
            .iter()
            .find(|(s, _)| *s == UnitStatus::Pending)
            .unwrap();
        assert_eq!(pending.1, 2);
    }

    #[tokio::test]
    async fn test_meta_round_trip() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        assert!(ledger.get_meta("parsed_results").await.unwrap().is_none());

        ledger
            .set_meta("parsed_results", r#"{"all": "/tmp/all.csv"}"#)
            .await
            .unwrap();
        ledger.set_meta("parsed_results", r#"{"all": "/tmp/v2.csv"}"#)
            .await
            .unwrap();

        let value = ledger.get_meta("parsed_results").await.unwrap().unwrap();
        assert!(value.contains("v2"));
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        {
            let ledger = Ledger::open(&path).await.unwrap();
            ledger
                .upsert(&key(1), UnitUpdate::new().with_status(UnitStatus::Completed))
                .await
                .unwrap();
        }

        let reopened = Ledger::open(&path).await.unwrap();
        let unit = reopened.get(&key(1)).await.unwrap().unwrap();
        assert_eq!(unit.status, UnitStatus::Completed);
    }
}

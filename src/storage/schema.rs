//! `predictions` table DDL and idempotent creation.
//!
//! Column types differ per backend but the logical field set is identical:
//! any row insertable on one backend is insertable and readable on the other.

use crate::storage::StorageError;
use crate::storage::backend::DbConnection;

/// DDL for the networked backend.
pub const PG_PREDICTIONS_DDL: &str = "\
CREATE TABLE IF NOT EXISTS predictions (
    id                 SERIAL PRIMARY KEY,
    timestamp          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    gene1              DOUBLE PRECISION NOT NULL,
    gene2              DOUBLE PRECISION NOT NULL,
    gene3              DOUBLE PRECISION NOT NULL,
    gene4              DOUBLE PRECISION NOT NULL,
    gene5              DOUBLE PRECISION NOT NULL,
    prediction_numeric INTEGER NOT NULL,
    prediction_label   VARCHAR(20) NOT NULL,
    true_label         VARCHAR(20)
)";

/// DDL for the embedded backend.
///
/// Timestamps are TEXT in `datetime('now')` format (UTC, second precision)
/// so lexicographic ordering matches chronological ordering.
pub const SQLITE_PREDICTIONS_DDL: &str = "\
CREATE TABLE IF NOT EXISTS predictions (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp          TEXT NOT NULL DEFAULT (datetime('now')),
    gene1              REAL NOT NULL,
    gene2              REAL NOT NULL,
    gene3              REAL NOT NULL,
    gene4              REAL NOT NULL,
    gene5              REAL NOT NULL,
    prediction_numeric INTEGER NOT NULL,
    prediction_label   TEXT NOT NULL,
    true_label         TEXT
)";

/// Create the `predictions` table if it does not exist.
///
/// Safe to call on every connection acquisition.
pub async fn ensure_schema(conn: &mut DbConnection) -> Result<(), StorageError> {
    let backend = conn.kind();
    let result = match conn {
        DbConnection::Postgres(c) => {
            sqlx::query(PG_PREDICTIONS_DDL).execute(&mut *c).await.map(|_| ())
        }
        DbConnection::Sqlite(c) => {
            sqlx::query(SQLITE_PREDICTIONS_DDL).execute(&mut *c).await.map(|_| ())
        }
    };

    match result {
        Ok(_) => {
            tracing::debug!(%backend, "predictions table created/verified");
            Ok(())
        }
        Err(source) => Err(StorageError::Schema { backend, source }),
    }
}

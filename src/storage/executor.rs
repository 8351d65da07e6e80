//! Unified query execution.
//!
//! Every call is a full acquire → translate → bind → commit/rollback →
//! release cycle. There is no pooling and no reuse across calls; isolation
//! under concurrent requests is delegated to the backend's own transaction
//! handling.

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Connection, Postgres, Row, Sqlite, TypeInfo};

use crate::storage::backend::{Database, DbConnection};
use crate::storage::dialect;
use crate::storage::error::StorageError;

/// Timestamp text format used on the embedded backend.
///
/// Matches `datetime('now')` output so lexicographic comparison against
/// SQLite's time expressions is chronological.
pub const SQLITE_TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A value bound into a query through the backend's native mechanism.
///
/// Values are never interpolated into the query text.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Null,
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for SqlParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<DateTime<Utc>> for SqlParam {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl From<Option<String>> for SqlParam {
    fn from(v: Option<String>) -> Self {
        v.map_or(Self::Null, Self::Text)
    }
}

/// A single column value in canonical form.
///
/// Both backends decode into this shape; backend-specific row
/// representations do not escape the executor.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Null,
}

impl SqlValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric widening: integers count as floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Timestamp, parsing embedded-backend text representations on demand.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(v) => Some(*v),
            Self::Text(v) => NaiveDateTime::parse_from_str(v, SQLITE_TS_FORMAT)
                .map(|naive| naive.and_utc())
                .or_else(|_| DateTime::parse_from_rfc3339(v).map(|dt| dt.with_timezone(&Utc)))
                .ok(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// A normalized result row.
pub type SqlRow = Vec<SqlValue>;

impl Database {
    /// Run a non-returning statement. Returns the number of affected rows.
    pub async fn execute(&self, template: &str, params: &[SqlParam]) -> Result<u64, StorageError> {
        self.run(template, params, false).await.map(|(affected, _)| affected)
    }

    /// Run a statement and fetch all result rows in canonical form.
    pub async fn fetch_all(
        &self,
        template: &str,
        params: &[SqlParam],
    ) -> Result<Vec<SqlRow>, StorageError> {
        self.run(template, params, true).await.map(|(_, rows)| rows)
    }

    /// Acquire, translate, execute inside a transaction, release.
    ///
    /// The connection is closed on every exit path; close failures never
    /// mask the primary error.
    async fn run(
        &self,
        template: &str,
        params: &[SqlParam],
        fetch: bool,
    ) -> Result<(u64, Vec<SqlRow>), StorageError> {
        let conn = self.acquire().await?;
        let backend = conn.kind();
        let sql = dialect::translate(template, backend);

        let (result, conn) = match conn {
            DbConnection::Postgres(mut c) => {
                let r = run_postgres(&mut c, &sql, params, fetch).await;
                (r, DbConnection::Postgres(c))
            }
            DbConnection::Sqlite(mut c) => {
                let r = run_sqlite(&mut c, &sql, params, fetch).await;
                (r, DbConnection::Sqlite(c))
            }
        };
        conn.close().await;

        result.map_err(|source| {
            tracing::error!(template, ?params, error = %source, "query execution failed");
            StorageError::Query {
                template: template.to_string(),
                params: params.to_vec(),
                source,
            }
        })
    }
}

async fn run_postgres(
    conn: &mut sqlx::PgConnection,
    sql: &str,
    params: &[SqlParam],
    fetch: bool,
) -> Result<(u64, Vec<SqlRow>), sqlx::Error> {
    let mut tx = conn.begin().await?;

    let mut query = sqlx::query(sql);
    for param in params {
        query = bind_postgres(query, param);
    }

    let outcome = if fetch {
        match query.fetch_all(&mut *tx).await {
            Ok(rows) => rows
                .iter()
                .map(decode_postgres_row)
                .collect::<Result<Vec<_>, _>>()
                .map(|decoded| (decoded.len() as u64, decoded)),
            Err(e) => Err(e),
        }
    } else {
        query.execute(&mut *tx).await.map(|done| (done.rows_affected(), Vec::new()))
    };

    match outcome {
        Ok(out) => {
            tx.commit().await?;
            Ok(out)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::debug!(error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}

async fn run_sqlite(
    conn: &mut sqlx::SqliteConnection,
    sql: &str,
    params: &[SqlParam],
    fetch: bool,
) -> Result<(u64, Vec<SqlRow>), sqlx::Error> {
    let mut tx = conn.begin().await?;

    let mut query = sqlx::query(sql);
    for param in params {
        query = bind_sqlite(query, param);
    }

    let outcome = if fetch {
        match query.fetch_all(&mut *tx).await {
            Ok(rows) => rows
                .iter()
                .map(decode_sqlite_row)
                .collect::<Result<Vec<_>, _>>()
                .map(|decoded| (decoded.len() as u64, decoded)),
            Err(e) => Err(e),
        }
    } else {
        query.execute(&mut *tx).await.map(|done| (done.rows_affected(), Vec::new()))
    };

    match outcome {
        Ok(out) => {
            tx.commit().await?;
            Ok(out)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::debug!(error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}

fn bind_postgres<'q>(
    query: Query<'q, Postgres, PgArguments>,
    param: &SqlParam,
) -> Query<'q, Postgres, PgArguments> {
    match param {
        SqlParam::Int(v) => query.bind(*v),
        SqlParam::Float(v) => query.bind(*v),
        SqlParam::Text(v) => query.bind(v.clone()),
        SqlParam::Timestamp(v) => query.bind(*v),
        SqlParam::Null => query.bind(Option::<String>::None),
    }
}

fn bind_sqlite<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &SqlParam,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        SqlParam::Int(v) => query.bind(*v),
        SqlParam::Float(v) => query.bind(*v),
        SqlParam::Text(v) => query.bind(v.clone()),
        // Stored as text in the `datetime('now')` format, see SQLITE_TS_FORMAT.
        SqlParam::Timestamp(v) => query.bind(v.format(SQLITE_TS_FORMAT).to_string()),
        SqlParam::Null => query.bind(Option::<String>::None),
    }
}

/// Decode a PostgreSQL row by column type.
fn decode_postgres_row(row: &PgRow) -> Result<SqlRow, sqlx::Error> {
    let mut out = Vec::with_capacity(row.len());
    for (i, col) in row.columns().iter().enumerate() {
        let value = match col.type_info().name() {
            "INT2" => row.try_get::<Option<i16>, _>(i)?.map(|v| SqlValue::Int(i64::from(v))),
            "INT4" => row.try_get::<Option<i32>, _>(i)?.map(|v| SqlValue::Int(i64::from(v))),
            "INT8" => row.try_get::<Option<i64>, _>(i)?.map(SqlValue::Int),
            "FLOAT4" => row.try_get::<Option<f32>, _>(i)?.map(|v| SqlValue::Float(f64::from(v))),
            "FLOAT8" => row.try_get::<Option<f64>, _>(i)?.map(SqlValue::Float),
            "BOOL" => row.try_get::<Option<bool>, _>(i)?.map(SqlValue::Bool),
            "TIMESTAMPTZ" => row.try_get::<Option<DateTime<Utc>>, _>(i)?.map(SqlValue::Timestamp),
            "TIMESTAMP" => row
                .try_get::<Option<NaiveDateTime>, _>(i)?
                .map(|v| SqlValue::Timestamp(v.and_utc())),
            "VARCHAR" | "TEXT" | "BPCHAR" | "NAME" => {
                row.try_get::<Option<String>, _>(i)?.map(SqlValue::Text)
            }
            other => {
                tracing::debug!(column = col.name(), pg_type = other, "unhandled column type");
                None
            }
        };
        out.push(value.unwrap_or(SqlValue::Null));
    }
    Ok(out)
}

/// Decode a SQLite row by column type.
fn decode_sqlite_row(row: &SqliteRow) -> Result<SqlRow, sqlx::Error> {
    let mut out = Vec::with_capacity(row.len());
    for (i, col) in row.columns().iter().enumerate() {
        let value = match col.type_info().name() {
            "INTEGER" | "INT" | "BIGINT" => row.try_get::<Option<i64>, _>(i)?.map(SqlValue::Int),
            "BOOLEAN" => row.try_get::<Option<bool>, _>(i)?.map(SqlValue::Bool),
            "REAL" | "DOUBLE" | "FLOAT" | "NUMERIC" => {
                row.try_get::<Option<f64>, _>(i)?.map(SqlValue::Float)
            }
            "TEXT" | "VARCHAR" | "DATETIME" | "DATE" | "TIME" => {
                row.try_get::<Option<String>, _>(i)?.map(SqlValue::Text)
            }
            "NULL" => None,
            other => {
                tracing::debug!(column = col.name(), sqlite_type = other, "unhandled column type");
                None
            }
        };
        out.push(value.unwrap_or(SqlValue::Null));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::tempdir;

    fn fallback_database(sqlite_path: &Path) -> Database {
        Database::new(DatabaseConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            connect_timeout: Duration::from_millis(250),
            sqlite_path: sqlite_path.to_string_lossy().into_owned(),
            ..DatabaseConfig::default()
        })
    }

    const INSERT: &str = "INSERT INTO predictions (timestamp, gene1, gene2, gene3, gene4, gene5, \
                          prediction_numeric, prediction_label, true_label) \
                          VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)";

    fn insert_params(label: &str, numeric: i64) -> Vec<SqlParam> {
        vec![
            SqlParam::Timestamp(Utc::now()),
            SqlParam::Float(0.1),
            SqlParam::Float(0.2),
            SqlParam::Float(0.3),
            SqlParam::Float(0.4),
            SqlParam::Float(0.5),
            SqlParam::Int(numeric),
            SqlParam::Text(label.to_string()),
            SqlParam::Null,
        ]
    }

    #[tokio::test]
    async fn test_execute_and_fetch_roundtrip() {
        let dir = tempdir().unwrap();
        let db = fallback_database(&dir.path().join("exec.db"));

        let affected = db.execute(INSERT, &insert_params("Positive", 1)).await.unwrap();
        assert_eq!(affected, 1);

        let rows = db
            .fetch_all("SELECT gene1, prediction_numeric, prediction_label, true_label FROM predictions", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], SqlValue::Float(0.1));
        assert_eq!(rows[0][1], SqlValue::Int(1));
        assert_eq!(rows[0][2], SqlValue::Text("Positive".to_string()));
        assert!(rows[0][3].is_null());
    }

    #[tokio::test]
    async fn test_failed_query_reports_template_and_params() {
        let dir = tempdir().unwrap();
        let db = fallback_database(&dir.path().join("err.db"));

        let err = db
            .execute("INSERT INTO no_such_table (x) VALUES ($1)", &[SqlParam::Int(1)])
            .await
            .unwrap_err();
        match err {
            StorageError::Query { template, params, .. } => {
                assert!(template.contains("no_such_table"));
                assert_eq!(params, vec![SqlParam::Int(1)]);
            }
            other => panic!("expected Query error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_count_decodes_as_int() {
        let dir = tempdir().unwrap();
        let db = fallback_database(&dir.path().join("count.db"));

        db.execute(INSERT, &insert_params("Negative", 0)).await.unwrap();
        let rows = db.fetch_all("SELECT COUNT(*) FROM predictions", &[]).await.unwrap();
        assert_eq!(rows[0][0].as_i64(), Some(1));
    }

    #[tokio::test]
    async fn test_timestamp_roundtrips_through_text() {
        let dir = tempdir().unwrap();
        let db = fallback_database(&dir.path().join("ts.db"));

        let before = Utc::now();
        db.execute(INSERT, &insert_params("Positive", 1)).await.unwrap();

        let rows = db.fetch_all("SELECT timestamp FROM predictions", &[]).await.unwrap();
        let ts = rows[0][0].as_timestamp().expect("timestamp should parse");
        // Second precision on the embedded backend.
        assert!((ts - before).num_seconds().abs() <= 2);
    }

    #[test]
    fn test_sql_value_accessors() {
        assert_eq!(SqlValue::Int(7).as_f64(), Some(7.0));
        assert_eq!(SqlValue::Float(1.5).as_f64(), Some(1.5));
        assert_eq!(SqlValue::Text("x".to_string()).as_str(), Some("x"));
        assert_eq!(SqlValue::Null.as_i64(), None);
        assert!(SqlValue::Null.is_null());

        let parsed = SqlValue::Text("2026-02-03 10:20:30".to_string()).as_timestamp();
        assert_eq!(
            parsed.map(|t| t.format(SQLITE_TS_FORMAT).to_string()),
            Some("2026-02-03 10:20:30".to_string())
        );
    }

    #[test]
    fn test_sql_param_conversions() {
        assert_eq!(SqlParam::from(3i64), SqlParam::Int(3));
        assert_eq!(SqlParam::from(2.5f64), SqlParam::Float(2.5));
        assert_eq!(SqlParam::from("hi"), SqlParam::Text("hi".to_string()));
        assert_eq!(SqlParam::from(None::<String>), SqlParam::Null);
    }
}

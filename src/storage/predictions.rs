//! Prediction logging and reads over the `predictions` table.
//!
//! Builds the fixed set of parameterized query templates and normalizes
//! backend rows into [`PredictionRecord`]. Inserts go through
//! [`PredictionStore::log_prediction`], which never fails its caller: an
//! audit write must not block the inference response.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::storage::backend::Database;
use crate::storage::error::StorageError;
use crate::storage::executor::{SqlParam, SqlRow, SqlValue};

/// Hard cap on listing size.
pub const MAX_LIST_LIMIT: u32 = 100;

const INSERT_PREDICTION: &str = "INSERT INTO predictions \
    (timestamp, gene1, gene2, gene3, gene4, gene5, prediction_numeric, prediction_label, true_label) \
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)";

const SELECT_RECENT: &str = "SELECT id, timestamp, gene1, gene2, gene3, gene4, gene5, \
    prediction_numeric, prediction_label, true_label \
    FROM predictions ORDER BY timestamp DESC LIMIT $1";

const COUNT_ALL: &str = "SELECT COUNT(*) FROM predictions";

const COUNT_BY_LABEL: &str =
    "SELECT prediction_label, COUNT(*) FROM predictions GROUP BY prediction_label";

const COUNT_RECENT_24H: &str =
    "SELECT COUNT(*) FROM predictions WHERE timestamp >= NOW() - INTERVAL '1 day'";

/// Every template this module issues, in the canonical dialect.
///
/// The dialect tests assert translation totality over exactly this set.
pub const QUERY_TEMPLATES: [&str; 5] = [
    INSERT_PREDICTION,
    SELECT_RECENT,
    COUNT_ALL,
    COUNT_BY_LABEL,
    COUNT_RECENT_24H,
];

/// Classifier outcome.
///
/// The numeric form and the display label are two views of the same value,
/// so a stored record can never carry a disagreeing pair.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
pub enum Outcome {
    Positive,
    Negative,
}

impl Outcome {
    pub fn from_numeric(n: i64) -> Option<Self> {
        match n {
            1 => Some(Self::Positive),
            0 => Some(Self::Negative),
            _ => None,
        }
    }

    pub fn numeric(self) -> i32 {
        match self {
            Self::Positive => 1,
            Self::Negative => 0,
        }
    }
}

/// One logged inference in canonical form.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub gene1: f64,
    pub gene2: f64,
    pub gene3: f64,
    pub gene4: f64,
    pub gene5: f64,
    pub prediction_numeric: i32,
    pub prediction_label: String,
    pub true_label: Option<String>,
}

/// Round a gene value to four decimals for display.
fn round4(x: f64) -> f64 {
    (x * 10000.0).round() / 10000.0
}

impl PredictionRecord {
    /// Normalize one executor row (column order per [`SELECT_RECENT`]).
    ///
    /// Gene values are rounded to four decimals for display. A row whose
    /// label disagrees with its numeric value is rejected as malformed.
    fn from_row(row: &SqlRow) -> Result<Self, String> {
        if row.len() != 10 {
            return Err(format!("expected 10 columns, got {}", row.len()));
        }

        let numeric = row[7].as_i64().ok_or("prediction_numeric is not an integer")?;
        let outcome = Outcome::from_numeric(numeric)
            .ok_or_else(|| format!("prediction_numeric out of range: {numeric}"))?;
        let label = row[8].as_str().ok_or("prediction_label is not text")?;
        if label != outcome.as_ref() {
            return Err(format!("label '{label}' disagrees with numeric {numeric}"));
        }

        let gene = |i: usize| -> Result<f64, String> {
            row[i]
                .as_f64()
                .map(round4)
                .ok_or_else(|| format!("gene{} is not numeric", i - 1))
        };

        Ok(Self {
            id: row[0].as_i64().ok_or("id is not an integer")?,
            timestamp: row[1].as_timestamp().ok_or("timestamp is not parseable")?,
            gene1: gene(2)?,
            gene2: gene(3)?,
            gene3: gene(4)?,
            gene4: gene(5)?,
            gene5: gene(6)?,
            prediction_numeric: outcome.numeric(),
            prediction_label: label.to_string(),
            true_label: match &row[9] {
                SqlValue::Text(v) if !v.is_empty() => Some(v.clone()),
                _ => None,
            },
        })
    }

    /// Timestamp formatted for templates.
    pub fn timestamp_display(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    /// Ground-truth label formatted for templates.
    pub fn true_label_display(&self) -> &str {
        self.true_label.as_deref().unwrap_or("Unknown")
    }
}

/// Dashboard statistics.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatsSummary {
    pub total: i64,
    pub positive: i64,
    pub negative: i64,
    pub recent_24h: i64,
}

/// Read/write facade over the one persisted entity.
#[derive(Debug, Clone)]
pub struct PredictionStore {
    db: Database,
}

impl PredictionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// The underlying executor, for health checks and ad hoc probes.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Persist one inference.
    ///
    /// Absorbs every storage failure: logs the cause and reports `false`.
    pub async fn log_prediction(
        &self,
        genes: [f64; 5],
        outcome: Outcome,
        true_label: Option<&str>,
    ) -> bool {
        let true_label = true_label
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("unknown"));

        let params = vec![
            SqlParam::Timestamp(Utc::now()),
            SqlParam::Float(genes[0]),
            SqlParam::Float(genes[1]),
            SqlParam::Float(genes[2]),
            SqlParam::Float(genes[3]),
            SqlParam::Float(genes[4]),
            SqlParam::Int(i64::from(outcome.numeric())),
            SqlParam::Text(outcome.to_string()),
            true_label.map_or(SqlParam::Null, SqlParam::from),
        ];

        match self.db.execute(INSERT_PREDICTION, &params).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(error = %e, "failed to log prediction");
                false
            }
        }
    }

    /// The most recent predictions, newest first.
    ///
    /// `limit` is capped at [`MAX_LIST_LIMIT`]. Malformed rows are skipped
    /// individually; the skipped count is surfaced as a diagnostic.
    pub async fn list_predictions(&self, limit: u32) -> Result<Vec<PredictionRecord>, StorageError> {
        let limit = limit.min(MAX_LIST_LIMIT);
        let rows = self
            .db
            .fetch_all(SELECT_RECENT, &[SqlParam::Int(i64::from(limit))])
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        let mut skipped = 0usize;
        for row in &rows {
            match PredictionRecord::from_row(row) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    skipped += 1;
                    tracing::warn!(%reason, "skipping malformed prediction row");
                }
            }
        }
        if skipped > 0 {
            tracing::warn!(skipped, fetched = rows.len(), "dropped malformed rows from listing");
        }
        Ok(records)
    }

    /// Aggregate counts for the dashboard.
    pub async fn get_stats(&self) -> Result<StatsSummary, StorageError> {
        let total = self.count(COUNT_ALL).await?;

        let mut positive = 0;
        let mut negative = 0;
        for row in self.db.fetch_all(COUNT_BY_LABEL, &[]).await? {
            let count = row.get(1).and_then(SqlValue::as_i64).unwrap_or(0);
            match row.first().and_then(SqlValue::as_str) {
                Some(label) if label == Outcome::Positive.as_ref() => positive = count,
                Some(label) if label == Outcome::Negative.as_ref() => negative = count,
                _ => {}
            }
        }

        let recent_24h = self.count(COUNT_RECENT_24H).await?;

        Ok(StatsSummary {
            total,
            positive,
            negative,
            recent_24h,
        })
    }

    async fn count(&self, template: &str) -> Result<i64, StorageError> {
        let rows = self.db.fetch_all(template, &[]).await?;
        Ok(rows
            .first()
            .and_then(|row| row.first())
            .and_then(SqlValue::as_i64)
            .unwrap_or(0))
    }
}

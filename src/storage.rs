//! Storage Layer
//!
//! Dual-backend persistence with dialect translation and automatic failover:
//! - **Primary**: networked PostgreSQL, encrypted transport, bounded connect timeout
//! - **Fallback**: embedded SQLite file, created on demand
//!
//! Every operation is a fresh acquire → use → release cycle; no connection
//! pooling and no backend affinity across calls.
//!
//! # Components
//!
//! - [`Database`]: connection resolution and the unified query executor
//! - [`PredictionStore`]: insert/read facade over the one persisted entity
//! - [`translate`]: canonical-to-embedded dialect rewriting
//! - [`ensure_schema`]: idempotent per-backend table creation

mod backend;
mod dialect;
mod error;
mod executor;
mod predictions;
mod schema;

pub use backend::{BackendKind, Database, DbConnection};
pub use dialect::translate;
pub use error::StorageError;
pub use executor::{SQLITE_TS_FORMAT, SqlParam, SqlRow, SqlValue};
pub use predictions::{
    MAX_LIST_LIMIT, Outcome, PredictionRecord, PredictionStore, StatsSummary,
};
pub use schema::ensure_schema;

//! Storage-specific error types.
//!
//! All storage operations return [`StorageError`] on failure, which can be
//! matched to determine the underlying cause (connection, schema, query).

use thiserror::Error;

use crate::storage::backend::BackendKind;
use crate::storage::executor::SqlParam;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Neither backend could produce a usable connection.
    #[error("no usable database backend: {reason}")]
    Connection { reason: String },

    /// Table creation failed on the given backend.
    ///
    /// On the primary backend this triggers fallback; on the embedded
    /// backend it is fatal for the calling operation.
    #[error("schema creation failed on {backend}: {source}")]
    Schema {
        backend: BackendKind,
        #[source]
        source: sqlx::Error,
    },

    /// A query failed after a connection was obtained.
    ///
    /// The transaction has been rolled back and the connection released.
    /// Template and parameters are attached for diagnostics.
    #[error("query execution failed: {source} (template: {template}, params: {params:?})")]
    Query {
        template: String,
        params: Vec<SqlParam>,
        #[source]
        source: sqlx::Error,
    },
}

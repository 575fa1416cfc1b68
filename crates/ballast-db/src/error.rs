//! Error types for the database layer.

use thiserror::Error;

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur acquiring sessions or touching entities.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("no database replicas configured")]
    NoReplicas,

    #[error("could not connect to any database replica after {0} attempts")]
    Unavailable(u32),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("not found: {0}")]
    NotFound(String),
}

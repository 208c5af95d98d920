//! Error types for the persistence layer.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Distinct from a generic `Sqlx` error so callers can special-case
    /// pool exhaustion (spec §7/§8: a timed-out acquire fails the caller
    /// with a distinct error kind rather than hanging or crashing).
    #[error("connection pool exhausted: no connection available in time")]
    PoolExhausted,
}

impl DbError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::Constraint(msg.into())
    }
}

/// A timed-out pool acquire surfaces from `sqlx` as an ordinary
/// `sqlx::Error::PoolTimedOut` indistinguishable, by type, from any other
/// database error. Every fallible query in this crate goes through `?`
/// on a `sqlx::Result`, so the classification has to happen here, in the
/// blanket conversion, rather than at each call site (spec §7: pool
/// exhaustion is a distinct error kind, not a generic database error).
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            other => DbError::Sqlx(other),
        }
    }
}

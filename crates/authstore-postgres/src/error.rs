//! Error types for the PostgreSQL session backend.

use authstore_core::StoreError;
use sqlx_core::error::Error as SqlxError;

/// PostgreSQL error code for a serialization failure (40001).
pub const PG_SERIALIZATION_FAILURE: &str = "40001";

/// PostgreSQL error code for a detected deadlock (40P01).
pub const PG_DEADLOCK_DETECTED: &str = "40P01";

/// PostgreSQL error code for a unique constraint violation (23505).
pub const PG_UNIQUE_VIOLATION: &str = "23505";

/// Checks if a sqlx error has a specific PostgreSQL error code.
pub fn has_pg_error_code(err: &SqlxError, code: &str) -> bool {
    if let SqlxError::Database(db_err) = err {
        db_err.code().as_deref() == Some(code)
    } else {
        false
    }
}

/// Checks if a transaction failed because of a concurrent writer.
pub fn is_transient_conflict(err: &SqlxError) -> bool {
    has_pg_error_code(err, PG_SERIALIZATION_FAILURE) || has_pg_error_code(err, PG_DEADLOCK_DETECTED)
}

/// Maps a statement failure on `entity` to a store error.
pub fn map_sqlx(entity: &'static str, err: SqlxError) -> StoreError {
    if is_transient_conflict(&err) {
        return StoreError::conflict(entity, "");
    }
    if has_pg_error_code(&err, PG_UNIQUE_VIOLATION) {
        let constraint = match &err {
            SqlxError::Database(db_err) => db_err.constraint().unwrap_or_default().to_string(),
            _ => String::new(),
        };
        return StoreError::already_exists(entity, format!("unique constraint '{constraint}'"));
    }
    StoreError::storage_with_source(format!("{entity} statement failed"), err)
}

/// Errors raised while setting up the PostgreSQL backend.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database connection error.
    #[error("Database connection error: {0}")]
    Connection(#[from] sqlx_core::error::Error),

    /// Schema bootstrap error.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl PostgresError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<PostgresError> for StoreError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Connection(e) => {
                StoreError::storage_with_source("PostgreSQL connection failed", e)
            }
            PostgresError::Schema(message) => {
                StoreError::storage(format!("Schema error: {message}"))
            }
            PostgresError::Config { message } => StoreError::configuration(message),
        }
    }
}

/// Result type alias for PostgreSQL setup operations.
pub type Result<T> = std::result::Result<T, PostgresError>;

//! # Database Error Types
//!
//! Infrastructure errors (`DbError`) and the engine-level error every
//! operation returns (`EngineError`).
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)          Business rule (CoreError)          │
//! │       │                                     │                           │
//! │       ▼                                     │                           │
//! │  DbError (this module)                      │                           │
//! │       │                                     │                           │
//! │       ▼                                     ▼                           │
//! │  EngineError::Infrastructure      EngineError::Business                 │
//! │       │  logged at ERROR                    │  logged at WARN           │
//! │       │  caller may retry                   │  caller shows message     │
//! │       └──────────────┬──────────────────────┘                           │
//! │                      ▼                                                  │
//! │              Transaction dropped → ROLLBACK                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tally_core::{CoreError, ValidationError};
use thiserror::Error;
use tracing::{error, warn};

/// Database operation errors.
///
/// These errors wrap sqlx errors and provide additional context
/// for debugging and retry decisions.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Duplicate SKU or barcode
    /// - Second open stocktake for a store (partial unique index)
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// CHECK constraint violation (negative stock or uses reached the DB).
    #[error("Check constraint violated: {message}")]
    CheckViolation { message: String },

    /// Could not acquire the write lock within the busy timeout.
    #[error("Timed out waiting for database lock")]
    LockTimeout,

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Stable code for logs and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            DbError::NotFound { .. } => "DB_NOT_FOUND",
            DbError::UniqueViolation { .. } => "DB_UNIQUE_VIOLATION",
            DbError::ForeignKeyViolation { .. } => "DB_FOREIGN_KEY_VIOLATION",
            DbError::CheckViolation { .. } => "DB_CHECK_VIOLATION",
            DbError::LockTimeout => "DB_LOCK_TIMEOUT",
            DbError::ConnectionFailed(_) => "DB_CONNECTION_FAILED",
            DbError::MigrationFailed(_) => "DB_MIGRATION_FAILED",
            DbError::QueryFailed(_) => "DB_QUERY_FAILED",
            DbError::PoolExhausted => "DB_POOL_EXHAUSTED",
            DbError::Internal(_) => "DB_INTERNAL",
        }
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type / busy
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite messages:
                //   "UNIQUE constraint failed: <table>.<column>"
                //   "FOREIGN KEY constraint failed"
                //   "CHECK constraint failed: <expr>"
                //   "database is locked" (SQLITE_BUSY after busy_timeout)
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("CHECK constraint failed") {
                    DbError::CheckViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("database is locked") || msg.contains("database table is locked") {
                    DbError::LockTimeout
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Engine Error
// =============================================================================

/// Error returned by every engine operation.
///
/// The two classes are kept apart because callers treat them differently:
/// business rejections are shown to the user, infrastructure failures are
/// retried or escalated.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Expected, frequent business rule rejection.
    #[error(transparent)]
    Business(#[from] CoreError),

    /// Database or lock failure.
    #[error(transparent)]
    Infrastructure(#[from] DbError),
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Business(CoreError::Validation(err))
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Infrastructure(DbError::from(err))
    }
}

impl EngineError {
    /// True for business rule rejections.
    pub fn is_business(&self) -> bool {
        matches!(self, EngineError::Business(_))
    }

    /// Borrow the business error, if any.
    pub fn as_business(&self) -> Option<&CoreError> {
        match self {
            EngineError::Business(err) => Some(err),
            EngineError::Infrastructure(_) => None,
        }
    }

    /// Stable code for logs, metrics, and API payloads.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Business(err) => err.code(),
            EngineError::Infrastructure(err) => err.code(),
        }
    }

    /// Logs the failure of `operation` at the level its class deserves.
    pub fn log(&self, operation: &'static str) {
        match self {
            EngineError::Business(err) => {
                warn!(operation, code = err.code(), error = %err, "Operation rejected");
            }
            EngineError::Infrastructure(err) => {
                error!(operation, code = err.code(), error = %err, "Operation failed");
            }
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_and_infrastructure_are_distinguishable() {
        let business: EngineError = CoreError::InsufficientStock {
            product_id: 1,
            available: 0,
            requested: 1,
        }
        .into();
        assert!(business.is_business());
        assert_eq!(business.code(), "INSUFFICIENT_STOCK");

        let infra: EngineError = DbError::LockTimeout.into();
        assert!(!infra.is_business());
        assert!(infra.as_business().is_none());
        assert_eq!(infra.code(), "DB_LOCK_TIMEOUT");
    }

    #[test]
    fn test_validation_lifts_to_business() {
        let err: EngineError = ValidationError::Required {
            field: "lines".to_string(),
        }
        .into();
        assert!(matches!(err, EngineError::Business(CoreError::Validation(_))));
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}

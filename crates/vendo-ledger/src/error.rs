//! # Ledger Error Types
//!
//! Error types for storage and orchestration.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                │
//! │                                                                     │
//! │  SQLite Error (sqlx::Error)                                         │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  LedgerError (this module) ← adds context and categorization        │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  Caller maps to a user-facing message:                              │
//! │    • Core(..)   → inline rejection with the computed limit          │
//! │    • Conflict   → retried internally; surfaces only if exhausted    │
//! │    • everything else → generic retryable failure, full context      │
//! │      logged internally                                              │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use vendo_core::CoreError;

/// Storage and orchestration errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Entity not found in the store.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Optimistic-concurrency check failed: the transaction's version
    /// moved between the read and the write. The service retries against
    /// fresh state; this surfaces only when retries are exhausted.
    #[error("concurrent modification of {entity} {id}")]
    Conflict { entity: &'static str, id: String },

    /// A second refund/cancellation for the same transaction was submitted
    /// before the first resolved. Single-flight guard, client side of the
    /// concurrency story.
    #[error("operation already in flight for transaction {transaction_id}")]
    OperationInFlight { transaction_id: String },

    /// Unique constraint violation (e.g. duplicate transaction id).
    #[error("duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Database connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// A stored row failed to decode into a domain type.
    #[error("corrupt row for {entity} {id}: {message}")]
    CorruptRow {
        entity: &'static str,
        id: String,
        message: String,
    },

    /// Business-rule rejection from vendo-core. Carries the offending
    /// quantities for the caller to surface verbatim.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Internal storage error.
    #[error("internal ledger error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Creates a NotFound error for a given entity type and id.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Creates a Conflict error for a given entity type and id.
    pub fn conflict(entity: &'static str, id: impl Into<String>) -> Self {
        LedgerError::Conflict {
            entity,
            id: id.into(),
        }
    }
}

/// Convert sqlx errors to LedgerError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → LedgerError::NotFound
/// sqlx::Error::Database       → analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → LedgerError::PoolExhausted
/// Other                       → LedgerError::Internal
/// ```
impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => LedgerError::NotFound {
                entity: "record",
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite constraint messages:
                // "UNIQUE constraint failed: <table>.<column>"
                // "FOREIGN KEY constraint failed"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    LedgerError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    LedgerError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    LedgerError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => LedgerError::PoolExhausted,

            sqlx::Error::PoolClosed => {
                LedgerError::ConnectionFailed("pool is closed".to_string())
            }

            _ => LedgerError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for LedgerError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        LedgerError::MigrationFailed(err.to_string())
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_passes_through_transparently() {
        let core = CoreError::RefundExceedsRemaining {
            item_index: 0,
            requested: 5,
            remaining: 2,
        };
        let ledger: LedgerError = core.into();
        assert_eq!(
            ledger.to_string(),
            "line 0: requested 5, only 2 available to refund"
        );
    }

    #[test]
    fn test_conflict_message() {
        let err = LedgerError::conflict("transaction", "txn-1");
        assert_eq!(err.to_string(), "concurrent modification of transaction txn-1");
    }
}

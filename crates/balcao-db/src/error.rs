//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! +-----------------------------------------------------------------+
//! |                    Error Propagation                            |
//! |                                                                 |
//! |  SQLite Error (sqlx::Error)                                     |
//! |       |                                                         |
//! |       v                                                         |
//! |  DbError (this module)  <- classifies by result CODE, not text  |
//! |       |                                                         |
//! |       +-- Busy  ----------> retried by the settlement loop      |
//! |       +-- everything else -> propagated, full rollback          |
//! |                                                                 |
//! +-----------------------------------------------------------------+
//! ```
//!
//! The settlement coordinator retries only `DbError::Busy`. SQLite
//! reports lock contention with primary result codes 5 (SQLITE_BUSY)
//! and 6 (SQLITE_LOCKED); extended codes such as SQLITE_BUSY_SNAPSHOT
//! carry the primary code in their low byte. Classifying on the code
//! keeps the retry loop independent of driver message wording.

use thiserror::Error;

use balcao_core::CoreError;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Business rule violation raised inside a transaction.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Inserting a duplicate SKU
    /// - Two sessions racing past the open-session check (the partial
    ///   unique index fires)
    #[error("Unique constraint violation: {message}")]
    UniqueViolation { message: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// CHECK constraint violation.
    #[error("Check constraint violation: {message}")]
    CheckViolation { message: String },

    /// The store reported lock contention (SQLITE_BUSY / SQLITE_LOCKED).
    ///
    /// This is the only retryable error category. Everything else rolls
    /// back and propagates immediately.
    #[error("Database is busy (lock contention)")]
    Busy,

    /// The settlement retry budget was exhausted.
    #[error("Settlement aborted after {attempts} contended attempts")]
    RetriesExhausted { attempts: u32 },

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
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Checks whether this error is in the retryable contention class.
    pub fn is_contention(&self) -> bool {
        matches!(self, DbError::Busy)
    }
}

/// SQLite primary result codes for lock contention.
const SQLITE_BUSY: u32 = 5;
const SQLITE_LOCKED: u32 = 6;

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::Database, code 5/6  -> DbError::Busy
/// sqlx::Error::Database, unique    -> DbError::UniqueViolation
/// sqlx::Error::Database, fk        -> DbError::ForeignKeyViolation
/// sqlx::Error::Database, check     -> DbError::CheckViolation
/// sqlx::Error::RowNotFound         -> DbError::NotFound
/// sqlx::Error::PoolTimedOut        -> DbError::PoolExhausted
/// Other                            -> DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                // Contention first: the extended code's low byte is the
                // primary result code.
                if let Some(code) = db_err.code() {
                    if let Ok(code) = code.parse::<u32>() {
                        let primary = code & 0xFF;
                        if primary == SQLITE_BUSY || primary == SQLITE_LOCKED {
                            return DbError::Busy;
                        }
                    }
                }

                match db_err.kind() {
                    sqlx::error::ErrorKind::UniqueViolation => DbError::UniqueViolation {
                        message: db_err.message().to_string(),
                    },
                    sqlx::error::ErrorKind::ForeignKeyViolation => DbError::ForeignKeyViolation {
                        message: db_err.message().to_string(),
                    },
                    sqlx::error::ErrorKind::CheckViolation => DbError::CheckViolation {
                        message: db_err.message().to_string(),
                    },
                    _ => DbError::QueryFailed(db_err.message().to_string()),
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
// Unit Tests
// =============================================================================

//! Database errors

use thiserror::Error;

/// Database errors
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Record not found
    #[error("record not found")]
    NotFound,

    /// Version precondition failed on save
    #[error("version conflict: expected version {expected}")]
    Conflict {
        /// Version the writer read
        expected: i64,
    },

    /// Stored row could not be mapped to a domain value
    #[error("invalid stored value: {0}")]
    Decode(String),
}

/// Result alias for repository operations
pub type DbResult<T> = Result<T, DbError>;

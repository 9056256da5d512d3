//! Error types for the database layer.

use thiserror::Error;

/// Database operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error (connection, query, etc.)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// IO error (reading the per-date file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed per-date CSV
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Connection URL with an unsupported scheme
    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),

    /// Rows that cannot be loaded (missing key, etc.)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl DbError {
    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// True when retrying the same operation cannot succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(self, DbError::InvalidUrl(_) | DbError::InvalidInput(_))
    }
}

use std::time::Duration;

use thiserror::Error;

/// Errors returned by barrier-guarded branch calls.
///
/// [`BarrierError::Failure`] is the only terminal variant: the business
/// precondition did not hold and the orchestrator should compensate. Every
/// other variant is an infrastructure problem, never recorded as applied,
/// and safe to retry.
#[derive(Debug, Error)]
pub enum BarrierError {
    /// The business action rejected the call (e.g. insufficient stock).
    #[error("Branch failure: {0}")]
    Failure(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The store could not serve the request.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The local transaction did not finish in time and was rolled back.
    #[error("Barrier call timed out after {0:?}")]
    Timeout(Duration),
}

impl BarrierError {
    /// Creates a terminal business failure.
    pub fn failure(reason: impl Into<String>) -> Self {
        BarrierError::Failure(reason.into())
    }

    /// Returns true for business failures that should trigger compensation.
    pub fn is_failure(&self) -> bool {
        matches!(self, BarrierError::Failure(_))
    }

    /// Returns true when the caller should retry the same call later.
    pub fn is_retryable(&self) -> bool {
        !self.is_failure()
    }
}

/// Result type for barrier operations.
pub type Result<T> = std::result::Result<T, BarrierError>;

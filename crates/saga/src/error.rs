//! Saga error types.

use common::Gid;
use thiserror::Error;

use crate::state::SagaState;

/// Errors that can occur while building, submitting or driving a saga.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A saga must contain at least one step.
    #[error("Saga {0} has no steps")]
    NoSteps(Gid),

    /// The saga was already accepted by an orchestrator.
    #[error("Saga {0} has already been submitted")]
    AlreadySubmitted(Gid),

    /// The orchestrator refused the submission.
    #[error("Saga {gid} rejected: {reason}")]
    Rejected { gid: Gid, reason: String },

    /// The orchestrator answered with something other than accept/reject.
    #[error("Unexpected orchestrator response {status}: {body}")]
    UnexpectedResponse { status: u16, body: String },

    /// State machine transition not allowed from the current state.
    #[error("Invalid saga transition from {from} to {to}")]
    InvalidTransition { from: SagaState, to: String },

    /// No saga with this gid is known.
    #[error("Unknown saga: {0}")]
    UnknownSaga(Gid),

    /// The saga did not reach a terminal state in time.
    #[error("Saga {0} still running after wait timeout")]
    WaitTimeout(Gid),

    /// Transport error talking to the orchestrator.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SagaError {
    /// Returns true when resubmitting the same saga may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SagaError::Http(_) | SagaError::UnexpectedResponse { .. } | SagaError::WaitTimeout(_)
        )
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

//! Saga outcome state machine.

use serde::{Deserialize, Serialize};

use crate::error::SagaError;

/// The state of a submitted saga.
///
/// State transitions:
/// ```text
/// Submitted ──► Forwarding(0) ──► … ──► Forwarding(n-1) ──┬──► Succeeded
///                                                        │
///               any forward failure at step k ───────────┴──► Compensating(k) ──► Failed
/// ```
///
/// `Forwarding(i)` is the step whose forward call is in flight.
/// `Compensating(k)` carries the failed step; steps `k-1` down to `0` are
/// compensated and step `k` itself is not, since it never committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// Accepted, no call made yet.
    #[default]
    Submitted,

    /// Forward call of this step is being driven.
    Forwarding(usize),

    /// Step failed; previously succeeded steps are being compensated.
    Compensating(usize),

    /// Every forward call succeeded (terminal state).
    Succeeded,

    /// Compensation finished after a failure (terminal state).
    Failed,
}

impl SagaState {
    /// Starts driving the first step.
    pub fn begin(self) -> Result<Self, SagaError> {
        match self {
            SagaState::Submitted => Ok(SagaState::Forwarding(0)),
            other => Err(other.invalid("Forwarding(0)")),
        }
    }

    /// Records a successful forward call (null-compensation no-ops included).
    pub fn step_succeeded(self, step_count: usize) -> Result<Self, SagaError> {
        match self {
            SagaState::Forwarding(i) if i + 1 >= step_count => Ok(SagaState::Succeeded),
            SagaState::Forwarding(i) => Ok(SagaState::Forwarding(i + 1)),
            other => Err(other.invalid("Forwarding(next)")),
        }
    }

    /// Records a failed forward call.
    pub fn step_failed(self) -> Result<Self, SagaError> {
        match self {
            SagaState::Forwarding(i) => Ok(SagaState::Compensating(i)),
            other => Err(other.invalid("Compensating")),
        }
    }

    /// Records that every required compensation succeeded.
    pub fn compensated(self) -> Result<Self, SagaError> {
        match self {
            SagaState::Compensating(_) => Ok(SagaState::Failed),
            other => Err(other.invalid("Failed")),
        }
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Succeeded | SagaState::Failed)
    }

    /// Returns the state name without its step index.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Submitted => "Submitted",
            SagaState::Forwarding(_) => "Forwarding",
            SagaState::Compensating(_) => "Compensating",
            SagaState::Succeeded => "Succeeded",
            SagaState::Failed => "Failed",
        }
    }

    fn invalid(self, to: &str) -> SagaError {
        SagaError::InvalidTransition {
            from: self,
            to: to.to_string(),
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SagaState::Forwarding(i) | SagaState::Compensating(i) => {
                write!(f, "{}({})", self.as_str(), i)
            }
            _ => f.write_str(self.as_str()),
        }
    }
}

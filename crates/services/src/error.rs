use barrier::BarrierError;
use saga::SagaError;
use thiserror::Error;

/// Errors returned by the service layer outside of branch calls.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request was rejected before any saga was built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Storage error while querying or seeding.
    #[error(transparent)]
    Barrier(#[from] BarrierError),

    /// The saga could not be built or submitted.
    #[error(transparent)]
    Saga(#[from] SagaError),
}

/// Convenience type alias for service results.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Decodes a branch payload; a malformed payload can never succeed on retry.
pub(crate) fn decode<T: serde::de::DeserializeOwned>(
    payload: &serde_json::Value,
) -> barrier::Result<T> {
    T::deserialize(payload).map_err(|e| BarrierError::failure(format!("invalid payload: {e}")))
}

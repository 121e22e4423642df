//! API error types with HTTP response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use barrier::BarrierError;
use saga::{ResultReply, SagaError};
use services::ServiceError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// A branch call did not complete. Answered in the orchestrator's reply
    /// format: 409 for a business failure, 500 to have the call retried.
    Branch(BarrierError),
    /// Saga building or submission error.
    Saga(SagaError),
    /// Storage error outside a branch call.
    Storage(BarrierError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Branch(err) if err.is_failure() => {
                let reply = ResultReply::failure(err.to_string());
                return (StatusCode::CONFLICT, Json(reply)).into_response();
            }
            ApiError::Branch(err) | ApiError::Storage(err) => {
                tracing::error!(error = %err, "storage error");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::Saga(err) => saga_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, Json(body)).into_response()
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    match &err {
        SagaError::NoSteps(_) | SagaError::Serialization(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        SagaError::Rejected { .. } | SagaError::AlreadySubmitted(_) => {
            (StatusCode::CONFLICT, err.to_string())
        }
        SagaError::UnknownSaga(_) => (StatusCode::NOT_FOUND, err.to_string()),
        SagaError::Http(_) | SagaError::UnexpectedResponse { .. } => {
            tracing::warn!(error = %err, "orchestrator unavailable");
            (StatusCode::BAD_GATEWAY, err.to_string())
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidRequest(msg) => ApiError::BadRequest(msg),
            ServiceError::Barrier(e) => ApiError::Storage(e),
            ServiceError::Saga(e) => ApiError::Saga(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use common::Gid;

    use super::*;

    #[test]
    fn test_branch_failure_is_conflict() {
        let response = ApiError::Branch(BarrierError::failure("no stock")).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_branch_infra_error_is_retryable_status() {
        let response = ApiError::Branch(BarrierError::Storage("down".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_saga_mapping() {
        let rejected = ApiError::Saga(SagaError::Rejected {
            gid: Gid::from("g"),
            reason: "dup".into(),
        });
        assert_eq!(rejected.into_response().status(), StatusCode::CONFLICT);

        let invalid = ApiError::from(ServiceError::InvalidRequest("num".into()));
        assert_eq!(invalid.into_response().status(), StatusCode::BAD_REQUEST);
    }
}

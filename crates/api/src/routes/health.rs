//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use services::{OrderRepository, ProductRepository};

use crate::state::{AppState, OrchestratorBackend};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub orchestrator: &'static str,
}

/// GET /health — liveness plus the orchestrator mode in use.
pub async fn check<P, O>(State(state): State<Arc<AppState<P, O>>>) -> Json<HealthResponse>
where
    P: ProductRepository + 'static,
    O: OrderRepository + 'static,
{
    let orchestrator = match state.orchestrator {
        OrchestratorBackend::Local(_) => "local",
        OrchestratorBackend::Http(_) => "http",
    };
    Json(HealthResponse {
        status: "ok",
        orchestrator,
    })
}

//! Branch endpoints called by the orchestrator.
//!
//! The operation type comes from the `op` query parameter, so the forward and
//! compensate paths of a participant share one handler.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use saga::{BranchHandler, BranchQuery, ResultReply};
use services::{OrderRepository, ProductRepository};

use crate::error::ApiError;
use crate::state::AppState;

/// POST /product/decr-stock, /product/decr-stock-revert
#[tracing::instrument(skip(state, payload), fields(gid = %query.gid, branch_id = %query.branch_id, op = %query.op))]
pub async fn product<P, O>(
    State(state): State<Arc<AppState<P, O>>>,
    Query(query): Query<BranchQuery>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<ResultReply>, ApiError>
where
    P: ProductRepository + 'static,
    O: OrderRepository + 'static,
{
    call(state.products.as_ref(), &query, &payload).await
}

/// POST /order/create, /order/create-revert
#[tracing::instrument(skip(state, payload), fields(gid = %query.gid, branch_id = %query.branch_id, op = %query.op))]
pub async fn order<P, O>(
    State(state): State<Arc<AppState<P, O>>>,
    Query(query): Query<BranchQuery>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<ResultReply>, ApiError>
where
    P: ProductRepository + 'static,
    O: OrderRepository + 'static,
{
    call(state.orders.as_ref(), &query, &payload).await
}

async fn call(
    handler: &dyn BranchHandler,
    query: &BranchQuery,
    payload: &serde_json::Value,
) -> Result<Json<ResultReply>, ApiError> {
    let outcome = handler
        .handle(&query.branch(), payload)
        .await
        .map_err(ApiError::Branch)?;

    tracing::debug!(outcome = outcome.as_str(), "branch call answered");
    Ok(Json(ResultReply::success()))
}

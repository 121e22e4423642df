//! Checkout and query endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::Gid;
use serde::{Deserialize, Serialize};
use services::{CheckoutRequest, NewProduct, Order, OrderRepository, Product, ProductRepository};

use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct CheckoutBody {
    /// Caller-chosen gid; one is generated when absent.
    pub gid: Option<String>,
    #[serde(flatten)]
    pub request: CheckoutRequest,
}

// -- Response types --

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub gid: String,
}

#[derive(Serialize)]
pub struct SagaOrdersResponse {
    pub gid: String,
    /// Known only when sagas are driven in-process.
    pub saga_state: Option<String>,
    pub orders: Vec<Order>,
}

// -- Handlers --

/// POST /products — seed a product.
#[tracing::instrument(skip(state, product))]
pub async fn create_product<P, O>(
    State(state): State<Arc<AppState<P, O>>>,
    Json(product): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError>
where
    P: ProductRepository + 'static,
    O: OrderRepository + 'static,
{
    if product.stock < 0 || product.amount < 0 {
        return Err(ApiError::BadRequest(
            "stock and amount must not be negative".to_string(),
        ));
    }
    let product = state
        .products
        .insert(product)
        .await
        .map_err(ApiError::Storage)?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// GET /products/{id}
#[tracing::instrument(skip(state))]
pub async fn get_product<P, O>(
    State(state): State<Arc<AppState<P, O>>>,
    Path(id): Path<i64>,
) -> Result<Json<Product>, ApiError>
where
    P: ProductRepository + 'static,
    O: OrderRepository + 'static,
{
    state
        .products
        .get(id)
        .await
        .map_err(ApiError::Storage)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Product {id} not found")))
}

/// POST /orders — build the checkout saga and submit it.
///
/// Answers 202 once the orchestrator accepted the saga; stock and order
/// changes happen afterwards.
#[tracing::instrument(skip(state, body))]
pub async fn checkout<P, O>(
    State(state): State<Arc<AppState<P, O>>>,
    Json(body): Json<CheckoutBody>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError>
where
    P: ProductRepository + 'static,
    O: OrderRepository + 'static,
{
    let gid = match body.gid {
        Some(gid) if !gid.is_empty() => Gid::from_string(gid),
        _ => state.orchestrator.new_gid().await?,
    };

    let gid = services::checkout(
        state.orchestrator.orchestrator(),
        gid,
        &state.endpoints,
        &body.request,
        state.options.clone(),
    )
    .await?;

    metrics::counter!("checkouts_submitted").increment(1);
    Ok((
        StatusCode::ACCEPTED,
        Json(CheckoutResponse {
            gid: gid.to_string(),
        }),
    ))
}

/// GET /orders/{gid} — orders created by a saga.
#[tracing::instrument(skip(state))]
pub async fn saga_orders<P, O>(
    State(state): State<Arc<AppState<P, O>>>,
    Path(gid): Path<String>,
) -> Result<Json<SagaOrdersResponse>, ApiError>
where
    P: ProductRepository + 'static,
    O: OrderRepository + 'static,
{
    let gid = Gid::from_string(gid);
    let orders = state
        .orders
        .find_by_gid(&gid)
        .await
        .map_err(ApiError::Storage)?;

    let saga_state = match state.orchestrator.local() {
        Some(local) => local.state(&gid).await.map(|s| s.to_string()),
        None => None,
    };

    if orders.is_empty() && saga_state.is_none() {
        return Err(ApiError::NotFound(format!("Saga {gid} not found")));
    }

    Ok(Json(SagaOrdersResponse {
        gid: gid.to_string(),
        saga_state,
        orders,
    }))
}

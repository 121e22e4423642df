//! HTTP server of the mall participants.
//!
//! Serves the product and order branch endpoints called by the orchestrator,
//! a checkout endpoint that submits the saga, and health and Prometheus
//! metrics endpoints.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use barrier::BarrierStore;
use metrics_exporter_prometheus::PrometheusHandle;
use services::{OrderRepository, ProductRepository};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::{AppState, OrchestratorBackend, build_state};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<P, O>(state: Arc<AppState<P, O>>, metrics_handle: PrometheusHandle) -> Router
where
    P: ProductRepository + 'static,
    O: OrderRepository + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<P, O>))
        .route("/product/decr-stock", post(routes::branches::product::<P, O>))
        .route("/product/decr-stock-revert", post(routes::branches::product::<P, O>))
        .route("/order/create", post(routes::branches::order::<P, O>))
        .route("/order/create-revert", post(routes::branches::order::<P, O>))
        .route("/products", post(routes::mall::create_product::<P, O>))
        .route("/products/{id}", get(routes::mall::get_product::<P, O>))
        .route("/orders", post(routes::mall::checkout::<P, O>))
        .route("/orders/{gid}", get(routes::mall::saga_orders::<P, O>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Periodically deletes barrier rows older than `retention_hours`.
pub fn spawn_barrier_purge<S>(store: S, retention_hours: i64, every: Duration) -> JoinHandle<()>
where
    S: BarrierStore + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let Some(cutoff) = chrono::TimeDelta::try_hours(retention_hours)
                .and_then(|age| chrono::Utc::now().checked_sub_signed(age))
            else {
                tracing::warn!(retention_hours, "barrier retention out of range, purge disabled");
                return;
            };

            match store.purge_before(cutoff).await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, %cutoff, "purged barrier records"),
                Err(e) => tracing::warn!(error = %e, "barrier purge failed"),
            }
        }
    })
}

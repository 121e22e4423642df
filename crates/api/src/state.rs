//! Shared application state.

use std::sync::Arc;

use barrier::BarrierConfig;
use common::Gid;
use saga::{HttpOrchestrator, LocalConfig, LocalOrchestrator, Orchestrator, TransOptions};
use services::{
    CheckoutEndpoints, OrderRepository, OrderService, ProductRepository, ProductService,
    register_participants,
};

use crate::config::Config;

/// Where submitted sagas go.
#[derive(Clone)]
pub enum OrchestratorBackend {
    /// Driven in this process against the local services.
    Local(LocalOrchestrator),
    /// Handed to a remote orchestration service.
    Http(HttpOrchestrator),
}

impl OrchestratorBackend {
    pub fn orchestrator(&self) -> &dyn Orchestrator {
        match self {
            OrchestratorBackend::Local(local) => local,
            OrchestratorBackend::Http(http) => http,
        }
    }

    /// A fresh gid; the remote service issues its own.
    pub async fn new_gid(&self) -> saga::Result<Gid> {
        match self {
            OrchestratorBackend::Local(_) => Ok(Gid::new()),
            OrchestratorBackend::Http(http) => http.new_gid().await,
        }
    }

    pub fn local(&self) -> Option<&LocalOrchestrator> {
        match self {
            OrchestratorBackend::Local(local) => Some(local),
            OrchestratorBackend::Http(_) => None,
        }
    }
}

/// Shared application state accessible from all handlers.
pub struct AppState<P, O> {
    pub products: Arc<ProductService<P>>,
    pub orders: Arc<OrderService<O>>,
    pub orchestrator: OrchestratorBackend,
    pub endpoints: CheckoutEndpoints,
    pub options: TransOptions,
}

/// Wires the services to the orchestrator selected by `config`.
pub async fn build_state<P, O>(
    products: P,
    orders: O,
    config: &Config,
) -> saga::Result<Arc<AppState<P, O>>>
where
    P: ProductRepository + 'static,
    O: OrderRepository + 'static,
{
    let barrier_config = BarrierConfig {
        timeout: Some(config.barrier_timeout),
    };
    let products = Arc::new(ProductService::with_config(products, barrier_config.clone()));
    let orders = Arc::new(OrderService::with_config(orders, barrier_config));
    let endpoints = CheckoutEndpoints::from_base(&config.public_url);

    let orchestrator = match &config.orchestrator_url {
        Some(url) => {
            tracing::info!(%url, "using remote orchestrator");
            OrchestratorBackend::Http(HttpOrchestrator::new(url.as_str(), config.submit_timeout)?)
        }
        None => {
            tracing::info!("using in-process orchestrator");
            let local = LocalOrchestrator::new(LocalConfig::default());
            register_participants(&local, &endpoints, products.clone(), orders.clone()).await;
            OrchestratorBackend::Local(local)
        }
    };

    Ok(Arc::new(AppState {
        products,
        orders,
        orchestrator,
        endpoints,
        options: TransOptions::default(),
    }))
}

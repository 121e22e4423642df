//! Checkout saga: reserve stock, then create the order.

use std::sync::Arc;

use common::Gid;
use saga::{BranchHandler, LocalOrchestrator, Orchestrator, Saga, TransOptions};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};
use crate::order::CreateOrderRequest;
use crate::product::DecrStockRequest;

/// Branch endpoints of the two participants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutEndpoints {
    pub decr_stock: String,
    pub decr_stock_revert: String,
    pub create_order: String,
    pub create_order_revert: String,
}

impl CheckoutEndpoints {
    /// Endpoints served under `base` (e.g. `http://localhost:8081/api/busi`).
    pub fn from_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            decr_stock: format!("{base}/product/decr-stock"),
            decr_stock_revert: format!("{base}/product/decr-stock-revert"),
            create_order: format!("{base}/order/create"),
            create_order_revert: format!("{base}/order/create-revert"),
        }
    }
}

/// A customer buying `num` units of product `pid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub uid: i64,
    pub pid: i64,
    pub num: i64,
    pub amount: i64,
}

impl CheckoutRequest {
    fn validate(&self) -> Result<()> {
        if self.num <= 0 {
            return Err(ServiceError::InvalidRequest("num must be positive".into()));
        }
        if self.amount <= 0 {
            return Err(ServiceError::InvalidRequest("amount must be positive".into()));
        }
        Ok(())
    }
}

/// Builds the two-step checkout saga.
pub fn checkout_saga(
    gid: Gid,
    endpoints: &CheckoutEndpoints,
    request: &CheckoutRequest,
    options: TransOptions,
) -> Result<Saga> {
    request.validate()?;

    let saga = Saga::new(gid)
        .add_step(
            &endpoints.decr_stock,
            &endpoints.decr_stock_revert,
            &DecrStockRequest {
                id: request.pid,
                num: request.num,
            },
        )?
        .add_step(
            &endpoints.create_order,
            &endpoints.create_order_revert,
            &CreateOrderRequest {
                uid: request.uid,
                pid: request.pid,
                amount: request.amount,
            },
        )?
        .with_options(options);

    Ok(saga)
}

/// Builds and submits the checkout saga. Returns its gid once accepted.
#[tracing::instrument(skip_all, fields(gid = %gid, uid = request.uid, pid = request.pid))]
pub async fn checkout<O>(
    orchestrator: &O,
    gid: Gid,
    endpoints: &CheckoutEndpoints,
    request: &CheckoutRequest,
    options: TransOptions,
) -> Result<Gid>
where
    O: Orchestrator + ?Sized,
{
    let mut saga = checkout_saga(gid, endpoints, request, options)?;
    saga.submit(orchestrator).await?;
    Ok(saga.gid().clone())
}

/// Routes the checkout endpoints of `orchestrator` to in-process services.
pub async fn register_participants(
    orchestrator: &LocalOrchestrator,
    endpoints: &CheckoutEndpoints,
    product: Arc<dyn BranchHandler>,
    order: Arc<dyn BranchHandler>,
) {
    orchestrator
        .register(endpoints.decr_stock.clone(), product.clone())
        .await;
    orchestrator
        .register(endpoints.decr_stock_revert.clone(), product)
        .await;
    orchestrator
        .register(endpoints.create_order.clone(), order.clone())
        .await;
    orchestrator
        .register(endpoints.create_order_revert.clone(), order)
        .await;
}

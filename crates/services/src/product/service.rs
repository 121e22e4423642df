use async_trait::async_trait;
use barrier::{
    BarrierConfig, BarrierError, BarrierOutcome, Branch, BranchAction, BranchBarrier,
    OperationType,
};
use saga::BranchHandler;
use tracing::warn;

use super::model::{DecrStockRequest, NewProduct, Product};
use super::repository::ProductRepository;
use crate::error::decode;

/// Stock participant.
///
/// Both branch operations go through the barrier, so the stock changes at
/// most once per direction for each `(gid, branch_id)`.
pub struct ProductService<R> {
    barrier: BranchBarrier<R>,
}

impl<R: ProductRepository> ProductService<R> {
    pub fn new(repository: R) -> Self {
        Self {
            barrier: BranchBarrier::new(repository),
        }
    }

    pub fn with_config(repository: R, config: BarrierConfig) -> Self {
        Self {
            barrier: BranchBarrier::with_config(repository, config),
        }
    }

    pub fn repository(&self) -> &R {
        self.barrier.store()
    }

    /// Takes `num` items out of stock. Fails when the stock is short.
    pub async fn decr_stock(
        &self,
        branch: &Branch,
        request: &DecrStockRequest,
    ) -> barrier::Result<BarrierOutcome> {
        self.barrier
            .call(
                branch,
                AdjustStock {
                    repository: self.barrier.store(),
                    request,
                    direction: Direction::Take,
                },
            )
            .await
    }

    /// Puts back what [`ProductService::decr_stock`] took.
    pub async fn decr_stock_revert(
        &self,
        branch: &Branch,
        request: &DecrStockRequest,
    ) -> barrier::Result<BarrierOutcome> {
        self.barrier
            .call(
                branch,
                AdjustStock {
                    repository: self.barrier.store(),
                    request,
                    direction: Direction::Restore,
                },
            )
            .await
    }

    pub async fn get(&self, id: i64) -> barrier::Result<Option<Product>> {
        self.repository().get_product(id).await
    }

    pub async fn insert(&self, product: NewProduct) -> barrier::Result<Product> {
        self.repository().insert_product(product).await
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Take,
    Restore,
}

/// Moves `request.num` items in `direction`. The request is validated here,
/// inside the barrier transaction, so duplicates and suspended forwards never
/// reach the check.
struct AdjustStock<'a, R> {
    repository: &'a R,
    request: &'a DecrStockRequest,
    direction: Direction,
}

#[async_trait]
impl<'a, R: ProductRepository> BranchAction<R::Tx> for AdjustStock<'a, R> {
    async fn run(self, tx: &mut R::Tx) -> barrier::Result<()> {
        let DecrStockRequest { id, num } = *self.request;
        if num <= 0 {
            return Err(BarrierError::failure("num must be positive"));
        }
        let delta = match self.direction {
            Direction::Take => -num,
            Direction::Restore => num,
        };

        let changed = self.repository.adjust_stock(tx, id, delta).await?;
        if changed > 0 {
            return Ok(());
        }
        if self.direction == Direction::Take {
            return Err(BarrierError::failure(format!(
                "insufficient stock for product {id}"
            )));
        }
        // Only reachable when the product row vanished or the stock would overflow.
        warn!(product_id = id, "stock revert matched no product");
        Ok(())
    }
}

#[async_trait]
impl<R: ProductRepository> BranchHandler for ProductService<R> {
    async fn handle(
        &self,
        branch: &Branch,
        payload: &serde_json::Value,
    ) -> barrier::Result<BarrierOutcome> {
        let request: DecrStockRequest = decode(payload)?;
        match branch.op {
            OperationType::Forward => self.decr_stock(branch, &request).await,
            OperationType::Compensate => self.decr_stock_revert(branch, &request).await,
        }
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use barrier::{
    BarrierConfig, BarrierError, BarrierOutcome, Branch, BranchAction, BranchBarrier, Gid,
    OperationType,
};
use saga::BranchHandler;
use tracing::{info, warn};
use uuid::Uuid;

use super::model::{CreateOrderRequest, Order, OrderStatus};
use super::repository::OrderRepository;
use super::users::{AllowAllUsers, UserDirectory};
use crate::error::decode;

/// Order participant.
pub struct OrderService<R> {
    barrier: BranchBarrier<R>,
    users: Arc<dyn UserDirectory>,
}

impl<R: OrderRepository> OrderService<R> {
    pub fn new(repository: R) -> Self {
        Self::with_config(repository, BarrierConfig::default())
    }

    pub fn with_config(repository: R, config: BarrierConfig) -> Self {
        Self {
            barrier: BranchBarrier::with_config(repository, config),
            users: Arc::new(AllowAllUsers),
        }
    }

    /// Replaces the user check run by [`OrderService::create`].
    pub fn with_users(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.users = users;
        self
    }

    pub fn repository(&self) -> &R {
        self.barrier.store()
    }

    /// Creates an order owned by the saga of `branch`.
    pub async fn create(
        &self,
        branch: &Branch,
        request: &CreateOrderRequest,
    ) -> barrier::Result<BarrierOutcome> {
        let outcome = self
            .barrier
            .call(
                branch,
                InsertOrder {
                    repository: self.barrier.store(),
                    users: self.users.as_ref(),
                    gid: &branch.gid,
                    request,
                },
            )
            .await?;

        if outcome.is_applied() {
            info!(gid = %branch.gid, uid = request.uid, "order created");
        }
        Ok(outcome)
    }

    /// Cancels the order created by the saga of `branch`.
    pub async fn create_revert(
        &self,
        branch: &Branch,
        _request: &CreateOrderRequest,
    ) -> barrier::Result<BarrierOutcome> {
        self.barrier
            .call(
                branch,
                CancelOrders {
                    repository: self.barrier.store(),
                    gid: &branch.gid,
                },
            )
            .await
    }

    pub async fn get(&self, id: Uuid) -> barrier::Result<Option<Order>> {
        self.repository().get_order(id).await
    }

    pub async fn find_by_gid(&self, gid: &Gid) -> barrier::Result<Vec<Order>> {
        self.repository().find_by_gid(gid).await
    }
}

/// Validates and inserts the order inside the barrier transaction, so a
/// redelivered or suspended forward is answered by the barrier before any
/// check can reject it.
struct InsertOrder<'a, R> {
    repository: &'a R,
    users: &'a dyn UserDirectory,
    gid: &'a Gid,
    request: &'a CreateOrderRequest,
}

#[async_trait]
impl<'a, R: OrderRepository> BranchAction<R::Tx> for InsertOrder<'a, R> {
    async fn run(self, tx: &mut R::Tx) -> barrier::Result<()> {
        let request = self.request;
        if request.amount <= 0 {
            return Err(BarrierError::failure("amount must be positive"));
        }
        if !self.users.exists(request.uid).await? {
            return Err(BarrierError::failure(format!("unknown user {}", request.uid)));
        }

        let order = Order {
            id: Uuid::new_v4(),
            gid: self.gid.clone(),
            uid: request.uid,
            pid: request.pid,
            amount: request.amount,
            status: OrderStatus::Created,
        };
        self.repository.insert_order(tx, &order).await
    }
}

struct CancelOrders<'a, R> {
    repository: &'a R,
    gid: &'a Gid,
}

#[async_trait]
impl<'a, R: OrderRepository> BranchAction<R::Tx> for CancelOrders<'a, R> {
    async fn run(self, tx: &mut R::Tx) -> barrier::Result<()> {
        let cancelled = self.repository.cancel_by_gid(tx, self.gid).await?;
        if cancelled == 0 {
            warn!(gid = %self.gid, "no order to cancel");
        }
        Ok(())
    }
}

#[async_trait]
impl<R: OrderRepository> BranchHandler for OrderService<R> {
    async fn handle(
        &self,
        branch: &Branch,
        payload: &serde_json::Value,
    ) -> barrier::Result<BarrierOutcome> {
        let request: CreateOrderRequest = decode(payload)?;
        match branch.op {
            OperationType::Forward => self.create(branch, &request).await,
            OperationType::Compensate => self.create_revert(branch, &request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use barrier::{BranchId, MemoryDb, SkipReason};

    use super::*;
    use crate::order::{KnownUsers, OrderTable};

    fn service() -> OrderService<MemoryDb<OrderTable>> {
        OrderService::new(MemoryDb::<OrderTable>::new())
    }

    const REQUEST: CreateOrderRequest = CreateOrderRequest {
        uid: 1,
        pid: 7,
        amount: 300,
    };

    #[tokio::test]
    async fn create_is_idempotent() {
        let service = service();
        let branch = Branch::forward(Gid::new(), BranchId::for_step(1));

        service.create(&branch, &REQUEST).await.unwrap();
        let again = service.create(&branch, &REQUEST).await.unwrap();

        assert_eq!(again, BarrierOutcome::Skipped(SkipReason::Duplicate));
        let orders = service.find_by_gid(&branch.gid).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Created);
        assert_eq!(service.get(orders[0].id).await.unwrap(), Some(orders[0].clone()));
    }

    #[tokio::test]
    async fn revert_cancels_the_saga_order() {
        let service = service();
        let gid = Gid::new();
        service
            .create(&Branch::forward(gid.clone(), BranchId::for_step(1)), &REQUEST)
            .await
            .unwrap();

        let outcome = service
            .create_revert(&Branch::compensate(gid.clone(), BranchId::for_step(1)), &REQUEST)
            .await
            .unwrap();

        assert_eq!(outcome, BarrierOutcome::Applied);
        let orders = service.find_by_gid(&gid).await.unwrap();
        assert_eq!(orders[0].status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn revert_before_create_blocks_the_order() {
        let service = service();
        let gid = Gid::new();

        let revert = service
            .create_revert(&Branch::compensate(gid.clone(), BranchId::for_step(1)), &REQUEST)
            .await
            .unwrap();
        let create = service
            .create(&Branch::forward(gid.clone(), BranchId::for_step(1)), &REQUEST)
            .await
            .unwrap();

        assert_eq!(revert, BarrierOutcome::Skipped(SkipReason::NullCompensation));
        assert_eq!(create, BarrierOutcome::Skipped(SkipReason::Suspended));
        assert!(service.find_by_gid(&gid).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_user_is_a_failure() {
        let service = service().with_users(Arc::new(KnownUsers::new([2, 3])));
        let branch = Branch::forward(Gid::new(), BranchId::for_step(1));

        let err = service.create(&branch, &REQUEST).await.unwrap_err();

        assert!(err.is_failure());
        assert_eq!(service.repository().barrier_count().await, 0);
    }

    /// User directory whose answer can be flipped between calls.
    struct Switchable(AtomicBool);

    #[async_trait]
    impl UserDirectory for Switchable {
        async fn exists(&self, _uid: i64) -> barrier::Result<bool> {
            Ok(self.0.load(Ordering::SeqCst))
        }
    }

    #[tokio::test]
    async fn redelivered_create_is_a_duplicate_even_if_the_user_is_gone() {
        let users = Arc::new(Switchable(AtomicBool::new(true)));
        let service = service().with_users(users.clone());
        let branch = Branch::forward(Gid::new(), BranchId::for_step(1));

        let first = service.create(&branch, &REQUEST).await.unwrap();
        users.0.store(false, Ordering::SeqCst);
        let again = service.create(&branch, &REQUEST).await.unwrap();

        assert_eq!(first, BarrierOutcome::Applied);
        assert_eq!(again, BarrierOutcome::Skipped(SkipReason::Duplicate));
        assert_eq!(service.find_by_gid(&branch.gid).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn late_create_after_revert_is_suspended_for_invalid_requests() {
        let service = service().with_users(Arc::new(KnownUsers::new([])));
        let gid = Gid::new();
        let invalid = CreateOrderRequest {
            amount: 0,
            ..REQUEST
        };

        let revert = service
            .create_revert(&Branch::compensate(gid.clone(), BranchId::for_step(1)), &REQUEST)
            .await
            .unwrap();
        let unknown_user = service
            .create(&Branch::forward(gid.clone(), BranchId::for_step(1)), &REQUEST)
            .await
            .unwrap();
        let bad_amount = service
            .create(&Branch::forward(gid.clone(), BranchId::for_step(1)), &invalid)
            .await
            .unwrap();

        assert_eq!(revert, BarrierOutcome::Skipped(SkipReason::NullCompensation));
        assert_eq!(unknown_user, BarrierOutcome::Skipped(SkipReason::Suspended));
        assert_eq!(bad_amount, BarrierOutcome::Skipped(SkipReason::Suspended));
        assert!(service.find_by_gid(&gid).await.unwrap().is_empty());
    }
}

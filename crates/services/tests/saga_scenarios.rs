//! End-to-end checkout sagas driven by the in-process orchestrator.
//!
//! ```bash
//! cargo test -p services --test saga_scenarios
//! ```

use std::sync::Arc;
use std::time::Duration;

use barrier::{BarrierOutcome, Branch, BranchId, Gid, MemoryDb, OperationType, SkipReason};
use saga::{CallResult, LocalConfig, LocalOrchestrator, SagaState, TransOptions};
use services::{
    CheckoutEndpoints, CheckoutRequest, KnownUsers, NewProduct, OrderService, OrderTable,
    ProductService, ProductTable, checkout, register_participants,
};

const WAIT: Duration = Duration::from_secs(5);

struct Mall {
    orchestrator: LocalOrchestrator,
    endpoints: CheckoutEndpoints,
    products: Arc<ProductService<MemoryDb<ProductTable>>>,
    orders: Arc<OrderService<MemoryDb<OrderTable>>>,
    product_id: i64,
}

impl Mall {
    async fn stock(&self) -> i64 {
        self.products
            .get(self.product_id)
            .await
            .unwrap()
            .unwrap()
            .stock
    }

    fn request(&self, num: i64, uid: i64) -> CheckoutRequest {
        CheckoutRequest {
            uid,
            pid: self.product_id,
            num,
            amount: 100 * num,
        }
    }
}

/// Product with `stock` units; only user 1 may order.
async fn mall(stock: i64) -> Mall {
    let orchestrator = LocalOrchestrator::new(LocalConfig {
        retry_interval: Duration::from_millis(5),
        ..LocalConfig::default()
    });
    let endpoints = CheckoutEndpoints::from_base("local://busi");

    let products = Arc::new(ProductService::new(MemoryDb::<ProductTable>::new()));
    let orders = Arc::new(
        OrderService::new(MemoryDb::<OrderTable>::new()).with_users(Arc::new(KnownUsers::new([1]))),
    );
    register_participants(&orchestrator, &endpoints, products.clone(), orders.clone()).await;

    let product = products
        .insert(NewProduct {
            name: "keyboard".into(),
            description: "mechanical".into(),
            stock,
            amount: 100,
        })
        .await
        .unwrap();

    Mall {
        orchestrator,
        endpoints,
        products,
        orders,
        product_id: product.id,
    }
}

#[tokio::test]
async fn successful_checkout_reserves_stock_and_creates_order() {
    let mall = mall(10).await;
    let gid = Gid::new();

    checkout(
        &mall.orchestrator,
        gid.clone(),
        &mall.endpoints,
        &mall.request(3, 1),
        TransOptions::default(),
    )
    .await
    .unwrap();
    let status = mall.orchestrator.wait_for(&gid, WAIT).await.unwrap();

    assert_eq!(status.state, SagaState::Succeeded);
    assert_eq!(mall.stock().await, 7);
    let orders = mall.orders.find_by_gid(&gid).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].amount, 300);
}

#[tokio::test]
async fn single_step_on_empty_stock_fails_without_effect() {
    let mall = mall(0).await;
    let gid = Gid::new();

    let mut saga = saga::Saga::new(gid.clone())
        .add_step(
            &mall.endpoints.decr_stock,
            &mall.endpoints.decr_stock_revert,
            &services::DecrStockRequest {
                id: mall.product_id,
                num: 1,
            },
        )
        .unwrap();
    saga.submit(&mall.orchestrator).await.unwrap();
    let status = mall.orchestrator.wait_for(&gid, WAIT).await.unwrap();

    assert_eq!(status.state, SagaState::Failed);
    assert_eq!(mall.stock().await, 0);
    assert_eq!(mall.products.repository().barrier_count().await, 0);
    assert!(
        status
            .calls
            .iter()
            .all(|call| call.branch.op == OperationType::Forward)
    );
}

#[tokio::test]
async fn failed_order_restores_stock() {
    let mall = mall(10).await;
    let gid = Gid::new();

    // User 2 is unknown to the order service.
    checkout(
        &mall.orchestrator,
        gid.clone(),
        &mall.endpoints,
        &mall.request(4, 2),
        TransOptions::default(),
    )
    .await
    .unwrap();
    let status = mall.orchestrator.wait_for(&gid, WAIT).await.unwrap();

    assert_eq!(status.state, SagaState::Failed);
    assert_eq!(mall.stock().await, 10);
    assert!(mall.orders.find_by_gid(&gid).await.unwrap().is_empty());

    let sequence: Vec<(String, OperationType, bool)> = status
        .calls
        .iter()
        .map(|call| {
            (
                call.branch.branch_id.to_string(),
                call.branch.op,
                matches!(call.result, CallResult::Succeeded(_)),
            )
        })
        .collect();
    assert_eq!(
        sequence,
        vec![
            ("01".to_string(), OperationType::Forward, true),
            ("02".to_string(), OperationType::Forward, false),
            ("01".to_string(), OperationType::Compensate, true),
        ]
    );
}

#[tokio::test]
async fn insufficient_stock_creates_no_order() {
    let mall = mall(2).await;
    let gid = Gid::new();

    checkout(
        &mall.orchestrator,
        gid.clone(),
        &mall.endpoints,
        &mall.request(3, 1),
        TransOptions::default(),
    )
    .await
    .unwrap();
    let status = mall.orchestrator.wait_for(&gid, WAIT).await.unwrap();

    assert_eq!(status.state, SagaState::Failed);
    assert_eq!(mall.stock().await, 2);
    assert!(mall.orders.find_by_gid(&gid).await.unwrap().is_empty());
    assert_eq!(status.calls.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicate_forwards_apply_once() {
    let mall = mall(10).await;
    let branch = Branch::forward(Gid::new(), BranchId::for_step(0));
    let request = services::DecrStockRequest {
        id: mall.product_id,
        num: 1,
    };

    let calls = (0..3).map(|_| {
        let products = mall.products.clone();
        let branch = branch.clone();
        tokio::spawn(async move { products.decr_stock(&branch, &request).await })
    });
    let mut outcomes = Vec::new();
    for call in calls.collect::<Vec<_>>() {
        outcomes.push(call.await.unwrap().unwrap());
    }

    let applied = outcomes.iter().filter(|o| o.is_applied()).count();
    let duplicates = outcomes
        .iter()
        .filter(|o| **o == BarrierOutcome::Skipped(SkipReason::Duplicate))
        .count();
    assert_eq!(applied, 1);
    assert_eq!(duplicates, 2);
    assert_eq!(mall.stock().await, 9);
}

#[tokio::test]
async fn late_forward_after_compensation_changes_nothing() {
    let mall = mall(5).await;
    let gid = Gid::new();
    let request = services::DecrStockRequest {
        id: mall.product_id,
        num: 2,
    };

    // The orchestrator gave up on the forward and compensated; the forward
    // request then arrives late.
    let revert = mall
        .products
        .decr_stock_revert(&Branch::compensate(gid.clone(), BranchId::for_step(0)), &request)
        .await
        .unwrap();
    let forward = mall
        .products
        .decr_stock(&Branch::forward(gid, BranchId::for_step(0)), &request)
        .await
        .unwrap();

    assert_eq!(revert, BarrierOutcome::Skipped(SkipReason::NullCompensation));
    assert_eq!(forward, BarrierOutcome::Skipped(SkipReason::Suspended));
    assert_eq!(mall.stock().await, 5);
}

#[tokio::test]
async fn many_sagas_never_oversell() {
    let mall = mall(3).await;
    let mut gids = Vec::new();

    for _ in 0..5 {
        let gid = Gid::new();
        checkout(
            &mall.orchestrator,
            gid.clone(),
            &mall.endpoints,
            &mall.request(1, 1),
            TransOptions::default(),
        )
        .await
        .unwrap();
        gids.push(gid);
    }

    let mut succeeded = 0;
    for gid in &gids {
        let status = mall.orchestrator.wait_for(gid, WAIT).await.unwrap();
        if status.state == SagaState::Succeeded {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 3);
    assert_eq!(mall.stock().await, 0);
}

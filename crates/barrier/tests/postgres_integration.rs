//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency. Every test
//! works on its own gid, so they can run in parallel.
//!
//! ```bash
//! cargo test -p barrier --test postgres_integration
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use barrier::{
    BarrierError, BarrierOutcome, BarrierStore, Branch, BranchAction, BranchBarrier, BranchId,
    Gid, OperationType, PgStore, PgTx, SkipReason,
};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::{OnceCell, oneshot};

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_barrier_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            // Business table guarded by the barrier in these tests
            sqlx::raw_sql(
                "CREATE TABLE IF NOT EXISTS ledger (id BIGSERIAL PRIMARY KEY, gid TEXT NOT NULL, amount BIGINT NOT NULL)",
            )
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_barrier() -> BranchBarrier<PgStore> {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    BranchBarrier::new(PgStore::new(pool))
}

/// Appends a ledger row; refuses negative amounts.
struct Post {
    gid: Gid,
    amount: i64,
}

#[async_trait]
impl BranchAction<PgTx> for Post {
    async fn run(self, tx: &mut PgTx) -> barrier::Result<()> {
        if self.amount < 0 {
            return Err(BarrierError::failure("negative amount"));
        }
        sqlx::query("INSERT INTO ledger (gid, amount) VALUES ($1, $2)")
            .bind(self.gid.as_str())
            .bind(self.amount)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

/// Appends a signed ledger row, then holds the transaction open for `hold`
/// before committing or, with `fail`, reporting a failure.
struct SlowPost {
    gid: Gid,
    amount: i64,
    hold: Duration,
    entered: Option<oneshot::Sender<()>>,
    fail: bool,
}

impl SlowPost {
    fn quick(gid: &Gid, amount: i64) -> Self {
        Self {
            gid: gid.clone(),
            amount,
            hold: Duration::ZERO,
            entered: None,
            fail: false,
        }
    }
}

#[async_trait]
impl BranchAction<PgTx> for SlowPost {
    async fn run(self, tx: &mut PgTx) -> barrier::Result<()> {
        sqlx::query("INSERT INTO ledger (gid, amount) VALUES ($1, $2)")
            .bind(self.gid.as_str())
            .bind(self.amount)
            .execute(&mut **tx)
            .await?;
        if let Some(entered) = self.entered {
            let _ = entered.send(());
        }
        tokio::time::sleep(self.hold).await;
        if self.fail {
            return Err(BarrierError::failure("rejected after hold"));
        }
        Ok(())
    }
}

async fn ledger_sum(barrier: &BranchBarrier<PgStore>, gid: &Gid) -> i64 {
    sqlx::query_scalar("SELECT COALESCE(SUM(amount), 0)::BIGINT FROM ledger WHERE gid = $1")
        .bind(gid.as_str())
        .fetch_one(barrier.store().pool())
        .await
        .unwrap()
}

async fn ledger_rows(barrier: &BranchBarrier<PgStore>, gid: &Gid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM ledger WHERE gid = $1")
        .bind(gid.as_str())
        .fetch_one(barrier.store().pool())
        .await
        .unwrap()
}

fn forward(gid: &Gid) -> Branch {
    Branch::forward(gid.clone(), BranchId::for_step(0))
}

#[tokio::test]
async fn forward_twice_applies_once() {
    let barrier = get_test_barrier().await;
    let gid = Gid::new();
    let branch = forward(&gid);

    let first = barrier
        .call(&branch, Post { gid: gid.clone(), amount: 5 })
        .await
        .unwrap();
    let second = barrier
        .call(&branch, Post { gid: gid.clone(), amount: 5 })
        .await
        .unwrap();

    assert_eq!(first, BarrierOutcome::Applied);
    assert_eq!(second, BarrierOutcome::Skipped(SkipReason::Duplicate));
    assert_eq!(ledger_rows(&barrier, &gid).await, 1);
}

#[tokio::test]
async fn compensation_before_forward_blocks_forward() {
    let barrier = get_test_barrier().await;
    let gid = Gid::new();
    let fwd = forward(&gid);
    let comp = fwd.with_op(OperationType::Compensate);

    let comp_outcome = barrier
        .call(&comp, Post { gid: gid.clone(), amount: 1 })
        .await
        .unwrap();
    let fwd_outcome = barrier
        .call(&fwd, Post { gid: gid.clone(), amount: 1 })
        .await
        .unwrap();

    assert_eq!(
        comp_outcome,
        BarrierOutcome::Skipped(SkipReason::NullCompensation)
    );
    assert_eq!(fwd_outcome, BarrierOutcome::Skipped(SkipReason::Suspended));
    assert_eq!(ledger_rows(&barrier, &gid).await, 0);

    let records = barrier.store().find_records(&gid).await.unwrap();
    assert_eq!(records.len(), 2);
    let placeholder = records
        .iter()
        .find(|r| r.op == OperationType::Forward)
        .unwrap();
    assert!(placeholder.is_placeholder());
}

#[tokio::test]
async fn forward_then_compensation_runs_both_once() {
    let barrier = get_test_barrier().await;
    let gid = Gid::new();
    let fwd = forward(&gid);
    let comp = fwd.with_op(OperationType::Compensate);

    barrier
        .call(&fwd, Post { gid: gid.clone(), amount: 3 })
        .await
        .unwrap();
    for _ in 0..2 {
        barrier
            .call(&comp, Post { gid: gid.clone(), amount: 0 })
            .await
            .unwrap();
    }

    assert_eq!(ledger_rows(&barrier, &gid).await, 2);
}

#[tokio::test]
async fn failure_leaves_no_record() {
    let barrier = get_test_barrier().await;
    let gid = Gid::new();

    let err = barrier
        .call(&forward(&gid), Post { gid: gid.clone(), amount: -1 })
        .await
        .unwrap_err();

    assert!(err.is_failure());
    assert!(barrier.store().find_records(&gid).await.unwrap().is_empty());
    assert_eq!(ledger_rows(&barrier, &gid).await, 0);
}

#[tokio::test]
async fn concurrent_duplicates_apply_once() {
    let barrier = Arc::new(get_test_barrier().await);
    let gid = Gid::new();
    let branch = forward(&gid);

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let barrier = barrier.clone();
            let branch = branch.clone();
            let gid = gid.clone();
            tokio::spawn(async move { barrier.call(&branch, Post { gid, amount: 1 }).await })
        })
        .collect();

    let mut applied = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            BarrierOutcome::Applied => applied += 1,
            BarrierOutcome::Skipped(SkipReason::Duplicate) => duplicates += 1,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(duplicates, 2);
    assert_eq!(ledger_rows(&barrier, &gid).await, 1);
}

/// Starts a forward that holds its transaction open, then sends the
/// compensation for the same branch while the forward is still in flight.
async fn race_compensation(
    barrier: &Arc<BranchBarrier<PgStore>>,
    gid: &Gid,
    forward_fails: bool,
) -> (barrier::Result<BarrierOutcome>, barrier::Result<BarrierOutcome>) {
    let (entered_tx, entered_rx) = oneshot::channel();
    let slow = SlowPost {
        gid: gid.clone(),
        amount: 5,
        hold: Duration::from_millis(300),
        entered: Some(entered_tx),
        fail: forward_fails,
    };

    let forward_task = {
        let barrier = barrier.clone();
        let branch = forward(gid);
        tokio::spawn(async move { barrier.call(&branch, slow).await })
    };
    entered_rx.await.unwrap();

    let compensate = Branch::compensate(gid.clone(), BranchId::for_step(0));
    let compensation = barrier.call(&compensate, SlowPost::quick(gid, -5)).await;
    let forwarded = forward_task.await.unwrap();
    (forwarded, compensation)
}

#[tokio::test]
async fn compensation_racing_a_committed_forward_reverts_it() {
    let barrier = Arc::new(get_test_barrier().await);
    let gid = Gid::new();

    let (forwarded, compensation) = race_compensation(&barrier, &gid, false).await;

    assert_eq!(forwarded.unwrap(), BarrierOutcome::Applied);
    assert_eq!(compensation.unwrap(), BarrierOutcome::Applied);
    assert_eq!(ledger_rows(&barrier, &gid).await, 2);
    assert_eq!(ledger_sum(&barrier, &gid).await, 0);
}

#[tokio::test]
async fn compensation_racing_a_failed_forward_is_null() {
    let barrier = Arc::new(get_test_barrier().await);
    let gid = Gid::new();

    let (forwarded, compensation) = race_compensation(&barrier, &gid, true).await;

    assert!(forwarded.unwrap_err().is_failure());
    assert_eq!(
        compensation.unwrap(),
        BarrierOutcome::Skipped(SkipReason::NullCompensation)
    );
    assert_eq!(ledger_rows(&barrier, &gid).await, 0);

    // The placeholder left by the null compensation keeps blocking the forward.
    let late = barrier
        .call(&forward(&gid), SlowPost::quick(&gid, 5))
        .await
        .unwrap();
    assert_eq!(late, BarrierOutcome::Skipped(SkipReason::Suspended));
    assert_eq!(ledger_rows(&barrier, &gid).await, 0);
}

#[tokio::test]
async fn purge_before_removes_only_old_rows() {
    let barrier = get_test_barrier().await;
    let gid = Gid::new();

    barrier
        .call(&forward(&gid), Post { gid: gid.clone(), amount: 1 })
        .await
        .unwrap();

    let cutoff = chrono::Utc::now() - chrono::Duration::days(7);
    barrier.store().purge_before(cutoff).await.unwrap();

    assert_eq!(barrier.store().find_records(&gid).await.unwrap().len(), 1);
}

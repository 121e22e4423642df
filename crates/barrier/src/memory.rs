use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Branch, BranchId, Gid, OperationType};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    BarrierError, BarrierRecord, Result,
    record::TRANS_TYPE_SAGA,
    store::BarrierStore,
};

type RecordKey = (String, Gid, BranchId, OperationType);

fn key_of(trans_type: &str, branch: &Branch) -> RecordKey {
    (
        trans_type.to_string(),
        branch.gid.clone(),
        branch.branch_id.clone(),
        branch.op,
    )
}

#[derive(Debug, Clone, Default)]
struct Tables<S> {
    barriers: HashMap<RecordKey, BarrierRecord>,
    state: S,
}

/// In-memory transactional database for testing and single-process use.
///
/// Holds barrier records next to an arbitrary business state `S`.
/// Transactions are fully serialised: [`BarrierStore::begin`] takes an
/// exclusive lock and works on a private copy of the tables that replaces
/// the shared copy on commit. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryDb<S> {
    tables: Arc<Mutex<Tables<S>>>,
    unavailable: Arc<AtomicBool>,
}

/// An open [`MemoryDb`] transaction.
pub struct MemoryTx<S> {
    guard: OwnedMutexGuard<Tables<S>>,
    work: Tables<S>,
}

impl<S> MemoryTx<S> {
    /// Business state as seen by this transaction.
    pub fn state(&self) -> &S {
        &self.work.state
    }

    /// Mutable business state; changes become visible on commit.
    pub fn state_mut(&mut self) -> &mut S {
        &mut self.work.state
    }
}

impl<S: Clone + Default> MemoryDb<S> {
    /// Creates a database with default business state.
    pub fn new() -> Self {
        Self::with_state(S::default())
    }
}

impl<S: Clone> MemoryDb<S> {
    /// Creates a database seeded with `state`.
    pub fn with_state(state: S) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables {
                barriers: HashMap::new(),
                state,
            })),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns a copy of the committed business state.
    pub async fn snapshot(&self) -> S {
        self.tables.lock().await.state.clone()
    }

    /// Reads the committed business state.
    pub async fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.tables.lock().await.state)
    }

    /// Mutates the committed business state outside any barrier.
    pub async fn update<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.tables.lock().await.state)
    }

    /// Returns the number of stored barrier records.
    pub async fn barrier_count(&self) -> usize {
        self.tables.lock().await.barriers.len()
    }

    /// Makes every new transaction fail as if storage were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl<S> BarrierStore for MemoryDb<S>
where
    S: Clone + Send + Sync + 'static,
{
    type Tx = MemoryTx<S>;

    async fn begin(&self) -> Result<Self::Tx> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BarrierError::Storage("in-memory store unavailable".into()));
        }
        let guard = self.tables.clone().lock_owned().await;
        let work = (*guard).clone();
        Ok(MemoryTx { guard, work })
    }

    async fn insert_barrier(&self, tx: &mut Self::Tx, record: &BarrierRecord) -> Result<bool> {
        let key = key_of(&record.trans_type, &record.branch());
        if tx.work.barriers.contains_key(&key) {
            return Ok(false);
        }
        tx.work.barriers.insert(key, record.clone());
        Ok(true)
    }

    async fn fetch_barrier(
        &self,
        tx: &mut Self::Tx,
        branch: &Branch,
    ) -> Result<Option<BarrierRecord>> {
        Ok(tx
            .work
            .barriers
            .get(&key_of(TRANS_TYPE_SAGA, branch))
            .cloned())
    }

    async fn commit(&self, tx: Self::Tx) -> Result<()> {
        let MemoryTx { mut guard, work } = tx;
        *guard = work;
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<()> {
        drop(tx);
        Ok(())
    }

    async fn find_records(&self, gid: &Gid) -> Result<Vec<BarrierRecord>> {
        let tables = self.tables.lock().await;
        let mut records: Vec<_> = tables
            .barriers
            .values()
            .filter(|r| &r.gid == gid)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            a.branch_id
                .cmp(&b.branch_id)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(records)
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        let before = tables.barriers.len();
        tables.barriers.retain(|_, r| r.created_at >= cutoff);
        Ok((before - tables.barriers.len()) as u64)
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Branch, Gid};

use crate::{BarrierRecord, Result};

/// Transactional storage holding barrier records next to the business data
/// they guard.
///
/// A participant's repository implements this trait over the same database
/// as its business tables so that barrier rows and business mutations commit
/// or roll back together. All implementations must be thread-safe.
#[async_trait]
pub trait BarrierStore: Send + Sync {
    /// An open local transaction.
    ///
    /// Dropping it without calling [`BarrierStore::commit`] discards every
    /// change made through it.
    type Tx: Send;

    /// Opens a local transaction.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Inserts `record` unless a row with the same
    /// `(trans_type, gid, branch_id, op)` already exists.
    ///
    /// Returns true when a row was inserted. Concurrent inserts of the same
    /// key must be serialised by the store: exactly one of them sees `true`.
    async fn insert_barrier(&self, tx: &mut Self::Tx, record: &BarrierRecord) -> Result<bool>;

    /// Reads the record for `branch` as seen from inside `tx`.
    async fn fetch_barrier(&self, tx: &mut Self::Tx, branch: &Branch)
    -> Result<Option<BarrierRecord>>;

    /// Commits the transaction.
    async fn commit(&self, tx: Self::Tx) -> Result<()>;

    /// Rolls the transaction back.
    async fn rollback(&self, tx: Self::Tx) -> Result<()>;

    /// Returns every committed record of a saga.
    async fn find_records(&self, gid: &Gid) -> Result<Vec<BarrierRecord>>;

    /// Deletes records created before `cutoff`. Returns the number removed.
    ///
    /// Only call with a cutoff older than any saga that may still retry.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// A local business mutation run under the barrier.
///
/// Implementations perform their writes through `tx` and return
/// [`crate::BarrierError::Failure`] when a business precondition does not
/// hold. They must not commit or roll back `tx` themselves.
#[async_trait]
pub trait BranchAction<Tx: Send>: Send {
    async fn run(self, tx: &mut Tx) -> Result<()>;
}

//! Sub-transaction barrier for saga participants.
//!
//! A participant wraps every forward and compensating branch call in
//! [`BranchBarrier::call`]. The barrier records each
//! `(gid, branch_id, op)` in the same local storage transaction as the
//! business mutation, which makes the call:
//!
//! - idempotent: a repeated delivery finds its record and is skipped
//! - null-compensation safe: a compensation whose forward never committed
//!   records a placeholder forward row and does nothing
//! - suspension safe: a forward arriving after its compensation hits that
//!   placeholder and does nothing
//!
//! Storage is pluggable through [`BarrierStore`]: [`MemoryDb`] for tests and
//! single-process use, [`PgStore`] for PostgreSQL.

pub mod barrier;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use barrier::{BarrierConfig, BarrierOutcome, BranchBarrier, SkipReason};
pub use common::{Branch, BranchId, Gid, OperationType};
pub use error::{BarrierError, Result};
pub use memory::{MemoryDb, MemoryTx};
pub use postgres::{PgStore, PgTx};
pub use record::{BarrierRecord, TRANS_TYPE_SAGA};
pub use store::{BarrierStore, BranchAction};

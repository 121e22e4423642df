//! The barrier decision procedure.

use std::time::{Duration, Instant};

use common::{Branch, OperationType};

use crate::error::{BarrierError, Result};
use crate::record::BarrierRecord;
use crate::store::{BarrierStore, BranchAction};

/// Why a branch call returned success without running its business action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// This operation was already applied by an earlier delivery.
    Duplicate,
    /// A compensation arrived before its forward call ever committed.
    NullCompensation,
    /// A forward call arrived after its compensation had been recorded.
    Suspended,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Duplicate => "duplicate",
            SkipReason::NullCompensation => "null_compensation",
            SkipReason::Suspended => "suspended",
        }
    }
}

/// Successful resolution of a branch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierOutcome {
    /// The business action ran and committed together with its record.
    Applied,
    /// Nothing ran; the call is a no-op success.
    Skipped(SkipReason),
}

impl BarrierOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, BarrierOutcome::Applied)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BarrierOutcome::Applied => "applied",
            BarrierOutcome::Skipped(reason) => reason.as_str(),
        }
    }
}

/// Barrier tuning.
#[derive(Debug, Clone)]
pub struct BarrierConfig {
    /// Upper bound on one guarded call, storage round-trips included.
    /// `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for BarrierConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// Guards a participant's branch calls against duplicate, late and
/// out-of-order delivery.
///
/// All safety comes from the records in the store; nothing is remembered
/// in memory between calls, so any number of barrier instances may share
/// one store.
#[derive(Debug, Clone)]
pub struct BranchBarrier<S> {
    store: S,
    config: BarrierConfig,
}

impl<S: BarrierStore> BranchBarrier<S> {
    /// Creates a barrier with the default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(store, BarrierConfig::default())
    }

    pub fn with_config(store: S, config: BarrierConfig) -> Self {
        Self { store, config }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs `action` at most once for `branch`.
    ///
    /// Opens a local transaction, writes the barrier records, and either
    /// skips the action or runs it inside the same transaction. The records
    /// commit only together with a successful action; on
    /// [`BarrierError::Failure`] everything is rolled back and a later retry
    /// re-evaluates the business precondition.
    #[tracing::instrument(
        skip_all,
        fields(gid = %branch.gid, branch_id = %branch.branch_id, op = %branch.op)
    )]
    pub async fn call<A>(&self, branch: &Branch, action: A) -> Result<BarrierOutcome>
    where
        A: BranchAction<S::Tx>,
    {
        let started = Instant::now();

        let result = match self.config.timeout {
            Some(limit) => tokio::time::timeout(limit, self.guarded(branch, action))
                .await
                .unwrap_or(Err(BarrierError::Timeout(limit))),
            None => self.guarded(branch, action).await,
        };

        let outcome = match &result {
            Ok(outcome) => outcome.as_str(),
            Err(BarrierError::Failure(_)) => "failure",
            Err(_) => "error",
        };
        metrics::counter!("barrier_calls_total", "op" => branch.op.as_str(), "outcome" => outcome)
            .increment(1);
        metrics::histogram!("barrier_call_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(BarrierOutcome::Applied) => tracing::debug!("branch applied"),
            Ok(BarrierOutcome::Skipped(reason)) => {
                tracing::info!(reason = reason.as_str(), "branch skipped")
            }
            Err(e) if e.is_failure() => tracing::info!(error = %e, "branch failed"),
            Err(e) => tracing::warn!(error = %e, "branch call error"),
        }

        result
    }

    async fn guarded<A>(&self, branch: &Branch, action: A) -> Result<BarrierOutcome>
    where
        A: BranchAction<S::Tx>,
    {
        let mut tx = self.store.begin().await?;

        let decision = match self.decide(&mut tx, branch).await {
            Ok(decision) => decision,
            Err(e) => {
                self.abort(tx).await;
                return Err(e);
            }
        };

        if let Some(reason) = decision {
            self.store.commit(tx).await?;
            return Ok(BarrierOutcome::Skipped(reason));
        }

        match action.run(&mut tx).await {
            Ok(()) => {
                self.store.commit(tx).await?;
                Ok(BarrierOutcome::Applied)
            }
            Err(e) => {
                self.abort(tx).await;
                Err(e)
            }
        }
    }

    /// Writes the barrier rows for `branch` and decides whether the business
    /// action may run. `Some(reason)` means skip.
    async fn decide(&self, tx: &mut S::Tx, branch: &Branch) -> Result<Option<SkipReason>> {
        // A compensation first claims its forward slot. Winning that slot
        // means the forward never committed and can no longer do so.
        let origin_inserted = match branch.op.origin() {
            Some(origin) => {
                let placeholder = BarrierRecord::new(&branch.with_op(origin), branch.op);
                self.store.insert_barrier(tx, &placeholder).await?
            }
            None => false,
        };

        let current_inserted = self
            .store
            .insert_barrier(tx, &BarrierRecord::new(branch, branch.op))
            .await?;

        if !current_inserted {
            let existing = self.store.fetch_barrier(tx, branch).await?;
            let preempted = branch.op == OperationType::Forward
                && existing.is_some_and(|record| record.is_placeholder());
            return Ok(Some(if preempted {
                SkipReason::Suspended
            } else {
                SkipReason::Duplicate
            }));
        }

        if origin_inserted {
            return Ok(Some(SkipReason::NullCompensation));
        }

        Ok(None)
    }

    async fn abort(&self, tx: S::Tx) {
        if let Err(e) = self.store.rollback(tx).await {
            tracing::warn!(error = %e, "rollback failed");
        }
    }
}

//! In-process orchestrator.
//!
//! Drives submitted sagas against participants registered in the same
//! process, following the [`SagaState`] contract. Nothing is persisted: a
//! process restart forgets every saga, so this is for tests and single-node
//! deployments, not a replacement for the orchestration service.
//!
//! Finished sagas are kept for [`LocalConfig::retention`] and then evicted,
//! and each saga keeps at most [`LocalConfig::max_calls`] call records.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use barrier::{BarrierError, BarrierOutcome};
use common::{Branch, Gid, OperationType};
use tokio::sync::{RwLock, watch};
use tracing::{debug, error, info, warn};

use crate::client::Orchestrator;
use crate::definition::SagaDefinition;
use crate::error::{Result, SagaError};
use crate::state::SagaState;

/// A participant endpoint reachable in-process.
///
/// `Ok` means the call reached a terminal outcome (applied or skipped by the
/// barrier). A failure error is terminal; any other error is retried.
#[async_trait]
pub trait BranchHandler: Send + Sync {
    async fn handle(
        &self,
        branch: &Branch,
        payload: &serde_json::Value,
    ) -> barrier::Result<BarrierOutcome>;
}

/// What one branch call attempt returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallResult {
    Succeeded(BarrierOutcome),
    Failed(String),
    Errored(String),
}

/// One entry in a saga's call log.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub branch: Branch,
    pub endpoint: String,
    pub result: CallResult,
}

/// Snapshot of a saga driven by [`LocalOrchestrator`].
#[derive(Debug, Clone)]
pub struct SagaStatus {
    pub gid: Gid,
    pub state: SagaState,
    /// Call attempts in the order they were made, retries included. Once
    /// the log is full the oldest retryable error is dropped first.
    pub calls: Vec<CallRecord>,
    /// Records dropped from `calls` to stay within the cap.
    pub dropped_calls: usize,
}

impl SagaStatus {
    /// Calls that returned a terminal outcome, in order.
    pub fn completed_calls(&self) -> impl Iterator<Item = &CallRecord> {
        self.calls
            .iter()
            .filter(|c| !matches!(c.result, CallResult::Errored(_)))
    }
}

#[derive(Debug, Clone)]
pub struct LocalConfig {
    /// Delay between attempts of a call that returned a retryable error.
    pub retry_interval: Duration,
    /// Forward attempts before giving up; `None` retries until `timeout_to_fail`.
    pub max_retries: Option<u32>,
    /// How long a finished saga stays queryable before it is evicted.
    pub retention: Duration,
    /// Call records kept per saga.
    pub max_calls: usize,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_millis(100),
            max_retries: None,
            retention: Duration::from_secs(600),
            max_calls: 256,
        }
    }
}

struct Entry {
    definition: SagaDefinition,
    status: SagaStatus,
    finished_at: Option<Instant>,
}

impl Entry {
    fn expired(&self, retention: Duration) -> bool {
        self.finished_at
            .is_some_and(|finished| finished.elapsed() >= retention)
    }

    fn record(&mut self, call: CallRecord, max_calls: usize) {
        let calls = &mut self.status.calls;
        if max_calls == 0 {
            self.status.dropped_calls += 1;
            return;
        }
        if calls.len() >= max_calls {
            let oldest = calls
                .iter()
                .position(|c| matches!(c.result, CallResult::Errored(_)))
                .unwrap_or(0);
            calls.remove(oldest);
            self.status.dropped_calls += 1;
        }
        calls.push(call);
    }
}

struct Inner {
    config: LocalConfig,
    handlers: RwLock<HashMap<String, Arc<dyn BranchHandler>>>,
    sagas: RwLock<HashMap<Gid, Entry>>,
    changes: watch::Sender<u64>,
}

/// Orchestrates sagas in-process.
#[derive(Clone)]
pub struct LocalOrchestrator {
    inner: Arc<Inner>,
}

impl Default for LocalOrchestrator {
    fn default() -> Self {
        Self::new(LocalConfig::default())
    }
}

impl LocalOrchestrator {
    pub fn new(config: LocalConfig) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                config,
                handlers: RwLock::new(HashMap::new()),
                sagas: RwLock::new(HashMap::new()),
                changes,
            }),
        }
    }

    /// Routes calls for `endpoint` to `handler`.
    pub async fn register(&self, endpoint: impl Into<String>, handler: Arc<dyn BranchHandler>) {
        let endpoint = endpoint.into();
        debug!(%endpoint, "branch handler registered");
        self.inner.handlers.write().await.insert(endpoint, handler);
    }

    pub async fn status(&self, gid: &Gid) -> Option<SagaStatus> {
        self.inner
            .sagas
            .read()
            .await
            .get(gid)
            .map(|entry| entry.status.clone())
    }

    pub async fn state(&self, gid: &Gid) -> Option<SagaState> {
        self.inner
            .sagas
            .read()
            .await
            .get(gid)
            .map(|entry| entry.status.state)
    }

    /// Evicts sagas that finished more than `retention` ago. Returns how many
    /// were removed.
    pub async fn purge_finished(&self) -> usize {
        let retention = self.inner.config.retention;
        let mut sagas = self.inner.sagas.write().await;
        let before = sagas.len();
        sagas.retain(|_, entry| !entry.expired(retention));
        let removed = before - sagas.len();
        if removed > 0 {
            debug!(removed, "finished sagas evicted");
        }
        removed
    }

    /// Waits until the saga reaches a terminal state.
    pub async fn wait_for(&self, gid: &Gid, timeout: Duration) -> Result<SagaStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut changes = self.inner.changes.subscribe();

        loop {
            match self.status(gid).await {
                Some(status) if status.state.is_terminal() => return Ok(status),
                Some(_) => {}
                None => return Err(SagaError::UnknownSaga(gid.clone())),
            }

            match tokio::time::timeout_at(deadline, changes.changed()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) | Err(_) => return Err(SagaError::WaitTimeout(gid.clone())),
            }
        }
    }
}

#[async_trait]
impl Orchestrator for LocalOrchestrator {
    async fn submit(&self, saga: &SagaDefinition) -> Result<()> {
        {
            let handlers = self.inner.handlers.read().await;
            let unknown = saga
                .steps
                .iter()
                .flat_map(|s| [&s.forward, &s.compensate])
                .find(|endpoint| !handlers.contains_key(endpoint.as_str()));
            if let Some(endpoint) = unknown {
                return Err(SagaError::Rejected {
                    gid: saga.gid.clone(),
                    reason: format!("no handler registered for {endpoint}"),
                });
            }
        }

        self.purge_finished().await;
        {
            let mut sagas = self.inner.sagas.write().await;
            if let Some(existing) = sagas.get(&saga.gid) {
                if existing.definition == *saga {
                    debug!(gid = %saga.gid, "duplicate submission accepted");
                    return Ok(());
                }
                return Err(SagaError::Rejected {
                    gid: saga.gid.clone(),
                    reason: "gid already used by a different saga".to_string(),
                });
            }
            sagas.insert(
                saga.gid.clone(),
                Entry {
                    definition: saga.clone(),
                    status: SagaStatus {
                        gid: saga.gid.clone(),
                        state: SagaState::Submitted,
                        calls: Vec::new(),
                        dropped_calls: 0,
                    },
                    finished_at: None,
                },
            );
        }
        self.inner.notify();

        info!(gid = %saga.gid, steps = saga.steps.len(), "saga accepted");
        tokio::spawn(Arc::clone(&self.inner).run(saga.clone()));
        Ok(())
    }
}

/// How a forward call ended.
enum Forward {
    Succeeded,
    Failed,
    Abandoned,
}

impl Inner {
    fn notify(&self) {
        self.changes.send_modify(|version| *version += 1);
    }

    async fn run(self: Arc<Self>, saga: SagaDefinition) {
        let started = Instant::now();

        match self.drive(&saga).await {
            Ok(SagaState::Succeeded) => {
                metrics::counter!("saga_completed").increment(1);
                info!(gid = %saga.gid, "saga succeeded");
            }
            Ok(state) => {
                metrics::counter!("saga_failed").increment(1);
                info!(gid = %saga.gid, %state, "saga compensated");
            }
            Err(e) => error!(gid = %saga.gid, error = %e, "saga driver stopped"),
        }

        metrics::histogram!("saga_duration_seconds").record(started.elapsed().as_secs_f64());
    }

    async fn drive(&self, saga: &SagaDefinition) -> Result<SagaState> {
        let mut state = self.transition(&saga.gid, SagaState::begin).await?;

        while let SagaState::Forwarding(index) = state {
            let step = &saga.steps[index];
            let branch = Branch::forward(saga.gid.clone(), saga.branch_id(index));

            state = match self.call_forward(saga, &branch, &step.forward, &step.payload).await {
                Forward::Succeeded => {
                    self.transition(&saga.gid, |s| s.step_succeeded(saga.steps.len()))
                        .await?
                }
                Forward::Failed => self.transition(&saga.gid, SagaState::step_failed).await?,
                Forward::Abandoned => {
                    let state = self.transition(&saga.gid, SagaState::step_failed).await?;
                    self.compensate_step(saga, index).await;
                    state
                }
            };
        }

        if let SagaState::Compensating(failed) = state {
            for index in (0..failed).rev() {
                self.compensate_step(saga, index).await;
            }
            state = self.transition(&saga.gid, SagaState::compensated).await?;
        }

        Ok(state)
    }

    async fn call_forward(
        &self,
        saga: &SagaDefinition,
        branch: &Branch,
        endpoint: &str,
        payload: &serde_json::Value,
    ) -> Forward {
        let started = Instant::now();
        let give_up_after = saga.options.timeout_to_fail.map(Duration::from_secs);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.call(branch, endpoint, payload).await {
                Ok(_) => return Forward::Succeeded,
                Err(e) if e.is_failure() => return Forward::Failed,
                Err(_) => {}
            }

            let out_of_attempts = self.config.max_retries.is_some_and(|max| attempts > max);
            let out_of_time = give_up_after.is_some_and(|limit| started.elapsed() >= limit);
            if out_of_attempts || out_of_time {
                warn!(%branch, attempts, "forward call abandoned");
                return Forward::Abandoned;
            }
            tokio::time::sleep(self.retry_interval(saga)).await;
        }
    }

    /// Compensations are retried until they succeed.
    async fn compensate_step(&self, saga: &SagaDefinition, index: usize) {
        let step = &saga.steps[index];
        let branch = Branch::compensate(saga.gid.clone(), saga.branch_id(index));

        while let Err(e) = self.call(&branch, &step.compensate, &step.payload).await {
            if e.is_failure() {
                error!(%branch, error = %e, "compensation reported failure, retrying");
            }
            tokio::time::sleep(self.retry_interval(saga)).await;
        }
    }

    async fn call(
        &self,
        branch: &Branch,
        endpoint: &str,
        payload: &serde_json::Value,
    ) -> barrier::Result<BarrierOutcome> {
        let handler = self.handlers.read().await.get(endpoint).cloned();
        let result = match handler {
            Some(handler) => handler.handle(branch, payload).await,
            None => Err(BarrierError::Storage(format!(
                "no handler registered for {endpoint}"
            ))),
        };

        let recorded = match &result {
            Ok(outcome) => CallResult::Succeeded(*outcome),
            Err(e) if e.is_failure() => CallResult::Failed(e.to_string()),
            Err(e) => CallResult::Errored(e.to_string()),
        };
        debug!(%branch, %endpoint, result = ?recorded, "branch called");

        if let Some(entry) = self.sagas.write().await.get_mut(&branch.gid) {
            let call = CallRecord {
                branch: branch.clone(),
                endpoint: endpoint.to_string(),
                result: recorded,
            };
            entry.record(call, self.config.max_calls);
        }
        self.notify();

        result
    }

    async fn transition<F>(&self, gid: &Gid, f: F) -> Result<SagaState>
    where
        F: FnOnce(SagaState) -> Result<SagaState>,
    {
        let mut sagas = self.sagas.write().await;
        let entry = sagas
            .get_mut(gid)
            .ok_or_else(|| SagaError::UnknownSaga(gid.clone()))?;

        let next = f(entry.status.state)?;
        debug!(%gid, from = %entry.status.state, to = %next, "saga transition");
        entry.status.state = next;
        if next.is_terminal() {
            entry.finished_at = Some(Instant::now());
        }
        drop(sagas);

        self.notify();
        Ok(next)
    }

    fn retry_interval(&self, saga: &SagaDefinition) -> Duration {
        saga.options
            .retry_interval
            .map(Duration::from_secs)
            .unwrap_or(self.config.retry_interval)
    }
}

impl CallRecord {
    pub fn op(&self) -> OperationType {
        self.branch.op
    }
}

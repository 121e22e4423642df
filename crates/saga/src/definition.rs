//! Saga definition builder.

use common::{BranchId, Gid};
use serde::{Deserialize, Serialize};

use crate::client::Orchestrator;
use crate::error::{Result, SagaError};
use crate::wire::{SubmitRequest, TRANS_TYPE, WireStep};

/// One forward/compensate pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Endpoint receiving the forward call.
    pub forward: String,
    /// Endpoint receiving the compensating call.
    pub compensate: String,
    /// Body sent to both endpoints.
    pub payload: serde_json::Value,
}

/// Options handed to the orchestrator with the saga.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransOptions {
    /// Seconds after which a forward call that keeps erroring counts as failed.
    pub timeout_to_fail: Option<u64>,
    /// Seconds between retries of a call that returned a retryable error.
    pub retry_interval: Option<u64>,
}

/// An immutable saga as handed to an orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaDefinition {
    pub gid: Gid,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub options: TransOptions,
}

impl SagaDefinition {
    /// Branch id shared by the forward and compensate call of step `index`.
    pub fn branch_id(&self, index: usize) -> BranchId {
        BranchId::for_step(index)
    }

    /// Converts to the submission body.
    pub fn to_request(&self) -> Result<SubmitRequest> {
        let payloads = self
            .steps
            .iter()
            .map(|step| serde_json::to_string(&step.payload))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(SubmitRequest {
            gid: self.gid.clone(),
            trans_type: TRANS_TYPE.to_string(),
            steps: self
                .steps
                .iter()
                .map(|step| WireStep {
                    action: step.forward.clone(),
                    compensate: step.compensate.clone(),
                })
                .collect(),
            payloads,
            timeout_to_fail: self.options.timeout_to_fail,
            retry_interval: self.options.retry_interval,
        })
    }
}

/// Builds a saga and submits it once.
///
/// ```ignore
/// let mut saga = Saga::new(gid)
///     .add_step(decr_stock, decr_stock_revert, &stock_req)?
///     .add_step(create_order, create_order_revert, &order_req)?;
/// saga.submit(&orchestrator).await?;
/// ```
///
/// Step order is the forward commit order; compensation runs in exact
/// reverse. A successful `submit` only means the orchestrator accepted the
/// saga: the business effects happen asynchronously afterwards.
#[derive(Debug, Clone)]
pub struct Saga {
    definition: SagaDefinition,
    submitted: bool,
}

impl Saga {
    /// Creates an empty saga bound to `gid`.
    pub fn new(gid: Gid) -> Self {
        Self {
            definition: SagaDefinition {
                gid,
                steps: Vec::new(),
                options: TransOptions::default(),
            },
            submitted: false,
        }
    }

    /// Appends a step.
    pub fn add_step<P: Serialize + ?Sized>(
        mut self,
        forward: impl Into<String>,
        compensate: impl Into<String>,
        payload: &P,
    ) -> Result<Self> {
        self.definition.steps.push(Step {
            forward: forward.into(),
            compensate: compensate.into(),
            payload: serde_json::to_value(payload)?,
        });
        Ok(self)
    }

    pub fn with_options(mut self, options: TransOptions) -> Self {
        self.definition.options = options;
        self
    }

    pub fn gid(&self) -> &Gid {
        &self.definition.gid
    }

    pub fn steps(&self) -> &[Step] {
        &self.definition.steps
    }

    pub fn definition(&self) -> &SagaDefinition {
        &self.definition
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    /// Sends the saga to `orchestrator`.
    ///
    /// Returns once the orchestrator has accepted or rejected it. Transport
    /// errors leave the saga unsubmitted, so the call may be retried with the
    /// same gid.
    #[tracing::instrument(skip_all, fields(gid = %self.definition.gid, steps = self.definition.steps.len()))]
    pub async fn submit<O>(&mut self, orchestrator: &O) -> Result<()>
    where
        O: Orchestrator + ?Sized,
    {
        if self.submitted {
            return Err(SagaError::AlreadySubmitted(self.definition.gid.clone()));
        }
        if self.definition.steps.is_empty() {
            return Err(SagaError::NoSteps(self.definition.gid.clone()));
        }

        let result = orchestrator.submit(&self.definition).await;
        let label = match &result {
            Ok(()) => "accepted",
            Err(SagaError::Rejected { .. }) => "rejected",
            Err(_) => "error",
        };
        metrics::counter!("saga_submissions_total", "result" => label).increment(1);

        match result {
            Ok(()) => {
                self.submitted = true;
                tracing::info!("saga submitted");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "saga submission failed");
                Err(e)
            }
        }
    }
}

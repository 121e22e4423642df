//! JSON shapes exchanged with the orchestration service.

use common::{BranchId, Gid, OperationType};
use serde::{Deserialize, Serialize};

/// Result string for success replies.
pub const RESULT_SUCCESS: &str = "SUCCESS";
/// Result string for terminal failures.
pub const RESULT_FAILURE: &str = "FAILURE";

/// Transaction type of every submission made by this crate.
pub const TRANS_TYPE: &str = "saga";

/// One step in a submission body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireStep {
    pub action: String,
    pub compensate: String,
}

/// Body of `POST {server}/submit`.
///
/// Payloads are JSON documents encoded as strings, one per step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub gid: Gid,
    pub trans_type: String,
    pub steps: Vec<WireStep>,
    pub payloads: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_to_fail: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_interval: Option<u64>,
}

/// Reply body used by the orchestrator and by participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultReply {
    pub dtm_result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ResultReply {
    pub fn success() -> Self {
        Self {
            dtm_result: RESULT_SUCCESS.to_string(),
            message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            dtm_result: RESULT_FAILURE.to_string(),
            message: Some(message.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.dtm_result == RESULT_FAILURE
    }
}

/// Reply of `GET {server}/newGid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGidReply {
    pub gid: Gid,
    #[serde(default)]
    pub dtm_result: Option<String>,
}

/// Query string the orchestrator attaches to every branch call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchQuery {
    pub gid: Gid,
    pub branch_id: BranchId,
    pub op: OperationType,
    #[serde(default = "default_trans_type")]
    pub trans_type: String,
}

fn default_trans_type() -> String {
    TRANS_TYPE.to_string()
}

impl BranchQuery {
    pub fn branch(&self) -> common::Branch {
        common::Branch::new(self.gid.clone(), self.branch_id.clone(), self.op)
    }
}

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Global transaction identifier shared by every branch of one saga.
///
/// Opaque to participants. Gids handed out by an orchestration service are
/// kept verbatim; locally generated gids are UUIDv4 strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gid(String);

impl Gid {
    /// Creates a new random gid.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps a gid issued elsewhere.
    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Gid {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Gid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Gid {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Gid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifies one step of a saga. Shared by the step's forward and
/// compensating calls so the barrier can correlate them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchId(String);

impl BranchId {
    /// Branch id for the step at `index` (0-based): `"01"`, `"02"`, ...
    pub fn for_step(index: usize) -> Self {
        Self(format!("{:02}", index + 1))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BranchId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for BranchId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Which half of a step a call belongs to.
///
/// Carried explicitly in every branch call; participants never infer it
/// from the endpoint that was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    #[serde(rename = "action")]
    Forward,
    #[serde(rename = "compensate")]
    Compensate,
}

impl OperationType {
    /// Wire name, also the value stored in the barrier table.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Forward => "action",
            OperationType::Compensate => "compensate",
        }
    }

    /// The operation a compensation undoes. `None` for forward calls.
    pub fn origin(&self) -> Option<OperationType> {
        match self {
            OperationType::Forward => None,
            OperationType::Compensate => Some(OperationType::Forward),
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown operation type: {0}")]
pub struct ParseOperationError(pub String);

impl FromStr for OperationType {
    type Err = ParseOperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "action" | "forward" => Ok(OperationType::Forward),
            "compensate" => Ok(OperationType::Compensate),
            other => Err(ParseOperationError(other.to_string())),
        }
    }
}

/// One call attempt against one participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Branch {
    pub gid: Gid,
    pub branch_id: BranchId,
    pub op: OperationType,
}

impl Branch {
    pub fn new(gid: Gid, branch_id: BranchId, op: OperationType) -> Self {
        Self { gid, branch_id, op }
    }

    pub fn forward(gid: Gid, branch_id: BranchId) -> Self {
        Self::new(gid, branch_id, OperationType::Forward)
    }

    pub fn compensate(gid: Gid, branch_id: BranchId) -> Self {
        Self::new(gid, branch_id, OperationType::Compensate)
    }

    /// The same branch with a different operation type.
    pub fn with_op(&self, op: OperationType) -> Self {
        Self::new(self.gid.clone(), self.branch_id.clone(), op)
    }
}

impl std::fmt::Display for Branch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.gid, self.branch_id, self.op)
    }
}

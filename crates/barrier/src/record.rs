use chrono::{DateTime, Utc};
use common::{Branch, BranchId, Gid, OperationType};
use serde::{Deserialize, Serialize};

/// Transaction type stored with every barrier row written by this crate.
pub const TRANS_TYPE_SAGA: &str = "saga";

/// Proof that one operation of one branch has been applied.
///
/// `reason` is the operation of the call that wrote the row. A forward row
/// whose reason is [`OperationType::Compensate`] is the placeholder left by
/// a compensation that arrived before its forward call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarrierRecord {
    pub trans_type: String,
    pub gid: Gid,
    pub branch_id: BranchId,
    pub op: OperationType,
    pub reason: OperationType,
    pub created_at: DateTime<Utc>,
}

impl BarrierRecord {
    /// Record for `branch`, written on behalf of a call of type `reason`.
    pub fn new(branch: &Branch, reason: OperationType) -> Self {
        Self {
            trans_type: TRANS_TYPE_SAGA.to_string(),
            gid: branch.gid.clone(),
            branch_id: branch.branch_id.clone(),
            op: branch.op,
            reason,
            created_at: Utc::now(),
        }
    }

    /// The branch this record belongs to.
    pub fn branch(&self) -> Branch {
        Branch::new(self.gid.clone(), self.branch_id.clone(), self.op)
    }

    /// True for a forward row inserted by an early compensation.
    pub fn is_placeholder(&self) -> bool {
        self.op != self.reason
    }
}

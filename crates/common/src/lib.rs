//! Identifiers shared by the saga coordinator and every participant.

pub mod types;

pub use types::{Branch, BranchId, Gid, OperationType, ParseOperationError};

//! Saga coordinator client.
//!
//! A caller builds a [`Saga`] from ordered forward/compensate step pairs and
//! submits it once to an [`Orchestrator`]. The orchestrator calls forwards in
//! order; if one fails, the steps that already succeeded are compensated in
//! reverse order.
//!
//! Two orchestrators are provided: [`HttpOrchestrator`] hands the saga to a
//! remote orchestration service, [`LocalOrchestrator`] drives it in-process
//! against registered [`BranchHandler`]s.

pub mod client;
pub mod definition;
pub mod error;
pub mod local;
pub mod state;
pub mod wire;

pub use client::{HttpOrchestrator, Orchestrator};
pub use definition::{Saga, SagaDefinition, Step, TransOptions};
pub use error::{Result, SagaError};
pub use local::{BranchHandler, CallRecord, CallResult, LocalConfig, LocalOrchestrator, SagaStatus};
pub use state::SagaState;
pub use wire::{BranchQuery, NewGidReply, ResultReply, SubmitRequest, WireStep};

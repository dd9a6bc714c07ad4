//! Per-user reconciliation and the run that drives it.

pub mod coordinator;
pub mod diff;
pub mod publish;
pub mod reconciler;
pub mod verify;

pub use coordinator::{Coordinator, RunReport, SourceOutcome, SourceReport};
pub use publish::PublishAction;
pub use reconciler::Reconciler;

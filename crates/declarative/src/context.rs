//! Run observer traits
//!
//! These traits allow the declarative crate to report progress without
//! depending on a specific terminal UI.

use crate::types::{OperationRecord, RunSummary};

/// Progress callback for engine runs
///
/// Implement this trait to receive progress updates during a run.
pub trait ProgressCallback: Send {
    /// Called after a resource instruction has executed
    fn on_operation(&mut self, record: &OperationRecord);

    /// Called when a completion check is not satisfied yet
    fn on_poll(&mut self, _record: &OperationRecord) {}

    /// Called once when `run` returns
    fn on_finish(&mut self, summary: &RunSummary);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_operation(&mut self, _record: &OperationRecord) {}
    fn on_finish(&mut self, _summary: &RunSummary) {}
}

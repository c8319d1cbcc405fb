use serde::{Deserialize, Serialize};

/// Batch identifier. Issued monotonically from 0 in submission order, per engine.
pub type BatchId = u64;

/// Lifecycle of a submitted batch.
///
/// `Pending -> Ready -> Running -> Done | Failed`, with `Pending -> Failed`
/// when a dependency fails. A batch never returns to `Pending` once it left it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchState {
    /// Waiting on at least one dependency that is not yet Done.
    Pending,
    /// Units are in the ready queue; none dequeued yet.
    Ready,
    /// At least one unit has been handed to a worker.
    Running,
    /// Every unit completed successfully.
    Done,
    /// A unit failed, or a dependency failed.
    Failed,
}

impl BatchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchState::Done | BatchState::Failed)
    }
}

/// Point-in-time view of a batch, as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchStatus {
    pub id: BatchId,
    pub state: BatchState,
    /// Units that finished successfully so far.
    pub completed: usize,
    pub total: usize,
    /// Dependencies still outstanding (only non-zero while Pending).
    pub waiting_on: usize,
    pub failure: Option<String>,
}

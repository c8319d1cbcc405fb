use std::sync::{Arc, PoisonError};

use batchflow_core::{BatchId, BatchState, BatchStatus, EngineError};
use tracing::debug;

use crate::scheduler::resolver::Resolution;
use crate::scheduler::task::Runnable;

use super::core::{Shared, TaskSystem};

impl Shared {
    fn submit(
        &self,
        work: Arc<dyn Runnable>,
        total: usize,
        deps: &[BatchId],
    ) -> Result<BatchId, EngineError> {
        let id = self.apply(|state| match state.register(work, total, deps) {
            Ok((id, resolution)) => {
                if let Ok(mut m) = self.metrics.write() {
                    m.batches_submitted += 1;
                }
                (Ok(id), resolution)
            }
            Err(e) => (Err(e), Resolution::default()),
        })?;
        debug!(batch = id, units = total, deps = ?deps, "batch submitted");
        Ok(id)
    }
}

impl TaskSystem {
    /// Submit a dependency-free batch of `total` units and block until it
    /// settles. `total == 0` returns immediately.
    ///
    /// Must not be called from inside a unit when every worker may be busy
    /// running units of the same engine; use [`SubmitHandle`] there instead.
    pub fn run_sync<R>(&self, work: R, total: usize) -> Result<(), EngineError>
    where
        R: Runnable + 'static,
    {
        let id = self.submit_async(work, total, &[])?;
        self.wait(id)
    }

    /// Register a batch that may start once every batch in `deps` is Done.
    ///
    /// Ids that were never issued by this engine are treated as satisfied.
    /// If a dependency has Failed, the new batch fails without running.
    /// Listing the batch's own id is rejected with
    /// [`EngineError::SelfDependency`].
    pub fn submit_async<R>(
        &self,
        work: R,
        total: usize,
        deps: &[BatchId],
    ) -> Result<BatchId, EngineError>
    where
        R: Runnable + 'static,
    {
        self.shared.submit(Arc::new(work), total, deps)
    }

    /// Block until every batch submitted before this call has settled.
    ///
    /// Returns the first not yet reported failure among those batches, or
    /// [`EngineError::Cancelled`] if the engine shuts down before they settle.
    /// Failures of batches submitted later are left for a later barrier.
    pub fn barrier(&self) -> Result<(), EngineError> {
        let mut state = self.shared.lock();
        let target = state.next_id;
        state = self
            .shared
            .settled
            .wait_while(state, |s| !s.shutdown && !s.settled_before(target))
            .unwrap_or_else(PoisonError::into_inner);

        if !state.settled_before(target) {
            return Err(EngineError::Cancelled);
        }
        match state.take_failure_before(target) {
            Some((batch, reason)) => Err(EngineError::BatchFailed { batch, reason }),
            None => Ok(()),
        }
    }

    /// Block until batch `id` settles.
    pub fn wait(&self, id: BatchId) -> Result<(), EngineError> {
        let mut state = self.shared.lock();
        if id >= state.next_id {
            return Err(EngineError::UnknownBatch(id));
        }
        state = self
            .shared
            .settled
            .wait_while(state, |s| !s.shutdown && !s.is_settled(id))
            .unwrap_or_else(PoisonError::into_inner);

        match state.batches.get(&id) {
            Some(entry) if entry.state == BatchState::Done => Ok(()),
            Some(entry) if entry.state == BatchState::Failed => Err(EngineError::BatchFailed {
                batch: id,
                reason: entry.failure.clone().unwrap_or_default(),
            }),
            _ => Err(EngineError::Cancelled),
        }
    }

    /// A cloneable handle for submitting batches from inside running units.
    pub fn handle(&self) -> SubmitHandle {
        SubmitHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Submission-only view of an engine, safe to capture in callbacks.
///
/// It cannot block on batches, so a unit holding one cannot deadlock the
/// pool waiting for work that needs its own worker. Once the engine shuts
/// down, submissions return [`EngineError::ShutDown`].
#[derive(Clone)]
pub struct SubmitHandle {
    shared: Arc<Shared>,
}

impl SubmitHandle {
    /// Same contract as [`TaskSystem::submit_async`].
    pub fn submit_async<R>(
        &self,
        work: R,
        total: usize,
        deps: &[BatchId],
    ) -> Result<BatchId, EngineError>
    where
        R: Runnable + 'static,
    {
        self.shared.submit(Arc::new(work), total, deps)
    }

    pub fn status(&self, id: BatchId) -> Option<BatchStatus> {
        self.shared.lock().status(id)
    }
}

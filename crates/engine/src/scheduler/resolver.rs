//! Dependency resolution: promotion of satisfied batches and settlement
//! (Done / Failed) cascading through dependents.
//!
//! Every method here runs with the engine lock held, which makes the
//! "dependency set became empty -> expand into the ready queue" step atomic.
//! A batch is expanded at most once because only a Pending batch can be
//! promoted and promotion moves it out of Pending.

use batchflow_core::{BatchId, BatchState};
use tracing::debug;

use super::registry::{SchedulerState, Unit};

/// What a resolution step changed, so the caller knows whom to wake.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Resolution {
    /// Batches whose units were pushed onto the ready queue.
    pub promoted: Vec<BatchId>,
    pub done: Vec<BatchId>,
    pub failed: Vec<BatchId>,
}

impl Resolution {
    pub(crate) fn settled_any(&self) -> bool {
        !self.done.is_empty() || !self.failed.is_empty()
    }
}

impl SchedulerState {
    /// Handle a batch whose dependency set is (now) empty.
    ///
    /// Zero-unit batches have nothing to run and settle as Done right away.
    pub(crate) fn resolve_satisfied(&mut self, id: BatchId) -> Resolution {
        match self.batches.get(&id).map(|entry| entry.total) {
            Some(0) => self.complete_batch(id),
            Some(_) => {
                self.make_ready(id);
                Resolution {
                    promoted: vec![id],
                    ..Resolution::default()
                }
            }
            None => Resolution::default(),
        }
    }

    /// Pending -> Ready, enqueueing every unit of the batch in one step.
    fn make_ready(&mut self, id: BatchId) {
        let Some(entry) = self.batches.get_mut(&id) else {
            return;
        };
        assert_eq!(
            entry.state,
            BatchState::Pending,
            "batch {id} expanded twice"
        );
        entry.state = BatchState::Ready;
        let total = entry.total;
        self.ready
            .extend((0..total).map(|index| Unit { batch: id, index }));
        debug!(batch = id, units = total, "batch ready");
    }

    /// Mark `id` Done and release its dependents.
    ///
    /// Dependents whose last outstanding dependency was `id` are promoted;
    /// zero-unit dependents settle in turn, so this walks a worklist rather
    /// than recursing.
    pub(crate) fn complete_batch(&mut self, id: BatchId) -> Resolution {
        let mut resolution = Resolution::default();
        let mut finished = vec![id];

        while let Some(done) = finished.pop() {
            let dependents = match self.batches.get_mut(&done) {
                Some(entry) if !entry.state.is_terminal() => {
                    entry.state = BatchState::Done;
                    entry.retire()
                }
                _ => continue,
            };
            self.outstanding.remove(&done);
            resolution.done.push(done);
            debug!(batch = done, dependents = dependents.len(), "batch done");

            for dependent in dependents {
                let now_free = match self.batches.get_mut(&dependent) {
                    Some(entry) if entry.state == BatchState::Pending => {
                        entry.deps.remove(&done);
                        entry.deps.is_empty()
                    }
                    _ => false,
                };
                if !now_free {
                    continue;
                }
                if self.batches[&dependent].total == 0 {
                    finished.push(dependent);
                } else {
                    self.make_ready(dependent);
                    resolution.promoted.push(dependent);
                }
            }
        }

        resolution
    }

    /// Mark `id` Failed, drop its queued units and fail every Pending
    /// dependent, transitively. Already-settled batches are left untouched.
    pub(crate) fn fail_batch(&mut self, id: BatchId, reason: String) -> Resolution {
        let mut resolution = Resolution::default();
        let mut failing = vec![(id, reason)];

        while let Some((batch, reason)) = failing.pop() {
            let (was_queued, dependents) = match self.batches.get_mut(&batch) {
                Some(entry) if !entry.state.is_terminal() => {
                    let was_queued =
                        matches!(entry.state, BatchState::Ready | BatchState::Running);
                    entry.state = BatchState::Failed;
                    entry.failure = Some(reason.clone());
                    (was_queued, entry.retire())
                }
                _ => continue,
            };
            if was_queued {
                self.ready.retain(|unit| unit.batch != batch);
            }
            self.outstanding.remove(&batch);
            debug!(batch, %reason, "batch failed");
            self.failures.push((batch, reason));
            resolution.failed.push(batch);

            for dependent in dependents {
                if self.state_of(dependent) == Some(BatchState::Pending) {
                    failing.push((dependent, format!("dependency {batch} failed")));
                }
            }
        }

        resolution
    }

    /// Settle a batch whose units all returned `Ok`, unless it already
    /// settled (a sibling unit failed first).
    pub(crate) fn finish_if_running(&mut self, id: BatchId) -> Resolution {
        if self.state_of(id) == Some(BatchState::Running) {
            self.complete_batch(id)
        } else {
            Resolution::default()
        }
    }
}

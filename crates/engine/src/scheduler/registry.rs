//! Batch registry and ready queue.
//!
//! Everything in [`SchedulerState`] is guarded by the single engine mutex:
//! batch states, dependency sets, dependents lists and the ready queue. The
//! only field touched outside that lock is the per-batch `completed` counter,
//! which workers bump atomically after running a unit.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use batchflow_core::{BatchId, BatchState, BatchStatus, EngineError};

use super::resolver::Resolution;
use super::task::Runnable;

/// The executable half of a batch, shared with workers while it runs.
pub(crate) struct BatchWork {
    pub id: BatchId,
    pub total: usize,
    pub work: Arc<dyn Runnable>,
    /// Units that returned `Ok`. Only ever incremented.
    pub completed: Arc<AtomicUsize>,
}

pub(crate) struct BatchEntry {
    pub state: BatchState,
    pub total: usize,
    /// Dropped once the batch settles, releasing the callback.
    pub work: Option<Arc<BatchWork>>,
    /// Dependencies not yet Done. Only non-empty while Pending.
    pub deps: HashSet<BatchId>,
    /// Batches that listed this one as a dependency while it was unsettled.
    pub dependents: Vec<BatchId>,
    pub failure: Option<String>,
    /// Shared with [`BatchWork::completed`]; outlives the callback.
    pub completed: Arc<AtomicUsize>,
}

impl BatchEntry {
    fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    /// Shrink to the compact record kept for late lookups, releasing the
    /// callback. Units already handed to workers keep their own reference.
    pub(crate) fn retire(&mut self) -> Vec<BatchId> {
        self.work = None;
        self.deps = HashSet::new();
        std::mem::take(&mut self.dependents)
    }
}

/// A ready-queue entry: one unit of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Unit {
    pub batch: BatchId,
    pub index: usize,
}

#[derive(Default)]
pub(crate) struct SchedulerState {
    pub batches: HashMap<BatchId, BatchEntry>,
    pub ready: VecDeque<Unit>,
    /// Ids of batches not yet Done or Failed, ordered for range queries.
    pub outstanding: BTreeSet<BatchId>,
    pub next_id: BatchId,
    pub shutdown: bool,
    /// Failures not yet reported to a `barrier()` caller, in the order
    /// they were observed.
    pub failures: Vec<(BatchId, String)>,
}

impl SchedulerState {
    /// Register a new batch and resolve it against the current registry.
    ///
    /// Dependencies that were never issued, or that are already Done, count as
    /// satisfied. A dependency that already Failed fails the new batch at once.
    pub(crate) fn register(
        &mut self,
        work: Arc<dyn Runnable>,
        total: usize,
        deps: &[BatchId],
    ) -> Result<(BatchId, Resolution), EngineError> {
        if self.shutdown {
            return Err(EngineError::ShutDown);
        }
        let id = self.next_id;
        if deps.contains(&id) {
            return Err(EngineError::SelfDependency(id));
        }
        self.next_id += 1;

        let mut waiting = HashSet::new();
        let mut failed_dep = None;
        for &dep in deps {
            match self.batches.get(&dep).map(|entry| entry.state) {
                None | Some(BatchState::Done) => {}
                Some(BatchState::Failed) => {
                    failed_dep.get_or_insert(dep);
                }
                Some(_) => {
                    waiting.insert(dep);
                }
            }
        }

        let completed = Arc::new(AtomicUsize::new(0));
        let batch_work = Arc::new(BatchWork {
            id,
            total,
            work,
            completed: Arc::clone(&completed),
        });
        self.batches.insert(
            id,
            BatchEntry {
                state: BatchState::Pending,
                total,
                work: Some(batch_work),
                deps: HashSet::new(),
                dependents: Vec::new(),
                failure: None,
                completed,
            },
        );
        self.outstanding.insert(id);

        if let Some(dep) = failed_dep {
            return Ok((id, self.fail_batch(id, format!("dependency {dep} failed"))));
        }
        if waiting.is_empty() {
            return Ok((id, self.resolve_satisfied(id)));
        }

        for &dep in &waiting {
            if let Some(entry) = self.batches.get_mut(&dep) {
                entry.dependents.push(id);
            }
        }
        if let Some(entry) = self.batches.get_mut(&id) {
            entry.deps = waiting;
        }
        Ok((id, Resolution::default()))
    }

    /// Pop the next unit and the work it belongs to, marking its batch Running.
    pub(crate) fn next_unit(&mut self) -> Option<(Unit, Arc<BatchWork>)> {
        let unit = self.ready.pop_front()?;
        let entry = self
            .batches
            .get_mut(&unit.batch)
            .unwrap_or_else(|| panic!("dequeued {unit:?} of an unregistered batch"));
        let work = match &entry.work {
            Some(work) => Arc::clone(work),
            None => panic!("dequeued {unit:?} of settled batch ({:?})", entry.state),
        };
        if entry.state == BatchState::Ready {
            entry.state = BatchState::Running;
        }
        Some((unit, work))
    }

    pub(crate) fn state_of(&self, id: BatchId) -> Option<BatchState> {
        self.batches.get(&id).map(|entry| entry.state)
    }

    /// Unknown ids count as settled.
    pub(crate) fn is_settled(&self, id: BatchId) -> bool {
        self.state_of(id).map_or(true, BatchState::is_terminal)
    }

    /// True once every batch with an id below `target` is Done or Failed.
    pub(crate) fn settled_before(&self, target: BatchId) -> bool {
        self.outstanding.range(..target).next().is_none()
    }

    /// First unreported failure among batches below `target`. Every failure
    /// below `target` is consumed; later ones stay for a later barrier.
    pub(crate) fn take_failure_before(&mut self, target: BatchId) -> Option<(BatchId, String)> {
        let mut first = None;
        self.failures.retain(|(batch, reason)| {
            if *batch >= target {
                return true;
            }
            if first.is_none() {
                first = Some((*batch, reason.clone()));
            }
            false
        });
        first
    }

    /// Enter shutdown: drop the ready queue and retire every unsettled batch,
    /// so nothing can be promoted later and abandoned callbacks are released.
    /// Unsettled batches keep their state. Returns the number of queued units
    /// dropped.
    pub(crate) fn abandon_unsettled(&mut self) -> usize {
        self.shutdown = true;
        let dropped = self.ready.len();
        self.ready.clear();
        for id in &self.outstanding {
            if let Some(entry) = self.batches.get_mut(id) {
                entry.retire();
            }
        }
        dropped
    }

    pub(crate) fn status(&self, id: BatchId) -> Option<BatchStatus> {
        self.batches.get(&id).map(|entry| BatchStatus {
            id,
            state: entry.state,
            completed: entry.completed(),
            total: entry.total,
            waiting_on: entry.deps.len(),
            failure: entry.failure.clone(),
        })
    }
}

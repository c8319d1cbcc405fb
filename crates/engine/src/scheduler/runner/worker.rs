use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::{Arc, PoisonError};
use std::time::Instant;

use tracing::{debug, warn};

use crate::scheduler::registry::{BatchWork, Unit};
use crate::scheduler::task::WorkError;

use super::core::Shared;

/// Body of every worker thread.
///
/// Blocks on `work_available` while the ready queue is empty, takes exactly
/// one unit under the lock, and runs it with the lock released. Exits once it
/// sees shutdown with nothing left to take.
pub(super) fn worker_loop(shared: Arc<Shared>, name: String) {
    debug!(worker = %name, "worker started");
    loop {
        let (unit, work) = {
            let mut state = shared.lock();
            loop {
                if let Some(next) = state.next_unit() {
                    break next;
                }
                if state.shutdown {
                    debug!(worker = %name, "worker exiting");
                    return;
                }
                state = shared
                    .work_available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };
        execute_unit(&shared, unit, &work);
    }
}

/// Run one unit's callback and account for its outcome.
fn execute_unit(shared: &Shared, unit: Unit, work: &BatchWork) {
    shared.active_workers.fetch_add(1, Ordering::Relaxed);
    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        work.work.execute(unit.index, work.total)
    }))
    .unwrap_or_else(|payload| Err(WorkError::from_panic(payload)));
    let elapsed = started.elapsed();
    shared.active_workers.fetch_sub(1, Ordering::Relaxed);

    match outcome {
        Ok(()) => {
            if let Ok(mut m) = shared.metrics.write() {
                m.record_unit(elapsed);
            }
            let completed = work.completed.fetch_add(1, Ordering::AcqRel) + 1;
            assert!(
                completed <= work.total,
                "batch {} completed {} of {} units",
                work.id,
                completed,
                work.total
            );
            // Only the worker that observes the last increment settles the batch.
            if completed == work.total {
                shared.apply(|state| ((), state.finish_if_running(work.id)));
            }
        }
        Err(e) => {
            warn!(batch = work.id, unit = unit.index, error = %e, "unit failed");
            if let Ok(mut m) = shared.metrics.write() {
                m.record_unit_failure();
            }
            shared.apply(|state| ((), state.fail_batch(work.id, e.to_string())));
        }
    }
}

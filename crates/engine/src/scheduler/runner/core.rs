use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use batchflow_core::{BatchId, BatchStatus, EngineConfig, EngineError};
use tracing::{error, info, warn};

use crate::scheduler::metrics::EngineMetrics;
use crate::scheduler::registry::SchedulerState;
use crate::scheduler::resolver::Resolution;

use super::worker::worker_loop;

/// State shared between the engine handle, its workers and submit handles.
pub(crate) struct Shared {
    /// Registry, dependency sets and ready queue. The one engine lock.
    state: Mutex<SchedulerState>,
    /// Signalled when units are enqueued or shutdown begins.
    pub(super) work_available: Condvar,
    /// Signalled when batches reach Done/Failed or shutdown begins.
    pub(super) settled: Condvar,
    pub(super) metrics: RwLock<EngineMetrics>,
    pub(super) active_workers: AtomicUsize,
    pub(super) num_workers: usize,
}

impl Shared {
    pub(super) fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one resolution step under the engine lock, then wake whoever it
    /// concerns.
    ///
    /// Settlement counters are recorded before the lock is released so a
    /// waiter that observes the settled state also observes the metrics.
    /// Notifications go out after the lock is released; waiters re-check
    /// their predicate under the lock, so none is lost in between.
    pub(super) fn apply<T>(
        &self,
        step: impl FnOnce(&mut SchedulerState) -> (T, Resolution),
    ) -> T {
        let (value, resolution) = {
            let mut state = self.lock();
            let (value, resolution) = step(&mut state);
            if resolution.settled_any() {
                if let Ok(mut m) = self.metrics.write() {
                    m.record_settled(resolution.done.len(), resolution.failed.len());
                }
            }
            (value, resolution)
        };
        if !resolution.promoted.is_empty() {
            self.work_available.notify_all();
        }
        if resolution.settled_any() {
            self.settled.notify_all();
        }
        value
    }
}

/// A bulk-task engine: a fixed pool of blocking worker threads executing
/// batches of homogeneous units, with batch-level dependencies.
///
/// Engines are independent of each other; any number may coexist.
/// Dropping the engine shuts it down and joins its workers.
pub struct TaskSystem {
    pub(super) config: EngineConfig,
    pub(super) shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskSystem {
    /// Create an engine with `workers` threads and default naming.
    pub fn new(workers: usize) -> Result<Self, EngineError> {
        Self::with_config(EngineConfig::with_workers(workers))
    }

    /// Create an engine from a validated config and start its workers.
    pub fn with_config(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let shared = Arc::new(Shared {
            state: Mutex::new(SchedulerState::default()),
            work_available: Condvar::new(),
            settled: Condvar::new(),
            metrics: RwLock::new(EngineMetrics::default()),
            active_workers: AtomicUsize::new(0),
            num_workers: config.worker_threads,
        });

        let mut handles = Vec::with_capacity(config.worker_threads);
        for n in 0..config.worker_threads {
            let name = format!("{}-{}", config.thread_name_prefix, n);
            let worker_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(worker_shared, name));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    let system = Self {
                        config,
                        shared,
                        workers: Mutex::new(handles),
                    };
                    system.shutdown();
                    return Err(EngineError::Spawn(e.to_string()));
                }
            }
        }

        info!(workers = config.worker_threads, "task engine started");
        Ok(Self {
            config,
            shared,
            workers: Mutex::new(handles),
        })
    }

    /// Implementation label, for reports.
    pub fn name(&self) -> &'static str {
        "parallel thread pool (blocking)"
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.config.worker_threads
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// State and progress of a batch, or `None` for an id never issued.
    pub fn status(&self, id: BatchId) -> Option<BatchStatus> {
        self.shared.lock().status(id)
    }

    /// Get a snapshot of the current engine metrics.
    pub fn metrics(&self) -> EngineMetrics {
        let mut snapshot = self
            .shared
            .metrics
            .read()
            .map(|m| m.clone())
            .unwrap_or_default();
        let active = self.shared.active_workers.load(Ordering::Relaxed);
        snapshot.active_workers = active;
        snapshot.worker_utilization = active as f64 / self.shared.num_workers as f64;
        snapshot
    }

    /// Stop the engine: abandon every batch not yet settled, wake all workers
    /// and waiters, and join the workers. Units already executing finish
    /// first, but nothing they finish can promote another batch.
    ///
    /// Pending waits return [`EngineError::Cancelled`]; later submissions
    /// return [`EngineError::ShutDown`]. Calling this again is a no-op.
    pub fn shutdown(&self) {
        let abandoned = {
            let mut state = self.shared.lock();
            if !state.shutdown {
                info!("task engine shutdown requested");
            }
            state.abandon_unsettled()
        };
        if abandoned > 0 {
            warn!(units = abandoned, "abandoning queued units at shutdown");
        }
        self.shared.work_available.notify_all();
        self.shared.settled.notify_all();

        let handles = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if handles.is_empty() {
            return;
        }
        let current = thread::current().id();
        for handle in handles {
            // Shutdown from inside a unit: that worker exits on its own.
            if handle.thread().id() == current {
                continue;
            }
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                error!(worker = %name, "worker thread panicked");
            }
        }
        info!("task engine stopped");
    }
}

impl Drop for TaskSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

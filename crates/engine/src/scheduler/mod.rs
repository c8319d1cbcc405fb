//! Bulk-task scheduler with batch-level dependencies.
//!
//! A batch is `total` invocations of one [`Runnable`], indexed `0..total`.
//! Batches may depend on earlier batches; a dependent's first unit is not
//! dispatched until every dependency is Done. Workers block on a condition
//! variable while the ready queue is empty and never hold the engine lock
//! while user code runs.

mod registry;
mod resolver;

pub mod metrics;
pub mod runner;
pub mod task;

pub use metrics::EngineMetrics;
pub use runner::{SubmitHandle, TaskSystem};
pub use task::{Runnable, WorkError, from_fn};

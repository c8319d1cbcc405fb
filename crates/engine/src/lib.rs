pub mod scheduler;

pub use batchflow_core::{BatchId, BatchState, BatchStatus, EngineConfig, EngineError};
pub use scheduler::{EngineMetrics, Runnable, SubmitHandle, TaskSystem, WorkError, from_fn};

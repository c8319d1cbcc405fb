//! Task engine runner -- worker pool, submission and barriers.
//!
//! Split into focused submodules:
//! - `core`: TaskSystem struct, construction, shutdown and accessors
//! - `submission`: run_sync / submit_async / barrier / wait and SubmitHandle
//! - `worker`: the blocking worker loop and per-unit accounting

mod core;
mod submission;
mod worker;

pub use self::core::TaskSystem;
pub use self::submission::SubmitHandle;

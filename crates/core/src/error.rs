use thiserror::Error;

use crate::batch::BatchId;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),

    #[error("batch {0} cannot depend on itself")]
    SelfDependency(BatchId),

    #[error("batch {0} was never issued by this engine")]
    UnknownBatch(BatchId),

    #[error("batch {batch} failed: {reason}")]
    BatchFailed { batch: BatchId, reason: String },

    #[error("wait cancelled: engine shut down")]
    Cancelled,

    #[error("engine is shut down")]
    ShutDown,
}

impl EngineError {
    /// True for the outcome a waiter sees when the engine tears down under it.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

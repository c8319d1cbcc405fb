use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_usize(key: &str, default: usize) -> usize {
    env_opt(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Task engine configuration, parsed from TOML or the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of worker threads. Must be at least 1.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Worker threads are named `{prefix}-{n}`.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
}

fn default_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_thread_name_prefix() -> String {
    "batchflow-worker".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            thread_name_prefix: default_thread_name_prefix(),
        }
    }
}

impl EngineConfig {
    /// Config with an explicit worker count and default naming.
    pub fn with_workers(worker_threads: usize) -> Self {
        Self {
            worker_threads,
            ..Self::default()
        }
    }

    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, EngineError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Build config from `BATCHFLOW_WORKERS` / `BATCHFLOW_THREAD_PREFIX`
    /// (call `load_dotenv()` first). Unset or unparsable values fall back to defaults.
    pub fn from_env() -> Result<Self, EngineError> {
        let config = Self {
            worker_threads: env_usize("BATCHFLOW_WORKERS", default_worker_threads()),
            thread_name_prefix: env_opt("BATCHFLOW_THREAD_PREFIX")
                .unwrap_or_else(default_thread_name_prefix),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.worker_threads == 0 {
            return Err(EngineError::Config(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err(EngineError::Config(
                "thread_name_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Engine config:");
        tracing::info!("  workers:     {}", self.worker_threads);
        tracing::info!("  thread name: {}-N", self.thread_name_prefix);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.worker_threads > 0);
        assert_eq!(config.thread_name_prefix, "batchflow-worker");
        config.validate().unwrap();
    }

    #[test]
    fn zero_workers_rejected() {
        let err = EngineConfig::with_workers(0).validate().unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn parse_toml_with_defaults() {
        let cfg = EngineConfig::from_toml("worker_threads = 6\n").unwrap();
        assert_eq!(cfg.worker_threads, 6);
        assert_eq!(cfg.thread_name_prefix, "batchflow-worker");
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
worker_threads = 2
thread_name_prefix = "render"
"#;
        let cfg = EngineConfig::from_toml(toml).unwrap();
        assert_eq!(cfg, EngineConfig {
            worker_threads: 2,
            thread_name_prefix: "render".into(),
        });
    }

    #[test]
    fn toml_with_zero_workers_fails_validation() {
        let err = EngineConfig::from_toml("worker_threads = 0").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = EngineConfig::from_toml("worker_threads = \"many\"").unwrap_err();
        assert!(matches!(err, EngineError::ConfigParse(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = EngineConfig::from_file("/nonexistent/batchflow.toml").unwrap_err();
        assert!(matches!(err, EngineError::ConfigIo(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "worker_threads = 3\nthread_name_prefix = \"io\"\n").unwrap();

        let cfg = EngineConfig::from_file(&path).unwrap();
        assert_eq!(cfg.worker_threads, 3);
        assert_eq!(cfg.thread_name_prefix, "io");
    }
}

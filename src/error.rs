//! Error types for the scheduler and memory core

use std::path::PathBuf;

use thiserror::Error;

use crate::registry::ScriptId;

/// Result type alias for kernel operations
pub type Result<T> = std::result::Result<T, KernelError>;

/// Failures reported by script loading and scheduling
#[derive(Error, Debug)]
pub enum KernelError {
    /// The script file could not be opened
    #[error("script not found: {path}")]
    ScriptNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The script file was opened but could not be read
    #[error("failed to read script {path}: {source}")]
    ScriptRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The same script was named twice in one batch
    #[error("duplicate script in batch: {0}")]
    DuplicateScript(String),

    /// A batch load was requested with no scripts
    #[error("no scripts to load")]
    EmptyBatch,

    /// A page was requested for a script whose metadata is gone
    #[error("script {0:?} is no longer loaded")]
    StaleScript(ScriptId),

    /// A worker thread could not be started
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Invalid memory or scheduler configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("page size must be at least 1")]
    ZeroPageSize,

    #[error("frame store size {frame_store_size} is smaller than one page ({page_size} lines)")]
    FrameStoreTooSmall {
        frame_store_size: usize,
        page_size: usize,
    },

    #[error("frame store size {frame_store_size} is not a multiple of the page size {page_size}")]
    FrameStoreNotAligned {
        frame_store_size: usize,
        page_size: usize,
    },

    #[error("worker pool needs at least one worker")]
    NoWorkers,

    #[error("variable store size must be at least 1")]
    ZeroVariableStore,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_converts_into_kernel_error() {
        let err: KernelError = ConfigError::NoWorkers.into();
        assert!(matches!(err, KernelError::Config(ConfigError::NoWorkers)));
        assert_eq!(err.to_string(), "worker pool needs at least one worker");
    }

    #[test]
    fn test_not_found_message_names_path() {
        let err = KernelError::ScriptNotFound {
            path: PathBuf::from("prog1"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(err.to_string(), "script not found: prog1");
    }
}

//! Engine configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Size of each read/write step (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// How tasks are scheduled onto worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConcurrencyMode {
    /// One worker thread per file
    #[default]
    Concurrent,
    /// A single background worker copying files one at a time
    Sequential,
}

impl ConcurrencyMode {
    /// Parse a mode from its CLI name
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "concurrent" | "parallel" => Some(Self::Concurrent),
            "sequential" | "serial" => Some(Self::Sequential),
            _ => None,
        }
    }
}

impl fmt::Display for ConcurrencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcurrencyMode::Concurrent => write!(f, "Concurrent"),
            ConcurrencyMode::Sequential => write!(f, "Sequential"),
        }
    }
}

/// Settings for a single job run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub concurrency: ConcurrencyMode,

    /// Bytes per read/write step
    pub chunk_size: usize,

    /// Per-file time limit, checked between chunks
    pub task_timeout: Option<Duration>,

    /// Per-file pacing in bytes per second, applied between chunks
    pub bandwidth_limit: Option<u64>,

    /// Finish in `JobState::Failed` instead of `Completed` when any file failed
    pub fail_on_task_error: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            concurrency: ConcurrencyMode::Concurrent,
            chunk_size: DEFAULT_CHUNK_SIZE,
            task_timeout: None,
            bandwidth_limit: None,
            fail_on_task_error: false,
        }
    }
}

impl EngineConfig {
    pub fn with_concurrency(mut self, mode: ConcurrencyMode) -> Self {
        self.concurrency = mode;
        self
    }

    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    pub fn with_bandwidth_limit(mut self, bytes_per_sec: u64) -> Self {
        self.bandwidth_limit = Some(bytes_per_sec);
        self
    }

    pub fn with_fail_on_task_error(mut self, fatal: bool) -> Self {
        self.fail_on_task_error = fatal;
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.chunk_size == 0 {
            return Err(EngineError::InvalidConfig {
                reason: "chunk size must be greater than zero".to_string(),
            });
        }
        if self.bandwidth_limit == Some(0) {
            return Err(EngineError::InvalidConfig {
                reason: "bandwidth limit must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

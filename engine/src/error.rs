//! Error types for the copy engine.
//!
//! `EngineError` covers job-level problems that stop a job from being created or
//! started. Problems with a single file never become an `EngineError`; they are
//! recorded on the owning `CopyTask` as a `CopyError` and the job carries on.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::JobState;

/// Errors that prevent a job from being created, planned or started.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The source list was empty
    #[error("No source files were selected")]
    NoSources,

    /// Destination directory does not exist
    #[error("Destination directory not found: {}", path.display())]
    DestinationNotFound { path: PathBuf },

    /// Destination exists but is a file
    #[error("Destination is not a directory: {}", path.display())]
    DestinationNotDirectory { path: PathBuf },

    /// Destination could not be inspected (permissions)
    #[error("Destination directory access denied: {}", path.display())]
    DestinationAccessDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Operation attempted in the wrong lifecycle state
    #[error("Job must be {expected} for this operation; current state: {actual}")]
    InvalidState { expected: JobState, actual: JobState },

    /// Rejected configuration value
    #[error("Invalid engine configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The OS refused to start a worker or coordinator thread
    #[error("Failed to spawn {role} thread")]
    Spawn {
        role: &'static str,
        #[source]
        source: io::Error,
    },

    /// The coordinator thread panicked before producing an outcome
    #[error("Transfer coordinator terminated unexpectedly")]
    CoordinatorPanicked,
}

impl EngineError {
    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::DestinationAccessDenied { source, .. } | Self::Spawn { source, .. } => {
                source.raw_os_error()
            }
            _ => None,
        }
    }
}

/// Classification of a per-file failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyErrorKind {
    /// Source could not be opened or is not a regular file
    SourceUnreadable,
    /// Destination file could not be created
    DestinationUnwritable,
    /// A read or write failed after both files were open
    IoErrorMidCopy,
    /// The per-task time limit elapsed
    TimedOut,
    /// The job was cancelled before this file finished
    Cancelled,
}

impl fmt::Display for CopyErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceUnreadable => write!(f, "source unreadable"),
            Self::DestinationUnwritable => write!(f, "destination unwritable"),
            Self::IoErrorMidCopy => write!(f, "I/O error during copy"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A per-file failure, recorded on the task and reported in the status feed.
///
/// Holds the underlying reason as text so the error can be cloned into
/// snapshots and serialized for hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {reason}")]
pub struct CopyError {
    pub kind: CopyErrorKind,
    pub file_name: String,
    pub os_error: Option<i32>,
    pub reason: String,
}

impl CopyError {
    pub fn from_io(kind: CopyErrorKind, path: &Path, err: &io::Error) -> Self {
        CopyError {
            kind,
            file_name: display_name(path),
            os_error: err.raw_os_error(),
            reason: err.to_string(),
        }
    }

    pub fn new(kind: CopyErrorKind, path: &Path, reason: impl Into<String>) -> Self {
        CopyError {
            kind,
            file_name: display_name(path),
            os_error: None,
            reason: reason.into(),
        }
    }

    pub fn cancelled(path: &Path) -> Self {
        Self::new(CopyErrorKind::Cancelled, path, "transfer cancelled")
    }

    pub fn timed_out(path: &Path, limit: Duration) -> Self {
        Self::new(
            CopyErrorKind::TimedOut,
            path,
            format!("exceeded time limit of {:.1}s", limit.as_secs_f64()),
        )
    }
}

/// Base name of a path for user-facing messages.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_error_display_includes_kind_and_reason() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "No such file");
        let err = CopyError::from_io(
            CopyErrorKind::SourceUnreadable,
            Path::new("/tmp/missing.bin"),
            &io_err,
        );

        assert_eq!(err.file_name, "missing.bin");
        assert_eq!(err.to_string(), "source unreadable: No such file");
    }

    #[test]
    fn test_raw_os_error_from_io() {
        let io_err = io::Error::from_raw_os_error(13);
        let err = CopyError::from_io(
            CopyErrorKind::DestinationUnwritable,
            Path::new("out.bin"),
            &io_err,
        );
        assert_eq!(err.os_error, Some(13));

        let engine_err = EngineError::DestinationAccessDenied {
            path: PathBuf::from("/root"),
            source: io::Error::from_raw_os_error(13),
        };
        assert_eq!(engine_err.raw_os_error(), Some(13));
        assert_eq!(EngineError::NoSources.raw_os_error(), None);
    }

    #[test]
    fn test_invalid_state_message() {
        let err = EngineError::InvalidState {
            expected: JobState::Idle,
            actual: JobState::Completed,
        };
        assert_eq!(
            err.to_string(),
            "Job must be Idle for this operation; current state: Completed"
        );
    }
}

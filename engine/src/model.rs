//! Core data model for copy jobs.
//!
//! This module defines the main data structures for representing a transfer:
//! - TransferJob: the whole operation (sources, destination, tasks, state)
//! - CopyTask: one source file copied into the destination directory
//! - JobState, TaskResult: lifecycle enums

use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{display_name, CopyError, CopyErrorKind};

/// A request to copy a flat list of files into one destination directory.
///
/// A TransferJob encompasses:
/// - The ordered source list and the destination directory
/// - One CopyTask per source once planned
/// - The total size computed at planning time
/// - Lifecycle state and timestamps
#[derive(Debug, Clone, Serialize)]
pub struct TransferJob {
    /// Unique identifier for this job
    pub id: Uuid,

    /// Source files in the order they were selected
    pub sources: Vec<PathBuf>,

    /// Directory receiving the copies
    pub destination: PathBuf,

    /// One task per source (empty until the job is planned)
    pub tasks: Vec<CopyTask>,

    /// Sum of all planned source sizes; fixed once planned
    pub total_size: u64,

    /// Current job state
    pub state: JobState,

    /// When the job was created
    pub created_at: DateTime<Utc>,

    /// When execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When execution reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,
}

impl TransferJob {
    /// True once `plan_job` has built the task list.
    pub fn is_planned(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Per-file errors, in task order.
    pub fn failures(&self) -> Vec<&CopyError> {
        self.tasks
            .iter()
            .filter_map(|task| match &task.result {
                TaskResult::Failure(err) => Some(err),
                _ => None,
            })
            .collect()
    }

    pub fn count_where(&self, pred: impl Fn(&TaskResult) -> bool) -> usize {
        self.tasks.iter().filter(|t| pred(&t.result)).count()
    }
}

/// A single source → destination copy owned by a TransferJob.
#[derive(Debug, Clone, Serialize)]
pub struct CopyTask {
    /// Position of this task within the job; used as the task id in reports
    pub index: usize,

    /// Source file
    pub source: PathBuf,

    /// Destination dir joined with the source's base name
    pub destination: PathBuf,

    /// Size from stat at planning time (0 if the source could not be read)
    pub size: u64,

    /// Bytes written to the destination so far
    pub bytes_copied: u64,

    /// When the task's I/O began
    #[serde(skip)]
    pub started_at: Option<Instant>,

    /// Current result
    pub result: TaskResult,
}

impl CopyTask {
    pub fn file_name(&self) -> String {
        display_name(&self.source)
    }

    /// Bytes this task contributes to transferred totals, capped at the planned size.
    pub fn counted_bytes(&self) -> u64 {
        self.bytes_copied.min(self.size)
    }

    /// Bytes this task contributes to completion accounting.
    ///
    /// Finished and failed tasks count their full planned size so a job whose
    /// files all reached a verdict always ends at 100%.
    pub fn accounted_bytes(&self) -> u64 {
        match self.result {
            TaskResult::Success | TaskResult::Failure(_) => self.size,
            _ => self.counted_bytes(),
        }
    }
}

/// Outcome of an individual task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TaskResult {
    /// Not yet started
    Pending,
    /// Handles are open and bytes are moving
    Copying,
    /// All bytes copied and both handles closed
    Success,
    /// The task stopped on an error
    Failure(CopyError),
    /// The job was cancelled before this task finished
    Cancelled,
}

impl TaskResult {
    /// Returns true if this result is terminal (no further changes expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskResult::Success | TaskResult::Failure(_) | TaskResult::Cancelled
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TaskResult::Failure(_))
    }

    /// Map a stop reason coming out of a worker into a task result.
    pub(crate) fn from_copy_error(err: CopyError) -> Self {
        if err.kind == CopyErrorKind::Cancelled {
            TaskResult::Cancelled
        } else {
            TaskResult::Failure(err)
        }
    }
}

/// The state of an entire job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Created, not yet started
    Idle,
    /// Workers are copying
    Running,
    /// Every task reached a verdict (some may have failed)
    Completed,
    /// Stopped on request; partial files remain
    Cancelled,
    /// Completed with failures and the caller asked for failures to be fatal
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Cancelled | JobState::Failed
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Idle => write!(f, "Idle"),
            JobState::Running => write!(f, "Running"),
            JobState::Completed => write!(f, "Completed"),
            JobState::Cancelled => write!(f, "Cancelled"),
            JobState::Failed => write!(f, "Failed"),
        }
    }
}

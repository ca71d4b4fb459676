//! Progress snapshots, the status feed, and the callback trait.
//!
//! The coordinator publishes `TransferEvent`s on a channel. Hosts can consume
//! the channel directly, poll the latest `ProgressSnapshot`, or hand a
//! `ProgressCallback` to `run_job` and let the engine dispatch for them.

use serde::Serialize;

use crate::estimator::{format_eta, Estimate};
use crate::model::{JobState, TaskResult, TransferJob};

/// Status line shown before any job exists.
pub const IDLE_MESSAGE: &str = "Please select file(s) and a destination.";

/// Status line for a cancelled job.
pub const CANCELLED_MESSAGE: &str = "Transfer canceled.";

const MIB: f64 = 1024.0 * 1024.0;

/// Immutable point-in-time view of aggregate progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    /// Bytes written across all files
    pub transferred_bytes: u64,
    /// Transferred bytes plus the unfinished remainder of failed files
    pub accounted_bytes: u64,
    pub total_bytes: u64,
    pub percent: f64,
    pub throughput_kbps: f64,
    /// `None` while throughput is zero
    pub eta_seconds: Option<f64>,
    /// Seconds since the job started
    pub elapsed_seconds: f64,
    pub files_total: usize,
    pub files_done: usize,
    pub files_failed: usize,
    pub state: JobState,
    pub status_message: String,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        ProgressSnapshot {
            transferred_bytes: 0,
            accounted_bytes: 0,
            total_bytes: 0,
            percent: 0.0,
            throughput_kbps: 0.0,
            eta_seconds: None,
            elapsed_seconds: 0.0,
            files_total: 0,
            files_done: 0,
            files_failed: 0,
            state: JobState::Idle,
            status_message: IDLE_MESSAGE.to_string(),
        }
    }
}

impl ProgressSnapshot {
    /// Build a snapshot from the job's current task counters.
    pub fn capture(job: &TransferJob, elapsed_seconds: f64, status_message: &str) -> Self {
        let transferred: u64 = job.tasks.iter().map(|t| t.counted_bytes()).sum();
        let accounted: u64 = job.tasks.iter().map(|t| t.accounted_bytes()).sum();
        let accounted = accounted.min(job.total_size);
        let estimate = Estimate::compute(transferred, accounted, job.total_size, elapsed_seconds);

        ProgressSnapshot {
            transferred_bytes: transferred,
            accounted_bytes: accounted,
            total_bytes: job.total_size,
            percent: estimate.percent,
            throughput_kbps: estimate.throughput_kbps,
            eta_seconds: estimate.eta_seconds,
            elapsed_seconds,
            files_total: job.tasks.len(),
            files_done: job.count_where(|r| *r == TaskResult::Success),
            files_failed: job.count_where(TaskResult::is_failure),
            state: job.state,
            status_message: status_message.to_string(),
        }
    }

    pub fn progress_line(&self) -> String {
        format!("Progress: {:.2}%", self.percent)
    }

    pub fn transferred_line(&self) -> String {
        format!(
            "Transferred: {:.2} MB / {:.2} MB",
            self.transferred_bytes as f64 / MIB,
            self.total_bytes as f64 / MIB
        )
    }

    pub fn speed_line(&self) -> String {
        format!("Transfer Speed: {:.2} KB/s", self.throughput_kbps)
    }

    pub fn eta_line(&self) -> String {
        format!("ETA: {}", format_eta(self.eta_seconds))
    }
}

/// Final state of a job run, handed back by `TransferHandle::wait`.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub job: TransferJob,
    pub snapshot: ProgressSnapshot,
}

impl JobOutcome {
    pub fn state(&self) -> JobState {
        self.job.state
    }

    pub fn failures(&self) -> Vec<&crate::error::CopyError> {
        self.job.failures()
    }

    pub fn has_failures(&self) -> bool {
        self.job.tasks.iter().any(|t| t.result.is_failure())
    }
}

/// One entry of the status feed.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransferEvent {
    /// Workers launched; carries the zero-progress snapshot
    JobStarted { snapshot: ProgressSnapshot },
    /// A task opened its handles
    TaskStarted { index: usize, file_name: String },
    /// A chunk landed
    Progress { snapshot: ProgressSnapshot },
    /// A task reached a terminal result
    TaskFinished {
        index: usize,
        file_name: String,
        result: TaskResult,
        snapshot: ProgressSnapshot,
    },
    /// Last event of every run
    JobFinished { outcome: JobOutcome },
}

/// Trait for receiving progress updates from a running job.
///
/// `run_job` calls these on the caller's thread, in feed order. Workers never
/// wait on a callback, so a slow implementation delays only the display.
pub trait ProgressCallback: Send {
    /// Called once workers have been launched.
    fn on_job_started(&self, snapshot: &ProgressSnapshot);

    /// Called when a file's handles are open and copying begins.
    fn on_task_started(&self, index: usize, file_name: &str);

    /// Called after every chunk.
    fn on_progress(&self, snapshot: &ProgressSnapshot);

    /// Called when a file is done (copied, failed, or cancelled).
    fn on_task_completed(
        &self,
        index: usize,
        file_name: &str,
        result: &TaskResult,
        snapshot: &ProgressSnapshot,
    );

    /// Called when the job reaches a terminal state.
    fn on_job_completed(&self, outcome: &JobOutcome);
}

/// Route one feed event to the matching callback method.
pub fn dispatch_event(callback: &dyn ProgressCallback, event: &TransferEvent) {
    match event {
        TransferEvent::JobStarted { snapshot } => callback.on_job_started(snapshot),
        TransferEvent::TaskStarted { index, file_name } => {
            callback.on_task_started(*index, file_name)
        }
        TransferEvent::Progress { snapshot } => callback.on_progress(snapshot),
        TransferEvent::TaskFinished {
            index,
            file_name,
            result,
            snapshot,
        } => callback.on_task_completed(*index, file_name, result, snapshot),
        TransferEvent::JobFinished { outcome } => callback.on_job_completed(outcome),
    }
}

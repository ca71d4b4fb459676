//! Job orchestration module.
//!
//! This module provides the main job lifecycle functions:
//! - Creating a job from a source list and a destination directory
//! - Planning a job (sizing every source)
//! - Starting a job in the background and steering it through a `TransferHandle`
//! - Running a job to completion with a progress callback

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use chrono::Utc;
use crossbeam_channel::{unbounded, Receiver};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::coordinator::{read_slot, Coordinator, SnapshotSlot};
use crate::error::EngineError;
use crate::fs_ops;
use crate::model::{CopyTask, JobState, TaskResult, TransferJob};
use crate::progress::{
    dispatch_event, JobOutcome, ProgressCallback, ProgressSnapshot, TransferEvent,
};
use crate::worker::{spawn_workers, WorkItem, WorkerContext};

/// Create a new copy job.
///
/// Validates that at least one source was given and that the destination is an
/// existing directory. Individual sources are not checked here; a missing or
/// unreadable source becomes a failed task when the job runs.
///
/// # Returns
/// A new TransferJob in Idle state
///
/// # Errors
/// Returns EngineError if the source list is empty or the destination is unusable
pub fn create_job<I, S, D>(sources: I, destination: D) -> Result<TransferJob, EngineError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<Path>,
    D: AsRef<Path>,
{
    let sources: Vec<_> = sources
        .into_iter()
        .map(|s| s.as_ref().to_path_buf())
        .collect();
    if sources.is_empty() {
        return Err(EngineError::NoSources);
    }

    let destination = destination.as_ref();
    fs_ops::check_destination_dir(destination)?;

    Ok(TransferJob {
        id: Uuid::new_v4(),
        sources,
        destination: destination.to_path_buf(),
        tasks: Vec::new(),
        total_size: 0,
        state: JobState::Idle,
        created_at: Utc::now(),
        started_at: None,
        finished_at: None,
    })
}

/// Plan a job by sizing every source.
///
/// Populates job.tasks (one per source, in order) and fixes job.total_size.
/// A source whose size cannot be read counts as 0 bytes.
///
/// # Errors
/// Returns EngineError if the job is not Idle
pub fn plan_job(job: &mut TransferJob) -> Result<(), EngineError> {
    expect_idle(job)?;

    job.tasks = job
        .sources
        .iter()
        .enumerate()
        .map(|(index, source)| CopyTask {
            index,
            source: source.clone(),
            destination: fs_ops::destination_path_for(&job.destination, source),
            size: fs_ops::source_size(source),
            bytes_copied: 0,
            started_at: None,
            result: TaskResult::Pending,
        })
        .collect();

    job.total_size = job.tasks.iter().map(|t| t.size).sum();

    Ok(())
}

/// Start a job in the background.
///
/// Plans the job first if needed, then launches the coordinator and the
/// workers dictated by `config.concurrency`, and returns immediately.
///
/// # Errors
/// Returns EngineError if the job is not Idle, the config is invalid, or a
/// thread could not be spawned
pub fn start_job(
    mut job: TransferJob,
    config: &EngineConfig,
) -> Result<TransferHandle, EngineError> {
    expect_idle(&job)?;
    config.validate()?;
    if !job.is_planned() {
        plan_job(&mut job)?;
    }

    job.state = JobState::Running;
    job.started_at = Some(Utc::now());
    let started = Instant::now();
    let job_id = job.id;

    info!(
        job_id = %job_id,
        files = job.tasks.len(),
        total_bytes = job.total_size,
        mode = %config.concurrency,
        destination = %job.destination.display(),
        "starting transfer"
    );

    let cancel = CancelToken::new();
    let (report_tx, report_rx) = unbounded();
    let (event_tx, event_rx) = unbounded();
    let latest: SnapshotSlot = Arc::new(Mutex::new(ProgressSnapshot::default()));

    let items: Vec<WorkItem> = job.tasks.iter().map(WorkItem::from).collect();
    let ctx = WorkerContext::new(report_tx, cancel.clone(), config);
    let workers = spawn_workers(config.concurrency, items, ctx).map_err(|e| {
        // Workers already running wind down at their next chunk.
        cancel.cancel();
        e
    })?;

    let coordinator = Coordinator::new(
        job,
        started,
        cancel.clone(),
        config.fail_on_task_error,
        event_tx,
        Arc::clone(&latest),
    );
    let coordinator = thread::Builder::new()
        .name("copier-coordinator".to_string())
        .spawn(move || coordinator.run(report_rx))
        .map_err(|e| {
            cancel.cancel();
            EngineError::Spawn {
                role: "coordinator",
                source: e,
            }
        })?;

    Ok(TransferHandle {
        job_id,
        events: event_rx,
        latest,
        cancel,
        coordinator,
        workers,
    })
}

/// Run a job to completion on the calling thread's behalf.
///
/// Starts the job, forwards every feed event to `progress_callback` in order,
/// and returns the outcome once the feed ends. Individual file errors are
/// recorded on the tasks and do NOT stop the job.
///
/// # Errors
/// Returns EngineError only for job-level problems (see `start_job`).
pub fn run_job(
    job: TransferJob,
    config: &EngineConfig,
    progress_callback: Option<&dyn ProgressCallback>,
) -> Result<JobOutcome, EngineError> {
    let handle = start_job(job, config)?;

    for event in handle.events().iter() {
        if let Some(callback) = progress_callback {
            dispatch_event(callback, &event);
        }
    }

    handle.wait()
}

fn expect_idle(job: &TransferJob) -> Result<(), EngineError> {
    if job.state != JobState::Idle {
        return Err(EngineError::InvalidState {
            expected: JobState::Idle,
            actual: job.state,
        });
    }
    Ok(())
}

/// Control surface for a running job.
///
/// Dropping the handle does not stop the job; call `cancel` for that.
pub struct TransferHandle {
    job_id: Uuid,
    events: Receiver<TransferEvent>,
    latest: SnapshotSlot,
    cancel: CancelToken,
    coordinator: JoinHandle<JobOutcome>,
    workers: Vec<JoinHandle<()>>,
}

impl TransferHandle {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// The status feed. Ends after `TransferEvent::JobFinished`.
    pub fn events(&self) -> &Receiver<TransferEvent> {
        &self.events
    }

    /// Copy of the most recently published snapshot.
    pub fn snapshot(&self) -> ProgressSnapshot {
        read_slot(&self.latest)
    }

    /// Ask every worker to stop at its next chunk boundary.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            info!(job_id = %self.job_id, "cancellation requested");
        }
        self.cancel.cancel();
    }

    /// A token that cancels this job, for handing to other threads.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.coordinator.is_finished()
    }

    /// Block until the job reaches a terminal state.
    ///
    /// # Errors
    /// Returns `EngineError::CoordinatorPanicked` if no outcome was produced.
    pub fn wait(self) -> Result<JobOutcome, EngineError> {
        for worker in self.workers {
            if worker.join().is_err() {
                warn!(job_id = %self.job_id, "copy worker panicked");
            }
        }
        self.coordinator
            .join()
            .map_err(|_| EngineError::CoordinatorPanicked)
    }
}

//! Progress coordinator.
//!
//! The coordinator thread is the only owner of the running job. Workers send
//! `WorkerReport`s; the coordinator folds them into the task list, recomputes
//! the snapshot, stores a copy for pollers and publishes it on the feed.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::Utc;
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, trace, warn};

use crate::cancel::CancelToken;
use crate::error::{CopyError, CopyErrorKind};
use crate::model::{JobState, TaskResult, TransferJob};
use crate::progress::{JobOutcome, ProgressSnapshot, TransferEvent, CANCELLED_MESSAGE};
use crate::worker::WorkerReport;

/// Latest snapshot, shared with the `TransferHandle`.
pub(crate) type SnapshotSlot = Arc<Mutex<ProgressSnapshot>>;

pub(crate) fn read_slot(slot: &SnapshotSlot) -> ProgressSnapshot {
    slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

pub(crate) struct Coordinator {
    job: TransferJob,
    started: Instant,
    cancel: CancelToken,
    cancel_seen: bool,
    fail_on_task_error: bool,
    events: Sender<TransferEvent>,
    latest: SnapshotSlot,
    status: String,
}

impl Coordinator {
    pub fn new(
        job: TransferJob,
        started: Instant,
        cancel: CancelToken,
        fail_on_task_error: bool,
        events: Sender<TransferEvent>,
        latest: SnapshotSlot,
    ) -> Self {
        let status = format!("Files selected: {}", job.tasks.len());
        Coordinator {
            job,
            started,
            cancel,
            cancel_seen: false,
            fail_on_task_error,
            events,
            latest,
            status,
        }
    }

    /// Consume reports until every worker has hung up, then finish the job.
    pub fn run(mut self, reports: Receiver<WorkerReport>) -> JobOutcome {
        let snapshot = self.snapshot();
        self.publish(TransferEvent::JobStarted { snapshot });

        for report in reports.iter() {
            self.apply(report);
        }

        self.finish()
    }

    fn apply(&mut self, report: WorkerReport) {
        if !self.cancel_seen && self.cancel.is_cancelled() {
            self.cancel_seen = true;
            self.status = CANCELLED_MESSAGE.to_string();
            info!(job_id = %self.job.id, "cancellation observed; progress feed stopped");
        }

        match report {
            WorkerReport::Started { index, at } => {
                let Some(task) = self.job.tasks.get_mut(index) else {
                    return;
                };
                task.started_at = Some(at);
                task.result = TaskResult::Copying;
                let file_name = task.file_name();
                if !self.cancel_seen {
                    self.status = format!("Copying {}", file_name);
                }
                self.publish(TransferEvent::TaskStarted { index, file_name });
            }
            WorkerReport::Chunk {
                index,
                bytes,
                elapsed,
            } => {
                let Some(task) = self.job.tasks.get_mut(index) else {
                    return;
                };
                task.bytes_copied += bytes;
                trace!(
                    index,
                    bytes,
                    task_elapsed = ?elapsed,
                    total = task.bytes_copied,
                    "chunk report"
                );
                let snapshot = self.snapshot();
                self.publish(TransferEvent::Progress { snapshot });
            }
            WorkerReport::Finished { index, result } => {
                let destination = self.job.destination.display().to_string();
                let Some(task) = self.job.tasks.get_mut(index) else {
                    return;
                };
                let file_name = task.file_name();
                match &result {
                    TaskResult::Success => {
                        debug!(index, file = %file_name, bytes = task.bytes_copied, "file copied");
                        if !self.cancel_seen {
                            self.status = format!(
                                "File {} copied successfully to {}.",
                                file_name, destination
                            );
                        }
                    }
                    TaskResult::Failure(err) => {
                        warn!(index, file = %file_name, error = %err, "file failed to copy");
                        if !self.cancel_seen {
                            self.status =
                                format!("Failed to copy file {}: {}", file_name, err.reason);
                        }
                    }
                    _ => {}
                }
                task.result = result.clone();
                let snapshot = self.snapshot();
                self.publish(TransferEvent::TaskFinished {
                    index,
                    file_name,
                    result,
                    snapshot,
                });
            }
        }
    }

    fn finish(mut self) -> JobOutcome {
        if self.cancel.is_cancelled() && !self.cancel_seen {
            // Cancelled after the last report; only counts if work was cut short.
            self.cancel_seen = self
                .job
                .tasks
                .iter()
                .any(|t| t.result == TaskResult::Cancelled);
        }

        for task in &mut self.job.tasks {
            if task.result.is_terminal() {
                continue;
            }
            // The worker exited without a verdict (it panicked or was never spawned).
            task.result = if self.cancel_seen {
                TaskResult::Cancelled
            } else {
                TaskResult::Failure(CopyError::new(
                    CopyErrorKind::IoErrorMidCopy,
                    &task.source,
                    "copy worker exited before finishing",
                ))
            };
        }

        let any_cancelled = self
            .job
            .tasks
            .iter()
            .any(|t| t.result == TaskResult::Cancelled);

        self.job.state = if self.cancel_seen || any_cancelled {
            self.status = CANCELLED_MESSAGE.to_string();
            JobState::Cancelled
        } else if self.fail_on_task_error && self.job.tasks.iter().any(|t| t.result.is_failure()) {
            JobState::Failed
        } else {
            JobState::Completed
        };
        self.job.finished_at = Some(Utc::now());

        let snapshot = self.snapshot();
        info!(
            job_id = %self.job.id,
            state = %self.job.state,
            transferred = snapshot.transferred_bytes,
            total = snapshot.total_bytes,
            failed = snapshot.files_failed,
            "job finished"
        );

        self.store(&snapshot);
        let outcome = JobOutcome {
            job: self.job,
            snapshot,
        };
        let _ = self.events.send(TransferEvent::JobFinished {
            outcome: outcome.clone(),
        });
        outcome
    }

    fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot::capture(
            &self.job,
            self.started.elapsed().as_secs_f64(),
            &self.status,
        )
    }

    fn store(&self, snapshot: &ProgressSnapshot) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = snapshot.clone();
    }

    /// Store and send an event, unless cancellation has been observed.
    fn publish(&self, event: TransferEvent) {
        if self.cancel_seen {
            return;
        }
        match &event {
            TransferEvent::JobStarted { snapshot }
            | TransferEvent::Progress { snapshot }
            | TransferEvent::TaskFinished { snapshot, .. } => self.store(snapshot),
            _ => {}
        }
        // Unbounded send never blocks; a dropped receiver just means nobody is listening.
        let _ = self.events.send(event);
    }
}

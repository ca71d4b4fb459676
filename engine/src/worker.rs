//! Copy workers.
//!
//! A worker copies one task at a time and reports to the coordinator over a
//! channel. It never touches shared progress state directly.

use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use tracing::{debug, trace};

use crate::cancel::CancelToken;
use crate::config::{ConcurrencyMode, EngineConfig};
use crate::error::{CopyError, CopyErrorKind, EngineError};
use crate::fs_ops::{self, ChunkStop};
use crate::model::{CopyTask, TaskResult};

/// Message from a worker to the coordinator.
#[derive(Debug)]
pub(crate) enum WorkerReport {
    /// Handles are open; I/O begins now
    Started { index: usize, at: Instant },
    /// One chunk was written
    Chunk {
        index: usize,
        bytes: u64,
        elapsed: Duration,
    },
    /// Terminal result for the task
    Finished { index: usize, result: TaskResult },
}

/// What a worker needs to know about one task.
#[derive(Debug, Clone)]
pub(crate) struct WorkItem {
    pub index: usize,
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl From<&CopyTask> for WorkItem {
    fn from(task: &CopyTask) -> Self {
        WorkItem {
            index: task.index,
            source: task.source.clone(),
            destination: task.destination.clone(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub reports: Sender<WorkerReport>,
    pub cancel: CancelToken,
    pub chunk_size: usize,
    pub task_timeout: Option<Duration>,
    pub bandwidth_limit: Option<u64>,
}

impl WorkerContext {
    pub fn new(reports: Sender<WorkerReport>, cancel: CancelToken, config: &EngineConfig) -> Self {
        WorkerContext {
            reports,
            cancel,
            chunk_size: config.chunk_size,
            task_timeout: config.task_timeout,
            bandwidth_limit: config.bandwidth_limit,
        }
    }

    fn report(&self, report: WorkerReport) {
        // A closed channel means the coordinator is gone; nothing left to tell.
        let _ = self.reports.send(report);
    }
}

/// Launch workers for every task according to the concurrency mode.
///
/// The context's sender is moved into the workers, so the report channel
/// disconnects once the last worker exits.
pub(crate) fn spawn_workers(
    mode: ConcurrencyMode,
    tasks: Vec<WorkItem>,
    ctx: WorkerContext,
) -> Result<Vec<JoinHandle<()>>, EngineError> {
    match mode {
        ConcurrencyMode::Concurrent => {
            let mut handles = Vec::with_capacity(tasks.len());
            for item in tasks {
                let ctx = ctx.clone();
                let handle = thread::Builder::new()
                    .name(format!("copier-task-{}", item.index))
                    .spawn(move || run_task(&item, &ctx))
                    .map_err(|e| EngineError::Spawn {
                        role: "copy worker",
                        source: e,
                    })?;
                handles.push(handle);
            }
            Ok(handles)
        }
        ConcurrencyMode::Sequential => {
            let handle = thread::Builder::new()
                .name("copier-sequential".to_string())
                .spawn(move || {
                    for item in &tasks {
                        run_task(item, &ctx);
                    }
                })
                .map_err(|e| EngineError::Spawn {
                    role: "copy worker",
                    source: e,
                })?;
            Ok(vec![handle])
        }
    }
}

/// Copy one file and send its reports. Always ends with a `Finished` report.
pub(crate) fn run_task(item: &WorkItem, ctx: &WorkerContext) {
    let result = match copy_task(item, ctx) {
        Ok(bytes) => {
            debug!(index = item.index, bytes, "task finished");
            TaskResult::Success
        }
        Err(err) => {
            debug!(index = item.index, error = %err, "task stopped");
            TaskResult::from_copy_error(err)
        }
    };
    ctx.report(WorkerReport::Finished {
        index: item.index,
        result,
    });
}

fn copy_task(item: &WorkItem, ctx: &WorkerContext) -> Result<u64, CopyError> {
    if ctx.cancel.is_cancelled() {
        return Err(CopyError::cancelled(&item.source));
    }

    // Both handles close when they go out of scope, on every return path.
    let mut source = fs_ops::open_source(&item.source)?;
    let mut destination = fs_ops::create_destination(&item.destination)?;

    let started = Instant::now();
    ctx.report(WorkerReport::Started {
        index: item.index,
        at: started,
    });
    debug!(
        index = item.index,
        source = %item.source.display(),
        destination = %item.destination.display(),
        "task started"
    );

    // Pacing may sleep, so cancel and timeout are checked after it.
    let gate = |copied: u64| {
        if let Some(rate) = ctx.bandwidth_limit {
            pace(started, copied, rate, &ctx.cancel);
        }
        if ctx.cancel.is_cancelled() {
            return Some(ChunkStop::Cancelled);
        }
        if let Some(limit) = ctx.task_timeout {
            if started.elapsed() >= limit {
                return Some(ChunkStop::TimedOut);
            }
        }
        None
    };

    let on_chunk = |bytes: u64| {
        let elapsed = started.elapsed();
        trace!(index = item.index, bytes, ?elapsed, "chunk written");
        ctx.report(WorkerReport::Chunk {
            index: item.index,
            bytes,
            elapsed,
        });
    };

    fs_ops::copy_chunked(&mut source, &mut destination, ctx.chunk_size, gate, on_chunk)
        .map_err(|stop| stop_to_error(stop, item, ctx))
}

fn stop_to_error(stop: ChunkStop, item: &WorkItem, ctx: &WorkerContext) -> CopyError {
    match stop {
        ChunkStop::Cancelled => CopyError::cancelled(&item.source),
        ChunkStop::TimedOut => {
            CopyError::timed_out(&item.source, ctx.task_timeout.unwrap_or_default())
        }
        ChunkStop::Read(e) => CopyError::from_io(CopyErrorKind::IoErrorMidCopy, &item.source, &e),
        ChunkStop::Write(e) => {
            let mut err = CopyError::from_io(CopyErrorKind::IoErrorMidCopy, &item.source, &e);
            err.reason = format!("write to {} failed: {}", display(&item.destination), e);
            err
        }
    }
}

/// Longest single sleep while pacing; bounds how late a cancel is noticed.
const PACE_SLICE: Duration = Duration::from_millis(10);

/// Sleep until `copied` bytes fit within `rate` bytes per second since `started`.
///
/// Returns early once `cancel` fires.
fn pace(started: Instant, copied: u64, rate: u64, cancel: &CancelToken) {
    let due = Duration::from_secs_f64(copied as f64 / rate as f64);
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let elapsed = started.elapsed();
        if elapsed >= due {
            return;
        }
        thread::sleep((due - elapsed).min(PACE_SLICE));
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::fs;

    fn context(
        cancel: CancelToken,
        config: &EngineConfig,
    ) -> (WorkerContext, crossbeam_channel::Receiver<WorkerReport>) {
        let (tx, rx) = unbounded();
        (WorkerContext::new(tx, cancel, config), rx)
    }

    fn item(index: usize, source: PathBuf, destination: PathBuf) -> WorkItem {
        WorkItem {
            index,
            source,
            destination,
        }
    }

    #[test]
    fn test_run_task_reports_chunks_then_success() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("in.bin");
        let dst = temp_dir.path().join("out.bin");
        fs::write(&src, vec![9u8; 10]).expect("Failed to write source");

        let config = EngineConfig::default().with_chunk_size(4);
        let (ctx, rx) = context(CancelToken::new(), &config);
        run_task(&item(0, src, dst.clone()), &ctx);
        drop(ctx);

        let reports: Vec<_> = rx.iter().collect();
        assert!(matches!(reports.first(), Some(WorkerReport::Started { index: 0, .. })));
        let chunks: Vec<u64> = reports
            .iter()
            .filter_map(|r| match r {
                WorkerReport::Chunk { bytes, .. } => Some(*bytes),
                _ => None,
            })
            .collect();
        assert_eq!(chunks, vec![4, 4, 2]);
        assert!(matches!(
            reports.last(),
            Some(WorkerReport::Finished {
                result: TaskResult::Success,
                ..
            })
        ));
        assert_eq!(fs::read(&dst).expect("Failed to read copy"), vec![9u8; 10]);
    }

    #[test]
    fn test_run_task_missing_source_fails_without_creating_destination() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dst = temp_dir.path().join("out.bin");

        let (ctx, rx) = context(CancelToken::new(), &EngineConfig::default());
        run_task(&item(3, temp_dir.path().join("missing.bin"), dst.clone()), &ctx);
        drop(ctx);

        let reports: Vec<_> = rx.iter().collect();
        assert_eq!(reports.len(), 1);
        match &reports[0] {
            WorkerReport::Finished {
                index: 3,
                result: TaskResult::Failure(err),
            } => assert_eq!(err.kind, CopyErrorKind::SourceUnreadable),
            other => panic!("unexpected report: {:?}", other),
        }
        assert!(!dst.exists());
    }

    #[test]
    fn test_run_task_after_cancel_does_nothing() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("in.bin");
        let dst = temp_dir.path().join("out.bin");
        fs::write(&src, b"payload").expect("Failed to write source");

        let token = CancelToken::new();
        token.cancel();
        let (ctx, rx) = context(token, &EngineConfig::default());
        run_task(&item(0, src, dst.clone()), &ctx);
        drop(ctx);

        let reports: Vec<_> = rx.iter().collect();
        assert!(matches!(
            reports.as_slice(),
            [WorkerReport::Finished {
                result: TaskResult::Cancelled,
                ..
            }]
        ));
        assert!(!dst.exists());
    }

    #[test]
    fn test_run_task_times_out_between_chunks() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("in.bin");
        let dst = temp_dir.path().join("out.bin");
        fs::write(&src, vec![1u8; 64]).expect("Failed to write source");

        let config = EngineConfig::default().with_task_timeout(Duration::ZERO);
        let (ctx, rx) = context(CancelToken::new(), &config);
        run_task(&item(0, src, dst), &ctx);
        drop(ctx);

        let last = rx.iter().last().expect("at least one report");
        match last {
            WorkerReport::Finished {
                result: TaskResult::Failure(err),
                ..
            } => assert_eq!(err.kind, CopyErrorKind::TimedOut),
            other => panic!("unexpected report: {:?}", other),
        }
    }

    #[test]
    fn test_sequential_spawns_single_worker() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dst_dir = temp_dir.path().join("dst");
        fs::create_dir(&dst_dir).expect("Failed to create dst dir");

        let mut items = Vec::new();
        for i in 0..3 {
            let src = temp_dir.path().join(format!("f{}.txt", i));
            fs::write(&src, format!("file {}", i)).expect("Failed to write source");
            items.push(item(i, src.clone(), dst_dir.join(format!("f{}.txt", i))));
        }

        let (ctx, rx) = context(CancelToken::new(), &EngineConfig::default());
        let handles = spawn_workers(ConcurrencyMode::Sequential, items, ctx)
            .expect("Failed to spawn workers");
        assert_eq!(handles.len(), 1);
        for h in handles {
            h.join().expect("worker panicked");
        }

        // One worker means tasks finish in source order
        let order: Vec<usize> = rx
            .iter()
            .filter_map(|r| match r {
                WorkerReport::Finished { index, .. } => Some(index),
                _ => None,
            })
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_pace_waits_for_rate() {
        let started = Instant::now();
        // 1000 bytes at 10_000 B/s is due at 100ms
        pace(started, 1000, 10_000, &CancelToken::new());
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn test_pace_returns_early_on_cancel() {
        let token = CancelToken::new();
        token.cancel();
        let started = Instant::now();
        // Would be due in 100 seconds without the cancel
        pace(started, 100_000, 1000, &token);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_cancel_during_paced_sleep_stops_before_next_chunk() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("in.bin");
        let dst = temp_dir.path().join("out.bin");
        fs::write(&src, vec![7u8; 64 * 1024]).expect("Failed to write source");

        // The second chunk is due 4s after the first
        let config = EngineConfig::default()
            .with_chunk_size(4096)
            .with_bandwidth_limit(1024);
        let token = CancelToken::new();
        let (ctx, rx) = context(token.clone(), &config);
        let task = item(0, src, dst.clone());
        let worker = thread::spawn(move || run_task(&task, &ctx));

        let mut chunks = 0;
        for report in rx.iter() {
            if let WorkerReport::Chunk { .. } = report {
                chunks += 1;
                break;
            }
        }
        thread::sleep(Duration::from_millis(300));
        let cancelled_at = Instant::now();
        token.cancel();

        let mut last = None;
        for report in rx.iter() {
            match report {
                WorkerReport::Chunk { .. } => chunks += 1,
                other => last = Some(other),
            }
        }
        worker.join().expect("worker panicked");

        assert!(
            cancelled_at.elapsed() < Duration::from_secs(1),
            "worker took {:?} to stop",
            cancelled_at.elapsed()
        );
        assert_eq!(chunks, 1);
        assert!(matches!(
            last,
            Some(WorkerReport::Finished {
                result: TaskResult::Cancelled,
                ..
            })
        ));
        assert_eq!(fs::metadata(&dst).expect("partial copy exists").len(), 4096);
    }
}

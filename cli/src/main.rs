//! copier - Command-line front end for the copy engine.
//!
//! Copies a list of files into one destination directory, rendering live
//! progress to stderr or streaming the event feed as JSON lines to stdout.

mod logging;

use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;
use clap::Parser;
use engine::{
    create_job, dispatch_event, plan_job, start_job, CancelToken, ConcurrencyMode, EngineConfig,
    EngineError, JobOutcome, JobState, ProgressCallback, ProgressSnapshot, TaskResult,
    TransferEvent,
};
use tracing::{info, warn};

/// copier - copy files into a directory with live progress
#[derive(Parser, Debug)]
#[command(name = "copier")]
#[command(version = "0.1.0")]
#[command(about = "Copy files into a destination directory with progress tracking")]
struct Args {
    /// Files to copy
    #[arg(required = true, value_name = "SOURCES")]
    sources: Vec<PathBuf>,

    /// Destination directory
    #[arg(long, value_name = "DIR")]
    dst: PathBuf,

    /// Scheduling: concurrent (one worker per file) or sequential
    #[arg(long, value_name = "MODE", default_value = "concurrent")]
    mode: String,

    /// Copy buffer size in bytes
    #[arg(long, value_name = "BYTES", default_value_t = engine::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Give up on a single file after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,

    /// Per-file bandwidth cap in bytes per second
    #[arg(long, value_name = "BYTES_PER_SEC")]
    bwlimit: Option<u64>,

    /// Treat any per-file failure as a failed job
    #[arg(long)]
    fail_fast_exit: bool,

    /// Print every feed event as a JSON line on stdout
    #[arg(long)]
    json: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Append logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

/// How a run ended when no error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunStatus {
    Completed,
    Cancelled,
}

impl RunStatus {
    fn exit_code(self) -> i32 {
        match self {
            RunStatus::Completed => 0,
            RunStatus::Cancelled => 1,
        }
    }
}

/// CLI implementation of ProgressCallback for displaying transfer progress
struct CliProgress {
    verbose: bool,
    last_progress_update: Mutex<Instant>,
}

impl CliProgress {
    const REFRESH: Duration = Duration::from_millis(200);

    fn new(verbose: bool) -> Self {
        CliProgress {
            verbose,
            last_progress_update: Mutex::new(Instant::now()),
        }
    }

    fn format_duration(secs: f64) -> String {
        let secs = secs.max(0.0) as u64;
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }

    fn status_line(snapshot: &ProgressSnapshot) -> String {
        format!(
            "{} | {} | {} | {}",
            snapshot.progress_line(),
            snapshot.transferred_line(),
            snapshot.speed_line(),
            snapshot.eta_line()
        )
    }
}

impl ProgressCallback for CliProgress {
    fn on_job_started(&self, snapshot: &ProgressSnapshot) {
        eprintln!("{}", snapshot.status_message);
        eprintln!("{}", Self::status_line(snapshot));
    }

    fn on_task_started(&self, index: usize, file_name: &str) {
        if self.verbose {
            eprintln!("\n[{:3}] Starting: {}", index, file_name);
        }
    }

    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        // Throttle progress updates to avoid spam (max once per 200ms)
        let mut last = match self.last_progress_update.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if last.elapsed() < Self::REFRESH {
            return;
        }
        *last = Instant::now();

        eprint!("\r{}", Self::status_line(snapshot));
        let _ = std::io::stderr().flush();
    }

    fn on_task_completed(
        &self,
        index: usize,
        _file_name: &str,
        result: &TaskResult,
        snapshot: &ProgressSnapshot,
    ) {
        match result {
            TaskResult::Success | TaskResult::Failure(_) => {
                eprintln!("\r[{:3}] {}", index, snapshot.status_message);
            }
            _ => {}
        }
    }

    fn on_job_completed(&self, outcome: &JobOutcome) {
        let snapshot = &outcome.snapshot;
        eprintln!("\r{}", Self::status_line(snapshot));
        eprintln!();

        match outcome.state() {
            JobState::Cancelled => eprintln!("{}", snapshot.status_message),
            JobState::Failed => eprintln!("Transfer failed."),
            _ => eprintln!("Transfer complete!"),
        }

        let cancelled = outcome.job.count_where(|r| matches!(r, TaskResult::Cancelled));
        eprintln!(
            "Summary: {} copied, {} failed, {} cancelled",
            snapshot.files_done,
            snapshot.files_failed,
            cancelled
        );
        eprintln!("Elapsed: {}", Self::format_duration(snapshot.elapsed_seconds));
        if let Some(finished) = outcome.job.finished_at {
            eprintln!(
                "Finished at: {}",
                finished.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
            );
        }

        if outcome.has_failures() {
            eprintln!();
            eprintln!("Failed files:");
            for err in outcome.failures() {
                eprintln!("  {}: {} ({})", err.file_name, err.reason, err.kind);
            }
        }
    }
}

/// Parse and validate command-line arguments, then run the job
fn main() {
    let args = Args::parse();

    if let Err(msg) = logging::init_logging(args.verbose, args.log_file.as_deref()) {
        eprintln!("Warning: {}", msg);
    }

    let exit_code = match run_cli(&args) {
        Ok(status) => status.exit_code(),
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Build the engine configuration from the parsed flags
fn build_config(args: &Args) -> Result<EngineConfig, String> {
    let mode = ConcurrencyMode::from_name(&args.mode).ok_or_else(|| {
        format!("Invalid mode '{}'. Must be 'concurrent' or 'sequential'", args.mode)
    })?;

    let mut config = EngineConfig::default()
        .with_concurrency(mode)
        .with_chunk_size(args.chunk_size)
        .with_fail_on_task_error(args.fail_fast_exit);
    if let Some(secs) = args.timeout_secs {
        config = config.with_task_timeout(Duration::from_secs(secs));
    }
    if let Some(rate) = args.bwlimit {
        config = config.with_bandwidth_limit(rate);
    }

    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Render a job-level error, with the OS error code when there is one
fn describe(context: &str, err: &EngineError) -> String {
    match err.raw_os_error() {
        Some(code) => format!("{}: {} (os error {})", context, err, code),
        None => format!("{}: {}", context, err),
    }
}

/// Cancel the job when the user types `q` or `cancel` on an interactive stdin
fn watch_stdin(token: CancelToken) {
    let spawned = thread::Builder::new()
        .name("copier-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if matches!(line.trim(), "q" | "c" | "cancel") {
                    info!("cancel requested from terminal");
                    token.cancel();
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "terminal cancel watcher unavailable");
    }
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args) -> Result<RunStatus, String> {
    let config = build_config(args)?;

    let mut job = create_job(&args.sources, &args.dst)
        .map_err(|e| describe("Job creation failed", &e))?;
    plan_job(&mut job).map_err(|e| describe("Job planning failed", &e))?;

    info!(
        total_bytes = job.total_size,
        "Files selected: {}",
        job.tasks.len()
    );
    info!("Destination selected: {}", job.destination.display());

    let handle = start_job(job, &config).map_err(|e| describe("Job start failed", &e))?;

    if std::io::stdin().is_terminal() && !args.json {
        eprintln!("Type 'q' and Enter to cancel.");
        watch_stdin(handle.cancel_token());
    }

    let progress = CliProgress::new(args.verbose > 0);
    let stdout = std::io::stdout();
    for event in handle.events().iter() {
        if args.json {
            let line = serde_json::to_string(&event)
                .map_err(|e| format!("Failed to encode event: {}", e))?;
            let mut out = stdout.lock();
            writeln!(out, "{}", line).map_err(|e| format!("Failed to write event: {}", e))?;
        } else {
            dispatch_event(&progress, &event);
        }
    }

    let outcome = handle
        .wait()
        .map_err(|e| describe("Job execution failed", &e))?;

    match outcome.state() {
        JobState::Cancelled => Ok(RunStatus::Cancelled),
        JobState::Failed => Err(format!(
            "{} file(s) failed to transfer",
            outcome.failures().len()
        )),
        _ => Ok(RunStatus::Completed),
    }
}

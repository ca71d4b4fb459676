//! # Copier Engine - Concurrent File Copy Library
//!
//! A headless engine that copies a flat list of files into one destination
//! directory while reporting live progress. Designed as the foundation for any
//! host (CLI, GUI, automation).
//!
//! ## Overview
//!
//! - Concurrent (one worker per file) or sequential (one background worker) copying
//! - Fixed-size chunked I/O with a reusable buffer
//! - Per-file error isolation: one bad file never aborts its siblings
//! - A coordinator that owns all progress state and publishes immutable snapshots
//! - Percent, throughput and ETA estimation that stays sane at zero
//! - Cooperative cancellation checked between chunks
//!
//! ## Basic Usage
//!
//! ```no_run
//! use engine::{create_job, start_job, EngineConfig, TransferEvent};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let job = create_job(["/data/a.iso", "/data/b.iso"], "/mnt/backup")?;
//! let handle = start_job(job, &EngineConfig::default())?;
//!
//! for event in handle.events().iter() {
//!     if let TransferEvent::Progress { snapshot } = event {
//!         println!("{} {}", snapshot.progress_line(), snapshot.eta_line());
//!     }
//! }
//!
//! let outcome = handle.wait()?;
//! for err in outcome.failures() {
//!     println!("{}: {}", err.file_name, err.reason);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (TransferJob, CopyTask, enums)
//! - **error**: Job-level and per-file error types
//! - **config**: EngineConfig and ConcurrencyMode
//! - **fs_ops**: Low-level filesystem operations and the chunked copy loop
//! - **estimator**: Percent, throughput and ETA math
//! - **progress**: Snapshots, the event feed, and the callback trait
//! - **cancel**: Cooperative cancellation token
//! - **job**: Job orchestration (create, plan, start, run)

pub mod cancel;
pub mod config;
mod coordinator;
pub mod error;
pub mod estimator;
pub mod fs_ops;
pub mod job;
pub mod model;
pub mod progress;
mod worker;

// Re-export main types and functions
pub use cancel::CancelToken;
pub use config::{ConcurrencyMode, EngineConfig, DEFAULT_CHUNK_SIZE};
pub use error::{CopyError, CopyErrorKind, EngineError};
pub use estimator::{format_eta, Estimate};
pub use job::{create_job, plan_job, run_job, start_job, TransferHandle};
pub use model::{CopyTask, JobState, TaskResult, TransferJob};
pub use progress::{
    dispatch_event, JobOutcome, ProgressCallback, ProgressSnapshot, TransferEvent,
};

//! subgen - batch subtitle generation for remote videos and local audio files
//!
//! This library orchestrates two external tools over a batch of work items:
//! yt-dlp extracts audio from remote references, whisper-cli transcribes the
//! audio into `.srt` subtitles. The orchestrator runs one external process at
//! a time, streams its output into an event channel, tolerates per-item
//! failure, and stays responsive to a user stop signal throughout.

pub mod batch;
pub mod cli;
pub mod config;
pub mod events;
pub mod orchestrator;
pub mod runner;
pub mod steps;
pub mod utils;

pub use batch::{Batch, BatchSummary, ItemOutcome, WorkItem};
pub use cli::{Cli, Commands};
pub use config::Config;
pub use events::{Event, Severity};
pub use orchestrator::BatchOrchestrator;

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to the batch orchestrator
#[derive(thiserror::Error, Debug)]
pub enum SubgenError {
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("A batch is already running")]
    AlreadyRunning,

    #[error("Batch contains no work items")]
    EmptyBatch,

    #[error("File operation failed: {0}")]
    FileError(String),
}

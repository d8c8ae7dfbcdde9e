//! Step executors.
//!
//! A step is one external-process invocation wrapped with a pre-flight
//! idempotence check and a post-run artifact check. The two production steps
//! live in `ytdlp` (audio extraction) and `whisper` (transcription); the
//! traits exist so the orchestrator can be exercised with synthetic steps.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use crate::events::Event;
use crate::runner::{ProcessRunner, StopSignal};

pub mod whisper;
pub mod ytdlp;

pub use whisper::WhisperTranscriber;
pub use ytdlp::YtDlpExtractor;

/// Outcome of one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// The artifact was already present and non-empty; no process was spawned
    Skipped(PathBuf),

    /// The step produced this artifact
    Succeeded(PathBuf),

    /// The step did not produce its artifact
    Failed(StepFailure),
}

/// Why a step failed. Recorded per item; never aborts the batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepFailure {
    #[error("failed to spawn process: {0}")]
    Spawn(String),

    #[error("process exited with code {0}")]
    ProcessFailed(i32),

    #[error("expected output artifact is missing or empty")]
    ArtifactMissing,

    #[error("cancelled by user")]
    Cancelled,
}

/// What a step needs from its surroundings: somewhere to log and a stop
/// signal to run its process against.
#[derive(Clone)]
pub struct StepContext {
    events: mpsc::UnboundedSender<Event>,
    stop: StopSignal,
}

impl StepContext {
    pub fn new(events: mpsc::UnboundedSender<Event>, stop: StopSignal) -> Self {
        Self { events, stop }
    }

    /// Forward one line to the observer. Sending never blocks; a dropped
    /// receiver just means nobody is watching.
    pub fn log(&self, text: impl Into<String>) {
        let _ = self.events.send(Event::log(text));
    }

    pub fn stop(&self) -> &StopSignal {
        &self.stop
    }

    pub fn runner(&self) -> ProcessRunner {
        ProcessRunner::new(self.stop.clone())
    }
}

/// Audio extraction: turn a remote reference into a local audio file
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    async fn extract(&self, url: &str, ctx: &StepContext) -> StepResult;
}

/// Transcription: turn an audio file into a subtitle file beside it
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Path, ctx: &StepContext) -> StepResult;
}

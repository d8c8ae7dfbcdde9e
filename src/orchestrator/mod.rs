//! Batch orchestration.
//!
//! One `BatchOrchestrator` drives one batch at a time on a background tokio
//! task: items run strictly in order, one external process in flight at any
//! moment, per-item failures recorded without aborting the batch. The
//! foreground only calls `start`/`stop` and drains the event channel.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::batch::{Batch, BatchSummary, ItemOutcome, WorkItem};
use crate::config::Config;
use crate::events::{Event, Severity};
use crate::runner::StopSignal;
use crate::steps::{
    AudioExtractor, StepContext, StepResult, Transcriber, WhisperTranscriber, YtDlpExtractor,
};
use crate::{Result, SubgenError};

/// Orchestrator lifecycle. `StopRequested` means the in-flight step has been
/// asked to terminate and no new item will start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    StopRequested,
}

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOP_REQUESTED: u8 = 2;

#[derive(Clone)]
pub struct BatchOrchestrator {
    events: mpsc::UnboundedSender<Event>,
    state: Arc<AtomicU8>,
    stop: StopSignal,
}

impl BatchOrchestrator {
    /// Create an orchestrator and the receiving end of its event channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (events, rx) = mpsc::unbounded_channel();
        let orchestrator = Self {
            events,
            state: Arc::new(AtomicU8::new(STATE_IDLE)),
            stop: StopSignal::new(),
        };
        (orchestrator, rx)
    }

    pub fn state(&self) -> RunState {
        match self.state.load(Ordering::SeqCst) {
            STATE_RUNNING => RunState::Running,
            STATE_STOP_REQUESTED => RunState::StopRequested,
            _ => RunState::Idle,
        }
    }

    /// Start a batch with the production steps (yt-dlp + whisper-cli)
    pub fn start(&self, batch: Batch, config: Config) -> Result<JoinHandle<BatchSummary>> {
        let extractor = YtDlpExtractor::new(&config);
        let transcriber = WhisperTranscriber::new(&config);
        self.start_with(batch, config, extractor, transcriber)
    }

    /// Start a batch with caller-supplied step executors.
    ///
    /// Validates the config and claims the `Running` slot before spawning
    /// anything; refuses a second batch while one is in flight.
    pub fn start_with<E, T>(
        &self,
        batch: Batch,
        config: Config,
        extractor: E,
        transcriber: T,
    ) -> Result<JoinHandle<BatchSummary>>
    where
        E: AudioExtractor + 'static,
        T: Transcriber + 'static,
    {
        if batch.is_empty() {
            return Err(SubgenError::EmptyBatch.into());
        }

        // Claim the slot first so two concurrent starts can't both validate
        if self
            .state
            .compare_exchange(STATE_IDLE, STATE_RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SubgenError::AlreadyRunning.into());
        }

        if let Err(err) = config.validate() {
            self.send(Event::status(err.to_string(), Severity::Error));
            self.state.store(STATE_IDLE, Ordering::SeqCst);
            return Err(err.into());
        }

        if let Err(err) = fs_err::create_dir_all(&config.output_dir) {
            let msg = format!("Cannot create output directory: {}", err);
            self.send(Event::status(msg.clone(), Severity::Error));
            self.state.store(STATE_IDLE, Ordering::SeqCst);
            return Err(SubgenError::FileError(msg).into());
        }

        self.stop.reset();
        info!(items = batch.len(), "starting batch");

        let this = self.clone();
        Ok(tokio::spawn(async move {
            let summary = this.run_batch(batch, extractor, transcriber).await;
            this.state.store(STATE_IDLE, Ordering::SeqCst);
            summary
        }))
    }

    /// Request a stop: no new item starts and the in-flight process is
    /// terminated. Items not yet started are never attempted.
    pub fn stop(&self) {
        if self
            .state
            .compare_exchange(
                STATE_RUNNING,
                STATE_STOP_REQUESTED,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
        {
            info!("stop requested, terminating in-flight process");
            self.stop.trigger();
        } else {
            warn!("stop requested but no batch is running");
        }
    }

    fn send(&self, event: Event) {
        let _ = self.events.send(event);
    }

    async fn run_batch<E, T>(&self, batch: Batch, extractor: E, transcriber: T) -> BatchSummary
    where
        E: AudioExtractor,
        T: Transcriber,
    {
        let ctx = StepContext::new(self.events.clone(), self.stop.clone());
        let total = batch.len();
        let mut succeeded = 0;

        self.send(Event::ProgressStarted);

        for (idx, item) in batch.items().iter().enumerate() {
            if self.stop.is_stopped() {
                break;
            }

            let position = idx + 1;
            self.send(Event::status(
                format!("Processing {}/{}: {}", position, total, item),
                Severity::Working,
            ));
            ctx.log("=".repeat(60));
            ctx.log(format!("Item {}/{}: {}", position, total, item));

            let outcome = self.run_item(item, &ctx, &extractor, &transcriber).await;
            match &outcome {
                ItemOutcome::Succeeded(subtitle) => {
                    succeeded += 1;
                    ctx.log(format!("✓ Subtitle ready: {}", subtitle.display()));
                }
                ItemOutcome::Failed => {
                    ctx.log("✗ Item failed");
                }
            }
            info!(item = %item, success = outcome.is_success(), "item finished");
        }

        let stopped = self.stop.is_stopped();
        self.send(Event::ProgressStopped);

        if stopped {
            self.send(Event::status("Stopped", Severity::Error));
            ctx.log("Processing stopped by user");
        } else {
            self.send(Event::status(
                format!("Done. {}/{} succeeded", succeeded, total),
                Severity::Success,
            ));
            ctx.log("=".repeat(60));
            ctx.log(format!("All done: {}/{} items succeeded", succeeded, total));
            self.send(Event::Notice {
                title: "Complete".to_string(),
                message: format!("Successfully processed {}/{} items", succeeded, total),
            });
        }

        let summary = BatchSummary {
            total,
            succeeded,
            stopped,
        };
        self.send(Event::Summary(summary.clone()));
        summary
    }

    async fn run_item<E, T>(
        &self,
        item: &WorkItem,
        ctx: &StepContext,
        extractor: &E,
        transcriber: &T,
    ) -> ItemOutcome
    where
        E: AudioExtractor,
        T: Transcriber,
    {
        let audio: PathBuf = match item {
            WorkItem::RemoteReference(url) => {
                ctx.log("Step 1: extracting audio...");
                match extractor.extract(url, ctx).await {
                    StepResult::Succeeded(path) | StepResult::Skipped(path) => {
                        ctx.log(format!("✓ Audio ready: {}", path.display()));
                        path
                    }
                    StepResult::Failed(failure) => {
                        ctx.log(format!("✗ Audio extraction failed: {}", failure));
                        return ItemOutcome::Failed;
                    }
                }
            }
            WorkItem::LocalFile(path) => {
                if !path.is_file() {
                    ctx.log(format!("✗ Audio file does not exist: {}", path.display()));
                    return ItemOutcome::Failed;
                }
                path.clone()
            }
        };

        if self.stop.is_stopped() {
            return ItemOutcome::Failed;
        }

        ctx.log("Step 2: generating subtitles...");
        match transcriber.transcribe(&audio, ctx).await {
            StepResult::Succeeded(subtitle) | StepResult::Skipped(subtitle) => {
                ItemOutcome::Succeeded(subtitle)
            }
            StepResult::Failed(failure) => {
                ctx.log(format!("✗ Transcription failed: {}", failure));
                ItemOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::StepFailure;
    use async_trait::async_trait;
    use std::io::Write;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn valid_config(dir: &Path) -> Config {
        let touch = |name: &str| {
            let path = dir.join(name);
            let mut f = std::fs::File::create(&path).unwrap();
            writeln!(f, "x").unwrap();
            path
        };

        Config {
            output_dir: dir.join("out"),
            cookies_file: None,
            use_cookies: false,
            yt_dlp_path: PathBuf::from("yt-dlp"),
            ffmpeg_location: PathBuf::from("/usr/bin"),
            whisper_bin: touch("whisper-cli"),
            whisper_model: touch("model.bin"),
            language: "zh".to_string(),
            threads: 16,
            processors: 1,
        }
    }

    fn remote_batch(n: usize) -> Batch {
        Batch::new(
            (0..n)
                .map(|i| WorkItem::RemoteReference(format!("https://example/video{}", i)))
                .collect(),
        )
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Extractor that always "produces" an audio path, counting calls
    struct StubExtractor {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AudioExtractor for StubExtractor {
        async fn extract(&self, url: &str, ctx: &StepContext) -> StepResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ctx.log(format!("stub extract {}", url));
            let name = url.rsplit('/').next().unwrap_or("audio");
            StepResult::Succeeded(PathBuf::from(format!("/synthetic/{}.mp3", name)))
        }
    }

    /// Transcriber that succeeds, or fails for the first `fail_first` calls
    struct StubTranscriber {
        calls: Arc<AtomicUsize>,
        fail_first: usize,
    }

    #[async_trait]
    impl Transcriber for StubTranscriber {
        async fn transcribe(&self, audio: &Path, ctx: &StepContext) -> StepResult {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            ctx.log(format!("stub transcribe {}", audio.display()));
            if call < self.fail_first {
                StepResult::Failed(StepFailure::ProcessFailed(1))
            } else {
                StepResult::Succeeded(WhisperTranscriber::subtitle_path(audio))
            }
        }
    }

    /// Extractor that blocks until the batch is stopped
    struct BlockingExtractor {
        calls: Arc<AtomicUsize>,
        started: Arc<Notify>,
    }

    #[async_trait]
    impl AudioExtractor for BlockingExtractor {
        async fn extract(&self, _url: &str, ctx: &StepContext) -> StepResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.notify_one();
            while !ctx.stop().is_stopped() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            StepResult::Failed(StepFailure::Cancelled)
        }
    }

    #[tokio::test]
    async fn test_all_success_counts_every_item() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, mut rx) = BatchOrchestrator::new();

        let summary = orchestrator
            .start_with(
                remote_batch(3),
                valid_config(dir.path()),
                StubExtractor {
                    calls: Arc::new(AtomicUsize::new(0)),
                },
                StubTranscriber {
                    calls: Arc::new(AtomicUsize::new(0)),
                    fail_first: 0,
                },
            )
            .unwrap()
            .await
            .unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 3);
        assert!(!summary.stopped);
        assert_eq!(orchestrator.state(), RunState::Idle);

        let events = drain(&mut rx);
        assert!(matches!(events.last(), Some(Event::Summary(_))));
        let status_count = events
            .iter()
            .filter(|e| matches!(e, Event::StatusChanged { severity: Severity::Working, .. }))
            .count();
        assert_eq!(status_count, 3);
    }

    #[tokio::test]
    async fn test_item_failure_does_not_abort_batch() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, _rx) = BatchOrchestrator::new();

        let extract_calls = Arc::new(AtomicUsize::new(0));
        let summary = orchestrator
            .start_with(
                remote_batch(3),
                valid_config(dir.path()),
                StubExtractor {
                    calls: Arc::clone(&extract_calls),
                },
                StubTranscriber {
                    calls: Arc::new(AtomicUsize::new(0)),
                    fail_first: 1,
                },
            )
            .unwrap()
            .await
            .unwrap();

        // First item failed, the other two still ran and succeeded
        assert_eq!(summary.succeeded, 2);
        assert_eq!(extract_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stop_prevents_later_items() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, mut rx) = BatchOrchestrator::new();

        let calls = Arc::new(AtomicUsize::new(0));
        let started = Arc::new(Notify::new());

        let handle = orchestrator
            .start_with(
                remote_batch(3),
                valid_config(dir.path()),
                BlockingExtractor {
                    calls: Arc::clone(&calls),
                    started: Arc::clone(&started),
                },
                StubTranscriber {
                    calls: Arc::new(AtomicUsize::new(0)),
                    fail_first: 0,
                },
            )
            .unwrap();

        started.notified().await;
        assert_eq!(orchestrator.state(), RunState::Running);
        orchestrator.stop();
        assert_eq!(orchestrator.state(), RunState::StopRequested);

        let summary = handle.await.unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 0);
        assert!(summary.stopped);

        // Items after the in-flight one were never started
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(orchestrator.state(), RunState::Idle);

        let events = drain(&mut rx);
        assert!(matches!(events.last(), Some(Event::Summary(_))));
        assert!(!events
            .iter()
            .any(|e| matches!(e, Event::Notice { .. })));
    }

    #[tokio::test]
    async fn test_second_start_is_refused_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, _rx) = BatchOrchestrator::new();

        let started = Arc::new(Notify::new());
        let handle = orchestrator
            .start_with(
                remote_batch(1),
                valid_config(dir.path()),
                BlockingExtractor {
                    calls: Arc::new(AtomicUsize::new(0)),
                    started: Arc::clone(&started),
                },
                StubTranscriber {
                    calls: Arc::new(AtomicUsize::new(0)),
                    fail_first: 0,
                },
            )
            .unwrap();

        started.notified().await;
        let second = orchestrator.start(remote_batch(1), valid_config(dir.path()));
        assert!(second.is_err());

        orchestrator.stop();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_config_aborts_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, mut rx) = BatchOrchestrator::new();

        let mut config = valid_config(dir.path());
        config.whisper_model = dir.path().join("missing-model.bin");

        let calls = Arc::new(AtomicUsize::new(0));
        let result = orchestrator.start_with(
            remote_batch(2),
            config,
            StubExtractor {
                calls: Arc::clone(&calls),
            },
            StubTranscriber {
                calls: Arc::new(AtomicUsize::new(0)),
                fail_first: 0,
            },
        );

        assert!(result.is_err());
        assert_eq!(orchestrator.state(), RunState::Idle);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let events = drain(&mut rx);
        assert!(matches!(
            events.as_slice(),
            [Event::StatusChanged {
                severity: Severity::Error,
                ..
            }]
        ));
    }

    #[tokio::test]
    async fn test_empty_batch_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, _rx) = BatchOrchestrator::new();

        let result = orchestrator.start(Batch::default(), valid_config(dir.path()));
        assert!(result.is_err());
        assert_eq!(orchestrator.state(), RunState::Idle);
    }

    #[tokio::test]
    async fn test_missing_local_file_fails_item_only() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, _rx) = BatchOrchestrator::new();

        let audio = dir.path().join("present.mp3");
        std::fs::write(&audio, b"audio").unwrap();

        let batch = Batch::new(vec![
            WorkItem::LocalFile(dir.path().join("absent.mp3")),
            WorkItem::LocalFile(audio),
        ]);

        let summary = orchestrator
            .start_with(
                batch,
                valid_config(dir.path()),
                StubExtractor {
                    calls: Arc::new(AtomicUsize::new(0)),
                },
                StubTranscriber {
                    calls: Arc::new(AtomicUsize::new(0)),
                    fail_first: 0,
                },
            )
            .unwrap()
            .await
            .unwrap();

        assert_eq!(summary.total, 2);
        assert_eq!(summary.succeeded, 1);
    }
}

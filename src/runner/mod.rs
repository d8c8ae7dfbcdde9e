//! External process execution.
//!
//! `ProcessRunner` owns the one mechanism every step shares: spawn a command,
//! stream its stdout and stderr line-by-line into a callback as they are
//! produced, and resolve with an exit status. Cancellation is cooperative and
//! process-directed: a triggered `StopSignal` kills the in-flight child so the
//! blocking read unblocks promptly.

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

/// How long a cancelled run waits for the child to be reaped before issuing
/// a second kill. The run resolves `Cancelled` either way.
pub const KILL_GRACE: Duration = Duration::from_secs(5);

/// Shared cancellation primitive: a latched flag for boundary checks plus a
/// broadcast channel that unblocks an in-flight process read.
#[derive(Debug, Clone)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
    tx: broadcast::Sender<()>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            tx,
        }
    }

    /// Latch the stop flag and wake any in-flight run
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        let _ = self.tx.send(());
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear the latch for a fresh batch
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors the runner itself can produce. Spawn failure is kept distinct from
/// a process that ran and exited non-zero.
#[derive(thiserror::Error, Debug)]
pub enum RunnerError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Terminal status of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The process ran to completion with this exit code (-1 when killed by
    /// a signal outside our control)
    Exited(i32),

    /// The run was cancelled via the stop signal; the real exit code is
    /// deliberately not reported
    Cancelled,
}

/// Runs one external command at a time against a shared stop signal
pub struct ProcessRunner {
    stop: StopSignal,
}

impl ProcessRunner {
    pub fn new(stop: StopSignal) -> Self {
        Self { stop }
    }

    /// Spawn `program` with `args`, forwarding each output line (stdout and
    /// stderr, as produced) to `on_line`, and wait for it to finish.
    pub async fn run(
        &self,
        program: &Path,
        args: &[String],
        working_dir: Option<&Path>,
        mut on_line: impl FnMut(&str),
    ) -> Result<RunStatus, RunnerError> {
        // Subscribe before the flag check so a trigger can't slip between them
        let mut shutdown_rx = self.stop.subscribe();
        if self.stop.is_stopped() {
            return Ok(RunStatus::Cancelled);
        }

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
            program: program.display().to_string(),
            source,
        })?;

        // Both pipes feed one line channel; the channel closes when both hit EOF
        let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, line_tx.clone()));
        }
        drop(line_tx);

        let mut cancelled = false;

        loop {
            tokio::select! {
                line = line_rx.recv() => match line {
                    Some(line) => on_line(&line),
                    None => break,
                },
                _ = shutdown_rx.recv(), if !cancelled => {
                    cancelled = true;
                    let _ = child.start_kill();
                }
            }
        }

        if cancelled {
            // Bounded grace for the reap, then kill again and wait it out
            if timeout(KILL_GRACE, child.wait()).await.is_err() {
                let _ = child.kill().await;
                let _ = child.wait().await;
            }
            return Ok(RunStatus::Cancelled);
        }

        let status = child.wait().await?;
        Ok(RunStatus::Exited(status.code().unwrap_or(-1)))
    }
}

async fn forward_lines(stream: impl AsyncRead + Unpin, tx: mpsc::UnboundedSender<String>) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).is_err() {
            break;
        }
    }
}

//! Transcription step backed by whisper-cli (whisper.cpp).
//!
//! The subtitle lands at `<audio>.srt` because whisper-cli writes relative to
//! its input; the process runs with the audio file's directory as its working
//! directory so that stays true. Unlike extraction, the exit code here is
//! authoritative; a zero exit is still validated against a non-empty `.srt`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{StepContext, StepFailure, StepResult, Transcriber};
use crate::config::Config;
use crate::runner::{RunStatus, RunnerError};
use crate::utils::is_non_empty_file;

/// Process output lines kept around for failure diagnosis
const OUTPUT_TAIL_LINES: usize = 20;

pub struct WhisperTranscriber {
    whisper_bin: PathBuf,
    whisper_model: PathBuf,
    language: String,
    threads: u32,
    processors: u32,
}

impl WhisperTranscriber {
    pub fn new(config: &Config) -> Self {
        Self {
            whisper_bin: config.whisper_bin.clone(),
            whisper_model: config.whisper_model.clone(),
            language: config.language.clone(),
            threads: config.threads,
            processors: config.processors,
        }
    }

    /// Derived subtitle path: the audio path with `.srt` appended
    pub fn subtitle_path(audio: &Path) -> PathBuf {
        let mut os = audio.as_os_str().to_os_string();
        os.push(".srt");
        PathBuf::from(os)
    }

    fn build_args(&self, audio: &Path) -> Vec<String> {
        vec![
            "-m".to_string(),
            self.whisper_model.to_string_lossy().to_string(),
            "-f".to_string(),
            audio.to_string_lossy().to_string(),
            "-l".to_string(),
            self.language.clone(),
            "-osrt".to_string(),
            "-t".to_string(),
            self.threads.to_string(),
            "-p".to_string(),
            self.processors.to_string(),
        ]
    }

    /// Progress and diagnostic markers worth forwarding to the observer;
    /// everything else is noise at transcription verbosity
    fn is_progress_line(line: &str) -> bool {
        line.contains("whisper_print_progress") || line.contains('[')
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: &Path, ctx: &StepContext) -> StepResult {
        let subtitle = Self::subtitle_path(audio);

        if is_non_empty_file(&subtitle) {
            ctx.log(format!(
                "Subtitle already exists, skipping: {}",
                subtitle
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| subtitle.display().to_string())
            ));
            return StepResult::Skipped(subtitle);
        }

        let args = self.build_args(audio);
        ctx.log(format!(
            "Running: {} {}",
            self.whisper_bin.display(),
            args.join(" ")
        ));

        let mut tail: Vec<String> = Vec::new();
        let result = ctx
            .runner()
            .run(&self.whisper_bin, &args, audio.parent(), |line| {
                let line = line.trim();
                if line.is_empty() {
                    return;
                }
                tracing::debug!(target: "subgen::whisper", "{}", line);
                if tail.len() == OUTPUT_TAIL_LINES {
                    tail.remove(0);
                }
                tail.push(line.to_string());
                if Self::is_progress_line(line) {
                    ctx.log(format!("  {}", line));
                }
            })
            .await;

        match result {
            Ok(RunStatus::Cancelled) => StepResult::Failed(StepFailure::Cancelled),
            Ok(RunStatus::Exited(0)) => {
                if is_non_empty_file(&subtitle) {
                    StepResult::Succeeded(subtitle)
                } else {
                    ctx.log("Subtitle file was not generated".to_string());
                    StepResult::Failed(StepFailure::ArtifactMissing)
                }
            }
            Ok(RunStatus::Exited(code)) => {
                ctx.log(format!("Transcription failed, exit code: {}", code));
                for line in &tail {
                    ctx.log(format!("  | {}", line));
                }
                StepResult::Failed(StepFailure::ProcessFailed(code))
            }
            Err(RunnerError::Spawn { program, source }) => {
                ctx.log(format!("Failed to start {}: {}", program, source));
                StepResult::Failed(StepFailure::Spawn(source.to_string()))
            }
            Err(RunnerError::Io(err)) => {
                ctx.log(format!("Error while reading whisper output: {}", err));
                StepResult::Failed(StepFailure::ProcessFailed(-1))
            }
        }
    }
}

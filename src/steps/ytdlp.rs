//! Audio extraction step backed by yt-dlp.
//!
//! yt-dlp's exit code is advisory only: it exits non-zero on benign warnings
//! after a successful write, so the artifact scan is authoritative here. The
//! remote title is unknown before invocation, which is why the step never
//! tries a filename-based skip and instead relies on yt-dlp's own resume
//! semantics.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::SystemTime;

use super::{AudioExtractor, StepContext, StepFailure, StepResult};
use crate::config::Config;
use crate::runner::{RunStatus, RunnerError};

pub struct YtDlpExtractor {
    yt_dlp_path: PathBuf,
    ffmpeg_location: PathBuf,
    output_dir: PathBuf,
    cookies_file: Option<PathBuf>,
    use_cookies: bool,
}

impl YtDlpExtractor {
    pub fn new(config: &Config) -> Self {
        Self {
            yt_dlp_path: config.yt_dlp_path.clone(),
            ffmpeg_location: config.ffmpeg_location.clone(),
            output_dir: config.output_dir.clone(),
            cookies_file: config.cookies_file.clone(),
            use_cookies: config.use_cookies,
        }
    }

    fn build_args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "-x".to_string(),
            "--audio-format".to_string(),
            "mp3".to_string(),
            "--ffmpeg-location".to_string(),
            self.ffmpeg_location.to_string_lossy().to_string(),
            "-o".to_string(),
            format!("{}/%(title)s.%(ext)s", self.output_dir.display()),
        ];

        // The cookies file is checked per invocation; it may appear or
        // disappear between items
        if self.use_cookies {
            if let Some(cookies) = &self.cookies_file {
                if cookies.exists() {
                    args.push("--cookies".to_string());
                    args.push(cookies.to_string_lossy().to_string());
                }
            }
        }

        args.push(url.to_string());
        args
    }

    /// Most recently modified `*.mp3` in the output directory, if any
    fn newest_audio_file(&self) -> Option<PathBuf> {
        let entries = std::fs::read_dir(&self.output_dir).ok()?;

        entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .map(|ext| ext.eq_ignore_ascii_case("mp3"))
                        .unwrap_or(false)
            })
            .max_by_key(|path| {
                std::fs::metadata(path)
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH)
            })
    }
}

#[async_trait]
impl AudioExtractor for YtDlpExtractor {
    async fn extract(&self, url: &str, ctx: &StepContext) -> StepResult {
        let args = self.build_args(url);
        ctx.log(format!(
            "Running: {} {}",
            self.yt_dlp_path.display(),
            args.join(" ")
        ));

        let result = ctx
            .runner()
            .run(&self.yt_dlp_path, &args, None, |line| {
                let line = line.trim();
                if !line.is_empty() {
                    ctx.log(format!("  {}", line));
                }
            })
            .await;

        let exit_code = match result {
            Ok(RunStatus::Cancelled) => {
                // A partial artifact from a cancelled download is not trusted
                return StepResult::Failed(StepFailure::Cancelled);
            }
            Ok(RunStatus::Exited(code)) => code,
            Err(RunnerError::Spawn { program, source }) => {
                ctx.log(format!("Failed to start {}: {}", program, source));
                return StepResult::Failed(StepFailure::Spawn(source.to_string()));
            }
            Err(RunnerError::Io(err)) => {
                // The write may still have landed before the pipe broke, so
                // fall through to the artifact scan
                ctx.log(format!("Error while reading yt-dlp output: {}", err));
                -1
            }
        };

        match self.newest_audio_file() {
            Some(artifact) => {
                if exit_code != 0 {
                    tracing::warn!(
                        exit_code,
                        artifact = %artifact.display(),
                        "yt-dlp exited non-zero but produced an audio file"
                    );
                    ctx.log(format!(
                        "Warning: yt-dlp exited with code {} but {} is present; continuing",
                        exit_code,
                        artifact.display()
                    ));
                }
                StepResult::Succeeded(artifact)
            }
            None => {
                ctx.log("No downloaded MP3 file found".to_string());
                if exit_code != 0 {
                    StepResult::Failed(StepFailure::ProcessFailed(exit_code))
                } else {
                    StepResult::Failed(StepFailure::ArtifactMissing)
                }
            }
        }
    }
}

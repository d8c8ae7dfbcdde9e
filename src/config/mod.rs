use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::utils::find_executable;
use crate::SubgenError;

/// Configuration for a batch run.
///
/// Read once when a batch starts and never mutated during a run. Tool paths
/// are taken as given here; `Config::default` fills them from a PATH lookup
/// but callers are free to override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory audio and subtitle artifacts are written into
    pub output_dir: PathBuf,

    /// Cookies file handed to yt-dlp when `use_cookies` is set
    pub cookies_file: Option<PathBuf>,

    /// Pass the cookies file to yt-dlp (only if it exists on disk)
    pub use_cookies: bool,

    /// yt-dlp binary
    pub yt_dlp_path: PathBuf,

    /// Directory containing ffmpeg, passed via --ffmpeg-location
    pub ffmpeg_location: PathBuf,

    /// whisper-cli binary
    pub whisper_bin: PathBuf,

    /// whisper.cpp model file
    pub whisper_model: PathBuf,

    /// Transcription language code
    pub language: String,

    /// Thread-count hint for whisper-cli
    pub threads: u32,

    /// Parallel-decode hint for whisper-cli
    pub processors: u32,
}

impl Default for Config {
    fn default() -> Self {
        let downloads = dirs::download_dir().unwrap_or_else(|| PathBuf::from("."));
        let ffmpeg = find_executable("ffmpeg");
        let ffmpeg_location = ffmpeg
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("/usr/local/bin"));

        Self {
            output_dir: downloads.join("subtitles"),
            cookies_file: Some(downloads.join("youtube-cookies.txt")),
            use_cookies: true,
            yt_dlp_path: find_executable("yt-dlp"),
            ffmpeg_location,
            whisper_bin: PathBuf::from("/tmp/whisper.cpp/build/bin/whisper-cli"),
            whisper_model: PathBuf::from("/tmp/whisper.cpp/models/ggml-base-q5_1.bin"),
            language: "zh".to_string(),
            threads: 16,
            processors: 1,
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content =
                fs_err::read_to_string(&config_path).context("Failed to read config file")?;

            let config: Config =
                serde_yaml::from_str(&content).context("Failed to parse config file")?;

            Ok(config)
        } else {
            let config = Self::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("subgen").join("config.yaml"))
    }

    /// Validate configuration before a batch starts.
    ///
    /// Invalid config aborts the batch attempt before any process is spawned.
    pub fn validate(&self) -> std::result::Result<(), SubgenError> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(SubgenError::ConfigInvalid(
                "output directory is not set".to_string(),
            ));
        }

        if self.yt_dlp_path.as_os_str().is_empty() {
            return Err(SubgenError::ConfigInvalid(
                "yt-dlp path is not set".to_string(),
            ));
        }

        if !self.whisper_bin.exists() {
            return Err(SubgenError::ConfigInvalid(format!(
                "whisper binary does not exist: {}",
                self.whisper_bin.display()
            )));
        }

        if !self.whisper_model.exists() {
            return Err(SubgenError::ConfigInvalid(format!(
                "whisper model does not exist: {}",
                self.whisper_model.display()
            )));
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Output Directory: {}", self.output_dir.display());
        if let Some(cookies) = &self.cookies_file {
            println!("  Cookies File: {} (enabled: {})", cookies.display(), self.use_cookies);
        }
        println!("  yt-dlp: {}", self.yt_dlp_path.display());
        println!("  ffmpeg Location: {}", self.ffmpeg_location.display());
        println!("  Whisper Binary: {}", self.whisper_bin.display());
        println!("  Whisper Model: {}", self.whisper_model.display());
        println!("  Language: {}", self.language);
        println!("  Threads: {}", self.threads);
        println!("  Processors: {}", self.processors);
    }
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "subgen",
    about = "Batch subtitle generator - yt-dlp audio extraction + whisper.cpp transcription",
    version,
    long_about = "Turns video URLs and local audio files into .srt subtitles by driving \
yt-dlp (audio extraction) and whisper-cli (speech-to-text) over a batch of items. \
Already-transcribed files are skipped, failed items are recorded without aborting \
the batch, and Ctrl-C stops the run cleanly."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print orchestrator events as JSON lines instead of formatted output
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process a batch of video URLs and/or local audio files
    Run {
        /// Video URL to process (repeatable)
        #[arg(short, long, value_name = "URL")]
        url: Vec<String>,

        /// File containing URLs, one per line
        #[arg(short, long, value_name = "FILE")]
        batch_file: Option<PathBuf>,

        /// Local audio files to transcribe
        #[arg(value_name = "AUDIO_FILE")]
        files: Vec<PathBuf>,

        /// Output directory for audio and subtitle files
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Cookies file passed to yt-dlp
        #[arg(long, value_name = "FILE")]
        cookies: Option<PathBuf>,

        /// Do not pass a cookies file to yt-dlp
        #[arg(long, conflicts_with = "cookies")]
        no_cookies: bool,

        /// Path to the whisper-cli binary
        #[arg(long, value_name = "PATH")]
        whisper_bin: Option<PathBuf>,

        /// Path to the whisper.cpp model file
        #[arg(long, value_name = "PATH")]
        whisper_model: Option<PathBuf>,

        /// Transcription language code
        #[arg(short, long, value_name = "LANG")]
        language: Option<String>,
    },

    /// Show or initialize the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}

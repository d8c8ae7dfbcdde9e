use anyhow::Result;
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use subgen::batch::Batch;
use subgen::cli::{Cli, Commands};
use subgen::config::Config;
use subgen::events::{Event, Severity};
use subgen::orchestrator::BatchOrchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose { "subgen=debug" } else { "subgen=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Run {
            url,
            batch_file,
            files,
            output_dir,
            cookies,
            no_cookies,
            whisper_bin,
            whisper_model,
            language,
        } => {
            let mut config = Config::load()?;
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if let Some(cookies) = cookies {
                config.cookies_file = Some(cookies);
                config.use_cookies = true;
            }
            if no_cookies {
                config.use_cookies = false;
            }
            if let Some(bin) = whisper_bin {
                config.whisper_bin = bin;
            }
            if let Some(model) = whisper_model {
                config.whisper_model = model;
            }
            if let Some(language) = language {
                config.language = language;
            }

            let batch = assemble_batch(url, batch_file, files)?;
            run_batch(batch, config, cli.json).await?;
        }
        Commands::Config { show } => {
            let config = Config::load()?;
            if show {
                config.display();
            } else {
                config.save()?;
                println!("Configuration file written; edit it and rerun with --show to review.");
            }
        }
    }

    Ok(())
}

/// Collect URLs from flags and the batch file (deduplicated in order, the
/// batch does its own pass too) plus positional local files.
fn assemble_batch(
    mut urls: Vec<String>,
    batch_file: Option<PathBuf>,
    files: Vec<PathBuf>,
) -> Result<Batch> {
    if let Some(path) = batch_file {
        let content = fs_err::read_to_string(&path)?;
        for line in content.lines() {
            let line = line.trim();
            if !line.is_empty() {
                urls.push(line.to_string());
            }
        }
    }

    let batch = Batch::from_inputs(&urls, &files)?;
    if batch.is_empty() {
        anyhow::bail!("Nothing to process: provide --url, --batch-file, or audio files");
    }
    Ok(batch)
}

async fn run_batch(batch: Batch, config: Config, json: bool) -> Result<()> {
    let (orchestrator, mut events) = BatchOrchestrator::new();

    tracing::info!(items = batch.len(), "starting batch run");
    let handle = orchestrator.start(batch, config)?;

    // Ctrl-C maps to a cooperative stop; the in-flight process is terminated
    let stopper = orchestrator.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nStop requested, finishing current step...");
            stopper.stop();
        }
    });

    let mut spinner: Option<ProgressBar> = None;
    while let Some(event) = events.recv().await {
        let done = matches!(event, Event::Summary(_));
        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            render_event(&event, &mut spinner);
        }
        if done {
            break;
        }
    }

    let summary = handle.await?;
    if summary.succeeded == 0 && !summary.stopped {
        anyhow::bail!("no items succeeded");
    }
    Ok(())
}

fn render_event(event: &Event, spinner: &mut Option<ProgressBar>) {
    match event {
        Event::LogLine { text } => {
            let line = format!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), text);
            match spinner {
                Some(pb) => pb.println(line),
                None => println!("{}", line),
            }
        }
        Event::StatusChanged { text, severity } => {
            let styled = match severity {
                Severity::Info => style(text).dim().to_string(),
                Severity::Working => style(text).cyan().to_string(),
                Severity::Success => style(text).green().bold().to_string(),
                Severity::Error => style(text).red().bold().to_string(),
            };
            match spinner {
                Some(pb) => pb.set_message(styled),
                None => println!("{}", styled),
            }
        }
        Event::ProgressStarted => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {msg}")
                    .unwrap(),
            );
            pb.enable_steady_tick(Duration::from_millis(100));
            *spinner = Some(pb);
        }
        Event::ProgressStopped => {
            if let Some(pb) = spinner.take() {
                pb.finish_and_clear();
            }
        }
        Event::Notice { title, message } => {
            println!("{}: {}", style(title).bold(), message);
        }
        Event::Summary(summary) => {
            let line = format!(
                "{}/{} items succeeded{}",
                summary.succeeded,
                summary.total,
                if summary.stopped { " (stopped)" } else { "" }
            );
            if summary.succeeded == summary.total && !summary.stopped {
                println!("{}", style(line).green());
            } else {
                println!("{}", style(line).yellow());
            }
        }
    }
}

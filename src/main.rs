use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use mediadubs::config::{DubConfig, WhisperModel};
use mediadubs::progress::ProgressUpdate;
use mediadubs::utils::logger::init_logger;
use mediadubs::Dubber;

/// Dub a video into another language with a local voice
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Video file to dub
    video: PathBuf,

    /// Language spoken in the video
    #[arg(long = "src")]
    source_lang: String,

    /// Language of the dub
    #[arg(long = "tgt")]
    target_lang: String,

    /// Piper voice model (.onnx, with its .onnx.json next to it)
    #[arg(long)]
    voice: PathBuf,

    /// Whisper model: tiny, base, small, medium or large
    #[arg(short, long)]
    model: Option<String>,

    /// Number of intervals rendered at once
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Per-stage time limit in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn load_config(&self) -> Result<DubConfig> {
        let mut config = match &self.config {
            Some(path) => DubConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => DubConfig::default(),
        };

        if let Some(model) = &self.model {
            config.whisper_model = model.parse::<WhisperModel>()?;
        }
        if let Some(jobs) = self.jobs {
            config.max_concurrent_renders = jobs;
        }
        if let Some(timeout) = self.timeout {
            config.stage_timeout_secs = Some(timeout);
        }
        config.validate()?;
        Ok(config)
    }
}

async fn run(cli: Cli) -> Result<PathBuf> {
    let config = cli.load_config()?;

    let (tx, mut rx) = mpsc::channel(64);
    let dubber = Dubber::new(config)
        .context("failed to set up the dubbing toolchain")?
        .with_progress(tx);

    let progress = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            match update {
                ProgressUpdate::StageChanged(stage) => info!("Progress: {}", stage),
                ProgressUpdate::IntervalRendered { completed, total } => {
                    info!("Progress: rendered {}/{} intervals", completed, total)
                }
                ProgressUpdate::Finished { output } => {
                    info!("Progress: finished {}", output.display())
                }
            }
        }
    });

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling...");
            on_signal.cancel();
        }
    });

    let result = dubber
        .dub_with_cancel(
            &cli.video,
            &cli.source_lang,
            &cli.target_lang,
            &cli.voice,
            cancel,
        )
        .await;

    // закрываем канал, чтобы задача прогресса завершилась
    drop(dubber);
    let _ = progress.await;

    Ok(result?)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    match run(cli).await {
        Ok(output) => {
            println!("{}", output.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

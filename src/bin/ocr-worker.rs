//! CLI binary for ocr-worker.
//!
//! Maps flags and environment variables (optionally loaded from `.env`) to a
//! `WorkerConfig`, then runs the task loop and the throughput monitor until
//! Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use ocr_worker::{
    redact_url, shutdown, Collaborators, ThroughputCounters, ThroughputMonitor, Worker,
    WorkerConfig, WorkerProgressCallback,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ── Download progress bar ────────────────────────────────────────────────────

/// Renders one indicatif bar per in-flight download. Bars are cleared when
/// the download completes so they never interleave with log lines.
struct DownloadProgress {
    bars: Mutex<HashMap<i64, ProgressBar>>,
}

impl DownloadProgress {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bars: Mutex::new(HashMap::new()),
        })
    }

    fn bar_for(total: Option<u64>) -> ProgressBar {
        match total {
            Some(len) => {
                let bar = ProgressBar::new(len);
                bar.set_style(
                    ProgressStyle::with_template(
                        "{spinner:.cyan} {prefix:.bold}  [{bar:32.green/238}] \
                         {bytes}/{total_bytes}  {bytes_per_sec}  ETA {eta}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█▉▊▋▌▍▎▏  "),
                );
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {bytes}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar
            }
        }
    }
}

impl WorkerProgressCallback for DownloadProgress {
    fn on_download_start(&self, task_id: i64, total_bytes: Option<u64>) {
        let bar = Self::bar_for(total_bytes);
        bar.set_prefix(format!("Task {task_id}"));
        if let Ok(mut bars) = self.bars.lock() {
            bars.insert(task_id, bar);
        }
    }

    fn on_download_progress(&self, task_id: i64, downloaded: u64) {
        if let Ok(bars) = self.bars.lock() {
            if let Some(bar) = bars.get(&task_id) {
                bar.set_position(downloaded);
            }
        }
    }

    fn on_download_complete(&self, task_id: i64, _bytes: u64) {
        if let Ok(mut bars) = self.bars.lock() {
            if let Some(bar) = bars.remove(&task_id) {
                bar.finish_and_clear();
            }
        }
    }
}

// ── CLI definition ───────────────────────────────────────────────────────────

/// Poll a task queue and OCR the PDF documents it hands out.
#[derive(Parser, Debug)]
#[command(
    name = "ocr-worker",
    version,
    about = "Poll a task queue and OCR the PDF documents it hands out",
    long_about = "Fetches tasks from an HTTP queue, downloads each PDF, rasterises its pages \
with Ghostscript, recognises them with Tesseract under a concurrency ceiling, and submits the \
ordered page texts back. Requires pdfinfo, gs and tesseract on PATH.",
    color = clap::ColorChoice::Auto
)]
struct Cli {
    /// Working directory for downloads and page images. Must exist.
    #[arg(long, env = "INBOX_DIR", default_value = "./inbox")]
    inbox_dir: PathBuf,

    /// Prefix joined with each task's `uri` to download the document.
    #[arg(long, env = "BASE_FILE_URL", default_value = "http://localhost:8080/file/")]
    base_file_url: String,

    /// Endpoint polled for the next task.
    #[arg(long, env = "GET_TASK_URL", default_value = "http://localhost:8080/next")]
    task_url: String,

    /// Endpoint receiving assembled results.
    #[arg(long, env = "POST_RESULT_URL", default_value = "http://localhost:8080/result")]
    result_url: String,

    /// Maximum number of pages processed at once.
    #[arg(short, long, env = "CONCURRENCY", default_value_t = 4,
          value_parser = clap::value_parser!(u64).range(1..))]
    concurrency: u64,

    /// Tesseract language tag.
    #[arg(short, long, env = "TESSERACT_LANG", default_value = "lit+eng")]
    language: String,

    /// Rasterisation DPI (72–1200).
    #[arg(long, env = "RASTER_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=1200))]
    dpi: u32,

    /// Task poll timeout in seconds.
    #[arg(long, env = "FETCH_TIMEOUT", default_value_t = 5)]
    fetch_timeout: u64,

    /// Document download timeout in seconds.
    #[arg(long, env = "DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Result submission timeout in seconds.
    #[arg(long, env = "SUBMIT_TIMEOUT", default_value_t = 30)]
    submit_timeout: u64,

    /// Wait after an empty queue or failed poll, in milliseconds.
    #[arg(long, env = "POLL_BACKOFF_MS", default_value_t = 10_000)]
    poll_backoff_ms: u64,

    /// Interval between throughput log lines, in milliseconds.
    #[arg(long, env = "STATS_INTERVAL_MS", default_value_t = 1_000)]
    stats_interval_ms: u64,

    /// Value of the `source` field attached to every result.
    #[arg(long, env = "RESULT_SOURCE", default_value = "rust-worker")]
    result_source: String,

    /// Disable the download progress bar.
    #[arg(long, env = "NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // `.env` is optional; real environment variables take precedence.
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match dotenv {
        Ok(path) => info!("Loaded {}", path.display()),
        Err(e) if e.not_found() => warn!("No .env file found, using process environment only"),
        Err(e) => warn!("Could not load .env: {}", e),
    }

    // ── Configuration ────────────────────────────────────────────────────
    let mut builder = WorkerConfig::builder()
        .inbox_dir(&cli.inbox_dir)
        .base_file_url(cli.base_file_url)
        .task_url(cli.task_url)
        .result_url(cli.result_url)
        .concurrency(cli.concurrency as usize)
        .language(cli.language)
        .dpi(cli.dpi)
        .fetch_timeout_secs(cli.fetch_timeout)
        .download_timeout_secs(cli.download_timeout)
        .submit_timeout_secs(cli.submit_timeout)
        .poll_backoff_ms(cli.poll_backoff_ms)
        .stats_interval_ms(cli.stats_interval_ms)
        .result_source(cli.result_source);
    if !cli.no_progress {
        builder = builder.progress_callback(DownloadProgress::new());
    }
    let config = builder.build().context("Invalid configuration")?;
    config
        .check_startup()
        .context("Startup check failed")?;

    info!("Inbox: {}", config.inbox_dir.display());
    info!("Tasks from: {}", redact_url(&config.task_url));
    info!("Results to: {}", redact_url(&config.result_url));
    info!("Documents from: {}", redact_url(&config.base_file_url));

    // ── Run ──────────────────────────────────────────────────────────────
    let (trigger, shutdown) = shutdown::channel();
    let collaborators =
        Collaborators::from_config(&config, &shutdown).context("Failed to initialise")?;
    let counters = Arc::new(ThroughputCounters::new());

    let monitor = ThroughputMonitor::new(Arc::clone(&counters), config.stats_interval());
    let monitor = tokio::spawn(monitor.run(trigger.subscribe()));

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, finishing up");
                trigger.trigger();
            }
            // Dropping the trigger without firing leaves the worker running.
            Err(e) => warn!("Could not listen for Ctrl-C: {}", e),
        }
    });

    Worker::new(config, collaborators, counters, shutdown)
        .run()
        .await;

    if let Err(e) = monitor.await {
        warn!("Throughput monitor ended abnormally: {}", e);
    }
    Ok(())
}

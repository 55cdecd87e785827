//! # ocr-worker
//!
//! A long-running queue worker that turns PDF documents into per-page text
//! with Ghostscript and Tesseract.
//!
//! ## Task Loop
//!
//! ```text
//! task queue (HTTP)
//!  │
//!  ├─ 1. Fetch    poll for one task; back off when empty or unreachable
//!  ├─ 2. Stage    download the PDF into the inbox; count pages (pdfinfo)
//!  ├─ 3. Process  per page, at most C at once:
//!  │                rasterise (gs, grayscale PNG) → recognise (tesseract)
//!  ├─ 4. Assemble page texts in page order; any failed page rejects the task
//!  └─ 5. Report   submit {id, tekstas, duration, …}; count the document
//! ```
//!
//! Staged files are removed at the end of every cycle, whatever its outcome.
//! A [`ThroughputMonitor`] logs documents and pages per second alongside the
//! loop.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ocr_worker::{shutdown, Collaborators, ThroughputCounters, Worker, WorkerConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = WorkerConfig::builder()
//!         .inbox_dir("/var/lib/ocr/inbox")
//!         .task_url("http://queue.local/next")
//!         .result_url("http://queue.local/result")
//!         .build()?;
//!     config.check_startup()?;
//!
//!     let (_trigger, shutdown) = shutdown::channel();
//!     let collaborators = Collaborators::from_config(&config, &shutdown)?;
//!     let counters = Arc::new(ThroughputCounters::new());
//!     Worker::new(config, collaborators, counters, shutdown).run().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr-worker` binary (clap + anyhow + dotenvy + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assemble;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod queue;
pub mod shutdown;
pub mod stats;
pub mod worker;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assemble::assemble;
pub use config::{redact_url, WorkerConfig, WorkerConfigBuilder};
pub use error::{ErrorKind, PageError, TransformError, WorkerError};
pub use output::{DocumentResult, PageResult, Task};
pub use pipeline::bounded::BoundedPipeline;
pub use pipeline::input::{DocumentStore, HttpStore, PageSource, StagedDocument};
pub use pipeline::page::PageTransform;
pub use pipeline::recognize::{Recognizer, TesseractRecognizer};
pub use pipeline::render::{GhostscriptRasterizer, PageCounter, PdfinfoPageCounter, Rasterizer};
pub use progress::{NoopProgressCallback, ProgressCallback, WorkerProgressCallback};
pub use queue::{HttpQueue, TaskQueue};
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use stats::{ThroughputCounters, ThroughputMonitor, ThroughputSnapshot};
pub use worker::{Collaborators, CycleOutcome, Worker};

//! The task loop: fetch → stage → process → report, forever.
//!
//! One task is in flight at a time. Within a cycle every stage either hands
//! its output to the next or ends the cycle with a logged
//! [`CycleOutcome`]; nothing below a startup failure escapes
//! [`Worker::run_once`]. Staged files are released before the next fetch on
//! every path.
//!
//! ```text
//! Idle ─▶ Fetching ─▶ Staging ─▶ Processing ─▶ Reporting ─▶ Idle
//!            │           │            │             │
//!            └─ backoff  └────────────┴── abort ────┴─ drop result
//! ```

use crate::assemble::assemble;
use crate::config::{redact_url, WorkerConfig};
use crate::error::{ErrorKind, WorkerError};
use crate::output::{DocumentResult, Task};
use crate::pipeline::bounded::BoundedPipeline;
use crate::pipeline::input::{DocumentStore, HttpStore, StagedDocument};
use crate::pipeline::page::PageTransform;
use crate::pipeline::recognize::{Recognizer, TesseractRecognizer};
use crate::pipeline::render::{GhostscriptRasterizer, PageCounter, PdfinfoPageCounter, Rasterizer};
use crate::queue::{HttpQueue, TaskQueue};
use crate::shutdown::Shutdown;
use crate::stats::ThroughputCounters;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// The external systems a [`Worker`] drives.
#[derive(Clone)]
pub struct Collaborators {
    pub queue: Arc<dyn TaskQueue>,
    pub store: Arc<dyn DocumentStore>,
    pub page_counter: Arc<dyn PageCounter>,
    pub rasterizer: Arc<dyn Rasterizer>,
    pub recognizer: Arc<dyn Recognizer>,
}

impl Collaborators {
    /// Production wiring: HTTP queue and store, pdfinfo, Ghostscript, Tesseract.
    ///
    /// Subprocess-backed collaborators are killed when `shutdown` fires.
    pub fn from_config(config: &WorkerConfig, shutdown: &Shutdown) -> Result<Self, WorkerError> {
        Ok(Self {
            queue: Arc::new(HttpQueue::new(config)?),
            store: Arc::new(HttpStore::new(
                config.base_file_url.clone(),
                config.download_timeout_secs,
                config.progress_callback.clone(),
            )?),
            page_counter: Arc::new(PdfinfoPageCounter::new(shutdown.clone())),
            rasterizer: Arc::new(GhostscriptRasterizer::new(config.dpi, shutdown.clone())),
            recognizer: Arc::new(TesseractRecognizer::new(shutdown.clone())),
        })
    }
}

/// How one iteration of the task loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The queue had nothing to hand out.
    NoTask,
    /// The queue could not be reached.
    FetchFailed,
    /// The result was submitted and counted.
    Completed { task_id: i64, pages: usize },
    /// Staging or processing failed; nothing was submitted.
    Aborted { task_id: i64, kind: ErrorKind },
    /// The result was built but submission failed; it was dropped.
    ReportFailed { task_id: i64 },
}

impl CycleOutcome {
    /// `true` when the loop should wait before polling again.
    pub fn should_back_off(&self) -> bool {
        matches!(self, CycleOutcome::NoTask | CycleOutcome::FetchFailed)
    }
}

/// Pulls tasks from the queue and turns them into reported page texts.
pub struct Worker {
    config: WorkerConfig,
    queue: Arc<dyn TaskQueue>,
    store: Arc<dyn DocumentStore>,
    page_counter: Arc<dyn PageCounter>,
    pipeline: BoundedPipeline,
    counters: Arc<ThroughputCounters>,
    shutdown: Shutdown,
}

impl Worker {
    pub fn new(
        config: WorkerConfig,
        collaborators: Collaborators,
        counters: Arc<ThroughputCounters>,
        shutdown: Shutdown,
    ) -> Self {
        let transform = Arc::new(PageTransform::new(
            collaborators.rasterizer,
            collaborators.recognizer,
            config.language.clone(),
        ));
        let pipeline = BoundedPipeline::new(
            transform,
            config.concurrency,
            config.progress_callback.clone(),
        );
        Self {
            queue: collaborators.queue,
            store: collaborators.store,
            page_counter: collaborators.page_counter,
            pipeline,
            counters,
            shutdown,
            config,
        }
    }

    pub fn counters(&self) -> &Arc<ThroughputCounters> {
        &self.counters
    }

    /// Run cycles until shutdown is triggered.
    pub async fn run(&self) {
        info!(
            "Worker started: concurrency {}, language {}",
            self.pipeline.concurrency(),
            self.config.language
        );
        while !self.shutdown.is_triggered() {
            let outcome = self.run_once().await;
            if outcome.should_back_off() {
                self.back_off().await;
            }
        }
        info!("Worker stopped");
    }

    async fn back_off(&self) {
        let delay = self.config.poll_backoff();
        debug!("Retrying in {:?}", delay);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.shutdown.cancelled() => {}
        }
    }

    /// One full iteration: fetch a task and carry it through reporting.
    pub async fn run_once(&self) -> CycleOutcome {
        // ── Fetching ─────────────────────────────────────────────────────────
        let task = match self.queue.fetch_task().await {
            Ok(Some(task)) => task,
            Ok(None) => {
                debug!("No task available");
                return CycleOutcome::NoTask;
            }
            Err(e) => {
                error!("Fetch failed: {}", e);
                return CycleOutcome::FetchFailed;
            }
        };

        // ── Staging ──────────────────────────────────────────────────────────
        let mut staged = match StagedDocument::create(&self.config.inbox_dir, task.id).await {
            Ok(staged) => staged,
            Err(e) => {
                error!("Task {}: staging failed: {}", task.id, e);
                return CycleOutcome::Aborted {
                    task_id: task.id,
                    kind: e.kind(),
                };
            }
        };

        let outcome = self.process(&task, &mut staged).await;

        if let Err(e) = staged.release().await {
            warn!("Task {}: cleanup failed: {}", task.id, e);
        }
        outcome
    }

    async fn process(&self, task: &Task, staged: &mut StagedDocument) -> CycleOutcome {
        if let Err(e) = self.stage(task, staged).await {
            error!("Task {}: staging failed: {}", task.id, e);
            return CycleOutcome::Aborted {
                task_id: task.id,
                kind: e.kind(),
            };
        }

        // ── Processing ───────────────────────────────────────────────────────
        let result = match self.convert(task, staged).await {
            Ok(result) => result,
            Err(e) => {
                error!("Task {}: processing failed: {}", task.id, e);
                return CycleOutcome::Aborted {
                    task_id: task.id,
                    kind: e.kind(),
                };
            }
        };

        // ── Reporting ────────────────────────────────────────────────────────
        if let Err(e) = self.queue.submit_result(&result).await {
            error!("Task {}: reporting failed, result dropped: {}", task.id, e);
            return CycleOutcome::ReportFailed { task_id: task.id };
        }

        let pages = staged.page_count();
        self.counters.record_document(pages);
        info!("Task {}: completed ({} pages, {}ms)", task.id, pages, result.duration);
        CycleOutcome::Completed {
            task_id: task.id,
            pages,
        }
    }

    /// Download the source document and discover its page count.
    async fn stage(&self, task: &Task, staged: &mut StagedDocument) -> Result<(), WorkerError> {
        tokio::select! {
            fetched = self.store.fetch_document(task.id, &task.uri, staged.source()) => fetched?,
            _ = self.shutdown.cancelled() => {
                return Err(WorkerError::DownloadFailed {
                    url: redact_url(&task.uri),
                    reason: "cancelled by shutdown".into(),
                });
            }
        }

        let pages = self
            .page_counter
            .count(staged.source())
            .await
            .map_err(|e| WorkerError::PageCountFailed {
                path: staged.source().to_path_buf(),
                detail: e.to_string(),
            })?;
        staged.set_page_count(pages);
        info!("Task {}: {} pages", task.id, pages);
        Ok(())
    }

    /// Fan out over all pages, then assemble the ordered result.
    async fn convert(
        &self,
        task: &Task,
        staged: &StagedDocument,
    ) -> Result<DocumentResult, WorkerError> {
        let start = Instant::now();
        let pages = self.pipeline.run(&staged.page_source()).await;
        let elapsed = start.elapsed();

        let failed = pages.iter().filter(|p| !p.is_success()).count();
        info!(
            "Task {}: all pages processed in {}ms ({} failed)",
            task.id,
            elapsed.as_millis(),
            failed
        );

        let result = assemble(task, pages, staged.page_count(), elapsed)?;
        Ok(result.with_field("source", self.config.result_source.clone()))
    }
}

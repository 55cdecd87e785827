//! Bounded fan-out of page transforms with a full join barrier.
//!
//! Pages are admitted in ascending order: the submit loop acquires one
//! semaphore permit per page *before* spawning its worker, so at most
//! `concurrency` transforms (and their external processes) exist at any
//! instant. Each worker holds its permit until its transform returns.
//!
//! Results are gathered in completion order. [`BoundedPipeline::run`]
//! returns only after every spawned page has finished; a failing page never
//! cancels its siblings.

use crate::output::PageResult;
use crate::pipeline::input::PageSource;
use crate::pipeline::page::PageTransform;
use crate::progress::ProgressCallback;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Runs [`PageTransform`] over every page of a document.
pub struct BoundedPipeline {
    transform: Arc<PageTransform>,
    concurrency: usize,
    progress: Option<ProgressCallback>,
}

impl BoundedPipeline {
    pub fn new(
        transform: Arc<PageTransform>,
        concurrency: usize,
        progress: Option<ProgressCallback>,
    ) -> Self {
        Self {
            transform,
            concurrency: concurrency.max(1),
            progress,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Transform pages `1..=doc.page_count`, returning one result per page
    /// in completion order.
    ///
    /// A page whose worker panicked has no entry; the assembler reports it
    /// as missing.
    pub async fn run(&self, doc: &PageSource) -> Vec<PageResult> {
        let total = doc.page_count;
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut results = Vec::with_capacity(total);

        for page_num in 1..=total {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Task {}: page admission closed: {}", doc.task_id, e);
                    break;
                }
            };
            let transform = Arc::clone(&self.transform);
            let source = doc.clone();
            debug!("Task {}: page {} admitted", doc.task_id, page_num);
            tasks.spawn(async move {
                let _permit = permit;
                transform.transform(&source, page_num).await
            });

            // Collect whatever has already finished so results don't pile up.
            while let Some(joined) = tasks.try_join_next() {
                self.collect(doc.task_id, total, joined, &mut results);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            self.collect(doc.task_id, total, joined, &mut results);
        }

        results
    }

    fn collect(
        &self,
        task_id: i64,
        total: usize,
        joined: Result<PageResult, tokio::task::JoinError>,
        results: &mut Vec<PageResult>,
    ) {
        match joined {
            Ok(result) => {
                if let Some(ref cb) = self.progress {
                    match &result.error {
                        None => cb.on_page_complete(task_id, result.page_num, total, result.text.len()),
                        Some(e) => cb.on_page_error(task_id, result.page_num, total, &e.to_string()),
                    }
                }
                results.push(result);
            }
            Err(e) => error!("Task {}: page worker panicked: {}", task_id, e),
        }
    }
}

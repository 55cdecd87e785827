//! Per-page transform: rasterise one page, then recognise its text.
//!
//! The two stages run strictly in sequence for a page. The intermediate image
//! lives at [`PageSource::page_image`] inside the task's work directory and
//! is deleted once recognition has finished, whatever its outcome. Failure of
//! either stage is recorded in the returned [`PageResult`]; it never aborts
//! sibling pages.

use crate::error::PageError;
use crate::output::PageResult;
use crate::pipeline::input::PageSource;
use crate::pipeline::recognize::Recognizer;
use crate::pipeline::render::Rasterizer;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Rasterise-then-recognise for a single page.
pub struct PageTransform {
    rasterizer: Arc<dyn Rasterizer>,
    recognizer: Arc<dyn Recognizer>,
    language: String,
}

impl PageTransform {
    pub fn new(
        rasterizer: Arc<dyn Rasterizer>,
        recognizer: Arc<dyn Recognizer>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            rasterizer,
            recognizer,
            language: language.into(),
        }
    }

    /// Transform page `page_num` (1-indexed) of `doc`.
    ///
    /// Always returns a `PageResult`; callers check `result.error`.
    pub async fn transform(&self, doc: &PageSource, page_num: usize) -> PageResult {
        let start = Instant::now();
        let elapsed = |start: Instant| start.elapsed().as_millis() as u64;

        if page_num == 0 || page_num > doc.page_count {
            return PageResult::failure(
                PageError::RasterizeFailed {
                    page: page_num,
                    detail: format!("page out of range (document has {} pages)", doc.page_count),
                },
                elapsed(start),
            );
        }

        let image = doc.page_image(page_num);

        // ── Step 1: Rasterize ────────────────────────────────────────────────
        if let Err(e) = self.rasterizer.render(&doc.source, page_num, &image).await {
            warn!("Task {}: page {}: rasterize failed: {}", doc.task_id, page_num, e);
            remove_artifact(&image).await;
            return PageResult::failure(
                PageError::RasterizeFailed {
                    page: page_num,
                    detail: e.to_string(),
                },
                elapsed(start),
            );
        }

        // ── Step 2: Recognize ────────────────────────────────────────────────
        let recognized = self.recognizer.recognize(&image, &self.language).await;
        remove_artifact(&image).await;
        remove_artifact(&image.with_extension("txt")).await;

        match recognized {
            Ok(text) => {
                debug!(
                    "Task {}: page {}: {} bytes in {}ms",
                    doc.task_id,
                    page_num,
                    text.len(),
                    elapsed(start)
                );
                PageResult::success(page_num, text, elapsed(start))
            }
            Err(e) => {
                warn!("Task {}: page {}: recognize failed: {}", doc.task_id, page_num, e);
                PageResult::failure(
                    PageError::RecognizeFailed {
                        page: page_num,
                        detail: e.to_string(),
                    },
                    elapsed(start),
                )
            }
        }
    }
}

/// Best-effort removal of an intermediate artifact.
async fn remove_artifact(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => debug!("Could not remove {}: {}", path.display(), e),
    }
}

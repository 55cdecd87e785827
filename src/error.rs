//! Error types for the ocr-worker library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`WorkerError`]: a task iteration (or the process, at startup) cannot
//!   proceed. Returned as `Err(WorkerError)` from queue, staging, assembly
//!   and configuration functions. [`WorkerError::kind`] maps every variant
//!   onto the failure taxonomy the task loop reacts to.
//!
//! * [`PageError`]: a single page failed to rasterise or recognise. Stored
//!   inside [`crate::output::PageResult`] so sibling pages keep running;
//!   the assembler later turns any page failure into
//!   [`WorkerError::IncompleteDocument`].
//!
//! * [`TransformError`]: the typed outcome of one external transform
//!   (pdfinfo, Ghostscript, Tesseract or a test fake).

use std::path::PathBuf;
use thiserror::Error;

/// Where a [`WorkerError`] sits in the failure taxonomy.
///
/// Everything below [`ErrorKind::FatalStartup`] aborts at most the current
/// task iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Queue fetch failed; retried after the poll backoff.
    TransientIo,
    /// Download or page-count discovery failed; the task is aborted.
    Staging,
    /// One or more pages missing after fan-in; the task is aborted.
    Assembly,
    /// Result submission failed; the result is dropped.
    Reporting,
    /// Required local resources are missing; the process exits.
    FatalStartup,
    /// Unexpected internal error; the task is aborted.
    Internal,
}

/// All task-level and startup errors returned by the ocr-worker library.
#[derive(Debug, Error)]
pub enum WorkerError {
    // ── Queue errors ──────────────────────────────────────────────────────
    /// The task endpoint could not be reached or returned garbage.
    #[error("Failed to fetch task from '{url}': {reason}")]
    FetchFailed { url: String, reason: String },

    /// The task endpoint did not answer within the fetch timeout.
    #[error("Task fetch timed out after {secs}s for '{url}'")]
    FetchTimeout { url: String, secs: u64 },

    /// The result endpoint rejected or never received the result.
    #[error("Failed to submit result for task {task_id}: {reason}")]
    SubmitFailed { task_id: i64, reason: String },

    // ── Staging errors ────────────────────────────────────────────────────
    /// The source document could not be downloaded.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// The source document download exceeded the timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The downloaded file is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// Page-count discovery failed.
    #[error("Could not determine page count of '{path}': {detail}")]
    PageCountFailed { path: PathBuf, detail: String },

    /// Local staging I/O failed (creating the work directory, writing the file).
    #[error("Staging I/O failed for '{path}': {source}")]
    StagingIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Assembly errors ───────────────────────────────────────────────────
    /// At least one page is missing or failed after fan-in.
    #[error("Task {task_id}: incomplete document, {} of {total} pages missing or failed (first: page {})", .missing.len(), .missing.first().copied().unwrap_or(0))]
    IncompleteDocument {
        task_id: i64,
        total: usize,
        missing: Vec<usize>,
    },

    // ── Startup errors ────────────────────────────────────────────────────
    /// The working-directory root does not exist.
    #[error("Inbox directory '{path}' does not exist.\nCreate it or point INBOX_DIR at an existing directory.")]
    InboxMissing { path: PathBuf },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WorkerError {
    /// Classify this error into the failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkerError::FetchFailed { .. } | WorkerError::FetchTimeout { .. } => {
                ErrorKind::TransientIo
            }
            WorkerError::SubmitFailed { .. } => ErrorKind::Reporting,
            WorkerError::DownloadFailed { .. }
            | WorkerError::DownloadTimeout { .. }
            | WorkerError::NotAPdf { .. }
            | WorkerError::PageCountFailed { .. }
            | WorkerError::StagingIo { .. } => ErrorKind::Staging,
            WorkerError::IncompleteDocument { .. } => ErrorKind::Assembly,
            WorkerError::InboxMissing { .. } | WorkerError::InvalidConfig(_) => {
                ErrorKind::FatalStartup
            }
            WorkerError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// A non-fatal error for a single page.
///
/// Stored alongside [`crate::output::PageResult`] when a page fails. Sibling
/// pages keep running; the document as a whole is rejected at assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation failed; recognition was never attempted.
    #[error("Page {page}: rasterize failed: {detail}")]
    RasterizeFailed { page: usize, detail: String },

    /// Text recognition failed on the rasterised page.
    #[error("Page {page}: recognize failed: {detail}")]
    RecognizeFailed { page: usize, detail: String },
}

impl PageError {
    /// 1-indexed page number the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RasterizeFailed { page, .. } | PageError::RecognizeFailed { page, .. } => {
                *page
            }
        }
    }
}

/// Outcome of one external transform invocation.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The external binary is not installed or not on `PATH`.
    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    /// The tool ran but exited unsuccessfully.
    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
    },

    /// The tool was killed because the worker is shutting down.
    #[error("{tool} cancelled by shutdown")]
    Cancelled { tool: String },

    /// The tool succeeded but its output could not be used.
    #[error("Unusable output: {0}")]
    InvalidOutput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_document_display() {
        let e = WorkerError::IncompleteDocument {
            task_id: 42,
            total: 10,
            missing: vec![3, 7],
        };
        let msg = e.to_string();
        assert!(msg.contains("Task 42"), "got: {msg}");
        assert!(msg.contains("2 of 10"), "got: {msg}");
        assert!(msg.contains("page 3"), "got: {msg}");
    }

    #[test]
    fn kinds_follow_taxonomy() {
        let fetch = WorkerError::FetchTimeout {
            url: "http://q/next".into(),
            secs: 5,
        };
        assert_eq!(fetch.kind(), ErrorKind::TransientIo);

        let submit = WorkerError::SubmitFailed {
            task_id: 1,
            reason: "HTTP 500".into(),
        };
        assert_eq!(submit.kind(), ErrorKind::Reporting);

        let count = WorkerError::PageCountFailed {
            path: "/tmp/1.pdf".into(),
            detail: "no Pages: line".into(),
        };
        assert_eq!(count.kind(), ErrorKind::Staging);

        let inbox = WorkerError::InboxMissing {
            path: "./inbox".into(),
        };
        assert_eq!(inbox.kind(), ErrorKind::FatalStartup);
    }

    #[test]
    fn page_error_display_and_page() {
        let e = PageError::RasterizeFailed {
            page: 2,
            detail: "gs exited with 1".into(),
        };
        assert!(e.to_string().contains("rasterize failed"));
        assert_eq!(e.page(), 2);

        let e = PageError::RecognizeFailed {
            page: 5,
            detail: "empty image".into(),
        };
        assert!(e.to_string().contains("recognize failed"));
        assert_eq!(e.page(), 5);
    }

    #[test]
    fn transform_error_display() {
        let e = TransformError::Failed {
            tool: "tesseract".into(),
            status: "exit status: 1".into(),
            stderr: "Error opening data file".into(),
        };
        assert!(e.to_string().contains("tesseract"));
        assert!(e.to_string().contains("Error opening data file"));
    }
}

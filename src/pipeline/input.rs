//! Staging: download a task's source document into the inbox.
//!
//! Every task gets two inbox entries, both derived from the task id:
//!
//! ```text
//! <inbox>/<id>.pdf        source document
//! <inbox>/tmp/<id>/       page images and recognised text
//! ```
//!
//! Keying both on the task id keeps concurrent pages of one task and
//! consecutive tasks from ever writing the same file. [`StagedDocument`]
//! owns both paths and removes them in [`StagedDocument::release`], which is
//! safe to call any number of times. Dropping an unreleased document
//! removes them synchronously as a fallback.

use crate::config::redact_url;
use crate::error::WorkerError;
use crate::progress::ProgressCallback;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Fetches a task's source document to a local path.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Download the document at `location` (the task's `uri`) to `dest`.
    async fn fetch_document(
        &self,
        task_id: i64,
        location: &str,
        dest: &Path,
    ) -> Result<(), WorkerError>;
}

/// A task's source document materialised in the inbox.
#[derive(Debug)]
pub struct StagedDocument {
    task_id: i64,
    source: PathBuf,
    work_dir: PathBuf,
    page_count: usize,
    released: bool,
}

impl StagedDocument {
    /// Reserve the inbox paths for `task_id` and create its work directory.
    pub async fn create(inbox: &Path, task_id: i64) -> Result<Self, WorkerError> {
        let source = inbox.join(format!("{task_id}.pdf"));
        let work_dir = inbox.join("tmp").join(task_id.to_string());
        tokio::fs::create_dir_all(&work_dir)
            .await
            .map_err(|e| WorkerError::StagingIo {
                path: work_dir.clone(),
                source: e,
            })?;
        debug!("Task {}: staged at {}", task_id, work_dir.display());
        Ok(Self {
            task_id,
            source,
            work_dir,
            page_count: 0,
            released: false,
        })
    }

    pub fn task_id(&self) -> i64 {
        self.task_id
    }

    /// Local path of the source document.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Scratch directory for this task's intermediate artifacts.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn set_page_count(&mut self, pages: usize) {
        self.page_count = pages;
    }

    /// Path of the rasterised image for `page_num` (1-indexed).
    pub fn page_image(&self, page_num: usize) -> PathBuf {
        page_image_path(&self.work_dir, page_num)
    }

    /// Cheap, cloneable view handed to page workers.
    pub fn page_source(&self) -> PageSource {
        PageSource {
            task_id: self.task_id,
            source: self.source.clone(),
            work_dir: self.work_dir.clone(),
            page_count: self.page_count,
        }
    }

    /// Remove the source document and the work directory.
    ///
    /// Missing entries are not an error, so a second call is a no-op.
    pub async fn release(&mut self) -> Result<(), WorkerError> {
        remove_file_if_exists(&self.source)
            .await
            .map_err(|e| WorkerError::StagingIo {
                path: self.source.clone(),
                source: e,
            })?;
        match tokio::fs::remove_dir_all(&self.work_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(WorkerError::StagingIo {
                    path: self.work_dir.clone(),
                    source: e,
                })
            }
        }
        self.released = true;
        debug!("Task {}: staged files released", self.task_id);
        Ok(())
    }
}

impl Drop for StagedDocument {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let _ = std::fs::remove_file(&self.source);
        let _ = std::fs::remove_dir_all(&self.work_dir);
    }
}

/// What a page worker needs to know about a staged document.
#[derive(Debug, Clone)]
pub struct PageSource {
    pub task_id: i64,
    pub source: PathBuf,
    pub work_dir: PathBuf,
    pub page_count: usize,
}

impl PageSource {
    /// Path of the rasterised image for `page_num` (1-indexed).
    pub fn page_image(&self, page_num: usize) -> PathBuf {
        page_image_path(&self.work_dir, page_num)
    }
}

fn page_image_path(work_dir: &Path, page_num: usize) -> PathBuf {
    work_dir.join(format!("page-{page_num:04}.png"))
}

async fn remove_file_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Downloads documents over HTTP from `<base_file_url><uri>`.
pub struct HttpStore {
    base_url: String,
    timeout_secs: u64,
    client: reqwest::Client,
    progress: Option<ProgressCallback>,
}

impl HttpStore {
    pub fn new(
        base_url: impl Into<String>,
        timeout_secs: u64,
        progress: Option<ProgressCallback>,
    ) -> Result<Self, WorkerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| WorkerError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into(),
            timeout_secs,
            client,
            progress,
        })
    }

    /// Full download URL for a task location.
    pub fn document_url(&self, location: &str) -> String {
        document_url(&self.base_url, location)
    }

    fn download_error(&self, url: &str, e: reqwest::Error) -> WorkerError {
        if e.is_timeout() {
            WorkerError::DownloadTimeout {
                url: redact_url(url),
                secs: self.timeout_secs,
            }
        } else {
            WorkerError::DownloadFailed {
                url: redact_url(url),
                reason: e.to_string(),
            }
        }
    }
}

/// Join the base file URL and a task location.
///
/// Trailing slashes on the base are dropped; the location is appended as-is
/// (it normally starts with `/`).
pub fn document_url(base: &str, location: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), location)
}

#[async_trait]
impl DocumentStore for HttpStore {
    async fn fetch_document(
        &self,
        task_id: i64,
        location: &str,
        dest: &Path,
    ) -> Result<(), WorkerError> {
        let url = self.document_url(location);
        info!("Task {}: downloading {}", task_id, redact_url(&url));

        let mut response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.download_error(&url, e))?;

        if !response.status().is_success() {
            return Err(WorkerError::DownloadFailed {
                url: redact_url(&url),
                reason: format!("HTTP {}", response.status()),
            });
        }

        if let Some(ref cb) = self.progress {
            cb.on_download_start(task_id, response.content_length());
        }

        let io_err = |e: std::io::Error| WorkerError::StagingIo {
            path: dest.to_path_buf(),
            source: e,
        };
        let mut file = tokio::fs::File::create(dest).await.map_err(io_err)?;

        let mut written: u64 = 0;
        let mut magic = Vec::with_capacity(4);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.download_error(&url, e))?
        {
            if magic.len() < 4 {
                let take = (4 - magic.len()).min(chunk.len());
                magic.extend_from_slice(&chunk[..take]);
            }
            file.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
            if let Some(ref cb) = self.progress {
                cb.on_download_progress(task_id, written);
            }
        }
        file.flush().await.map_err(io_err)?;

        if let Some(ref cb) = self.progress {
            cb.on_download_complete(task_id, written);
        }

        // Verify PDF magic bytes
        if magic.len() == 4 && magic.as_slice() != b"%PDF" {
            let mut m = [0u8; 4];
            m.copy_from_slice(&magic);
            return Err(WorkerError::NotAPdf {
                path: dest.to_path_buf(),
                magic: m,
            });
        }
        if written == 0 {
            warn!("Task {}: downloaded document is empty", task_id);
        }

        info!("Task {}: downloaded {} bytes to {}", task_id, written, dest.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_url_joins_base_and_location() {
        assert_eq!(
            document_url("http://localhost:8080/file/", "/a/b.pdf"),
            "http://localhost:8080/file/a/b.pdf"
        );
        assert_eq!(
            document_url("http://localhost:8080/file", "/a/b.pdf"),
            "http://localhost:8080/file/a/b.pdf"
        );
    }

    #[tokio::test]
    async fn staged_paths_are_keyed_by_task() {
        let inbox = tempfile::tempdir().unwrap();
        let doc = StagedDocument::create(inbox.path(), 17).await.unwrap();
        assert_eq!(doc.source(), inbox.path().join("17.pdf"));
        assert_eq!(doc.work_dir(), inbox.path().join("tmp").join("17"));
        assert_eq!(
            doc.page_image(3),
            inbox.path().join("tmp").join("17").join("page-0003.png")
        );
        assert!(doc.work_dir().is_dir());
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let inbox = tempfile::tempdir().unwrap();
        let mut doc = StagedDocument::create(inbox.path(), 5).await.unwrap();
        tokio::fs::write(doc.source(), b"%PDF-1.7").await.unwrap();
        tokio::fs::write(doc.page_image(1), b"png").await.unwrap();

        doc.release().await.expect("first release");
        assert!(!doc.source().exists());
        assert!(!doc.work_dir().exists());

        doc.release().await.expect("second release is a no-op");
    }

    #[tokio::test]
    async fn drop_removes_unreleased_files() {
        let inbox = tempfile::tempdir().unwrap();
        let (source, work_dir) = {
            let doc = StagedDocument::create(inbox.path(), 9).await.unwrap();
            tokio::fs::write(doc.source(), b"%PDF").await.unwrap();
            (doc.source().to_path_buf(), doc.work_dir().to_path_buf())
        };
        assert!(!source.exists());
        assert!(!work_dir.exists());
    }
}

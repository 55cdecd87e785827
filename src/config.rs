//! Configuration for the OCR worker.
//!
//! All worker behaviour is controlled through [`WorkerConfig`], built via its
//! [`WorkerConfigBuilder`]. The binary fills the builder from environment
//! variables (optionally loaded from `.env`); tests and embedders set only
//! what they need and rely on the defaults for the rest.

use crate::error::WorkerError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for a worker process.
///
/// # Example
/// ```rust
/// use ocr_worker::WorkerConfig;
///
/// let config = WorkerConfig::builder()
///     .inbox_dir("/var/lib/ocr/inbox")
///     .concurrency(8)
///     .language("eng")
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 8);
/// ```
#[derive(Clone)]
pub struct WorkerConfig {
    /// Local working-directory root. Must exist at startup. Default: `./inbox`.
    ///
    /// Source documents land at `<inbox>/<task id>.pdf`; page images and
    /// recognised text at `<inbox>/tmp/<task id>/`.
    pub inbox_dir: PathBuf,

    /// Prefix joined with each task's `uri` to download the source document.
    pub base_file_url: String,

    /// Endpoint polled (`POST`) for the next task.
    pub task_url: String,

    /// Endpoint receiving (`POST`) assembled results.
    pub result_url: String,

    /// Maximum number of pages transformed at once. Default: 4.
    ///
    /// Each page spawns a Ghostscript and then a Tesseract process; both are
    /// CPU- and memory-heavy, so this should track the host's core count
    /// rather than the document size.
    pub concurrency: usize,

    /// Tesseract language tag, e.g. `eng` or `lit+eng`. Default: `lit+eng`.
    pub language: String,

    /// Rasterisation resolution. Range: 72–1200. Default: 300.
    pub dpi: u32,

    /// Timeout for one task poll, in seconds. Default: 5.
    pub fetch_timeout_secs: u64,

    /// Timeout for downloading one source document, in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Timeout for submitting one result, in seconds. Default: 30.
    pub submit_timeout_secs: u64,

    /// Delay before polling again after an empty queue or a fetch error,
    /// in milliseconds. Default: 10 000.
    pub poll_backoff_ms: u64,

    /// Interval between throughput log lines, in milliseconds. Default: 1 000.
    pub stats_interval_ms: u64,

    /// Value of the static `source` field attached to every result.
    pub result_source: String,

    /// Download and page events. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            inbox_dir: PathBuf::from("./inbox"),
            base_file_url: "http://localhost:8080/file/".to_string(),
            task_url: "http://localhost:8080/next".to_string(),
            result_url: "http://localhost:8080/result".to_string(),
            concurrency: 4,
            language: "lit+eng".to_string(),
            dpi: 300,
            fetch_timeout_secs: 5,
            download_timeout_secs: 120,
            submit_timeout_secs: 30,
            poll_backoff_ms: 10_000,
            stats_interval_ms: 1_000,
            result_source: "rust-worker".to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("inbox_dir", &self.inbox_dir)
            .field("base_file_url", &redact_url(&self.base_file_url))
            .field("task_url", &redact_url(&self.task_url))
            .field("result_url", &redact_url(&self.result_url))
            .field("concurrency", &self.concurrency)
            .field("language", &self.language)
            .field("dpi", &self.dpi)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("submit_timeout_secs", &self.submit_timeout_secs)
            .field("poll_backoff_ms", &self.poll_backoff_ms)
            .field("stats_interval_ms", &self.stats_interval_ms)
            .field("result_source", &self.result_source)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn WorkerProgressCallback>"),
            )
            .finish()
    }
}

impl WorkerConfig {
    /// Create a new builder for `WorkerConfig`.
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn poll_backoff(&self) -> Duration {
        Duration::from_millis(self.poll_backoff_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    /// Verify local resources the worker cannot run without.
    ///
    /// Called once at process start; an error here is fatal.
    pub fn check_startup(&self) -> Result<(), WorkerError> {
        if !self.inbox_dir.is_dir() {
            return Err(WorkerError::InboxMissing {
                path: self.inbox_dir.clone(),
            });
        }
        Ok(())
    }
}

/// Builder for [`WorkerConfig`].
#[derive(Debug)]
pub struct WorkerConfigBuilder {
    config: WorkerConfig,
}

impl WorkerConfigBuilder {
    pub fn inbox_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.inbox_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn base_file_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_file_url = url.into();
        self
    }

    pub fn task_url(mut self, url: impl Into<String>) -> Self {
        self.config.task_url = url.into();
        self
    }

    pub fn result_url(mut self, url: impl Into<String>) -> Self {
        self.config.result_url = url.into();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.config.language = lang.into();
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 1200);
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs.max(1);
        self
    }

    pub fn submit_timeout_secs(mut self, secs: u64) -> Self {
        self.config.submit_timeout_secs = secs.max(1);
        self
    }

    pub fn poll_backoff_ms(mut self, ms: u64) -> Self {
        self.config.poll_backoff_ms = ms;
        self
    }

    pub fn stats_interval_ms(mut self, ms: u64) -> Self {
        self.config.stats_interval_ms = ms.max(10);
        self
    }

    pub fn result_source(mut self, source: impl Into<String>) -> Self {
        self.config.result_source = source.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<WorkerConfig, WorkerError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(WorkerError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        for (name, url) in [
            ("base file URL", &c.base_file_url),
            ("task URL", &c.task_url),
            ("result URL", &c.result_url),
        ] {
            if url.trim().is_empty() {
                return Err(WorkerError::InvalidConfig(format!("{name} must not be empty")));
            }
        }
        if c.language.trim().is_empty() {
            return Err(WorkerError::InvalidConfig(
                "Recognition language must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Mask the `apiKey` query parameter of a URL for logging.
///
/// Strings that do not parse as URLs are returned unchanged.
pub fn redact_url(url: &str) -> String {
    let Ok(mut parsed) = reqwest::Url::parse(url) else {
        return url.to_string();
    };
    if !parsed.query_pairs().any(|(k, _)| k == "apiKey") {
        return url.to_string();
    }
    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| {
            if k == "apiKey" {
                (k.into_owned(), "******".to_string())
            } else {
                (k.into_owned(), v.into_owned())
            }
        })
        .collect();
    parsed.query_pairs_mut().clear().extend_pairs(pairs);
    parsed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn defaults_match_documented_values() {
        let c = WorkerConfig::default();
        assert_eq!(c.inbox_dir, PathBuf::from("./inbox"));
        assert_eq!(c.concurrency, 4);
        assert_eq!(c.language, "lit+eng");
        assert_eq!(c.dpi, 300);
        assert_eq!(c.poll_backoff(), Duration::from_secs(10));
        assert_eq!(c.stats_interval(), Duration::from_secs(1));
        assert_eq!(c.result_source, "rust-worker");
    }

    #[test]
    fn builder_clamps() {
        let c = WorkerConfig::builder().dpi(10).build().unwrap();
        assert_eq!(c.dpi, 72);
    }

    #[test]
    fn builder_rejects_zero_concurrency() {
        let err = WorkerConfig::builder().concurrency(0).build().unwrap_err();
        assert!(matches!(err, WorkerError::InvalidConfig(_)), "got: {err:?}");
        assert_eq!(err.kind(), ErrorKind::FatalStartup);
    }

    #[test]
    fn builder_rejects_empty_urls() {
        let err = WorkerConfig::builder().task_url("  ").build().unwrap_err();
        assert!(err.to_string().contains("task URL"), "got: {err}");
    }

    #[test]
    fn check_startup_requires_inbox() {
        let dir = tempfile::tempdir().unwrap();
        let ok = WorkerConfig::builder().inbox_dir(dir.path()).build().unwrap();
        assert!(ok.check_startup().is_ok());

        let missing = WorkerConfig::builder()
            .inbox_dir(dir.path().join("nope"))
            .build()
            .unwrap();
        assert!(matches!(
            missing.check_startup(),
            Err(WorkerError::InboxMissing { .. })
        ));
    }

    #[test]
    fn redact_url_masks_api_key() {
        let r = redact_url("http://q.example/next?apiKey=secret&queue=ocr");
        assert!(!r.contains("secret"), "got: {r}");
        assert!(r.contains("apiKey=******"), "got: {r}");
        assert!(r.contains("queue=ocr"), "got: {r}");
    }

    #[test]
    fn redact_url_leaves_other_urls_alone() {
        assert_eq!(
            redact_url("http://localhost:8080/next"),
            "http://localhost:8080/next"
        );
        assert_eq!(redact_url("not a url"), "not a url");
    }

    #[test]
    fn debug_output_hides_api_key() {
        let c = WorkerConfig::builder()
            .result_url("http://q/result?apiKey=abc123")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("abc123"), "got: {dbg}");
    }
}

//! Page counting and rasterisation of PDF documents.
//!
//! Both are delegated to external tools run through
//! [`crate::pipeline::subprocess::run_tool`]:
//!
//! * `pdfinfo <file>` reports the page count on its `Pages:` line.
//! * Ghostscript renders exactly one page per invocation to an 8-bit
//!   grayscale PNG (`pnggray`) so each page can be handed to its own
//!   recognition process as soon as it is ready.

use crate::error::TransformError;
use crate::pipeline::subprocess::run_tool;
use crate::shutdown::Shutdown;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// Discovers how many pages a staged document has.
#[async_trait]
pub trait PageCounter: Send + Sync {
    async fn count(&self, document: &Path) -> Result<usize, TransformError>;
}

/// Renders a single page of a document to an image file.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Render page `page_num` (1-indexed) of `document` to `dest`.
    async fn render(
        &self,
        document: &Path,
        page_num: usize,
        dest: &Path,
    ) -> Result<(), TransformError>;
}

static PAGES_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Pages:\s+(\d+)\s*$").expect("valid regex"));

/// Extract the page count from `pdfinfo` output.
pub fn parse_page_count(pdfinfo_output: &str) -> Option<usize> {
    PAGES_LINE
        .captures(pdfinfo_output)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// [`PageCounter`] backed by poppler's `pdfinfo`.
pub struct PdfinfoPageCounter {
    shutdown: Shutdown,
}

impl PdfinfoPageCounter {
    pub fn new(shutdown: Shutdown) -> Self {
        Self { shutdown }
    }
}

#[async_trait]
impl PageCounter for PdfinfoPageCounter {
    async fn count(&self, document: &Path) -> Result<usize, TransformError> {
        let mut cmd = Command::new("pdfinfo");
        cmd.arg(document);
        let output = run_tool("pdfinfo", cmd, &self.shutdown).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_page_count(&stdout).ok_or_else(|| {
            TransformError::InvalidOutput("could not find page count in pdfinfo output".into())
        })
    }
}

/// [`Rasterizer`] backed by Ghostscript.
pub struct GhostscriptRasterizer {
    dpi: u32,
    shutdown: Shutdown,
}

impl GhostscriptRasterizer {
    pub fn new(dpi: u32, shutdown: Shutdown) -> Self {
        Self { dpi, shutdown }
    }

    /// Arguments for rendering one page; the input file comes last.
    pub fn args(&self, document: &Path, page_num: usize, dest: &Path) -> Vec<String> {
        vec![
            "-dNOPAUSE".to_string(),
            "-dBATCH".to_string(),
            "-sDEVICE=pnggray".to_string(),
            format!("-r{}", self.dpi),
            "-dQUIET".to_string(),
            "-dSAFER".to_string(),
            format!("-dFirstPage={page_num}"),
            format!("-dLastPage={page_num}"),
            "-sstdout=%stderr".to_string(),
            format!("-sOutputFile={}", dest.display()),
            "--".to_string(),
            document.display().to_string(),
        ]
    }
}

#[async_trait]
impl Rasterizer for GhostscriptRasterizer {
    async fn render(
        &self,
        document: &Path,
        page_num: usize,
        dest: &Path,
    ) -> Result<(), TransformError> {
        let mut cmd = Command::new("gs");
        cmd.args(self.args(document, page_num, dest));
        run_tool("gs", cmd, &self.shutdown).await?;

        if !tokio::fs::try_exists(dest).await.unwrap_or(false) {
            return Err(TransformError::InvalidOutput(format!(
                "gs produced no image at {}",
                dest.display()
            )));
        }
        debug!("Rendered page {} → {}", page_num, dest.display());
        Ok(())
    }
}

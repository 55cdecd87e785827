//! Text recognition of a rasterised page.
//!
//! Tesseract is invoked as `tesseract -l <lang> <image> <base> txt`, which
//! writes `<base>.txt`. The base is the image path without its extension,
//! so the text file sits next to the page image inside the task's work
//! directory and inherits its task/page key.

use crate::error::TransformError;
use crate::pipeline::subprocess::run_tool;
use crate::shutdown::Shutdown;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// Turns one page image into text.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Recognise `image` using the language tag `language` (e.g. `lit+eng`).
    async fn recognize(&self, image: &Path, language: &str) -> Result<String, TransformError>;
}

/// [`Recognizer`] backed by the `tesseract` CLI.
pub struct TesseractRecognizer {
    shutdown: Shutdown,
}

impl TesseractRecognizer {
    pub fn new(shutdown: Shutdown) -> Self {
        Self { shutdown }
    }
}

/// Output base Tesseract is given for `image`; it appends `.txt`.
pub fn output_base(image: &Path) -> PathBuf {
    image.with_extension("")
}

#[async_trait]
impl Recognizer for TesseractRecognizer {
    async fn recognize(&self, image: &Path, language: &str) -> Result<String, TransformError> {
        let base = output_base(image);
        let mut cmd = Command::new("tesseract");
        cmd.arg("-l").arg(language).arg(image).arg(&base).arg("txt");
        run_tool("tesseract", cmd, &self.shutdown).await?;

        let text_path = base.with_extension("txt");
        let bytes = tokio::fs::read(&text_path).await?;
        let text = String::from_utf8(bytes).map_err(|e| {
            TransformError::InvalidOutput(format!(
                "{} is not UTF-8: {}",
                text_path.display(),
                e
            ))
        })?;
        debug!("Recognised {} → {} bytes", image.display(), text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_base_strips_extension() {
        let base = output_base(Path::new("/inbox/tmp/12/page-0004.png"));
        assert_eq!(base, PathBuf::from("/inbox/tmp/12/page-0004"));
        assert_eq!(
            base.with_extension("txt"),
            PathBuf::from("/inbox/tmp/12/page-0004.txt")
        );
    }
}

//! Cancellable invocation of external command-line tools.
//!
//! pdfinfo, Ghostscript and Tesseract are all driven through [`run_tool`],
//! which turns a process outcome into a typed [`TransformError`]:
//!
//! * binary missing → [`TransformError::ToolNotFound`]
//! * non-zero exit  → [`TransformError::Failed`] with captured stderr
//! * shutdown fired → [`TransformError::Cancelled`]; the child is killed
//!   because it was spawned with `kill_on_drop` and its future is dropped.

use crate::error::TransformError;
use crate::shutdown::Shutdown;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::debug;

/// Longest stderr excerpt kept in an error message.
const STDERR_LIMIT: usize = 400;

/// Run `command` to completion unless `shutdown` fires first.
///
/// `tool` names the binary in errors and logs.
pub async fn run_tool(
    tool: &str,
    mut command: Command,
    shutdown: &Shutdown,
) -> Result<Output, TransformError> {
    if shutdown.is_triggered() {
        return Err(TransformError::Cancelled {
            tool: tool.to_string(),
        });
    }

    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TransformError::ToolNotFound(tool.to_string())
            } else {
                TransformError::Io(e)
            }
        })?;

    let output = tokio::select! {
        output = child.wait_with_output() => output?,
        _ = shutdown.cancelled() => {
            debug!("{} killed by shutdown", tool);
            return Err(TransformError::Cancelled { tool: tool.to_string() });
        }
    };

    if !output.status.success() {
        return Err(TransformError::Failed {
            tool: tool.to_string(),
            status: output.status.to_string(),
            stderr: stderr_excerpt(&output.stderr),
        });
    }

    Ok(output)
}

fn stderr_excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.chars().count() > STDERR_LIMIT {
        let cut: String = text.chars().take(STDERR_LIMIT).collect();
        format!("{cut}\u{2026}")
    } else {
        text.to_string()
    }
}

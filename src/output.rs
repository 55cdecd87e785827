//! Data exchanged between the queue, the page pipeline and the assembler.
//!
//! [`Task`] and [`DocumentResult`] are wire types: their serde layout matches
//! what the issuing service sends and expects back (`tekstas` is the
//! service's name for the per-page text array). [`PageResult`] never leaves
//! the process.

use crate::error::PageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One unit of work handed out by the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Queue-assigned identifier, echoed back in the result.
    pub id: i64,
    /// Location of the source document, relative to the base file URL.
    pub uri: String,
    /// Issuer's deadline, carried for logging only; it does not gate
    /// processing.
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
}

/// Outcome of transforming a single page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Recognised text; empty when `error` is set (and possibly when not).
    pub text: String,
    /// Wall-clock time spent rasterising and recognising this page.
    pub duration_ms: u64,
    /// Set when the page failed.
    pub error: Option<PageError>,
}

impl PageResult {
    pub fn success(page_num: usize, text: String, duration_ms: u64) -> Self {
        Self {
            page_num,
            text,
            duration_ms,
            error: None,
        }
    }

    pub fn failure(error: PageError, duration_ms: u64) -> Self {
        Self {
            page_num: error.page(),
            text: String::new(),
            duration_ms,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// The assembled text of one task, as submitted to the result endpoint.
///
/// Only [`crate::assemble::assemble`] constructs this outside of tests, and
/// only when every page succeeded, so `text.len()` always equals the page
/// count of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
    /// Identifier of the task this result answers.
    pub id: i64,
    /// Per-page text, index 0 = page 1.
    #[serde(rename = "tekstas")]
    pub text: Vec<String>,
    /// Milliseconds from just before page fan-out to just after fan-in.
    pub duration: u64,
    /// Static fields identifying the worker implementation.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl DocumentResult {
    /// Attach a static top-level field to the submitted JSON.
    ///
    /// Keys that collide with `id`, `tekstas` or `duration` are ignored.
    pub fn with_field(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        if !matches!(key, "id" | "tekstas" | "duration") {
            self.extra.insert(key.to_string(), value.into());
        }
        self
    }
}

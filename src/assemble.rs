//! Fan-in: rebuild the ordered document text from per-page results.
//!
//! Page workers finish in any order. [`assemble`] slots each result by its
//! page number and accepts the document only when every page from 1 to the
//! page count is present and successful. A document with a missing or
//! failed page is rejected as a whole; no partial result is ever built.

use crate::error::WorkerError;
use crate::output::{DocumentResult, PageResult, Task};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

/// Assemble `pages` into a [`DocumentResult`] for `task`.
///
/// `elapsed` is the wall-clock time from just before fan-out to just after
/// fan-in, measured by the caller.
///
/// # Errors
/// [`WorkerError::IncompleteDocument`] listing every page (ascending) that
/// is missing or failed.
pub fn assemble(
    task: &Task,
    pages: Vec<PageResult>,
    page_count: usize,
    elapsed: Duration,
) -> Result<DocumentResult, WorkerError> {
    let mut slots: Vec<Option<String>> = vec![None; page_count];

    for page in pages {
        let Some(slot) = page
            .page_num
            .checked_sub(1)
            .and_then(|idx| slots.get_mut(idx))
        else {
            warn!(
                "Task {}: ignoring result for page {} (document has {} pages)",
                task.id, page.page_num, page_count
            );
            continue;
        };
        if page.error.is_none() {
            if slot.is_some() {
                warn!("Task {}: duplicate result for page {}", task.id, page.page_num);
            }
            *slot = Some(page.text);
        }
    }

    let missing: Vec<usize> = slots
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_none())
        .map(|(i, _)| i + 1)
        .collect();

    if !missing.is_empty() {
        return Err(WorkerError::IncompleteDocument {
            task_id: task.id,
            total: page_count,
            missing,
        });
    }

    Ok(DocumentResult {
        id: task.id,
        text: slots.into_iter().flatten().collect(),
        duration: elapsed.as_millis() as u64,
        extra: BTreeMap::new(),
    })
}

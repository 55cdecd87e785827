//! Remote task queue: fetch the next task, submit assembled results.
//!
//! The worker talks to the queue only through [`TaskQueue`], so tests can
//! substitute an in-memory queue. [`HttpQueue`] is the production
//! implementation:
//!
//! | Call | Request | Success | No task |
//! |------|---------|---------|---------|
//! | fetch | `POST <task_url>` (empty body) | `200` + JSON [`Task`] | `204` |
//! | submit | `POST <result_url>` + JSON [`DocumentResult`] | `200` | – |

use crate::config::{redact_url, WorkerConfig};
use crate::error::WorkerError;
use crate::output::{DocumentResult, Task};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, info};

/// Source of tasks and sink of results.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Acquire the next task. `Ok(None)` means the queue is currently empty.
    async fn fetch_task(&self) -> Result<Option<Task>, WorkerError>;

    /// Hand an assembled result back to the issuing service.
    async fn submit_result(&self, result: &DocumentResult) -> Result<(), WorkerError>;
}

/// HTTP/JSON implementation of [`TaskQueue`].
pub struct HttpQueue {
    task_url: String,
    result_url: String,
    fetch_timeout_secs: u64,
    submit_timeout_secs: u64,
    client: reqwest::Client,
}

impl HttpQueue {
    pub fn new(config: &WorkerConfig) -> Result<Self, WorkerError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| WorkerError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            task_url: config.task_url.clone(),
            result_url: config.result_url.clone(),
            fetch_timeout_secs: config.fetch_timeout_secs,
            submit_timeout_secs: config.submit_timeout_secs,
            client,
        })
    }
}

#[async_trait]
impl TaskQueue for HttpQueue {
    async fn fetch_task(&self) -> Result<Option<Task>, WorkerError> {
        let url = redact_url(&self.task_url);
        debug!("Polling for task: {}", url);

        let response = self
            .client
            .post(&self.task_url)
            .timeout(Duration::from_secs(self.fetch_timeout_secs))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WorkerError::FetchTimeout {
                        url: url.clone(),
                        secs: self.fetch_timeout_secs,
                    }
                } else {
                    WorkerError::FetchFailed {
                        url: url.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NO_CONTENT => return Ok(None),
            status => {
                return Err(WorkerError::FetchFailed {
                    url,
                    reason: format!("HTTP {status}"),
                })
            }
        }

        let task: Task = response.json().await.map_err(|e| WorkerError::FetchFailed {
            url: url.clone(),
            reason: format!("invalid task body: {e}"),
        })?;

        info!("Task {}: fetched ({})", task.id, task.uri);
        Ok(Some(task))
    }

    async fn submit_result(&self, result: &DocumentResult) -> Result<(), WorkerError> {
        info!("Task {}: posting {} page texts", result.id, result.text.len());

        let response = self
            .client
            .post(&self.result_url)
            .timeout(Duration::from_secs(self.submit_timeout_secs))
            .json(result)
            .send()
            .await
            .map_err(|e| WorkerError::SubmitFailed {
                task_id: result.id,
                reason: e.to_string(),
            })?;

        if response.status() != StatusCode::OK {
            return Err(WorkerError::SubmitFailed {
                task_id: result.id,
                reason: format!("HTTP {}", response.status()),
            });
        }

        info!("Task {}: result posted", result.id);
        Ok(())
    }
}

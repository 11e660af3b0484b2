//! Waiting for asynchronously processed writes.
//!
//! Writes are acknowledged with a task id before they are visible to reads.
//! [`wait_for_task`] polls the task status endpoint at a fixed interval until
//! the task is published, the caller's deadline passes, or the wait is
//! cancelled. Every poll is an ordinary read dispatch, so host failover
//! applies to status checks too.

use crate::engine::RetryEngine;
use crate::request::{RequestContext, RequestOptions};
use crate::{Error, Result};
use http::Method;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default delay between two status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Processing state of a write task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Not yet visible to reads.
    Pending,
    /// Applied and visible to reads.
    Done,
}

#[derive(Deserialize)]
struct TaskStatusBody {
    status: String,
}

impl TaskStatus {
    /// Parses a status endpoint body such as `{"status":"published"}`.
    ///
    /// Any status other than `published` is still pending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeserializationFailed`] if the body has no `status`.
    pub fn from_body(body: &str, status: http::StatusCode) -> Result<Self> {
        let parsed: TaskStatusBody =
            serde_json::from_str(body).map_err(|e| Error::DeserializationFailed {
                raw_response: body.to_string(),
                serde_error: e.to_string(),
                status,
            })?;

        Ok(match parsed.status.as_str() {
            "published" => TaskStatus::Done,
            _ => TaskStatus::Pending,
        })
    }
}

/// Options for waiting on a task.
#[derive(Debug, Clone, Default)]
pub struct WaitOptions {
    /// Delay between polls; the client default when `None`.
    pub poll_interval: Option<Duration>,

    /// Give up after this much wall-clock time.
    pub timeout: Option<Duration>,

    /// Stops the wait when cancelled, in addition to the handle's own cancel.
    pub cancel: Option<CancellationToken>,

    /// Options applied to every status request.
    pub request_options: RequestOptions,
}

impl WaitOptions {
    /// Waits with client defaults and no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the delay between polls.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Sets the overall deadline, measured from the start of the wait.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Ties the wait to an external cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Sets options for every status request.
    pub fn with_request_options(mut self, options: RequestOptions) -> Self {
        self.request_options = options;
        self
    }
}

/// Path of the status endpoint for `task_id` on `index`.
pub fn task_status_path(index: &str, task_id: u64) -> String {
    format!("/1/indexes/{}/task/{}", index, task_id)
}

enum Interrupt {
    Deadline,
    Cancelled,
}

/// Polls until `task_id` on `index` is published.
///
/// Returns as soon as a poll reports the task done. The deadline bounds the
/// whole wait, in-flight polls included.
///
/// # Errors
///
/// [`Error::TaskTimeout`] when the deadline passes, [`Error::TaskCancelled`]
/// when `cancel` fires, or the dispatch error of a poll that failed fatally
/// or exhausted every host.
pub async fn wait_for_task(
    engine: &RetryEngine,
    index: &str,
    task_id: u64,
    poll_interval: Duration,
    timeout: Option<Duration>,
    request_options: RequestOptions,
    cancel: CancellationToken,
) -> Result<()> {
    let started = Instant::now();
    let deadline = timeout.map(|t| started + t);
    let context = RequestContext::read(Method::GET, task_status_path(index, task_id))
        .with_options(request_options);
    let mut polls = 0usize;

    let interrupted = |reason: Interrupt, polls: usize| match reason {
        Interrupt::Deadline => {
            let elapsed = started.elapsed();
            tracing::warn!(
                index = %index,
                task_id,
                polls,
                elapsed_ms = elapsed.as_millis(),
                "Task not published before deadline"
            );
            Error::TaskTimeout {
                index: index.to_string(),
                task_id,
                elapsed,
                polls,
            }
        }
        Interrupt::Cancelled => Error::TaskCancelled {
            index: index.to_string(),
            task_id,
            polls,
        },
    };

    loop {
        polls += 1;
        tracing::debug!(index = %index, task_id, poll = polls, "Polling task status");

        let poll = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(interrupted(Interrupt::Cancelled, polls)),
            _ = sleep_until_deadline(deadline) => return Err(interrupted(Interrupt::Deadline, polls)),
            result = engine.execute(&context, &cancel) => result,
        };

        let response = match poll {
            Ok(response) => response,
            Err(Error::Cancelled) => return Err(interrupted(Interrupt::Cancelled, polls)),
            Err(e) => return Err(e),
        };

        if TaskStatus::from_body(&response.body, response.status)? == TaskStatus::Done {
            tracing::info!(
                index = %index,
                task_id,
                polls,
                elapsed_ms = started.elapsed().as_millis(),
                "Task published"
            );
            return Ok(());
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(interrupted(Interrupt::Cancelled, polls)),
            _ = sleep_until_deadline(deadline) => return Err(interrupted(Interrupt::Deadline, polls)),
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[test]
    fn test_status_parsing() {
        assert_eq!(
            TaskStatus::from_body(r#"{"status":"published","pendingTask":false}"#, StatusCode::OK)
                .unwrap(),
            TaskStatus::Done
        );
        assert_eq!(
            TaskStatus::from_body(r#"{"status":"notPublished"}"#, StatusCode::OK).unwrap(),
            TaskStatus::Pending
        );
    }

    #[test]
    fn test_status_body_without_status_is_decode_error() {
        let err = TaskStatus::from_body(r#"{"pendingTask":true}"#, StatusCode::OK).unwrap_err();
        assert!(matches!(err, Error::DeserializationFailed { .. }));
    }

    #[test]
    fn test_task_status_path() {
        assert_eq!(task_status_path("products", 42), "/1/indexes/products/task/42");
    }

    #[test]
    fn test_wait_options_builder() {
        let options = WaitOptions::new()
            .with_poll_interval(Duration::from_millis(50))
            .with_timeout(Duration::from_millis(200));
        assert_eq!(options.poll_interval, Some(Duration::from_millis(50)));
        assert_eq!(options.timeout, Some(Duration::from_millis(200)));
        assert!(options.cancel.is_none());
    }
}

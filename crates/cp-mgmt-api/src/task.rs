// SPDX-License-Identifier: Apache-2.0
//! Task polling and bounded retry.

use crate::client::{ApiClient, ApiRequest, ApiResponse};
use crate::error::{ClientError, ErrorKind, Result};
use crate::log::logged;
use serde_json::{Value, json};
use std::future::Future;
use tracing::{debug, warn};

pub(crate) const TASK_ID: &str = "task-id";
pub(crate) const TASKS: &str = "tasks";

const SHOW_TASK: &str = "show-task";
const IN_PROGRESS: &str = "in progress";

/// Status queries are returned as they are, never followed.
pub(crate) fn is_task_query(command: &str) -> bool {
    matches!(command, "show-task" | "show-tasks")
}

pub(crate) fn single_task_query(task_id: &str) -> Value {
    json!({ "task-id": task_id, "details-level": "full" })
}

pub(crate) fn batch_task_query(task_ids: &[String]) -> Value {
    json!({ "task-id": task_ids, "details-level": "full" })
}

/// Ids of the entries of a `tasks` array.
pub(crate) fn task_ids(tasks: &[Value]) -> Vec<String> {
    tasks
        .iter()
        .filter_map(|task| task.get(TASK_ID).and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

/// True when no task of a `show-task` response is still in progress.
pub(crate) fn tasks_done(data: &Value) -> Result<bool> {
    let tasks = data
        .get(TASKS)
        .and_then(Value::as_array)
        .ok_or_else(|| ClientError::protocol("show-task response has no tasks"))?;
    Ok(tasks
        .iter()
        .all(|task| task.get("status").and_then(Value::as_str) != Some(IN_PROGRESS)))
}

fn is_retryable(err: &ClientError) -> bool {
    !matches!(err.kind(), ErrorKind::Trust | ErrorKind::Config)
}

impl ApiClient {
    /// Poll `show-task` for `task_id` until it is no longer in progress.
    pub async fn wait_for_task(&self, task_id: &str) -> Result<ApiResponse> {
        logged(
            &self.span,
            "wait_for_task",
            self.poll_tasks(single_task_query(task_id)),
        )
        .await
    }

    /// Poll one combined `show-task` query until none of `task_ids` is in progress.
    pub async fn wait_for_tasks(&self, task_ids: &[String]) -> Result<ApiResponse> {
        logged(
            &self.span,
            "wait_for_tasks",
            self.poll_tasks(batch_task_query(task_ids)),
        )
        .await
    }

    /// Send `command` up to `max_attempts` times until one attempt succeeds, waiting for any
    /// task the successful attempt starts.
    ///
    /// Trust and configuration failures are returned at once. `0` attempts counts as `1`.
    pub async fn call_with_retry(
        &self,
        command: &str,
        payload: &Value,
        max_attempts: u32,
    ) -> Result<ApiResponse> {
        logged(
            &self.span,
            "call_with_retry",
            self.retry(command, max_attempts, || {
                self.call(ApiRequest::new(command).payload(payload.clone()))
            }),
        )
        .await
    }

    async fn retry<F, Fut>(&self, command: &str, max_attempts: u32, send: F) -> Result<ApiResponse>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<ApiResponse>>,
    {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match send().await {
                Ok(response) => return Ok(response),
                Err(e) if !is_retryable(&e) => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    return Err(ClientError::retry_exhausted(command, max_attempts, e));
                }
                Err(e) => {
                    warn!(
                        parent: &self.span,
                        command,
                        attempt,
                        max_attempts,
                        error = %e,
                        "API call failed, retrying"
                    );
                }
            }
        }
    }

    pub(crate) async fn poll_tasks(&self, query: Value) -> Result<ApiResponse> {
        let (attempts, interval) = {
            let config = self.config.read().await;
            (config.poll_attempts, config.poll_interval())
        };

        let mut polls: u32 = 0;
        loop {
            let response = self
                .retry(SHOW_TASK, attempts, || self.dispatch(SHOW_TASK, &query, None))
                .await?;
            polls += 1;
            if tasks_done(&response.data)? {
                debug!(parent: &self.span, polls, "tasks finished");
                return Ok(response);
            }
            debug!(parent: &self.span, polls, "tasks still in progress");
            tokio::time::sleep(interval).await;
        }
    }
}

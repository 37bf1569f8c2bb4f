// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::error;

type TaskResult = Result<(), Box<dyn Error + Send + Sync>>;

/// Wait for the first task in the set to finish, surfacing its result.
pub async fn wait_for_any_task(tasks: &mut JoinSet<TaskResult>) -> TaskResult {
    match tasks.join_next().await {
        None => Ok(()), // empty set
        Some(res) => res?,
    }
}

/// Drain the set, failing if any task errors or the timeout elapses.
pub async fn wait_for_tasks_with_timeout(
    tasks: &mut JoinSet<TaskResult>,
    timeout: Duration,
) -> TaskResult {
    let stop_at = Instant::now() + timeout;
    let mut result = Ok(());

    loop {
        match timeout_at(stop_at, tasks.join_next()).await {
            Err(_) => {
                result = Err("timed out waiting for tasks to complete".into());
                break;
            }
            Ok(None) => break,
            Ok(Some(v)) => match v {
                Ok(Ok(())) => {}
                Ok(Err(e)) => result = Err(e),
                Err(e) => {
                    error!(error = %e, "Task join failed.");
                    result = Err(e.into());
                }
            },
        }
    }

    if result.is_err() {
        tasks.abort_all();
    }
    result
}

/*
 *  Copyright 2026 Rebill Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! The task worker: claim, dispatch, resolve.
//!
//! Each worker instance has a stable `worker_id` recorded as `lock_owner` on
//! the rows it claims. A failure in one task never aborts the rest of the
//! batch; resolution errors are logged and the row is left for the reaper.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::dal::{TaskResolution, DAL};
use crate::error::StoreError;
use crate::models::scheduled_task::ScheduledTask;
use crate::task::{HandlerRegistry, TaskType};

/// Claims due tasks in batches and runs their handlers.
pub struct TaskWorker {
    dal: DAL,
    registry: Arc<HandlerRegistry>,
    config: Arc<EngineConfig>,
    worker_id: String,
    shutdown: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
}

impl TaskWorker {
    pub fn new(dal: DAL, registry: Arc<HandlerRegistry>, config: Arc<EngineConfig>) -> Self {
        let worker_id = config
            .worker_id()
            .map(String::from)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Self {
            dal,
            registry,
            config,
            worker_id,
            shutdown: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Arc::new(Notify::new()),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Signals the run loop to stop after the in-flight batch.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.shutdown_notify.notify_waiters();
    }

    /// Runs until [`shutdown`](Self::shutdown) is called. Sleeps for the poll
    /// interval only when a cycle claimed nothing, so a busy queue drains at
    /// full speed.
    pub async fn run(&self) {
        info!(worker_id = %self.worker_id, "Task worker started");
        while !self.shutdown.load(Ordering::Relaxed) {
            let processed = match self.run_once().await {
                Ok(n) => n,
                Err(e) => {
                    error!(worker_id = %self.worker_id, error = %e, "Worker cycle failed");
                    0
                }
            };

            if processed == 0 {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.worker_poll_interval()) => {}
                    _ = self.shutdown_notify.notified() => {}
                }
            }
        }
        info!(worker_id = %self.worker_id, "Task worker stopped");
    }

    /// One claim-and-process cycle. Returns the number of tasks claimed.
    pub async fn run_once(&self) -> Result<usize, StoreError> {
        let batch = self
            .dal
            .scheduled_task()
            .claim_batch(
                &self.worker_id,
                self.config.worker_batch_size(),
                self.config.lease_duration(),
            )
            .await?;

        let claimed = batch.len();
        for task in batch {
            self.process_task(&task).await;
        }
        Ok(claimed)
    }

    async fn process_task(&self, task: &ScheduledTask) {
        let Some(task_type) = TaskType::parse(&task.task_type) else {
            warn!(
                task_id = %task.id,
                task_type = %task.task_type,
                "Unknown task type; failing terminally"
            );
            self.resolve_terminal(task, "unknown task type").await;
            return;
        };

        let Some(handler) = self.registry.get(task_type) else {
            warn!(
                task_id = %task.id,
                task_type = %task.task_type,
                "No handler registered; failing terminally"
            );
            self.resolve_terminal(task, "no handler registered").await;
            return;
        };

        debug!(
            task_id = %task.id,
            task_type = %task.task_type,
            task_key = %task.task_key,
            attempt = task.attempt_count + 1,
            "Executing task"
        );

        let outcome = tokio::time::timeout(self.config.task_timeout(), handler.execute(task)).await;
        match outcome {
            Ok(Ok(())) => {
                match self
                    .dal
                    .scheduled_task()
                    .complete(task.id, &self.worker_id)
                    .await
                {
                    Ok(_) => {
                        debug!(task_id = %task.id, task_key = %task.task_key, "Task completed")
                    }
                    // Most often a lost lease: the reaper reset the row while
                    // the handler was running. The replayed execution must
                    // converge, which is why handlers are idempotent.
                    Err(e) => warn!(
                        task_id = %task.id,
                        error = %e,
                        "Could not record task completion"
                    ),
                }
            }
            Ok(Err(e)) if e.is_retryable() => {
                self.resolve_attempt(task, &e.to_string()).await;
            }
            Ok(Err(e)) => {
                warn!(
                    task_id = %task.id,
                    task_key = %task.task_key,
                    error = %e,
                    "Task failed terminally"
                );
                self.resolve_terminal(task, &e.to_string()).await;
            }
            Err(_) => {
                let msg = format!(
                    "handler exceeded timeout of {:?}",
                    self.config.task_timeout()
                );
                self.resolve_attempt(task, &msg).await;
            }
        }
    }

    async fn resolve_attempt(&self, task: &ScheduledTask, error: &str) {
        match self
            .dal
            .scheduled_task()
            .fail_attempt(task.id, &self.worker_id, error, self.config.task_backoff())
            .await
        {
            Ok(TaskResolution::Scheduled { attempt, next_due }) => {
                warn!(
                    task_id = %task.id,
                    task_key = %task.task_key,
                    attempt,
                    next_due = %next_due,
                    error = %error,
                    "Task attempt failed; retry scheduled"
                );
            }
            Ok(TaskResolution::Exhausted { attempt }) => {
                error!(
                    task_id = %task.id,
                    task_key = %task.task_key,
                    attempt,
                    error = %error,
                    "Task attempts exhausted"
                );
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Could not record task failure");
            }
        }
    }

    async fn resolve_terminal(&self, task: &ScheduledTask, error: &str) {
        if let Err(e) = self
            .dal
            .scheduled_task()
            .fail_terminal(task.id, &self.worker_id, error)
            .await
        {
            warn!(task_id = %task.id, error = %e, "Could not record terminal failure");
        }
    }
}

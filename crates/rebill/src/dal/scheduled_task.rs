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

//! Scheduled task persistence: enqueue, atomic claiming, lifecycle updates,
//! and lease reaping.
//!
//! Claiming is the one operation with backend-specific implementations.
//! PostgreSQL claims with a single `UPDATE ... WHERE id IN (SELECT ... FOR
//! UPDATE SKIP LOCKED)` so concurrent workers never block on each other's
//! candidate rows. SQLite has no row-level locking; there the claim is a
//! short immediate transaction, serialized by the single-connection pool.

use diesel::prelude::*;
use tracing::debug;

use super::{is_unique_violation, DAL};
use crate::database::schema::{outbox_events, scheduled_tasks};
use crate::database::{UniversalTimestamp, UniversalUuid};
use crate::dispatch_query;
use crate::error::StoreError;
use crate::models::outbox_event::NewOutboxEvent;
use crate::models::scheduled_task::{NewScheduledTask, ScheduledTask, TaskStatus};
use crate::retry::BackoffPolicy;

/// Outcome of `fail_attempt`: either another attempt is scheduled or the
/// attempt budget is exhausted and the task is FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskResolution {
    Scheduled {
        attempt: i32,
        next_due: UniversalTimestamp,
    },
    Exhausted {
        attempt: i32,
    },
}

/// DAL for scheduled task operations.
pub struct ScheduledTaskDAL<'a> {
    dal: &'a DAL,
}

impl<'a> ScheduledTaskDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Inserts a READY task. A `(tenant_id, task_key)` conflict maps to
    /// [`StoreError::DuplicateTaskKey`].
    pub async fn enqueue(&self, task: NewScheduledTask) -> Result<ScheduledTask, StoreError> {
        dispatch_query!(self.dal.database, |conn| {
            let tenant_id = task.tenant_id;
            let task_key = task.task_key.clone();
            diesel::insert_into(scheduled_tasks::table)
                .values(&task)
                .get_result::<ScheduledTask>(conn)
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        StoreError::DuplicateTaskKey {
                            tenant_id,
                            task_key,
                        }
                    } else {
                        StoreError::Database(e)
                    }
                })
        })
    }

    /// Inserts a task and an outbox event in one transaction.
    ///
    /// Handlers use this to chain follow-up work atomically with the event
    /// announcing the current step. Either insert's unique-key conflict rolls
    /// back both and surfaces as the corresponding duplicate error.
    pub async fn enqueue_with_event(
        &self,
        task: NewScheduledTask,
        event: NewOutboxEvent,
    ) -> Result<(), StoreError> {
        dispatch_query!(self.dal.database, |conn| {
            conn.transaction::<(), StoreError, _>(|conn| {
                diesel::insert_into(scheduled_tasks::table)
                    .values(&task)
                    .execute(conn)
                    .map_err(|e| {
                        if is_unique_violation(&e) {
                            StoreError::DuplicateTaskKey {
                                tenant_id: task.tenant_id,
                                task_key: task.task_key.clone(),
                            }
                        } else {
                            StoreError::Database(e)
                        }
                    })?;
                diesel::insert_into(outbox_events::table)
                    .values(&event)
                    .execute(conn)
                    .map_err(|e| {
                        if is_unique_violation(&e) {
                            StoreError::DuplicateEventKey {
                                tenant_id: event.tenant_id,
                                event_key: event.event_key.clone().unwrap_or_default(),
                            }
                        } else {
                            StoreError::Database(e)
                        }
                    })?;
                Ok(())
            })
        })
    }

    /// Atomically claims up to `limit` due READY tasks for `worker_id`,
    /// setting CLAIMED status and a lease of `lease` from now.
    ///
    /// Every returned row was READY when claimed; no row is ever returned to
    /// two workers.
    pub async fn claim_batch(
        &self,
        worker_id: &str,
        limit: usize,
        lease: std::time::Duration,
    ) -> Result<Vec<ScheduledTask>, StoreError> {
        let now = UniversalTimestamp::now();
        let locked_until = now.advanced_by(lease);
        let worker = worker_id.to_string();

        let claimed = match self.dal.backend() {
            #[cfg(feature = "postgres")]
            crate::database::BackendType::Postgres => {
                let conn = self
                    .dal
                    .database
                    .get_postgres_connection()
                    .await
                    .map_err(|e| StoreError::ConnectionPool(e.to_string()))?;

                conn.interact(move |conn| {
                    // SKIP LOCKED lets concurrent claimers pass over each
                    // other's candidate rows instead of blocking on them.
                    let query = format!(
                        r#"
                        UPDATE scheduled_tasks
                        SET status = 'CLAIMED',
                            locked_until = $1,
                            lock_owner = $2,
                            updated_at = $3
                        WHERE id IN (
                            SELECT id FROM scheduled_tasks
                            WHERE status = 'READY' AND due_at <= $3
                            ORDER BY due_at ASC
                            LIMIT {}
                            FOR UPDATE SKIP LOCKED
                        )
                        RETURNING *
                        "#,
                        limit
                    );
                    diesel::sql_query(query)
                        .bind::<diesel::sql_types::Text, _>(locked_until.to_sortable())
                        .bind::<diesel::sql_types::Text, _>(worker)
                        .bind::<diesel::sql_types::Text, _>(now.to_sortable())
                        .load::<ScheduledTask>(conn)
                        .map_err(StoreError::Database)
                })
                .await
                .map_err(|e| StoreError::ConnectionPool(e.to_string()))??
            }
            #[cfg(feature = "sqlite")]
            crate::database::BackendType::Sqlite => {
                let conn = self
                    .dal
                    .database
                    .get_sqlite_connection()
                    .await
                    .map_err(|e| StoreError::ConnectionPool(e.to_string()))?;

                conn.interact(move |conn| {
                    conn.immediate_transaction::<Vec<ScheduledTask>, StoreError, _>(|conn| {
                        let ids: Vec<UniversalUuid> = scheduled_tasks::table
                            .select(scheduled_tasks::id)
                            .filter(scheduled_tasks::status.eq(TaskStatus::Ready.as_str()))
                            .filter(scheduled_tasks::due_at.le(now))
                            .order(scheduled_tasks::due_at.asc())
                            .limit(limit as i64)
                            .load(conn)?;

                        if ids.is_empty() {
                            return Ok(Vec::new());
                        }

                        diesel::update(
                            scheduled_tasks::table.filter(scheduled_tasks::id.eq_any(&ids)),
                        )
                        .set((
                            scheduled_tasks::status.eq(TaskStatus::Claimed.as_str()),
                            scheduled_tasks::locked_until.eq(Some(locked_until)),
                            scheduled_tasks::lock_owner.eq(Some(worker.clone())),
                            scheduled_tasks::updated_at.eq(now),
                        ))
                        .execute(conn)?;

                        let rows = scheduled_tasks::table
                            .filter(scheduled_tasks::id.eq_any(&ids))
                            .order(scheduled_tasks::due_at.asc())
                            .load::<ScheduledTask>(conn)?;
                        Ok(rows)
                    })
                })
                .await
                .map_err(|e| StoreError::ConnectionPool(e.to_string()))??
            }
        };

        if !claimed.is_empty() {
            debug!(worker_id = %worker_id, count = claimed.len(), "Claimed task batch");
        }
        Ok(claimed)
    }

    /// Marks a CLAIMED task COMPLETED, clearing both lock fields.
    ///
    /// Fails with [`StoreError::InvalidTransition`] if the row is not CLAIMED
    /// by `worker_id` (e.g. the lease expired and the reaper reset it).
    pub async fn complete(
        &self,
        task_id: UniversalUuid,
        worker_id: &str,
    ) -> Result<ScheduledTask, StoreError> {
        let worker = worker_id.to_string();
        dispatch_query!(self.dal.database, |conn| {
            let now = UniversalTimestamp::now();
            let updated = diesel::update(
                scheduled_tasks::table
                    .find(task_id)
                    .filter(scheduled_tasks::status.eq(TaskStatus::Claimed.as_str()))
                    .filter(scheduled_tasks::lock_owner.eq(Some(worker.clone()))),
            )
            .set((
                scheduled_tasks::status.eq(TaskStatus::Completed.as_str()),
                scheduled_tasks::locked_until.eq(None::<UniversalTimestamp>),
                scheduled_tasks::lock_owner.eq(None::<String>),
                scheduled_tasks::completed_at.eq(Some(now)),
                scheduled_tasks::updated_at.eq(now),
            ))
            .execute(conn)?;

            if updated == 0 {
                let row = scheduled_tasks::table
                    .find(task_id)
                    .first::<ScheduledTask>(conn)
                    .optional()?
                    .ok_or(StoreError::NotFound {
                        entity: "scheduled task",
                        id: task_id,
                    })?;
                return Err(StoreError::InvalidTransition {
                    entity: "scheduled task",
                    id: task_id,
                    from: row.status,
                    to: "COMPLETED",
                });
            }

            scheduled_tasks::table
                .find(task_id)
                .first::<ScheduledTask>(conn)
                .map_err(StoreError::Database)
        })
    }

    /// Records a retryable failure on a CLAIMED task.
    ///
    /// Increments `attempt_count`; if attempts remain the task returns to
    /// READY with `due_at` pushed out by the backoff policy, otherwise it goes
    /// FAILED. Both lock fields are cleared either way.
    pub async fn fail_attempt(
        &self,
        task_id: UniversalUuid,
        worker_id: &str,
        error: &str,
        backoff: BackoffPolicy,
    ) -> Result<TaskResolution, StoreError> {
        let worker = worker_id.to_string();
        let error = error.to_string();
        dispatch_query!(self.dal.database, |conn| {
            let now = UniversalTimestamp::now();
            conn.transaction::<TaskResolution, StoreError, _>(|conn| {
                let task = scheduled_tasks::table
                    .find(task_id)
                    .first::<ScheduledTask>(conn)
                    .optional()?
                    .ok_or(StoreError::NotFound {
                        entity: "scheduled task",
                        id: task_id,
                    })?;

                if task.status != TaskStatus::Claimed.as_str()
                    || task.lock_owner.as_deref() != Some(worker.as_str())
                {
                    return Err(StoreError::InvalidTransition {
                        entity: "scheduled task",
                        id: task_id,
                        from: task.status,
                        to: "READY",
                    });
                }

                let attempt = task.attempt_count + 1;
                if attempt >= task.max_attempts {
                    diesel::update(scheduled_tasks::table.find(task_id))
                        .set((
                            scheduled_tasks::status.eq(TaskStatus::Failed.as_str()),
                            scheduled_tasks::attempt_count.eq(attempt),
                            scheduled_tasks::last_error.eq(Some(error.clone())),
                            scheduled_tasks::locked_until.eq(None::<UniversalTimestamp>),
                            scheduled_tasks::lock_owner.eq(None::<String>),
                            scheduled_tasks::updated_at.eq(now),
                        ))
                        .execute(conn)?;
                    Ok(TaskResolution::Exhausted { attempt })
                } else {
                    let next_due = now.advanced_by(backoff.delay_for(attempt));
                    diesel::update(scheduled_tasks::table.find(task_id))
                        .set((
                            scheduled_tasks::status.eq(TaskStatus::Ready.as_str()),
                            scheduled_tasks::attempt_count.eq(attempt),
                            scheduled_tasks::last_error.eq(Some(error.clone())),
                            scheduled_tasks::due_at.eq(next_due),
                            scheduled_tasks::locked_until.eq(None::<UniversalTimestamp>),
                            scheduled_tasks::lock_owner.eq(None::<String>),
                            scheduled_tasks::updated_at.eq(now),
                        ))
                        .execute(conn)?;
                    Ok(TaskResolution::Scheduled { attempt, next_due })
                }
            })
        })
    }

    /// Marks a CLAIMED task FAILED immediately, for non-retryable errors.
    ///
    /// The attempt still counts, but remaining budget is not consulted.
    pub async fn fail_terminal(
        &self,
        task_id: UniversalUuid,
        worker_id: &str,
        error: &str,
    ) -> Result<(), StoreError> {
        let worker = worker_id.to_string();
        let error = error.to_string();
        dispatch_query!(self.dal.database, |conn| {
            let now = UniversalTimestamp::now();
            let updated = diesel::update(
                scheduled_tasks::table
                    .find(task_id)
                    .filter(scheduled_tasks::status.eq(TaskStatus::Claimed.as_str()))
                    .filter(scheduled_tasks::lock_owner.eq(Some(worker.clone()))),
            )
            .set((
                scheduled_tasks::status.eq(TaskStatus::Failed.as_str()),
                scheduled_tasks::attempt_count.eq(scheduled_tasks::attempt_count + 1),
                scheduled_tasks::last_error.eq(Some(error.clone())),
                scheduled_tasks::locked_until.eq(None::<UniversalTimestamp>),
                scheduled_tasks::lock_owner.eq(None::<String>),
                scheduled_tasks::updated_at.eq(now),
            ))
            .execute(conn)?;

            if updated == 0 {
                let row = scheduled_tasks::table
                    .find(task_id)
                    .first::<ScheduledTask>(conn)
                    .optional()?
                    .ok_or(StoreError::NotFound {
                        entity: "scheduled task",
                        id: task_id,
                    })?;
                return Err(StoreError::InvalidTransition {
                    entity: "scheduled task",
                    id: task_id,
                    from: row.status,
                    to: "FAILED",
                });
            }
            Ok(())
        })
    }

    /// Resets CLAIMED tasks whose lease has expired.
    ///
    /// With `penalize` false (the default policy) the reset does not consume
    /// an attempt: the row returns to READY with `attempt_count` untouched.
    /// With `penalize` true the expiry counts as an attempt, and tasks that
    /// exhaust their budget go FAILED instead. Returns the number of rows
    /// released.
    pub async fn release_expired(&self, penalize: bool) -> Result<usize, StoreError> {
        dispatch_query!(self.dal.database, |conn| {
            let now = UniversalTimestamp::now();
            if !penalize {
                let released = diesel::update(
                    scheduled_tasks::table
                        .filter(scheduled_tasks::status.eq(TaskStatus::Claimed.as_str()))
                        .filter(scheduled_tasks::locked_until.lt(now)),
                )
                .set((
                    scheduled_tasks::status.eq(TaskStatus::Ready.as_str()),
                    scheduled_tasks::locked_until.eq(None::<UniversalTimestamp>),
                    scheduled_tasks::lock_owner.eq(None::<String>),
                    scheduled_tasks::updated_at.eq(now),
                ))
                .execute(conn)?;
                return Ok(released);
            }

            conn.transaction::<usize, StoreError, _>(|conn| {
                let expired: Vec<ScheduledTask> = scheduled_tasks::table
                    .filter(scheduled_tasks::status.eq(TaskStatus::Claimed.as_str()))
                    .filter(scheduled_tasks::locked_until.lt(now))
                    .load(conn)?;

                let mut released = 0;
                for task in expired {
                    let attempt = task.attempt_count + 1;
                    let new_status = if attempt >= task.max_attempts {
                        TaskStatus::Failed
                    } else {
                        TaskStatus::Ready
                    };
                    // Guard repeated in the update so a row completed between
                    // the read and the write is left alone.
                    released += diesel::update(
                        scheduled_tasks::table
                            .find(task.id)
                            .filter(scheduled_tasks::status.eq(TaskStatus::Claimed.as_str()))
                            .filter(scheduled_tasks::locked_until.lt(now)),
                    )
                    .set((
                        scheduled_tasks::status.eq(new_status.as_str()),
                        scheduled_tasks::attempt_count.eq(attempt),
                        scheduled_tasks::last_error.eq(Some("lease expired".to_string())),
                        scheduled_tasks::locked_until.eq(None::<UniversalTimestamp>),
                        scheduled_tasks::lock_owner.eq(None::<String>),
                        scheduled_tasks::updated_at.eq(now),
                    ))
                    .execute(conn)?;
                }
                Ok(released)
            })
        })
    }

    /// Fetches a task by id.
    pub async fn get_by_id(&self, task_id: UniversalUuid) -> Result<ScheduledTask, StoreError> {
        dispatch_query!(self.dal.database, |conn| {
            scheduled_tasks::table
                .find(task_id)
                .first::<ScheduledTask>(conn)
                .optional()?
                .ok_or(StoreError::NotFound {
                    entity: "scheduled task",
                    id: task_id,
                })
        })
    }

    /// Fetches a task by its tenant-scoped idempotency key.
    pub async fn get_by_key(
        &self,
        tenant_id: UniversalUuid,
        task_key: &str,
    ) -> Result<Option<ScheduledTask>, StoreError> {
        let task_key = task_key.to_string();
        dispatch_query!(self.dal.database, |conn| {
            scheduled_tasks::table
                .filter(scheduled_tasks::tenant_id.eq(tenant_id))
                .filter(scheduled_tasks::task_key.eq(task_key))
                .first::<ScheduledTask>(conn)
                .optional()
                .map_err(StoreError::Database)
        })
    }
}

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

//! Scheduled task rows: the durable work queue.
//!
//! Lifecycle: READY -> CLAIMED -> COMPLETED | FAILED, with CLAIMED -> READY on
//! retryable failure or lease expiry. READY rows always have both lock fields
//! NULL; CLAIMED rows always have both set.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::database::schema::scheduled_tasks;
use crate::database::{UniversalTimestamp, UniversalUuid};

/// Task lifecycle status stored in the `status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Ready,
    Claimed,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Ready => "READY",
            TaskStatus::Claimed => "CLAIMED",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "READY" => Some(TaskStatus::Ready),
            "CLAIMED" => Some(TaskStatus::Claimed),
            "COMPLETED" => Some(TaskStatus::Completed),
            "FAILED" => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    /// COMPLETED and FAILED rows are never touched again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted scheduled task.
#[derive(Debug, Clone, Queryable, QueryableByName, Selectable, Serialize, Deserialize)]
#[diesel(table_name = scheduled_tasks)]
pub struct ScheduledTask {
    pub id: UniversalUuid,
    pub tenant_id: UniversalUuid,
    pub task_type: String,
    pub task_key: String,
    pub status: String,
    pub due_at: UniversalTimestamp,
    pub attempt_count: i32,
    pub max_attempts: i32,
    /// JSON document interpreted by the task type's handler
    pub payload: String,
    pub locked_until: Option<UniversalTimestamp>,
    pub lock_owner: Option<String>,
    pub last_error: Option<String>,
    pub created_at: UniversalTimestamp,
    pub updated_at: UniversalTimestamp,
    pub completed_at: Option<UniversalTimestamp>,
}

impl ScheduledTask {
    pub fn status(&self) -> Option<TaskStatus> {
        TaskStatus::parse(&self.status)
    }
}

/// Insertable form of a scheduled task.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = scheduled_tasks)]
pub struct NewScheduledTask {
    pub id: UniversalUuid,
    pub tenant_id: UniversalUuid,
    pub task_type: String,
    pub task_key: String,
    pub status: String,
    pub due_at: UniversalTimestamp,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub payload: String,
    pub created_at: UniversalTimestamp,
    pub updated_at: UniversalTimestamp,
}

impl NewScheduledTask {
    /// Default attempt budget for billing tasks.
    pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

    /// A READY task due at `due_at` with a JSON payload.
    pub fn new(
        tenant_id: UniversalUuid,
        task_type: impl Into<String>,
        task_key: impl Into<String>,
        payload: &serde_json::Value,
        due_at: UniversalTimestamp,
    ) -> Self {
        let now = UniversalTimestamp::now();
        Self {
            id: UniversalUuid::new_v4(),
            tenant_id,
            task_type: task_type.into(),
            task_key: task_key.into(),
            status: TaskStatus::Ready.as_str().to_string(),
            due_at,
            attempt_count: 0,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            payload: payload.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

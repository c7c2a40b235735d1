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

//! The task handler trait and the registry the worker dispatches through.

use std::collections::HashMap;

use async_trait::async_trait;

use super::TaskType;
use crate::error::HandlerError;
use crate::models::scheduled_task::ScheduledTask;

/// Executes one task type.
///
/// Handlers must be idempotent under replay: a task can be claimed, executed
/// to completion, and then re-executed by another worker if the first one
/// died before recording the result. Handlers derive collaborator idempotency
/// keys from `task.task_key` and swallow duplicate-key errors on chained
/// writes so the replay converges on the same outcome.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// The task type this handler executes.
    fn task_type(&self) -> TaskType;

    /// Executes the task. Errors are classified by
    /// [`HandlerError::is_retryable`]: retryable failures consume an attempt,
    /// the rest fail the task outright.
    async fn execute(&self, task: &ScheduledTask) -> Result<(), HandlerError>;
}

/// Maps task types to their handlers.
pub struct HandlerRegistry {
    handlers: HashMap<TaskType, Box<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers a handler under its own `task_type()`. A later registration
    /// for the same type replaces the earlier one.
    pub fn register(&mut self, handler: Box<dyn TaskHandler>) {
        self.handlers.insert(handler.task_type(), handler);
    }

    pub fn get(&self, task_type: TaskType) -> Option<&dyn TaskHandler> {
        self.handlers.get(&task_type).map(|h| h.as_ref())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&str> = self.handlers.keys().map(|t| t.as_str()).collect();
        types.sort_unstable();
        f.debug_struct("HandlerRegistry")
            .field("task_types", &types)
            .finish()
    }
}

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

//! Engine configuration.

use std::time::Duration;

use crate::error::ConfigError;
use crate::retry::BackoffPolicy;

/// Configuration for the billing engine's worker, reaper, and dispatcher
/// loops.
///
/// Build with [`EngineConfig::builder`]; defaults match production settings.
///
/// # Example
///
/// ```rust,ignore
/// let config = EngineConfig::builder()
///     .db_url("postgres://localhost/billing")
///     .worker_batch_size(20)
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    db_url: String,
    db_pool_size: u32,
    worker_id: Option<String>,
    worker_batch_size: usize,
    lease_duration: Duration,
    worker_poll_interval: Duration,
    task_timeout: Duration,
    task_backoff: BackoffPolicy,
    reaper_interval: Duration,
    penalize_reaped: bool,
    dispatcher_poll_interval: Duration,
    dispatcher_batch_size: usize,
    delivery_timeout: Duration,
    delivery_backoff: BackoffPolicy,
    delivery_max_attempts: i32,
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Reads `DATABASE_URL` (honoring a `.env` file) and applies defaults for
    /// everything else.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let db_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvironment("DATABASE_URL".to_string()))?;
        Self::builder().db_url(db_url).build()
    }

    pub fn db_url(&self) -> &str {
        &self.db_url
    }

    pub fn db_pool_size(&self) -> u32 {
        self.db_pool_size
    }

    /// Explicit worker identity, if configured. Workers otherwise generate a
    /// UUID per instance at startup.
    pub fn worker_id(&self) -> Option<&str> {
        self.worker_id.as_deref()
    }

    /// Maximum tasks claimed per batch.
    pub fn worker_batch_size(&self) -> usize {
        self.worker_batch_size
    }

    /// How long a claim lease lasts before the reaper may reset the task.
    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    pub fn worker_poll_interval(&self) -> Duration {
        self.worker_poll_interval
    }

    /// Wall-clock budget per handler execution; overruns count as retryable
    /// failures.
    pub fn task_timeout(&self) -> Duration {
        self.task_timeout
    }

    pub fn task_backoff(&self) -> BackoffPolicy {
        self.task_backoff
    }

    pub fn reaper_interval(&self) -> Duration {
        self.reaper_interval
    }

    /// Whether a reaped lease consumes an attempt.
    pub fn penalize_reaped(&self) -> bool {
        self.penalize_reaped
    }

    pub fn dispatcher_poll_interval(&self) -> Duration {
        self.dispatcher_poll_interval
    }

    /// Maximum events resolved and deliveries attempted per relay cycle.
    pub fn dispatcher_batch_size(&self) -> usize {
        self.dispatcher_batch_size
    }

    /// HTTP timeout per delivery attempt.
    pub fn delivery_timeout(&self) -> Duration {
        self.delivery_timeout
    }

    pub fn delivery_backoff(&self) -> BackoffPolicy {
        self.delivery_backoff
    }

    /// Attempt budget per (endpoint, event) delivery.
    pub fn delivery_max_attempts(&self) -> i32 {
        self.delivery_max_attempts
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct EngineConfigBuilder {
    db_url: Option<String>,
    db_pool_size: u32,
    worker_id: Option<String>,
    worker_batch_size: usize,
    lease_duration: Duration,
    worker_poll_interval: Duration,
    task_timeout: Duration,
    task_backoff: BackoffPolicy,
    reaper_interval: Duration,
    penalize_reaped: bool,
    dispatcher_poll_interval: Duration,
    dispatcher_batch_size: usize,
    delivery_timeout: Duration,
    delivery_backoff: BackoffPolicy,
    delivery_max_attempts: i32,
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self {
            db_url: None,
            db_pool_size: 10,
            worker_id: None,
            worker_batch_size: 10,
            lease_duration: Duration::from_secs(300),
            worker_poll_interval: Duration::from_secs(1),
            task_timeout: Duration::from_secs(60),
            task_backoff: BackoffPolicy::new(Duration::from_secs(60), Duration::from_secs(3600)),
            reaper_interval: Duration::from_secs(60),
            penalize_reaped: false,
            dispatcher_poll_interval: Duration::from_secs(1),
            dispatcher_batch_size: 50,
            delivery_timeout: Duration::from_secs(30),
            delivery_backoff: BackoffPolicy::new(
                Duration::from_secs(30),
                Duration::from_secs(3600),
            ),
            delivery_max_attempts: 5,
        }
    }
}

impl EngineConfigBuilder {
    pub fn db_url(mut self, db_url: impl Into<String>) -> Self {
        self.db_url = Some(db_url.into());
        self
    }

    pub fn db_pool_size(mut self, size: u32) -> Self {
        self.db_pool_size = size;
        self
    }

    pub fn worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    pub fn worker_batch_size(mut self, size: usize) -> Self {
        self.worker_batch_size = size;
        self
    }

    pub fn lease_duration(mut self, lease: Duration) -> Self {
        self.lease_duration = lease;
        self
    }

    pub fn worker_poll_interval(mut self, interval: Duration) -> Self {
        self.worker_poll_interval = interval;
        self
    }

    pub fn task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn task_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.task_backoff = backoff;
        self
    }

    pub fn reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval = interval;
        self
    }

    pub fn penalize_reaped(mut self, penalize: bool) -> Self {
        self.penalize_reaped = penalize;
        self
    }

    pub fn dispatcher_poll_interval(mut self, interval: Duration) -> Self {
        self.dispatcher_poll_interval = interval;
        self
    }

    pub fn dispatcher_batch_size(mut self, size: usize) -> Self {
        self.dispatcher_batch_size = size;
        self
    }

    pub fn delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    pub fn delivery_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.delivery_backoff = backoff;
        self
    }

    pub fn delivery_max_attempts(mut self, attempts: i32) -> Self {
        self.delivery_max_attempts = attempts;
        self
    }

    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        let db_url = self
            .db_url
            .ok_or_else(|| ConfigError::Invalid("db_url is required".to_string()))?;
        if db_url.is_empty() {
            return Err(ConfigError::Invalid("db_url must not be empty".to_string()));
        }
        if self.db_pool_size == 0 {
            return Err(ConfigError::Invalid(
                "db_pool_size must be at least 1".to_string(),
            ));
        }
        if self.worker_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "worker_batch_size must be at least 1".to_string(),
            ));
        }
        if self.lease_duration.is_zero() {
            return Err(ConfigError::Invalid(
                "lease_duration must be positive".to_string(),
            ));
        }
        if self.dispatcher_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "dispatcher_batch_size must be at least 1".to_string(),
            ));
        }
        if self.delivery_max_attempts < 1 {
            return Err(ConfigError::Invalid(
                "delivery_max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(EngineConfig {
            db_url,
            db_pool_size: self.db_pool_size,
            worker_id: self.worker_id,
            worker_batch_size: self.worker_batch_size,
            lease_duration: self.lease_duration,
            worker_poll_interval: self.worker_poll_interval,
            task_timeout: self.task_timeout,
            task_backoff: self.task_backoff,
            reaper_interval: self.reaper_interval,
            penalize_reaped: self.penalize_reaped,
            dispatcher_poll_interval: self.dispatcher_poll_interval,
            dispatcher_batch_size: self.dispatcher_batch_size,
            delivery_timeout: self.delivery_timeout,
            delivery_backoff: self.delivery_backoff,
            delivery_max_attempts: self.delivery_max_attempts,
        })
    }
}

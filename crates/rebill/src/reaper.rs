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

//! The lease reaper: returns tasks abandoned by crashed or stalled workers to
//! the queue.
//!
//! A CLAIMED row whose `locked_until` has passed is reset to READY. By
//! default the reset does not consume an attempt; crashes are not the task's
//! fault. See [`EngineConfig::penalize_reaped`](crate::config::EngineConfig).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{error, info};

use crate::config::EngineConfig;
use crate::dal::DAL;
use crate::error::StoreError;

/// Periodically releases expired leases.
pub struct LeaseReaper {
    dal: DAL,
    config: Arc<EngineConfig>,
    shutdown: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
}

impl LeaseReaper {
    pub fn new(dal: DAL, config: Arc<EngineConfig>) -> Self {
        Self {
            dal,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Arc::new(Notify::new()),
        }
    }

    /// Signals the run loop to stop after the current sweep.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.shutdown_notify.notify_waiters();
    }

    /// Runs until [`shutdown`](Self::shutdown) is called.
    pub async fn run(&self) {
        info!(
            interval = ?self.config.reaper_interval(),
            penalize = self.config.penalize_reaped(),
            "Lease reaper started"
        );
        while !self.shutdown.load(Ordering::Relaxed) {
            match self.run_once().await {
                Ok(0) => {}
                Ok(released) => {
                    info!(released, "Released expired task leases");
                }
                Err(e) => {
                    error!(error = %e, "Lease sweep failed");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.reaper_interval()) => {}
                _ = self.shutdown_notify.notified() => {}
            }
        }
        info!("Lease reaper stopped");
    }

    /// One sweep. Returns the number of leases released.
    pub async fn run_once(&self) -> Result<usize, StoreError> {
        self.dal
            .scheduled_task()
            .release_expired(self.config.penalize_reaped())
            .await
    }
}

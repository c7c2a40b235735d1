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

//! The billing engine: wires the worker, lease reaper, and webhook
//! dispatcher into background loops over one database.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::adapters::Adapters;
use crate::config::EngineConfig;
use crate::dal::DAL;
use crate::database::Database;
use crate::error::EngineError;
use crate::handlers;
use crate::reaper::LeaseReaper;
use crate::webhook::{DeliveryTransport, HttpTransport, WebhookDispatcher};
use crate::worker::TaskWorker;

/// A running engine instance.
///
/// # Example
///
/// ```rust,ignore
/// let config = EngineConfig::builder()
///     .db_url("postgres://localhost/billing")
///     .build()?;
/// let engine = BillingEngine::start(config, Adapters::mocked()).await?;
/// // ... enqueue tasks, register endpoints ...
/// engine.shutdown().await;
/// ```
pub struct BillingEngine {
    dal: DAL,
    worker: Arc<TaskWorker>,
    reaper: Arc<LeaseReaper>,
    dispatcher: Arc<WebhookDispatcher>,
    handles: Vec<JoinHandle<()>>,
}

impl BillingEngine {
    /// Connects, migrates, and spawns the three background loops, delivering
    /// webhooks over HTTP.
    pub async fn start(config: EngineConfig, adapters: Adapters) -> Result<Self, EngineError> {
        let transport = Arc::new(HttpTransport::new(config.delivery_timeout())?);
        Self::start_with_transport(config, adapters, transport).await
    }

    /// Like [`start`](Self::start) with a caller-supplied delivery transport.
    pub async fn start_with_transport(
        config: EngineConfig,
        adapters: Adapters,
        transport: Arc<dyn DeliveryTransport>,
    ) -> Result<Self, EngineError> {
        let database = Database::new(config.db_url(), "", config.db_pool_size());
        database.run_migrations().await?;
        let dal = DAL::new(database);

        let config = Arc::new(config);
        let registry = Arc::new(handlers::standard_registry(dal.clone(), &adapters));

        let worker = Arc::new(TaskWorker::new(dal.clone(), registry, config.clone()));
        let reaper = Arc::new(LeaseReaper::new(dal.clone(), config.clone()));
        let dispatcher = Arc::new(WebhookDispatcher::new(dal.clone(), transport, config));

        let handles = vec![
            tokio::spawn({
                let worker = worker.clone();
                async move { worker.run().await }
            }),
            tokio::spawn({
                let reaper = reaper.clone();
                async move { reaper.run().await }
            }),
            tokio::spawn({
                let dispatcher = dispatcher.clone();
                async move { dispatcher.run().await }
            }),
        ];

        info!(worker_id = %worker.worker_id(), "Billing engine started");
        Ok(Self {
            dal,
            worker,
            reaper,
            dispatcher,
            handles,
        })
    }

    /// The engine's DAL, for enqueueing tasks and registering endpoints.
    pub fn dal(&self) -> &DAL {
        &self.dal
    }

    /// Stops all three loops and waits for them to finish their current
    /// cycles.
    pub async fn shutdown(self) {
        info!("Billing engine shutting down");
        self.worker.shutdown();
        self.reaper.shutdown();
        self.dispatcher.shutdown();
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("Billing engine stopped");
    }
}

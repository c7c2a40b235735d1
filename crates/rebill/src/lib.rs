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

//! # Rebill
//!
//! A durable execution engine for subscription billing. State lives entirely
//! in the database (PostgreSQL or SQLite, selected at runtime from the
//! connection URL); any number of engine instances can run against the same
//! database and coordinate purely through row state and atomic conditional
//! updates.
//!
//! ## Components
//!
//! - **Task store**: a durable queue of billing tasks with tenant-scoped
//!   idempotency keys, lease-based claiming, bounded retries, and a reaper
//!   that returns abandoned leases to the queue.
//! - **Handlers**: idempotent executors for the five billing task types
//!   (subscription/product renewal, delivery and order creation, entitlement
//!   grants), calling collaborator systems through adapter traits.
//! - **Outbox**: events appended transactionally with the state changes they
//!   describe, deduplicated by tenant-scoped event keys.
//! - **Webhook dispatcher**: fans events out to subscribed endpoints with
//!   HMAC-SHA256 signed requests and per-endpoint retry.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use rebill::{Adapters, BillingEngine, EngineConfig};
//!
//! rebill::init_logging();
//! let config = EngineConfig::builder()
//!     .db_url("postgres://localhost/billing")
//!     .build()?;
//! let engine = BillingEngine::start(config, Adapters::mocked()).await?;
//! ```

pub mod adapters;
pub mod config;
pub mod dal;
pub mod database;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod models;
pub mod reaper;
pub mod retry;
pub mod task;
pub mod webhook;
pub mod worker;

pub use adapters::Adapters;
pub use config::EngineConfig;
pub use dal::DAL;
pub use database::{Database, UniversalBool, UniversalTimestamp, UniversalUuid};
pub use engine::BillingEngine;
pub use error::{
    AdapterError, ConfigError, DispatchError, EngineError, HandlerError, StoreError,
    TransportError,
};
pub use reaper::LeaseReaper;
pub use retry::BackoffPolicy;
pub use task::{HandlerRegistry, TaskHandler, TaskType};
pub use webhook::WebhookDispatcher;
pub use worker::TaskWorker;

/// Initializes tracing with an env-filter (`RUST_LOG`), defaulting to `info`.
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

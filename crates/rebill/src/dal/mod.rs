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

//! Data access layer with runtime backend selection.
//!
//! Each table has its own DAL type obtained from the [`DAL`] facade. Queries
//! written with the Diesel query builder run unchanged on both backends via
//! [`dispatch_query!`]; the task claim path is the one operation implemented
//! per backend, because its locking semantics genuinely differ.

use crate::database::{AnyPool, BackendType, Database};

pub mod outbox_event;
pub mod scheduled_task;
pub mod webhook_delivery;
pub mod webhook_endpoint;

pub use outbox_event::OutboxEventDAL;
pub use scheduled_task::{ScheduledTaskDAL, TaskResolution};
pub use webhook_delivery::{DeliveryResolution, WebhookDeliveryDAL};
pub use webhook_endpoint::WebhookEndpointDAL;

/// Runs a Diesel closure body on whichever backend the database was opened
/// against.
///
/// The body is written once against `$conn` and compiled for each enabled
/// backend; pool and interact errors become `StoreError::ConnectionPool`. The
/// macro evaluates to the closure's own `Result`, so call sites end with `?`.
///
/// # Example
///
/// ```rust,ignore
/// let row = dispatch_query!(self.dal.database, |conn| {
///     scheduled_tasks::table
///         .find(task_id)
///         .first::<ScheduledTask>(conn)
///         .map_err(StoreError::Database)
/// })?;
/// ```
#[macro_export]
macro_rules! dispatch_query {
    ($database:expr, |$conn:ident| $body:expr) => {{
        match $database.backend() {
            #[cfg(feature = "postgres")]
            $crate::database::BackendType::Postgres => {
                let pooled = $database
                    .get_postgres_connection()
                    .await
                    .map_err(|e| $crate::error::StoreError::ConnectionPool(e.to_string()))?;
                pooled
                    .interact(move |$conn| $body)
                    .await
                    .map_err(|e| $crate::error::StoreError::ConnectionPool(e.to_string()))?
            }
            #[cfg(feature = "sqlite")]
            $crate::database::BackendType::Sqlite => {
                let pooled = $database
                    .get_sqlite_connection()
                    .await
                    .map_err(|e| $crate::error::StoreError::ConnectionPool(e.to_string()))?;
                pooled
                    .interact(move |$conn| $body)
                    .await
                    .map_err(|e| $crate::error::StoreError::ConnectionPool(e.to_string()))?
            }
        }
    }};
}

/// True when the error is a unique-constraint violation on either backend.
pub(crate) fn is_unique_violation(err: &diesel::result::Error) -> bool {
    matches!(
        err,
        diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _
        )
    )
}

/// The data access layer facade.
///
/// `DAL` is `Clone`; each clone references the same underlying pool.
#[derive(Clone, Debug)]
pub struct DAL {
    /// The database instance with connection pool
    pub database: Database,
}

impl DAL {
    pub fn new(database: Database) -> Self {
        DAL { database }
    }

    /// Returns the backend type for this DAL instance.
    pub fn backend(&self) -> BackendType {
        self.database.backend()
    }

    /// Returns the connection pool.
    pub fn pool(&self) -> AnyPool {
        self.database.pool()
    }

    /// Scheduled task operations: enqueue, claim, complete, fail, reap.
    pub fn scheduled_task(&self) -> ScheduledTaskDAL {
        ScheduledTaskDAL::new(self)
    }

    /// Outbox event operations.
    pub fn outbox_event(&self) -> OutboxEventDAL {
        OutboxEventDAL::new(self)
    }

    /// Webhook endpoint operations.
    pub fn webhook_endpoint(&self) -> WebhookEndpointDAL {
        WebhookEndpointDAL::new(self)
    }

    /// Webhook delivery operations.
    pub fn webhook_delivery(&self) -> WebhookDeliveryDAL {
        WebhookDeliveryDAL::new(self)
    }
}

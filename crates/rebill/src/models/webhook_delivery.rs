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

//! Webhook delivery rows: one per (endpoint, event) pair.
//!
//! Lifecycle: PENDING -> DELIVERED | FAILED. A delivery row carries the
//! canonical request body rendered once at creation, so every endpoint and
//! every retry signs byte-identical payloads.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::database::schema::webhook_deliveries;
use crate::database::{UniversalTimestamp, UniversalUuid};

/// Delivery lifecycle status stored in the `status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "PENDING",
            DeliveryStatus::Delivered => "DELIVERED",
            DeliveryStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(DeliveryStatus::Pending),
            "DELIVERED" => Some(DeliveryStatus::Delivered),
            "FAILED" => Some(DeliveryStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Failed)
    }
}

/// A persisted webhook delivery.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = webhook_deliveries)]
pub struct WebhookDelivery {
    pub id: UniversalUuid,
    pub tenant_id: UniversalUuid,
    pub webhook_endpoint_id: UniversalUuid,
    pub outbox_event_id: UniversalUuid,
    pub event_type: String,
    /// Canonical JSON request body, identical across endpoints and retries
    pub body: String,
    pub status: String,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub next_attempt_at: UniversalTimestamp,
    pub last_attempted_at: Option<UniversalTimestamp>,
    pub response_code: Option<i32>,
    pub last_error: Option<String>,
    pub created_at: UniversalTimestamp,
    pub updated_at: UniversalTimestamp,
}

impl WebhookDelivery {
    pub fn status(&self) -> Option<DeliveryStatus> {
        DeliveryStatus::parse(&self.status)
    }

    pub fn is_terminal(&self) -> bool {
        self.status().map(|s| s.is_terminal()).unwrap_or(false)
    }
}

/// Insertable form of a webhook delivery.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = webhook_deliveries)]
// No Option fields, so this only changes the generated insert types; it is
// required for SQLite batch insert combined with `on_conflict_do_nothing`.
#[diesel(treat_none_as_default_value = false)]
pub struct NewWebhookDelivery {
    pub id: UniversalUuid,
    pub tenant_id: UniversalUuid,
    pub webhook_endpoint_id: UniversalUuid,
    pub outbox_event_id: UniversalUuid,
    pub event_type: String,
    pub body: String,
    pub status: String,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub next_attempt_at: UniversalTimestamp,
    pub created_at: UniversalTimestamp,
    pub updated_at: UniversalTimestamp,
}

impl NewWebhookDelivery {
    /// Default attempt budget per endpoint.
    pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;

    /// A PENDING delivery due immediately.
    pub fn new(
        tenant_id: UniversalUuid,
        webhook_endpoint_id: UniversalUuid,
        outbox_event_id: UniversalUuid,
        event_type: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let now = UniversalTimestamp::now();
        Self {
            id: UniversalUuid::new_v4(),
            tenant_id,
            webhook_endpoint_id,
            outbox_event_id,
            event_type: event_type.into(),
            body: body.into(),
            status: DeliveryStatus::Pending.as_str().to_string(),
            attempt_count: 0,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            next_attempt_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

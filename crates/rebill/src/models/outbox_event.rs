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

//! Transactional outbox rows.
//!
//! Events are appended in the same transaction as the state change they
//! describe and relayed to webhook endpoints asynchronously. An optional
//! `event_key` is unique per tenant and makes the append idempotent.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::database::schema::outbox_events;
use crate::database::{UniversalBool, UniversalTimestamp, UniversalUuid};

/// A persisted outbox event.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = outbox_events)]
pub struct OutboxEvent {
    pub id: UniversalUuid,
    pub tenant_id: UniversalUuid,
    /// Dot-separated type, e.g. `subscription.renewed`
    pub event_type: String,
    pub event_key: Option<String>,
    /// JSON document forwarded as the webhook body's `data` field
    pub payload: String,
    pub published: UniversalBool,
    pub created_at: UniversalTimestamp,
}

/// Insertable form of an outbox event.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = outbox_events)]
pub struct NewOutboxEvent {
    pub id: UniversalUuid,
    pub tenant_id: UniversalUuid,
    pub event_type: String,
    pub event_key: Option<String>,
    pub payload: String,
    pub published: UniversalBool,
    pub created_at: UniversalTimestamp,
}

impl NewOutboxEvent {
    /// An unpublished event without an idempotency key.
    pub fn new(
        tenant_id: UniversalUuid,
        event_type: impl Into<String>,
        payload: &serde_json::Value,
    ) -> Self {
        Self {
            id: UniversalUuid::new_v4(),
            tenant_id,
            event_type: event_type.into(),
            event_key: None,
            payload: payload.to_string(),
            published: UniversalBool::new(false),
            created_at: UniversalTimestamp::now(),
        }
    }

    /// An unpublished event deduplicated by `event_key` within the tenant.
    pub fn with_key(
        tenant_id: UniversalUuid,
        event_type: impl Into<String>,
        event_key: impl Into<String>,
        payload: &serde_json::Value,
    ) -> Self {
        let mut event = Self::new(tenant_id, event_type, payload);
        event.event_key = Some(event_key.into());
        event
    }
}

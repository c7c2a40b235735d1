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

//! Webhook endpoint registrations.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::database::schema::webhook_endpoints;
use crate::database::{UniversalTimestamp, UniversalUuid};
use crate::webhook::pattern;

/// Endpoint status stored in the `status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointStatus {
    Active,
    /// Paused by the tenant; kept distinct from DISABLED (turned off
    /// operationally, e.g. after persistent failures)
    Inactive,
    Disabled,
}

impl EndpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointStatus::Active => "ACTIVE",
            EndpointStatus::Inactive => "INACTIVE",
            EndpointStatus::Disabled => "DISABLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(EndpointStatus::Active),
            "INACTIVE" => Some(EndpointStatus::Inactive),
            "DISABLED" => Some(EndpointStatus::Disabled),
            _ => None,
        }
    }
}

/// A persisted webhook endpoint.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = webhook_endpoints)]
pub struct WebhookEndpoint {
    pub id: UniversalUuid,
    pub tenant_id: UniversalUuid,
    pub url: String,
    /// JSON array of patterns; empty means every event type
    pub event_patterns: String,
    /// Shared secret for HMAC-SHA256 request signing
    pub secret: String,
    pub status: String,
    pub created_at: UniversalTimestamp,
    pub updated_at: UniversalTimestamp,
}

impl WebhookEndpoint {
    pub fn is_active(&self) -> bool {
        EndpointStatus::parse(&self.status) == Some(EndpointStatus::Active)
    }

    /// The stored pattern list. An unparseable column is treated as empty,
    /// which subscribes the endpoint to everything rather than silently
    /// dropping its deliveries.
    pub fn patterns(&self) -> Vec<String> {
        serde_json::from_str(&self.event_patterns).unwrap_or_default()
    }

    /// Whether this endpoint subscribes to `event_type`.
    pub fn subscribes_to(&self, event_type: &str) -> bool {
        pattern::matches_any(&self.patterns(), event_type)
    }
}

/// Insertable form of a webhook endpoint.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = webhook_endpoints)]
pub struct NewWebhookEndpoint {
    pub id: UniversalUuid,
    pub tenant_id: UniversalUuid,
    pub url: String,
    pub event_patterns: String,
    pub secret: String,
    pub status: String,
    pub created_at: UniversalTimestamp,
    pub updated_at: UniversalTimestamp,
}

impl NewWebhookEndpoint {
    /// An ACTIVE endpoint subscribed to the given patterns (empty = all).
    pub fn new(
        tenant_id: UniversalUuid,
        url: impl Into<String>,
        event_patterns: &[&str],
        secret: impl Into<String>,
    ) -> Self {
        let now = UniversalTimestamp::now();
        Self {
            id: UniversalUuid::new_v4(),
            tenant_id,
            url: url.into(),
            event_patterns: serde_json::json!(event_patterns).to_string(),
            secret: secret.into(),
            status: EndpointStatus::Active.as_str().to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

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

//! Outbox event persistence.

use diesel::prelude::*;

use super::{is_unique_violation, DAL};
use crate::database::schema::outbox_events;
use crate::database::{UniversalBool, UniversalUuid};
use crate::dispatch_query;
use crate::error::StoreError;
use crate::models::outbox_event::{NewOutboxEvent, OutboxEvent};

/// DAL for outbox event operations.
pub struct OutboxEventDAL<'a> {
    dal: &'a DAL,
}

impl<'a> OutboxEventDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Appends an event. A `(tenant_id, event_key)` conflict maps to
    /// [`StoreError::DuplicateEventKey`]; events without a key never conflict.
    pub async fn append(&self, event: NewOutboxEvent) -> Result<OutboxEvent, StoreError> {
        dispatch_query!(self.dal.database, |conn| {
            let tenant_id = event.tenant_id;
            let event_key = event.event_key.clone().unwrap_or_default();
            diesel::insert_into(outbox_events::table)
                .values(&event)
                .get_result::<OutboxEvent>(conn)
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        StoreError::DuplicateEventKey {
                            tenant_id,
                            event_key,
                        }
                    } else {
                        StoreError::Database(e)
                    }
                })
        })
    }

    /// Oldest unpublished events, up to `limit`.
    pub async fn unpublished(&self, limit: usize) -> Result<Vec<OutboxEvent>, StoreError> {
        dispatch_query!(self.dal.database, |conn| {
            outbox_events::table
                .filter(outbox_events::published.eq(UniversalBool::new(false)))
                .order(outbox_events::created_at.asc())
                .limit(limit as i64)
                .load::<OutboxEvent>(conn)
                .map_err(StoreError::Database)
        })
    }

    /// Marks an event published. Idempotent; fails only if the event does not
    /// exist.
    pub async fn mark_published(&self, event_id: UniversalUuid) -> Result<(), StoreError> {
        dispatch_query!(self.dal.database, |conn| {
            let updated = diesel::update(
                outbox_events::table
                    .find(event_id)
                    .filter(outbox_events::published.eq(UniversalBool::new(false))),
            )
            .set(outbox_events::published.eq(UniversalBool::new(true)))
            .execute(conn)?;

            if updated == 0 {
                let exists = outbox_events::table
                    .find(event_id)
                    .first::<OutboxEvent>(conn)
                    .optional()?
                    .is_some();
                if !exists {
                    return Err(StoreError::NotFound {
                        entity: "outbox event",
                        id: event_id,
                    });
                }
            }
            Ok(())
        })
    }

    /// Fetches an event by id.
    pub async fn get_by_id(&self, event_id: UniversalUuid) -> Result<OutboxEvent, StoreError> {
        dispatch_query!(self.dal.database, |conn| {
            outbox_events::table
                .find(event_id)
                .first::<OutboxEvent>(conn)
                .optional()?
                .ok_or(StoreError::NotFound {
                    entity: "outbox event",
                    id: event_id,
                })
        })
    }

    /// Fetches an event by its tenant-scoped idempotency key.
    pub async fn get_by_key(
        &self,
        tenant_id: UniversalUuid,
        event_key: &str,
    ) -> Result<Option<OutboxEvent>, StoreError> {
        let event_key = event_key.to_string();
        dispatch_query!(self.dal.database, |conn| {
            outbox_events::table
                .filter(outbox_events::tenant_id.eq(tenant_id))
                .filter(outbox_events::event_key.eq(Some(event_key)))
                .first::<OutboxEvent>(conn)
                .optional()
                .map_err(StoreError::Database)
        })
    }
}

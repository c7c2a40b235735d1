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

//! Webhook delivery persistence.

use diesel::prelude::*;

use super::DAL;
use crate::database::schema::webhook_deliveries;
use crate::database::{UniversalTimestamp, UniversalUuid};
use crate::dispatch_query;
use crate::error::StoreError;
use crate::models::webhook_delivery::{DeliveryStatus, NewWebhookDelivery, WebhookDelivery};
use crate::retry::BackoffPolicy;

/// Outcome of `record_failure`: either another attempt is scheduled or the
/// attempt budget is exhausted and the delivery is FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryResolution {
    Rescheduled {
        attempt: i32,
        next_attempt_at: UniversalTimestamp,
    },
    Exhausted {
        attempt: i32,
    },
}

/// DAL for webhook delivery operations.
pub struct WebhookDeliveryDAL<'a> {
    dal: &'a DAL,
}

impl<'a> WebhookDeliveryDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Inserts PENDING deliveries, skipping `(endpoint, event)` pairs that
    /// already exist. Re-running fan-out for an event is therefore harmless.
    /// Returns the number of rows actually inserted.
    pub async fn create_pending(
        &self,
        deliveries: Vec<NewWebhookDelivery>,
    ) -> Result<usize, StoreError> {
        if deliveries.is_empty() {
            return Ok(0);
        }
        dispatch_query!(self.dal.database, |conn| {
            diesel::insert_into(webhook_deliveries::table)
                .values(&deliveries)
                .on_conflict_do_nothing()
                .execute(conn)
                .map_err(StoreError::Database)
        })
    }

    /// PENDING deliveries whose `next_attempt_at` has passed, oldest first.
    pub async fn due(&self, limit: usize) -> Result<Vec<WebhookDelivery>, StoreError> {
        dispatch_query!(self.dal.database, |conn| {
            let now = UniversalTimestamp::now();
            webhook_deliveries::table
                .filter(webhook_deliveries::status.eq(DeliveryStatus::Pending.as_str()))
                .filter(webhook_deliveries::next_attempt_at.le(now))
                .order(webhook_deliveries::next_attempt_at.asc())
                .limit(limit as i64)
                .load::<WebhookDelivery>(conn)
                .map_err(StoreError::Database)
        })
    }

    /// Records a 2xx response: the delivery goes DELIVERED.
    pub async fn record_success(
        &self,
        delivery_id: UniversalUuid,
        response_code: i32,
    ) -> Result<(), StoreError> {
        dispatch_query!(self.dal.database, |conn| {
            let now = UniversalTimestamp::now();
            let updated = diesel::update(
                webhook_deliveries::table
                    .find(delivery_id)
                    .filter(webhook_deliveries::status.eq(DeliveryStatus::Pending.as_str())),
            )
            .set((
                webhook_deliveries::status.eq(DeliveryStatus::Delivered.as_str()),
                webhook_deliveries::attempt_count.eq(webhook_deliveries::attempt_count + 1),
                webhook_deliveries::response_code.eq(Some(response_code)),
                webhook_deliveries::last_attempted_at.eq(Some(now)),
                webhook_deliveries::last_error.eq(None::<String>),
                webhook_deliveries::updated_at.eq(now),
            ))
            .execute(conn)?;

            if updated == 0 {
                return Err(StoreError::NotFound {
                    entity: "webhook delivery",
                    id: delivery_id,
                });
            }
            Ok(())
        })
    }

    /// Records a failed attempt. If budget remains the delivery stays PENDING
    /// with `next_attempt_at` pushed out by the backoff policy, otherwise it
    /// goes FAILED.
    pub async fn record_failure(
        &self,
        delivery_id: UniversalUuid,
        response_code: Option<i32>,
        error: &str,
        backoff: BackoffPolicy,
    ) -> Result<DeliveryResolution, StoreError> {
        let error = error.to_string();
        dispatch_query!(self.dal.database, |conn| {
            let now = UniversalTimestamp::now();
            conn.transaction::<DeliveryResolution, StoreError, _>(|conn| {
                let delivery = webhook_deliveries::table
                    .find(delivery_id)
                    .first::<WebhookDelivery>(conn)
                    .optional()?
                    .ok_or(StoreError::NotFound {
                        entity: "webhook delivery",
                        id: delivery_id,
                    })?;

                if delivery.status != DeliveryStatus::Pending.as_str() {
                    return Err(StoreError::InvalidTransition {
                        entity: "webhook delivery",
                        id: delivery_id,
                        from: delivery.status,
                        to: "PENDING",
                    });
                }

                let attempt = delivery.attempt_count + 1;
                if attempt >= delivery.max_attempts {
                    diesel::update(webhook_deliveries::table.find(delivery_id))
                        .set((
                            webhook_deliveries::status.eq(DeliveryStatus::Failed.as_str()),
                            webhook_deliveries::attempt_count.eq(attempt),
                            webhook_deliveries::response_code.eq(response_code),
                            webhook_deliveries::last_attempted_at.eq(Some(now)),
                            webhook_deliveries::last_error.eq(Some(error.clone())),
                            webhook_deliveries::updated_at.eq(now),
                        ))
                        .execute(conn)?;
                    Ok(DeliveryResolution::Exhausted { attempt })
                } else {
                    let next_attempt_at = now.advanced_by(backoff.delay_for(attempt));
                    diesel::update(webhook_deliveries::table.find(delivery_id))
                        .set((
                            webhook_deliveries::attempt_count.eq(attempt),
                            webhook_deliveries::response_code.eq(response_code),
                            webhook_deliveries::last_attempted_at.eq(Some(now)),
                            webhook_deliveries::last_error.eq(Some(error.clone())),
                            webhook_deliveries::next_attempt_at.eq(next_attempt_at),
                            webhook_deliveries::updated_at.eq(now),
                        ))
                        .execute(conn)?;
                    Ok(DeliveryResolution::Rescheduled {
                        attempt,
                        next_attempt_at,
                    })
                }
            })
        })
    }

    /// Fails a PENDING delivery outright without consuming attempts against
    /// an endpoint, used when the endpoint itself is gone or disabled.
    pub async fn mark_failed(
        &self,
        delivery_id: UniversalUuid,
        error: &str,
    ) -> Result<(), StoreError> {
        let error = error.to_string();
        dispatch_query!(self.dal.database, |conn| {
            let now = UniversalTimestamp::now();
            let updated = diesel::update(
                webhook_deliveries::table
                    .find(delivery_id)
                    .filter(webhook_deliveries::status.eq(DeliveryStatus::Pending.as_str())),
            )
            .set((
                webhook_deliveries::status.eq(DeliveryStatus::Failed.as_str()),
                webhook_deliveries::last_error.eq(Some(error.clone())),
                webhook_deliveries::updated_at.eq(now),
            ))
            .execute(conn)?;

            if updated == 0 {
                return Err(StoreError::NotFound {
                    entity: "webhook delivery",
                    id: delivery_id,
                });
            }
            Ok(())
        })
    }

    /// All deliveries for an outbox event.
    pub async fn for_event(
        &self,
        event_id: UniversalUuid,
    ) -> Result<Vec<WebhookDelivery>, StoreError> {
        dispatch_query!(self.dal.database, |conn| {
            webhook_deliveries::table
                .filter(webhook_deliveries::outbox_event_id.eq(event_id))
                .order(webhook_deliveries::created_at.asc())
                .load::<WebhookDelivery>(conn)
                .map_err(StoreError::Database)
        })
    }
}

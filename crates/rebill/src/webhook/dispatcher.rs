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

//! The webhook dispatcher: relays outbox events to subscribed endpoints.
//!
//! Each relay cycle runs three phases:
//!
//! 1. **Resolve**: for every unpublished event without delivery rows, find
//!    the tenant's ACTIVE endpoints whose patterns match, render the
//!    canonical body once, and create one PENDING delivery per endpoint.
//!    Events nobody subscribes to publish immediately.
//! 2. **Deliver**: attempt every PENDING delivery whose `next_attempt_at`
//!    has passed, concurrently. A 2xx marks it DELIVERED; anything else
//!    consumes an attempt and reschedules with exponential backoff until the
//!    budget is exhausted and the row goes FAILED.
//! 3. **Settle**: an event is marked published once every delivery for it is
//!    terminal. One slow endpoint keeps the event unpublished; it never
//!    blocks sibling deliveries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use super::signature;
use super::transport::{DeliveryRequest, DeliveryTransport};
use crate::config::EngineConfig;
use crate::dal::{DeliveryResolution, DAL};
use crate::error::{DispatchError, StoreError};
use crate::models::outbox_event::OutboxEvent;
use crate::models::webhook_delivery::{NewWebhookDelivery, WebhookDelivery};

/// Counters for one relay cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    /// Delivery rows created in the resolve phase
    pub resolved: usize,
    /// Deliveries confirmed with a 2xx
    pub delivered: usize,
    /// Deliveries rescheduled for another attempt
    pub rescheduled: usize,
    /// Deliveries that became terminal FAILED
    pub failed: usize,
    /// Events marked published
    pub published: usize,
}

enum AttemptOutcome {
    Delivered,
    Rescheduled,
    Failed,
}

/// Relays outbox events to webhook endpoints.
pub struct WebhookDispatcher {
    dal: DAL,
    transport: Arc<dyn DeliveryTransport>,
    config: Arc<EngineConfig>,
    shutdown: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
}

impl WebhookDispatcher {
    pub fn new(dal: DAL, transport: Arc<dyn DeliveryTransport>, config: Arc<EngineConfig>) -> Self {
        Self {
            dal,
            transport,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Arc::new(Notify::new()),
        }
    }

    /// Signals the run loop to stop after the current cycle.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.shutdown_notify.notify_waiters();
    }

    /// Runs until [`shutdown`](Self::shutdown) is called.
    pub async fn run(&self) {
        info!("Webhook dispatcher started");
        while !self.shutdown.load(Ordering::Relaxed) {
            match self.run_once().await {
                Ok(stats) if stats == RelayStats::default() => {}
                Ok(stats) => {
                    debug!(
                        resolved = stats.resolved,
                        delivered = stats.delivered,
                        rescheduled = stats.rescheduled,
                        failed = stats.failed,
                        published = stats.published,
                        "Relay cycle complete"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Relay cycle failed");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.dispatcher_poll_interval()) => {}
                _ = self.shutdown_notify.notified() => {}
            }
        }
        info!("Webhook dispatcher stopped");
    }

    /// One relay cycle: resolve, deliver, settle.
    pub async fn run_once(&self) -> Result<RelayStats, DispatchError> {
        let mut stats = RelayStats::default();
        self.resolve_events(&mut stats).await?;
        self.deliver_due(&mut stats).await?;
        self.settle_published(&mut stats).await?;
        Ok(stats)
    }

    /// Phase 1: fan unpublished events out into PENDING deliveries.
    async fn resolve_events(&self, stats: &mut RelayStats) -> Result<(), DispatchError> {
        let events = self
            .dal
            .outbox_event()
            .unpublished(self.config.dispatcher_batch_size())
            .await?;

        for event in events {
            // Delivery rows already exist if a previous cycle resolved this
            // event; the unique (endpoint, event) index would also catch it.
            let existing = self.dal.webhook_delivery().for_event(event.id).await?;
            if !existing.is_empty() {
                continue;
            }

            let endpoints = self
                .dal
                .webhook_endpoint()
                .active_for_tenant(event.tenant_id)
                .await?;
            let subscribed: Vec<_> = endpoints
                .into_iter()
                .filter(|ep| ep.subscribes_to(&event.event_type))
                .collect();

            if subscribed.is_empty() {
                debug!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    "No subscribed endpoints; publishing immediately"
                );
                self.dal.outbox_event().mark_published(event.id).await?;
                stats.published += 1;
                continue;
            }

            // One canonical body per event, shared by every endpoint and
            // every retry, so all signatures cover identical bytes.
            let body = render_body(&event)?;
            let deliveries: Vec<NewWebhookDelivery> = subscribed
                .iter()
                .map(|ep| {
                    NewWebhookDelivery::new(
                        event.tenant_id,
                        ep.id,
                        event.id,
                        event.event_type.clone(),
                        body.clone(),
                    )
                    .with_max_attempts(self.config.delivery_max_attempts())
                })
                .collect();
            let created = self.dal.webhook_delivery().create_pending(deliveries).await?;
            debug!(
                event_id = %event.id,
                event_type = %event.event_type,
                endpoints = created,
                "Event fanned out"
            );
            stats.resolved += created;
        }
        Ok(())
    }

    /// Phase 2: attempt all due deliveries concurrently.
    async fn deliver_due(&self, stats: &mut RelayStats) -> Result<(), DispatchError> {
        let due = self
            .dal
            .webhook_delivery()
            .due(self.config.dispatcher_batch_size())
            .await?;
        if due.is_empty() {
            return Ok(());
        }

        let attempts = due.into_iter().map(|d| self.attempt_delivery(d));
        for result in join_all(attempts).await {
            match result {
                Ok(AttemptOutcome::Delivered) => stats.delivered += 1,
                Ok(AttemptOutcome::Rescheduled) => stats.rescheduled += 1,
                Ok(AttemptOutcome::Failed) => stats.failed += 1,
                Err(e) => warn!(error = %e, "Delivery attempt could not be recorded"),
            }
        }
        Ok(())
    }

    async fn attempt_delivery(
        &self,
        delivery: WebhookDelivery,
    ) -> Result<AttemptOutcome, DispatchError> {
        let endpoint = match self
            .dal
            .webhook_endpoint()
            .get_by_id(delivery.webhook_endpoint_id)
            .await
        {
            Ok(endpoint) => endpoint,
            Err(StoreError::NotFound { .. }) => {
                self.dal
                    .webhook_delivery()
                    .mark_failed(delivery.id, "endpoint deleted")
                    .await?;
                return Ok(AttemptOutcome::Failed);
            }
            Err(e) => return Err(e.into()),
        };

        if !endpoint.is_active() {
            self.dal
                .webhook_delivery()
                .mark_failed(delivery.id, "endpoint disabled")
                .await?;
            return Ok(AttemptOutcome::Failed);
        }

        let sig = signature::sign(&endpoint.secret, delivery.body.as_bytes());
        let event_id = delivery.outbox_event_id.to_string();
        let request = DeliveryRequest {
            url: &endpoint.url,
            body: &delivery.body,
            signature: &sig,
            event_id: &event_id,
            event_type: &delivery.event_type,
        };

        let (response_code, error) = match self.transport.deliver(request).await {
            Ok(response) if response.is_success() => {
                self.dal
                    .webhook_delivery()
                    .record_success(delivery.id, response.status as i32)
                    .await?;
                debug!(
                    delivery_id = %delivery.id,
                    endpoint = %endpoint.url,
                    status = response.status,
                    "Webhook delivered"
                );
                return Ok(AttemptOutcome::Delivered);
            }
            Ok(response) => (
                Some(response.status as i32),
                format!("endpoint returned status {}", response.status),
            ),
            Err(e) => (None, e.to_string()),
        };

        let resolution = self
            .dal
            .webhook_delivery()
            .record_failure(
                delivery.id,
                response_code,
                &error,
                self.config.delivery_backoff(),
            )
            .await?;
        match resolution {
            DeliveryResolution::Rescheduled {
                attempt,
                next_attempt_at,
            } => {
                warn!(
                    delivery_id = %delivery.id,
                    endpoint = %endpoint.url,
                    attempt,
                    next_attempt_at = %next_attempt_at,
                    error = %error,
                    "Webhook attempt failed; retry scheduled"
                );
                Ok(AttemptOutcome::Rescheduled)
            }
            DeliveryResolution::Exhausted { attempt } => {
                error!(
                    delivery_id = %delivery.id,
                    endpoint = %endpoint.url,
                    attempt,
                    error = %error,
                    "Webhook delivery attempts exhausted"
                );
                Ok(AttemptOutcome::Failed)
            }
        }
    }

    /// Phase 3: publish events whose deliveries are all terminal.
    async fn settle_published(&self, stats: &mut RelayStats) -> Result<(), DispatchError> {
        let events = self
            .dal
            .outbox_event()
            .unpublished(self.config.dispatcher_batch_size())
            .await?;

        for event in events {
            let deliveries = self.dal.webhook_delivery().for_event(event.id).await?;
            // No rows yet means the event has not been resolved; zero-match
            // events were published in phase 1.
            if deliveries.is_empty() {
                continue;
            }
            if deliveries.iter().all(|d| d.is_terminal()) {
                self.dal.outbox_event().mark_published(event.id).await?;
                stats.published += 1;
                debug!(event_id = %event.id, "Event published");
            }
        }
        Ok(())
    }
}

/// Renders the canonical webhook body for an event.
fn render_body(event: &OutboxEvent) -> Result<String, DispatchError> {
    let data: serde_json::Value = serde_json::from_str(&event.payload)?;
    let envelope = serde_json::json!({
        "eventId": event.id,
        "eventType": event.event_type,
        "timestamp": event.created_at.to_sortable(),
        "data": data,
    });
    Ok(envelope.to_string())
}

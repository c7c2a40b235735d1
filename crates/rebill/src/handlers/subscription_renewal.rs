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

//! SUBSCRIPTION_RENEWAL: charge the subscription for the current cycle,
//! schedule the next cycle, and announce the renewal.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::ignore_duplicates;
use crate::adapters::{PaymentAdapter, PaymentOutcome};
use crate::dal::DAL;
use crate::database::UniversalTimestamp;
use crate::error::HandlerError;
use crate::models::outbox_event::NewOutboxEvent;
use crate::models::scheduled_task::ScheduledTask;
use crate::task::{self, SubscriptionRenewalPayload, TaskHandler, TaskType, DEFAULT_PERIOD_DAYS};

pub struct SubscriptionRenewalHandler {
    dal: DAL,
    payments: Arc<dyn PaymentAdapter>,
}

impl SubscriptionRenewalHandler {
    pub fn new(dal: DAL, payments: Arc<dyn PaymentAdapter>) -> Self {
        Self { dal, payments }
    }
}

#[async_trait]
impl TaskHandler for SubscriptionRenewalHandler {
    fn task_type(&self) -> TaskType {
        TaskType::SubscriptionRenewal
    }

    async fn execute(&self, task: &ScheduledTask) -> Result<(), HandlerError> {
        let payload: SubscriptionRenewalPayload = serde_json::from_str(&task.payload)?;

        let outcome = self
            .payments
            .charge(payload.subscription_id, &task.task_key)
            .await?;

        let reference = match outcome {
            PaymentOutcome::Approved { reference } => reference,
            PaymentOutcome::Declined { reason } => {
                warn!(
                    subscription_id = %payload.subscription_id,
                    task_key = %task.task_key,
                    reason = %reason,
                    "Subscription renewal charge declined"
                );
                return Err(HandlerError::Collaborator(format!(
                    "payment declined: {}",
                    reason
                )));
            }
        };

        let period_days = payload.period_days.unwrap_or(DEFAULT_PERIOD_DAYS);
        let period_start = task.due_at;
        let period_end = UniversalTimestamp(period_start.0 + chrono::Duration::days(period_days));

        // Next cycle and the renewal event commit atomically; duplicate keys
        // mean an earlier execution already committed them.
        let next_task = task::subscription_renewal(task.tenant_id, &payload, period_end);
        let event = NewOutboxEvent::with_key(
            task.tenant_id,
            "subscription.renewed",
            format!("subscription.renewed:{}", task.task_key),
            &serde_json::json!({
                "subscriptionId": payload.subscription_id,
                "paymentReference": reference,
                "periodStart": period_start.to_sortable(),
                "periodEnd": period_end.to_sortable(),
            }),
        );
        ignore_duplicates(
            self.dal
                .scheduled_task()
                .enqueue_with_event(next_task, event)
                .await,
        )?;

        info!(
            subscription_id = %payload.subscription_id,
            payment_reference = %reference,
            next_due = %period_end,
            "Subscription renewed"
        );
        Ok(())
    }
}

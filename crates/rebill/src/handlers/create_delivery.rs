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

//! CREATE_DELIVERY: materialize a delivery for a paid invoice, then chain a
//! CREATE_ORDER task for it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::ignore_duplicates;
use crate::adapters::DeliveryAdapter;
use crate::dal::DAL;
use crate::database::UniversalTimestamp;
use crate::error::HandlerError;
use crate::models::outbox_event::NewOutboxEvent;
use crate::models::scheduled_task::ScheduledTask;
use crate::task::{self, CreateDeliveryPayload, CreateOrderPayload, TaskHandler, TaskType};

pub struct CreateDeliveryHandler {
    dal: DAL,
    deliveries: Arc<dyn DeliveryAdapter>,
}

impl CreateDeliveryHandler {
    pub fn new(dal: DAL, deliveries: Arc<dyn DeliveryAdapter>) -> Self {
        Self { dal, deliveries }
    }
}

#[async_trait]
impl TaskHandler for CreateDeliveryHandler {
    fn task_type(&self) -> TaskType {
        TaskType::CreateDelivery
    }

    async fn execute(&self, task: &ScheduledTask) -> Result<(), HandlerError> {
        let payload: CreateDeliveryPayload = serde_json::from_str(&task.payload)?;

        let delivery_id = self
            .deliveries
            .create_delivery(payload.invoice_id, payload.subscription_id, &task.task_key)
            .await?;

        let order_payload = CreateOrderPayload {
            delivery_id,
            invoice_id: payload.invoice_id,
            subscription_id: payload.subscription_id,
        };
        let order_task =
            task::create_order(task.tenant_id, &order_payload, UniversalTimestamp::now());
        let event = NewOutboxEvent::with_key(
            task.tenant_id,
            "delivery.created",
            format!("delivery.created:{}", task.task_key),
            &serde_json::json!({
                "deliveryId": delivery_id,
                "invoiceId": payload.invoice_id,
                "subscriptionId": payload.subscription_id,
            }),
        );
        ignore_duplicates(
            self.dal
                .scheduled_task()
                .enqueue_with_event(order_task, event)
                .await,
        )?;

        info!(
            delivery_id = %delivery_id,
            invoice_id = %payload.invoice_id,
            "Delivery created"
        );
        Ok(())
    }
}

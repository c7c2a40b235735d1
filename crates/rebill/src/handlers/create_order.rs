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

//! CREATE_ORDER: place the commerce order for a materialized delivery.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::ignore_duplicates;
use crate::adapters::CommerceAdapter;
use crate::dal::DAL;
use crate::error::HandlerError;
use crate::models::outbox_event::NewOutboxEvent;
use crate::models::scheduled_task::ScheduledTask;
use crate::task::{CreateOrderPayload, TaskHandler, TaskType};

pub struct CreateOrderHandler {
    dal: DAL,
    commerce: Arc<dyn CommerceAdapter>,
}

impl CreateOrderHandler {
    pub fn new(dal: DAL, commerce: Arc<dyn CommerceAdapter>) -> Self {
        Self { dal, commerce }
    }
}

#[async_trait]
impl TaskHandler for CreateOrderHandler {
    fn task_type(&self) -> TaskType {
        TaskType::CreateOrder
    }

    async fn execute(&self, task: &ScheduledTask) -> Result<(), HandlerError> {
        let payload: CreateOrderPayload = serde_json::from_str(&task.payload)?;

        let order_reference = self
            .commerce
            .create_order(payload.delivery_id, &task.task_key)
            .await?;

        let event = NewOutboxEvent::with_key(
            task.tenant_id,
            "order.created",
            format!("order.created:{}", task.task_key),
            &serde_json::json!({
                "orderReference": order_reference,
                "deliveryId": payload.delivery_id,
                "invoiceId": payload.invoice_id,
                "subscriptionId": payload.subscription_id,
            }),
        );
        ignore_duplicates(self.dal.outbox_event().append(event).await.map(|_| ()))?;

        info!(
            order_reference = %order_reference,
            delivery_id = %payload.delivery_id,
            "Order created"
        );
        Ok(())
    }
}

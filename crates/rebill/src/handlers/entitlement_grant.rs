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

//! ENTITLEMENT_GRANT: grant or revoke the entitlements an invoice pays for.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::ignore_duplicates;
use crate::adapters::EntitlementAdapter;
use crate::dal::DAL;
use crate::error::HandlerError;
use crate::models::outbox_event::NewOutboxEvent;
use crate::models::scheduled_task::ScheduledTask;
use crate::task::{EntitlementAction, EntitlementGrantPayload, TaskHandler, TaskType};

pub struct EntitlementGrantHandler {
    dal: DAL,
    entitlements: Arc<dyn EntitlementAdapter>,
}

impl EntitlementGrantHandler {
    pub fn new(dal: DAL, entitlements: Arc<dyn EntitlementAdapter>) -> Self {
        Self { dal, entitlements }
    }
}

#[async_trait]
impl TaskHandler for EntitlementGrantHandler {
    fn task_type(&self) -> TaskType {
        TaskType::EntitlementGrant
    }

    async fn execute(&self, task: &ScheduledTask) -> Result<(), HandlerError> {
        let payload: EntitlementGrantPayload = serde_json::from_str(&task.payload)?;

        let event_type = match payload.action {
            EntitlementAction::Grant => {
                self.entitlements
                    .grant(payload.subscription_id, payload.invoice_id, &task.task_key)
                    .await?;
                "entitlement.granted"
            }
            EntitlementAction::Revoke => {
                self.entitlements
                    .revoke(payload.subscription_id, payload.invoice_id, &task.task_key)
                    .await?;
                "entitlement.revoked"
            }
        };

        let event = NewOutboxEvent::with_key(
            task.tenant_id,
            event_type,
            format!("{}:{}", event_type, task.task_key),
            &serde_json::json!({
                "subscriptionId": payload.subscription_id,
                "invoiceId": payload.invoice_id,
            }),
        );
        ignore_duplicates(self.dal.outbox_event().append(event).await.map(|_| ()))?;

        info!(
            subscription_id = %payload.subscription_id,
            invoice_id = %payload.invoice_id,
            action = ?payload.action,
            "Entitlement updated"
        );
        Ok(())
    }
}

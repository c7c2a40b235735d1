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

//! Task types, payload schemas, and task constructors.
//!
//! Task keys follow fixed naming conventions so that scheduling the same
//! business action twice hits the `(tenant_id, task_key)` unique constraint
//! instead of creating duplicate work. Renewal keys carry the cycle date,
//! making each billing cycle a fresh row.

pub mod registry;

pub use registry::{HandlerRegistry, TaskHandler};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::{UniversalTimestamp, UniversalUuid};
use crate::models::scheduled_task::NewScheduledTask;

/// The five task types the engine executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    SubscriptionRenewal,
    ProductRenewal,
    CreateDelivery,
    CreateOrder,
    EntitlementGrant,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::SubscriptionRenewal => "SUBSCRIPTION_RENEWAL",
            TaskType::ProductRenewal => "PRODUCT_RENEWAL",
            TaskType::CreateDelivery => "CREATE_DELIVERY",
            TaskType::CreateOrder => "CREATE_ORDER",
            TaskType::EntitlementGrant => "ENTITLEMENT_GRANT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SUBSCRIPTION_RENEWAL" => Some(TaskType::SubscriptionRenewal),
            "PRODUCT_RENEWAL" => Some(TaskType::ProductRenewal),
            "CREATE_DELIVERY" => Some(TaskType::CreateDelivery),
            "CREATE_ORDER" => Some(TaskType::CreateOrder),
            "ENTITLEMENT_GRANT" => Some(TaskType::EntitlementGrant),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload for SUBSCRIPTION_RENEWAL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRenewalPayload {
    pub subscription_id: Uuid,
    /// Billing cycle length; defaults to 30 days when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_days: Option<i64>,
}

/// Payload for PRODUCT_RENEWAL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRenewalPayload {
    pub subscription_id: Uuid,
    pub product_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_days: Option<i64>,
}

/// Payload for CREATE_DELIVERY.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeliveryPayload {
    pub invoice_id: Uuid,
    pub subscription_id: Uuid,
}

/// Payload for CREATE_ORDER.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderPayload {
    pub delivery_id: Uuid,
    pub invoice_id: Uuid,
    pub subscription_id: Uuid,
}

/// Grant or revoke, carried in the ENTITLEMENT_GRANT payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntitlementAction {
    Grant,
    Revoke,
}

/// Payload for ENTITLEMENT_GRANT.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementGrantPayload {
    pub invoice_id: Uuid,
    pub subscription_id: Uuid,
    pub action: EntitlementAction,
}

/// Default billing cycle when a renewal payload omits `period_days`.
pub const DEFAULT_PERIOD_DAYS: i64 = 30;

fn cycle_suffix(due_at: UniversalTimestamp) -> String {
    due_at.0.format("%Y%m%d").to_string()
}

/// A SUBSCRIPTION_RENEWAL task for the cycle due at `due_at`.
pub fn subscription_renewal(
    tenant_id: UniversalUuid,
    payload: &SubscriptionRenewalPayload,
    due_at: UniversalTimestamp,
) -> NewScheduledTask {
    let key = format!(
        "subscription_renewal_{}_{}",
        payload.subscription_id,
        cycle_suffix(due_at)
    );
    NewScheduledTask::new(
        tenant_id,
        TaskType::SubscriptionRenewal.as_str(),
        key,
        &serde_json::json!(payload),
        due_at,
    )
}

/// A PRODUCT_RENEWAL task for the cycle due at `due_at`.
pub fn product_renewal(
    tenant_id: UniversalUuid,
    payload: &ProductRenewalPayload,
    due_at: UniversalTimestamp,
) -> NewScheduledTask {
    let key = format!(
        "product_renewal_{}_{}_{}",
        payload.subscription_id,
        payload.product_id,
        cycle_suffix(due_at)
    );
    NewScheduledTask::new(
        tenant_id,
        TaskType::ProductRenewal.as_str(),
        key,
        &serde_json::json!(payload),
        due_at,
    )
}

/// A CREATE_DELIVERY task, keyed by invoice so an invoice materializes at
/// most one delivery.
pub fn create_delivery(
    tenant_id: UniversalUuid,
    payload: &CreateDeliveryPayload,
    due_at: UniversalTimestamp,
) -> NewScheduledTask {
    let key = format!("delivery_{}", payload.invoice_id);
    NewScheduledTask::new(
        tenant_id,
        TaskType::CreateDelivery.as_str(),
        key,
        &serde_json::json!(payload),
        due_at,
    )
}

/// A CREATE_ORDER task, keyed by delivery.
pub fn create_order(
    tenant_id: UniversalUuid,
    payload: &CreateOrderPayload,
    due_at: UniversalTimestamp,
) -> NewScheduledTask {
    let key = format!("order_{}", payload.delivery_id);
    NewScheduledTask::new(
        tenant_id,
        TaskType::CreateOrder.as_str(),
        key,
        &serde_json::json!(payload),
        due_at,
    )
}

/// An ENTITLEMENT_GRANT task, keyed by invoice.
pub fn entitlement_grant(
    tenant_id: UniversalUuid,
    payload: &EntitlementGrantPayload,
    due_at: UniversalTimestamp,
) -> NewScheduledTask {
    let key = format!("entitlement_grant_{}", payload.invoice_id);
    NewScheduledTask::new(
        tenant_id,
        TaskType::EntitlementGrant.as_str(),
        key,
        &serde_json::json!(payload),
        due_at,
    )
}

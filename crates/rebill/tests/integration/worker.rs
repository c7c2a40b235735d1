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

//! Worker tests: claiming and handler dispatch end to end, with mock
//! collaborators and a mock webhook transport.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serial_test::serial;
use uuid::Uuid;

use rebill::adapters::{
    Adapters, MockCommerceAdapter, MockDeliveryAdapter, MockEntitlementAdapter,
    MockPaymentAdapter, PaymentOutcome,
};
use rebill::database::{UniversalTimestamp, UniversalUuid};
use rebill::error::HandlerError;
use rebill::handlers::standard_registry;
use rebill::models::scheduled_task::{NewScheduledTask, ScheduledTask, TaskStatus};
use rebill::task::{
    self, CreateDeliveryPayload, CreateOrderPayload, EntitlementAction, EntitlementGrantPayload,
    HandlerRegistry, SubscriptionRenewalPayload, TaskHandler, TaskType,
};
use rebill::webhook::{MockTransport, WebhookDispatcher};
use rebill::{EngineConfig, TaskWorker};

use crate::fixtures::{fresh_dal, test_config_builder};

struct MockBundle {
    payments: Arc<MockPaymentAdapter>,
    deliveries: Arc<MockDeliveryAdapter>,
    commerce: Arc<MockCommerceAdapter>,
    entitlements: Arc<MockEntitlementAdapter>,
}

impl MockBundle {
    fn new() -> Self {
        Self {
            payments: Arc::new(MockPaymentAdapter::new()),
            deliveries: Arc::new(MockDeliveryAdapter::new()),
            commerce: Arc::new(MockCommerceAdapter::new()),
            entitlements: Arc::new(MockEntitlementAdapter::new()),
        }
    }

    fn adapters(&self) -> Adapters {
        Adapters {
            payments: self.payments.clone(),
            deliveries: self.deliveries.clone(),
            commerce: self.commerce.clone(),
            entitlements: self.entitlements.clone(),
        }
    }
}

fn worker_config(worker_id: &str) -> Arc<EngineConfig> {
    Arc::new(test_config_builder().worker_id(worker_id).build().unwrap())
}

fn standard_worker(dal: &rebill::DAL, mocks: &MockBundle, worker_id: &str) -> TaskWorker {
    let registry = Arc::new(standard_registry(dal.clone(), &mocks.adapters()));
    TaskWorker::new(dal.clone(), registry, worker_config(worker_id))
}

#[tokio::test]
#[serial]
async fn test_subscription_renewal_completes_chains_and_relays() {
    let dal = fresh_dal();
    let tenant = UniversalUuid::new_v4();
    let mocks = MockBundle::new();
    let worker = standard_worker(&dal, &mocks, "w-renewal");

    let payload = SubscriptionRenewalPayload {
        subscription_id: Uuid::new_v4(),
        period_days: Some(30),
    };
    let due = UniversalTimestamp::now();
    let new_task = task::subscription_renewal(tenant, &payload, due);
    let task_key = new_task.task_key.clone();
    let enqueued = dal.scheduled_task().enqueue(new_task).await.unwrap();

    assert_eq!(worker.run_once().await.unwrap(), 1);

    let done = dal.scheduled_task().get_by_id(enqueued.id).await.unwrap();
    assert_eq!(done.status, TaskStatus::Completed.as_str());
    assert_eq!(mocks.payments.charge_keys(), vec![task_key.clone()]);

    // The next cycle is scheduled 30 days out, keyed by its own cycle date.
    let next_key = format!(
        "subscription_renewal_{}_{}",
        payload.subscription_id,
        (due.0 + chrono::Duration::days(30)).format("%Y%m%d")
    );
    let next = dal
        .scheduled_task()
        .get_by_key(tenant, &next_key)
        .await
        .unwrap()
        .expect("next cycle should be scheduled");
    assert_eq!(next.status, TaskStatus::Ready.as_str());
    assert!(next.due_at > due);

    // The renewal event was appended with its idempotency key.
    let event = dal
        .outbox_event()
        .get_by_key(tenant, &format!("subscription.renewed:{}", task_key))
        .await
        .unwrap()
        .expect("renewal event should exist");
    let data: serde_json::Value = serde_json::from_str(&event.payload).unwrap();
    assert_eq!(data["paymentReference"], "pay-0");
    assert_eq!(data["subscriptionId"], payload.subscription_id.to_string());

    // And it relays to a subscribed endpoint.
    dal.webhook_endpoint()
        .create(rebill::models::webhook_endpoint::NewWebhookEndpoint::new(
            tenant,
            "https://billing.example/hooks",
            &["subscription.*"],
            "whsec_billing",
        ))
        .await
        .unwrap();
    let transport = Arc::new(MockTransport::new());
    let relay = WebhookDispatcher::new(
        dal.clone(),
        transport.clone(),
        Arc::new(test_config_builder().build().unwrap()),
    );
    let stats = relay.run_once().await.unwrap();
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.published, 1);
    assert_eq!(transport.requests()[0].event_type, "subscription.renewed");
}

#[tokio::test]
#[serial]
async fn test_replayed_renewal_converges() {
    let dal = fresh_dal();
    let tenant = UniversalUuid::new_v4();
    let mocks = MockBundle::new();
    let worker = standard_worker(&dal, &mocks, "w-replay");

    let payload = SubscriptionRenewalPayload {
        subscription_id: Uuid::new_v4(),
        period_days: Some(30),
    };
    let new_task = task::subscription_renewal(tenant, &payload, UniversalTimestamp::now());
    let task = dal.scheduled_task().enqueue(new_task).await.unwrap();

    // First execution succeeds but the worker dies before recording it, so
    // the reaper hands the task to another worker.
    let claimed = dal
        .scheduled_task()
        .claim_batch("w-dead", 1, Duration::ZERO)
        .await
        .unwrap();
    let registry = standard_registry(dal.clone(), &mocks.adapters());
    registry
        .get(TaskType::SubscriptionRenewal)
        .unwrap()
        .execute(&claimed[0])
        .await
        .unwrap();
    dal.scheduled_task().release_expired(false).await.unwrap();

    // The replay charges the same idempotency key and swallows the duplicate
    // chained writes.
    assert_eq!(worker.run_once().await.unwrap(), 1);

    let done = dal.scheduled_task().get_by_id(task.id).await.unwrap();
    assert_eq!(done.status, TaskStatus::Completed.as_str());

    let keys = mocks.payments.charge_keys();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0], keys[1]);

    let events = dal.outbox_event().unpublished(50).await.unwrap();
    assert_eq!(
        events
            .iter()
            .filter(|e| e.event_type == "subscription.renewed")
            .count(),
        1
    );
}

#[tokio::test]
#[serial]
async fn test_declined_payment_retries_until_exhausted() {
    let dal = fresh_dal();
    let tenant = UniversalUuid::new_v4();
    let mocks = MockBundle::new();
    mocks.payments.script(Ok(PaymentOutcome::Declined {
        reason: "insufficient funds".to_string(),
    }));
    let worker = standard_worker(&dal, &mocks, "w-declined");

    let payload = SubscriptionRenewalPayload {
        subscription_id: Uuid::new_v4(),
        period_days: None,
    };
    let new_task = task::subscription_renewal(tenant, &payload, UniversalTimestamp::now())
        .with_max_attempts(2);
    let task_key = new_task.task_key.clone();
    let task = dal.scheduled_task().enqueue(new_task).await.unwrap();

    // Declines are retryable; zero backoff makes the retry due immediately.
    assert_eq!(worker.run_once().await.unwrap(), 1);
    let row = dal.scheduled_task().get_by_id(task.id).await.unwrap();
    assert_eq!(row.status, TaskStatus::Ready.as_str());
    assert_eq!(row.attempt_count, 1);

    // The retry sees the same decline (memoized by idempotency key) and
    // exhausts the budget.
    assert_eq!(worker.run_once().await.unwrap(), 1);
    let row = dal.scheduled_task().get_by_id(task.id).await.unwrap();
    assert_eq!(row.status, TaskStatus::Failed.as_str());
    assert_eq!(row.attempt_count, 2);
    assert!(row
        .last_error
        .as_deref()
        .unwrap()
        .contains("payment declined: insufficient funds"));

    // No next cycle and no renewal event for a failed charge.
    let event = dal
        .outbox_event()
        .get_by_key(tenant, &format!("subscription.renewed:{}", task_key))
        .await
        .unwrap();
    assert!(event.is_none());
}

#[tokio::test]
#[serial]
async fn test_delivery_chain_places_order() {
    let dal = fresh_dal();
    let tenant = UniversalUuid::new_v4();
    let mocks = MockBundle::new();
    let worker = standard_worker(&dal, &mocks, "w-chain");

    let payload = CreateDeliveryPayload {
        invoice_id: Uuid::new_v4(),
        subscription_id: Uuid::new_v4(),
    };
    let delivery_task = task::create_delivery(tenant, &payload, UniversalTimestamp::now());
    dal.scheduled_task().enqueue(delivery_task).await.unwrap();

    // First cycle materializes the delivery and chains CREATE_ORDER.
    assert_eq!(worker.run_once().await.unwrap(), 1);
    assert_eq!(mocks.deliveries.created_count(), 1);
    assert_eq!(mocks.commerce.order_count(), 0);

    // Second cycle claims the chained order task.
    assert_eq!(worker.run_once().await.unwrap(), 1);
    assert_eq!(mocks.commerce.order_count(), 1);

    let events = dal.outbox_event().unpublished(50).await.unwrap();
    assert!(events.iter().any(|e| e.event_type == "delivery.created"));
    assert!(events.iter().any(|e| e.event_type == "order.created"));

    let delivery_row = dal
        .scheduled_task()
        .get_by_key(tenant, &format!("delivery_{}", payload.invoice_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivery_row.status, TaskStatus::Completed.as_str());
}

#[tokio::test]
#[serial]
async fn test_entitlement_grant_records_grant_and_event() {
    let dal = fresh_dal();
    let tenant = UniversalUuid::new_v4();
    let mocks = MockBundle::new();
    let worker = standard_worker(&dal, &mocks, "w-grant");

    let payload = EntitlementGrantPayload {
        invoice_id: Uuid::new_v4(),
        subscription_id: Uuid::new_v4(),
        action: EntitlementAction::Grant,
    };
    dal.scheduled_task()
        .enqueue(task::entitlement_grant(
            tenant,
            &payload,
            UniversalTimestamp::now(),
        ))
        .await
        .unwrap();

    assert_eq!(worker.run_once().await.unwrap(), 1);

    assert_eq!(
        mocks.entitlements.granted(),
        vec![(payload.subscription_id, payload.invoice_id)]
    );
    let event = dal
        .outbox_event()
        .get_by_key(
            tenant,
            &format!(
                "entitlement.granted:entitlement_grant_{}",
                payload.invoice_id
            ),
        )
        .await
        .unwrap();
    assert!(event.is_some());
}

#[tokio::test]
#[serial]
async fn test_unknown_task_type_fails_terminally() {
    let dal = fresh_dal();
    let tenant = UniversalUuid::new_v4();
    let mocks = MockBundle::new();
    let worker = standard_worker(&dal, &mocks, "w-unknown");

    let task = dal
        .scheduled_task()
        .enqueue(NewScheduledTask::new(
            tenant,
            "SEND_EMAIL",
            "email_1",
            &serde_json::json!({}),
            UniversalTimestamp::now(),
        ))
        .await
        .unwrap();

    assert_eq!(worker.run_once().await.unwrap(), 1);

    let row = dal.scheduled_task().get_by_id(task.id).await.unwrap();
    assert_eq!(row.status, TaskStatus::Failed.as_str());
    assert_eq!(row.last_error.as_deref(), Some("unknown task type"));
}

#[tokio::test]
#[serial]
async fn test_missing_handler_fails_terminally() {
    let dal = fresh_dal();
    let tenant = UniversalUuid::new_v4();
    let worker = TaskWorker::new(
        dal.clone(),
        Arc::new(HandlerRegistry::new()),
        worker_config("w-empty"),
    );

    let payload = CreateOrderPayload {
        delivery_id: Uuid::new_v4(),
        invoice_id: Uuid::new_v4(),
        subscription_id: Uuid::new_v4(),
    };
    let task = dal
        .scheduled_task()
        .enqueue(task::create_order(
            tenant,
            &payload,
            UniversalTimestamp::now(),
        ))
        .await
        .unwrap();

    assert_eq!(worker.run_once().await.unwrap(), 1);

    let row = dal.scheduled_task().get_by_id(task.id).await.unwrap();
    assert_eq!(row.status, TaskStatus::Failed.as_str());
    assert_eq!(row.last_error.as_deref(), Some("no handler registered"));
}

#[tokio::test]
#[serial]
async fn test_invalid_payload_is_terminal() {
    let dal = fresh_dal();
    let tenant = UniversalUuid::new_v4();
    let mocks = MockBundle::new();
    let worker = standard_worker(&dal, &mocks, "w-badpayload");

    let task = dal
        .scheduled_task()
        .enqueue(NewScheduledTask::new(
            tenant,
            TaskType::SubscriptionRenewal.as_str(),
            "renewal_bad_payload",
            &serde_json::json!({"bogus": true}),
            UniversalTimestamp::now(),
        ))
        .await
        .unwrap();

    assert_eq!(worker.run_once().await.unwrap(), 1);

    let row = dal.scheduled_task().get_by_id(task.id).await.unwrap();
    assert_eq!(row.status, TaskStatus::Failed.as_str());
    assert_eq!(row.attempt_count, 1);
    // The charge was never attempted.
    assert!(mocks.payments.charge_keys().is_empty());
}

struct SlowHandler;

#[async_trait]
impl TaskHandler for SlowHandler {
    fn task_type(&self) -> TaskType {
        TaskType::CreateOrder
    }

    async fn execute(&self, _task: &ScheduledTask) -> Result<(), HandlerError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    }
}

#[tokio::test]
#[serial]
async fn test_handler_timeout_consumes_an_attempt() {
    let dal = fresh_dal();
    let tenant = UniversalUuid::new_v4();

    let mut registry = HandlerRegistry::new();
    registry.register(Box::new(SlowHandler));
    let config = Arc::new(
        test_config_builder()
            .worker_id("w-slow")
            .task_timeout(Duration::from_millis(50))
            .build()
            .unwrap(),
    );
    let worker = TaskWorker::new(dal.clone(), Arc::new(registry), config);

    let payload = CreateOrderPayload {
        delivery_id: Uuid::new_v4(),
        invoice_id: Uuid::new_v4(),
        subscription_id: Uuid::new_v4(),
    };
    let task = dal
        .scheduled_task()
        .enqueue(task::create_order(
            tenant,
            &payload,
            UniversalTimestamp::now(),
        ))
        .await
        .unwrap();

    assert_eq!(worker.run_once().await.unwrap(), 1);

    let row = dal.scheduled_task().get_by_id(task.id).await.unwrap();
    assert_eq!(row.status, TaskStatus::Ready.as_str());
    assert_eq!(row.attempt_count, 1);
    assert!(row
        .last_error
        .as_deref()
        .unwrap()
        .contains("exceeded timeout"));
}

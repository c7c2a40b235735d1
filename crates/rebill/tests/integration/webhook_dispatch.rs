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

//! Webhook dispatcher tests: fan-out, signing, pattern filtering, retry, and
//! the publish-when-settled rule.

use std::sync::Arc;

use serial_test::serial;

use rebill::dal::DAL;
use rebill::database::UniversalUuid;
use rebill::models::outbox_event::{NewOutboxEvent, OutboxEvent};
use rebill::models::webhook_delivery::DeliveryStatus;
use rebill::models::webhook_endpoint::{EndpointStatus, NewWebhookEndpoint, WebhookEndpoint};
use rebill::webhook::signature;
use rebill::webhook::{MockTransport, WebhookDispatcher};

use crate::fixtures::{fresh_dal, test_config_builder};

fn dispatcher(dal: &DAL, transport: &Arc<MockTransport>) -> WebhookDispatcher {
    WebhookDispatcher::new(
        dal.clone(),
        transport.clone(),
        Arc::new(test_config_builder().build().unwrap()),
    )
}

async fn register_endpoint(
    dal: &DAL,
    tenant: UniversalUuid,
    url: &str,
    patterns: &[&str],
    secret: &str,
) -> WebhookEndpoint {
    dal.webhook_endpoint()
        .create(NewWebhookEndpoint::new(tenant, url, patterns, secret))
        .await
        .unwrap()
}

async fn append_event(dal: &DAL, tenant: UniversalUuid, event_type: &str) -> OutboxEvent {
    dal.outbox_event()
        .append(NewOutboxEvent::new(
            tenant,
            event_type,
            &serde_json::json!({"subscriptionId": "sub-1"}),
        ))
        .await
        .unwrap()
}

#[tokio::test]
#[serial]
async fn test_fan_out_signs_one_canonical_body_per_endpoint() {
    let dal = fresh_dal();
    let tenant = UniversalUuid::new_v4();

    let endpoints = [
        ("https://a.example/hooks", "whsec_a"),
        ("https://b.example/hooks", "whsec_b"),
        ("https://c.example/hooks", "whsec_c"),
    ];
    for (url, secret) in endpoints {
        register_endpoint(&dal, tenant, url, &[], secret).await;
    }
    let event = append_event(&dal, tenant, "subscription.renewed").await;

    let transport = Arc::new(MockTransport::new());
    let stats = dispatcher(&dal, &transport).run_once().await.unwrap();

    assert_eq!(stats.resolved, 3);
    assert_eq!(stats.delivered, 3);
    assert_eq!(stats.published, 1);

    let requests = transport.requests();
    assert_eq!(requests.len(), 3);

    // Every endpoint received the same bytes, signed with its own secret.
    for request in &requests {
        assert_eq!(request.body, requests[0].body);
        assert_eq!(request.event_id, event.id.to_string());
        assert_eq!(request.event_type, "subscription.renewed");

        let (_, secret) = endpoints
            .iter()
            .find(|(url, _)| *url == request.url)
            .expect("request went to a registered endpoint");
        assert!(signature::verify(
            secret,
            request.body.as_bytes(),
            &request.signature
        ));
        assert!(!signature::verify(
            "wrong_secret",
            request.body.as_bytes(),
            &request.signature
        ));
    }

    let body: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
    assert_eq!(body["eventId"], event.id.to_string());
    assert_eq!(body["eventType"], "subscription.renewed");
    assert_eq!(body["data"]["subscriptionId"], "sub-1");
    assert!(body["timestamp"].is_string());

    let settled = dal.outbox_event().get_by_id(event.id).await.unwrap();
    assert!(settled.published.is_true());
}

#[tokio::test]
#[serial]
async fn test_patterns_limit_fan_out() {
    let dal = fresh_dal();
    let tenant = UniversalUuid::new_v4();

    let subscribed = register_endpoint(
        &dal,
        tenant,
        "https://billing.example/hooks",
        &["subscription.*"],
        "whsec_billing",
    )
    .await;
    register_endpoint(
        &dal,
        tenant,
        "https://orders.example/hooks",
        &["order.created"],
        "whsec_orders",
    )
    .await;

    let event = append_event(&dal, tenant, "subscription.renewed").await;

    let transport = Arc::new(MockTransport::new());
    let stats = dispatcher(&dal, &transport).run_once().await.unwrap();

    assert_eq!(stats.resolved, 1);
    assert_eq!(stats.delivered, 1);

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "https://billing.example/hooks");

    let deliveries = dal.webhook_delivery().for_event(event.id).await.unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].webhook_endpoint_id, subscribed.id);
}

#[tokio::test]
#[serial]
async fn test_event_without_subscribers_publishes_immediately() {
    let dal = fresh_dal();
    let tenant = UniversalUuid::new_v4();

    let event = append_event(&dal, tenant, "entitlement.granted").await;

    let transport = Arc::new(MockTransport::new());
    let stats = dispatcher(&dal, &transport).run_once().await.unwrap();

    assert_eq!(stats.resolved, 0);
    assert_eq!(stats.published, 1);
    assert_eq!(transport.request_count(), 0);

    let row = dal.outbox_event().get_by_id(event.id).await.unwrap();
    assert!(row.published.is_true());
}

#[tokio::test]
#[serial]
async fn test_failed_delivery_retries_until_success() {
    let dal = fresh_dal();
    let tenant = UniversalUuid::new_v4();

    register_endpoint(&dal, tenant, "https://flaky.example/hooks", &[], "whsec_f").await;
    let event = append_event(&dal, tenant, "subscription.renewed").await;

    let transport = Arc::new(MockTransport::new());
    transport.respond_with(500);
    transport.respond_with(500);
    let relay = dispatcher(&dal, &transport);

    // Zero backoff in the test config makes a rescheduled delivery due again
    // in the next cycle.
    let stats = relay.run_once().await.unwrap();
    assert_eq!(stats.resolved, 1);
    assert_eq!(stats.rescheduled, 1);
    assert_eq!(stats.published, 0);

    let stats = relay.run_once().await.unwrap();
    assert_eq!(stats.rescheduled, 1);

    // The event stays unpublished while its delivery is still pending.
    assert!(!dal
        .outbox_event()
        .get_by_id(event.id)
        .await
        .unwrap()
        .published
        .is_true());

    let stats = relay.run_once().await.unwrap();
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.published, 1);

    assert_eq!(transport.request_count(), 3);
    let deliveries = dal.webhook_delivery().for_event(event.id).await.unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].status, DeliveryStatus::Delivered.as_str());
    assert_eq!(deliveries[0].attempt_count, 3);
    assert_eq!(deliveries[0].response_code, Some(200));
    assert!(deliveries[0].last_error.is_none());
}

#[tokio::test]
#[serial]
async fn test_exhausted_delivery_budget_fails_and_settles() {
    let dal = fresh_dal();
    let tenant = UniversalUuid::new_v4();

    register_endpoint(&dal, tenant, "https://down.example/hooks", &[], "whsec_d").await;
    let event = append_event(&dal, tenant, "order.created").await;

    let transport = Arc::new(MockTransport::new());
    transport.respond_with(500);
    transport.respond_with(503);
    let relay = WebhookDispatcher::new(
        dal.clone(),
        transport.clone(),
        Arc::new(
            test_config_builder()
                .delivery_max_attempts(2)
                .build()
                .unwrap(),
        ),
    );

    let stats = relay.run_once().await.unwrap();
    assert_eq!(stats.rescheduled, 1);

    let stats = relay.run_once().await.unwrap();
    assert_eq!(stats.failed, 1);
    // Terminal failure still settles the event.
    assert_eq!(stats.published, 1);

    let deliveries = dal.webhook_delivery().for_event(event.id).await.unwrap();
    assert_eq!(deliveries[0].status, DeliveryStatus::Failed.as_str());
    assert_eq!(deliveries[0].attempt_count, 2);
    assert_eq!(deliveries[0].response_code, Some(503));
    assert!(dal
        .outbox_event()
        .get_by_id(event.id)
        .await
        .unwrap()
        .published
        .is_true());
}

#[tokio::test]
#[serial]
async fn test_disabled_endpoint_fails_pending_delivery() {
    let dal = fresh_dal();
    let tenant = UniversalUuid::new_v4();

    register_endpoint(&dal, tenant, "https://a.example/hooks", &[], "whsec_a").await;
    let disabled = register_endpoint(&dal, tenant, "https://b.example/hooks", &[], "whsec_b").await;
    let event = append_event(&dal, tenant, "subscription.renewed").await;

    let transport = Arc::new(MockTransport::new());
    transport.respond_with(500);
    transport.respond_with(500);
    let relay = dispatcher(&dal, &transport);

    // First cycle fans out to both endpoints; both attempts fail.
    let stats = relay.run_once().await.unwrap();
    assert_eq!(stats.resolved, 2);
    assert_eq!(stats.rescheduled, 2);

    dal.webhook_endpoint()
        .set_status(disabled.id, EndpointStatus::Disabled)
        .await
        .unwrap();

    // Second cycle: the live endpoint succeeds, the disabled one fails
    // without an HTTP attempt, and the event settles.
    let stats = relay.run_once().await.unwrap();
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.published, 1);
    assert_eq!(transport.request_count(), 3);

    let deliveries = dal.webhook_delivery().for_event(event.id).await.unwrap();
    let dead = deliveries
        .iter()
        .find(|d| d.webhook_endpoint_id == disabled.id)
        .unwrap();
    assert_eq!(dead.status, DeliveryStatus::Failed.as_str());
    assert_eq!(dead.last_error.as_deref(), Some("endpoint disabled"));
}

#[tokio::test]
#[serial]
async fn test_deleted_endpoint_fails_pending_delivery() {
    let dal = fresh_dal();
    let tenant = UniversalUuid::new_v4();

    // A delivery row whose endpoint row no longer exists.
    let event = append_event(&dal, tenant, "subscription.renewed").await;
    let orphan = rebill::models::webhook_delivery::NewWebhookDelivery::new(
        tenant,
        UniversalUuid::new_v4(),
        event.id,
        "subscription.renewed",
        "{}",
    );
    let orphan_id = orphan.id;
    dal.webhook_delivery()
        .create_pending(vec![orphan])
        .await
        .unwrap();

    let transport = Arc::new(MockTransport::new());
    let stats = dispatcher(&dal, &transport).run_once().await.unwrap();

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.published, 1);
    assert_eq!(transport.request_count(), 0);

    let row = dal
        .webhook_delivery()
        .for_event(event.id)
        .await
        .unwrap()
        .into_iter()
        .find(|d| d.id == orphan_id)
        .unwrap();
    assert_eq!(row.status, DeliveryStatus::Failed.as_str());
    assert_eq!(row.last_error.as_deref(), Some("endpoint deleted"));
}

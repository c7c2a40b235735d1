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

//! Outbox tests: append idempotency and the published flag.

use serial_test::serial;

use rebill::database::UniversalUuid;
use rebill::error::StoreError;
use rebill::models::outbox_event::NewOutboxEvent;

use crate::fixtures::fresh_dal;

#[tokio::test]
#[serial]
async fn test_event_key_deduplicates_within_tenant() {
    let dal = fresh_dal();
    let tenant = UniversalUuid::new_v4();
    let other_tenant = UniversalUuid::new_v4();

    dal.outbox_event()
        .append(NewOutboxEvent::with_key(
            tenant,
            "subscription.renewed",
            "renewed-2026-04",
            &serde_json::json!({"cycle": "2026-04"}),
        ))
        .await
        .unwrap();

    let err = dal
        .outbox_event()
        .append(NewOutboxEvent::with_key(
            tenant,
            "subscription.renewed",
            "renewed-2026-04",
            &serde_json::json!({"cycle": "2026-04"}),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateEventKey { .. }));

    // The same key under another tenant is a different event.
    assert!(dal
        .outbox_event()
        .append(NewOutboxEvent::with_key(
            other_tenant,
            "subscription.renewed",
            "renewed-2026-04",
            &serde_json::json!({}),
        ))
        .await
        .is_ok());

    // Keyless events never conflict.
    for _ in 0..2 {
        assert!(dal
            .outbox_event()
            .append(NewOutboxEvent::new(
                tenant,
                "order.created",
                &serde_json::json!({}),
            ))
            .await
            .is_ok());
    }
}

#[tokio::test]
#[serial]
async fn test_unpublished_is_oldest_first_and_mark_published_sticks() {
    let dal = fresh_dal();
    let tenant = UniversalUuid::new_v4();

    let first = dal
        .outbox_event()
        .append(NewOutboxEvent::new(tenant, "a.first", &serde_json::json!({})))
        .await
        .unwrap();
    let second = dal
        .outbox_event()
        .append(NewOutboxEvent::new(tenant, "b.second", &serde_json::json!({})))
        .await
        .unwrap();

    let pending = dal.outbox_event().unpublished(10).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].id, first.id);
    assert_eq!(pending[1].id, second.id);

    dal.outbox_event().mark_published(first.id).await.unwrap();
    let pending = dal.outbox_event().unpublished(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, second.id);

    // Publishing twice is a no-op, not an error.
    dal.outbox_event().mark_published(first.id).await.unwrap();
    let row = dal.outbox_event().get_by_id(first.id).await.unwrap();
    assert!(row.published.is_true());

    let err = dal
        .outbox_event()
        .mark_published(UniversalUuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
#[serial]
async fn test_get_by_key_finds_the_event() {
    let dal = fresh_dal();
    let tenant = UniversalUuid::new_v4();

    let appended = dal
        .outbox_event()
        .append(NewOutboxEvent::with_key(
            tenant,
            "delivery.created",
            "delivery.created:delivery_abc",
            &serde_json::json!({"deliveryId": "abc"}),
        ))
        .await
        .unwrap();

    let found = dal
        .outbox_event()
        .get_by_key(tenant, "delivery.created:delivery_abc")
        .await
        .unwrap()
        .expect("event should exist");
    assert_eq!(found.id, appended.id);
    assert!(found.published.is_false());

    let missing = dal
        .outbox_event()
        .get_by_key(tenant, "delivery.created:delivery_other")
        .await
        .unwrap();
    assert!(missing.is_none());
}

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

//! Task store tests: enqueue idempotency, claiming, and the task lifecycle.

use std::time::Duration;

use serial_test::serial;
use uuid::Uuid;

use rebill::dal::TaskResolution;
use rebill::database::{UniversalTimestamp, UniversalUuid};
use rebill::error::StoreError;
use rebill::models::outbox_event::NewOutboxEvent;
use rebill::models::scheduled_task::{NewScheduledTask, TaskStatus};
use rebill::BackoffPolicy;

use crate::fixtures::fresh_dal;

const LEASE: Duration = Duration::from_secs(60);

fn zero_backoff() -> BackoffPolicy {
    BackoffPolicy::new(Duration::ZERO, Duration::ZERO)
}

fn due_task(tenant: UniversalUuid) -> NewScheduledTask {
    NewScheduledTask::new(
        tenant,
        "SUBSCRIPTION_RENEWAL",
        format!("task_{}", Uuid::new_v4()),
        &serde_json::json!({}),
        UniversalTimestamp::now(),
    )
}

#[tokio::test]
#[serial]
async fn test_claim_takes_only_due_ready_tasks() {
    let dal = fresh_dal();
    let tenant = UniversalUuid::new_v4();

    let due_a = dal.scheduled_task().enqueue(due_task(tenant)).await.unwrap();
    let due_b = dal.scheduled_task().enqueue(due_task(tenant)).await.unwrap();
    let future = dal
        .scheduled_task()
        .enqueue(NewScheduledTask::new(
            tenant,
            "SUBSCRIPTION_RENEWAL",
            format!("task_{}", Uuid::new_v4()),
            &serde_json::json!({}),
            UniversalTimestamp::now().advanced_by(Duration::from_secs(3600)),
        ))
        .await
        .unwrap();

    let claimed = dal
        .scheduled_task()
        .claim_batch("worker-a", 10, LEASE)
        .await
        .unwrap();

    assert_eq!(claimed.len(), 2);
    for task in &claimed {
        assert_eq!(task.status, TaskStatus::Claimed.as_str());
        assert_eq!(task.lock_owner.as_deref(), Some("worker-a"));
        assert!(task.locked_until.is_some());
        assert!([due_a.id, due_b.id].contains(&task.id));
    }

    let untouched = dal.scheduled_task().get_by_id(future.id).await.unwrap();
    assert_eq!(untouched.status, TaskStatus::Ready.as_str());
    assert!(untouched.lock_owner.is_none());

    // A second claim finds nothing left.
    let rest = dal
        .scheduled_task()
        .claim_batch("worker-b", 10, LEASE)
        .await
        .unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
#[serial]
async fn test_duplicate_task_key_is_rejected_per_tenant() {
    let dal = fresh_dal();
    let tenant = UniversalUuid::new_v4();
    let other_tenant = UniversalUuid::new_v4();

    let task = due_task(tenant);
    let key = task.task_key.clone();
    dal.scheduled_task().enqueue(task).await.unwrap();

    let duplicate = NewScheduledTask::new(
        tenant,
        "SUBSCRIPTION_RENEWAL",
        key.clone(),
        &serde_json::json!({}),
        UniversalTimestamp::now(),
    );
    let err = dal.scheduled_task().enqueue(duplicate).await.unwrap_err();
    assert!(matches!(err, StoreError::DuplicateTaskKey { .. }));
    assert!(err.is_duplicate_key());

    // The same key under another tenant is a different task.
    let elsewhere = NewScheduledTask::new(
        other_tenant,
        "SUBSCRIPTION_RENEWAL",
        key,
        &serde_json::json!({}),
        UniversalTimestamp::now(),
    );
    assert!(dal.scheduled_task().enqueue(elsewhere).await.is_ok());
}

#[tokio::test]
#[serial]
async fn test_concurrent_claims_never_share_a_task() {
    let dal = fresh_dal();
    let tenant = UniversalUuid::new_v4();

    for _ in 0..10 {
        dal.scheduled_task().enqueue(due_task(tenant)).await.unwrap();
    }

    let store = dal.scheduled_task();
    let (a, b) = tokio::join!(
        store.claim_batch("worker-a", 5, LEASE),
        store.claim_batch("worker-b", 10, LEASE),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    assert_eq!(a.len() + b.len(), 10);
    for task in &a {
        assert!(!b.iter().any(|other| other.id == task.id));
    }
}

#[tokio::test]
#[serial]
async fn test_complete_requires_the_claiming_worker() {
    let dal = fresh_dal();
    let tenant = UniversalUuid::new_v4();

    dal.scheduled_task().enqueue(due_task(tenant)).await.unwrap();
    let claimed = dal
        .scheduled_task()
        .claim_batch("worker-a", 1, LEASE)
        .await
        .unwrap();
    let task = &claimed[0];

    let err = dal
        .scheduled_task()
        .complete(task.id, "worker-b")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));

    let completed = dal
        .scheduled_task()
        .complete(task.id, "worker-a")
        .await
        .unwrap();
    assert_eq!(completed.status, TaskStatus::Completed.as_str());
    assert!(completed.locked_until.is_none());
    assert!(completed.lock_owner.is_none());
    assert!(completed.completed_at.is_some());
}

#[tokio::test]
#[serial]
async fn test_fail_attempt_reschedules_until_exhausted() {
    let dal = fresh_dal();
    let tenant = UniversalUuid::new_v4();

    let task = dal
        .scheduled_task()
        .enqueue(due_task(tenant).with_max_attempts(3))
        .await
        .unwrap();

    for expected_attempt in 1..=2 {
        let claimed = dal
            .scheduled_task()
            .claim_batch("worker-a", 1, LEASE)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);

        let resolution = dal
            .scheduled_task()
            .fail_attempt(task.id, "worker-a", "gateway 503", zero_backoff())
            .await
            .unwrap();
        assert!(matches!(
            resolution,
            TaskResolution::Scheduled { attempt, .. } if attempt == expected_attempt
        ));

        let row = dal.scheduled_task().get_by_id(task.id).await.unwrap();
        assert_eq!(row.status, TaskStatus::Ready.as_str());
        assert_eq!(row.attempt_count, expected_attempt);
        assert_eq!(row.last_error.as_deref(), Some("gateway 503"));
        assert!(row.locked_until.is_none());
        assert!(row.lock_owner.is_none());
    }

    // Third failure exhausts the budget.
    dal.scheduled_task()
        .claim_batch("worker-a", 1, LEASE)
        .await
        .unwrap();
    let resolution = dal
        .scheduled_task()
        .fail_attempt(task.id, "worker-a", "gateway 503", zero_backoff())
        .await
        .unwrap();
    assert_eq!(resolution, TaskResolution::Exhausted { attempt: 3 });

    let row = dal.scheduled_task().get_by_id(task.id).await.unwrap();
    assert_eq!(row.status, TaskStatus::Failed.as_str());
    assert_eq!(row.attempt_count, 3);
}

#[tokio::test]
#[serial]
async fn test_fail_terminal_ignores_remaining_budget() {
    let dal = fresh_dal();
    let tenant = UniversalUuid::new_v4();

    let task = dal
        .scheduled_task()
        .enqueue(due_task(tenant).with_max_attempts(5))
        .await
        .unwrap();
    dal.scheduled_task()
        .claim_batch("worker-a", 1, LEASE)
        .await
        .unwrap();

    dal.scheduled_task()
        .fail_terminal(task.id, "worker-a", "unknown account")
        .await
        .unwrap();

    let row = dal.scheduled_task().get_by_id(task.id).await.unwrap();
    assert_eq!(row.status, TaskStatus::Failed.as_str());
    assert_eq!(row.attempt_count, 1);
    assert_eq!(row.last_error.as_deref(), Some("unknown account"));
    assert!(row.lock_owner.is_none());
}

#[tokio::test]
#[serial]
async fn test_enqueue_with_event_is_atomic() {
    let dal = fresh_dal();
    let tenant = UniversalUuid::new_v4();

    // Claim the event key up front so the chained insert conflicts.
    dal.outbox_event()
        .append(NewOutboxEvent::with_key(
            tenant,
            "subscription.renewed",
            "evt-claimed",
            &serde_json::json!({}),
        ))
        .await
        .unwrap();

    let task = due_task(tenant);
    let task_key = task.task_key.clone();
    let event = NewOutboxEvent::with_key(
        tenant,
        "subscription.renewed",
        "evt-claimed",
        &serde_json::json!({}),
    );

    let err = dal
        .scheduled_task()
        .enqueue_with_event(task, event)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateEventKey { .. }));

    // The event conflict rolled the task insert back too.
    let task_row = dal
        .scheduled_task()
        .get_by_key(tenant, &task_key)
        .await
        .unwrap();
    assert!(task_row.is_none());
}

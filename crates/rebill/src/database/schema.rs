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

//! Diesel schema shared by both backends.
//!
//! UUID and timestamp columns are TEXT and boolean columns are INTEGER in
//! both backends; see [`crate::database::universal_types`].

diesel::table! {
    scheduled_tasks (id) {
        id -> Text,
        tenant_id -> Text,
        task_type -> Text,
        task_key -> Text,
        status -> Text,
        due_at -> Text,
        attempt_count -> Integer,
        max_attempts -> Integer,
        payload -> Text,
        locked_until -> Nullable<Text>,
        lock_owner -> Nullable<Text>,
        last_error -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
        completed_at -> Nullable<Text>,
    }
}

diesel::table! {
    outbox_events (id) {
        id -> Text,
        tenant_id -> Text,
        event_type -> Text,
        event_key -> Nullable<Text>,
        payload -> Text,
        published -> Integer,
        created_at -> Text,
    }
}

diesel::table! {
    webhook_endpoints (id) {
        id -> Text,
        tenant_id -> Text,
        url -> Text,
        event_patterns -> Text,
        secret -> Text,
        status -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    webhook_deliveries (id) {
        id -> Text,
        tenant_id -> Text,
        webhook_endpoint_id -> Text,
        outbox_event_id -> Text,
        event_type -> Text,
        body -> Text,
        status -> Text,
        attempt_count -> Integer,
        max_attempts -> Integer,
        next_attempt_at -> Text,
        last_attempted_at -> Nullable<Text>,
        response_code -> Nullable<Integer>,
        last_error -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    scheduled_tasks,
    outbox_events,
    webhook_endpoints,
    webhook_deliveries,
);

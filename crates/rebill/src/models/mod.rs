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

//! Row structs for the four engine tables.

pub mod outbox_event;
pub mod scheduled_task;
pub mod webhook_delivery;
pub mod webhook_endpoint;

pub use outbox_event::{NewOutboxEvent, OutboxEvent};
pub use scheduled_task::{NewScheduledTask, ScheduledTask, TaskStatus};
pub use webhook_delivery::{DeliveryStatus, NewWebhookDelivery, WebhookDelivery};
pub use webhook_endpoint::{EndpointStatus, NewWebhookEndpoint, WebhookEndpoint};

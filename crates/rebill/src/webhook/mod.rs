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

//! Webhook delivery: event pattern matching, request signing, HTTP
//! transport, and the dispatcher that relays outbox events to endpoints.

pub mod dispatcher;
pub mod pattern;
pub mod signature;
pub mod transport;

pub use dispatcher::{RelayStats, WebhookDispatcher};
pub use transport::{
    DeliveryRequest, DeliveryResponse, DeliveryTransport, HttpTransport, MockTransport,
};

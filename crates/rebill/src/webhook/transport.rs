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

//! The HTTP seam for webhook delivery.
//!
//! The dispatcher talks to endpoints through [`DeliveryTransport`], so tests
//! script responses with [`MockTransport`] instead of standing up servers.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::signature::SIGNATURE_HEADER;
use crate::error::TransportError;

/// Header carrying the event type.
pub const EVENT_TYPE_HEADER: &str = "X-Event-Type";

/// Header carrying the outbox event id.
pub const EVENT_ID_HEADER: &str = "X-Event-Id";

/// One signed webhook request.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryRequest<'a> {
    pub url: &'a str,
    pub body: &'a str,
    pub signature: &'a str,
    pub event_id: &'a str,
    pub event_type: &'a str,
}

/// The endpoint's response; only the status code matters to the dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryResponse {
    pub status: u16,
}

impl DeliveryResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends signed webhook requests.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn deliver(
        &self,
        request: DeliveryRequest<'_>,
    ) -> Result<DeliveryResponse, TransportError>;
}

/// Production transport over reqwest.
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl DeliveryTransport for HttpTransport {
    async fn deliver(
        &self,
        request: DeliveryRequest<'_>,
    ) -> Result<DeliveryResponse, TransportError> {
        let response = self
            .client
            .post(request.url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, request.signature)
            .header(EVENT_TYPE_HEADER, request.event_type)
            .header(EVENT_ID_HEADER, request.event_id)
            .body(request.body.to_string())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(self.timeout)
                } else {
                    TransportError::Network(e.to_string())
                }
            })?;

        Ok(DeliveryResponse {
            status: response.status().as_u16(),
        })
    }
}

/// A request as recorded by [`MockTransport`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub body: String,
    pub signature: String,
    pub event_id: String,
    pub event_type: String,
}

/// Scriptable transport for tests.
///
/// Responses are consumed in order; once the script is exhausted every
/// request gets a 200. All requests are recorded.
pub struct MockTransport {
    responses: Mutex<Vec<Result<u16, TransportError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queues the status code for the next request.
    pub fn respond_with(&self, status: u16) {
        self.responses
            .lock()
            .expect("lock poisoned")
            .push(Ok(status));
    }

    /// Queues a transport-level failure for the next request.
    pub fn fail_with(&self, error: TransportError) {
        self.responses
            .lock()
            .expect("lock poisoned")
            .push(Err(error));
    }

    /// Every request made so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("lock poisoned").clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("lock poisoned").len()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryTransport for MockTransport {
    async fn deliver(
        &self,
        request: DeliveryRequest<'_>,
    ) -> Result<DeliveryResponse, TransportError> {
        self.requests
            .lock()
            .expect("lock poisoned")
            .push(RecordedRequest {
                url: request.url.to_string(),
                body: request.body.to_string(),
                signature: request.signature.to_string(),
                event_id: request.event_id.to_string(),
                event_type: request.event_type.to_string(),
            });

        let next = {
            let mut responses = self.responses.lock().expect("lock poisoned");
            if responses.is_empty() {
                None
            } else {
                Some(responses.remove(0))
            }
        };
        match next {
            Some(Ok(status)) => Ok(DeliveryResponse { status }),
            Some(Err(err)) => Err(err),
            None => Ok(DeliveryResponse { status: 200 }),
        }
    }
}

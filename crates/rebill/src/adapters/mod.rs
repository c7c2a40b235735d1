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

//! Collaborator adapters: payment, delivery, commerce, and entitlement
//! systems the handlers call into.
//!
//! These systems are opaque to the engine; the traits model only what the
//! handlers need. Every call takes an idempotency key derived from the task
//! key, and the mock implementations memoize results per key the way the real
//! collaborators deduplicate requests, so a replayed task converges on the
//! same outcome.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AdapterError;

/// Result of a charge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Funds captured; `reference` identifies the payment
    Approved { reference: String },
    /// The charge was refused (insufficient funds, expired card, ...)
    Declined { reason: String },
}

/// Charges subscriptions through the payment system.
#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    async fn charge(
        &self,
        subscription_id: Uuid,
        idempotency_key: &str,
    ) -> Result<PaymentOutcome, AdapterError>;
}

/// Materializes deliveries in the fulfillment system.
#[async_trait]
pub trait DeliveryAdapter: Send + Sync {
    /// Returns the id of the created (or already existing) delivery.
    async fn create_delivery(
        &self,
        invoice_id: Uuid,
        subscription_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Uuid, AdapterError>;
}

/// Places orders in the commerce system.
#[async_trait]
pub trait CommerceAdapter: Send + Sync {
    /// Returns the order reference.
    async fn create_order(
        &self,
        delivery_id: Uuid,
        idempotency_key: &str,
    ) -> Result<String, AdapterError>;
}

/// Grants and revokes entitlements.
#[async_trait]
pub trait EntitlementAdapter: Send + Sync {
    async fn grant(
        &self,
        subscription_id: Uuid,
        invoice_id: Uuid,
        idempotency_key: &str,
    ) -> Result<(), AdapterError>;

    async fn revoke(
        &self,
        subscription_id: Uuid,
        invoice_id: Uuid,
        idempotency_key: &str,
    ) -> Result<(), AdapterError>;
}

/// The adapter bundle handed to the handler registry.
#[derive(Clone)]
pub struct Adapters {
    pub payments: std::sync::Arc<dyn PaymentAdapter>,
    pub deliveries: std::sync::Arc<dyn DeliveryAdapter>,
    pub commerce: std::sync::Arc<dyn CommerceAdapter>,
    pub entitlements: std::sync::Arc<dyn EntitlementAdapter>,
}

impl Adapters {
    /// A bundle of fresh mocks, for tests and local runs.
    pub fn mocked() -> Self {
        Self {
            payments: std::sync::Arc::new(MockPaymentAdapter::new()),
            deliveries: std::sync::Arc::new(MockDeliveryAdapter::new()),
            commerce: std::sync::Arc::new(MockCommerceAdapter::new()),
            entitlements: std::sync::Arc::new(MockEntitlementAdapter::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Mock implementations
// ---------------------------------------------------------------------------

/// Mock payment system with scriptable outcomes.
///
/// Unscripted charges approve. Outcomes are memoized per idempotency key:
/// charging the same key twice returns the first outcome without consuming
/// another scripted entry.
pub struct MockPaymentAdapter {
    scripted: Mutex<Vec<Result<PaymentOutcome, AdapterError>>>,
    seen: Mutex<HashMap<String, PaymentOutcome>>,
    calls: Mutex<Vec<String>>,
    counter: AtomicU64,
}

impl MockPaymentAdapter {
    pub fn new() -> Self {
        Self {
            scripted: Mutex::new(Vec::new()),
            seen: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            counter: AtomicU64::new(0),
        }
    }

    /// Queues the outcome of the next unseen charge.
    pub fn script(&self, outcome: Result<PaymentOutcome, AdapterError>) {
        self.scripted.lock().expect("lock poisoned").push(outcome);
    }

    /// Idempotency keys of every charge call, in order.
    pub fn charge_keys(&self) -> Vec<String> {
        self.calls.lock().expect("lock poisoned").clone()
    }
}

impl Default for MockPaymentAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentAdapter for MockPaymentAdapter {
    async fn charge(
        &self,
        _subscription_id: Uuid,
        idempotency_key: &str,
    ) -> Result<PaymentOutcome, AdapterError> {
        self.calls
            .lock()
            .expect("lock poisoned")
            .push(idempotency_key.to_string());

        if let Some(prior) = self
            .seen
            .lock()
            .expect("lock poisoned")
            .get(idempotency_key)
        {
            return Ok(prior.clone());
        }

        let next = {
            let mut scripted = self.scripted.lock().expect("lock poisoned");
            if scripted.is_empty() {
                None
            } else {
                Some(scripted.remove(0))
            }
        };
        let outcome = match next {
            Some(Ok(outcome)) => outcome,
            Some(Err(err)) => return Err(err),
            None => {
                let n = self.counter.fetch_add(1, Ordering::SeqCst);
                PaymentOutcome::Approved {
                    reference: format!("pay-{}", n),
                }
            }
        };
        self.seen
            .lock()
            .expect("lock poisoned")
            .insert(idempotency_key.to_string(), outcome.clone());
        Ok(outcome)
    }
}

/// Mock fulfillment system; delivery ids are memoized per idempotency key.
pub struct MockDeliveryAdapter {
    created: Mutex<HashMap<String, Uuid>>,
    fail_next: Mutex<Vec<AdapterError>>,
}

impl MockDeliveryAdapter {
    pub fn new() -> Self {
        Self {
            created: Mutex::new(HashMap::new()),
            fail_next: Mutex::new(Vec::new()),
        }
    }

    pub fn script_failure(&self, err: AdapterError) {
        self.fail_next.lock().expect("lock poisoned").push(err);
    }

    /// Number of distinct deliveries materialized.
    pub fn created_count(&self) -> usize {
        self.created.lock().expect("lock poisoned").len()
    }
}

impl Default for MockDeliveryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryAdapter for MockDeliveryAdapter {
    async fn create_delivery(
        &self,
        _invoice_id: Uuid,
        _subscription_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Uuid, AdapterError> {
        if let Some(prior) = self
            .created
            .lock()
            .expect("lock poisoned")
            .get(idempotency_key)
        {
            return Ok(*prior);
        }
        {
            let mut failures = self.fail_next.lock().expect("lock poisoned");
            if !failures.is_empty() {
                return Err(failures.remove(0));
            }
        }
        let id = Uuid::new_v4();
        self.created
            .lock()
            .expect("lock poisoned")
            .insert(idempotency_key.to_string(), id);
        Ok(id)
    }
}

/// Mock commerce system; order references are memoized per idempotency key.
pub struct MockCommerceAdapter {
    orders: Mutex<HashMap<String, String>>,
    fail_next: Mutex<Vec<AdapterError>>,
    counter: AtomicU64,
}

impl MockCommerceAdapter {
    pub fn new() -> Self {
        Self {
            orders: Mutex::new(HashMap::new()),
            fail_next: Mutex::new(Vec::new()),
            counter: AtomicU64::new(0),
        }
    }

    pub fn script_failure(&self, err: AdapterError) {
        self.fail_next.lock().expect("lock poisoned").push(err);
    }

    pub fn order_count(&self) -> usize {
        self.orders.lock().expect("lock poisoned").len()
    }
}

impl Default for MockCommerceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommerceAdapter for MockCommerceAdapter {
    async fn create_order(
        &self,
        _delivery_id: Uuid,
        idempotency_key: &str,
    ) -> Result<String, AdapterError> {
        if let Some(prior) = self
            .orders
            .lock()
            .expect("lock poisoned")
            .get(idempotency_key)
        {
            return Ok(prior.clone());
        }
        {
            let mut failures = self.fail_next.lock().expect("lock poisoned");
            if !failures.is_empty() {
                return Err(failures.remove(0));
            }
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let reference = format!("order-{}", n);
        self.orders
            .lock()
            .expect("lock poisoned")
            .insert(idempotency_key.to_string(), reference.clone());
        Ok(reference)
    }
}

/// Mock entitlement system; grants and revokes are naturally idempotent.
pub struct MockEntitlementAdapter {
    grants: Mutex<Vec<(Uuid, Uuid)>>,
    revokes: Mutex<Vec<(Uuid, Uuid)>>,
}

impl MockEntitlementAdapter {
    pub fn new() -> Self {
        Self {
            grants: Mutex::new(Vec::new()),
            revokes: Mutex::new(Vec::new()),
        }
    }

    pub fn granted(&self) -> Vec<(Uuid, Uuid)> {
        self.grants.lock().expect("lock poisoned").clone()
    }

    pub fn revoked(&self) -> Vec<(Uuid, Uuid)> {
        self.revokes.lock().expect("lock poisoned").clone()
    }
}

impl Default for MockEntitlementAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntitlementAdapter for MockEntitlementAdapter {
    async fn grant(
        &self,
        subscription_id: Uuid,
        invoice_id: Uuid,
        _idempotency_key: &str,
    ) -> Result<(), AdapterError> {
        let mut grants = self.grants.lock().expect("lock poisoned");
        if !grants.contains(&(subscription_id, invoice_id)) {
            grants.push((subscription_id, invoice_id));
        }
        Ok(())
    }

    async fn revoke(
        &self,
        subscription_id: Uuid,
        invoice_id: Uuid,
        _idempotency_key: &str,
    ) -> Result<(), AdapterError> {
        let mut revokes = self.revokes.lock().expect("lock poisoned");
        if !revokes.contains(&(subscription_id, invoice_id)) {
            revokes.push((subscription_id, invoice_id));
        }
        Ok(())
    }
}

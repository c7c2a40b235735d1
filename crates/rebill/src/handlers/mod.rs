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

//! Task handlers, one per task type.
//!
//! All handlers follow the same idempotency discipline: collaborator calls
//! use the task key as the idempotency key, and chained task/event writes
//! treat duplicate-key conflicts as successful replays.

pub mod create_delivery;
pub mod create_order;
pub mod entitlement_grant;
pub mod product_renewal;
pub mod subscription_renewal;

pub use create_delivery::CreateDeliveryHandler;
pub use create_order::CreateOrderHandler;
pub use entitlement_grant::EntitlementGrantHandler;
pub use product_renewal::ProductRenewalHandler;
pub use subscription_renewal::SubscriptionRenewalHandler;

use crate::adapters::Adapters;
use crate::dal::DAL;
use crate::error::{HandlerError, StoreError};
use crate::task::HandlerRegistry;

/// A registry with all five billing handlers wired to the given adapters.
pub fn standard_registry(dal: DAL, adapters: &Adapters) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(Box::new(SubscriptionRenewalHandler::new(
        dal.clone(),
        adapters.payments.clone(),
    )));
    registry.register(Box::new(ProductRenewalHandler::new(
        dal.clone(),
        adapters.payments.clone(),
    )));
    registry.register(Box::new(CreateDeliveryHandler::new(
        dal.clone(),
        adapters.deliveries.clone(),
    )));
    registry.register(Box::new(CreateOrderHandler::new(
        dal.clone(),
        adapters.commerce.clone(),
    )));
    registry.register(Box::new(EntitlementGrantHandler::new(
        dal,
        adapters.entitlements.clone(),
    )));
    registry
}

/// Treats duplicate-key conflicts on chained writes as successful replays.
pub(crate) fn ignore_duplicates(result: Result<(), StoreError>) -> Result<(), HandlerError> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_duplicate_key() => Ok(()),
        Err(e) => Err(HandlerError::Store(e)),
    }
}

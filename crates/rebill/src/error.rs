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

//! Error types, one enum per concern.
//!
//! The split that matters operationally is [`HandlerError::is_retryable`]:
//! retryable failures consume an attempt and reschedule the task, terminal
//! failures mark it FAILED immediately regardless of remaining attempts.

use crate::database::UniversalUuid;
use thiserror::Error;

/// Errors from the persistence layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to obtain a connection from the pool
    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    /// Underlying database error
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Migration failure at startup
    #[error("Migration error: {0}")]
    Migration(String),

    /// A task with this (tenant_id, task_key) already exists
    #[error("Duplicate task key '{task_key}' for tenant {tenant_id}")]
    DuplicateTaskKey {
        tenant_id: UniversalUuid,
        task_key: String,
    },

    /// An event with this (tenant_id, event_key) already exists
    #[error("Duplicate event key '{event_key}' for tenant {tenant_id}")]
    DuplicateEventKey {
        tenant_id: UniversalUuid,
        event_key: String,
    },

    /// Row lookup by id failed
    #[error("{entity} {id} not found")]
    NotFound {
        entity: &'static str,
        id: UniversalUuid,
    },

    /// A lifecycle update was applied to a row in the wrong status
    #[error("Invalid status transition for {entity} {id}: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        id: UniversalUuid,
        from: String,
        to: &'static str,
    },
}

impl StoreError {
    /// True for unique-key conflicts, which callers treat as idempotent replays.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(
            self,
            StoreError::DuplicateTaskKey { .. } | StoreError::DuplicateEventKey { .. }
        )
    }
}

/// Errors from collaborator adapters (payment, commerce, entitlement, delivery).
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Transient outage; the attempt may succeed later
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    /// The collaborator rejected the request; retrying will not help
    #[error("Request rejected: {0}")]
    Rejected(String),
}

/// Errors from task handlers, classified for the worker's retry decision.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Payload does not deserialize into the task type's schema (terminal)
    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    /// Permanent business failure (terminal)
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Transient collaborator failure (retryable)
    #[error("Collaborator failure: {0}")]
    Collaborator(String),

    /// Persistence failure during handler side effects (retryable)
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl HandlerError {
    /// Whether this failure consumes an attempt and reschedules, rather than
    /// failing the task outright.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HandlerError::Collaborator(_) | HandlerError::Store(_)
        )
    }
}

impl From<AdapterError> for HandlerError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Unavailable(msg) => HandlerError::Collaborator(msg),
            AdapterError::Rejected(msg) => HandlerError::Rejected(msg),
        }
    }
}

/// Errors from the HTTP delivery transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The endpoint did not respond within the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Connection or protocol failure before a status code was received
    #[error("Request failed: {0}")]
    Network(String),
}

/// Errors from the webhook dispatcher's relay cycle.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Stored event payload or pattern list failed to (de)serialize
    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Errors surfaced while starting the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors from engine configuration validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvironment(String),
}

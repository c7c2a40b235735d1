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

//! Webhook endpoint persistence.

use diesel::prelude::*;

use super::DAL;
use crate::database::schema::webhook_endpoints;
use crate::database::{UniversalTimestamp, UniversalUuid};
use crate::dispatch_query;
use crate::error::StoreError;
use crate::models::webhook_endpoint::{EndpointStatus, NewWebhookEndpoint, WebhookEndpoint};

/// DAL for webhook endpoint operations.
pub struct WebhookEndpointDAL<'a> {
    dal: &'a DAL,
}

impl<'a> WebhookEndpointDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Registers an endpoint.
    pub async fn create(
        &self,
        endpoint: NewWebhookEndpoint,
    ) -> Result<WebhookEndpoint, StoreError> {
        dispatch_query!(self.dal.database, |conn| {
            diesel::insert_into(webhook_endpoints::table)
                .values(&endpoint)
                .get_result::<WebhookEndpoint>(conn)
                .map_err(StoreError::Database)
        })
    }

    /// Activates or disables an endpoint. Existing PENDING deliveries for a
    /// disabled endpoint fail at their next attempt rather than being swept
    /// here.
    pub async fn set_status(
        &self,
        endpoint_id: UniversalUuid,
        status: EndpointStatus,
    ) -> Result<(), StoreError> {
        dispatch_query!(self.dal.database, |conn| {
            let updated = diesel::update(webhook_endpoints::table.find(endpoint_id))
                .set((
                    webhook_endpoints::status.eq(status.as_str()),
                    webhook_endpoints::updated_at.eq(UniversalTimestamp::now()),
                ))
                .execute(conn)?;
            if updated == 0 {
                return Err(StoreError::NotFound {
                    entity: "webhook endpoint",
                    id: endpoint_id,
                });
            }
            Ok(())
        })
    }

    /// Fetches an endpoint by id.
    pub async fn get_by_id(
        &self,
        endpoint_id: UniversalUuid,
    ) -> Result<WebhookEndpoint, StoreError> {
        dispatch_query!(self.dal.database, |conn| {
            webhook_endpoints::table
                .find(endpoint_id)
                .first::<WebhookEndpoint>(conn)
                .optional()?
                .ok_or(StoreError::NotFound {
                    entity: "webhook endpoint",
                    id: endpoint_id,
                })
        })
    }

    /// All ACTIVE endpoints for a tenant.
    pub async fn active_for_tenant(
        &self,
        tenant_id: UniversalUuid,
    ) -> Result<Vec<WebhookEndpoint>, StoreError> {
        dispatch_query!(self.dal.database, |conn| {
            webhook_endpoints::table
                .filter(webhook_endpoints::tenant_id.eq(tenant_id))
                .filter(webhook_endpoints::status.eq(EndpointStatus::Active.as_str()))
                .order(webhook_endpoints::created_at.asc())
                .load::<WebhookEndpoint>(conn)
                .map_err(StoreError::Database)
        })
    }
}

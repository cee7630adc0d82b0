// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compartment lifecycle and arrangement.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use atlas_core::bus::{Envelope, MessageBuffer, Producer, TopicResolver};
use atlas_core::tenant::Tenant;
use atlas_core::topic;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use uuid::Uuid;

use super::merge::{self, ItemTemplate};
use super::model::Compartment;
use super::store::StorageStore;
use crate::error::{Error, Result};

pub const STATUS_ARRANGED: &str = "ARRANGED";
pub const STATUS_ERROR: &str = "ERROR";
pub const COMMAND_ARRANGE: &str = "ARRANGE";

/// Capacity of a freshly created compartment.
pub const DEFAULT_CAPACITY: u32 = 4;

/// Stacking data per item template.
#[async_trait]
pub trait ItemDataSource: Send + Sync {
    /// Templates the source knows; missing ones use the defaults.
    async fn templates(&self, tenant: &Tenant, template_ids: &[u32]) -> Result<HashMap<u32, ItemTemplate>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStatusBody {
    pub storage_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Request to create a compartment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCompartment {
    pub world_id: u8,
    #[serde(default)]
    pub capacity: Option<u32>,
    #[serde(default)]
    pub mesos: u32,
}

pub struct StorageService {
    store: Arc<dyn StorageStore>,
    items: Arc<dyn ItemDataSource>,
    producer: Arc<dyn Producer>,
    topics: TopicResolver,
}

impl StorageService {
    pub fn new(
        store: Arc<dyn StorageStore>,
        items: Arc<dyn ItemDataSource>,
        producer: Arc<dyn Producer>,
        topics: TopicResolver,
    ) -> Self {
        Self {
            store,
            items,
            producer,
            topics,
        }
    }

    pub fn store(&self) -> &dyn StorageStore {
        self.store.as_ref()
    }

    pub async fn create(&self, tenant: &Tenant, account_id: u32, request: CreateCompartment) -> Result<Compartment> {
        let capacity = request.capacity.unwrap_or(DEFAULT_CAPACITY);
        if capacity == 0 {
            return Err(Error::Validation("capacity must be positive".to_string()));
        }
        let mut compartment = Compartment::new(request.world_id, account_id, capacity);
        compartment.mesos = request.mesos;
        let created = self.store.create(tenant, compartment).await?;
        info!(
            tenant_id = %tenant.id,
            storage_id = %created.id,
            account_id,
            world_id = created.world_id,
            "Storage created"
        );
        Ok(created)
    }

    pub async fn get(&self, tenant: &Tenant, world_id: u8, account_id: u32) -> Result<Compartment> {
        self.store
            .by_account(tenant, world_id, account_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Storage for account {}", account_id)))
    }

    /// Merge and sort a compartment, announcing the result.
    ///
    /// Emits `ARRANGED` on success and `ERROR` on failure.
    #[instrument(skip(self), fields(tenant_id = %tenant.id))]
    pub async fn arrange(&self, tenant: &Tenant, world_id: u8, account_id: u32) -> Result<Compartment> {
        let result = self.arrange_inner(tenant, world_id, account_id).await;
        let body = match &result {
            Ok(compartment) => (
                STATUS_ARRANGED,
                StorageStatusBody {
                    storage_id: Some(compartment.id),
                    error: None,
                },
            ),
            Err(e) => {
                error!(error = %e, "Storage arrangement failed");
                (
                    STATUS_ERROR,
                    StorageStatusBody {
                        storage_id: None,
                        error: Some(e.error_code().to_string()),
                    },
                )
            }
        };

        let mut buffer = MessageBuffer::new(tenant);
        buffer.put(
            self.topics.resolve(topic::EVENT_TOPIC_STORAGE_STATUS),
            &Envelope::for_account(world_id, account_id, body.0, body.1),
        )?;
        buffer.flush(self.producer.as_ref()).await?;
        result
    }

    async fn arrange_inner(&self, tenant: &Tenant, world_id: u8, account_id: u32) -> Result<Compartment> {
        let mut compartment = self.get(tenant, world_id, account_id).await?;

        let template_ids: Vec<u32> = compartment
            .assets
            .iter()
            .filter(|a| a.stack.is_some())
            .map(|a| a.template_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let templates = if template_ids.is_empty() {
            HashMap::new()
        } else {
            self.items.templates(tenant, &template_ids).await?
        };

        let arrangement = merge::plan(&compartment.assets, &templates);
        if !arrangement.is_noop() {
            self.store.apply(tenant, compartment.id, &arrangement).await?;
        }
        info!(
            storage_id = %compartment.id,
            merged = arrangement.removed.len(),
            moved = arrangement.slots.len(),
            "Storage arranged"
        );
        compartment.assets = arrangement.assets;
        Ok(compartment)
    }
}

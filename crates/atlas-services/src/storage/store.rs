// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compartment storage.

use async_trait::async_trait;
use atlas_core::registry::TenantRegistry;
use atlas_core::tenant::Tenant;
use uuid::Uuid;

use super::merge::Arrangement;
use super::model::{Asset, Compartment};
use crate::error::{Error, Result};

/// Persistence of compartments, unique per `(tenant, world, account)`.
#[async_trait]
pub trait StorageStore: Send + Sync {
    /// Fails with `Conflict` when the account already has storage in the world.
    async fn create(&self, tenant: &Tenant, compartment: Compartment) -> Result<Compartment>;

    /// Compartment with its assets.
    async fn by_account(
        &self,
        tenant: &Tenant,
        world_id: u8,
        account_id: u32,
    ) -> Result<Option<Compartment>>;

    async fn add_asset(&self, tenant: &Tenant, storage_id: Uuid, asset: Asset) -> Result<()>;

    /// Write an arrangement: quantities, then removals, then slots.
    async fn apply(&self, tenant: &Tenant, storage_id: Uuid, arrangement: &Arrangement) -> Result<()>;
}

/// In-memory compartments.
#[derive(Default)]
pub struct MemoryStorageStore {
    compartments: TenantRegistry<Uuid, Compartment>,
}

impl MemoryStorageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(storage_id: Uuid) -> Error {
    Error::NotFound(format!("Storage {}", storage_id))
}

#[async_trait]
impl StorageStore for MemoryStorageStore {
    async fn create(&self, tenant: &Tenant, compartment: Compartment) -> Result<Compartment> {
        self.compartments.write(tenant, |all| {
            if all
                .values()
                .any(|c| c.world_id == compartment.world_id && c.account_id == compartment.account_id)
            {
                return Err(Error::Conflict(format!(
                    "storage for account {} in world {}",
                    compartment.account_id, compartment.world_id
                )));
            }
            all.insert(compartment.id, compartment.clone());
            Ok(compartment)
        })
    }

    async fn by_account(
        &self,
        tenant: &Tenant,
        world_id: u8,
        account_id: u32,
    ) -> Result<Option<Compartment>> {
        Ok(self.compartments.read(tenant, |all| {
            all.values()
                .find(|c| c.world_id == world_id && c.account_id == account_id)
                .cloned()
        }))
    }

    async fn add_asset(&self, tenant: &Tenant, storage_id: Uuid, asset: Asset) -> Result<()> {
        self.compartments.write(tenant, |all| {
            let compartment = all.get_mut(&storage_id).ok_or_else(|| missing(storage_id))?;
            if compartment.assets.iter().any(|a| a.slot == asset.slot) {
                return Err(Error::Conflict(format!("slot {} is occupied", asset.slot)));
            }
            compartment.assets.push(asset);
            Ok(())
        })
    }

    async fn apply(&self, tenant: &Tenant, storage_id: Uuid, arrangement: &Arrangement) -> Result<()> {
        self.compartments.write(tenant, |all| {
            let compartment = all.get_mut(&storage_id).ok_or_else(|| missing(storage_id))?;
            for &(id, quantity) in &arrangement.quantities {
                if let Some(stack) = compartment
                    .assets
                    .iter_mut()
                    .find(|a| a.id == id)
                    .and_then(|a| a.stack.as_mut())
                {
                    stack.quantity = quantity;
                }
            }
            compartment
                .assets
                .retain(|a| !arrangement.removed.contains(&a.id));
            for &(id, slot) in &arrangement.slots {
                if let Some(asset) = compartment.assets.iter_mut().find(|a| a.id == id) {
                    asset.slot = slot;
                }
            }
            compartment.assets.sort_by_key(|a| a.slot);
            Ok(())
        })
    }
}

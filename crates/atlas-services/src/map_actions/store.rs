// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Map-action script storage.

use async_trait::async_trait;
use atlas_core::registry::TenantRegistry;
use atlas_core::tenant::Tenant;
use uuid::Uuid;

use super::model::{MapActionScript, StoredScript};
use crate::error::{Error, Result};

/// Persistence of scripts, unique per `(tenant, scriptName, scriptType)`.
#[async_trait]
pub trait ScriptStore: Send + Sync {
    async fn list(&self, tenant: &Tenant) -> Result<Vec<StoredScript>>;
    async fn get(&self, tenant: &Tenant, id: Uuid) -> Result<Option<StoredScript>>;
    async fn by_name(&self, tenant: &Tenant, script_name: &str) -> Result<Vec<StoredScript>>;
    async fn by_name_and_type(
        &self,
        tenant: &Tenant,
        script_name: &str,
        script_type: &str,
    ) -> Result<Option<StoredScript>>;
    /// Fails with `Conflict` when the name and type are taken.
    async fn insert(&self, tenant: &Tenant, script: MapActionScript) -> Result<StoredScript>;
    /// Fails with `NotFound` for an unknown id.
    async fn replace(&self, tenant: &Tenant, id: Uuid, script: MapActionScript) -> Result<StoredScript>;
    async fn delete(&self, tenant: &Tenant, id: Uuid) -> Result<bool>;
    async fn delete_all(&self, tenant: &Tenant) -> Result<u64>;
}

fn same_key(a: &MapActionScript, b: &MapActionScript) -> bool {
    a.script_name == b.script_name && a.script_type == b.script_type
}

fn conflict(script: &MapActionScript) -> Error {
    Error::Conflict(format!(
        "map action script {}/{}",
        script.script_name, script.script_type
    ))
}

/// In-memory scripts.
#[derive(Default)]
pub struct MemoryScriptStore {
    scripts: TenantRegistry<Uuid, StoredScript>,
}

impl MemoryScriptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScriptStore for MemoryScriptStore {
    async fn list(&self, tenant: &Tenant) -> Result<Vec<StoredScript>> {
        let mut all = self.scripts.values(tenant);
        all.sort_by(|a, b| {
            (&a.script.script_name, &a.script.script_type)
                .cmp(&(&b.script.script_name, &b.script.script_type))
        });
        Ok(all)
    }

    async fn get(&self, tenant: &Tenant, id: Uuid) -> Result<Option<StoredScript>> {
        Ok(self.scripts.get(tenant, &id))
    }

    async fn by_name(&self, tenant: &Tenant, script_name: &str) -> Result<Vec<StoredScript>> {
        Ok(self
            .list(tenant)
            .await?
            .into_iter()
            .filter(|s| s.script.script_name == script_name)
            .collect())
    }

    async fn by_name_and_type(
        &self,
        tenant: &Tenant,
        script_name: &str,
        script_type: &str,
    ) -> Result<Option<StoredScript>> {
        Ok(self.scripts.read(tenant, |scripts| {
            scripts
                .values()
                .find(|s| s.script.script_name == script_name && s.script.script_type == script_type)
                .cloned()
        }))
    }

    async fn insert(&self, tenant: &Tenant, script: MapActionScript) -> Result<StoredScript> {
        self.scripts.write(tenant, |scripts| {
            if scripts.values().any(|s| same_key(&s.script, &script)) {
                return Err(conflict(&script));
            }
            let stored = StoredScript {
                id: Uuid::new_v4(),
                script,
            };
            scripts.insert(stored.id, stored.clone());
            Ok(stored)
        })
    }

    async fn replace(&self, tenant: &Tenant, id: Uuid, script: MapActionScript) -> Result<StoredScript> {
        self.scripts.write(tenant, |scripts| {
            if scripts
                .values()
                .any(|s| s.id != id && same_key(&s.script, &script))
            {
                return Err(conflict(&script));
            }
            let stored = scripts
                .get_mut(&id)
                .ok_or_else(|| Error::NotFound(format!("map action script {}", id)))?;
            stored.script = script;
            Ok(stored.clone())
        })
    }

    async fn delete(&self, tenant: &Tenant, id: Uuid) -> Result<bool> {
        Ok(self.scripts.remove(tenant, &id).is_some())
    }

    async fn delete_all(&self, tenant: &Tenant) -> Result<u64> {
        Ok(self.scripts.clear(tenant) as u64)
    }
}

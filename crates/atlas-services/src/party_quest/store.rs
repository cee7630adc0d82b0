// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Party-quest definition storage.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use atlas_core::registry::TenantRegistry;
use atlas_core::tenant::Tenant;
use tracing::{info, instrument};
use uuid::Uuid;

use super::definition::{PartyQuestDefinition, StoredDefinition, ValidationReport};
use crate::error::{Error, Result};
use crate::seed::{SeedResult, read_json_dir};

/// Persistence of definitions, unique per `(tenant, questId)`.
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    async fn list(&self, tenant: &Tenant) -> Result<Vec<StoredDefinition>>;
    async fn get(&self, tenant: &Tenant, id: Uuid) -> Result<Option<StoredDefinition>>;
    async fn by_quest_id(&self, tenant: &Tenant, quest_id: &str) -> Result<Option<StoredDefinition>>;
    /// Fails with `Conflict` when the quest id is taken.
    async fn insert(&self, tenant: &Tenant, definition: PartyQuestDefinition) -> Result<StoredDefinition>;
    /// Fails with `NotFound` for an unknown id.
    async fn replace(
        &self,
        tenant: &Tenant,
        id: Uuid,
        definition: PartyQuestDefinition,
    ) -> Result<StoredDefinition>;
    async fn delete(&self, tenant: &Tenant, id: Uuid) -> Result<bool>;
    async fn delete_all(&self, tenant: &Tenant) -> Result<u64>;
}

/// In-memory definitions.
#[derive(Default)]
pub struct MemoryDefinitionStore {
    definitions: TenantRegistry<Uuid, StoredDefinition>,
}

impl MemoryDefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DefinitionStore for MemoryDefinitionStore {
    async fn list(&self, tenant: &Tenant) -> Result<Vec<StoredDefinition>> {
        let mut all = self.definitions.values(tenant);
        all.sort_by(|a, b| a.definition.quest_id.cmp(&b.definition.quest_id));
        Ok(all)
    }

    async fn get(&self, tenant: &Tenant, id: Uuid) -> Result<Option<StoredDefinition>> {
        Ok(self.definitions.get(tenant, &id))
    }

    async fn by_quest_id(&self, tenant: &Tenant, quest_id: &str) -> Result<Option<StoredDefinition>> {
        Ok(self.definitions.read(tenant, |defs| {
            defs.values()
                .find(|d| d.definition.quest_id == quest_id)
                .cloned()
        }))
    }

    async fn insert(&self, tenant: &Tenant, definition: PartyQuestDefinition) -> Result<StoredDefinition> {
        self.definitions.write(tenant, |defs| {
            if defs
                .values()
                .any(|d| d.definition.quest_id == definition.quest_id)
            {
                return Err(Error::Conflict(format!(
                    "party quest definition {}",
                    definition.quest_id
                )));
            }
            let stored = StoredDefinition {
                id: Uuid::new_v4(),
                definition,
            };
            defs.insert(stored.id, stored.clone());
            Ok(stored)
        })
    }

    async fn replace(
        &self,
        tenant: &Tenant,
        id: Uuid,
        definition: PartyQuestDefinition,
    ) -> Result<StoredDefinition> {
        self.definitions.write(tenant, |defs| {
            if defs
                .values()
                .any(|d| d.id != id && d.definition.quest_id == definition.quest_id)
            {
                return Err(Error::Conflict(format!(
                    "party quest definition {}",
                    definition.quest_id
                )));
            }
            let stored = defs
                .get_mut(&id)
                .ok_or_else(|| Error::NotFound(format!("party quest definition {}", id)))?;
            stored.definition = definition;
            Ok(stored.clone())
        })
    }

    async fn delete(&self, tenant: &Tenant, id: Uuid) -> Result<bool> {
        Ok(self.definitions.remove(tenant, &id).is_some())
    }

    async fn delete_all(&self, tenant: &Tenant) -> Result<u64> {
        Ok(self.definitions.clear(tenant) as u64)
    }
}

/// Definition management: validation on write, seeding, and audits.
pub struct PartyQuestDefinitions {
    store: Arc<dyn DefinitionStore>,
    seed_dir: PathBuf,
}

fn rejection(report: &ValidationReport) -> Error {
    Error::Validation(format!(
        "party quest definition {}: {}",
        report.quest_id,
        report.errors.join("; ")
    ))
}

impl PartyQuestDefinitions {
    pub fn new(store: Arc<dyn DefinitionStore>, seed_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            seed_dir: seed_dir.into(),
        }
    }

    pub fn store(&self) -> &dyn DefinitionStore {
        self.store.as_ref()
    }

    pub async fn create(&self, tenant: &Tenant, definition: PartyQuestDefinition) -> Result<StoredDefinition> {
        let report = definition.validate();
        if !report.is_valid() {
            return Err(rejection(&report));
        }
        self.store.insert(tenant, definition).await
    }

    pub async fn update(
        &self,
        tenant: &Tenant,
        id: Uuid,
        definition: PartyQuestDefinition,
    ) -> Result<StoredDefinition> {
        let report = definition.validate();
        if !report.is_valid() {
            return Err(rejection(&report));
        }
        self.store.replace(tenant, id, definition).await
    }

    /// Replace a tenant's definitions with the seed directory's contents.
    #[instrument(skip(self), fields(tenant_id = %tenant.id))]
    pub async fn seed(&self, tenant: &Tenant) -> Result<SeedResult> {
        self.seed_from(tenant, &self.seed_dir).await
    }

    pub async fn seed_from(&self, tenant: &Tenant, dir: &Path) -> Result<SeedResult> {
        let documents = read_json_dir::<PartyQuestDefinition>(dir)?;
        let mut result = SeedResult {
            deleted: self.store.delete_all(tenant).await?,
            ..Default::default()
        };

        for (file, parsed) in documents {
            let created = match parsed {
                Ok(definition) => self.create(tenant, definition).await,
                Err(e) => Err(e),
            };
            match created {
                Ok(_) => result.created += 1,
                Err(e) => result.record_failure(&file, e),
            }
        }

        info!(
            deleted = result.deleted,
            created = result.created,
            failed = result.failed,
            "Seeded party quest definitions"
        );
        Ok(result)
    }

    /// Validate every stored definition.
    pub async fn validate_all(&self, tenant: &Tenant) -> Result<Vec<ValidationReport>> {
        Ok(self
            .store
            .list(tenant)
            .await?
            .iter()
            .map(|stored| stored.definition.validate())
            .collect())
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL stores for atlas-services.
//!
//! Script and definition documents are stored whole as JSON text next to the
//! columns their uniqueness constraints need. Storage compartments are fully
//! relational, with stack side-data in its own table.

use async_trait::async_trait;
use atlas_core::tenant::Tenant;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::map_actions::model::{MapActionScript, StoredScript};
use crate::map_actions::store::ScriptStore;
use crate::party_quest::definition::{PartyQuestDefinition, StoredDefinition};
use crate::party_quest::store::DefinitionStore;
use crate::storage::merge::Arrangement;
use crate::storage::model::{Asset, Compartment, ReferenceType, Stack};
use crate::storage::store::StorageStore;

/// Connect a pool for the services stores.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Check if the database connection is healthy.
pub async fn health_check(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

fn unique_violation(err: sqlx::Error, what: impl FnOnce() -> String) -> Error {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => Error::Conflict(what()),
        _ => Error::Database(err),
    }
}

// ============================================================================
// Map-action scripts
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct DocumentRow {
    id: Uuid,
    json_body: String,
}

impl DocumentRow {
    fn script(self) -> Result<StoredScript> {
        Ok(StoredScript {
            id: self.id,
            script: serde_json::from_str(&self.json_body)?,
        })
    }

    fn definition(self) -> Result<StoredDefinition> {
        Ok(StoredDefinition {
            id: self.id,
            definition: serde_json::from_str(&self.json_body)?,
        })
    }
}

/// Map-action scripts in the `map_action_scripts` table.
#[derive(Clone)]
pub struct PgScriptStore {
    pool: PgPool,
}

impl PgScriptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScriptStore for PgScriptStore {
    async fn list(&self, tenant: &Tenant) -> Result<Vec<StoredScript>> {
        sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, json_body FROM map_action_scripts
            WHERE tenant_id = $1
            ORDER BY script_name, script_type
            "#,
        )
        .bind(tenant.key())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(DocumentRow::script)
        .collect()
    }

    async fn get(&self, tenant: &Tenant, id: Uuid) -> Result<Option<StoredScript>> {
        sqlx::query_as::<_, DocumentRow>(
            "SELECT id, json_body FROM map_action_scripts WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant.key())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(DocumentRow::script)
        .transpose()
    }

    async fn by_name(&self, tenant: &Tenant, script_name: &str) -> Result<Vec<StoredScript>> {
        sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, json_body FROM map_action_scripts
            WHERE tenant_id = $1 AND script_name = $2
            ORDER BY script_type
            "#,
        )
        .bind(tenant.key())
        .bind(script_name)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(DocumentRow::script)
        .collect()
    }

    async fn by_name_and_type(
        &self,
        tenant: &Tenant,
        script_name: &str,
        script_type: &str,
    ) -> Result<Option<StoredScript>> {
        sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, json_body FROM map_action_scripts
            WHERE tenant_id = $1 AND script_name = $2 AND script_type = $3
            "#,
        )
        .bind(tenant.key())
        .bind(script_name)
        .bind(script_type)
        .fetch_optional(&self.pool)
        .await?
        .map(DocumentRow::script)
        .transpose()
    }

    async fn insert(&self, tenant: &Tenant, script: MapActionScript) -> Result<StoredScript> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO map_action_scripts (id, tenant_id, script_name, script_type, json_body)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(tenant.key())
        .bind(&script.script_name)
        .bind(&script.script_type)
        .bind(serde_json::to_string(&script)?)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            unique_violation(e, || {
                format!("map action script {}/{}", script.script_name, script.script_type)
            })
        })?;
        Ok(StoredScript { id, script })
    }

    async fn replace(&self, tenant: &Tenant, id: Uuid, script: MapActionScript) -> Result<StoredScript> {
        let updated = sqlx::query(
            r#"
            UPDATE map_action_scripts
            SET script_name = $3, script_type = $4, json_body = $5, updated_at = NOW()
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant.key())
        .bind(id)
        .bind(&script.script_name)
        .bind(&script.script_type)
        .bind(serde_json::to_string(&script)?)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            unique_violation(e, || {
                format!("map action script {}/{}", script.script_name, script.script_type)
            })
        })?;
        if updated.rows_affected() == 0 {
            return Err(Error::NotFound(format!("map action script {}", id)));
        }
        Ok(StoredScript { id, script })
    }

    async fn delete(&self, tenant: &Tenant, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM map_action_scripts WHERE tenant_id = $1 AND id = $2")
            .bind(tenant.key())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all(&self, tenant: &Tenant) -> Result<u64> {
        let result = sqlx::query("DELETE FROM map_action_scripts WHERE tenant_id = $1")
            .bind(tenant.key())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ============================================================================
// Party-quest definitions
// ============================================================================

/// Party-quest definitions in the `party_quest_definitions` table.
#[derive(Clone)]
pub struct PgDefinitionStore {
    pool: PgPool,
}

impl PgDefinitionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DefinitionStore for PgDefinitionStore {
    async fn list(&self, tenant: &Tenant) -> Result<Vec<StoredDefinition>> {
        sqlx::query_as::<_, DocumentRow>(
            "SELECT id, json_body FROM party_quest_definitions WHERE tenant_id = $1 ORDER BY quest_id",
        )
        .bind(tenant.key())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(DocumentRow::definition)
        .collect()
    }

    async fn get(&self, tenant: &Tenant, id: Uuid) -> Result<Option<StoredDefinition>> {
        sqlx::query_as::<_, DocumentRow>(
            "SELECT id, json_body FROM party_quest_definitions WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant.key())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(DocumentRow::definition)
        .transpose()
    }

    async fn by_quest_id(&self, tenant: &Tenant, quest_id: &str) -> Result<Option<StoredDefinition>> {
        sqlx::query_as::<_, DocumentRow>(
            "SELECT id, json_body FROM party_quest_definitions WHERE tenant_id = $1 AND quest_id = $2",
        )
        .bind(tenant.key())
        .bind(quest_id)
        .fetch_optional(&self.pool)
        .await?
        .map(DocumentRow::definition)
        .transpose()
    }

    async fn insert(&self, tenant: &Tenant, definition: PartyQuestDefinition) -> Result<StoredDefinition> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO party_quest_definitions (id, tenant_id, quest_id, json_body)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(id)
        .bind(tenant.key())
        .bind(&definition.quest_id)
        .bind(serde_json::to_string(&definition)?)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_violation(e, || format!("party quest definition {}", definition.quest_id)))?;
        Ok(StoredDefinition { id, definition })
    }

    async fn replace(
        &self,
        tenant: &Tenant,
        id: Uuid,
        definition: PartyQuestDefinition,
    ) -> Result<StoredDefinition> {
        let updated = sqlx::query(
            r#"
            UPDATE party_quest_definitions
            SET quest_id = $3, json_body = $4, updated_at = NOW()
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant.key())
        .bind(id)
        .bind(&definition.quest_id)
        .bind(serde_json::to_string(&definition)?)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_violation(e, || format!("party quest definition {}", definition.quest_id)))?;
        if updated.rows_affected() == 0 {
            return Err(Error::NotFound(format!("party quest definition {}", id)));
        }
        Ok(StoredDefinition { id, definition })
    }

    async fn delete(&self, tenant: &Tenant, id: Uuid) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM party_quest_definitions WHERE tenant_id = $1 AND id = $2")
                .bind(tenant.key())
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all(&self, tenant: &Tenant) -> Result<u64> {
        let result = sqlx::query("DELETE FROM party_quest_definitions WHERE tenant_id = $1")
            .bind(tenant.key())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ============================================================================
// Storage compartments
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct CompartmentRow {
    id: Uuid,
    world_id: i16,
    account_id: i64,
    capacity: i32,
    mesos: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct AssetRow {
    id: Uuid,
    slot: i16,
    template_id: i64,
    reference_type: String,
    expiration: Option<DateTime<Utc>>,
    quantity: Option<i32>,
    owner_id: Option<i64>,
    flag: Option<i32>,
}

impl AssetRow {
    fn into_asset(self) -> Result<Asset> {
        let reference_type = ReferenceType::parse(&self.reference_type).ok_or_else(|| {
            Error::Validation(format!("unknown reference type {}", self.reference_type))
        })?;
        let stack = match (reference_type.is_stackable(), self.quantity) {
            (true, Some(quantity)) => Some(Stack {
                quantity: quantity.max(0) as u32,
                owner_id: self.owner_id.unwrap_or(0) as u32,
                flag: self.flag.unwrap_or(0) as u16,
            }),
            _ => None,
        };
        Ok(Asset {
            id: self.id,
            slot: self.slot,
            template_id: self.template_id as u32,
            reference_type,
            expiration: self.expiration,
            stack,
        })
    }
}

/// Storage compartments in the `storages` family of tables.
#[derive(Clone)]
pub struct PgStorageStore {
    pool: PgPool,
}

impl PgStorageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StorageStore for PgStorageStore {
    async fn create(&self, tenant: &Tenant, compartment: Compartment) -> Result<Compartment> {
        sqlx::query(
            r#"
            INSERT INTO storages (id, tenant_id, world_id, account_id, capacity, mesos)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(compartment.id)
        .bind(tenant.key())
        .bind(i16::from(compartment.world_id))
        .bind(i64::from(compartment.account_id))
        .bind(compartment.capacity as i32)
        .bind(i64::from(compartment.mesos))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            unique_violation(e, || {
                format!(
                    "storage for account {} in world {}",
                    compartment.account_id, compartment.world_id
                )
            })
        })?;
        Ok(compartment)
    }

    async fn by_account(
        &self,
        tenant: &Tenant,
        world_id: u8,
        account_id: u32,
    ) -> Result<Option<Compartment>> {
        let Some(row) = sqlx::query_as::<_, CompartmentRow>(
            r#"
            SELECT id, world_id, account_id, capacity, mesos FROM storages
            WHERE tenant_id = $1 AND world_id = $2 AND account_id = $3
            "#,
        )
        .bind(tenant.key())
        .bind(i16::from(world_id))
        .bind(i64::from(account_id))
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        // Side-data in one batch via the join.
        let assets = sqlx::query_as::<_, AssetRow>(
            r#"
            SELECT a.id, a.slot, a.template_id, a.reference_type, a.expiration,
                   s.quantity, s.owner_id, s.flag
            FROM storage_assets a
            LEFT JOIN storage_stackables s ON s.asset_id = a.id
            WHERE a.storage_id = $1
            ORDER BY a.slot
            "#,
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(AssetRow::into_asset)
        .collect::<Result<Vec<_>>>()?;

        Ok(Some(Compartment {
            id: row.id,
            world_id: row.world_id as u8,
            account_id: row.account_id as u32,
            capacity: row.capacity as u32,
            mesos: row.mesos as u32,
            assets,
        }))
    }

    async fn add_asset(&self, _tenant: &Tenant, storage_id: Uuid, asset: Asset) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO storage_assets (id, storage_id, slot, template_id, reference_type, expiration)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(asset.id)
        .bind(storage_id)
        .bind(asset.slot)
        .bind(i64::from(asset.template_id))
        .bind(asset.reference_type.as_str())
        .bind(asset.expiration)
        .execute(&mut *tx)
        .await?;

        if let Some(stack) = asset.stack {
            sqlx::query(
                "INSERT INTO storage_stackables (asset_id, quantity, owner_id, flag) VALUES ($1, $2, $3, $4)",
            )
            .bind(asset.id)
            .bind(stack.quantity as i32)
            .bind(i64::from(stack.owner_id))
            .bind(i32::from(stack.flag))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit()
            .await
            .map_err(|e| unique_violation(e, || format!("slot {} is occupied", asset.slot)))?;
        Ok(())
    }

    async fn apply(&self, _tenant: &Tenant, storage_id: Uuid, arrangement: &Arrangement) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for &(asset_id, quantity) in &arrangement.quantities {
            sqlx::query("UPDATE storage_stackables SET quantity = $2 WHERE asset_id = $1")
                .bind(asset_id)
                .bind(quantity as i32)
                .execute(&mut *tx)
                .await?;
        }

        for &asset_id in &arrangement.removed {
            let side = sqlx::query("DELETE FROM storage_stackables WHERE asset_id = $1")
                .bind(asset_id)
                .execute(&mut *tx)
                .await?;
            if side.rows_affected() == 0 {
                debug!(asset_id = %asset_id, "Merged asset had no stack data");
            }
            let removed =
                sqlx::query("DELETE FROM storage_assets WHERE id = $1 AND storage_id = $2")
                    .bind(asset_id)
                    .bind(storage_id)
                    .execute(&mut *tx)
                    .await?;
            if removed.rows_affected() == 0 {
                return Err(Error::NotFound(format!("Asset {}", asset_id)));
            }
        }

        for &(asset_id, slot) in &arrangement.slots {
            sqlx::query("UPDATE storage_assets SET slot = $3 WHERE id = $1 AND storage_id = $2")
                .bind(asset_id)
                .bind(storage_id)
                .bind(slot)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

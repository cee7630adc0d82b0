// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Map entry processing and script management.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use atlas_core::tenant::Tenant;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::evaluator::RuleEvaluator;
use super::executor::OperationExecutor;
use super::model::{MapActionScript, Operation, StoredScript};
use super::store::ScriptStore;
use crate::error::Result;
use crate::field::Field;
use crate::seed::{SeedResult, read_json_dir};

pub const NO_SCRIPT: &str = "no_script";
pub const NO_MATCH: &str = "no_match";

/// Command asking for a script to run for a character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapActionCommand {
    #[serde(flatten)]
    pub field: Field,
    pub character_id: u32,
    pub script_name: String,
    pub script_type: String,
}

/// What running a script did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResult {
    /// Id of the matched rule, or `no_script` / `no_match`.
    pub matched_rule: String,
    pub operations: Vec<Operation>,
    pub submitted: usize,
}

impl ProcessResult {
    fn unmatched(reason: &str) -> Self {
        Self {
            matched_rule: reason.to_string(),
            operations: Vec::new(),
            submitted: 0,
        }
    }
}

pub struct MapActionProcessor {
    store: Arc<dyn ScriptStore>,
    evaluator: RuleEvaluator,
    executor: OperationExecutor,
    seed_dir: PathBuf,
}

impl MapActionProcessor {
    pub fn new(
        store: Arc<dyn ScriptStore>,
        evaluator: RuleEvaluator,
        executor: OperationExecutor,
        seed_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            evaluator,
            executor,
            seed_dir: seed_dir.into(),
        }
    }

    pub fn store(&self) -> &dyn ScriptStore {
        self.store.as_ref()
    }

    /// Run the first matching rule of a script.
    #[instrument(skip(self), fields(tenant_id = %tenant.id))]
    pub async fn process(
        &self,
        tenant: &Tenant,
        field: &Field,
        character_id: u32,
        script_name: &str,
        script_type: &str,
    ) -> Result<ProcessResult> {
        let Some(stored) = self
            .store
            .by_name_and_type(tenant, script_name, script_type)
            .await?
        else {
            debug!("No map action script");
            return Ok(ProcessResult::unmatched(NO_SCRIPT));
        };

        for rule in &stored.script.rules {
            if !self
                .evaluator
                .matches(tenant, field, character_id, rule)
                .await?
            {
                continue;
            }

            let submitted = self
                .executor
                .execute(tenant, field, character_id, &rule.operations)
                .await?;
            debug!(rule = %rule.id, submitted, "Map action rule matched");
            return Ok(ProcessResult {
                matched_rule: rule.id.clone(),
                operations: rule.operations.clone(),
                submitted,
            });
        }

        debug!("No map action rule matched");
        Ok(ProcessResult::unmatched(NO_MATCH))
    }

    pub async fn handle_command(&self, tenant: &Tenant, command: MapActionCommand) -> Result<ProcessResult> {
        self.process(
            tenant,
            &command.field,
            command.character_id,
            &command.script_name,
            &command.script_type,
        )
        .await
    }

    pub async fn create(&self, tenant: &Tenant, script: MapActionScript) -> Result<StoredScript> {
        script.validate()?;
        self.store.insert(tenant, script).await
    }

    pub async fn update(&self, tenant: &Tenant, id: Uuid, script: MapActionScript) -> Result<StoredScript> {
        script.validate()?;
        self.store.replace(tenant, id, script).await
    }

    /// Replace a tenant's scripts with the seed directory's contents.
    #[instrument(skip(self), fields(tenant_id = %tenant.id))]
    pub async fn seed(&self, tenant: &Tenant) -> Result<SeedResult> {
        self.seed_from(tenant, &self.seed_dir).await
    }

    pub async fn seed_from(&self, tenant: &Tenant, dir: &Path) -> Result<SeedResult> {
        let documents = read_json_dir::<MapActionScript>(dir)?;
        let mut result = SeedResult {
            deleted: self.store.delete_all(tenant).await?,
            ..Default::default()
        };

        for (file, parsed) in documents {
            let created = match parsed {
                Ok(script) => self.create(tenant, script).await,
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
            "Seeded map action scripts"
        );
        Ok(result)
    }
}

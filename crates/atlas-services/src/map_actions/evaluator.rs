// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Rule condition evaluation.
//!
//! `map_id` conditions are checked locally against the field. Every other
//! condition of a rule goes to the character-state validator in one batch,
//! which answers pass or fail for the whole batch.

use std::sync::Arc;

use async_trait::async_trait;
use atlas_core::saga::action::ConditionInput;
use atlas_core::tenant::Tenant;

use super::model::{Condition, Rule};
use crate::error::{Error, Result};
use crate::field::Field;

pub const MAP_ID_CONDITION: &str = "map_id";

/// Checks character state conditions.
#[async_trait]
pub trait CharacterValidator: Send + Sync {
    /// Whether the character satisfies every condition.
    async fn validate(
        &self,
        tenant: &Tenant,
        character_id: u32,
        conditions: &[ConditionInput],
    ) -> Result<bool>;
}

fn map_condition_holds(condition: &Condition, map_id: u32) -> Result<bool> {
    let expected = condition.value.parse::<u32>().ok_or_else(|| {
        Error::Validation(format!("map_id condition value '{}' is not a map id", condition.value))
    })?;
    match condition.operator.as_str() {
        "=" | "==" => Ok(map_id == expected),
        "!=" => Ok(map_id != expected),
        other => Err(Error::Validation(format!(
            "map_id condition does not support operator '{}'",
            other
        ))),
    }
}

pub struct RuleEvaluator {
    validator: Arc<dyn CharacterValidator>,
}

impl RuleEvaluator {
    pub fn new(validator: Arc<dyn CharacterValidator>) -> Self {
        Self { validator }
    }

    /// Whether every condition of the rule holds. A rule without conditions
    /// always matches.
    pub async fn matches(
        &self,
        tenant: &Tenant,
        field: &Field,
        character_id: u32,
        rule: &Rule,
    ) -> Result<bool> {
        let mut remote = Vec::new();
        for condition in &rule.conditions {
            if condition.kind == MAP_ID_CONDITION {
                if !map_condition_holds(condition, field.map_id)? {
                    return Ok(false);
                }
            } else {
                remote.push(condition.to_input()?);
            }
        }

        if remote.is_empty() {
            return Ok(true);
        }
        self.validator.validate(tenant, character_id, &remote).await
    }
}

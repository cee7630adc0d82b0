// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Party-quest definitions and their structural validator.
//!
//! Closed-set fields are kept as strings on the model so that an unknown
//! value surfaces as a validation error naming the field instead of a parse
//! failure of the whole document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const REGISTRATION_TYPES: &[&str] = &["party", "individual"];
pub const REGISTRATION_MODES: &[&str] = &["instant", "timed"];
pub const AFFINITIES: &[&str] = &["", "none", "party", "guild"];
pub const BONUS_ENTRIES: &[&str] = &["auto", "manual"];
pub const STAGE_TYPES: &[&str] = &[
    "item_collection",
    "monster_killing",
    "combination_puzzle",
    "warp_puzzle",
    "bonus",
];
pub const CLEAR_CONDITION_TYPES: &[&str] = &["item", "monster_kill", "custom_data"];
pub const CLEAR_OPERATORS: &[&str] = &[">=", "<=", "=", ">", "<"];
pub const CLEAR_ACTIONS: &[&str] = &["destroy_monsters"];
pub const REWARD_TYPES: &[&str] = &["experience", "item", "random_item"];
pub const WARP_TYPES: &[&str] = &["", "none", "auto"];
pub const REQUIREMENT_OPERATORS: &[&str] = &["eq", "gte", "lte", "gt", "lt"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    #[serde(rename = "type")]
    pub kind: String,
    pub mode: String,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub map_id: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub affinity: String,
}

/// A start or fail requirement, e.g. `level_min gte 21`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    #[serde(rename = "type")]
    pub kind: String,
    pub operator: String,
    pub value: i64,
}

impl Requirement {
    /// Evaluate `actual <operator> value`. Unknown operators never pass.
    pub fn satisfied_by(&self, actual: i64) -> bool {
        match self.operator.as_str() {
            "eq" => actual == self.value,
            "gte" => actual >= self.value,
            "lte" => actual <= self.value,
            "gt" => actual > self.value,
            "lt" => actual < self.value,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub target: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bonus {
    #[serde(default)]
    pub map_id: u32,
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub entry: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub completion_map_id: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Value>,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearCondition {
    #[serde(rename = "type")]
    pub kind: String,
    pub operator: String,
    pub value: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardItem {
    pub item_id: u32,
    #[serde(default = "one")]
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chance: Option<u32>,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub amount: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<RewardItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub index: u32,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub map_ids: Vec<u32>,
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub clear_conditions: Vec<ClearCondition>,
    #[serde(default)]
    pub clear_actions: Vec<String>,
    #[serde(default)]
    pub rewards: Vec<Reward>,
    #[serde(default)]
    pub warp_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Value>,
}

/// A party-quest definition document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyQuestDefinition {
    pub quest_id: String,
    pub name: String,
    #[serde(default)]
    pub field_lock: String,
    #[serde(default)]
    pub duration: u64,
    pub registration: Registration,
    #[serde(default)]
    pub start_requirements: Vec<Requirement>,
    #[serde(default)]
    pub start_events: Vec<StartEvent>,
    #[serde(default)]
    pub fail_requirements: Vec<Requirement>,
    #[serde(default)]
    pub exit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bonus: Option<Bonus>,
    #[serde(default)]
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub rewards: Vec<Reward>,
}

/// A persisted definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDefinition {
    pub id: Uuid,
    #[serde(flatten)]
    pub definition: PartyQuestDefinition,
}

/// Findings for one definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub quest_id: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

fn check(errors: &mut Vec<String>, allowed: &[&str], value: &str, field: &str) {
    if !allowed.contains(&value) {
        errors.push(format!("{}: unknown value '{}'", field, value));
    }
}

fn check_rewards(errors: &mut Vec<String>, rewards: &[Reward], field: &str) {
    for (i, reward) in rewards.iter().enumerate() {
        let path = format!("{}[{}]", field, i);
        check(errors, REWARD_TYPES, &reward.kind, &format!("{}.type", path));
        if reward.kind == "random_item" && reward.items.is_empty() {
            errors.push(format!("{}: random_item reward has no items", path));
        }
    }
}

impl PartyQuestDefinition {
    /// Structural validation. Errors block persistence, warnings do not.
    pub fn validate(&self) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.quest_id.trim().is_empty() {
            errors.push("questId: must not be empty".to_string());
        }
        check(&mut errors, REGISTRATION_TYPES, &self.registration.kind, "registration.type");
        check(&mut errors, REGISTRATION_MODES, &self.registration.mode, "registration.mode");
        check(&mut errors, AFFINITIES, &self.registration.affinity, "registration.affinity");

        for (i, req) in self
            .start_requirements
            .iter()
            .chain(self.fail_requirements.iter())
            .enumerate()
        {
            check(
                &mut errors,
                REQUIREMENT_OPERATORS,
                &req.operator,
                &format!("requirements[{}].operator", i),
            );
        }

        if let Some(bonus) = &self.bonus {
            if bonus.map_id == 0 {
                errors.push("bonus.mapId: required when bonus is present".to_string());
            }
            check(&mut errors, BONUS_ENTRIES, &bonus.entry, "bonus.entry");
        }

        if !self.stages.is_empty() && self.exit == 0 {
            errors.push("exit: required when stages exist".to_string());
        }

        for (i, stage) in self.stages.iter().enumerate() {
            let path = format!("stages[{}]", i);
            if stage.index as usize != i {
                errors.push(format!(
                    "{}.index: expected {} but found {}",
                    path, i, stage.index
                ));
            }
            if stage.name.trim().is_empty() {
                warnings.push(format!("{}.name: missing", path));
            }
            check(&mut errors, STAGE_TYPES, &stage.kind, &format!("{}.type", path));
            check(&mut errors, WARP_TYPES, &stage.warp_type, &format!("{}.warpType", path));
            for (j, condition) in stage.clear_conditions.iter().enumerate() {
                let path = format!("{}.clearConditions[{}]", path, j);
                check(&mut errors, CLEAR_CONDITION_TYPES, &condition.kind, &format!("{}.type", path));
                check(&mut errors, CLEAR_OPERATORS, &condition.operator, &format!("{}.operator", path));
            }
            for (j, action) in stage.clear_actions.iter().enumerate() {
                check(
                    &mut errors,
                    CLEAR_ACTIONS,
                    action,
                    &format!("{}.clearActions[{}]", path, j),
                );
            }
            check_rewards(&mut errors, &stage.rewards, &format!("{}.rewards", path));
        }
        check_rewards(&mut errors, &self.rewards, "rewards");

        ValidationReport {
            quest_id: self.quest_id.clone(),
            errors,
            warnings,
        }
    }
}

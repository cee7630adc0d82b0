// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Map-action scripts.

use std::collections::BTreeMap;
use std::fmt;

use atlas_core::saga::action::ConditionInput;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// A number or a numeric string, as written in seed files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Text(String),
}

impl Scalar {
    pub fn parse<T: std::str::FromStr>(&self) -> Option<T> {
        match self {
            Self::Int(v) => v.to_string().parse().ok(),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: String,
    pub operator: String,
    pub value: Scalar,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<Scalar>,
}

impl Condition {
    /// Form sent to the character-state validator.
    pub fn to_input(&self) -> Result<ConditionInput> {
        let value = self.value.parse::<i32>().ok_or_else(|| {
            Error::Validation(format!("condition {}: value '{}' is not numeric", self.kind, self.value))
        })?;
        let reference_id = match &self.reference_id {
            Some(r) => Some(r.parse::<u32>().ok_or_else(|| {
                Error::Validation(format!(
                    "condition {}: referenceId '{}' is not numeric",
                    self.kind, r
                ))
            })?),
            None => None,
        };
        Ok(ConditionInput {
            kind: self.kind.clone(),
            operator: self.operator.clone(),
            value,
            reference_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub operations: Vec<Operation>,
}

/// Rules run when a character enters a map, keyed by
/// `(scriptName, scriptType)` within a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapActionScript {
    pub script_name: String,
    pub script_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl MapActionScript {
    pub fn validate(&self) -> Result<()> {
        if self.script_name.trim().is_empty() || self.script_type.trim().is_empty() {
            return Err(Error::Validation(
                "scriptName and scriptType are required".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredScript {
    pub id: Uuid,
    #[serde(flatten)]
    pub script: MapActionScript,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_condition_accepts_numbers_and_strings() {
        let c: Condition = serde_json::from_value(json!({
            "type": "item", "operator": ">=", "value": "3", "referenceId": 4001126
        }))
        .unwrap();
        let input = c.to_input().unwrap();
        assert_eq!(input.value, 3);
        assert_eq!(input.reference_id, Some(4001126));

        let c: Condition =
            serde_json::from_value(json!({"type": "level", "operator": ">", "value": "ten"})).unwrap();
        assert!(c.to_input().is_err());
    }
}

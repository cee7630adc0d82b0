// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Storage compartment model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inventory class of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceType {
    Equipable,
    Consumable,
    Setup,
    Etc,
    Cash,
}

impl ReferenceType {
    /// Whether assets of this class carry a quantity.
    pub fn is_stackable(self) -> bool {
        matches!(self, Self::Consumable | Self::Setup | Self::Etc)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equipable => "equipable",
            Self::Consumable => "consumable",
            Self::Setup => "setup",
            Self::Etc => "etc",
            Self::Cash => "cash",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "equipable" => Some(Self::Equipable),
            "consumable" => Some(Self::Consumable),
            "setup" => Some(Self::Setup),
            "etc" => Some(Self::Etc),
            "cash" => Some(Self::Cash),
            _ => None,
        }
    }
}

/// Stack side-data of a stackable asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stack {
    pub quantity: u32,
    #[serde(default)]
    pub owner_id: u32,
    #[serde(default)]
    pub flag: u16,
}

/// One item held in a compartment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: Uuid,
    pub slot: i16,
    pub template_id: u32,
    pub reference_type: ReferenceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
    /// Present for stackable reference types only.
    #[serde(flatten)]
    pub stack: Option<Stack>,
}

impl Asset {
    pub fn quantity(&self) -> u32 {
        self.stack.map(|s| s.quantity).unwrap_or(1)
    }
}

/// An account's storage in one world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Compartment {
    pub id: Uuid,
    pub world_id: u8,
    pub account_id: u32,
    pub capacity: u32,
    pub mesos: u32,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

impl Compartment {
    pub fn new(world_id: u8, account_id: u32, capacity: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            world_id,
            account_id,
            capacity,
            mesos: 0,
            assets: Vec::new(),
        }
    }

    pub fn asset(&self, id: Uuid) -> Option<&Asset> {
        self.assets.iter().find(|a| a.id == id)
    }
}

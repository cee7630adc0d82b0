// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Field addressing shared by the map-facing services.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One concrete copy of a map: world, channel, map, and instance.
///
/// The nil instance is the shared public copy of a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub world_id: u8,
    pub channel_id: u8,
    pub map_id: u32,
    #[serde(default)]
    pub instance: Uuid,
}

impl Field {
    pub fn new(world_id: u8, channel_id: u8, map_id: u32) -> Self {
        Self {
            world_id,
            channel_id,
            map_id,
            instance: Uuid::nil(),
        }
    }

    pub fn with_instance(mut self, instance: Uuid) -> Self {
        self.instance = instance;
        self
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.world_id, self.channel_id, self.map_id, self.instance
        )
    }
}

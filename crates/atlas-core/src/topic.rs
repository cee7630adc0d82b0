// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Topic environment variables.
//!
//! These are variable *names*, never topic names. Resolve them with
//! [`TopicResolver`](crate::bus::TopicResolver).

/// Saga submissions.
pub const COMMAND_TOPIC_SAGA: &str = "COMMAND_TOPIC_SAGA";
/// Generic per-step outcome events (completed / failed).
pub const EVENT_TOPIC_SAGA_STEP: &str = "EVENT_TOPIC_SAGA_STEP";
/// Saga terminal status events.
pub const EVENT_TOPIC_SAGA_STATUS: &str = "EVENT_TOPIC_SAGA_STATUS";

/// Asset creation, destruction, equipment and character-side transfers.
pub const COMMAND_TOPIC_COMPARTMENT: &str = "COMMAND_TOPIC_COMPARTMENT";
/// Character attributes and map changes.
pub const COMMAND_TOPIC_CHARACTER: &str = "COMMAND_TOPIC_CHARACTER";
/// Character state validation.
pub const COMMAND_TOPIC_VALIDATION: &str = "COMMAND_TOPIC_VALIDATION";
/// Skill create / update.
pub const COMMAND_TOPIC_SKILL: &str = "COMMAND_TOPIC_SKILL";
/// Quest start / complete.
pub const COMMAND_TOPIC_QUEST: &str = "COMMAND_TOPIC_QUEST";
/// Monster spawns.
pub const COMMAND_TOPIC_MONSTER: &str = "COMMAND_TOPIC_MONSTER";
/// Messages and client effects addressed to one character.
pub const COMMAND_TOPIC_SYSTEM_MESSAGE: &str = "COMMAND_TOPIC_SYSTEM_MESSAGE";
/// Map-wide effects.
pub const COMMAND_TOPIC_MAP: &str = "COMMAND_TOPIC_MAP";
/// Account storage.
pub const COMMAND_TOPIC_STORAGE: &str = "COMMAND_TOPIC_STORAGE";
/// Cash shop inventory.
pub const COMMAND_TOPIC_CASH_SHOP: &str = "COMMAND_TOPIC_CASH_SHOP";
/// Instance transports.
pub const COMMAND_TOPIC_TRANSPORT: &str = "COMMAND_TOPIC_TRANSPORT";
/// Party quest lifecycle.
pub const COMMAND_TOPIC_PARTY_QUEST: &str = "COMMAND_TOPIC_PARTY_QUEST";
/// Channel liveness reports.
pub const COMMAND_TOPIC_CHANNEL_STATUS: &str = "COMMAND_TOPIC_CHANNEL_STATUS";
/// Map-action script execution requests.
pub const COMMAND_TOPIC_MAP_ACTIONS: &str = "COMMAND_TOPIC_MAP_ACTIONS";

/// Transport lifecycle events.
pub const EVENT_TOPIC_TRANSPORT_STATUS: &str = "EVENT_TOPIC_TRANSPORT_STATUS";
/// Skill status events.
pub const EVENT_TOPIC_SKILL_STATUS: &str = "EVENT_TOPIC_SKILL_STATUS";
/// Storage status events.
pub const EVENT_TOPIC_STORAGE_STATUS: &str = "EVENT_TOPIC_STORAGE_STATUS";
/// Channel status events.
pub const EVENT_TOPIC_CHANNEL_STATUS: &str = "EVENT_TOPIC_CHANNEL_STATUS";
/// Character status events (login, logout, map changed).
pub const EVENT_TOPIC_CHARACTER_STATUS: &str = "EVENT_TOPIC_CHARACTER_STATUS";

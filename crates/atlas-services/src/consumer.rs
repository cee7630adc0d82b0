// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bus message routing for atlas-services.
//!
//! | Topic | Types | Effect |
//! |-------|-------|--------|
//! | `EVENT_TOPIC_CHANNEL_STATUS` | `STARTED`, `SHUTDOWN` | channel registry refresh / removal |
//! | `EVENT_TOPIC_CHARACTER_STATUS` | `LOGIN`, `LOGOUT`, `MAP_CHANGED` | transport cancel / return, monster spawning |
//! | `COMMAND_TOPIC_TRANSPORT` | `START` | saga-driven transport start |
//! | `COMMAND_TOPIC_MAP_ACTIONS` | any | map-action script execution |
//! | `COMMAND_TOPIC_SKILL` | `SET_COOLDOWN` | skill cooldown |
//! | `COMMAND_TOPIC_STORAGE` | `ARRANGE` | storage merge-and-sort |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use atlas_core::bus::{Envelope, Message, TopicResolver};
use atlas_core::listener::MessageHandler;
use atlas_core::tenant::Tenant;
use atlas_core::topic;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::channel::{ChannelRegistry, ChannelStatusBody};
use crate::error::{Error, Result};
use crate::field::Field;
use crate::map_actions::processor::{MapActionCommand, MapActionProcessor};
use crate::skills::SkillCooldowns;
use crate::spawn::SpawnPlanner;
use crate::storage::service::{COMMAND_ARRANGE, StorageService};
use crate::transport::processor::{COMMAND_START, StartTransportCommand, TransportProcessor};

pub const STATUS_LOGIN: &str = "LOGIN";
pub const STATUS_LOGOUT: &str = "LOGOUT";
pub const STATUS_MAP_CHANGED: &str = "MAP_CHANGED";
pub const COMMAND_SET_COOLDOWN: &str = "SET_COOLDOWN";

/// Body of character status events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterStatusBody {
    #[serde(default)]
    pub channel_id: u8,
    #[serde(default)]
    pub map_id: u32,
    #[serde(default)]
    pub instance: Uuid,
    /// Field left, on `MAP_CHANGED`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_map_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_instance: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCooldownBody {
    pub skill_id: u32,
    /// Seconds.
    pub cooldown: u64,
}

/// Topics the services process consumes.
pub fn subscriptions(topics: &TopicResolver) -> Vec<String> {
    [
        topic::EVENT_TOPIC_CHANNEL_STATUS,
        topic::EVENT_TOPIC_CHARACTER_STATUS,
        topic::COMMAND_TOPIC_TRANSPORT,
        topic::COMMAND_TOPIC_MAP_ACTIONS,
        topic::COMMAND_TOPIC_SKILL,
        topic::COMMAND_TOPIC_STORAGE,
    ]
    .into_iter()
    .map(|t| topics.resolve(t))
    .collect()
}

/// Routes consumed messages to the owning component.
pub struct ServicesHandler {
    pub channels: Arc<ChannelRegistry>,
    pub transport: Arc<TransportProcessor>,
    pub spawner: Arc<SpawnPlanner>,
    pub map_actions: Arc<MapActionProcessor>,
    pub skills: Arc<SkillCooldowns>,
    pub storage: Arc<StorageService>,
    pub topics: TopicResolver,
}

fn character_of<B>(envelope: &Envelope<B>) -> Result<u32> {
    envelope
        .character_id
        .ok_or_else(|| Error::Validation(format!("{} without a character", envelope.kind)))
}

impl ServicesHandler {
    /// Handle one message, in services error terms.
    pub async fn route(&self, message: &Message) -> Result<()> {
        let is = |variable: &str| message.topic == self.topics.resolve(variable);

        if is(topic::EVENT_TOPIC_CHANNEL_STATUS) {
            let tenant = message.tenant()?;
            self.channels.handle_status(&tenant, message.envelope::<ChannelStatusBody>()?)?;
        } else if is(topic::EVENT_TOPIC_CHARACTER_STATUS) {
            let tenant = message.tenant()?;
            self.character_status(&tenant, message.envelope()?).await?;
        } else if is(topic::COMMAND_TOPIC_TRANSPORT) {
            if message.kind() != Some(COMMAND_START) {
                debug!(kind = ?message.kind(), "Ignoring transport command");
                return Ok(());
            }
            let tenant = message.tenant()?;
            let envelope: Envelope<StartTransportCommand> = message.envelope()?;
            self.transport.handle_start_command(&tenant, envelope).await?;
        } else if is(topic::COMMAND_TOPIC_MAP_ACTIONS) {
            let tenant = message.tenant()?;
            let envelope: Envelope<MapActionCommand> = message.envelope()?;
            self.map_actions.handle_command(&tenant, envelope.body).await?;
        } else if is(topic::COMMAND_TOPIC_SKILL) {
            if message.kind() != Some(COMMAND_SET_COOLDOWN) {
                debug!(kind = ?message.kind(), "Ignoring skill command");
                return Ok(());
            }
            let tenant = message.tenant()?;
            let envelope: Envelope<SetCooldownBody> = message.envelope()?;
            let character_id = character_of(&envelope)?;
            self.skills
                .apply(
                    &tenant,
                    envelope.world_id,
                    character_id,
                    envelope.body.skill_id,
                    Duration::from_secs(envelope.body.cooldown),
                )
                .await?;
        } else if is(topic::COMMAND_TOPIC_STORAGE) {
            if message.kind() != Some(COMMAND_ARRANGE) {
                debug!(kind = ?message.kind(), "Ignoring storage command");
                return Ok(());
            }
            let tenant = message.tenant()?;
            let envelope: Envelope<serde_json::Value> = message.envelope()?;
            let account_id = envelope
                .account_id
                .ok_or_else(|| Error::Validation("ARRANGE without an account".to_string()))?;
            self.storage.arrange(&tenant, envelope.world_id, account_id).await?;
        } else {
            debug!(topic = %message.topic, "Ignoring message on unrelated topic");
        }
        Ok(())
    }

    async fn character_status(&self, tenant: &Tenant, envelope: Envelope<CharacterStatusBody>) -> Result<()> {
        let character_id = character_of(&envelope)?;
        let body = &envelope.body;
        let field = Field::new(envelope.world_id, body.channel_id, body.map_id).with_instance(body.instance);

        match envelope.kind.as_str() {
            STATUS_LOGIN => {
                self.transport.handle_login(tenant, character_id, field).await?;
                self.spawn(tenant, &field).await;
            }
            STATUS_LOGOUT => {
                self.transport.handle_logout(tenant, character_id).await?;
                self.skills.clear_all(tenant, character_id).await?;
            }
            STATUS_MAP_CHANGED => {
                if let Some(old_map_id) = body.old_map_id {
                    let left = Field::new(envelope.world_id, body.channel_id, old_map_id)
                        .with_instance(body.old_instance.unwrap_or_default());
                    self.transport.handle_map_exit(tenant, character_id, left).await?;
                }
                self.spawn(tenant, &field).await;
            }
            other => debug!(kind = other, "Ignoring character status"),
        }
        Ok(())
    }

    // Spawning is best-effort: a failed plan never fails the status event.
    async fn spawn(&self, tenant: &Tenant, field: &Field) {
        if let Err(e) = self.spawner.spawn_for_field(tenant, field).await {
            warn!(tenant_id = %tenant.id, field = %field, error = %e, "Monster spawn failed");
        }
    }
}

#[async_trait]
impl MessageHandler for ServicesHandler {
    async fn handle(&self, message: &Message) -> atlas_core::error::Result<()> {
        Ok(self.route(message).await?)
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Skill cooldowns.
//!
//! Thin layer over the `skill` cooldown namespace that publishes skill status
//! events: `COOLDOWN_APPLIED` when a cooldown starts and `COOLDOWN_EXPIRED`
//! for every entry the sweep removes.

use std::sync::Arc;
use std::time::Duration;

use atlas_core::bus::{Envelope, MessageBuffer, Producer, TopicResolver};
use atlas_core::clock::Clock;
use atlas_core::tenant::Tenant;
use atlas_core::topic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::cooldown::{CooldownRegistry, KvStore};
use crate::error::Result;

/// Cooldown namespace for skills.
pub const NAMESPACE: &str = "skill";

pub const STATUS_COOLDOWN_APPLIED: &str = "COOLDOWN_APPLIED";
pub const STATUS_COOLDOWN_EXPIRED: &str = "COOLDOWN_EXPIRED";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CooldownAppliedBody {
    pub skill_id: u32,
    pub cooldown_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CooldownExpiredBody {
    pub character_id: u32,
    pub skill_id: u32,
}

/// Per-character skill cooldowns.
pub struct SkillCooldowns {
    registry: CooldownRegistry,
    producer: Arc<dyn Producer>,
    topics: TopicResolver,
}

impl SkillCooldowns {
    pub fn new(
        kv: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        producer: Arc<dyn Producer>,
        topics: TopicResolver,
    ) -> Self {
        Self {
            registry: CooldownRegistry::new(kv, NAMESPACE, clock),
            producer,
            topics,
        }
    }

    /// Start a cooldown and announce it.
    #[instrument(skip(self), fields(tenant_id = %tenant.id))]
    pub async fn apply(
        &self,
        tenant: &Tenant,
        world_id: u8,
        character_id: u32,
        skill_id: u32,
        duration: Duration,
    ) -> Result<DateTime<Utc>> {
        let expires_at = self
            .registry
            .apply(tenant, character_id, skill_id, duration)
            .await?;

        let mut buffer = MessageBuffer::new(tenant);
        buffer.put(
            self.topics.resolve(topic::EVENT_TOPIC_SKILL_STATUS),
            &Envelope::for_character(
                world_id,
                character_id,
                STATUS_COOLDOWN_APPLIED,
                CooldownAppliedBody {
                    skill_id,
                    cooldown_expires_at: expires_at,
                },
            ),
        )?;
        buffer.flush(self.producer.as_ref()).await?;
        Ok(expires_at)
    }

    /// Expiry of an active cooldown.
    pub async fn get(
        &self,
        tenant: &Tenant,
        character_id: u32,
        skill_id: u32,
    ) -> Result<Option<DateTime<Utc>>> {
        self.registry.get(tenant, character_id, skill_id).await
    }

    /// Drop every cooldown a character holds, e.g. on logout.
    pub async fn clear_all(&self, tenant: &Tenant, character_id: u32) -> Result<usize> {
        self.registry.clear_all(tenant, character_id).await
    }

    /// Remove expired cooldowns and publish one expiry event per removal.
    pub async fn sweep(&self) -> Result<usize> {
        let expired = self.registry.expire_sweep().await?;
        let count = expired.len();

        for entry in expired {
            let (Ok(character_id), Ok(skill_id)) =
                (entry.subject.parse::<u32>(), entry.item.parse::<u32>())
            else {
                warn!(subject = %entry.subject, item = %entry.item, "Expired cooldown with non-numeric key");
                continue;
            };

            let mut buffer = MessageBuffer::new(&entry.tenant);
            buffer.put(
                self.topics.resolve(topic::EVENT_TOPIC_SKILL_STATUS),
                &Envelope::for_character(
                    0,
                    character_id,
                    STATUS_COOLDOWN_EXPIRED,
                    CooldownExpiredBody {
                        character_id,
                        skill_id,
                    },
                ),
            )?;
            buffer.flush(self.producer.as_ref()).await?;
            info!(
                tenant_id = %entry.tenant.id,
                character_id,
                skill_id,
                "Skill cooldown expired"
            );
        }

        Ok(count)
    }
}

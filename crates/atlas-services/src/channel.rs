// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Channel liveness registry.
//!
//! Channel servers announce themselves with `STARTED` status events and keep
//! re-announcing while alive. An entry not refreshed for [`STALE_AFTER`] is
//! dropped by the next sweep; a `SHUTDOWN` event drops it immediately.

use std::sync::Arc;

use atlas_core::bus::{Envelope, MessageBuffer, Producer, TopicResolver};
use atlas_core::clock::Clock;
use atlas_core::registry::TenantRegistry;
use atlas_core::tenant::Tenant;
use atlas_core::topic;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// How long a registration stays live without a refresh.
pub const STALE_AFTER: Duration = Duration::seconds(15);

pub const STATUS_STARTED: &str = "STARTED";
pub const STATUS_SHUTDOWN: &str = "SHUTDOWN";
pub const COMMAND_STATUS_REQUEST: &str = "STATUS_REQUEST";

/// What a channel server reports about itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRegistration {
    pub channel_id: u8,
    pub ip_address: String,
    pub port: u32,
    #[serde(default)]
    pub current_capacity: u32,
    pub max_capacity: u32,
}

impl ChannelRegistration {
    pub fn validate(&self) -> Result<()> {
        if self.ip_address.trim().is_empty() {
            return Err(Error::Validation("ipAddress must not be empty".to_string()));
        }
        if !(1..=65535).contains(&self.port) {
            return Err(Error::Validation(format!(
                "port {} is outside 1..=65535",
                self.port
            )));
        }
        if self.max_capacity == 0 {
            return Err(Error::Validation("maxCapacity must be positive".to_string()));
        }
        Ok(())
    }
}

/// A live channel server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelServer {
    pub world_id: u8,
    pub channel_id: u8,
    pub ip_address: String,
    pub port: u16,
    pub current_capacity: u32,
    pub max_capacity: u32,
    pub created_at: DateTime<Utc>,
}

/// Body of channel status events and commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStatusBody {
    #[serde(default)]
    pub channel_id: u8,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub port: u32,
    #[serde(default)]
    pub current_capacity: u32,
    #[serde(default)]
    pub max_capacity: u32,
}

impl From<ChannelRegistration> for ChannelStatusBody {
    fn from(r: ChannelRegistration) -> Self {
        Self {
            channel_id: r.channel_id,
            ip_address: r.ip_address,
            port: r.port,
            current_capacity: r.current_capacity,
            max_capacity: r.max_capacity,
        }
    }
}

fn world_envelope<B>(world_id: u8, kind: &str, body: B) -> Envelope<B> {
    Envelope {
        transaction_id: None,
        world_id,
        character_id: None,
        account_id: None,
        kind: kind.to_string(),
        body,
    }
}

/// Process-wide channel registry.
pub struct ChannelRegistry {
    channels: TenantRegistry<(u8, u8), ChannelServer>,
    producer: Arc<dyn Producer>,
    topics: TopicResolver,
    clock: Arc<dyn Clock>,
}

impl ChannelRegistry {
    pub fn new(producer: Arc<dyn Producer>, topics: TopicResolver, clock: Arc<dyn Clock>) -> Self {
        Self {
            channels: TenantRegistry::new(),
            producer,
            topics,
            clock,
        }
    }

    /// Register or refresh a channel.
    pub fn register(
        &self,
        tenant: &Tenant,
        world_id: u8,
        registration: ChannelRegistration,
    ) -> Result<ChannelServer> {
        registration.validate()?;
        let server = ChannelServer {
            world_id,
            channel_id: registration.channel_id,
            ip_address: registration.ip_address,
            port: registration.port as u16,
            current_capacity: registration.current_capacity,
            max_capacity: registration.max_capacity,
            created_at: self.clock.now(),
        };
        self.channels
            .put(tenant, (world_id, server.channel_id), server.clone());
        debug!(tenant_id = %tenant.id, world_id, channel_id = server.channel_id, "Channel registered");
        Ok(server)
    }

    /// Drop a channel. Returns whether it was registered.
    pub fn unregister(&self, tenant: &Tenant, world_id: u8, channel_id: u8) -> bool {
        let removed = self
            .channels
            .remove(tenant, &(world_id, channel_id))
            .is_some();
        if removed {
            info!(tenant_id = %tenant.id, world_id, channel_id, "Channel unregistered");
        }
        removed
    }

    pub fn get(&self, tenant: &Tenant, world_id: u8, channel_id: u8) -> Option<ChannelServer> {
        self.channels.get(tenant, &(world_id, channel_id))
    }

    /// Channels of a world ordered by channel id.
    pub fn list(&self, tenant: &Tenant, world_id: u8) -> Vec<ChannelServer> {
        let mut servers: Vec<_> = self
            .channels
            .values(tenant)
            .into_iter()
            .filter(|s| s.world_id == world_id)
            .collect();
        servers.sort_by_key(|s| s.channel_id);
        servers
    }

    /// Announce a channel start on the bus. Registration happens when the
    /// event is consumed.
    pub async fn emit_started(
        &self,
        tenant: &Tenant,
        world_id: u8,
        registration: ChannelRegistration,
    ) -> Result<()> {
        registration.validate()?;
        let mut buffer = MessageBuffer::new(tenant);
        buffer.put(
            self.topics.resolve(topic::EVENT_TOPIC_CHANNEL_STATUS),
            &world_envelope(
                world_id,
                STATUS_STARTED,
                ChannelStatusBody::from(registration),
            ),
        )?;
        buffer.flush(self.producer.as_ref()).await?;
        Ok(())
    }

    /// Ask every channel server to report its status.
    pub async fn request_status(&self, tenant: &Tenant) -> Result<()> {
        let mut buffer = MessageBuffer::new(tenant);
        buffer.put(
            self.topics.resolve(topic::COMMAND_TOPIC_CHANNEL_STATUS),
            &world_envelope(0, COMMAND_STATUS_REQUEST, serde_json::json!({})),
        )?;
        buffer.flush(self.producer.as_ref()).await?;
        Ok(())
    }

    /// Apply a channel status event.
    pub fn handle_status(&self, tenant: &Tenant, envelope: Envelope<ChannelStatusBody>) -> Result<()> {
        let body = envelope.body;
        match envelope.kind.as_str() {
            STATUS_STARTED => {
                self.register(
                    tenant,
                    envelope.world_id,
                    ChannelRegistration {
                        channel_id: body.channel_id,
                        ip_address: body.ip_address,
                        port: body.port,
                        current_capacity: body.current_capacity,
                        max_capacity: body.max_capacity,
                    },
                )?;
            }
            STATUS_SHUTDOWN => {
                self.unregister(tenant, envelope.world_id, body.channel_id);
            }
            other => warn!(kind = other, "Ignoring unknown channel status"),
        }
        Ok(())
    }

    /// Drop every channel not refreshed within [`STALE_AFTER`].
    pub fn sweep_stale(&self) -> Vec<(Tenant, ChannelServer)> {
        let cutoff = self.clock.now() - STALE_AFTER;
        let mut removed = Vec::new();

        self.channels.for_each_tenant(|tenant| {
            let stale = self.channels.write(tenant, |channels| {
                let keys: Vec<_> = channels
                    .iter()
                    .filter(|(_, s)| s.created_at < cutoff)
                    .map(|(k, _)| *k)
                    .collect();
                keys.into_iter()
                    .filter_map(|k| channels.remove(&k))
                    .collect::<Vec<_>>()
            });
            for server in stale {
                warn!(
                    tenant_id = %tenant.id,
                    world_id = server.world_id,
                    channel_id = server.channel_id,
                    "Removing stale channel"
                );
                removed.push((tenant.clone(), server));
            }
        });

        removed
    }

    /// Drop every registration. Intended for tests.
    pub fn reset(&self) {
        self.channels.reset();
    }
}

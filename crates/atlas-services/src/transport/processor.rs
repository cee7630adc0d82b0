// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Transport lifecycle: boarding, departure, arrival, and recovery.

use std::sync::Arc;

use atlas_core::bus::{Envelope, MessageBuffer, Producer, TopicResolver};
use atlas_core::clock::Clock;
use atlas_core::saga::StepOutcome;
use atlas_core::tenant::Tenant;
use atlas_core::topic;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::instance::{CharacterEntry, InstanceRegistry, InstanceState, TransportInstance};
use super::route::{RouteRegistry, TransportRoute};
use crate::error::{Error, Result};
use crate::field::Field;

pub const STATUS_STARTED: &str = "STARTED";
pub const STATUS_COMPLETED: &str = "COMPLETED";
pub const STATUS_CANCELLED: &str = "CANCELLED";
pub const COMMAND_START: &str = "START";
pub const COMMAND_CHANGE_MAP: &str = "CHANGE_MAP";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelReason {
    MapExit,
    Logout,
    Stuck,
}

/// Body of transport status events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportStatusBody {
    pub route_id: Uuid,
    pub instance_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<CancelReason>,
}

/// Character map change command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeMapBody {
    pub world_id: u8,
    pub character_id: u32,
    pub channel_id: u8,
    pub map_id: u32,
    pub instance: Uuid,
    pub portal_id: u32,
}

/// `START` command issued by the saga runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTransportCommand {
    pub character_id: u32,
    pub world_id: u8,
    pub channel_id: u8,
    pub route_name: String,
    #[serde(default)]
    pub step_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteState {
    Idle,
    Boarding,
    InTransit,
}

/// Live view of one route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStatus {
    pub route: TransportRoute,
    pub state: RouteState,
    pub instances: Vec<TransportInstance>,
}

/// Drives transport instances for every tenant.
pub struct TransportProcessor {
    routes: Arc<RouteRegistry>,
    instances: Arc<InstanceRegistry>,
    producer: Arc<dyn Producer>,
    topics: TopicResolver,
    clock: Arc<dyn Clock>,
}

impl TransportProcessor {
    pub fn new(
        routes: Arc<RouteRegistry>,
        instances: Arc<InstanceRegistry>,
        producer: Arc<dyn Producer>,
        topics: TopicResolver,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            routes,
            instances,
            producer,
            topics,
            clock,
        }
    }

    pub fn routes(&self) -> &RouteRegistry {
        &self.routes
    }

    pub fn instances(&self) -> &InstanceRegistry {
        &self.instances
    }

    fn warp(
        &self,
        buffer: &mut MessageBuffer,
        character: &CharacterEntry,
        map_id: u32,
        instance: Uuid,
    ) -> Result<()> {
        buffer.put(
            self.topics.resolve(topic::COMMAND_TOPIC_CHARACTER),
            &Envelope::for_character(
                character.world_id,
                character.character_id,
                COMMAND_CHANGE_MAP,
                ChangeMapBody {
                    world_id: character.world_id,
                    character_id: character.character_id,
                    channel_id: character.channel_id,
                    map_id,
                    instance,
                    portal_id: 0,
                },
            ),
        )?;
        Ok(())
    }

    fn status(
        &self,
        buffer: &mut MessageBuffer,
        character: &CharacterEntry,
        kind: &str,
        instance: &TransportInstance,
        reason: Option<CancelReason>,
    ) -> Result<()> {
        buffer.put(
            self.topics.resolve(topic::EVENT_TOPIC_TRANSPORT_STATUS),
            &Envelope::for_character(
                character.world_id,
                character.character_id,
                kind,
                TransportStatusBody {
                    route_id: instance.route_id,
                    instance_id: instance.id,
                    reason,
                },
            ),
        )?;
        Ok(())
    }

    /// Board a character onto a route and send it to the transit map.
    #[instrument(skip(self), fields(tenant_id = %tenant.id))]
    pub async fn start_transport(
        &self,
        tenant: &Tenant,
        character_id: u32,
        route_id: Uuid,
        field: Field,
    ) -> Result<TransportInstance> {
        if self.instances.is_in_transport(tenant, character_id) {
            return Err(Error::AlreadyInTransport(character_id));
        }
        let route = self
            .routes
            .get(tenant, route_id)
            .ok_or_else(|| Error::RouteNotFound(route_id.to_string()))?;

        let entry = CharacterEntry {
            character_id,
            world_id: field.world_id,
            channel_id: field.channel_id,
        };
        let instance = self
            .instances
            .board(tenant, &route, entry, self.clock.now())?;

        let mut buffer = MessageBuffer::new(tenant);
        self.warp(&mut buffer, &entry, route.transit_map_id(), instance.id)?;
        self.status(&mut buffer, &entry, STATUS_STARTED, &instance, None)?;
        if let Err(e) = buffer.flush(self.producer.as_ref()).await {
            self.instances.remove_character(tenant, character_id);
            return Err(e.into());
        }

        info!(
            instance_id = %instance.id,
            route = %route.name,
            passengers = instance.characters.len(),
            "Character boarded transport"
        );
        Ok(instance)
    }

    /// A character left a map. Only leaving the map instance it is riding in
    /// cancels the transport.
    pub async fn handle_map_exit(
        &self,
        tenant: &Tenant,
        character_id: u32,
        field: Field,
    ) -> Result<bool> {
        match self.instances.instance_for(tenant, character_id) {
            Some(instance) if instance.id == field.instance => {}
            _ => {
                debug!(character_id, field = %field, "Map exit does not concern a transport");
                return Ok(false);
            }
        }
        self.cancel(tenant, character_id, CancelReason::MapExit).await
    }

    pub async fn handle_logout(&self, tenant: &Tenant, character_id: u32) -> Result<bool> {
        self.cancel(tenant, character_id, CancelReason::Logout).await
    }

    async fn cancel(&self, tenant: &Tenant, character_id: u32, reason: CancelReason) -> Result<bool> {
        let Some(departure) = self.instances.remove_character(tenant, character_id) else {
            return Ok(false);
        };

        let mut buffer = MessageBuffer::new(tenant);
        self.status(
            &mut buffer,
            &departure.character,
            STATUS_CANCELLED,
            &departure.instance,
            Some(reason),
        )?;
        buffer.flush(self.producer.as_ref()).await?;

        info!(
            tenant_id = %tenant.id,
            character_id,
            instance_id = %departure.instance.id,
            reason = ?reason,
            released = departure.released,
            "Transport cancelled"
        );
        Ok(true)
    }

    /// A character logged in. A saved position on a transit map means the
    /// ride was lost, so the character goes back to the route's start.
    pub async fn handle_login(&self, tenant: &Tenant, character_id: u32, field: Field) -> Result<bool> {
        let Some(route) = self.routes.by_transit_map(tenant, field.map_id) else {
            return Ok(false);
        };

        let entry = CharacterEntry {
            character_id,
            world_id: field.world_id,
            channel_id: field.channel_id,
        };
        let mut buffer = MessageBuffer::new(tenant);
        self.warp(&mut buffer, &entry, route.start_map_id, Uuid::nil())?;
        buffer.flush(self.producer.as_ref()).await?;

        info!(
            tenant_id = %tenant.id,
            character_id,
            route = %route.name,
            "Returned character from transit map to route start"
        );
        Ok(true)
    }

    /// Close boarding on instances whose window elapsed. Emits nothing.
    pub fn tick_boarding(&self, tenant: &Tenant) -> usize {
        let closed = self.instances.close_boarding(tenant, self.clock.now());
        for id in &closed {
            debug!(tenant_id = %tenant.id, instance_id = %id, "Transport departed");
        }
        closed.len()
    }

    /// Deliver arrived instances: warp each passenger to the destination,
    /// then report completion. Instances go back to the registry when the
    /// messages cannot be published, so the next tick retries them.
    pub async fn tick_arrival(&self, tenant: &Tenant) -> Result<usize> {
        let arrived = self.instances.take_arrived(tenant, self.clock.now());
        if arrived.is_empty() {
            return Ok(0);
        }

        let result = self.publish_arrivals(tenant, &arrived).await;
        self.settle(tenant, arrived, result, "arrival")
    }

    async fn publish_arrivals(&self, tenant: &Tenant, arrived: &[TransportInstance]) -> Result<()> {
        let mut buffer = MessageBuffer::new(tenant);
        for instance in arrived {
            let Some(route) = self.routes.get(tenant, instance.route_id) else {
                warn!(instance_id = %instance.id, route_id = %instance.route_id, "Arrived instance has no route, releasing");
                continue;
            };
            for character in &instance.characters {
                self.warp(&mut buffer, character, route.destination_map_id, Uuid::nil())?;
                self.status(&mut buffer, character, STATUS_COMPLETED, instance, None)?;
            }
        }
        buffer.flush(self.producer.as_ref()).await?;
        for instance in arrived {
            info!(
                tenant_id = %tenant.id,
                instance_id = %instance.id,
                passengers = instance.characters.len(),
                "Transport arrived"
            );
        }
        Ok(())
    }

    /// Force-cancel instances that outlived their route.
    pub async fn tick_stuck(&self, tenant: &Tenant) -> Result<usize> {
        let stuck = self
            .instances
            .take_stuck(tenant, self.clock.now(), |route_id| {
                self.routes.get(tenant, route_id).map(|r| r.max_lifetime())
            });
        if stuck.is_empty() {
            return Ok(0);
        }

        let result = self.publish_stuck(tenant, &stuck).await;
        self.settle(tenant, stuck, result, "stuck release")
    }

    async fn publish_stuck(&self, tenant: &Tenant, stuck: &[TransportInstance]) -> Result<()> {
        let mut buffer = MessageBuffer::new(tenant);
        for instance in stuck {
            let Some(route) = self.routes.get(tenant, instance.route_id) else {
                continue;
            };
            for character in &instance.characters {
                self.warp(&mut buffer, character, route.start_map_id, Uuid::nil())?;
                self.status(
                    &mut buffer,
                    character,
                    STATUS_CANCELLED,
                    instance,
                    Some(CancelReason::Stuck),
                )?;
            }
        }
        buffer.flush(self.producer.as_ref()).await?;
        for instance in stuck {
            warn!(
                tenant_id = %tenant.id,
                instance_id = %instance.id,
                state = ?instance.state,
                "Released stuck transport"
            );
        }
        Ok(())
    }

    // A failed publish hands the taken instances back to the registry.
    fn settle(
        &self,
        tenant: &Tenant,
        taken: Vec<TransportInstance>,
        result: Result<()>,
        what: &str,
    ) -> Result<usize> {
        match result {
            Ok(()) => Ok(taken.len()),
            Err(e) => {
                let restored = self.instances.restore(tenant, taken);
                error!(
                    tenant_id = %tenant.id,
                    restored,
                    error = %e,
                    "Transport {} not published, instances restored",
                    what
                );
                Err(e)
            }
        }
    }

    /// One scheduler pass over a tenant.
    pub async fn tick(&self, tenant: &Tenant) -> Result<()> {
        self.tick_boarding(tenant);
        self.tick_arrival(tenant).await?;
        self.tick_stuck(tenant).await?;
        Ok(())
    }

    /// Return every held character to its route's start and release all
    /// instances. Emits no status events.
    pub async fn graceful_shutdown(&self, tenant: &Tenant) -> Result<usize> {
        let instances = self.instances.take_all(tenant);
        let mut buffer = MessageBuffer::new(tenant);
        let mut warped = 0;
        for instance in &instances {
            let Some(route) = self.routes.get(tenant, instance.route_id) else {
                continue;
            };
            for character in &instance.characters {
                self.warp(&mut buffer, character, route.start_map_id, Uuid::nil())?;
                warped += 1;
            }
        }
        buffer.flush(self.producer.as_ref()).await?;
        if warped > 0 {
            info!(tenant_id = %tenant.id, warped, "Returned transport passengers on shutdown");
        }
        Ok(warped)
    }

    /// Tenants with live transport state.
    pub fn tenants(&self) -> Vec<Tenant> {
        self.instances.tenants()
    }

    pub fn route_status(&self, tenant: &Tenant, route_id: Uuid) -> Result<RouteStatus> {
        let route = self
            .routes
            .get(tenant, route_id)
            .ok_or_else(|| Error::RouteNotFound(route_id.to_string()))?;
        let instances = self.instances.for_route(tenant, route_id);
        let state = if instances.is_empty() {
            RouteState::Idle
        } else if instances.iter().any(|i| i.state == InstanceState::Boarding) {
            RouteState::Boarding
        } else {
            RouteState::InTransit
        };
        Ok(RouteStatus {
            route,
            state,
            instances,
        })
    }

    /// Execute a saga `START` command and report the step outcome.
    pub async fn handle_start_command(
        &self,
        tenant: &Tenant,
        envelope: Envelope<StartTransportCommand>,
    ) -> Result<()> {
        let command = envelope.body;
        let result = match self.routes.by_name(tenant, &command.route_name) {
            Some(route) => self
                .start_transport(
                    tenant,
                    command.character_id,
                    route.id,
                    Field::new(command.world_id, command.channel_id, route.start_map_id),
                )
                .await
                .map(|_| ()),
            None => Err(Error::RouteNotFound(command.route_name.clone())),
        };

        let Some(transaction_id) = envelope.transaction_id else {
            return result;
        };
        let outcome = StepOutcome {
            transaction_id,
            step_id: command.step_id.clone(),
            succeeded: result.is_ok(),
            error: result.as_ref().err().map(|e| e.to_string()),
            result: None,
        };
        if let Err(e) = &result {
            warn!(
                transaction_id = %transaction_id,
                character_id = command.character_id,
                error = %e,
                "Transport start failed"
            );
        }

        let mut buffer = MessageBuffer::new(tenant);
        buffer.put(
            self.topics.resolve(topic::EVENT_TOPIC_SAGA_STEP),
            &outcome.into_envelope(command.world_id, command.character_id),
        )?;
        buffer.flush(self.producer.as_ref()).await?;
        Ok(())
    }
}

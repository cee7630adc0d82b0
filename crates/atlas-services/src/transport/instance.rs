// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Transport instances and the character back-index.
//!
//! Both indices of a tenant live in one slot of a [`TenantRegistry`], so
//! every mutation updates the instance's character list and the
//! `character -> instance` map inside the same critical section. A character
//! is in the back-index iff it appears in exactly one instance.

use std::collections::HashMap;

use atlas_core::registry::TenantRegistry;
use atlas_core::tenant::Tenant;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::route::TransportRoute;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Boarding,
    InTransit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterEntry {
    pub character_id: u32,
    pub world_id: u8,
    pub channel_id: u8,
}

/// One boarding of a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportInstance {
    pub id: Uuid,
    pub route_id: Uuid,
    pub characters: Vec<CharacterEntry>,
    pub state: InstanceState,
    pub boarding_until: DateTime<Utc>,
    pub arrival_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TransportInstance {
    fn new(route: &TransportRoute, now: DateTime<Utc>) -> Self {
        let boarding_until = now + to_chrono(route.boarding_window);
        Self {
            id: Uuid::new_v4(),
            route_id: route.id,
            characters: Vec::new(),
            state: InstanceState::Boarding,
            boarding_until,
            arrival_at: boarding_until + to_chrono(route.travel_duration),
            created_at: now,
        }
    }

    fn accepts(&self, route: &TransportRoute, now: DateTime<Utc>) -> bool {
        self.route_id == route.id
            && self.state == InstanceState::Boarding
            && (self.characters.len() as u32) < route.capacity
            && now < self.boarding_until
    }
}

pub(crate) fn to_chrono(d: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

/// Result of removing a character.
#[derive(Debug, Clone, PartialEq)]
pub struct Departure {
    pub instance: TransportInstance,
    pub character: CharacterEntry,
    /// The instance became empty and was released.
    pub released: bool,
}

#[derive(Debug, Clone, Default)]
struct Instances {
    by_id: HashMap<Uuid, TransportInstance>,
    by_character: HashMap<u32, Uuid>,
}

impl Instances {
    fn release(&mut self, id: Uuid) -> Option<TransportInstance> {
        let instance = self.by_id.remove(&id)?;
        for c in &instance.characters {
            if self.by_character.get(&c.character_id) == Some(&id) {
                self.by_character.remove(&c.character_id);
            }
        }
        Some(instance)
    }

    fn take_where(&mut self, pred: impl Fn(&TransportInstance) -> bool) -> Vec<TransportInstance> {
        let ids: Vec<Uuid> = self
            .by_id
            .values()
            .filter(|i| pred(i))
            .map(|i| i.id)
            .collect();
        ids.into_iter().filter_map(|id| self.release(id)).collect()
    }
}

/// Live transport instances of every tenant.
#[derive(Default)]
pub struct InstanceRegistry {
    // One slot per tenant keeps both indices under the tenant's lock.
    tenants: TenantRegistry<(), Instances>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<R>(&self, tenant: &Tenant, f: impl FnOnce(&Instances) -> R) -> R {
        self.tenants.read(tenant, |slot| match slot.get(&()) {
            Some(instances) => f(instances),
            None => f(&Instances::default()),
        })
    }

    fn write<R>(&self, tenant: &Tenant, f: impl FnOnce(&mut Instances) -> R) -> R {
        self.tenants
            .write(tenant, |slot| f(slot.entry(()).or_default()))
    }

    /// Put a character on the first instance of `route` that is still
    /// boarding and has room, creating a new instance when none qualifies.
    pub fn board(
        &self,
        tenant: &Tenant,
        route: &TransportRoute,
        character: CharacterEntry,
        now: DateTime<Utc>,
    ) -> Result<TransportInstance> {
        self.write(tenant, |state| {
            if state.by_character.contains_key(&character.character_id) {
                return Err(Error::AlreadyInTransport(character.character_id));
            }

            let mut candidates: Vec<&TransportInstance> = state
                .by_id
                .values()
                .filter(|i| i.accepts(route, now))
                .collect();
            candidates.sort_by_key(|i| i.created_at);
            let existing = candidates.first().map(|i| i.id);
            let id = match existing {
                Some(id) => id,
                None => {
                    let instance = TransportInstance::new(route, now);
                    let id = instance.id;
                    state.by_id.insert(id, instance);
                    id
                }
            };

            let instance = state
                .by_id
                .get_mut(&id)
                .ok_or_else(|| Error::NotFound(format!("transport instance {}", id)))?;
            instance.characters.push(character);
            state.by_character.insert(character.character_id, id);
            Ok(instance.clone())
        })
    }

    /// Take a character off whatever instance holds it, releasing the
    /// instance when it empties.
    pub fn remove_character(&self, tenant: &Tenant, character_id: u32) -> Option<Departure> {
        self.write(tenant, |state| {
            let id = state.by_character.remove(&character_id)?;
            let instance = state.by_id.get_mut(&id)?;
            let position = instance
                .characters
                .iter()
                .position(|c| c.character_id == character_id)?;
            let character = instance.characters.remove(position);

            let released = instance.characters.is_empty();
            let snapshot = instance.clone();
            if released {
                state.by_id.remove(&id);
            }
            Some(Departure {
                instance: snapshot,
                character,
                released,
            })
        })
    }

    pub fn instance_for(&self, tenant: &Tenant, character_id: u32) -> Option<TransportInstance> {
        self.read(tenant, |state| {
            state
                .by_character
                .get(&character_id)
                .and_then(|id| state.by_id.get(id))
                .cloned()
        })
    }

    pub fn is_in_transport(&self, tenant: &Tenant, character_id: u32) -> bool {
        self.read(tenant, |state| state.by_character.contains_key(&character_id))
    }

    pub fn get(&self, tenant: &Tenant, id: Uuid) -> Option<TransportInstance> {
        self.read(tenant, |state| state.by_id.get(&id).cloned())
    }

    /// Instances of a route, oldest first.
    pub fn for_route(&self, tenant: &Tenant, route_id: Uuid) -> Vec<TransportInstance> {
        let mut instances: Vec<_> = self.read(tenant, |state| {
            state
                .by_id
                .values()
                .filter(|i| i.route_id == route_id)
                .cloned()
                .collect()
        });
        instances.sort_by_key(|i| i.created_at);
        instances
    }

    pub fn list(&self, tenant: &Tenant) -> Vec<TransportInstance> {
        self.read(tenant, |state| state.by_id.values().cloned().collect())
    }

    /// Move every instance whose boarding window closed to in-transit.
    pub fn close_boarding(&self, tenant: &Tenant, now: DateTime<Utc>) -> Vec<Uuid> {
        self.write(tenant, |state| {
            state
                .by_id
                .values_mut()
                .filter(|i| i.state == InstanceState::Boarding && i.boarding_until < now)
                .map(|i| {
                    i.state = InstanceState::InTransit;
                    i.id
                })
                .collect()
        })
    }

    /// Release every in-transit instance that has arrived.
    pub fn take_arrived(&self, tenant: &Tenant, now: DateTime<Utc>) -> Vec<TransportInstance> {
        self.write(tenant, |state| {
            state.take_where(|i| i.state == InstanceState::InTransit && i.arrival_at < now)
        })
    }

    /// Release every instance older than its route's maximum lifetime.
    /// Instances of unknown routes are never considered stuck.
    pub fn take_stuck(
        &self,
        tenant: &Tenant,
        now: DateTime<Utc>,
        max_lifetime: impl Fn(Uuid) -> Option<std::time::Duration>,
    ) -> Vec<TransportInstance> {
        self.write(tenant, |state| {
            state.take_where(|i| {
                max_lifetime(i.route_id)
                    .map(|lifetime| now - i.created_at > to_chrono(lifetime))
                    .unwrap_or(false)
            })
        })
    }

    /// Put back instances taken by a tick whose messages were never
    /// published. Characters that boarded elsewhere meanwhile stay where they
    /// are; an instance left without passengers is not restored.
    pub fn restore(&self, tenant: &Tenant, instances: Vec<TransportInstance>) -> usize {
        self.write(tenant, |state| {
            let mut restored = 0;
            for mut instance in instances {
                instance
                    .characters
                    .retain(|c| !state.by_character.contains_key(&c.character_id));
                if instance.characters.is_empty() || state.by_id.contains_key(&instance.id) {
                    continue;
                }
                for c in &instance.characters {
                    state.by_character.insert(c.character_id, instance.id);
                }
                state.by_id.insert(instance.id, instance);
                restored += 1;
            }
            restored
        })
    }

    /// Release every instance of a tenant.
    pub fn take_all(&self, tenant: &Tenant) -> Vec<TransportInstance> {
        self.write(tenant, |state| state.take_where(|_| true))
    }

    /// Tenants with transport state.
    pub fn tenants(&self) -> Vec<Tenant> {
        self.tenants.tenants()
    }

    /// Whether the back-index agrees with the instance character lists.
    pub fn is_consistent(&self, tenant: &Tenant) -> bool {
        self.read(tenant, |state| {
            let mut seen = HashMap::new();
            for instance in state.by_id.values() {
                for c in &instance.characters {
                    if seen.insert(c.character_id, instance.id).is_some() {
                        return false;
                    }
                }
            }
            seen == state.by_character
        })
    }

    pub fn reset(&self) {
        self.tenants.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn route(capacity: u32) -> TransportRoute {
        TransportRoute {
            id: Uuid::new_v4(),
            name: "r".to_string(),
            start_map_id: 1,
            transit_map_ids: vec![2],
            destination_map_id: 3,
            capacity,
            boarding_window: Duration::from_secs(10),
            travel_duration: Duration::from_secs(30),
        }
    }

    fn entry(character_id: u32) -> CharacterEntry {
        CharacterEntry {
            character_id,
            world_id: 0,
            channel_id: 1,
        }
    }

    fn tenant() -> Tenant {
        Tenant::new(Uuid::new_v4(), "GMS", 83, 1)
    }

    #[test]
    fn test_full_instance_spills_into_new_one() {
        let registry = InstanceRegistry::new();
        let t = tenant();
        let r = route(2);
        let now = Utc::now();

        let a = registry.board(&t, &r, entry(1), now).unwrap();
        let b = registry.board(&t, &r, entry(2), now).unwrap();
        let c = registry.board(&t, &r, entry(3), now).unwrap();
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(registry.get(&t, a.id).unwrap().characters.len(), 2);
        assert!(registry.is_consistent(&t));
    }

    #[test]
    fn test_character_cannot_board_twice() {
        let registry = InstanceRegistry::new();
        let t = tenant();
        let r = route(5);
        registry.board(&t, &r, entry(1), Utc::now()).unwrap();

        let err = registry.board(&t, &r, entry(1), Utc::now()).unwrap_err();
        assert_eq!(err.error_code(), "ALREADY_IN_TRANSPORT");
    }

    #[test]
    fn test_last_departure_releases_instance() {
        let registry = InstanceRegistry::new();
        let t = tenant();
        let r = route(5);
        let instance = registry.board(&t, &r, entry(1), Utc::now()).unwrap();
        registry.board(&t, &r, entry(2), Utc::now()).unwrap();

        let first = registry.remove_character(&t, 1).unwrap();
        assert!(!first.released);
        let second = registry.remove_character(&t, 2).unwrap();
        assert!(second.released);
        assert!(registry.get(&t, instance.id).is_none());
        assert!(registry.remove_character(&t, 2).is_none());
        assert!(registry.is_consistent(&t));
    }

    #[test]
    fn test_instances_are_tenant_scoped() {
        let registry = InstanceRegistry::new();
        let (a, b) = (tenant(), tenant());
        registry.board(&a, &route(5), entry(1), Utc::now()).unwrap();

        assert!(!registry.is_in_transport(&b, 1));
        assert!(registry.list(&b).is_empty());
        assert!(registry.take_all(&b).is_empty());
        assert!(registry.is_in_transport(&a, 1));
    }

    #[test]
    fn test_restore_skips_characters_that_moved_on() {
        let registry = InstanceRegistry::new();
        let t = tenant();
        let r = route(5);
        let instance = registry.board(&t, &r, entry(1), Utc::now()).unwrap();
        registry.board(&t, &r, entry(2), Utc::now()).unwrap();

        let taken = registry.take_all(&t);
        assert_eq!(taken.len(), 1);
        assert!(!registry.is_in_transport(&t, 1));

        // Character 2 boards again before the restore lands.
        let other = registry.board(&t, &r, entry(2), Utc::now()).unwrap();
        assert_eq!(registry.restore(&t, taken), 1);

        let restored = registry.get(&t, instance.id).unwrap();
        assert_eq!(restored.characters.len(), 1);
        assert_eq!(registry.instance_for(&t, 1).unwrap().id, instance.id);
        assert_eq!(registry.instance_for(&t, 2).unwrap().id, other.id);
        assert!(registry.is_consistent(&t));
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Transport routes.

use std::path::Path;
use std::time::Duration;

use atlas_core::registry::TenantRegistry;
use atlas_core::tenant::Tenant;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Immutable description of an instanced transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportRoute {
    pub id: Uuid,
    pub name: String,
    pub start_map_id: u32,
    #[serde(default)]
    pub transit_map_ids: Vec<u32>,
    pub destination_map_id: u32,
    pub capacity: u32,
    #[serde(rename = "boardingWindowSecs", with = "secs")]
    pub boarding_window: Duration,
    #[serde(rename = "travelDurationSecs", with = "secs")]
    pub travel_duration: Duration,
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

impl TransportRoute {
    /// Age after which an instance of this route is considered stuck.
    pub fn max_lifetime(&self) -> Duration {
        2 * (self.boarding_window + self.travel_duration)
    }

    /// Map characters ride in. Falls back to the destination for routes
    /// without a transit map.
    pub fn transit_map_id(&self) -> u32 {
        self.transit_map_ids
            .first()
            .copied()
            .unwrap_or(self.destination_map_id)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("route name must not be empty".to_string()));
        }
        if self.capacity == 0 {
            return Err(Error::Validation(format!(
                "route {} must have a positive capacity",
                self.name
            )));
        }
        if self.boarding_window.is_zero() {
            return Err(Error::Validation(format!(
                "route {} must have a positive boarding window",
                self.name
            )));
        }
        Ok(())
    }
}

/// Routes per tenant.
///
/// Routes given at construction are installed for a tenant the first time
/// that tenant is looked up.
pub struct RouteRegistry {
    routes: TenantRegistry<Uuid, TransportRoute>,
    defaults: Vec<TransportRoute>,
}

impl RouteRegistry {
    pub fn new(defaults: Vec<TransportRoute>) -> Self {
        Self {
            routes: TenantRegistry::new(),
            defaults,
        }
    }

    /// Load default routes from a JSON array file. A missing file yields no
    /// routes.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new(Vec::new()));
        }
        let routes: Vec<TransportRoute> = serde_json::from_slice(&std::fs::read(path)?)?;
        for route in &routes {
            route.validate()?;
        }
        info!(path = %path.display(), count = routes.len(), "Loaded transport routes");
        Ok(Self::new(routes))
    }

    fn ensure(&self, tenant: &Tenant) {
        if self.defaults.is_empty() || !self.routes.is_empty(tenant) {
            return;
        }
        self.routes.write(tenant, |routes| {
            if routes.is_empty() {
                for route in &self.defaults {
                    routes.insert(route.id, route.clone());
                }
            }
        });
    }

    pub fn add(&self, tenant: &Tenant, route: TransportRoute) -> Result<()> {
        route.validate()?;
        self.ensure(tenant);
        self.routes.put(tenant, route.id, route);
        Ok(())
    }

    pub fn get(&self, tenant: &Tenant, id: Uuid) -> Option<TransportRoute> {
        self.ensure(tenant);
        self.routes.get(tenant, &id)
    }

    pub fn by_name(&self, tenant: &Tenant, name: &str) -> Option<TransportRoute> {
        self.ensure(tenant);
        self.routes
            .read(tenant, |routes| routes.values().find(|r| r.name == name).cloned())
    }

    /// Route whose transit maps include `map_id`.
    pub fn by_transit_map(&self, tenant: &Tenant, map_id: u32) -> Option<TransportRoute> {
        self.ensure(tenant);
        self.routes.read(tenant, |routes| {
            routes
                .values()
                .find(|r| r.transit_map_ids.contains(&map_id))
                .cloned()
        })
    }

    /// Every route, ordered by name.
    pub fn list(&self, tenant: &Tenant) -> Vec<TransportRoute> {
        self.ensure(tenant);
        let mut routes = self.routes.values(tenant);
        routes.sort_by(|a, b| a.name.cmp(&b.name));
        routes
    }
}

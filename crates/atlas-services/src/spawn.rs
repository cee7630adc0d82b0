// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Monster spawn planning with per-point cooldowns.
//!
//! Each field keeps a vector of `{point, next_spawn_at}` records, created on
//! first use from the map's spawn points (only points with `mob_time >= 0`
//! are spawnable). A pass over a field:
//!
//! 1. does nothing when no character is in the field,
//! 2. computes `max = ceil((0.70 + 0.05 * min(6, characters)) * points)`,
//! 3. spawns `max - monsters_in_field` monsters at shuffled eligible points,
//! 4. pushes `next_spawn_at` of every dispatched point 5 seconds out.
//!
//! Passes over one field are serialised by that field's lock.

use std::sync::Arc;

use async_trait::async_trait;
use atlas_core::clock::Clock;
use atlas_core::registry::TenantRegistry;
use atlas_core::tenant::Tenant;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::error::Result;
use crate::field::Field;

/// Cooldown applied to a point after a monster is dispatched there.
pub const SPAWN_COOLDOWN: Duration = Duration::seconds(5);

// Spawn rate in percent: 70% plus 5% per character, counting at most six.
const BASE_SPAWN_RATE: usize = 70;
const SPAWN_RATE_PER_CHARACTER: usize = 5;
const MAX_COUNTED_CHARACTERS: usize = 6;

/// A monster spawn point as published by the map data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnPoint {
    pub id: u32,
    pub template: u32,
    pub mob_time: i32,
    #[serde(default)]
    pub team: i8,
    pub x: i16,
    pub y: i16,
    #[serde(default)]
    pub fh: i16,
}

#[derive(Debug, Clone)]
struct PointRecord {
    point: SpawnPoint,
    next_spawn_at: DateTime<Utc>,
}

/// Spawn points of a map.
#[async_trait]
pub trait SpawnPointSource: Send + Sync {
    async fn spawn_points(&self, tenant: &Tenant, map_id: u32) -> Result<Vec<SpawnPoint>>;
}

/// Who is currently in a field.
#[async_trait]
pub trait FieldPopulation: Send + Sync {
    async fn characters(&self, tenant: &Tenant, field: &Field) -> Result<usize>;
    async fn monsters(&self, tenant: &Tenant, field: &Field) -> Result<usize>;
}

/// Creates monsters.
#[async_trait]
pub trait MonsterSpawner: Send + Sync {
    async fn create(&self, tenant: &Tenant, field: &Field, point: &SpawnPoint) -> Result<()>;
}

/// Target monster count for a field.
pub fn monsters_max(characters: usize, points: usize) -> usize {
    let rate = BASE_SPAWN_RATE + SPAWN_RATE_PER_CHARACTER * characters.min(MAX_COUNTED_CHARACTERS);
    (rate * points).div_ceil(100)
}

/// Pick which record indices to spawn at.
///
/// `eligible` holds indices whose cooldown has elapsed. At most
/// `monsters_max - in_field` of them are returned, in random order.
pub fn choose_points<R: Rng + ?Sized>(
    mut eligible: Vec<usize>,
    characters: usize,
    points: usize,
    in_field: usize,
    rng: &mut R,
) -> Vec<usize> {
    let to_spawn = monsters_max(characters, points).saturating_sub(in_field);
    eligible.shuffle(rng);
    eligible.truncate(to_spawn);
    eligible
}

type FieldRecords = Arc<Mutex<Vec<PointRecord>>>;

/// Plans and dispatches monster spawns per field.
pub struct SpawnPlanner {
    records: TenantRegistry<Field, FieldRecords>,
    points: Arc<dyn SpawnPointSource>,
    population: Arc<dyn FieldPopulation>,
    spawner: Arc<dyn MonsterSpawner>,
    clock: Arc<dyn Clock>,
}

impl SpawnPlanner {
    pub fn new(
        points: Arc<dyn SpawnPointSource>,
        population: Arc<dyn FieldPopulation>,
        spawner: Arc<dyn MonsterSpawner>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            records: TenantRegistry::new(),
            points,
            population,
            spawner,
            clock,
        }
    }

    async fn field_records(&self, tenant: &Tenant, field: &Field) -> Result<FieldRecords> {
        if let Some(records) = self.records.get(tenant, field) {
            return Ok(records);
        }

        let now = self.clock.now();
        let fresh: Vec<PointRecord> = self
            .points
            .spawn_points(tenant, field.map_id)
            .await?
            .into_iter()
            .filter(|p| p.mob_time >= 0)
            .map(|point| PointRecord {
                point,
                next_spawn_at: now,
            })
            .collect();

        // A concurrent pass may have initialised the field meanwhile.
        Ok(self.records.write(tenant, |fields| {
            fields
                .entry(*field)
                .or_insert_with(|| Arc::new(Mutex::new(fresh)))
                .clone()
        }))
    }

    /// Run one spawn pass over a field. Returns the number of monsters
    /// dispatched.
    pub async fn spawn_for_field(&self, tenant: &Tenant, field: &Field) -> Result<usize> {
        let records = self.field_records(tenant, field).await?;
        let mut records = records.lock().await;
        if records.is_empty() {
            return Ok(0);
        }

        let characters = self.population.characters(tenant, field).await?;
        if characters == 0 {
            debug!(field = %field, "No characters in field, skipping spawn");
            return Ok(0);
        }

        let in_field = match self.population.monsters(tenant, field).await {
            Ok(count) => count,
            Err(e) => {
                warn!(field = %field, error = %e, "Unable to count monsters, assuming none");
                0
            }
        };

        let now = self.clock.now();
        let eligible: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.next_spawn_at <= now)
            .map(|(i, _)| i)
            .collect();
        let chosen = choose_points(
            eligible,
            characters,
            records.len(),
            in_field,
            &mut rand::thread_rng(),
        );

        let mut dispatched = 0;
        for index in chosen {
            let point = records[index].point.clone();
            match self.spawner.create(tenant, field, &point).await {
                Ok(()) => {
                    records[index].next_spawn_at = now + SPAWN_COOLDOWN;
                    dispatched += 1;
                }
                Err(e) => {
                    error!(
                        field = %field,
                        spawn_point = point.id,
                        monster_id = point.template,
                        error = %e,
                        "Failed to spawn monster"
                    );
                }
            }
        }

        if dispatched > 0 {
            debug!(field = %field, dispatched, "Spawned monsters");
        }
        Ok(dispatched)
    }

    /// Drop a field's cooldown records.
    pub fn forget(&self, tenant: &Tenant, field: &Field) {
        self.records.remove(tenant, field);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_core::clock::ManualClock;
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    struct FixedPoints(Vec<SpawnPoint>);

    #[async_trait]
    impl SpawnPointSource for FixedPoints {
        async fn spawn_points(&self, _: &Tenant, _: u32) -> Result<Vec<SpawnPoint>> {
            Ok(self.0.clone())
        }
    }

    struct Population {
        characters: usize,
        monsters: StdMutex<usize>,
    }

    #[async_trait]
    impl FieldPopulation for Population {
        async fn characters(&self, _: &Tenant, _: &Field) -> Result<usize> {
            Ok(self.characters)
        }
        async fn monsters(&self, _: &Tenant, _: &Field) -> Result<usize> {
            Ok(*self.monsters.lock().unwrap())
        }
    }

    #[derive(Default)]
    struct Recording(StdMutex<Vec<u32>>);

    #[async_trait]
    impl MonsterSpawner for Recording {
        async fn create(&self, _: &Tenant, _: &Field, point: &SpawnPoint) -> Result<()> {
            self.0.lock().unwrap().push(point.id);
            Ok(())
        }
    }

    fn point(id: u32, mob_time: i32) -> SpawnPoint {
        SpawnPoint {
            id,
            template: 100100,
            mob_time,
            team: -1,
            x: id as i16 * 10,
            y: 0,
            fh: 1,
        }
    }

    fn planner(
        points: Vec<SpawnPoint>,
        characters: usize,
    ) -> (SpawnPlanner, Arc<Recording>, Arc<ManualClock>) {
        let spawner = Arc::new(Recording::default());
        let clock = Arc::new(ManualClock::starting_now());
        let planner = SpawnPlanner::new(
            Arc::new(FixedPoints(points)),
            Arc::new(Population {
                characters,
                monsters: StdMutex::new(0),
            }),
            spawner.clone(),
            clock.clone(),
        );
        (planner, spawner, clock)
    }

    #[test]
    fn test_monsters_max() {
        assert_eq!(monsters_max(1, 10), 8);
        assert_eq!(monsters_max(6, 10), 10);
        assert_eq!(monsters_max(20, 10), 10);
        assert_eq!(monsters_max(0, 0), 0);
    }

    #[test]
    fn test_choose_points_respects_monsters_in_field() {
        let mut rng = rand::thread_rng();
        let chosen = choose_points((0..10).collect(), 1, 10, 5, &mut rng);
        assert_eq!(chosen.len(), 3);
        let chosen = choose_points((0..10).collect(), 1, 10, 12, &mut rng);
        assert!(chosen.is_empty());
    }

    #[tokio::test]
    async fn test_dispatched_points_cool_down() {
        let points: Vec<_> = (1..=4).map(|id| point(id, 0)).collect();
        let (planner, spawner, clock) = planner(points, 6);
        let tenant = Tenant::new(Uuid::new_v4(), "GMS", 83, 1);
        let field = Field::new(0, 1, 100000000);

        assert_eq!(planner.spawn_for_field(&tenant, &field).await.unwrap(), 4);
        assert_eq!(planner.spawn_for_field(&tenant, &field).await.unwrap(), 0);

        clock.advance_secs(4);
        assert_eq!(planner.spawn_for_field(&tenant, &field).await.unwrap(), 0);

        clock.advance_secs(1);
        assert_eq!(planner.spawn_for_field(&tenant, &field).await.unwrap(), 4);
        assert_eq!(spawner.0.lock().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_negative_mob_time_is_not_spawnable() {
        let (planner, spawner, _) = planner(vec![point(1, -1), point(2, 0)], 1);
        let tenant = Tenant::new(Uuid::new_v4(), "GMS", 83, 1);

        planner
            .spawn_for_field(&tenant, &Field::new(0, 1, 1))
            .await
            .unwrap();
        assert_eq!(*spawner.0.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_empty_field_spawns_nothing() {
        let (planner, spawner, _) = planner(vec![point(1, 0)], 0);
        let tenant = Tenant::new(Uuid::new_v4(), "GMS", 83, 1);

        assert_eq!(
            planner
                .spawn_for_field(&tenant, &Field::new(0, 1, 1))
                .await
                .unwrap(),
            0
        );
        assert!(spawner.0.lock().unwrap().is_empty());
    }
}

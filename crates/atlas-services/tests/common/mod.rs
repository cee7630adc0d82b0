// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for atlas-services scenario tests.
//!
//! Provides ServicesContext wiring every processor to in-memory stores, a
//! recording producer, a manual clock, and stub remote services.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use atlas_core::bus::{Envelope, Message, RecordingProducer, TopicResolver};
use atlas_core::clock::ManualClock;
use atlas_core::saga::action::ConditionInput;
use atlas_core::tenant::Tenant;

use atlas_services::channel::ChannelRegistry;
use atlas_services::consumer::ServicesHandler;
use atlas_services::cooldown::MemoryKv;
use atlas_services::error::Result;
use atlas_services::field::Field;
use atlas_services::map_actions::{
    CharacterValidator, MapActionProcessor, MemoryScriptStore, OperationExecutor, RuleEvaluator,
};
use atlas_services::party_quest::{
    MemoryDefinitionStore, PartiesClient, Party, PartyMember, PartyQuestDefinitions,
    RegistrationValidator,
};
use atlas_services::server::AppState;
use atlas_services::skills::SkillCooldowns;
use atlas_services::spawn::{
    FieldPopulation, MonsterSpawner, SpawnPlanner, SpawnPoint, SpawnPointSource,
};
use atlas_services::storage::{ItemDataSource, ItemTemplate, MemoryStorageStore, StorageService};
use atlas_services::transport::{
    InstanceRegistry, RouteRegistry, TransportProcessor, TransportRoute,
};

pub const START_MAP: u32 = 101000300;
pub const TRANSIT_MAP: u32 = 200090000;
pub const DESTINATION_MAP: u32 = 200000100;

/// Ellinia to Orbis: 60 seconds boarding, 120 seconds travel.
pub fn orbis_route() -> TransportRoute {
    TransportRoute {
        id: Uuid::new_v4(),
        name: "ellinia_to_orbis".to_string(),
        start_map_id: START_MAP,
        transit_map_ids: vec![TRANSIT_MAP],
        destination_map_id: DESTINATION_MAP,
        capacity: 2,
        boarding_window: Duration::from_secs(60),
        travel_duration: Duration::from_secs(120),
    }
}

pub fn tenant() -> Tenant {
    Tenant::new(Uuid::new_v4(), "GMS", 83, 1)
}

/// Party roster keyed by character.
#[derive(Default)]
pub struct StubParties {
    pub parties: Mutex<HashMap<u32, Party>>,
    pub members: Mutex<HashMap<u32, Vec<PartyMember>>>,
    pub unreachable: Mutex<bool>,
}

impl StubParties {
    /// Register a party led by the first member.
    pub fn add_party(&self, party_id: u32, members: &[(u32, u16)]) {
        let leader_id = members[0].0;
        let mut parties = self.parties.lock().unwrap();
        for (id, _) in members {
            parties.insert(
                *id,
                Party {
                    id: party_id,
                    leader_id,
                },
            );
        }
        self.members.lock().unwrap().insert(
            party_id,
            members
                .iter()
                .map(|(id, level)| PartyMember {
                    id: *id,
                    name: format!("member{}", id),
                    level: *level,
                })
                .collect(),
        );
    }
}

#[async_trait]
impl PartiesClient for StubParties {
    async fn party_of(&self, _: &Tenant, character_id: u32) -> Result<Option<Party>> {
        if *self.unreachable.lock().unwrap() {
            return Err(atlas_services::error::Error::Validation(
                "parties unreachable".to_string(),
            ));
        }
        Ok(self.parties.lock().unwrap().get(&character_id).cloned())
    }

    async fn members(&self, _: &Tenant, party_id: u32) -> Result<Vec<PartyMember>> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .get(&party_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Validator answering a fixed verdict and recording every call.
pub struct StubValidator {
    pub passes: Mutex<bool>,
    pub calls: Mutex<Vec<(u32, Vec<ConditionInput>)>>,
}

impl Default for StubValidator {
    fn default() -> Self {
        Self {
            passes: Mutex::new(true),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CharacterValidator for StubValidator {
    async fn validate(
        &self,
        _: &Tenant,
        character_id: u32,
        conditions: &[ConditionInput],
    ) -> Result<bool> {
        self.calls
            .lock()
            .unwrap()
            .push((character_id, conditions.to_vec()));
        Ok(*self.passes.lock().unwrap())
    }
}

/// Spawn points per map.
#[derive(Default)]
pub struct StubSpawnPoints {
    pub points: Mutex<HashMap<u32, Vec<SpawnPoint>>>,
}

#[async_trait]
impl SpawnPointSource for StubSpawnPoints {
    async fn spawn_points(&self, _: &Tenant, map_id: u32) -> Result<Vec<SpawnPoint>> {
        Ok(self
            .points
            .lock()
            .unwrap()
            .get(&map_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct StubPopulation {
    pub characters: Mutex<usize>,
    pub monsters: Mutex<usize>,
}

#[async_trait]
impl FieldPopulation for StubPopulation {
    async fn characters(&self, _: &Tenant, _: &Field) -> Result<usize> {
        Ok(*self.characters.lock().unwrap())
    }

    async fn monsters(&self, _: &Tenant, _: &Field) -> Result<usize> {
        Ok(*self.monsters.lock().unwrap())
    }
}

/// Records every spawn request.
#[derive(Default)]
pub struct RecordingSpawner {
    pub spawned: Mutex<Vec<(Field, u32)>>,
}

#[async_trait]
impl MonsterSpawner for RecordingSpawner {
    async fn create(&self, _: &Tenant, field: &Field, point: &SpawnPoint) -> Result<()> {
        self.spawned.lock().unwrap().push((*field, point.template));
        Ok(())
    }
}

/// Item metadata by template id.
#[derive(Default)]
pub struct StubItems {
    pub templates: Mutex<HashMap<u32, ItemTemplate>>,
}

#[async_trait]
impl ItemDataSource for StubItems {
    async fn templates(&self, _: &Tenant, ids: &[u32]) -> Result<HashMap<u32, ItemTemplate>> {
        let known = self.templates.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| known.get(id).map(|t| (*id, t.clone())))
            .collect())
    }
}

/// Every processor of the services process over in-memory state.
pub struct ServicesContext {
    pub state: AppState,
    pub handler: Arc<ServicesHandler>,
    pub producer: Arc<RecordingProducer>,
    pub clock: Arc<ManualClock>,
    pub topics: TopicResolver,
    pub tenant: Tenant,
    pub parties: Arc<StubParties>,
    pub validator: Arc<StubValidator>,
    pub spawn_points: Arc<StubSpawnPoints>,
    pub population: Arc<StubPopulation>,
    pub spawner: Arc<RecordingSpawner>,
    pub items: Arc<StubItems>,
    _data_dir: tempfile::TempDir,
}

impl ServicesContext {
    pub fn new() -> Self {
        Self::with_routes(vec![orbis_route()])
    }

    pub fn with_routes(routes: Vec<TransportRoute>) -> Self {
        let data_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let producer = Arc::new(RecordingProducer::new());
        let clock = Arc::new(ManualClock::starting_now());
        let topics = TopicResolver::default();

        let parties = Arc::new(StubParties::default());
        let validator = Arc::new(StubValidator::default());
        let spawn_points = Arc::new(StubSpawnPoints::default());
        let population = Arc::new(StubPopulation::default());
        let spawner = Arc::new(RecordingSpawner::default());
        let items = Arc::new(StubItems::default());
        let definitions = Arc::new(MemoryDefinitionStore::new());

        let state = AppState {
            channels: Arc::new(ChannelRegistry::new(
                producer.clone(),
                topics.clone(),
                clock.clone(),
            )),
            transport: Arc::new(TransportProcessor::new(
                Arc::new(RouteRegistry::new(routes)),
                Arc::new(InstanceRegistry::new()),
                producer.clone(),
                topics.clone(),
                clock.clone(),
            )),
            map_actions: Arc::new(MapActionProcessor::new(
                Arc::new(MemoryScriptStore::new()),
                RuleEvaluator::new(validator.clone()),
                OperationExecutor::new(producer.clone(), topics.clone()),
                data_dir.path().join("map-actions"),
            )),
            definitions: Arc::new(PartyQuestDefinitions::new(
                definitions.clone(),
                data_dir.path().join("party-quests"),
            )),
            registrations: Arc::new(RegistrationValidator::new(
                parties.clone(),
                definitions,
                producer.clone(),
                topics.clone(),
            )),
            storage: Arc::new(StorageService::new(
                Arc::new(MemoryStorageStore::new()),
                items.clone(),
                producer.clone(),
                topics.clone(),
            )),
        };

        let handler = Arc::new(ServicesHandler {
            channels: state.channels.clone(),
            transport: state.transport.clone(),
            spawner: Arc::new(SpawnPlanner::new(
                spawn_points.clone(),
                population.clone(),
                spawner.clone(),
                clock.clone(),
            )),
            map_actions: state.map_actions.clone(),
            skills: Arc::new(SkillCooldowns::new(
                Arc::new(MemoryKv::new()),
                clock.clone(),
                producer.clone(),
                topics.clone(),
            )),
            storage: state.storage.clone(),
            topics: topics.clone(),
        });

        Self {
            state,
            handler,
            producer,
            clock,
            topics,
            tenant: tenant(),
            parties,
            validator,
            spawn_points,
            population,
            spawner,
            items,
            _data_dir: data_dir,
        }
    }

    pub fn data_dir(&self) -> &std::path::Path {
        self._data_dir.path()
    }

    /// Bus message for this context's tenant.
    pub fn message<B: Serialize>(&self, topic_var: &str, envelope: Envelope<B>) -> Message {
        self.message_for(&self.tenant, topic_var, envelope)
    }

    pub fn message_for<B: Serialize>(
        &self,
        tenant: &Tenant,
        topic_var: &str,
        envelope: Envelope<B>,
    ) -> Message {
        Message {
            topic: self.topics.resolve(topic_var),
            key: envelope.partition_key(),
            headers: tenant.to_headers(),
            value: serde_json::to_value(&envelope).expect("Failed to encode envelope"),
        }
    }

    /// Route one message through the services handler.
    pub async fn deliver(&self, message: Message) {
        self.handler
            .route(&message)
            .await
            .expect("Failed to route message");
    }

    /// Messages published since the last call.
    pub fn sent(&self) -> Vec<Message> {
        self.producer.take()
    }
}

/// Command or event type of each message, in order.
pub fn kinds(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .map(|m| m.kind().unwrap_or_default().to_string())
        .collect()
}

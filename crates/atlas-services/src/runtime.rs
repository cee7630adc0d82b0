// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable services runtime.
//!
//! [`ServicesRuntime`] wires the registries and processors to a bus consumer,
//! the background workers, and the HTTP surface, so the services can run
//! inside an existing tokio application instead of as the standalone binary.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use atlas_core::bus::{RedisStreamConsumer, RedisStreamProducer, TopicResolver};
//! use atlas_services::clients::Collaborators;
//! use atlas_services::config::Config;
//! use atlas_services::consumer;
//! use atlas_services::runtime::ServicesRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let topics = TopicResolver::from_env();
//!     let consumer =
//!         RedisStreamConsumer::connect("redis://127.0.0.1", consumer::subscriptions(&topics))
//!             .await?;
//!
//!     let runtime = ServicesRuntime::builder()
//!         .producer(Arc::new(RedisStreamProducer::connect("redis://127.0.0.1").await?))
//!         .consumer(Arc::new(consumer))
//!         .topics(topics)
//!         .collaborators(Collaborators::new(&config.collaborators)?)
//!         .http_addr("0.0.0.0:8080".parse()?)
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     // ... run your application ...
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use atlas_core::bus::{Consumer, Producer, TopicResolver};
use atlas_core::clock::{self, Clock};
use atlas_core::listener::{BusListener, ListenerConfig};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::channel::ChannelRegistry;
use crate::channel_monitor::{ChannelMonitor, ChannelMonitorConfig};
use crate::clients::{Collaborators, RestFieldPopulation};
use crate::consumer::ServicesHandler;
use crate::cooldown::{KvStore, MemoryKv};
use crate::cooldown_sweeper::{CooldownSweeper, CooldownSweeperConfig};
use crate::map_actions::{
    CharacterValidator, MapActionProcessor, MemoryScriptStore, OperationExecutor, RuleEvaluator,
    ScriptStore,
};
use crate::party_quest::{
    DefinitionStore, MemoryDefinitionStore, PartiesClient, PartyQuestDefinitions,
    RegistrationValidator,
};
use crate::server::{self, AppState};
use crate::skills::SkillCooldowns;
use crate::spawn::{FieldPopulation, MonsterSpawner, SpawnPlanner, SpawnPointSource};
use crate::storage::{ItemDataSource, MemoryStorageStore, StorageService, StorageStore};
use crate::transport::{InstanceRegistry, RouteRegistry, TransportProcessor};
use crate::transport_scheduler::{TransportScheduler, TransportSchedulerConfig};

/// Seed file for transport routes, relative to the data directory.
const ROUTES_FILE: &str = "instance-routes.json";

/// Remote services the processors call out to.
#[derive(Default)]
struct Remotes {
    parties: Option<Arc<dyn PartiesClient>>,
    characters: Option<Arc<dyn CharacterValidator>>,
    spawn_points: Option<Arc<dyn SpawnPointSource>>,
    population: Option<Arc<dyn FieldPopulation>>,
    monsters: Option<Arc<dyn MonsterSpawner>>,
    items: Option<Arc<dyn ItemDataSource>>,
}

fn required<T: ?Sized>(value: Option<Arc<T>>, name: &str) -> Result<Arc<T>> {
    value.ok_or_else(|| anyhow::anyhow!("{} is required", name))
}

/// Builder for creating a [`ServicesRuntime`].
#[derive(Default)]
pub struct ServicesRuntimeBuilder {
    producer: Option<Arc<dyn Producer>>,
    consumer: Option<Arc<dyn Consumer>>,
    clock: Option<Arc<dyn Clock>>,
    topics: TopicResolver,
    kv: Option<Arc<dyn KvStore>>,
    scripts: Option<Arc<dyn ScriptStore>>,
    definitions: Option<Arc<dyn DefinitionStore>>,
    storages: Option<Arc<dyn StorageStore>>,
    remotes: Remotes,
    data_dir: PathBuf,
    http_addr: Option<SocketAddr>,
    listener: ListenerConfig,
    cooldowns: CooldownSweeperConfig,
    channels: ChannelMonitorConfig,
    transports: TransportSchedulerConfig,
}

impl std::fmt::Debug for ServicesRuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicesRuntimeBuilder")
            .field("producer", &self.producer.as_ref().map(|_| "..."))
            .field("consumer", &self.consumer.as_ref().map(|_| "..."))
            .field("data_dir", &self.data_dir)
            .field("http_addr", &self.http_addr)
            .finish()
    }
}

impl ServicesRuntimeBuilder {
    pub fn new() -> Self {
        Self {
            data_dir: PathBuf::from(".data"),
            ..Default::default()
        }
    }

    /// Set the producer events and commands are published on (required).
    pub fn producer(mut self, producer: Arc<dyn Producer>) -> Self {
        self.producer = Some(producer);
        self
    }

    /// Set the consumer for subscribed topics. Without one no listener runs.
    pub fn consumer(mut self, consumer: Arc<dyn Consumer>) -> Self {
        self.consumer = Some(consumer);
        self
    }

    /// Override the time source. Default: system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn topics(mut self, topics: TopicResolver) -> Self {
        self.topics = topics;
        self
    }

    /// Cooldown backing store. Default: in-memory.
    pub fn kv(mut self, kv: Arc<dyn KvStore>) -> Self {
        self.kv = Some(kv);
        self
    }

    /// Map-action script store. Default: in-memory.
    pub fn scripts(mut self, store: Arc<dyn ScriptStore>) -> Self {
        self.scripts = Some(store);
        self
    }

    /// Party-quest definition store. Default: in-memory.
    pub fn definitions(mut self, store: Arc<dyn DefinitionStore>) -> Self {
        self.definitions = Some(store);
        self
    }

    /// Account storage store. Default: in-memory.
    pub fn storages(mut self, store: Arc<dyn StorageStore>) -> Self {
        self.storages = Some(store);
        self
    }

    /// Use the REST clients for every remote service.
    pub fn collaborators(mut self, clients: Collaborators) -> Self {
        self.remotes = Remotes {
            parties: Some(Arc::new(clients.parties)),
            characters: Some(Arc::new(clients.characters)),
            spawn_points: Some(Arc::new(clients.data.clone())),
            population: Some(Arc::new(RestFieldPopulation::new(
                clients.maps,
                clients.monsters.clone(),
            ))),
            monsters: Some(Arc::new(clients.monsters)),
            items: Some(Arc::new(clients.data)),
        };
        self
    }

    pub fn parties(mut self, parties: Arc<dyn PartiesClient>) -> Self {
        self.remotes.parties = Some(parties);
        self
    }

    pub fn characters(mut self, validator: Arc<dyn CharacterValidator>) -> Self {
        self.remotes.characters = Some(validator);
        self
    }

    pub fn spawn_points(mut self, source: Arc<dyn SpawnPointSource>) -> Self {
        self.remotes.spawn_points = Some(source);
        self
    }

    pub fn population(mut self, population: Arc<dyn FieldPopulation>) -> Self {
        self.remotes.population = Some(population);
        self
    }

    pub fn monsters(mut self, spawner: Arc<dyn MonsterSpawner>) -> Self {
        self.remotes.monsters = Some(spawner);
        self
    }

    pub fn items(mut self, items: Arc<dyn ItemDataSource>) -> Self {
        self.remotes.items = Some(items);
        self
    }

    /// Directory holding seed files and `instance-routes.json`.
    ///
    /// Default: `.data`
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Serve the HTTP API on `addr`. Without one no server runs.
    pub fn http_addr(mut self, addr: SocketAddr) -> Self {
        self.http_addr = Some(addr);
        self
    }

    /// Longest a single bus poll blocks.
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.listener.poll_timeout = timeout;
        self
    }

    /// Default: 1 second
    pub fn cooldown_sweep_interval(mut self, interval: Duration) -> Self {
        self.cooldowns.poll_interval = interval;
        self
    }

    /// Default: 5 seconds
    pub fn channel_sweep_interval(mut self, interval: Duration) -> Self {
        self.channels.poll_interval = interval;
        self
    }

    /// Default: 1 second
    pub fn transport_tick_interval(mut self, interval: Duration) -> Self {
        self.transports.tick_interval = interval;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if a required field is missing or the route file
    /// cannot be read.
    pub fn build(self) -> Result<ServicesRuntimeConfig> {
        let producer = required(self.producer, "producer")?;
        let remotes = self.remotes;
        let parties = required(remotes.parties, "parties client")?;
        let characters = required(remotes.characters, "character validator")?;
        let spawn_points = required(remotes.spawn_points, "spawn point source")?;
        let population = required(remotes.population, "field population")?;
        let monsters = required(remotes.monsters, "monster spawner")?;
        let items = required(remotes.items, "item data source")?;

        let routes = RouteRegistry::load(&self.data_dir.join(ROUTES_FILE))?;
        let clock = self.clock.unwrap_or_else(clock::system);
        let topics = self.topics;

        let scripts = self
            .scripts
            .unwrap_or_else(|| Arc::new(MemoryScriptStore::new()));
        let definitions = self
            .definitions
            .unwrap_or_else(|| Arc::new(MemoryDefinitionStore::new()));
        let storages = self
            .storages
            .unwrap_or_else(|| Arc::new(MemoryStorageStore::new()));
        let kv = self.kv.unwrap_or_else(|| Arc::new(MemoryKv::new()));

        let state = AppState {
            channels: Arc::new(ChannelRegistry::new(
                producer.clone(),
                topics.clone(),
                clock.clone(),
            )),
            transport: Arc::new(TransportProcessor::new(
                Arc::new(routes),
                Arc::new(InstanceRegistry::new()),
                producer.clone(),
                topics.clone(),
                clock.clone(),
            )),
            map_actions: Arc::new(MapActionProcessor::new(
                scripts,
                RuleEvaluator::new(characters),
                OperationExecutor::new(producer.clone(), topics.clone()),
                self.data_dir.join("map-actions"),
            )),
            definitions: Arc::new(PartyQuestDefinitions::new(
                definitions.clone(),
                self.data_dir.join("party-quests"),
            )),
            registrations: Arc::new(RegistrationValidator::new(
                parties,
                definitions,
                producer.clone(),
                topics.clone(),
            )),
            storage: Arc::new(StorageService::new(
                storages,
                items,
                producer.clone(),
                topics.clone(),
            )),
        };

        let handler = ServicesHandler {
            channels: state.channels.clone(),
            transport: state.transport.clone(),
            spawner: Arc::new(SpawnPlanner::new(
                spawn_points,
                population,
                monsters,
                clock.clone(),
            )),
            map_actions: state.map_actions.clone(),
            skills: Arc::new(SkillCooldowns::new(kv, clock, producer, topics.clone())),
            storage: state.storage.clone(),
            topics,
        };

        Ok(ServicesRuntimeConfig {
            state,
            handler: Arc::new(handler),
            consumer: self.consumer,
            http_addr: self.http_addr,
            listener: self.listener,
            cooldowns: self.cooldowns,
            channels: self.channels,
            transports: self.transports,
        })
    }
}

/// Configuration for a [`ServicesRuntime`].
pub struct ServicesRuntimeConfig {
    state: AppState,
    handler: Arc<ServicesHandler>,
    consumer: Option<Arc<dyn Consumer>>,
    http_addr: Option<SocketAddr>,
    listener: ListenerConfig,
    cooldowns: CooldownSweeperConfig,
    channels: ChannelMonitorConfig,
    transports: TransportSchedulerConfig,
}

impl std::fmt::Debug for ServicesRuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicesRuntimeConfig")
            .field("has_consumer", &self.consumer.is_some())
            .field("http_addr", &self.http_addr)
            .field("cooldowns", &self.cooldowns)
            .field("channels", &self.channels)
            .field("transports", &self.transports)
            .finish()
    }
}

type Worker = (Arc<Notify>, JoinHandle<()>);

impl ServicesRuntimeConfig {
    /// Start the runtime, spawning the listener, sweepers and HTTP server.
    pub async fn start(self) -> Result<ServicesRuntime> {
        let mut workers: HashMap<&'static str, Worker> = HashMap::new();

        let sweeper = CooldownSweeper::new(self.handler.skills.clone(), self.cooldowns);
        let shutdown = sweeper.shutdown_handle();
        workers.insert(
            "cooldown_sweeper",
            (shutdown, tokio::spawn(async move { sweeper.run().await })),
        );

        let monitor = ChannelMonitor::new(self.state.channels.clone(), self.channels);
        let shutdown = monitor.shutdown_handle();
        workers.insert(
            "channel_monitor",
            (shutdown, tokio::spawn(async move { monitor.run().await })),
        );

        let scheduler = TransportScheduler::new(self.state.transport.clone(), self.transports);
        let shutdown = scheduler.shutdown_handle();
        workers.insert(
            "transport_scheduler",
            (shutdown, tokio::spawn(async move { scheduler.run().await })),
        );

        if let Some(consumer) = self.consumer {
            let listener =
                BusListener::new("services", consumer, self.handler.clone(), self.listener);
            let shutdown = listener.shutdown_handle();
            workers.insert(
                "listener",
                (shutdown, tokio::spawn(async move { listener.run().await })),
            );
        }

        if let Some(addr) = self.http_addr {
            let shutdown = Arc::new(Notify::new());
            let state = self.state.clone();
            let signal = shutdown.clone();
            let handle = tokio::spawn(async move {
                if let Err(e) = server::serve(addr, state, signal).await {
                    error!(addr = %addr, "HTTP server failed: {}", e);
                }
            });
            workers.insert("http", (shutdown, handle));
        }

        info!(workers = workers.len(), "ServicesRuntime started");

        Ok(ServicesRuntime {
            state: self.state,
            workers,
        })
    }
}

/// Running services that can be embedded in an application.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination. Passengers
/// still aboard a transport are returned to its start map on the way out.
pub struct ServicesRuntime {
    state: AppState,
    workers: HashMap<&'static str, Worker>,
}

impl ServicesRuntime {
    pub fn builder() -> ServicesRuntimeBuilder {
        ServicesRuntimeBuilder::new()
    }

    /// Shared processors, as handed to the HTTP handlers.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Signal every worker and wait for it to finish its current iteration.
    pub async fn shutdown(self) -> Result<()> {
        info!("ServicesRuntime shutting down...");

        for (shutdown, _) in self.workers.values() {
            shutdown.notify_one();
        }

        let mut panicked = Vec::new();
        for (name, (_, handle)) in self.workers {
            if let Err(e) = handle.await {
                error!(worker = name, "ServicesRuntime worker panicked: {}", e);
                panicked.push(name);
            }
        }

        if !panicked.is_empty() {
            anyhow::bail!("workers panicked: {}", panicked.join(", "));
        }
        info!("ServicesRuntime shutdown complete");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.workers.values().all(|(_, handle)| !handle.is_finished())
    }
}

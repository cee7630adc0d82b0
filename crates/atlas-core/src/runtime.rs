// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable saga orchestrator.
//!
//! [`CoreRuntime`] wires a [`SagaRuntime`] to a bus consumer and the timeout
//! monitor, so the orchestrator can run inside an existing tokio application
//! instead of as the standalone binary.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use atlas_core::bus::{RedisStreamConsumer, RedisStreamProducer, TopicResolver};
//! use atlas_core::runtime::CoreRuntime;
//! use atlas_core::topic;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let topics = TopicResolver::from_env();
//!     let persistence = atlas_core::persistence::connect("postgres://...", 10).await?;
//!     let consumer = RedisStreamConsumer::connect(
//!         "redis://127.0.0.1",
//!         vec![
//!             topics.resolve(topic::COMMAND_TOPIC_SAGA),
//!             topics.resolve(topic::EVENT_TOPIC_SAGA_STEP),
//!         ],
//!     )
//!     .await?;
//!
//!     let runtime = CoreRuntime::builder()
//!         .persistence(persistence)
//!         .producer(Arc::new(RedisStreamProducer::connect("redis://127.0.0.1").await?))
//!         .consumer(Arc::new(consumer))
//!         .topics(topics)
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
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::bus::{Consumer, Producer, TopicResolver};
use crate::clock::{self, Clock};
use crate::listener::{BusListener, ListenerConfig};
use crate::orchestrator::{SagaRuntime, SagaRuntimeConfig};
use crate::persistence::Persistence;
use crate::saga::SagaType;
use crate::timeout_monitor::{TimeoutMonitor, TimeoutMonitorConfig};

/// Builder for creating a [`CoreRuntime`].
#[derive(Default)]
pub struct CoreRuntimeBuilder {
    persistence: Option<Arc<dyn Persistence>>,
    producer: Option<Arc<dyn Producer>>,
    consumer: Option<Arc<dyn Consumer>>,
    clock: Option<Arc<dyn Clock>>,
    topics: TopicResolver,
    saga: SagaRuntimeConfig,
    listener: ListenerConfig,
    monitor: TimeoutMonitorConfig,
}

impl std::fmt::Debug for CoreRuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreRuntimeBuilder")
            .field("persistence", &self.persistence.as_ref().map(|_| "..."))
            .field("producer", &self.producer.as_ref().map(|_| "..."))
            .field("consumer", &self.consumer.as_ref().map(|_| "..."))
            .field("saga", &self.saga)
            .field("monitor", &self.monitor)
            .finish()
    }
}

impl CoreRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the saga store (required).
    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Set the producer commands and events are published on (required).
    pub fn producer(mut self, producer: Arc<dyn Producer>) -> Self {
        self.producer = Some(producer);
        self
    }

    /// Set the consumer for saga submissions and step outcomes.
    ///
    /// Without one no listener is started; callers feed the [`SagaRuntime`]
    /// directly.
    pub fn consumer(mut self, consumer: Arc<dyn Consumer>) -> Self {
        self.consumer = Some(consumer);
        self
    }

    /// Override the time source. Default: system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the topic name resolver.
    pub fn topics(mut self, topics: TopicResolver) -> Self {
        self.topics = topics;
        self
    }

    /// Saga deadline when no per-type override exists.
    ///
    /// Default: 300 seconds
    pub fn saga_timeout(mut self, timeout: Duration) -> Self {
        self.saga.default_timeout = timeout;
        self
    }

    /// Deadline override for one saga type.
    pub fn saga_type_timeout(mut self, saga_type: SagaType, timeout: Duration) -> Self {
        self.saga.type_timeouts.insert(saga_type, timeout);
        self
    }

    /// How often expired sagas are swept.
    ///
    /// Default: 5 seconds
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.monitor.poll_interval = interval;
        self
    }

    /// Longest a single bus poll blocks.
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.listener.poll_timeout = timeout;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<CoreRuntimeConfig> {
        let persistence = self
            .persistence
            .ok_or_else(|| anyhow::anyhow!("persistence is required"))?;
        let producer = self
            .producer
            .ok_or_else(|| anyhow::anyhow!("producer is required"))?;
        if self.saga.default_timeout.is_zero() {
            anyhow::bail!("saga timeout must be positive");
        }

        Ok(CoreRuntimeConfig {
            persistence,
            producer,
            consumer: self.consumer,
            clock: self.clock.unwrap_or_else(clock::system),
            topics: self.topics,
            saga: self.saga,
            listener: self.listener,
            monitor: self.monitor,
        })
    }
}

/// Configuration for a [`CoreRuntime`].
pub struct CoreRuntimeConfig {
    persistence: Arc<dyn Persistence>,
    producer: Arc<dyn Producer>,
    consumer: Option<Arc<dyn Consumer>>,
    clock: Arc<dyn Clock>,
    topics: TopicResolver,
    saga: SagaRuntimeConfig,
    listener: ListenerConfig,
    monitor: TimeoutMonitorConfig,
}

impl std::fmt::Debug for CoreRuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreRuntimeConfig")
            .field("persistence", &"...")
            .field("has_consumer", &self.consumer.is_some())
            .field("saga", &self.saga)
            .field("monitor", &self.monitor)
            .finish()
    }
}

impl CoreRuntimeConfig {
    /// Start the runtime, spawning the listener and timeout monitor tasks.
    pub async fn start(self) -> Result<CoreRuntime> {
        let sagas = Arc::new(SagaRuntime::new(
            self.persistence,
            self.producer,
            self.topics,
            self.clock,
            self.saga,
        ));

        let mut workers = HashMap::new();

        let monitor = TimeoutMonitor::new(sagas.clone(), self.monitor);
        let monitor_shutdown = monitor.shutdown_handle();
        let monitor_handle = tokio::spawn(async move { monitor.run().await });
        workers.insert("timeout_monitor", (monitor_shutdown, monitor_handle));

        if let Some(consumer) = self.consumer {
            let listener = BusListener::new("sagas", consumer, sagas.clone(), self.listener);
            let listener_shutdown = listener.shutdown_handle();
            let listener_handle = tokio::spawn(async move { listener.run().await });
            workers.insert("listener", (listener_shutdown, listener_handle));
        }

        info!(workers = workers.len(), "CoreRuntime started");

        Ok(CoreRuntime { sagas, workers })
    }
}

/// A running saga orchestrator that can be embedded in an application.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct CoreRuntime {
    sagas: Arc<SagaRuntime>,
    workers: HashMap<&'static str, (Arc<Notify>, JoinHandle<()>)>,
}

impl CoreRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> CoreRuntimeBuilder {
        CoreRuntimeBuilder::new()
    }

    /// The saga runtime, for direct submission and queries.
    pub fn sagas(&self) -> &Arc<SagaRuntime> {
        &self.sagas
    }

    /// Gracefully shut down the runtime.
    ///
    /// Signals every worker and waits for it to finish its current iteration.
    pub async fn shutdown(self) -> Result<()> {
        info!("CoreRuntime shutting down...");

        for (shutdown, _) in self.workers.values() {
            shutdown.notify_one();
        }

        let mut panicked = Vec::new();
        for (name, (_, handle)) in self.workers {
            if let Err(e) = handle.await {
                error!(worker = name, "CoreRuntime worker panicked: {}", e);
                panicked.push(name);
            }
        }

        if !panicked.is_empty() {
            anyhow::bail!("workers panicked: {}", panicked.join(", "));
        }
        info!("CoreRuntime shutdown complete");
        Ok(())
    }

    /// Check if every worker is still running.
    pub fn is_running(&self) -> bool {
        self.workers.values().all(|(_, handle)| !handle.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{MemoryQueue, Message, RecordingProducer};
    use crate::clock::ManualClock;
    use crate::persistence::{SagaStatus, SqlitePersistence};
    use crate::saga::action::{Action, CharacterAmountPayload};
    use crate::saga::{Saga, event};
    use crate::tenant::Tenant;
    use crate::topic;
    use uuid::Uuid;

    #[test]
    fn test_builder_requires_persistence() {
        let result = CoreRuntime::builder()
            .producer(Arc::new(RecordingProducer::new()))
            .build();
        assert!(result.unwrap_err().to_string().contains("persistence"));
    }

    #[tokio::test]
    async fn test_builder_requires_producer() {
        let result = CoreRuntime::builder()
            .persistence(Arc::new(SqlitePersistence::in_memory().await.unwrap()))
            .build();
        assert!(result.unwrap_err().to_string().contains("producer"));
    }

    #[tokio::test]
    async fn test_builder_rejects_zero_timeout() {
        let result = CoreRuntime::builder()
            .persistence(Arc::new(SqlitePersistence::in_memory().await.unwrap()))
            .producer(Arc::new(RecordingProducer::new()))
            .saga_timeout(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_runtime_consumes_submissions_and_shuts_down() {
        let queue = Arc::new(MemoryQueue::new());
        let producer = Arc::new(RecordingProducer::new());
        let runtime = CoreRuntime::builder()
            .persistence(Arc::new(SqlitePersistence::in_memory().await.unwrap()))
            .producer(producer.clone())
            .consumer(queue.clone())
            .clock(Arc::new(ManualClock::starting_now()))
            .poll_timeout(Duration::from_millis(20))
            .build()
            .unwrap()
            .start()
            .await
            .unwrap();
        assert!(runtime.is_running());

        let tenant = Tenant::new(Uuid::new_v4(), "GMS", 83, 1);
        let saga = Saga::builder()
            .saga_type(SagaType::QuestReward)
            .initiated_by("runtime-test")
            .add_step(
                "mesos",
                Action::AwardMesos(CharacterAmountPayload {
                    character_id: 7,
                    world_id: 0,
                    channel_id: 1,
                    amount: 500,
                }),
            )
            .build()
            .unwrap();
        let tx = saga.transaction_id;
        let submission = event::submission(&saga, 0, 7);
        queue
            .send(vec![Message {
                topic: topic::COMMAND_TOPIC_SAGA.to_string(),
                key: submission.partition_key(),
                headers: tenant.to_headers(),
                value: serde_json::to_value(&submission).unwrap(),
            }])
            .await
            .unwrap();

        let mut record = None;
        for _ in 0..100 {
            record = runtime.sagas().get(&tenant, tx).await.unwrap();
            if record.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(record.unwrap().lifecycle(), SagaStatus::Active);
        assert_eq!(producer.messages().len(), 1);

        runtime.shutdown().await.unwrap();
    }
}

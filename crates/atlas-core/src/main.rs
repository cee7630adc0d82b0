// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Atlas Core - Saga Orchestrator
//!
//! Consumes saga submissions and step outcomes from the bus, drives each saga
//! through its steps, and sweeps sagas that stop making progress.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use atlas_core::bus::{RedisStreamConsumer, RedisStreamProducer, TopicResolver};
use atlas_core::config::Config;
use atlas_core::persistence;
use atlas_core::runtime::CoreRuntime;
use atlas_core::topic;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("atlas_core=info".parse()?),
        )
        .init();

    info!("Starting Atlas saga orchestrator");

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        saga_timeout_secs = config.saga_timeout.as_secs(),
        sweep_interval_secs = config.sweep_interval.as_secs(),
        max_db_connections = config.max_db_connections,
        "Configuration loaded"
    );

    info!("Connecting to database...");
    let persistence = persistence::connect(&config.database_url, config.max_db_connections).await?;
    persistence.health_check_db().await?;
    info!("Database ready");

    let topics = TopicResolver::from_env();
    let subscriptions = vec![
        topics.resolve(topic::COMMAND_TOPIC_SAGA),
        topics.resolve(topic::EVENT_TOPIC_SAGA_STEP),
    ];
    info!(topics = ?subscriptions, "Connecting to bus...");
    let producer = RedisStreamProducer::connect(&config.redis_url).await?;
    let consumer = RedisStreamConsumer::connect(&config.redis_url, subscriptions).await?;

    let runtime = CoreRuntime::builder()
        .persistence(persistence)
        .producer(Arc::new(producer))
        .consumer(Arc::new(consumer))
        .topics(topics)
        .saga_timeout(config.saga_timeout)
        .sweep_interval(config.sweep_interval)
        .poll_timeout(config.bus_poll_timeout)
        .build()?
        .start()
        .await?;

    info!("Atlas saga orchestrator initialized successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    runtime.shutdown().await?;
    info!("Shutdown complete");

    Ok(())
}

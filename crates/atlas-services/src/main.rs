// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Atlas Services - Control-Plane Services Server
//!
//! Consumes status events and commands from the bus, serves the HTTP API,
//! and runs the cooldown, channel, and transport sweeps.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use atlas_core::bus::{RedisStreamConsumer, RedisStreamProducer, TopicResolver};
use atlas_services::clients::Collaborators;
use atlas_services::config::Config;
use atlas_services::consumer;
use atlas_services::cooldown::RedisKv;
use atlas_services::db::{self, PgDefinitionStore, PgScriptStore, PgStorageStore};
use atlas_services::migrations;
use atlas_services::runtime::ServicesRuntime;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("atlas_services=info".parse()?),
        )
        .init();

    info!("Starting Atlas services");

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        http_addr = %config.http_addr,
        data_dir = %config.data_dir.display(),
        max_db_connections = config.max_db_connections,
        "Configuration loaded"
    );

    info!("Connecting to database...");
    let pool = db::connect(&config.database_url, config.max_db_connections).await?;
    db::health_check(&pool).await?;
    migrations::run(&pool).await?;
    info!("Database ready");

    let topics = TopicResolver::from_env();
    let subscriptions = consumer::subscriptions(&topics);
    info!(topics = ?subscriptions, "Connecting to bus...");
    let producer = RedisStreamProducer::connect(&config.redis_url).await?;
    let bus = RedisStreamConsumer::connect(&config.redis_url, subscriptions).await?;
    let kv = RedisKv::connect(&config.redis_url).await?;

    let runtime = ServicesRuntime::builder()
        .producer(Arc::new(producer))
        .consumer(Arc::new(bus))
        .topics(topics)
        .kv(Arc::new(kv))
        .scripts(Arc::new(PgScriptStore::new(pool.clone())))
        .definitions(Arc::new(PgDefinitionStore::new(pool.clone())))
        .storages(Arc::new(PgStorageStore::new(pool)))
        .collaborators(Collaborators::new(&config.collaborators)?)
        .data_dir(config.data_dir)
        .http_addr(config.http_addr)
        .poll_timeout(config.bus_poll_timeout)
        .cooldown_sweep_interval(config.cooldown_sweep_interval)
        .channel_sweep_interval(config.channel_sweep_interval)
        .transport_tick_interval(config.transport_tick_interval)
        .build()?
        .start()
        .await?;

    info!("Atlas services initialized successfully");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    runtime.shutdown().await?;
    info!("Shutdown complete");

    Ok(())
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for atlas-services.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Services configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL for the services stores (may share the orchestrator's database)
    pub database_url: String,
    /// Maximum pooled database connections
    pub max_db_connections: u32,
    /// HTTP listen address
    pub http_addr: SocketAddr,
    /// Redis URL for the bus and the cooldown store
    pub redis_url: String,
    /// Directory holding `map-actions/` and `party-quests/` seed files
    pub data_dir: PathBuf,
    /// REST collaborator base URLs
    pub collaborators: CollaboratorUrls,
    /// How often expired cooldowns are swept
    pub cooldown_sweep_interval: Duration,
    /// How often stale channels are swept
    pub channel_sweep_interval: Duration,
    /// How often transport timers are ticked
    pub transport_tick_interval: Duration,
    /// Longest a single bus poll blocks
    pub bus_poll_timeout: Duration,
}

/// Base URLs of the REST services this process calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollaboratorUrls {
    /// Party roster service (`PARTIES`)
    pub parties: String,
    /// Character state validator (`CHARACTERS`)
    pub characters: String,
    /// Static game data: spawn points, item metadata (`DATA`)
    pub data: String,
    /// Map census: characters per map (`MAPS`)
    pub maps: String,
    /// Live monsters per map (`MONSTERS`)
    pub monsters: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `ATLAS_SERVICES_DATABASE_URL` or `ATLAS_DATABASE_URL`
    ///
    /// Optional (with defaults):
    /// - `ATLAS_DB_MAX_CONNECTIONS`: pool size (default: 10)
    /// - `ATLAS_HTTP_PORT`: HTTP port (default: 8080)
    /// - `ATLAS_REDIS_URL`: bus and cooldown store (default: redis://127.0.0.1:6379)
    /// - `ATLAS_DATA_DIR`: seed file directory (default: .data)
    /// - `PARTIES`, `CHARACTERS`, `DATA`, `MAPS`, `MONSTERS`: REST base URLs
    /// - `ATLAS_COOLDOWN_SWEEP_MS` (default: 1000)
    /// - `ATLAS_CHANNEL_SWEEP_SECS` (default: 5)
    /// - `ATLAS_TRANSPORT_TICK_MS` (default: 1000)
    /// - `ATLAS_BUS_POLL_MS` (default: 500)
    pub fn from_env() -> Result<Self, ConfigError> {
        // Services may live in their own database or share the orchestrator's
        let database_url = std::env::var("ATLAS_SERVICES_DATABASE_URL")
            .or_else(|_| std::env::var("ATLAS_DATABASE_URL"))
            .map_err(|_| {
                ConfigError::Missing("ATLAS_SERVICES_DATABASE_URL or ATLAS_DATABASE_URL")
            })?;

        let max_db_connections: u32 = parse_var("ATLAS_DB_MAX_CONNECTIONS", "10")?;
        if max_db_connections == 0 {
            return Err(ConfigError::Invalid(
                "ATLAS_DB_MAX_CONNECTIONS",
                "must be a positive integer",
            ));
        }

        let port: u16 = std::env::var("ATLAS_HTTP_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("ATLAS_HTTP_PORT", "must be a valid port"))?;
        let http_addr = SocketAddr::from(([0, 0, 0, 0], port));

        let redis_url = std::env::var("ATLAS_REDIS_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let data_dir = PathBuf::from(
            std::env::var("ATLAS_DATA_DIR").unwrap_or_else(|_| ".data".to_string()),
        );

        let collaborators = CollaboratorUrls {
            parties: base_url("PARTIES"),
            characters: base_url("CHARACTERS"),
            data: base_url("DATA"),
            maps: base_url("MAPS"),
            monsters: base_url("MONSTERS"),
        };

        let cooldown_ms: u64 = parse_var("ATLAS_COOLDOWN_SWEEP_MS", "1000")?;
        let channel_secs: u64 = parse_var("ATLAS_CHANNEL_SWEEP_SECS", "5")?;
        let transport_ms: u64 = parse_var("ATLAS_TRANSPORT_TICK_MS", "1000")?;
        let bus_poll_ms: u64 = parse_var("ATLAS_BUS_POLL_MS", "500")?;

        Ok(Self {
            database_url,
            max_db_connections,
            http_addr,
            redis_url,
            data_dir,
            collaborators,
            cooldown_sweep_interval: Duration::from_millis(cooldown_ms.max(1)),
            channel_sweep_interval: Duration::from_secs(channel_secs.max(1)),
            transport_tick_interval: Duration::from_millis(transport_ms.max(1)),
            bus_poll_timeout: Duration::from_millis(bus_poll_ms),
        })
    }
}

fn base_url(name: &str) -> String {
    let host = name.to_ascii_lowercase();
    std::env::var(name).unwrap_or_else(|_| format!("http://atlas-{}:8080/api/", host))
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| ConfigError::Invalid(name, "must be a non-negative integer"))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Atlas Services - Control-Plane Services
//!
//! The tenant-scoped services that sit next to the saga orchestrator: skill
//! cooldowns, the channel registry, instanced transports, monster spawning,
//! map-action scripts, party-quest registration, and account storage upkeep.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────┐        ┌──────────────────────────────────┐
//! │  Bus (Redis streams)      │        │  HTTP (JSON:API, tenant headers) │
//! │  status events, commands  │        │  channels, storage, scripts,     │
//! └───────────────────────────┘        │  definitions, routes             │
//!              │                       └──────────────────────────────────┘
//!              ▼                                        │
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          atlas-services                                  │
//! │  ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────────┐   │
//! │  │ Channels │ │Transport │ │  Spawn   │ │   Map    │ │ Party quests │   │
//! │  │ registry │ │ instances│ │ planner  │ │ actions  │ │  + storage   │   │
//! │  └──────────┘ └──────────┘ └──────────┘ └──────────┘ └──────────────┘   │
//! │      sweepers: cooldowns (1s) · stale channels (5s) · transports (1s)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//!        │ events, warps, sagas           │ REST               │
//!        ▼                                ▼                    ▼
//! ┌──────────────────┐        ┌──────────────────────┐  ┌────────────────┐
//! │  Bus             │        │ parties, characters, │  │ PostgreSQL     │
//! │                  │        │ data, maps, monsters │  │ Redis (cooldown)│
//! └──────────────────┘        └──────────────────────┘  └────────────────┘
//! ```
//!
//! Every registry is partitioned by [`Tenant`](atlas_core::tenant::Tenant);
//! nothing written for one tenant is visible to another.
//!
//! # Configuration
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `ATLAS_SERVICES_DATABASE_URL` | Yes* | - | PostgreSQL connection string |
//! | `ATLAS_DATABASE_URL` | Yes* | - | Fallback when the above is unset |
//! | `ATLAS_DB_MAX_CONNECTIONS` | No | `10` | Pool size |
//! | `ATLAS_HTTP_PORT` | No | `8080` | HTTP listen port |
//! | `ATLAS_REDIS_URL` | No | `redis://127.0.0.1:6379` | Bus and cooldown store |
//! | `ATLAS_DATA_DIR` | No | `.data` | Seed files and `instance-routes.json` |
//! | `PARTIES`, `CHARACTERS`, `DATA`, `MAPS`, `MONSTERS` | No | `http://atlas-<name>:8080/api/` | REST base URLs |
//! | `ATLAS_COOLDOWN_SWEEP_MS` | No | `1000` | Cooldown sweep period |
//! | `ATLAS_CHANNEL_SWEEP_SECS` | No | `5` | Stale channel sweep period |
//! | `ATLAS_TRANSPORT_TICK_MS` | No | `1000` | Transport timer period |
//! | `ATLAS_BUS_POLL_MS` | No | `500` | Bus poll block time |

/// Channel server registry.
pub mod channel;

/// Background sweep of stale channel servers.
pub mod channel_monitor;

/// REST clients for remote services.
pub mod clients;

/// Server configuration loaded from environment variables.
pub mod config;

/// Bus subscriptions and message routing.
pub mod consumer;

/// Durable cooldown registry over a key-value store.
pub mod cooldown;

/// Background sweep of expired cooldowns.
pub mod cooldown_sweeper;

/// PostgreSQL stores.
pub mod db;

/// Error types with stable error codes.
pub mod error;

/// Field addressing.
pub mod field;

/// HTTP request handlers.
pub mod handlers;

/// Map-action scripts.
pub mod map_actions;

/// Embedded database migrations.
pub mod migrations;

/// Party-quest definitions and registration.
pub mod party_quest;

/// Embeddable services runtime.
pub mod runtime;

/// Seed file loading.
pub mod seed;

/// HTTP router and error mapping.
pub mod server;

/// Skill cooldowns.
pub mod skills;

/// Monster spawn planning.
pub mod spawn;

/// Account storage and arrangement.
pub mod storage;

/// Instanced transports.
pub mod transport;

/// Background transport timers.
pub mod transport_scheduler;

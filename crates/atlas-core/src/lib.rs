// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Atlas Core - Saga Orchestrator
//!
//! This crate provides the durable saga runtime of the atlas game control
//! plane, plus the tenant-scoped primitives every atlas service is built on.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 Initiators (map scripts, NPCs, transport, quests)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │ COMMAND_TOPIC_SAGA (CREATE)
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           atlas-core                                     │
//! │     validate → persist → dispatch earliest pending step → await          │
//! │          expansion of transfers · compensation · timeouts                │
//! └─────────────────────────────────────────────────────────────────────────┘
//!           │ per-action command topics                 ▲
//!           ▼                                           │ EVENT_TOPIC_SAGA_STEP
//! ┌───────────────────────┐                    ┌─────────────────────────────┐
//! │  Owning services      │───────────────────►│   STEP_COMPLETED / FAILED   │
//! │  (inventory, storage, │                    └─────────────────────────────┘
//! │   character, ...)     │
//! └───────────────────────┘
//!           │
//!           ▼
//! ┌───────────────────────┐
//! │  PostgreSQL / SQLite  │
//! │   (sagas table)       │
//! └───────────────────────┘
//! ```
//!
//! # Saga Semantics
//!
//! - Steps execute strictly in order; only the earliest pending step is ever
//!   in flight.
//! - A failed step switches the saga to compensation: completed steps are
//!   undone from the furthest back to the first, one at a time.
//! - `validate_character_state` failures end the saga without compensating.
//! - A compensator failure leaves the saga `stuck` for an operator. Commands
//!   are never retried.
//! - Outcomes for a step that is not awaiting one are discarded with a
//!   warning, which makes redelivery harmless.
//!
//! # Configuration
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `ATLAS_DATABASE_URL` | Yes | - | PostgreSQL or SQLite connection string |
//! | `ATLAS_DB_MAX_CONNECTIONS` | No | `10` | Pool size |
//! | `ATLAS_REDIS_URL` | No | `redis://127.0.0.1:6379` | Bus connection |
//! | `ATLAS_SAGA_TIMEOUT_SECS` | No | `300` | Saga progress deadline |
//! | `ATLAS_SAGA_SWEEP_INTERVAL_SECS` | No | `5` | Timeout sweep period |
//! | `ATLAS_BUS_POLL_MS` | No | `500` | Bus poll block time |
//!
//! Topic names come from environment variables named in [`topic`]; an unset
//! variable falls back to its own name.

/// Message bus: envelopes, producers, consumers, topic resolution.
pub mod bus;

/// Time source shared by sweeps, registries, and the saga runtime.
pub mod clock;

/// Compensator catalog.
pub mod compensation;

/// Server configuration loaded from environment variables.
pub mod config;

/// Error types with stable error codes.
pub mod error;

/// Consumer loop feeding bus messages to a handler.
pub mod listener;

/// Embedded database migrations.
pub mod migrations;

/// Saga state machine runtime.
pub mod orchestrator;

/// Saga storage backends.
pub mod persistence;

/// Tenant-partitioned in-memory registry.
pub mod registry;

/// Embeddable orchestrator runtime.
pub mod runtime;

/// Saga model: steps, actions, expansion, events.
pub mod saga;

/// Tenant identity.
pub mod tenant;

/// Background saga timeout sweep.
pub mod timeout_monitor;

/// Topic environment variable names.
pub mod topic;

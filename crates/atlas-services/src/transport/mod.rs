// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instanced transport scheduler.
//!
//! ```text
//!            boarding window expires
//!   Boarding ───────────────────────► InTransit
//!      │                                  │ arrival time reached
//!      │ last passenger leaves            ▼
//!      ▼                              warp to destination, COMPLETED
//!   released                          per passenger, released
//!
//!   (older than 2 * (boarding + travel): warp to start, CANCELLED(STUCK))
//! ```

pub mod instance;
pub mod processor;
pub mod route;

pub use self::instance::{
    CharacterEntry, Departure, InstanceRegistry, InstanceState, TransportInstance,
};
pub use self::processor::{
    CancelReason, RouteState, RouteStatus, StartTransportCommand, TransportProcessor,
};
pub use self::route::{RouteRegistry, TransportRoute};

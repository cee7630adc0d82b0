// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Account storage compartments and their merge-and-sort.

pub mod merge;
pub mod model;
pub mod service;
pub mod store;

pub use self::merge::{Arrangement, DEFAULT_SLOT_MAX, ItemTemplate};
pub use self::model::{Asset, Compartment, ReferenceType, Stack};
pub use self::service::{CreateCompartment, ItemDataSource, StorageService};
pub use self::store::{MemoryStorageStore, StorageStore};

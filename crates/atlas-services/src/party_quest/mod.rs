// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Party quests: definitions, their validation, and registration.

pub mod definition;
pub mod registration;
pub mod store;

pub use self::definition::{PartyQuestDefinition, StoredDefinition, ValidationReport};
pub use self::registration::{
    PartiesClient, Party, PartyMember, RegisterBody, RegistrationCode, RegistrationRequest,
    RegistrationValidator,
};
pub use self::store::{DefinitionStore, MemoryDefinitionStore, PartyQuestDefinitions};

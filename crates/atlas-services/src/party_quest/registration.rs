// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Party-quest registration guard.
//!
//! A `REGISTER` command is only emitted once the initiating character is the
//! leader of a party that meets every start requirement of the quest.
//! Refusals carry a [`RegistrationCode`] so callers never match on text.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use atlas_core::bus::{Envelope, MessageBuffer, Producer, TopicResolver};
use atlas_core::tenant::Tenant;
use atlas_core::topic;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::store::DefinitionStore;
use crate::error::{Error, Result};

pub const COMMAND_REGISTER: &str = "REGISTER";

/// Why a registration was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationCode {
    NotInParty,
    NotLeader,
    DefinitionNotFound,
    PartySizeFailed,
    LevelMinFailed,
    LevelMaxFailed,
    /// A collaborator could not be reached.
    Unknown,
}

impl RegistrationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotInParty => "NOT_IN_PARTY",
            Self::NotLeader => "NOT_LEADER",
            Self::DefinitionNotFound => "DEFINITION_NOT_FOUND",
            Self::PartySizeFailed => "PARTY_SIZE_FAILED",
            Self::LevelMinFailed => "LEVEL_MIN_FAILED",
            Self::LevelMaxFailed => "LEVEL_MAX_FAILED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for RegistrationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    pub id: u32,
    pub leader_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyMember {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    pub level: u16,
}

/// The parties service.
#[async_trait]
pub trait PartiesClient: Send + Sync {
    /// Party the character belongs to, if any.
    async fn party_of(&self, tenant: &Tenant, character_id: u32) -> Result<Option<Party>>;
    async fn members(&self, tenant: &Tenant, party_id: u32) -> Result<Vec<PartyMember>>;
}

/// A registration attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub character_id: u32,
    pub world_id: u8,
    pub channel_id: u8,
    pub map_id: u32,
    pub quest_id: String,
}

/// Body of the `REGISTER` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBody {
    pub quest_id: String,
    pub party_id: u32,
    pub channel_id: u8,
    pub map_id: u32,
}

fn refuse(code: RegistrationCode, message: impl Into<String>) -> Error {
    Error::party_quest(code, message)
}

fn unreachable_collaborator(e: Error) -> Error {
    refuse(RegistrationCode::Unknown, e.to_string())
}

/// Validates registrations and emits `REGISTER`.
pub struct RegistrationValidator {
    parties: Arc<dyn PartiesClient>,
    definitions: Arc<dyn DefinitionStore>,
    producer: Arc<dyn Producer>,
    topics: TopicResolver,
}

impl RegistrationValidator {
    pub fn new(
        parties: Arc<dyn PartiesClient>,
        definitions: Arc<dyn DefinitionStore>,
        producer: Arc<dyn Producer>,
        topics: TopicResolver,
    ) -> Self {
        Self {
            parties,
            definitions,
            producer,
            topics,
        }
    }

    /// Check a registration without emitting anything.
    pub async fn validate(&self, tenant: &Tenant, request: &RegistrationRequest) -> Result<RegisterBody> {
        let party = self
            .parties
            .party_of(tenant, request.character_id)
            .await
            .map_err(unreachable_collaborator)?
            .ok_or_else(|| {
                refuse(
                    RegistrationCode::NotInParty,
                    format!("character {} is not in a party", request.character_id),
                )
            })?;

        if party.leader_id != request.character_id {
            return Err(refuse(
                RegistrationCode::NotLeader,
                format!(
                    "character {} does not lead party {}",
                    request.character_id, party.id
                ),
            ));
        }

        let definition = self
            .definitions
            .by_quest_id(tenant, &request.quest_id)
            .await
            .map_err(unreachable_collaborator)?
            .ok_or_else(|| {
                refuse(
                    RegistrationCode::DefinitionNotFound,
                    format!("no party quest {}", request.quest_id),
                )
            })?
            .definition;

        let members = self
            .parties
            .members(tenant, party.id)
            .await
            .map_err(unreachable_collaborator)?;

        for requirement in &definition.start_requirements {
            match requirement.kind.as_str() {
                "party_size" => {
                    if !requirement.satisfied_by(members.len() as i64) {
                        return Err(refuse(
                            RegistrationCode::PartySizeFailed,
                            format!(
                                "party has {} members, requires {} {}",
                                members.len(),
                                requirement.operator,
                                requirement.value
                            ),
                        ));
                    }
                }
                "level_min" | "level_max" => {
                    let code = if requirement.kind == "level_min" {
                        RegistrationCode::LevelMinFailed
                    } else {
                        RegistrationCode::LevelMaxFailed
                    };
                    if let Some(member) = members
                        .iter()
                        .find(|m| !requirement.satisfied_by(i64::from(m.level)))
                    {
                        return Err(refuse(
                            code,
                            format!(
                                "member {} at level {} fails {} {} {}",
                                member.id,
                                member.level,
                                requirement.kind,
                                requirement.operator,
                                requirement.value
                            ),
                        ));
                    }
                }
                other => debug!(requirement = other, "Skipping unknown start requirement"),
            }
        }

        Ok(RegisterBody {
            quest_id: definition.quest_id,
            party_id: party.id,
            channel_id: request.channel_id,
            map_id: request.map_id,
        })
    }

    /// Validate and, when accepted, emit `REGISTER`.
    #[instrument(skip(self, request), fields(tenant_id = %tenant.id, character_id = request.character_id, quest_id = %request.quest_id))]
    pub async fn register(&self, tenant: &Tenant, request: &RegistrationRequest) -> Result<RegisterBody> {
        let body = self.validate(tenant, request).await?;

        let mut buffer = MessageBuffer::new(tenant);
        buffer.put(
            self.topics.resolve(topic::COMMAND_TOPIC_PARTY_QUEST),
            &Envelope::for_character(
                request.world_id,
                request.character_id,
                COMMAND_REGISTER,
                body.clone(),
            ),
        )?;
        buffer.flush(self.producer.as_ref()).await?;

        info!(party_id = body.party_id, "Party quest registration accepted");
        Ok(body)
    }
}

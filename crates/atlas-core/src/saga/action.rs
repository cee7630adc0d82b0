// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Action catalog.
//!
//! Each step carries one [`Action`]: a discriminator plus its typed payload.
//! The runtime never looks inside a payload. It asks the catalog three
//! questions: what command does this action issue ([`Action::dispatch`]),
//! does it expand into lower-level steps, and does it wait for an event
//! instead of issuing a command.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::bus::Envelope;
use crate::error::Result;
use crate::topic;

/// Item description used by award and create-and-equip actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPayload {
    pub template_id: u32,
    pub quantity: u32,
    #[serde(default)]
    pub period: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

/// One condition checked by the character-state validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionInput {
    #[serde(rename = "type")]
    pub kind: String,
    pub operator: String,
    pub value: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardAssetPayload {
    pub character_id: u32,
    pub item: ItemPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroyAssetPayload {
    pub character_id: u32,
    pub template_id: u32,
    pub quantity: u32,
    #[serde(default)]
    pub remove_all: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroyAssetFromSlotPayload {
    pub character_id: u32,
    pub inventory_type: u8,
    pub slot: i16,
    pub quantity: u32,
}

/// Equip and unequip share a shape: move from `source` to `destination`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveAssetPayload {
    pub character_id: u32,
    pub inventory_type: u8,
    pub source: i16,
    pub destination: i16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAndEquipAssetPayload {
    pub character_id: u32,
    pub item: ItemPayload,
}

/// Signed amount applied to a character attribute (mesos, fame).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterAmountPayload {
    pub character_id: u32,
    pub world_id: u8,
    pub channel_id: u8,
    pub amount: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceDistribution {
    #[serde(rename = "experienceType")]
    pub kind: String,
    pub amount: u32,
    #[serde(default)]
    pub attr1: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardExperiencePayload {
    pub character_id: u32,
    pub world_id: u8,
    pub channel_id: u8,
    pub distributions: Vec<ExperienceDistribution>,
}

/// Unsigned amount applied to a character attribute (levels, deducted experience, HP).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterValuePayload {
    pub character_id: u32,
    pub world_id: u8,
    pub channel_id: u8,
    pub amount: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeJobPayload {
    pub character_id: u32,
    pub world_id: u8,
    pub channel_id: u8,
    pub job_id: u16,
}

/// Hair, face and skin changes.
///
/// `previousStyleId` is filled by the submitter when it knows the current
/// look; without it the change cannot be undone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeStylePayload {
    pub character_id: u32,
    pub world_id: u8,
    pub channel_id: u8,
    pub style_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_style_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarpToPortalPayload {
    pub character_id: u32,
    pub world_id: u8,
    pub channel_id: u8,
    pub map_id: u32,
    #[serde(default)]
    pub instance: Uuid,
    #[serde(default)]
    pub portal_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portal_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarpToRandomPortalPayload {
    pub character_id: u32,
    pub world_id: u8,
    pub channel_id: u8,
    pub map_id: u32,
    #[serde(default)]
    pub instance: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCharacterPayload {
    pub account_id: u32,
    pub world_id: u8,
    pub name: String,
    pub gender: u8,
    pub job_id: u16,
    pub face: u32,
    pub hair: u32,
    pub skin: u8,
    pub top: u32,
    pub bottom: u32,
    pub shoes: u32,
    pub weapon: u32,
    pub map_id: u32,
}

/// Blocks until the named character is created. Issues no command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwaitCharacterCreatedPayload {
    pub character_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_saga_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_character_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateCharacterStatePayload {
    pub character_id: u32,
    pub conditions: Vec<ConditionInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillPayload {
    pub character_id: u32,
    pub world_id: u8,
    pub skill_id: u32,
    pub level: u8,
    pub master_level: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestPayload {
    pub character_id: u32,
    pub world_id: u8,
    pub quest_id: u32,
    pub npc_id: u32,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnMonsterPayload {
    pub character_id: u32,
    pub world_id: u8,
    pub channel_id: u8,
    pub map_id: u32,
    #[serde(default)]
    pub instance: Uuid,
    pub monster_id: u32,
    pub x: i16,
    pub y: i16,
    #[serde(default)]
    pub team: i8,
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_count() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub character_id: u32,
    pub world_id: u8,
    pub channel_id: u8,
    pub message_type: String,
    pub message: String,
}

/// Client-side effect addressed to one character (intro, field effect).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterEffectPayload {
    pub character_id: u32,
    pub world_id: u8,
    pub channel_id: u8,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldEffectWeatherPayload {
    pub character_id: u32,
    pub world_id: u8,
    pub channel_id: u8,
    pub map_id: u32,
    #[serde(default)]
    pub instance: Uuid,
    pub item_id: u32,
    pub message: String,
    /// Seconds.
    pub duration: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositToStoragePayload {
    pub character_id: u32,
    pub account_id: u32,
    pub world_id: u8,
    pub slot: i16,
    pub template_id: u32,
    pub reference_id: u32,
    pub reference_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    pub owner_id: u32,
    #[serde(default)]
    pub flag: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackStorageDepositPayload {
    pub character_id: u32,
    pub account_id: u32,
    pub world_id: u8,
    pub asset_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MesosOperation {
    Set,
    Add,
    Subtract,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStorageMesosPayload {
    pub character_id: u32,
    pub account_id: u32,
    pub world_id: u8,
    pub operation: MesosOperation,
    pub mesos: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowStoragePayload {
    pub character_id: u32,
    pub npc_id: u32,
    pub world_id: u8,
    pub channel_id: u8,
    pub account_id: u32,
}

/// High level: move an item from a character inventory slot into storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferToStoragePayload {
    pub transaction_id: Uuid,
    pub character_id: u32,
    pub world_id: u8,
    pub account_id: u32,
    pub source_slot: i16,
    pub source_inventory_type: u8,
    pub quantity: u32,
}

/// High level: move an item from a storage slot into a character inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawFromStoragePayload {
    pub transaction_id: Uuid,
    pub character_id: u32,
    pub world_id: u8,
    pub account_id: u32,
    pub source_slot: i16,
    pub inventory_type: u8,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptToStoragePayload {
    pub transaction_id: Uuid,
    pub world_id: u8,
    pub account_id: u32,
    pub character_id: u32,
    pub source_inventory_type: u8,
    pub source_slot: i16,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseFromStoragePayload {
    pub transaction_id: Uuid,
    pub world_id: u8,
    pub account_id: u32,
    pub character_id: u32,
    #[serde(default)]
    pub source_slot: i16,
    /// Zero when the asset is addressed by slot.
    #[serde(default)]
    pub asset_id: u32,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptToCharacterPayload {
    pub transaction_id: Uuid,
    pub character_id: u32,
    pub world_id: u8,
    pub account_id: u32,
    pub inventory_type: u8,
    /// Storage slot the item comes from. Unused for cash items.
    #[serde(default)]
    pub source_slot: i16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash_id: Option<i64>,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseFromCharacterPayload {
    pub transaction_id: Uuid,
    pub character_id: u32,
    pub world_id: u8,
    pub inventory_type: u8,
    #[serde(default)]
    pub source_slot: i16,
    /// Zero when the asset is addressed by slot.
    #[serde(default)]
    pub asset_id: u32,
    pub quantity: u32,
}

/// High level: move a cash item from a character inventory into the cash shop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferToCashShopPayload {
    pub transaction_id: Uuid,
    pub character_id: u32,
    pub account_id: u32,
    pub cash_id: i64,
    pub source_inventory_type: u8,
    pub source_slot: i16,
    pub compartment_type: u8,
}

/// High level: move a cash item from the cash shop into a character inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawFromCashShopPayload {
    pub transaction_id: Uuid,
    pub character_id: u32,
    pub account_id: u32,
    pub cash_id: i64,
    pub compartment_type: u8,
    pub inventory_type: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptToCashShopPayload {
    pub transaction_id: Uuid,
    pub character_id: u32,
    pub account_id: u32,
    pub compartment_type: u8,
    pub cash_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseFromCashShopPayload {
    pub transaction_id: Uuid,
    pub character_id: u32,
    pub account_id: u32,
    pub compartment_type: u8,
    pub cash_id: i64,
    /// Zero when the asset is addressed by cash id.
    #[serde(default)]
    pub asset_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartInstanceTransportPayload {
    pub character_id: u32,
    pub world_id: u8,
    pub channel_id: u8,
    pub route_name: String,
}

/// A step's action: discriminator plus typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Action {
    AwardAsset(AwardAssetPayload),
    DestroyAsset(DestroyAssetPayload),
    DestroyAssetFromSlot(DestroyAssetFromSlotPayload),
    EquipAsset(MoveAssetPayload),
    UnequipAsset(MoveAssetPayload),
    CreateAndEquipAsset(CreateAndEquipAssetPayload),
    AwardExperience(AwardExperiencePayload),
    DeductExperience(CharacterValuePayload),
    AwardLevel(CharacterValuePayload),
    AwardMesos(CharacterAmountPayload),
    AwardFame(CharacterAmountPayload),
    SetHp(CharacterValuePayload),
    ChangeJob(ChangeJobPayload),
    ChangeHair(ChangeStylePayload),
    ChangeFace(ChangeStylePayload),
    ChangeSkin(ChangeStylePayload),
    WarpToPortal(WarpToPortalPayload),
    WarpToRandomPortal(WarpToRandomPortalPayload),
    CreateCharacter(CreateCharacterPayload),
    AwaitCharacterCreated(AwaitCharacterCreatedPayload),
    ValidateCharacterState(ValidateCharacterStatePayload),
    CreateSkill(SkillPayload),
    UpdateSkill(SkillPayload),
    StartQuest(QuestPayload),
    CompleteQuest(QuestPayload),
    SpawnMonster(SpawnMonsterPayload),
    SendMessage(SendMessagePayload),
    ShowIntro(CharacterEffectPayload),
    FieldEffect(CharacterEffectPayload),
    FieldEffectWeather(FieldEffectWeatherPayload),
    DepositToStorage(DepositToStoragePayload),
    RollbackStorageDeposit(RollbackStorageDepositPayload),
    UpdateStorageMesos(UpdateStorageMesosPayload),
    ShowStorage(ShowStoragePayload),
    TransferToStorage(TransferToStoragePayload),
    WithdrawFromStorage(WithdrawFromStoragePayload),
    AcceptToStorage(AcceptToStoragePayload),
    ReleaseFromStorage(ReleaseFromStoragePayload),
    AcceptToCharacter(AcceptToCharacterPayload),
    ReleaseFromCharacter(ReleaseFromCharacterPayload),
    TransferToCashShop(TransferToCashShopPayload),
    WithdrawFromCashShop(WithdrawFromCashShopPayload),
    AcceptToCashShop(AcceptToCashShopPayload),
    ReleaseFromCashShop(ReleaseFromCashShopPayload),
    StartInstanceTransport(StartInstanceTransportPayload),
}

/// Who a command is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    Character(u32),
    Account(u32),
}

/// A command ready to be put on the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    /// Topic variable.
    pub topic: &'static str,
    /// Envelope; the body is the payload with `stepId` merged in.
    pub envelope: Envelope<Value>,
}

impl Action {
    /// Snake-case discriminator, as persisted.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AwardAsset(_) => "award_asset",
            Self::DestroyAsset(_) => "destroy_asset",
            Self::DestroyAssetFromSlot(_) => "destroy_asset_from_slot",
            Self::EquipAsset(_) => "equip_asset",
            Self::UnequipAsset(_) => "unequip_asset",
            Self::CreateAndEquipAsset(_) => "create_and_equip_asset",
            Self::AwardExperience(_) => "award_experience",
            Self::DeductExperience(_) => "deduct_experience",
            Self::AwardLevel(_) => "award_level",
            Self::AwardMesos(_) => "award_mesos",
            Self::AwardFame(_) => "award_fame",
            Self::SetHp(_) => "set_hp",
            Self::ChangeJob(_) => "change_job",
            Self::ChangeHair(_) => "change_hair",
            Self::ChangeFace(_) => "change_face",
            Self::ChangeSkin(_) => "change_skin",
            Self::WarpToPortal(_) => "warp_to_portal",
            Self::WarpToRandomPortal(_) => "warp_to_random_portal",
            Self::CreateCharacter(_) => "create_character",
            Self::AwaitCharacterCreated(_) => "await_character_created",
            Self::ValidateCharacterState(_) => "validate_character_state",
            Self::CreateSkill(_) => "create_skill",
            Self::UpdateSkill(_) => "update_skill",
            Self::StartQuest(_) => "start_quest",
            Self::CompleteQuest(_) => "complete_quest",
            Self::SpawnMonster(_) => "spawn_monster",
            Self::SendMessage(_) => "send_message",
            Self::ShowIntro(_) => "show_intro",
            Self::FieldEffect(_) => "field_effect",
            Self::FieldEffectWeather(_) => "field_effect_weather",
            Self::DepositToStorage(_) => "deposit_to_storage",
            Self::RollbackStorageDeposit(_) => "rollback_storage_deposit",
            Self::UpdateStorageMesos(_) => "update_storage_mesos",
            Self::ShowStorage(_) => "show_storage",
            Self::TransferToStorage(_) => "transfer_to_storage",
            Self::WithdrawFromStorage(_) => "withdraw_from_storage",
            Self::AcceptToStorage(_) => "accept_to_storage",
            Self::ReleaseFromStorage(_) => "release_from_storage",
            Self::AcceptToCharacter(_) => "accept_to_character",
            Self::ReleaseFromCharacter(_) => "release_from_character",
            Self::TransferToCashShop(_) => "transfer_to_cash_shop",
            Self::WithdrawFromCashShop(_) => "withdraw_from_cash_shop",
            Self::AcceptToCashShop(_) => "accept_to_cash_shop",
            Self::ReleaseFromCashShop(_) => "release_from_cash_shop",
            Self::StartInstanceTransport(_) => "start_instance_transport",
        }
    }

    /// High-level actions replaced by lower-level steps at execution time.
    pub fn is_expandable(&self) -> bool {
        matches!(
            self,
            Self::TransferToStorage(_)
                | Self::WithdrawFromStorage(_)
                | Self::TransferToCashShop(_)
                | Self::WithdrawFromCashShop(_)
        )
    }

    /// Actions that issue no command and only wait for a correlated event.
    pub fn is_awaiting(&self) -> bool {
        matches!(self, Self::AwaitCharacterCreated(_))
    }

    /// Failure ends the saga without compensating earlier steps.
    pub fn fails_terminally(&self) -> bool {
        matches!(self, Self::ValidateCharacterState(_))
    }

    /// Fold a completed step's result into the payload.
    ///
    /// Only awaiting steps carry fields that are learned from the outcome.
    pub fn absorb_result(&mut self, result: &Value) {
        if let Self::AwaitCharacterCreated(p) = self {
            if let Some(id) = result.get("characterId").and_then(Value::as_u64) {
                p.created_character_id = u32::try_from(id).ok();
            }
        }
    }

    /// Build the command this action issues.
    ///
    /// Returns `None` for awaiting and expandable actions.
    pub fn dispatch(&self, transaction_id: Uuid, step_id: &str) -> Result<Option<Dispatch>> {
        use Subject::{Account, Character};

        let (topic, kind, subject, world_id, body) = match self {
            Self::AwaitCharacterCreated(_)
            | Self::TransferToStorage(_)
            | Self::WithdrawFromStorage(_)
            | Self::TransferToCashShop(_)
            | Self::WithdrawFromCashShop(_) => return Ok(None),

            Self::AwardAsset(p) => (
                topic::COMMAND_TOPIC_COMPARTMENT,
                "CREATE_ASSET",
                Character(p.character_id),
                0,
                serde_json::to_value(p)?,
            ),
            Self::DestroyAsset(p) => (
                topic::COMMAND_TOPIC_COMPARTMENT,
                "DESTROY_ASSET",
                Character(p.character_id),
                0,
                serde_json::to_value(p)?,
            ),
            Self::DestroyAssetFromSlot(p) => (
                topic::COMMAND_TOPIC_COMPARTMENT,
                "DESTROY_ASSET_FROM_SLOT",
                Character(p.character_id),
                0,
                serde_json::to_value(p)?,
            ),
            Self::EquipAsset(p) => (
                topic::COMMAND_TOPIC_COMPARTMENT,
                "EQUIP",
                Character(p.character_id),
                0,
                serde_json::to_value(p)?,
            ),
            Self::UnequipAsset(p) => (
                topic::COMMAND_TOPIC_COMPARTMENT,
                "UNEQUIP",
                Character(p.character_id),
                0,
                serde_json::to_value(p)?,
            ),
            Self::CreateAndEquipAsset(p) => (
                topic::COMMAND_TOPIC_COMPARTMENT,
                "CREATE_AND_EQUIP",
                Character(p.character_id),
                0,
                serde_json::to_value(p)?,
            ),
            Self::AwardExperience(p) => (
                topic::COMMAND_TOPIC_CHARACTER,
                "AWARD_EXPERIENCE",
                Character(p.character_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::DeductExperience(p) => (
                topic::COMMAND_TOPIC_CHARACTER,
                "DEDUCT_EXPERIENCE",
                Character(p.character_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::AwardLevel(p) => (
                topic::COMMAND_TOPIC_CHARACTER,
                "AWARD_LEVEL",
                Character(p.character_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::AwardMesos(p) => (
                topic::COMMAND_TOPIC_CHARACTER,
                "REQUEST_CHANGE_MESO",
                Character(p.character_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::AwardFame(p) => (
                topic::COMMAND_TOPIC_CHARACTER,
                "REQUEST_CHANGE_FAME",
                Character(p.character_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::SetHp(p) => (
                topic::COMMAND_TOPIC_CHARACTER,
                "SET_HP",
                Character(p.character_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::ChangeJob(p) => (
                topic::COMMAND_TOPIC_CHARACTER,
                "CHANGE_JOB",
                Character(p.character_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::ChangeHair(p) => (
                topic::COMMAND_TOPIC_CHARACTER,
                "CHANGE_HAIR",
                Character(p.character_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::ChangeFace(p) => (
                topic::COMMAND_TOPIC_CHARACTER,
                "CHANGE_FACE",
                Character(p.character_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::ChangeSkin(p) => (
                topic::COMMAND_TOPIC_CHARACTER,
                "CHANGE_SKIN",
                Character(p.character_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::WarpToPortal(p) => (
                topic::COMMAND_TOPIC_CHARACTER,
                "CHANGE_MAP",
                Character(p.character_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::WarpToRandomPortal(p) => (
                topic::COMMAND_TOPIC_CHARACTER,
                "CHANGE_MAP_RANDOM_PORTAL",
                Character(p.character_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::CreateCharacter(p) => (
                topic::COMMAND_TOPIC_CHARACTER,
                "CREATE_CHARACTER",
                Account(p.account_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::ValidateCharacterState(p) => (
                topic::COMMAND_TOPIC_VALIDATION,
                "VALIDATE",
                Character(p.character_id),
                0,
                serde_json::to_value(p)?,
            ),
            Self::CreateSkill(p) => (
                topic::COMMAND_TOPIC_SKILL,
                "REQUEST_CREATE",
                Character(p.character_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::UpdateSkill(p) => (
                topic::COMMAND_TOPIC_SKILL,
                "REQUEST_UPDATE",
                Character(p.character_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::StartQuest(p) => (
                topic::COMMAND_TOPIC_QUEST,
                "START",
                Character(p.character_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::CompleteQuest(p) => (
                topic::COMMAND_TOPIC_QUEST,
                "COMPLETE",
                Character(p.character_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::SpawnMonster(p) => (
                topic::COMMAND_TOPIC_MONSTER,
                "SPAWN",
                Character(p.character_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::SendMessage(p) => (
                topic::COMMAND_TOPIC_SYSTEM_MESSAGE,
                "SEND_MESSAGE",
                Character(p.character_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::ShowIntro(p) => (
                topic::COMMAND_TOPIC_SYSTEM_MESSAGE,
                "SHOW_INTRO",
                Character(p.character_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::FieldEffect(p) => (
                topic::COMMAND_TOPIC_SYSTEM_MESSAGE,
                "FIELD_EFFECT",
                Character(p.character_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::FieldEffectWeather(p) => (
                topic::COMMAND_TOPIC_MAP,
                "WEATHER_START",
                Character(p.character_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::DepositToStorage(p) => (
                topic::COMMAND_TOPIC_STORAGE,
                "DEPOSIT",
                Account(p.account_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::RollbackStorageDeposit(p) => (
                topic::COMMAND_TOPIC_STORAGE,
                "DEPOSIT_ROLLBACK",
                Account(p.account_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::UpdateStorageMesos(p) => (
                topic::COMMAND_TOPIC_STORAGE,
                "UPDATE_MESOS",
                Account(p.account_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::ShowStorage(p) => (
                topic::COMMAND_TOPIC_STORAGE,
                "SHOW_STORAGE",
                Character(p.character_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::AcceptToStorage(p) => (
                topic::COMMAND_TOPIC_STORAGE,
                "ACCEPT",
                Account(p.account_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::ReleaseFromStorage(p) => (
                topic::COMMAND_TOPIC_STORAGE,
                "RELEASE",
                Account(p.account_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::AcceptToCharacter(p) => (
                topic::COMMAND_TOPIC_COMPARTMENT,
                "ACCEPT",
                Character(p.character_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::ReleaseFromCharacter(p) => (
                topic::COMMAND_TOPIC_COMPARTMENT,
                "RELEASE",
                Character(p.character_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
            Self::AcceptToCashShop(p) => (
                topic::COMMAND_TOPIC_CASH_SHOP,
                "ACCEPT",
                Account(p.account_id),
                0,
                serde_json::to_value(p)?,
            ),
            Self::ReleaseFromCashShop(p) => (
                topic::COMMAND_TOPIC_CASH_SHOP,
                "RELEASE",
                Account(p.account_id),
                0,
                serde_json::to_value(p)?,
            ),
            Self::StartInstanceTransport(p) => (
                topic::COMMAND_TOPIC_TRANSPORT,
                "START",
                Character(p.character_id),
                p.world_id,
                serde_json::to_value(p)?,
            ),
        };

        let body = with_step_id(body, step_id);
        let envelope = match subject {
            Character(id) => Envelope::for_character(world_id, id, kind, body),
            Account(id) => Envelope::for_account(world_id, id, kind, body),
        }
        .with_transaction(transaction_id);

        Ok(Some(Dispatch { topic, envelope }))
    }
}

fn with_step_id(mut body: Value, step_id: &str) -> Value {
    if let Value::Object(map) = &mut body {
        map.insert("stepId".to_string(), Value::String(step_id.to_string()));
    }
    body
}

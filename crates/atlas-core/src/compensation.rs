// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compensator catalog.
//!
//! Maps each completed forward step to the command that undoes it. The runtime
//! walks completed steps from the furthest back to the first and asks this
//! catalog what to do with each one.
//!
//! | Forward action            | Compensator                                      |
//! |---------------------------|--------------------------------------------------|
//! | `award_asset`             | `destroy_asset` (same template and quantity)     |
//! | `create_and_equip_asset`  | `destroy_asset` (same template and quantity)     |
//! | `destroy_asset`           | `award_asset` (same template and quantity)       |
//! | `equip_asset`             | `unequip_asset` (source and destination swapped) |
//! | `unequip_asset`           | `equip_asset` (source and destination swapped)   |
//! | `award_mesos`, `award_fame` | same action, negated amount                    |
//! | `award_level`             | none                                             |
//! | `award_experience`        | `deduct_experience` (sum of distributions)       |
//! | `change_hair/face/skin`   | same action back to `previousStyleId`, if known  |
//! | `deposit_to_storage`      | `rollback_storage_deposit` (asset id from result) |
//! | `update_storage_mesos`    | inverse `ADD`/`SUBTRACT`; `SET` has none         |
//! | `accept_to_storage`       | `release_from_storage` (asset id from result)    |
//! | `accept_to_character`     | `release_from_character` (asset id from result)  |
//! | `accept_to_cash_shop`     | `release_from_cash_shop` (asset id from result)  |
//! | `validate_character_state`| terminal: the saga fails without compensating    |
//! | everything else           | none                                             |
//!
//! "None" means the step is marked undone immediately and compensation moves
//! on to the previous step.

use serde_json::Value;

use crate::saga::Step;
use crate::saga::action::{
    Action, AwardAssetPayload, ChangeStylePayload, CharacterAmountPayload, CharacterValuePayload,
    DestroyAssetPayload, ItemPayload, MesosOperation, MoveAssetPayload,
    ReleaseFromCashShopPayload, ReleaseFromCharacterPayload, ReleaseFromStoragePayload,
    RollbackStorageDepositPayload, UpdateStorageMesosPayload,
};

/// What compensation does for one completed step.
#[derive(Debug, Clone, PartialEq)]
pub enum Compensation {
    /// Issue this command and wait for its outcome.
    Undo(Action),
    /// Nothing to undo.
    Nothing,
}

impl Compensation {
    /// Returns the string representation, for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Undo(_) => "undo",
            Self::Nothing => "nothing",
        }
    }
}

/// Compensator for a completed step.
pub fn compensation_for(step: &Step) -> Compensation {
    let result = step.result.as_ref();

    let undo = match &step.action {
        Action::AwardAsset(p) => Some(destroy(p.character_id, &p.item)),
        Action::CreateAndEquipAsset(p) => Some(destroy(p.character_id, &p.item)),
        Action::DestroyAsset(p) => Some(Action::AwardAsset(AwardAssetPayload {
            character_id: p.character_id,
            item: ItemPayload {
                template_id: p.template_id,
                quantity: p.quantity,
                period: 0,
                expiration: None,
            },
        })),
        Action::EquipAsset(p) => Some(Action::UnequipAsset(swapped(p))),
        Action::UnequipAsset(p) => Some(Action::EquipAsset(swapped(p))),
        Action::AwardMesos(p) => Some(Action::AwardMesos(negated(p))),
        Action::AwardFame(p) => Some(Action::AwardFame(negated(p))),
        Action::AwardExperience(p) => {
            let amount: u32 = p.distributions.iter().map(|d| d.amount).sum();
            (amount > 0).then(|| {
                Action::DeductExperience(CharacterValuePayload {
                    character_id: p.character_id,
                    world_id: p.world_id,
                    channel_id: p.channel_id,
                    amount,
                })
            })
        }
        Action::ChangeHair(p) => restyle(p).map(Action::ChangeHair),
        Action::ChangeFace(p) => restyle(p).map(Action::ChangeFace),
        Action::ChangeSkin(p) => restyle(p).map(Action::ChangeSkin),
        Action::DepositToStorage(p) => asset_id(result).map(|asset_id| {
            Action::RollbackStorageDeposit(RollbackStorageDepositPayload {
                character_id: p.character_id,
                account_id: p.account_id,
                world_id: p.world_id,
                asset_id,
            })
        }),
        Action::UpdateStorageMesos(p) => {
            let inverse = match p.operation {
                MesosOperation::Add => Some(MesosOperation::Subtract),
                MesosOperation::Subtract => Some(MesosOperation::Add),
                MesosOperation::Set => None,
            };
            inverse.map(|operation| {
                Action::UpdateStorageMesos(UpdateStorageMesosPayload {
                    operation,
                    ..p.clone()
                })
            })
        }
        Action::AcceptToStorage(p) => {
            Some(Action::ReleaseFromStorage(ReleaseFromStoragePayload {
                transaction_id: p.transaction_id,
                world_id: p.world_id,
                account_id: p.account_id,
                character_id: p.character_id,
                source_slot: slot(result),
                asset_id: asset_id(result).unwrap_or(0),
                quantity: p.quantity,
            }))
        }
        Action::AcceptToCharacter(p) => {
            Some(Action::ReleaseFromCharacter(ReleaseFromCharacterPayload {
                transaction_id: p.transaction_id,
                character_id: p.character_id,
                world_id: p.world_id,
                inventory_type: p.inventory_type,
                source_slot: slot(result),
                asset_id: asset_id(result).unwrap_or(0),
                quantity: p.quantity,
            }))
        }
        Action::AcceptToCashShop(p) => {
            Some(Action::ReleaseFromCashShop(ReleaseFromCashShopPayload {
                transaction_id: p.transaction_id,
                character_id: p.character_id,
                account_id: p.account_id,
                compartment_type: p.compartment_type,
                cash_id: p.cash_id,
                asset_id: asset_id(result).unwrap_or(0),
            }))
        }
        _ => None,
    };

    match undo {
        Some(action) => Compensation::Undo(action),
        None => Compensation::Nothing,
    }
}

fn destroy(character_id: u32, item: &ItemPayload) -> Action {
    Action::DestroyAsset(DestroyAssetPayload {
        character_id,
        template_id: item.template_id,
        quantity: item.quantity,
        remove_all: false,
    })
}

fn swapped(p: &MoveAssetPayload) -> MoveAssetPayload {
    MoveAssetPayload {
        character_id: p.character_id,
        inventory_type: p.inventory_type,
        source: p.destination,
        destination: p.source,
    }
}

fn negated(p: &CharacterAmountPayload) -> CharacterAmountPayload {
    CharacterAmountPayload {
        amount: -p.amount,
        ..p.clone()
    }
}

fn restyle(p: &ChangeStylePayload) -> Option<ChangeStylePayload> {
    p.previous_style_id.map(|previous| ChangeStylePayload {
        style_id: previous,
        previous_style_id: Some(p.style_id),
        ..p.clone()
    })
}

fn asset_id(result: Option<&Value>) -> Option<u32> {
    result
        .and_then(|r| r.get("assetId"))
        .and_then(Value::as_u64)
        .and_then(|id| u32::try_from(id).ok())
}

fn slot(result: Option<&Value>) -> i16 {
    result
        .and_then(|r| r.get("slot"))
        .and_then(Value::as_i64)
        .and_then(|s| i16::try_from(s).ok())
        .unwrap_or(0)
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Step expansion.
//!
//! High-level transfer actions become an accept step on the receiving side
//! followed by a release step on the giving side. The replacement is computed
//! from the payload alone, so re-running it after a crash yields the same
//! steps with the same ids.

use chrono::{DateTime, Utc};

use super::action::{
    AcceptToCashShopPayload, AcceptToCharacterPayload, AcceptToStoragePayload, Action,
    ReleaseFromCashShopPayload, ReleaseFromCharacterPayload, ReleaseFromStoragePayload,
};
use super::{Saga, Step};
use crate::error::Result;

/// Suffix of the receiving-side step id.
pub const ACCEPT_SUFFIX: &str = "accept";
/// Suffix of the giving-side step id.
pub const RELEASE_SUFFIX: &str = "release";

/// Lower-level steps replacing `step`, or `None` when it does not expand.
pub fn expand(step: &Step, now: DateTime<Utc>) -> Option<Vec<Step>> {
    let accept_id = format!("{}-{}", step.step_id, ACCEPT_SUFFIX);
    let release_id = format!("{}-{}", step.step_id, RELEASE_SUFFIX);

    let (accept, release) = match &step.action {
        Action::TransferToStorage(p) => (
            Action::AcceptToStorage(AcceptToStoragePayload {
                transaction_id: p.transaction_id,
                world_id: p.world_id,
                account_id: p.account_id,
                character_id: p.character_id,
                source_inventory_type: p.source_inventory_type,
                source_slot: p.source_slot,
                quantity: p.quantity,
            }),
            Action::ReleaseFromCharacter(ReleaseFromCharacterPayload {
                transaction_id: p.transaction_id,
                character_id: p.character_id,
                world_id: p.world_id,
                inventory_type: p.source_inventory_type,
                source_slot: p.source_slot,
                asset_id: 0,
                quantity: p.quantity,
            }),
        ),
        Action::WithdrawFromStorage(p) => (
            Action::AcceptToCharacter(AcceptToCharacterPayload {
                transaction_id: p.transaction_id,
                character_id: p.character_id,
                world_id: p.world_id,
                account_id: p.account_id,
                inventory_type: p.inventory_type,
                source_slot: p.source_slot,
                cash_id: None,
                quantity: p.quantity,
            }),
            Action::ReleaseFromStorage(ReleaseFromStoragePayload {
                transaction_id: p.transaction_id,
                world_id: p.world_id,
                account_id: p.account_id,
                character_id: p.character_id,
                source_slot: p.source_slot,
                asset_id: 0,
                quantity: p.quantity,
            }),
        ),
        Action::TransferToCashShop(p) => (
            Action::AcceptToCashShop(AcceptToCashShopPayload {
                transaction_id: p.transaction_id,
                character_id: p.character_id,
                account_id: p.account_id,
                compartment_type: p.compartment_type,
                cash_id: p.cash_id,
            }),
            Action::ReleaseFromCharacter(ReleaseFromCharacterPayload {
                transaction_id: p.transaction_id,
                character_id: p.character_id,
                world_id: 0,
                inventory_type: p.source_inventory_type,
                source_slot: p.source_slot,
                asset_id: 0,
                quantity: 1,
            }),
        ),
        Action::WithdrawFromCashShop(p) => (
            Action::AcceptToCharacter(AcceptToCharacterPayload {
                transaction_id: p.transaction_id,
                character_id: p.character_id,
                world_id: 0,
                account_id: p.account_id,
                inventory_type: p.inventory_type,
                source_slot: 0,
                cash_id: Some(p.cash_id),
                quantity: 1,
            }),
            Action::ReleaseFromCashShop(ReleaseFromCashShopPayload {
                transaction_id: p.transaction_id,
                character_id: p.character_id,
                account_id: p.account_id,
                compartment_type: p.compartment_type,
                cash_id: p.cash_id,
                asset_id: 0,
            }),
        ),
        _ => return None,
    };

    Some(vec![
        Step::pending(accept_id, accept, now),
        Step::pending(release_id, release, now),
    ])
}

/// Expand the step at `index` in place.
///
/// Returns `false` when the step does not expand. Re-entry is a no-op: if the
/// derived step ids are already present the saga is left untouched.
pub fn expand_in_place(saga: &mut Saga, index: usize, now: DateTime<Utc>) -> Result<bool> {
    let Some(step) = saga.steps.get(index) else {
        return Ok(false);
    };
    let Some(replacement) = expand(step, now) else {
        return Ok(false);
    };
    if replacement
        .iter()
        .all(|s| saga.step_index(&s.step_id).is_some())
    {
        return Ok(false);
    }
    saga.splice_step(index, replacement)?;
    Ok(true)
}

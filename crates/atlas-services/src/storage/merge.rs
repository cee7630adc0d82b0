// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Merge-and-sort planning for a compartment.
//!
//! Planning is pure: it takes the assets and per-template item data and
//! returns the writes needed. Applying them is the store's job.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;
use uuid::Uuid;

use super::model::{Asset, ReferenceType};

/// Stack size used when the template's is unknown or zero.
pub const DEFAULT_SLOT_MAX: u32 = 100;

/// Item data relevant to stacking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItemTemplate {
    pub slot_max: u32,
    /// Rechargeable consumables (stars, bullets) never merge.
    pub rechargeable: bool,
}

/// Writes that turn a compartment into its arranged form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arrangement {
    /// `(asset, new quantity)` for surviving stacks whose quantity changed.
    pub quantities: Vec<(Uuid, u32)>,
    /// `(asset, new slot)` for assets whose slot changed.
    pub slots: Vec<(Uuid, i16)>,
    /// Assets merged away.
    pub removed: Vec<Uuid>,
    /// Final contents, in slot order.
    pub assets: Vec<Asset>,
}

impl Arrangement {
    pub fn is_noop(&self) -> bool {
        self.quantities.is_empty() && self.slots.is_empty() && self.removed.is_empty()
    }
}

fn slot_max(template_id: u32, templates: &HashMap<u32, ItemTemplate>) -> u32 {
    match templates.get(&template_id) {
        Some(t) if t.slot_max == 0 => {
            warn!(template_id, "Template slot max is zero, using default");
            DEFAULT_SLOT_MAX
        }
        Some(t) => t.slot_max,
        None => DEFAULT_SLOT_MAX,
    }
}

fn mergeable(asset: &Asset, templates: &HashMap<u32, ItemTemplate>) -> bool {
    if asset.stack.is_none() || !asset.reference_type.is_stackable() {
        return false;
    }
    let rechargeable = asset.reference_type == ReferenceType::Consumable
        && templates
            .get(&asset.template_id)
            .is_some_and(|t| t.rechargeable);
    !rechargeable
}

/// Plan the merge-and-sort of `assets`.
///
/// Stackables sharing `(template, owner, flag)` are coalesced into the fewest
/// stacks the template's slot max allows, keeping the lowest-slotted entries.
/// Everything left is then re-slotted `1..=N` by ascending template id.
pub fn plan(assets: &[Asset], templates: &HashMap<u32, ItemTemplate>) -> Arrangement {
    let mut ordered: Vec<&Asset> = assets.iter().collect();
    ordered.sort_by_key(|a| a.slot);

    let mut kept: Vec<Asset> = Vec::with_capacity(assets.len());
    let mut groups: BTreeMap<(u32, u32, u16), Vec<&Asset>> = BTreeMap::new();
    for asset in ordered {
        match asset.stack {
            Some(stack) if mergeable(asset, templates) => groups
                .entry((asset.template_id, stack.owner_id, stack.flag))
                .or_default()
                .push(asset),
            _ => kept.push(asset.clone()),
        }
    }

    let mut arrangement = Arrangement::default();
    for ((template_id, _, _), entries) in groups {
        let max = slot_max(template_id, templates);
        let total: u64 = entries.iter().map(|a| u64::from(a.quantity())).sum();
        let needed = total.div_ceil(u64::from(max)) as usize;

        let mut remaining = total;
        for (index, asset) in entries.into_iter().enumerate() {
            if index >= needed {
                arrangement.removed.push(asset.id);
                continue;
            }
            let quantity = remaining.min(u64::from(max)) as u32;
            remaining -= u64::from(quantity);

            let mut asset = asset.clone();
            if let Some(stack) = asset.stack.as_mut() {
                if stack.quantity != quantity {
                    stack.quantity = quantity;
                    arrangement.quantities.push((asset.id, quantity));
                }
            }
            kept.push(asset);
        }
    }

    kept.sort_by_key(|a| (a.template_id, a.slot));
    for (index, asset) in kept.iter_mut().enumerate() {
        let slot = index as i16 + 1;
        if asset.slot != slot {
            asset.slot = slot;
            arrangement.slots.push((asset.id, slot));
        }
    }
    arrangement.assets = kept;
    arrangement
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::model::Stack;

    fn stackable(template_id: u32, slot: i16, quantity: u32) -> Asset {
        Asset {
            id: Uuid::new_v4(),
            slot,
            template_id,
            reference_type: ReferenceType::Consumable,
            expiration: None,
            stack: Some(Stack {
                quantity,
                owner_id: 0,
                flag: 0,
            }),
        }
    }

    fn equip(template_id: u32, slot: i16) -> Asset {
        Asset {
            id: Uuid::new_v4(),
            slot,
            template_id,
            reference_type: ReferenceType::Equipable,
            expiration: None,
            stack: None,
        }
    }

    fn templates(entries: &[(u32, u32, bool)]) -> HashMap<u32, ItemTemplate> {
        entries
            .iter()
            .map(|&(id, slot_max, rechargeable)| {
                (
                    id,
                    ItemTemplate {
                        slot_max,
                        rechargeable,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_merges_into_minimum_stacks() {
        let a = stackable(2000000, 3, 60);
        let b = stackable(2000000, 7, 40);
        let c = stackable(2000000, 12, 50);
        let plan = plan(
            &[c.clone(), a.clone(), b.clone()],
            &templates(&[(2000000, 100, false)]),
        );

        assert_eq!(plan.assets.len(), 2);
        assert_eq!(plan.removed, vec![c.id]);
        assert_eq!(plan.assets[0].id, a.id);
        assert_eq!(plan.assets[0].quantity(), 100);
        assert_eq!(plan.assets[1].id, b.id);
        assert_eq!(plan.assets[1].quantity(), 50);
        assert_eq!(plan.assets.iter().map(|a| a.slot).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(plan.quantities, vec![(a.id, 100), (b.id, 50)]);
    }

    #[test]
    fn test_unknown_and_zero_slot_max_default_to_hundred() {
        let assets = vec![stackable(4000000, 1, 90), stackable(4000000, 2, 90)];
        let unknown = plan(&assets, &HashMap::new());
        let zero = plan(&assets, &templates(&[(4000000, 0, false)]));
        assert_eq!(unknown, zero);
        assert_eq!(unknown.assets.len(), 2);
        assert_eq!(unknown.assets[0].quantity(), 100);
        assert_eq!(unknown.assets[1].quantity(), 80);
    }

    #[test]
    fn test_rechargeables_are_left_alone() {
        let stars = vec![stackable(2070000, 1, 200), stackable(2070000, 2, 150)];
        let plan = plan(&stars, &templates(&[(2070000, 800, true)]));
        assert!(plan.is_noop());
        assert_eq!(plan.assets.len(), 2);
    }

    #[test]
    fn test_different_owner_or_flag_do_not_merge() {
        let mut owned = stackable(4000000, 1, 10);
        owned.stack = Some(Stack {
            quantity: 10,
            owner_id: 55,
            flag: 0,
        });
        let plain = stackable(4000000, 2, 10);
        let plan = plan(&[owned, plain], &HashMap::new());
        assert!(plan.removed.is_empty());
        assert_eq!(plan.assets.len(), 2);
    }

    #[test]
    fn test_resorts_by_template_and_is_idempotent() {
        let assets = vec![
            equip(1302000, 1),
            stackable(4000000, 2, 5),
            equip(1002000, 3),
            stackable(2000000, 4, 5),
        ];
        let first = plan(&assets, &HashMap::new());
        let templates_in_order: Vec<u32> = first.assets.iter().map(|a| a.template_id).collect();
        assert_eq!(templates_in_order, vec![1002000, 1302000, 2000000, 4000000]);
        assert_eq!(first.slots.len(), 4);
        assert!(first.quantities.is_empty());

        let second = plan(&first.assets, &HashMap::new());
        assert!(second.is_noop());
        assert_eq!(second.assets, first.assets);
    }

    #[test]
    fn test_quantity_preserved_and_stack_count_bounded() {
        let quantities = [37u32, 99, 1, 250, 64, 100, 3];
        let assets: Vec<Asset> = quantities
            .iter()
            .enumerate()
            .map(|(i, &q)| stackable(2000001, i as i16 * 2, q))
            .collect();
        let total: u32 = quantities.iter().sum();

        let plan = plan(&assets, &templates(&[(2000001, 120, false)]));
        assert_eq!(plan.assets.iter().map(Asset::quantity).sum::<u32>(), total);
        assert_eq!(plan.assets.len(), total.div_ceil(120) as usize);
        assert!(plan.assets.iter().all(|a| a.quantity() <= 120));
        assert_eq!(plan.removed.len(), assets.len() - plan.assets.len());
    }
}

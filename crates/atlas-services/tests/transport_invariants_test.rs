// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Transport registry invariants under randomized traffic.

mod common;

use common::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use atlas_services::field::Field;

fn start_field() -> Field {
    Field::new(0, 1, START_MAP)
}

#[tokio::test]
async fn test_back_index_and_capacity_hold_under_random_traffic() {
    let route = orbis_route();
    let ctx = ServicesContext::with_routes(vec![route.clone()]);
    let transport = &ctx.state.transport;
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _ in 0..500 {
        let character_id = rng.gen_range(1..=12);
        match rng.gen_range(0..5) {
            0 | 1 => {
                let _ = transport
                    .start_transport(&ctx.tenant, character_id, route.id, start_field())
                    .await;
            }
            2 => {
                transport
                    .handle_logout(&ctx.tenant, character_id)
                    .await
                    .unwrap();
            }
            3 => {
                let instance = transport.instances().instance_for(&ctx.tenant, character_id);
                let field = match instance {
                    Some(i) => Field::new(0, 1, TRANSIT_MAP).with_instance(i.id),
                    None => start_field(),
                };
                transport
                    .handle_map_exit(&ctx.tenant, character_id, field)
                    .await
                    .unwrap();
            }
            _ => {
                ctx.clock.advance_secs(rng.gen_range(1..90));
                transport.tick(&ctx.tenant).await.unwrap();
            }
        }

        let instances = transport.instances();
        assert!(instances.is_consistent(&ctx.tenant));
        for instance in instances.list(&ctx.tenant) {
            assert!(!instance.characters.is_empty());
            assert!(instance.characters.len() <= route.capacity as usize);
        }
    }
    ctx.sent();
}

#[tokio::test]
async fn test_tenants_never_share_instances() {
    let route = orbis_route();
    let ctx = ServicesContext::with_routes(vec![route.clone()]);
    let other = tenant();
    let transport = &ctx.state.transport;

    transport
        .start_transport(&ctx.tenant, 1001, route.id, start_field())
        .await
        .unwrap();
    // Same character id under another tenant is a different character.
    transport
        .start_transport(&other, 1001, route.id, start_field())
        .await
        .unwrap();

    let ours = transport.instances().list(&ctx.tenant);
    let theirs = transport.instances().list(&other);
    assert_eq!(ours.len(), 1);
    assert_eq!(theirs.len(), 1);
    assert_ne!(ours[0].id, theirs[0].id);

    assert!(transport.handle_logout(&other, 1001).await.unwrap());
    assert!(transport.instances().is_in_transport(&ctx.tenant, 1001));
    assert!(!transport.instances().is_in_transport(&other, 1001));
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Transport lifecycle scenarios: boarding, departure, arrival, and
//! cancellation through character status events.

mod common;

use common::*;
use serde_json::json;
use uuid::Uuid;

use atlas_core::bus::Envelope;
use atlas_core::topic;
use atlas_services::consumer::{CharacterStatusBody, STATUS_LOGIN, STATUS_LOGOUT, STATUS_MAP_CHANGED};
use atlas_services::error::Error;
use atlas_services::field::Field;
use atlas_services::transport::{RouteState, StartTransportCommand};

fn start_field() -> Field {
    Field::new(0, 1, START_MAP)
}

fn route_id(ctx: &ServicesContext) -> Uuid {
    ctx.state
        .transport
        .routes()
        .by_name(&ctx.tenant, "ellinia_to_orbis")
        .expect("route installed")
        .id
}

#[tokio::test]
async fn test_ride_boards_departs_and_arrives() {
    let ctx = ServicesContext::new();
    let route = route_id(&ctx);

    let instance = ctx
        .state
        .transport
        .start_transport(&ctx.tenant, 1001, route, start_field())
        .await
        .unwrap();

    let sent = ctx.sent();
    assert_eq!(kinds(&sent), vec!["CHANGE_MAP", "STARTED"]);
    assert_eq!(sent[0].topic, topic::COMMAND_TOPIC_CHARACTER);
    assert_eq!(sent[0].key, "1001");
    assert_eq!(sent[0].value["body"]["mapId"], json!(TRANSIT_MAP));
    assert_eq!(sent[0].value["body"]["instance"], json!(instance.id));
    assert_eq!(sent[1].topic, topic::EVENT_TOPIC_TRANSPORT_STATUS);

    // A second passenger joins the same boarding instance.
    let joined = ctx
        .state
        .transport
        .start_transport(&ctx.tenant, 1002, route, start_field())
        .await
        .unwrap();
    assert_eq!(joined.id, instance.id);
    assert_eq!(joined.characters.len(), 2);
    ctx.sent();

    let status = ctx.state.transport.route_status(&ctx.tenant, route).unwrap();
    assert_eq!(status.state, RouteState::Boarding);

    ctx.clock.advance_secs(61);
    ctx.state.transport.tick(&ctx.tenant).await.unwrap();
    assert!(ctx.sent().is_empty());
    let status = ctx.state.transport.route_status(&ctx.tenant, route).unwrap();
    assert_eq!(status.state, RouteState::InTransit);

    ctx.clock.advance_secs(120);
    ctx.state.transport.tick(&ctx.tenant).await.unwrap();
    let sent = ctx.sent();
    assert_eq!(
        kinds(&sent),
        vec!["CHANGE_MAP", "COMPLETED", "CHANGE_MAP", "COMPLETED"]
    );
    assert_eq!(sent[0].value["body"]["mapId"], json!(DESTINATION_MAP));
    assert_eq!(sent[0].value["body"]["instance"], json!(Uuid::nil()));

    let status = ctx.state.transport.route_status(&ctx.tenant, route).unwrap();
    assert_eq!(status.state, RouteState::Idle);
    assert!(!ctx.state.transport.instances().is_in_transport(&ctx.tenant, 1001));
}

#[tokio::test]
async fn test_full_instance_opens_another() {
    let ctx = ServicesContext::new();
    let route = route_id(&ctx);

    let mut ids = Vec::new();
    for character_id in [1, 2, 3] {
        let instance = ctx
            .state
            .transport
            .start_transport(&ctx.tenant, character_id, route, start_field())
            .await
            .unwrap();
        ids.push(instance.id);
    }
    assert_eq!(ids[0], ids[1]);
    assert_ne!(ids[1], ids[2]);
    assert!(ctx.state.transport.instances().is_consistent(&ctx.tenant));
}

#[tokio::test]
async fn test_boarding_twice_is_refused() {
    let ctx = ServicesContext::new();
    let route = route_id(&ctx);

    ctx.state
        .transport
        .start_transport(&ctx.tenant, 1001, route, start_field())
        .await
        .unwrap();
    ctx.sent();

    let err = ctx
        .state
        .transport
        .start_transport(&ctx.tenant, 1001, route, start_field())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyInTransport(1001)));
    assert!(ctx.sent().is_empty());
}

#[tokio::test]
async fn test_failed_publish_rolls_back_boarding() {
    let ctx = ServicesContext::new();
    let route = route_id(&ctx);

    ctx.producer.set_failing(true);
    assert!(
        ctx.state
            .transport
            .start_transport(&ctx.tenant, 1001, route, start_field())
            .await
            .is_err()
    );
    ctx.producer.set_failing(false);

    assert!(!ctx.state.transport.instances().is_in_transport(&ctx.tenant, 1001));
    assert_eq!(
        ctx.state.transport.route_status(&ctx.tenant, route).unwrap().state,
        RouteState::Idle
    );
}

#[tokio::test]
async fn test_leaving_transit_map_cancels_ride() {
    let ctx = ServicesContext::new();
    let route = route_id(&ctx);
    let instance = ctx
        .state
        .transport
        .start_transport(&ctx.tenant, 1001, route, start_field())
        .await
        .unwrap();
    ctx.sent();

    // Leaving an unrelated map does nothing.
    ctx.deliver(ctx.message(
        topic::EVENT_TOPIC_CHARACTER_STATUS,
        Envelope::for_character(
            0,
            1001,
            STATUS_MAP_CHANGED,
            CharacterStatusBody {
                channel_id: 1,
                map_id: TRANSIT_MAP,
                instance: instance.id,
                old_map_id: Some(START_MAP),
                old_instance: None,
            },
        ),
    ))
    .await;
    assert!(ctx.sent().is_empty());

    ctx.deliver(ctx.message(
        topic::EVENT_TOPIC_CHARACTER_STATUS,
        Envelope::for_character(
            0,
            1001,
            STATUS_MAP_CHANGED,
            CharacterStatusBody {
                channel_id: 1,
                map_id: 100000000,
                instance: Uuid::nil(),
                old_map_id: Some(TRANSIT_MAP),
                old_instance: Some(instance.id),
            },
        ),
    ))
    .await;

    let sent = ctx.sent();
    assert_eq!(kinds(&sent), vec!["CANCELLED"]);
    assert_eq!(sent[0].value["body"]["reason"], json!("MAP_EXIT"));
    assert!(!ctx.state.transport.instances().is_in_transport(&ctx.tenant, 1001));
}

#[tokio::test]
async fn test_logout_cancels_and_login_on_transit_map_returns_home() {
    let ctx = ServicesContext::new();
    let route = route_id(&ctx);
    ctx.state
        .transport
        .start_transport(&ctx.tenant, 1001, route, start_field())
        .await
        .unwrap();
    ctx.sent();

    ctx.deliver(ctx.message(
        topic::EVENT_TOPIC_CHARACTER_STATUS,
        Envelope::for_character(0, 1001, STATUS_LOGOUT, CharacterStatusBody::default()),
    ))
    .await;
    let sent = ctx.sent();
    assert_eq!(kinds(&sent), vec!["CANCELLED"]);
    assert_eq!(sent[0].value["body"]["reason"], json!("LOGOUT"));

    ctx.deliver(ctx.message(
        topic::EVENT_TOPIC_CHARACTER_STATUS,
        Envelope::for_character(
            0,
            1001,
            STATUS_LOGIN,
            CharacterStatusBody {
                channel_id: 1,
                map_id: TRANSIT_MAP,
                ..Default::default()
            },
        ),
    ))
    .await;
    let sent = ctx.sent();
    assert_eq!(kinds(&sent), vec!["CHANGE_MAP"]);
    assert_eq!(sent[0].value["body"]["mapId"], json!(START_MAP));
}

#[tokio::test]
async fn test_saga_start_command_reports_step_outcome() {
    let ctx = ServicesContext::new();
    let tx = Uuid::new_v4();

    ctx.deliver(ctx.message(
        topic::COMMAND_TOPIC_TRANSPORT,
        Envelope::for_character(
            0,
            1001,
            "START",
            StartTransportCommand {
                character_id: 1001,
                world_id: 0,
                channel_id: 1,
                route_name: "ellinia_to_orbis".to_string(),
                step_id: Some("board".to_string()),
            },
        )
        .with_transaction(tx),
    ))
    .await;

    let sent = ctx.sent();
    let outcomes: Vec<_> = sent
        .iter()
        .filter(|m| m.topic == topic::EVENT_TOPIC_SAGA_STEP)
        .collect();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].value["body"]["stepId"], json!("board"));
    assert!(ctx.state.transport.instances().is_in_transport(&ctx.tenant, 1001));
}

#[tokio::test]
async fn test_graceful_shutdown_returns_passengers() {
    let ctx = ServicesContext::new();
    let route = route_id(&ctx);
    ctx.state
        .transport
        .start_transport(&ctx.tenant, 1001, route, start_field())
        .await
        .unwrap();
    ctx.sent();

    assert_eq!(
        ctx.state.transport.graceful_shutdown(&ctx.tenant).await.unwrap(),
        1
    );
    let sent = ctx.sent();
    assert_eq!(kinds(&sent), vec!["CHANGE_MAP"]);
    assert_eq!(sent[0].value["body"]["mapId"], json!(START_MAP));
    assert!(ctx.state.transport.instances().list(&ctx.tenant).is_empty());
}

#[tokio::test]
async fn test_arrival_is_retried_after_publish_failure() {
    let ctx = ServicesContext::new();
    let route = route_id(&ctx);
    let instance = ctx
        .state
        .transport
        .start_transport(&ctx.tenant, 1001, route, start_field())
        .await
        .unwrap();
    ctx.sent();

    ctx.clock.advance_secs(61);
    assert_eq!(ctx.state.transport.tick_boarding(&ctx.tenant), 1);
    ctx.clock.advance_secs(121);

    ctx.producer.set_failing(true);
    assert!(ctx.state.transport.tick_arrival(&ctx.tenant).await.is_err());
    assert!(ctx.sent().is_empty());

    let instances = ctx.state.transport.instances();
    assert!(instances.is_in_transport(&ctx.tenant, 1001));
    assert_eq!(instances.instance_for(&ctx.tenant, 1001).unwrap().id, instance.id);
    assert!(instances.is_consistent(&ctx.tenant));

    ctx.producer.set_failing(false);
    assert_eq!(ctx.state.transport.tick_arrival(&ctx.tenant).await.unwrap(), 1);
    let sent = ctx.sent();
    assert_eq!(kinds(&sent), vec!["CHANGE_MAP", "COMPLETED"]);
    assert_eq!(sent[0].value["body"]["mapId"], json!(DESTINATION_MAP));
    assert!(!ctx.state.transport.instances().is_in_transport(&ctx.tenant, 1001));
}


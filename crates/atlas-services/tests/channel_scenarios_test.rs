// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Channel registry fed by status events, with the staleness sweep.

mod common;

use common::*;

use atlas_core::bus::Envelope;
use atlas_core::topic;
use atlas_services::channel::{ChannelRegistration, ChannelStatusBody};
use atlas_services::channel_monitor::{ChannelMonitor, ChannelMonitorConfig};

fn started(world_id: u8, channel_id: u8) -> Envelope<ChannelStatusBody> {
    Envelope {
        transaction_id: None,
        world_id,
        character_id: None,
        account_id: None,
        kind: "STARTED".to_string(),
        body: ChannelStatusBody {
            channel_id,
            ip_address: "10.0.0.5".to_string(),
            port: 7575 + u32::from(channel_id),
            current_capacity: 0,
            max_capacity: 500,
        },
    }
}

#[tokio::test]
async fn test_started_event_registers_and_shutdown_removes() {
    let ctx = ServicesContext::new();

    ctx.deliver(ctx.message(topic::EVENT_TOPIC_CHANNEL_STATUS, started(0, 2)))
        .await;
    ctx.deliver(ctx.message(topic::EVENT_TOPIC_CHANNEL_STATUS, started(0, 1)))
        .await;

    let channels = ctx.state.channels.list(&ctx.tenant, 0);
    let ids: Vec<_> = channels.iter().map(|c| c.channel_id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(channels[1].port, 7577);

    let mut shutdown = started(0, 2);
    shutdown.kind = "SHUTDOWN".to_string();
    ctx.deliver(ctx.message(topic::EVENT_TOPIC_CHANNEL_STATUS, shutdown))
        .await;
    assert!(ctx.state.channels.get(&ctx.tenant, 0, 2).is_none());
    assert!(ctx.state.channels.get(&ctx.tenant, 0, 1).is_some());
}

#[tokio::test]
async fn test_silent_channels_are_swept_and_live_ones_kept() {
    let ctx = ServicesContext::new();
    let monitor = ChannelMonitor::new(ctx.state.channels.clone(), ChannelMonitorConfig::default());

    ctx.deliver(ctx.message(topic::EVENT_TOPIC_CHANNEL_STATUS, started(0, 1)))
        .await;
    ctx.deliver(ctx.message(topic::EVENT_TOPIC_CHANNEL_STATUS, started(0, 2)))
        .await;

    // Channel 2 keeps announcing itself; channel 1 goes quiet.
    ctx.clock.advance_secs(10);
    ctx.deliver(ctx.message(topic::EVENT_TOPIC_CHANNEL_STATUS, started(0, 2)))
        .await;
    ctx.clock.advance_secs(10);

    assert_eq!(monitor.sweep_once(), 1);
    let ids: Vec<_> = ctx
        .state
        .channels
        .list(&ctx.tenant, 0)
        .iter()
        .map(|c| c.channel_id)
        .collect();
    assert_eq!(ids, vec![2]);
    // Sweeping announces nothing.
    assert!(ctx.sent().is_empty());
}

#[tokio::test]
async fn test_registration_announces_started_without_registering() {
    let ctx = ServicesContext::new();

    ctx.state
        .channels
        .emit_started(
            &ctx.tenant,
            1,
            ChannelRegistration {
                channel_id: 3,
                ip_address: "10.0.0.9".to_string(),
                port: 7577,
                current_capacity: 0,
                max_capacity: 300,
            },
        )
        .await
        .unwrap();

    let sent = ctx.sent();
    assert_eq!(kinds(&sent), vec!["STARTED"]);
    assert!(ctx.state.channels.get(&ctx.tenant, 1, 3).is_none());

    // The event coming back around does the registering.
    ctx.deliver(sent[0].clone()).await;
    assert!(ctx.state.channels.get(&ctx.tenant, 1, 3).is_some());
}

#[tokio::test]
async fn test_invalid_registration_publishes_nothing() {
    let ctx = ServicesContext::new();
    let result = ctx
        .state
        .channels
        .emit_started(
            &ctx.tenant,
            0,
            ChannelRegistration {
                channel_id: 1,
                ip_address: String::new(),
                port: 7575,
                current_capacity: 0,
                max_capacity: 300,
            },
        )
        .await;
    assert!(result.is_err());
    assert!(ctx.sent().is_empty());
}

#[tokio::test]
async fn test_channels_are_tenant_scoped() {
    let ctx = ServicesContext::new();
    let other = tenant();
    ctx.deliver(ctx.message_for(&other, topic::EVENT_TOPIC_CHANNEL_STATUS, started(0, 1)))
        .await;

    assert!(ctx.state.channels.list(&ctx.tenant, 0).is_empty());
    assert_eq!(ctx.state.channels.list(&other, 0).len(), 1);
}

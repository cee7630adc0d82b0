// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embedded runtime lifecycle.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;

use atlas_core::bus::{Envelope, MemoryQueue, Message, Producer, RecordingProducer, TopicResolver};
use atlas_core::topic;
use atlas_services::consumer::SetCooldownBody;
use atlas_services::runtime::{ServicesRuntime, ServicesRuntimeBuilder};

fn with_stubs(builder: ServicesRuntimeBuilder) -> ServicesRuntimeBuilder {
    builder
        .parties(Arc::new(StubParties::default()))
        .characters(Arc::new(StubValidator::default()))
        .spawn_points(Arc::new(StubSpawnPoints::default()))
        .population(Arc::new(StubPopulation::default()))
        .monsters(Arc::new(RecordingSpawner::default()))
        .items(Arc::new(StubItems::default()))
}

#[test]
fn test_build_requires_producer() {
    let dir = tempfile::TempDir::new().unwrap();
    let result = with_stubs(ServicesRuntime::builder().data_dir(dir.path())).build();
    let err = result.err().expect("build should fail without a producer");
    assert!(err.to_string().contains("producer"));
}

#[test]
fn test_build_requires_collaborators() {
    let dir = tempfile::TempDir::new().unwrap();
    let result = ServicesRuntime::builder()
        .data_dir(dir.path())
        .producer(Arc::new(RecordingProducer::new()))
        .build();
    assert!(result.is_err());
}

#[test]
fn test_build_rejects_invalid_route_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut route = orbis_route();
    route.capacity = 0;
    std::fs::write(
        dir.path().join("instance-routes.json"),
        serde_json::to_vec(&vec![route]).unwrap(),
    )
    .unwrap();

    let result = with_stubs(
        ServicesRuntime::builder()
            .data_dir(dir.path())
            .producer(Arc::new(RecordingProducer::new())),
    )
    .build();
    assert!(result.is_err());
}

#[tokio::test]
async fn test_runtime_consumes_bus_and_shuts_down() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("instance-routes.json"),
        serde_json::to_vec(&vec![orbis_route()]).unwrap(),
    )
    .unwrap();

    let queue = Arc::new(MemoryQueue::new());
    let producer = Arc::new(RecordingProducer::new());
    let topics = TopicResolver::default();

    let runtime = with_stubs(
        ServicesRuntime::builder()
            .data_dir(dir.path())
            .producer(producer.clone())
            .consumer(queue.clone())
            .topics(topics.clone())
            .poll_timeout(Duration::from_millis(20)),
    )
    .build()
    .unwrap()
    .start()
    .await
    .unwrap();
    assert!(runtime.is_running());

    let tenant = tenant();
    assert_eq!(runtime.state().transport.routes().list(&tenant).len(), 1);

    let envelope = Envelope::for_character(
        0,
        1001,
        "SET_COOLDOWN",
        SetCooldownBody {
            skill_id: 1001004,
            cooldown: 10,
        },
    );
    queue
        .send(vec![Message {
            topic: topics.resolve(topic::COMMAND_TOPIC_SKILL),
            key: envelope.partition_key(),
            headers: tenant.to_headers(),
            value: serde_json::to_value(&envelope).unwrap(),
        }])
        .await
        .unwrap();

    let mut applied = false;
    for _ in 0..100 {
        if producer
            .messages()
            .iter()
            .any(|m| m.kind() == Some("COOLDOWN_APPLIED"))
        {
            applied = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(applied, "cooldown command was not consumed");

    runtime.shutdown().await.unwrap();
}

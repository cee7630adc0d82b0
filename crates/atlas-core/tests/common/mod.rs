// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for atlas-core scenario tests.
//!
//! Provides TestContext wiring a saga runtime to an in-memory SQLite store,
//! a recording producer, and a manual clock.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use atlas_core::bus::{Message, RecordingProducer, TopicResolver};
use atlas_core::clock::ManualClock;
use atlas_core::orchestrator::{SagaRuntime, SagaRuntimeConfig};
use atlas_core::persistence::{SagaRecord, SqlitePersistence};
use atlas_core::saga::{Saga, StepOutcome};
use atlas_core::tenant::Tenant;

/// Test context around one saga runtime.
pub struct TestContext {
    pub runtime: SagaRuntime,
    pub producer: Arc<RecordingProducer>,
    pub clock: Arc<ManualClock>,
    pub tenant: Tenant,
}

impl TestContext {
    /// Runtime with the given saga deadline.
    pub async fn with_timeout(timeout: Duration) -> Self {
        let persistence = Arc::new(
            SqlitePersistence::in_memory()
                .await
                .expect("Failed to create in-memory store"),
        );
        let producer = Arc::new(RecordingProducer::new());
        let clock = Arc::new(ManualClock::starting_now());
        let runtime = SagaRuntime::new(
            persistence,
            producer.clone(),
            TopicResolver::default(),
            clock.clone(),
            SagaRuntimeConfig {
                default_timeout: timeout,
                ..Default::default()
            },
        );

        Self {
            runtime,
            producer,
            clock,
            tenant: Tenant::new(Uuid::new_v4(), "GMS", 83, 1),
        }
    }

    pub async fn new() -> Self {
        Self::with_timeout(Duration::from_secs(300)).await
    }

    pub async fn submit(&self, saga: Saga) {
        self.runtime
            .submit(&self.tenant, saga)
            .await
            .expect("Failed to submit saga");
    }

    pub async fn complete(&self, tx: Uuid, step_id: &str) {
        self.runtime
            .handle_outcome(&self.tenant, StepOutcome::completed(tx, step_id))
            .await
            .expect("Failed to apply outcome");
    }

    pub async fn complete_with(&self, tx: Uuid, step_id: &str, result: serde_json::Value) {
        self.runtime
            .handle_outcome(
                &self.tenant,
                StepOutcome::completed(tx, step_id).with_result(result),
            )
            .await
            .expect("Failed to apply outcome");
    }

    pub async fn fail(&self, tx: Uuid, step_id: &str, error: &str) {
        self.runtime
            .handle_outcome(&self.tenant, StepOutcome::failed(tx, step_id, error))
            .await
            .expect("Failed to apply outcome");
    }

    pub async fn record(&self, tx: Uuid) -> SagaRecord {
        self.runtime
            .get(&self.tenant, tx)
            .await
            .expect("Failed to load saga")
            .expect("Saga not found")
    }

    /// Messages published since the last call.
    pub fn sent(&self) -> Vec<Message> {
        self.producer.take()
    }
}

/// Command or event type of each message, in order.
pub fn kinds(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .map(|m| m.kind().unwrap_or_default().to_string())
        .collect()
}

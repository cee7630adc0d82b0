// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Message bus abstraction.
//!
//! Commands and events share one envelope (`transactionId`, `worldId`,
//! `characterId | accountId`, `type`, `body`). Partition keys derive from the
//! primary subject so messages for one character or account stay ordered.
//! Tenants travel as headers, and topic names are always resolved through
//! environment variables by a [`TopicResolver`].

pub mod memory;
pub mod redis;

pub use self::memory::{MemoryQueue, RecordingProducer};
pub use self::redis::{RedisStreamConsumer, RedisStreamProducer};

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::tenant::Tenant;

/// A single message on the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Resolved topic name.
    pub topic: String,
    /// Partition key.
    pub key: String,
    /// Out-of-band headers (tenant identity, tracing).
    pub headers: HashMap<String, String>,
    /// JSON value.
    pub value: serde_json::Value,
}

impl Message {
    /// Message type taken from the envelope's `type` field.
    pub fn kind(&self) -> Option<&str> {
        self.value.get("type").and_then(|v| v.as_str())
    }

    /// Decode the value as an envelope with a typed body.
    pub fn envelope<B: serde::de::DeserializeOwned>(&self) -> Result<Envelope<B>> {
        Ok(serde_json::from_value(self.value.clone())?)
    }

    /// Tenant carried in the headers.
    pub fn tenant(&self) -> Result<Tenant> {
        Tenant::from_headers(&self.headers)
    }
}

/// Shared command/event header with an action-specific body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<B> {
    /// Saga transaction, when the message belongs to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<Uuid>,
    /// World the subject lives in.
    #[serde(default)]
    pub world_id: u8,
    /// Character subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_id: Option<u32>,
    /// Account subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<u32>,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub kind: String,
    /// Action-specific body.
    pub body: B,
}

impl<B> Envelope<B> {
    /// Envelope addressed to a character.
    pub fn for_character(world_id: u8, character_id: u32, kind: impl Into<String>, body: B) -> Self {
        Self {
            transaction_id: None,
            world_id,
            character_id: Some(character_id),
            account_id: None,
            kind: kind.into(),
            body,
        }
    }

    /// Envelope addressed to an account.
    pub fn for_account(world_id: u8, account_id: u32, kind: impl Into<String>, body: B) -> Self {
        Self {
            transaction_id: None,
            world_id,
            character_id: None,
            account_id: Some(account_id),
            kind: kind.into(),
            body,
        }
    }

    /// Attach a saga transaction.
    pub fn with_transaction(mut self, transaction_id: Uuid) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    /// Partition key: character first, then account, then transaction.
    pub fn partition_key(&self) -> String {
        match (self.character_id, self.account_id, self.transaction_id) {
            (Some(id), _, _) | (None, Some(id), _) => partition_key(id),
            (None, None, Some(tx)) => tx.to_string(),
            (None, None, None) => String::new(),
        }
    }
}

/// Partition key for a subject identifier.
pub fn partition_key(subject: u32) -> String {
    subject.to_string()
}

/// Resolves environment-indirected topic names.
///
/// A topic is always referenced by the name of a `COMMAND_TOPIC_*` or
/// `EVENT_TOPIC_*` variable. Explicit overrides win, then the process
/// environment; when neither is set the variable name itself is used.
#[derive(Debug, Clone, Default)]
pub struct TopicResolver {
    overrides: HashMap<String, String>,
}

impl TopicResolver {
    /// Resolver backed by the process environment only.
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Pin a variable to a topic name without touching the environment.
    pub fn with_override(mut self, variable: &str, topic: &str) -> Self {
        self.overrides.insert(variable.to_string(), topic.to_string());
        self
    }

    /// Resolve a topic variable to its topic name.
    pub fn resolve(&self, variable: &str) -> String {
        if let Some(topic) = self.overrides.get(variable) {
            return topic.clone();
        }
        std::env::var(variable).unwrap_or_else(|_| variable.to_string())
    }
}

/// Publishes messages to the bus.
#[async_trait::async_trait]
pub trait Producer: Send + Sync {
    /// Publish a batch in order.
    async fn send(&self, messages: Vec<Message>) -> Result<()>;
}

/// Pulls messages from subscribed topics.
#[async_trait::async_trait]
pub trait Consumer: Send + Sync {
    /// Wait up to `timeout` for the next batch. An empty batch is not an error.
    async fn poll(&self, timeout: Duration) -> Result<Vec<Message>>;
}

/// Ordered batch of messages emitted together.
///
/// Handlers accumulate every command and event for one operation, then flush
/// the buffer once so a failed operation publishes nothing.
#[derive(Debug, Default)]
pub struct MessageBuffer {
    tenant_headers: HashMap<String, String>,
    messages: Vec<Message>,
}

impl MessageBuffer {
    /// Buffer stamping every message with the tenant's headers.
    pub fn new(tenant: &Tenant) -> Self {
        Self {
            tenant_headers: tenant.to_headers(),
            messages: Vec::new(),
        }
    }

    /// Append an envelope on a resolved topic.
    pub fn put<B: Serialize>(&mut self, topic: String, envelope: &Envelope<B>) -> Result<()> {
        let value = serde_json::to_value(envelope)?;
        self.messages.push(Message {
            topic,
            key: envelope.partition_key(),
            headers: self.tenant_headers.clone(),
            value,
        });
        Ok(())
    }

    /// Messages buffered so far.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Whether nothing was buffered.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Publish everything in insertion order.
    pub async fn flush(self, producer: &dyn Producer) -> Result<()> {
        if self.messages.is_empty() {
            return Ok(());
        }
        producer.send(self.messages).await
    }
}

pub(crate) fn bus_error(operation: &str, details: impl ToString) -> CoreError {
    CoreError::BusError {
        operation: operation.to_string(),
        details: details.to_string(),
    }
}

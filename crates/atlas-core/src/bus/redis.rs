// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Redis Streams transport.
//!
//! Each topic is a stream. An entry stores three fields: `key` (partition
//! key), `headers` (JSON object) and `value` (JSON envelope).

use std::collections::HashMap;
use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{Consumer, Message, Producer, bus_error};
use crate::error::Result;

const FIELD_KEY: &str = "key";
const FIELD_HEADERS: &str = "headers";
const FIELD_VALUE: &str = "value";

/// Producer appending to Redis streams with `XADD`.
#[derive(Clone)]
pub struct RedisStreamProducer {
    conn: ConnectionManager,
    max_len: Option<usize>,
}

impl RedisStreamProducer {
    /// Create a producer over an existing connection manager.
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            max_len: None,
        }
    }

    /// Connect to Redis at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn))
    }

    /// Cap streams approximately at `max_len` entries.
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }
}

#[async_trait::async_trait]
impl Producer for RedisStreamProducer {
    async fn send(&self, messages: Vec<Message>) -> Result<()> {
        let mut conn = self.conn.clone();
        for message in messages {
            let headers = serde_json::to_string(&message.headers)?;
            let value = serde_json::to_string(&message.value)?;

            let mut cmd = redis::cmd("XADD");
            cmd.arg(&message.topic);
            if let Some(max_len) = self.max_len {
                cmd.arg("MAXLEN").arg("~").arg(max_len);
            }
            cmd.arg("*")
                .arg(FIELD_KEY)
                .arg(&message.key)
                .arg(FIELD_HEADERS)
                .arg(headers)
                .arg(FIELD_VALUE)
                .arg(value);

            let id: String = cmd.query_async(&mut conn).await?;
            debug!(topic = %message.topic, key = %message.key, stream_id = %id, "Published message");
        }
        Ok(())
    }
}

/// Consumer reading a fixed set of streams with `XREAD`.
///
/// Starts from new entries only (`$`) and tracks the last delivered id per
/// stream.
pub struct RedisStreamConsumer {
    conn: ConnectionManager,
    topics: Vec<String>,
    last_ids: Mutex<HashMap<String, String>>,
    batch_size: usize,
}

impl RedisStreamConsumer {
    /// Create a consumer for `topics`.
    pub fn new(conn: ConnectionManager, topics: Vec<String>) -> Self {
        let last_ids = topics
            .iter()
            .map(|t| (t.clone(), "$".to_string()))
            .collect();
        Self {
            conn,
            topics,
            last_ids: Mutex::new(last_ids),
            batch_size: 100,
        }
    }

    /// Connect to Redis at `url` and subscribe to `topics`.
    pub async fn connect(url: &str, topics: Vec<String>) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn, topics))
    }

    /// Maximum entries read per stream per poll.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

#[async_trait::async_trait]
impl Consumer for RedisStreamConsumer {
    async fn poll(&self, timeout: Duration) -> Result<Vec<Message>> {
        if self.topics.is_empty() {
            tokio::time::sleep(timeout).await;
            return Ok(Vec::new());
        }

        let mut last_ids = self.last_ids.lock().await;
        let ids: Vec<String> = self
            .topics
            .iter()
            .map(|t| last_ids.get(t).cloned().unwrap_or_else(|| "$".to_string()))
            .collect();

        let opts = StreamReadOptions::default()
            .block(timeout.as_millis() as usize)
            .count(self.batch_size);

        let mut conn = self.conn.clone();
        let reply: Option<StreamReadReply> = conn
            .xread_options(&self.topics, &ids, &opts)
            .await
            .map_err(|e| bus_error("xread", e))?;

        let mut messages = Vec::new();
        for stream in reply.map(|r| r.keys).unwrap_or_default() {
            for entry in stream.ids {
                last_ids.insert(stream.key.clone(), entry.id.clone());
                match decode_entry(&stream.key, &entry.map) {
                    Some(message) => messages.push(message),
                    None => warn!(
                        topic = %stream.key,
                        stream_id = %entry.id,
                        "Skipping malformed stream entry"
                    ),
                }
            }
        }
        Ok(messages)
    }
}

fn decode_entry(topic: &str, map: &HashMap<String, redis::Value>) -> Option<Message> {
    let field = |name: &str| -> Option<String> {
        map.get(name)
            .and_then(|v| redis::from_redis_value::<String>(v).ok())
    };

    let key = field(FIELD_KEY).unwrap_or_default();
    let headers = field(FIELD_HEADERS)
        .and_then(|h| serde_json::from_str(&h).ok())
        .unwrap_or_default();
    let value = serde_json::from_str(&field(FIELD_VALUE)?).ok()?;

    Some(Message {
        topic: topic.to_string(),
        key,
        headers,
        value,
    })
}

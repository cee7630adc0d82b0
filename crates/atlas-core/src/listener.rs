// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Consumer loop feeding bus messages to a handler.
//!
//! Messages are handled one at a time in arrival order. A handler error is
//! logged and the message is dropped; the loop never stops on bad input.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::bus::{Consumer, Message};
use crate::error::Result;
use crate::orchestrator::SagaRuntime;

/// Something that reacts to bus messages.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one message.
    async fn handle(&self, message: &Message) -> Result<()>;
}

#[async_trait]
impl MessageHandler for SagaRuntime {
    async fn handle(&self, message: &Message) -> Result<()> {
        self.handle_message(message).await
    }
}

/// Configuration for a bus listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Longest a single poll blocks.
    pub poll_timeout: Duration,
    /// Pause after a failed poll.
    pub error_backoff: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(500),
            error_backoff: Duration::from_secs(1),
        }
    }
}

/// Background worker polling a consumer.
pub struct BusListener {
    name: &'static str,
    consumer: Arc<dyn Consumer>,
    handler: Arc<dyn MessageHandler>,
    config: ListenerConfig,
    shutdown: Arc<Notify>,
}

impl BusListener {
    /// Create a listener. `name` tags its log lines.
    pub fn new(
        name: &'static str,
        consumer: Arc<dyn Consumer>,
        handler: Arc<dyn MessageHandler>,
        config: ListenerConfig,
    ) -> Self {
        Self {
            name,
            consumer,
            handler,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Poll and dispatch until the shutdown signal fires.
    pub async fn run(&self) {
        info!(listener = self.name, "Bus listener started");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!(listener = self.name, "Bus listener received shutdown signal");
                    break;
                }

                polled = self.consumer.poll(self.config.poll_timeout) => {
                    match polled {
                        Ok(batch) => self.dispatch(batch).await,
                        Err(e) => {
                            warn!(listener = self.name, error = %e, "Bus poll failed");
                            tokio::time::sleep(self.config.error_backoff).await;
                        }
                    }
                }
            }
        }

        info!(listener = self.name, "Bus listener stopped");
    }

    async fn dispatch(&self, batch: Vec<Message>) {
        for message in batch {
            if let Err(e) = self.handler.handle(&message).await {
                error!(
                    listener = self.name,
                    topic = %message.topic,
                    kind = ?message.kind(),
                    error = %e,
                    "Failed to handle message"
                );
            }
        }
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker driving transport timers.
//!
//! Each tick runs, per tenant with live instances: boarding close, arrival,
//! and the stuck-instance sweep. On shutdown every held character is warped
//! back to its route's start map so nobody is left on a transit map.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{error, info};

use crate::transport::TransportProcessor;

/// Configuration for the transport scheduler.
#[derive(Debug, Clone)]
pub struct TransportSchedulerConfig {
    /// How often timers are evaluated.
    pub tick_interval: Duration,
}

impl Default for TransportSchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
        }
    }
}

pub struct TransportScheduler {
    transport: Arc<TransportProcessor>,
    config: TransportSchedulerConfig,
    shutdown: Arc<Notify>,
}

impl TransportScheduler {
    pub fn new(transport: Arc<TransportProcessor>, config: TransportSchedulerConfig) -> Self {
        Self {
            transport,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    pub async fn run(&self) {
        info!(
            tick_interval_ms = self.config.tick_interval.as_millis() as u64,
            "Transport scheduler started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Transport scheduler received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.tick_interval) => {
                    self.tick_once().await;
                }
            }
        }

        let warped = self.drain().await;
        info!(warped, "Transport scheduler stopped");
    }

    pub async fn tick_once(&self) {
        for tenant in self.transport.tenants() {
            if let Err(e) = self.transport.tick(&tenant).await {
                error!(tenant_id = %tenant.id, error = %e, "Transport tick failed");
            }
        }
    }

    /// Warp every held character home. Returns how many were warped.
    pub async fn drain(&self) -> usize {
        let mut warped = 0;
        for tenant in self.transport.tenants() {
            match self.transport.graceful_shutdown(&tenant).await {
                Ok(count) => warped += count,
                Err(e) => error!(tenant_id = %tenant.id, error = %e, "Failed to release transport passengers"),
            }
        }
        warped
    }
}

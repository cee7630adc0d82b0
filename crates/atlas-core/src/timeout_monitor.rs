// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker that fails sagas stuck past their deadline.
//!
//! Every saga carries a `timeout_at` refreshed on each transition. A saga
//! whose step never reports back (lost command, crashed service, dropped
//! event) is picked up here: a forward step is failed with a timeout reason
//! and compensation begins; a hanging compensator leaves the saga stuck.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::orchestrator::SagaRuntime;

/// Configuration for the timeout monitor.
#[derive(Debug, Clone)]
pub struct TimeoutMonitorConfig {
    /// How often to sweep for expired sagas.
    pub poll_interval: Duration,
}

impl Default for TimeoutMonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Periodically sweeps expired sagas.
pub struct TimeoutMonitor {
    runtime: Arc<SagaRuntime>,
    config: TimeoutMonitorConfig,
    shutdown: Arc<Notify>,
}

impl TimeoutMonitor {
    /// Create a new timeout monitor.
    pub fn new(runtime: Arc<SagaRuntime>, config: TimeoutMonitorConfig) -> Self {
        Self {
            runtime,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run until the shutdown signal fires.
    pub async fn run(&self) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            default_timeout_secs = self.runtime.config().default_timeout.as_secs(),
            "Saga timeout monitor started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Saga timeout monitor received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {
                    self.sweep_once().await;
                }
            }
        }

        info!("Saga timeout monitor stopped");
    }

    /// Run one sweep, logging rather than returning failures.
    pub async fn sweep_once(&self) -> usize {
        match self.runtime.sweep_timeouts().await {
            Ok(0) => {
                debug!("No expired sagas");
                0
            }
            Ok(handled) => {
                info!(handled, "Timed out expired sagas");
                handled
            }
            Err(e) => {
                error!(error = %e, "Failed to sweep expired sagas");
                0
            }
        }
    }
}

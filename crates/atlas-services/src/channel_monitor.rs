// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker that drops channel servers that stopped reporting.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{info, warn};

use crate::channel::ChannelRegistry;

/// Configuration for the channel monitor.
#[derive(Debug, Clone)]
pub struct ChannelMonitorConfig {
    /// How often to look for stale channels.
    pub poll_interval: Duration,
}

impl Default for ChannelMonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
        }
    }
}

pub struct ChannelMonitor {
    channels: Arc<ChannelRegistry>,
    config: ChannelMonitorConfig,
    shutdown: Arc<Notify>,
}

impl ChannelMonitor {
    pub fn new(channels: Arc<ChannelRegistry>, config: ChannelMonitorConfig) -> Self {
        Self {
            channels,
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
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Channel monitor started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Channel monitor received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {
                    self.sweep_once();
                }
            }
        }

        info!("Channel monitor stopped");
    }

    /// Remove stale channels. No command is emitted for them.
    pub fn sweep_once(&self) -> usize {
        let removed = self.channels.sweep_stale();
        for (tenant, server) in &removed {
            warn!(
                tenant_id = %tenant.id,
                world_id = server.world_id,
                channel_id = server.channel_id,
                "Removed stale channel server"
            );
        }
        removed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelRegistration;
    use atlas_core::bus::{RecordingProducer, TopicResolver};
    use atlas_core::clock::ManualClock;
    use atlas_core::tenant::Tenant;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_sweep_once_removes_silent_channels() {
        let clock = Arc::new(ManualClock::starting_now());
        let producer = Arc::new(RecordingProducer::new());
        let channels = Arc::new(ChannelRegistry::new(
            producer.clone(),
            TopicResolver::default(),
            clock.clone(),
        ));
        let tenant = Tenant::new(Uuid::new_v4(), "GMS", 83, 1);
        let registration = |channel_id| ChannelRegistration {
            channel_id,
            ip_address: "10.0.0.5".to_string(),
            port: 7575,
            current_capacity: 0,
            max_capacity: 100,
        };
        channels.register(&tenant, 0, registration(1)).unwrap();
        clock.advance_secs(10);
        channels.register(&tenant, 0, registration(2)).unwrap();
        clock.advance_secs(6);

        let monitor = ChannelMonitor::new(channels.clone(), ChannelMonitorConfig::default());
        assert_eq!(monitor.sweep_once(), 1);
        assert!(channels.get(&tenant, 0, 1).is_none());
        assert!(channels.get(&tenant, 0, 2).is_some());
        assert!(producer.messages().is_empty());
    }
}

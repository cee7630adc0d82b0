// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker that expires skill cooldowns.
//!
//! Expired entries are removed from the key-value store and a
//! `COOLDOWN_EXPIRED` event is published for each one. The store's TTL only
//! collects what the sweep missed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::skills::SkillCooldowns;

/// Configuration for the cooldown sweeper.
#[derive(Debug, Clone)]
pub struct CooldownSweeperConfig {
    /// How often to sweep.
    pub poll_interval: Duration,
}

impl Default for CooldownSweeperConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }
}

pub struct CooldownSweeper {
    skills: Arc<SkillCooldowns>,
    config: CooldownSweeperConfig,
    shutdown: Arc<Notify>,
}

impl CooldownSweeper {
    pub fn new(skills: Arc<SkillCooldowns>, config: CooldownSweeperConfig) -> Self {
        Self {
            skills,
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
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Cooldown sweeper started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Cooldown sweeper received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {
                    self.sweep_once().await;
                }
            }
        }

        info!("Cooldown sweeper stopped");
    }

    pub async fn sweep_once(&self) -> usize {
        match self.skills.sweep().await {
            Ok(0) => 0,
            Ok(expired) => {
                debug!(expired, "Expired skill cooldowns");
                expired
            }
            Err(e) => {
                error!(error = %e, "Failed to sweep skill cooldowns");
                0
            }
        }
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Durable cooldown registry.
//!
//! Entries map `(tenant, subject, item)` to an absolute expiry and live in an
//! external key-value store:
//!
//! ```text
//! atlas:<namespace>:<tenant>:<subject>:<item>  ->  expiry (unix millis)
//! atlas:<namespace>:_tenants                   ->  set of tenants ever seen
//! ```
//!
//! The tenant set lets the expiry sweep visit only tenants that ever had an
//! entry instead of scanning the whole keyspace. Stale set members only cost
//! an empty scan.

pub mod kv;

pub use self::kv::{KvStore, MemoryKv, RedisKv};

use std::sync::Arc;
use std::time::Duration;

use atlas_core::clock::Clock;
use atlas_core::tenant::Tenant;
use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Keys fetched per scan page.
const SCAN_CHUNK: usize = 100;

/// Extra lifetime granted to stored entries beyond their expiry, so the sweep
/// still observes them and can report the expiration.
const TTL_GRACE: Duration = Duration::from_secs(60);

/// An entry removed by the expiry sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredCooldown {
    pub tenant: Tenant,
    pub subject: String,
    pub item: String,
    pub expired_at: DateTime<Utc>,
}

/// Cooldowns for one namespace (e.g. `skill`).
pub struct CooldownRegistry {
    kv: Arc<dyn KvStore>,
    namespace: String,
    clock: Arc<dyn Clock>,
}

impl CooldownRegistry {
    /// Create a registry storing keys under `atlas:<namespace>:`.
    pub fn new(kv: Arc<dyn KvStore>, namespace: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            kv,
            namespace: namespace.into(),
            clock,
        }
    }

    fn tenant_prefix(&self, tenant: &Tenant) -> String {
        format!("atlas:{}:{}", self.namespace, tenant.key())
    }

    fn key(&self, tenant: &Tenant, subject: &str, item: &str) -> String {
        format!("{}:{}:{}", self.tenant_prefix(tenant), subject, item)
    }

    fn tenants_key(&self) -> String {
        format!("atlas:{}:_tenants", self.namespace)
    }

    /// Start a cooldown of `duration` from now. Returns the expiry.
    pub async fn apply(
        &self,
        tenant: &Tenant,
        subject: impl ToString,
        item: impl ToString,
        duration: Duration,
    ) -> Result<DateTime<Utc>> {
        let out_of_range =
            || Error::Validation(format!("cooldown of {:?} is out of range", duration));
        let expires_at = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| self.clock.now().checked_add_signed(d))
            .ok_or_else(out_of_range)?;
        let ttl = duration.checked_add(TTL_GRACE).ok_or_else(out_of_range)?;
        let key = self.key(tenant, &subject.to_string(), &item.to_string());

        self.kv
            .set(&key, &expires_at.timestamp_millis().to_string(), Some(ttl))
            .await?;
        self.kv
            .sadd(&self.tenants_key(), &serde_json::to_string(tenant)?)
            .await?;

        debug!(key = %key, expires_at = %expires_at, "Cooldown applied");
        Ok(expires_at)
    }

    /// Expiry of an active cooldown.
    pub async fn get(
        &self,
        tenant: &Tenant,
        subject: impl ToString,
        item: impl ToString,
    ) -> Result<Option<DateTime<Utc>>> {
        let key = self.key(tenant, &subject.to_string(), &item.to_string());
        Ok(self.kv.get(&key).await?.and_then(|v| parse_expiry(&v)))
    }

    /// Remove one cooldown. Idempotent.
    pub async fn clear(
        &self,
        tenant: &Tenant,
        subject: impl ToString,
        item: impl ToString,
    ) -> Result<bool> {
        let key = self.key(tenant, &subject.to_string(), &item.to_string());
        self.kv.del(&key).await
    }

    /// Remove every cooldown of a subject. Returns the number removed.
    pub async fn clear_all(&self, tenant: &Tenant, subject: impl ToString) -> Result<usize> {
        let pattern = format!("{}:{}:*", self.tenant_prefix(tenant), subject.to_string());
        let keys = self.scan_all(&pattern).await?;
        let mut removed = 0;
        for key in keys {
            if self.kv.del(&key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove every entry whose expiry has passed, across all known tenants.
    pub async fn expire_sweep(&self) -> Result<Vec<ExpiredCooldown>> {
        let now = self.clock.now();
        let mut expired = Vec::new();

        for member in self.kv.smembers(&self.tenants_key()).await? {
            let tenant: Tenant = match serde_json::from_str(&member) {
                Ok(t) => t,
                Err(e) => {
                    warn!(member = %member, error = %e, "Skipping unreadable tenant entry");
                    continue;
                }
            };

            let prefix = format!("{}:", self.tenant_prefix(&tenant));
            let mut cursor = 0;
            loop {
                let (next, keys) = self
                    .kv
                    .scan(&format!("{}*", prefix), cursor, SCAN_CHUNK)
                    .await?;
                for key in keys {
                    let Some(value) = self.kv.get(&key).await? else {
                        continue;
                    };
                    let Some(expires_at) = parse_expiry(&value) else {
                        warn!(key = %key, "Removing cooldown with unreadable expiry");
                        self.kv.del(&key).await?;
                        continue;
                    };
                    if expires_at > now {
                        continue;
                    }
                    if !self.kv.del(&key).await? {
                        continue;
                    }
                    if let Some((subject, item)) = key
                        .strip_prefix(&prefix)
                        .and_then(|rest| rest.split_once(':'))
                    {
                        expired.push(ExpiredCooldown {
                            tenant: tenant.clone(),
                            subject: subject.to_string(),
                            item: item.to_string(),
                            expired_at: expires_at,
                        });
                    }
                }
                if next == 0 {
                    break;
                }
                cursor = next;
            }
        }

        Ok(expired)
    }

    async fn scan_all(&self, pattern: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut cursor = 0;
        loop {
            let (next, page) = self.kv.scan(pattern, cursor, SCAN_CHUNK).await?;
            keys.extend(page);
            if next == 0 {
                return Ok(keys);
            }
            cursor = next;
        }
    }
}

fn parse_expiry(value: &str) -> Option<DateTime<Utc>> {
    let millis: i64 = value.parse().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

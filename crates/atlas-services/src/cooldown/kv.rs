// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Key-value backing stores for cooldowns.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::error::Result;

/// Minimal TTL-capable key-value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Store `value` under `key`, expiring after `ttl` when given.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Delete a key. Returns whether it existed.
    async fn del(&self, key: &str) -> Result<bool>;

    /// Add a member to a set.
    async fn sadd(&self, set: &str, member: &str) -> Result<()>;

    /// Members of a set.
    async fn smembers(&self, set: &str) -> Result<Vec<String>>;

    /// One page of keys matching a trailing-`*` glob. A returned cursor of
    /// zero means the scan is complete.
    async fn scan(&self, pattern: &str, cursor: u64, count: usize) -> Result<(u64, Vec<String>)>;
}

/// In-process store for tests and single-node runs. TTLs are ignored; the
/// cooldown sweep removes entries itself.
///
/// Scan cursors name the last key handed out, so keys deleted between pages
/// never shift the remainder of the scan.
#[derive(Debug, Default)]
pub struct MemoryKv {
    values: Mutex<BTreeMap<String, String>>,
    sets: Mutex<HashMap<String, BTreeSet<String>>>,
    cursors: Mutex<HashMap<u64, String>>,
    next_cursor: AtomicU64,
}

impl MemoryKv {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.values.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn set(&self, key: &str, value: &str, _ttl: Option<Duration>) -> Result<()> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }

    async fn del(&self, key: &str) -> Result<bool> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)
            .is_some())
    }

    async fn sadd(&self, set: &str, member: &str) -> Result<()> {
        self.sets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn smembers(&self, set: &str) -> Result<Vec<String>> {
        Ok(self
            .sets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(set)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn scan(&self, pattern: &str, cursor: u64, count: usize) -> Result<(u64, Vec<String>)> {
        let after = match cursor {
            0 => None,
            c => match self.cursors.lock().unwrap_or_else(|e| e.into_inner()).remove(&c) {
                Some(last) => Some(last),
                None => return Ok((0, Vec::new())),
            },
        };

        let lower = match &after {
            Some(last) => Bound::Excluded(last.as_str()),
            None => Bound::Unbounded,
        };
        let (page, more) = {
            let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
            let mut matching = values
                .range::<str, _>((lower, Bound::Unbounded))
                .map(|(k, _)| k)
                .filter(|k| matches(pattern, k));
            let page: Vec<String> = matching.by_ref().take(count.max(1)).cloned().collect();
            let more = matching.next().is_some();
            (page, more)
        };

        match page.last() {
            Some(last) if more => {
                let next = self.next_cursor.fetch_add(1, Ordering::Relaxed) + 1;
                self.cursors
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(next, last.clone());
                Ok((next, page))
            }
            _ => Ok((0, page)),
        }
    }
}

/// Redis-backed store.
#[derive(Clone)]
pub struct RedisKv {
    conn: ConnectionManager,
}

impl RedisKv {
    /// Create a store over an existing connection manager.
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Connect to Redis at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl KvStore for RedisKv {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed > 0)
    }

    async fn sadd(&self, set: &str, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("SADD")
            .arg(set)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn smembers(&self, set: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = redis::cmd("SMEMBERS").arg(set).query_async(&mut conn).await?;
        Ok(members)
    }

    async fn scan(&self, pattern: &str, cursor: u64, count: usize) -> Result<(u64, Vec<String>)> {
        let mut conn = self.conn.clone();
        let page: (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_scan_pages_through_matches() {
        let kv = MemoryKv::new();
        for i in 0..5 {
            kv.set(&format!("a:{}", i), "x", None).await.unwrap();
        }
        kv.set("b:0", "x", None).await.unwrap();

        let mut cursor = 0;
        let mut seen = Vec::new();
        loop {
            let (next, keys) = kv.scan("a:*", cursor, 2).await.unwrap();
            seen.extend(keys);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        assert_eq!(seen.len(), 5);
        assert!(seen.iter().all(|k| k.starts_with("a:")));
    }

    #[tokio::test]
    async fn test_memory_scan_survives_deletes_between_pages() {
        let kv = MemoryKv::new();
        for i in 0..10 {
            kv.set(&format!("a:{}", i), "x", None).await.unwrap();
        }

        let mut cursor = 0;
        let mut seen = Vec::new();
        loop {
            let (next, keys) = kv.scan("a:*", cursor, 3).await.unwrap();
            for key in &keys {
                assert!(kv.del(key).await.unwrap());
            }
            seen.extend(keys);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        assert_eq!(seen.len(), 10);
        assert!(kv.is_empty());
    }

    #[tokio::test]
    async fn test_memory_sets_and_delete() {
        let kv = MemoryKv::new();
        kv.sadd("s", "one").await.unwrap();
        kv.sadd("s", "one").await.unwrap();
        assert_eq!(kv.smembers("s").await.unwrap(), vec!["one".to_string()]);

        kv.set("k", "v", Some(Duration::from_secs(1))).await.unwrap();
        assert!(kv.del("k").await.unwrap());
        assert!(!kv.del("k").await.unwrap());
        assert!(kv.get("k").await.unwrap().is_none());
    }
}

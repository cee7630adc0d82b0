// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tenant-scoped in-memory registry primitive.
//!
//! A two-level map: a coarse lock guards the tenant table, and each tenant
//! owns a fine-grained lock over its own contents. Readers of different
//! tenants never contend; a writer excludes only its own tenant.
//!
//! ```text
//! RwLock<HashMap<Tenant, ─┐
//!                         ├─► Arc<RwLock<HashMap<K, V>>>   (tenant A)
//!                         ├─► Arc<RwLock<HashMap<K, V>>>   (tenant B)
//!                         └─► ...
//! ```
//!
//! Sub-stores are materialised lazily on the first write using a read-locked
//! probe followed by a write-locked create with a double check, so concurrent
//! first writers share one sub-store. Reads against an unknown tenant never
//! take the coarse write lock and never create anything.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::tenant::Tenant;

type Store<K, V> = Arc<RwLock<HashMap<K, V>>>;

/// Concurrent map keyed by `(tenant, key)`.
pub struct TenantRegistry<K, V> {
    tenants: RwLock<HashMap<Tenant, Store<K, V>>>,
}

impl<K, V> Default for TenantRegistry<K, V> {
    fn default() -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> std::fmt::Debug for TenantRegistry<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantRegistry")
            .field("tenants", &read(&self.tenants).len())
            .finish()
    }
}

// Poisoning only happens if a closure passed to `read`/`write` panicked; the
// maps themselves are never left half-updated, so recover the guard.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl<K, V> TenantRegistry<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn existing(&self, tenant: &Tenant) -> Option<Store<K, V>> {
        read(&self.tenants).get(tenant).cloned()
    }

    fn materialize(&self, tenant: &Tenant) -> Store<K, V> {
        if let Some(store) = self.existing(tenant) {
            return store;
        }

        let mut tenants = write(&self.tenants);
        // Another writer may have created it between the probe and the lock.
        tenants
            .entry(tenant.clone())
            .or_insert_with(|| Arc::new(RwLock::new(HashMap::new())))
            .clone()
    }

    /// Insert or overwrite a value.
    pub fn put(&self, tenant: &Tenant, key: K, value: V) {
        let store = self.materialize(tenant);
        write(&store).insert(key, value);
    }

    /// Look up a value.
    pub fn get(&self, tenant: &Tenant, key: &K) -> Option<V> {
        let store = self.existing(tenant)?;
        let guard = read(&store);
        guard.get(key).cloned()
    }

    /// Whether the key is present.
    pub fn contains(&self, tenant: &Tenant, key: &K) -> bool {
        self.existing(tenant)
            .map(|store| read(&store).contains_key(key))
            .unwrap_or(false)
    }

    /// Remove a value, returning it if it was present.
    pub fn remove(&self, tenant: &Tenant, key: &K) -> Option<V> {
        let store = self.existing(tenant)?;
        let mut guard = write(&store);
        guard.remove(key)
    }

    /// Snapshot of every value held for a tenant.
    pub fn values(&self, tenant: &Tenant) -> Vec<V> {
        self.existing(tenant)
            .map(|store| read(&store).values().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of every entry held for a tenant.
    pub fn entries(&self, tenant: &Tenant) -> Vec<(K, V)> {
        self.existing(tenant)
            .map(|store| {
                read(&store)
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of entries held for a tenant.
    pub fn len(&self, tenant: &Tenant) -> usize {
        self.existing(tenant)
            .map(|store| read(&store).len())
            .unwrap_or(0)
    }

    /// Whether the tenant holds no entries.
    pub fn is_empty(&self, tenant: &Tenant) -> bool {
        self.len(tenant) == 0
    }

    /// Snapshot of every tenant the registry has seen.
    pub fn tenants(&self) -> Vec<Tenant> {
        read(&self.tenants).keys().cloned().collect()
    }

    /// Invoke `f` for each tenant over a snapshot of the tenant table.
    ///
    /// The coarse lock is released before `f` runs, so `f` may call back into
    /// the registry.
    pub fn for_each_tenant(&self, mut f: impl FnMut(&Tenant)) {
        for tenant in self.tenants() {
            f(&tenant);
        }
    }

    /// Wipe a tenant, returning the number of removed entries.
    pub fn clear(&self, tenant: &Tenant) -> usize {
        match self.existing(tenant) {
            Some(store) => {
                let mut guard = write(&store);
                let count = guard.len();
                guard.clear();
                count
            }
            None => 0,
        }
    }

    /// Drop every tenant. Intended for tests.
    pub fn reset(&self) {
        write(&self.tenants).clear();
    }

    /// Run `f` under the tenant's read lock. Unknown tenants see an empty map.
    pub fn read<R>(&self, tenant: &Tenant, f: impl FnOnce(&HashMap<K, V>) -> R) -> R {
        match self.existing(tenant) {
            Some(store) => f(&read(&store)),
            None => f(&HashMap::new()),
        }
    }

    /// Run `f` under the tenant's write lock, materialising the tenant first.
    ///
    /// Use this for compound updates that must be linearised per tenant.
    pub fn write<R>(&self, tenant: &Tenant, f: impl FnOnce(&mut HashMap<K, V>) -> R) -> R {
        let store = self.materialize(tenant);
        let mut guard = write(&store);
        f(&mut guard)
    }
}

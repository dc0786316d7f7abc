// ABOUTME: Typed transaction store over the cache backend with per-namespace TTLs
// ABOUTME: Provides phase re-keying, atomic claim/take and per-key update serialization
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Transaction store
//!
//! The store is the only shared mutable state of the authorization engine. Each
//! [`Namespace`] is an independent key space with its own TTL. A phase move writes the
//! value under the new key before deleting the old one, so a failure between the two
//! steps leaves the transaction reachable under the new key.

use super::{Cache, CacheKey, CacheTtlConfig, Namespace};
use crate::errors::AppResult;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Typed, namespaced transaction store
#[derive(Clone)]
pub struct TransactionStore {
    cache: Cache,
    ttl: CacheTtlConfig,
    locks: LockMap,
}

/// Guard serializing read-modify-write updates of one key within this process
pub struct KeyLockGuard {
    key: String,
    locks: LockMap,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for KeyLockGuard {
    fn drop(&mut self) {
        // Map entry plus our guard; anything more means another task is waiting
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) <= 2);
    }
}

impl TransactionStore {
    /// Create a store over a cache backend
    #[must_use]
    pub fn new(cache: Cache, ttl: CacheTtlConfig) -> Self {
        Self {
            cache,
            ttl,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// TTL applied to a namespace
    #[must_use]
    pub const fn ttl_for(&self, namespace: Namespace) -> Duration {
        self.ttl.ttl_for(namespace)
    }

    /// Name of the underlying backend
    #[must_use]
    pub const fn backend_name(&self) -> &'static str {
        self.cache.backend_name()
    }

    /// Read a value
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the value cannot be decoded
    pub async fn get<T: DeserializeOwned>(
        &self,
        namespace: Namespace,
        id: &str,
    ) -> AppResult<Option<T>> {
        self.cache.get(&CacheKey::new(namespace, id)).await
    }

    /// Write a value with the namespace TTL
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails
    pub async fn put<T: Serialize + Send + Sync>(
        &self,
        namespace: Namespace,
        id: &str,
        value: &T,
    ) -> AppResult<()> {
        self.put_with_ttl(namespace, id, value, self.ttl_for(namespace))
            .await
    }

    /// Write a value with an explicit TTL
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails
    pub async fn put_with_ttl<T: Serialize + Send + Sync>(
        &self,
        namespace: Namespace,
        id: &str,
        value: &T,
        ttl: Duration,
    ) -> AppResult<()> {
        self.cache
            .set(&CacheKey::new(namespace, id), value, ttl)
            .await
    }

    /// Remove a value
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails
    pub async fn delete(&self, namespace: Namespace, id: &str) -> AppResult<()> {
        self.cache.invalidate(&CacheKey::new(namespace, id)).await
    }

    /// Insert a value only if the key is absent; exactly one concurrent caller gets `true`
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails
    pub async fn claim_once<T: Serialize + Send + Sync>(
        &self,
        namespace: Namespace,
        id: &str,
        value: &T,
    ) -> AppResult<bool> {
        self.claim_once_with_ttl(namespace, id, value, self.ttl_for(namespace))
            .await
    }

    /// [`Self::claim_once`] with an explicit TTL
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails
    pub async fn claim_once_with_ttl<T: Serialize + Send + Sync>(
        &self,
        namespace: Namespace,
        id: &str,
        value: &T,
        ttl: Duration,
    ) -> AppResult<bool> {
        self.cache
            .claim_once(&CacheKey::new(namespace, id), value, ttl)
            .await
    }

    /// Atomically read and remove a value; at most one concurrent caller receives it
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the value cannot be decoded
    pub async fn take<T: DeserializeOwned>(
        &self,
        namespace: Namespace,
        id: &str,
    ) -> AppResult<Option<T>> {
        self.cache.take(&CacheKey::new(namespace, id)).await
    }

    /// Re-key a value: write under the new key, then delete the old key
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails; the value may then exist under both keys
    pub async fn move_to<T: Serialize + Send + Sync>(
        &self,
        from: (Namespace, &str),
        to: (Namespace, &str),
        value: &T,
    ) -> AppResult<()> {
        self.put(to.0, to.1, value).await?;
        if from != to {
            self.delete(from.0, from.1).await?;
        }
        Ok(())
    }

    /// Serialize read-modify-write sequences on one key within this process
    pub async fn lock(&self, namespace: Namespace, id: &str) -> KeyLockGuard {
        let key = CacheKey::new(namespace, id).to_string();
        let mutex = self.locks.entry(key.clone()).or_default().clone();
        let guard = mutex.lock_owned().await;
        KeyLockGuard {
            key,
            locks: self.locks.clone(),
            _guard: guard,
        }
    }

    /// Mark an individual id hash as blocked for the configured duration
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails
    pub async fn block_individual(&self, individual_id_hash: &str) -> AppResult<()> {
        self.put(Namespace::BlockedIndividual, individual_id_hash, &true)
            .await
    }

    /// Whether an individual id hash is currently blocked
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails
    pub async fn is_blocked(&self, individual_id_hash: &str) -> AppResult<bool> {
        self.cache
            .exists(&CacheKey::new(
                Namespace::BlockedIndividual,
                individual_id_hash,
            ))
            .await
    }

    /// Verify the backend is reachable
    ///
    /// # Errors
    ///
    /// Returns an error if the backend health check fails
    pub async fn health_check(&self) -> AppResult<()> {
        self.cache.health_check().await
    }
}

// ABOUTME: Cache factory for configuration-based backend selection
// ABOUTME: Dispatches to the in-memory or Redis backend behind one cloneable handle
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::memory::InMemoryCache;
use super::redis::RedisCache;
use super::{CacheConfig, CacheKey, CacheProvider};
use crate::errors::AppResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone)]
enum Backend {
    Memory(InMemoryCache),
    Redis(RedisCache),
}

/// Unified cache interface
///
/// Uses Redis when `redis_url` is configured and the in-memory LRU otherwise.
#[derive(Clone)]
pub struct Cache {
    inner: Backend,
}

/// Forward a call to whichever backend is active
macro_rules! dispatch {
    ($self:ident, $cache:ident => $call:expr) => {
        match &$self.inner {
            Backend::Memory($cache) => $call,
            Backend::Redis($cache) => $call,
        }
    };
}

impl Cache {
    /// Create new cache instance based on configuration
    ///
    /// # Errors
    ///
    /// Returns an error if cache initialization fails
    pub async fn new(config: CacheConfig) -> AppResult<Self> {
        let inner = if config.redis_url.is_some() {
            tracing::info!("Initializing Redis transaction store");
            Backend::Redis(RedisCache::new(config).await?)
        } else {
            tracing::info!(
                "Initializing in-memory transaction store (max entries: {})",
                config.max_entries
            );
            Backend::Memory(InMemoryCache::new(config).await?)
        };
        Ok(Self { inner })
    }

    /// Create cache from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if cache initialization fails
    pub async fn from_env() -> AppResult<Self> {
        Self::new(CacheConfig::from_env()).await
    }

    /// Name of the active backend
    #[must_use]
    pub const fn backend_name(&self) -> &'static str {
        match self.inner {
            Backend::Memory(_) => "memory",
            Backend::Redis(_) => "redis",
        }
    }

    /// Store value in cache with TTL
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or storage fails
    pub async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> AppResult<()> {
        dispatch!(self, cache => cache.set(key, value, ttl).await)
    }

    /// Retrieve value from cache
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails
    pub async fn get<T: for<'de> Deserialize<'de>>(&self, key: &CacheKey) -> AppResult<Option<T>> {
        dispatch!(self, cache => cache.get(key).await)
    }

    /// Store value only if absent
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or storage fails
    pub async fn claim_once<T: Serialize + Send + Sync>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> AppResult<bool> {
        dispatch!(self, cache => cache.claim_once(key, value, ttl).await)
    }

    /// Atomically read and remove a value
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization or storage fails
    pub async fn take<T: for<'de> Deserialize<'de>>(
        &self,
        key: &CacheKey,
    ) -> AppResult<Option<T>> {
        dispatch!(self, cache => cache.take(key).await)
    }

    /// Remove single cache entry
    ///
    /// # Errors
    ///
    /// Returns an error if invalidation fails
    pub async fn invalidate(&self, key: &CacheKey) -> AppResult<()> {
        dispatch!(self, cache => cache.invalidate(key).await)
    }

    /// Check if key exists in cache
    ///
    /// # Errors
    ///
    /// Returns an error if existence check fails
    pub async fn exists(&self, key: &CacheKey) -> AppResult<bool> {
        dispatch!(self, cache => cache.exists(key).await)
    }

    /// Verify cache backend is healthy
    ///
    /// # Errors
    ///
    /// Returns an error if health check fails
    pub async fn health_check(&self) -> AppResult<()> {
        dispatch!(self, cache => cache.health_check().await)
    }
}

// ABOUTME: Unit tests for the in-memory cache and the typed transaction store over it
// ABOUTME: Tests TTL expiration, capacity limits, claim-once exclusivity, take and re-keying
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use anyhow::Result;
use futures_util::future::join_all;
use oidc_transaction_server::cache::{
    Cache, CacheConfig, CacheKey, CacheTtlConfig, Namespace, TransactionStore,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct TestData {
    value: String,
    count: u32,
}

fn test_key(namespace: Namespace) -> CacheKey {
    CacheKey::new(namespace, Uuid::new_v4().to_string())
}

/// Helper: Create in-memory cache with custom capacity
async fn create_test_cache(max_entries: usize) -> Result<Cache> {
    let config = CacheConfig {
        max_entries,
        redis_url: None,
        enable_background_cleanup: false,
        ..CacheConfig::default()
    };
    Ok(Cache::new(config).await?)
}

async fn create_test_store() -> Result<TransactionStore> {
    Ok(TransactionStore::new(
        create_test_cache(1000).await?,
        CacheTtlConfig::default(),
    ))
}

#[tokio::test]
async fn test_cache_set_and_get() -> Result<()> {
    let cache = create_test_cache(100).await?;
    let key = test_key(Namespace::PreAuth);
    let data = TestData {
        value: "test".to_owned(),
        count: 42,
    };

    cache.set(&key, &data, Duration::from_secs(10)).await?;

    let retrieved: Option<TestData> = cache.get(&key).await?;
    assert_eq!(retrieved, Some(data));
    Ok(())
}

#[tokio::test]
async fn test_cache_expiration() -> Result<()> {
    let cache = create_test_cache(100).await?;
    let key = test_key(Namespace::AuthCode);
    let data = TestData {
        value: "expires".to_owned(),
        count: 1,
    };

    cache.set(&key, &data, Duration::from_secs(1)).await?;
    assert!(cache.exists(&key).await?);

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let retrieved: Option<TestData> = cache.get(&key).await?;
    assert_eq!(retrieved, None);
    assert!(!cache.exists(&key).await?);
    Ok(())
}

#[tokio::test]
async fn test_cache_capacity_evicts_least_recently_used() -> Result<()> {
    let cache = create_test_cache(2).await?;
    let first = test_key(Namespace::PreAuth);
    let second = test_key(Namespace::PreAuth);
    let third = test_key(Namespace::PreAuth);

    cache.set(&first, &1_u32, Duration::from_secs(60)).await?;
    cache.set(&second, &2_u32, Duration::from_secs(60)).await?;
    cache.set(&third, &3_u32, Duration::from_secs(60)).await?;

    assert!(!cache.exists(&first).await?);
    assert!(cache.exists(&second).await?);
    assert!(cache.exists(&third).await?);
    Ok(())
}

#[tokio::test]
async fn test_claim_once_only_first_writer_wins() -> Result<()> {
    let cache = create_test_cache(100).await?;
    let key = test_key(Namespace::PhaseClaim);

    assert!(cache.claim_once(&key, &"first", Duration::from_secs(60)).await?);
    assert!(!cache.claim_once(&key, &"second", Duration::from_secs(60)).await?);

    let stored: Option<String> = cache.get(&key).await?;
    assert_eq!(stored.as_deref(), Some("first"));
    Ok(())
}

#[tokio::test]
async fn test_claim_once_after_expiry_succeeds_again() -> Result<()> {
    let cache = create_test_cache(100).await?;
    let key = test_key(Namespace::LinkedCode);

    assert!(cache.claim_once(&key, &1_u8, Duration::from_millis(200)).await?);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(cache.claim_once(&key, &2_u8, Duration::from_secs(60)).await?);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_claim_once_concurrent_single_winner() -> Result<()> {
    let cache = Arc::new(create_test_cache(100).await?);
    let key = test_key(Namespace::Authenticated);

    let attempts = (0..32).map(|i| {
        let cache = cache.clone();
        let key = key.clone();
        tokio::spawn(async move { cache.claim_once(&key, &i, Duration::from_secs(60)).await })
    });
    let winners = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .filter(|won| *won)
        .count();

    assert_eq!(winners, 1);
    Ok(())
}

#[tokio::test]
async fn test_take_returns_value_once() -> Result<()> {
    let cache = create_test_cache(100).await?;
    let key = test_key(Namespace::LinkAuthCodeResult);
    cache.set(&key, &"code", Duration::from_secs(60)).await?;

    let first: Option<String> = cache.take(&key).await?;
    let second: Option<String> = cache.take(&key).await?;

    assert_eq!(first.as_deref(), Some("code"));
    assert_eq!(second, None);
    Ok(())
}

#[tokio::test]
async fn test_store_move_to_rekeys_value() -> Result<()> {
    let store = create_test_store().await?;
    let id = Uuid::new_v4().to_string();
    store.put(Namespace::PreAuth, &id, &"txn").await?;

    store
        .move_to((Namespace::PreAuth, &id), (Namespace::Authenticated, &id), &"txn")
        .await?;

    let old: Option<String> = store.get(Namespace::PreAuth, &id).await?;
    let new: Option<String> = store.get(Namespace::Authenticated, &id).await?;
    assert_eq!(old, None);
    assert_eq!(new.as_deref(), Some("txn"));
    Ok(())
}

#[tokio::test]
async fn test_store_namespaces_are_isolated() -> Result<()> {
    let store = create_test_store().await?;
    let id = "shared-id";
    store.put(Namespace::AuthCode, id, &1_u32).await?;

    let other: Option<u32> = store.get(Namespace::UserInfo, id).await?;
    assert_eq!(other, None);
    assert!(store.claim_once(Namespace::PhaseClaim, id, &true).await?);
    assert!(!store.claim_once(Namespace::PhaseClaim, id, &true).await?);
    Ok(())
}

#[tokio::test]
async fn test_store_blocked_individual() -> Result<()> {
    let store = create_test_store().await?;
    assert!(!store.is_blocked("hash-1").await?);
    store.block_individual("hash-1").await?;
    assert!(store.is_blocked("hash-1").await?);
    assert!(!store.is_blocked("hash-2").await?);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_store_lock_serializes_read_modify_write() -> Result<()> {
    let store = Arc::new(create_test_store().await?);
    let id = Uuid::new_v4().to_string();
    store.put(Namespace::PreAuth, &id, &0_u32).await?;

    let increments = (0..16).map(|_| {
        let store = store.clone();
        let id = id.clone();
        tokio::spawn(async move {
            let _guard = store.lock(Namespace::PreAuth, &id).await;
            let current: u32 = store.get(Namespace::PreAuth, &id).await?.unwrap_or(0);
            tokio::task::yield_now().await;
            store.put(Namespace::PreAuth, &id, &(current + 1)).await
        })
    });
    for joined in join_all(increments).await {
        joined.unwrap()?;
    }

    let total: Option<u32> = store.get(Namespace::PreAuth, &id).await?;
    assert_eq!(total, Some(16));
    Ok(())
}

#[tokio::test]
async fn test_store_health_check() -> Result<()> {
    let store = create_test_store().await?;
    store.health_check().await?;
    assert_eq!(store.backend_name(), "memory");
    Ok(())
}

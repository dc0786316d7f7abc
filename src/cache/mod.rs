// ABOUTME: Transaction store abstraction with namespaced keys and atomic claim primitives
// ABOUTME: Pluggable backend support (in-memory, Redis) behind the CacheProvider trait
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Cache factory for selecting the backend from configuration
pub mod factory;
/// In-memory cache implementation
pub mod memory;
/// Redis cache implementation
pub mod redis;
/// Typed transaction store built on a cache backend
pub mod transactions;

pub use crate::config::cache::{CacheConfig, CacheTtlConfig};
pub use factory::Cache;
pub use transactions::TransactionStore;

use crate::errors::AppResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Cache provider trait for pluggable backend implementations
///
/// # Examples
///
/// ```rust,no_run
/// use oidc_transaction_server::cache::{CacheConfig, CacheKey, CacheProvider, Namespace};
/// use oidc_transaction_server::cache::memory::InMemoryCache;
/// use std::time::Duration;
/// # async fn example() -> Result<(), oidc_transaction_server::errors::AppError> {
///
/// let config = CacheConfig {
///     enable_background_cleanup: false,
///     ..Default::default()
/// };
/// let cache = InMemoryCache::new(config).await?;
///
/// let key = CacheKey::new(Namespace::PhaseClaim, "transaction-id");
///
/// // Only the first claim on a key succeeds
/// assert!(cache.claim_once(&key, &true, Duration::from_secs(60)).await?);
/// assert!(!cache.claim_once(&key, &true, Duration::from_secs(60)).await?);
/// # Ok(())
/// # }
/// ```
#[async_trait::async_trait]
pub trait CacheProvider: Send + Sync + Clone {
    /// Create new cache instance with configuration
    ///
    /// # Errors
    ///
    /// Returns an error if cache initialization fails
    async fn new(config: CacheConfig) -> AppResult<Self>
    where
        Self: Sized;

    /// Store value in cache with TTL, replacing any existing value
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or storage fails
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> AppResult<()>;

    /// Retrieve value from cache
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails
    async fn get<T: for<'de> Deserialize<'de>>(&self, key: &CacheKey) -> AppResult<Option<T>>;

    /// Store value only if the key is absent; returns whether this call stored it
    ///
    /// Concurrent callers racing on one key observe exactly one `true`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or storage fails
    async fn claim_once<T: Serialize + Send + Sync>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> AppResult<bool>;

    /// Atomically read and remove a value
    ///
    /// Concurrent callers racing on one key observe the value at most once.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization or storage fails
    async fn take<T: for<'de> Deserialize<'de>>(&self, key: &CacheKey) -> AppResult<Option<T>>;

    /// Remove single cache entry
    ///
    /// # Errors
    ///
    /// Returns an error if invalidation fails
    async fn invalidate(&self, key: &CacheKey) -> AppResult<()>;

    /// Check if key exists in cache
    ///
    /// # Errors
    ///
    /// Returns an error if existence check fails
    async fn exists(&self, key: &CacheKey) -> AppResult<bool>;

    /// Verify cache backend is healthy
    ///
    /// # Errors
    ///
    /// Returns an error if health check fails
    async fn health_check(&self) -> AppResult<()>;
}

/// Independent key spaces of the transaction store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Transaction after details, keyed by transaction id
    PreAuth,
    /// Transaction after authentication, keyed by transaction id
    Authenticated,
    /// Transaction after code issuance, keyed by code hash
    AuthCode,
    /// First phase advance out of details (authenticate or link), keyed by transaction id
    PhaseClaim,
    /// Generated link code metadata, keyed by link code hash
    LinkCodeGenerated,
    /// Used link code metadata, keyed by link code hash
    LinkedCode,
    /// Linked transaction before authentication, keyed by linked transaction id
    LinkedSession,
    /// Linked transaction after authentication, keyed by linked transaction id
    LinkedAuth,
    /// Linked transaction after consent, keyed by linked transaction id
    Consented,
    /// Code issued for a linked transaction, keyed by linked transaction id
    LinkAuthCodeResult,
    /// Transaction after token issuance, keyed by access token hash
    UserInfo,
    /// Client assertion replay marker, keyed by client and `jti`
    AssertionJti,
    /// Blocked individual marker, keyed by individual id hash
    BlockedIndividual,
}

impl Namespace {
    /// Key prefix for this namespace
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreAuth => "preauth",
            Self::Authenticated => "authenticated",
            Self::AuthCode => "authcode",
            Self::PhaseClaim => "phase_claim",
            Self::LinkCodeGenerated => "link_code_generated",
            Self::LinkedCode => "linked_code",
            Self::LinkedSession => "linked_session",
            Self::LinkedAuth => "linked_auth",
            Self::Consented => "consented",
            Self::LinkAuthCodeResult => "link_auth_code_result",
            Self::UserInfo => "userinfo",
            Self::AssertionJti => "assertion_jti",
            Self::BlockedIndividual => "blocked_individual",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CacheTtlConfig {
    /// Get TTL duration for a namespace
    #[must_use]
    pub const fn ttl_for(&self, namespace: Namespace) -> Duration {
        let secs = match namespace {
            Namespace::PreAuth => self.preauth_secs,
            Namespace::PhaseClaim => self.phase_claim_secs,
            Namespace::Authenticated => self.authenticated_secs,
            Namespace::AuthCode => self.authcode_secs,
            Namespace::LinkCodeGenerated => self.link_code_generated_secs,
            Namespace::LinkedCode => self.linked_code_secs,
            Namespace::LinkedSession | Namespace::LinkedAuth | Namespace::Consented => {
                self.linked_secs
            }
            Namespace::LinkAuthCodeResult => self.link_auth_code_result_secs,
            Namespace::UserInfo => self.userinfo_secs,
            Namespace::AssertionJti => self.assertion_jti_secs,
            Namespace::BlockedIndividual => self.blocked_individual_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Namespaced cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Key space
    pub namespace: Namespace,
    /// Identifier within the key space
    pub id: String,
}

impl CacheKey {
    /// Create new cache key
    pub fn new(namespace: Namespace, id: impl Into<String>) -> Self {
        Self {
            namespace,
            id: id.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.id)
    }
}

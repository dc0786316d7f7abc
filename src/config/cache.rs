// ABOUTME: Transaction store configuration types
// ABOUTME: Handles backend selection, Redis connections and per-namespace TTLs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::env_or;
use crate::constants::cache;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Default Redis connection timeout
const REDIS_CONNECTION_TIMEOUT_SECS: u64 = 5;
/// Default Redis command timeout
const REDIS_RESPONSE_TIMEOUT_SECS: u64 = 3;
/// Default reconnection attempts after a dropped connection
const REDIS_RECONNECTION_RETRIES: usize = 6;
/// Default exponential backoff base
const REDIS_RETRY_EXPONENT_BASE: u64 = 2;
/// Default backoff ceiling
const REDIS_MAX_RETRY_DELAY_MS: u64 = 5_000;
/// Default startup connection attempts
const REDIS_INITIAL_CONNECTION_RETRIES: u32 = 3;
/// Default first backoff delay at startup
const REDIS_INITIAL_RETRY_DELAY_MS: u64 = 500;

/// Transaction store configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries (in-memory backend)
    pub max_entries: usize,
    /// Redis connection URL; selects the Redis backend when set
    pub redis_url: Option<String>,
    /// Cleanup interval for expired entries
    pub cleanup_interval: Duration,
    /// Enable background cleanup task (disabled in tests)
    pub enable_background_cleanup: bool,
    /// Redis connection and retry configuration
    pub redis_connection: RedisConnectionConfig,
    /// Per-namespace TTLs
    pub ttl: CacheTtlConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: cache::DEFAULT_CACHE_MAX_ENTRIES,
            redis_url: None,
            cleanup_interval: Duration::from_secs(cache::DEFAULT_CLEANUP_INTERVAL_SECS),
            enable_background_cleanup: true,
            redis_connection: RedisConnectionConfig::default(),
            ttl: CacheTtlConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Load store configuration from environment
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            max_entries: env_or("CACHE_MAX_ENTRIES", cache::DEFAULT_CACHE_MAX_ENTRIES),
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            cleanup_interval: Duration::from_secs(env_or(
                "CACHE_CLEANUP_INTERVAL_SECS",
                cache::DEFAULT_CLEANUP_INTERVAL_SECS,
            )),
            enable_background_cleanup: true,
            redis_connection: RedisConnectionConfig::from_env(),
            ttl: CacheTtlConfig::from_env(),
        }
    }
}

/// TTLs, in seconds, for each transaction store namespace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheTtlConfig {
    /// Details issued, not yet authenticated
    pub preauth_secs: u64,
    /// Authenticated, awaiting consent or code issuance
    pub authenticated_secs: u64,
    /// Issued codes awaiting redemption
    pub authcode_secs: u64,
    /// Phase claim markers; never shorter than `preauth_secs`
    pub phase_claim_secs: u64,
    /// Generated link codes
    pub link_code_generated_secs: u64,
    /// Link codes that have been used to link
    pub linked_code_secs: u64,
    /// Linked session, linked authenticated and consented transactions
    pub linked_secs: u64,
    /// Cached link auth code results
    pub link_auth_code_result_secs: u64,
    /// Transactions addressable by access token hash
    pub userinfo_secs: u64,
    /// Client assertion replay markers
    pub assertion_jti_secs: u64,
    /// Blocked individuals
    pub blocked_individual_secs: u64,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            preauth_secs: cache::TTL_PREAUTH_SECS,
            authenticated_secs: cache::TTL_AUTHENTICATED_SECS,
            authcode_secs: cache::TTL_AUTHCODE_SECS,
            phase_claim_secs: cache::TTL_PHASE_CLAIM_SECS,
            link_code_generated_secs: cache::TTL_LINK_CODE_GENERATED_SECS,
            linked_code_secs: cache::TTL_LINKED_CODE_SECS,
            linked_secs: cache::TTL_LINKED_SECS,
            link_auth_code_result_secs: cache::TTL_LINK_AUTH_CODE_RESULT_SECS,
            userinfo_secs: cache::TTL_USERINFO_SECS,
            assertion_jti_secs: cache::TTL_ASSERTION_JTI_SECS,
            blocked_individual_secs: cache::TTL_BLOCKED_INDIVIDUAL_SECS,
        }
    }
}

impl CacheTtlConfig {
    /// Load namespace TTLs from environment
    ///
    /// A phase claim must outlive the pre-auth entry it guards, so a shorter configured
    /// value is raised to the pre-auth TTL.
    #[must_use]
    pub fn from_env() -> Self {
        let preauth_secs = env_or("CACHE_TTL_PREAUTH_SECS", cache::TTL_PREAUTH_SECS);
        Self {
            preauth_secs,
            authenticated_secs: env_or(
                "CACHE_TTL_AUTHENTICATED_SECS",
                cache::TTL_AUTHENTICATED_SECS,
            ),
            authcode_secs: env_or("CACHE_TTL_AUTHCODE_SECS", cache::TTL_AUTHCODE_SECS),
            phase_claim_secs: env_or("CACHE_TTL_PHASE_CLAIM_SECS", cache::TTL_PHASE_CLAIM_SECS)
                .max(preauth_secs),
            link_code_generated_secs: env_or(
                "CACHE_TTL_LINK_CODE_GENERATED_SECS",
                cache::TTL_LINK_CODE_GENERATED_SECS,
            ),
            linked_code_secs: env_or("CACHE_TTL_LINKED_CODE_SECS", cache::TTL_LINKED_CODE_SECS),
            linked_secs: env_or("CACHE_TTL_LINKED_SECS", cache::TTL_LINKED_SECS),
            link_auth_code_result_secs: env_or(
                "CACHE_TTL_LINK_AUTH_CODE_RESULT_SECS",
                cache::TTL_LINK_AUTH_CODE_RESULT_SECS,
            ),
            userinfo_secs: env_or("CACHE_TTL_USERINFO_SECS", cache::TTL_USERINFO_SECS),
            assertion_jti_secs: env_or(
                "CACHE_TTL_ASSERTION_JTI_SECS",
                cache::TTL_ASSERTION_JTI_SECS,
            ),
            blocked_individual_secs: env_or(
                "CACHE_TTL_BLOCKED_INDIVIDUAL_SECS",
                cache::TTL_BLOCKED_INDIVIDUAL_SECS,
            ),
        }
    }
}

/// Redis connection and retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConnectionConfig {
    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,
    /// Response/command timeout in seconds
    pub response_timeout_secs: u64,
    /// Number of reconnection retries after connection drop
    pub reconnection_retries: usize,
    /// Exponential backoff base for retry delays
    pub retry_exponent_base: u64,
    /// Maximum retry delay in milliseconds
    pub max_retry_delay_ms: u64,
    /// Number of retries for initial connection at startup
    pub initial_connection_retries: u32,
    /// Initial retry delay in milliseconds (doubles with exponential backoff)
    pub initial_retry_delay_ms: u64,
}

impl Default for RedisConnectionConfig {
    fn default() -> Self {
        Self {
            connection_timeout_secs: REDIS_CONNECTION_TIMEOUT_SECS,
            response_timeout_secs: REDIS_RESPONSE_TIMEOUT_SECS,
            reconnection_retries: REDIS_RECONNECTION_RETRIES,
            retry_exponent_base: REDIS_RETRY_EXPONENT_BASE,
            max_retry_delay_ms: REDIS_MAX_RETRY_DELAY_MS,
            initial_connection_retries: REDIS_INITIAL_CONNECTION_RETRIES,
            initial_retry_delay_ms: REDIS_INITIAL_RETRY_DELAY_MS,
        }
    }
}

impl RedisConnectionConfig {
    /// Load Redis connection configuration from environment
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            connection_timeout_secs: env_or(
                "REDIS_CONNECTION_TIMEOUT_SECS",
                REDIS_CONNECTION_TIMEOUT_SECS,
            ),
            response_timeout_secs: env_or(
                "REDIS_RESPONSE_TIMEOUT_SECS",
                REDIS_RESPONSE_TIMEOUT_SECS,
            ),
            reconnection_retries: env_or("REDIS_RECONNECTION_RETRIES", REDIS_RECONNECTION_RETRIES),
            retry_exponent_base: env_or("REDIS_RETRY_EXPONENT_BASE", REDIS_RETRY_EXPONENT_BASE),
            max_retry_delay_ms: env_or("REDIS_MAX_RETRY_DELAY_MS", REDIS_MAX_RETRY_DELAY_MS),
            initial_connection_retries: env_or(
                "REDIS_INITIAL_CONNECTION_RETRIES",
                REDIS_INITIAL_CONNECTION_RETRIES,
            ),
            initial_retry_delay_ms: env_or(
                "REDIS_INITIAL_RETRY_DELAY_MS",
                REDIS_INITIAL_RETRY_DELAY_MS,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_phase_claim_ttl_never_below_preauth() {
        env::set_var("CACHE_TTL_PREAUTH_SECS", "900");
        env::set_var("CACHE_TTL_PHASE_CLAIM_SECS", "60");
        let ttl = CacheTtlConfig::from_env();
        env::remove_var("CACHE_TTL_PREAUTH_SECS");
        env::remove_var("CACHE_TTL_PHASE_CLAIM_SECS");

        assert_eq!(ttl.preauth_secs, 900);
        assert_eq!(ttl.phase_claim_secs, 900);
    }
}

// ABOUTME: Configuration management module for centralized server settings
// ABOUTME: Environment-driven server, engine and transaction store configuration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Configuration module
//!
//! - **Environment**: server and authorization engine settings
//! - **Cache**: transaction store backend, Redis connection and namespace TTLs
//! - **ACR**: AMR/ACR mapping document

use std::env;
use std::str::FromStr;

/// AMR/ACR mapping document
pub mod acr;
/// Transaction store configuration
pub mod cache;
/// Environment and server configuration
pub mod environment;

pub use acr::AcrMappingConfig;
pub use cache::{CacheConfig, CacheTtlConfig, RedisConnectionConfig};
pub use environment::{OidcConfig, ServerConfig};

/// Read an environment variable, falling back to `default` when unset or unparseable
pub(crate) fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

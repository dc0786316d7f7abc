// ABOUTME: Environment-based server configuration
// ABOUTME: Reads ports, issuer identity, collaborator files and OIDC tunables from env vars
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Server configuration loaded from environment variables.
//!
//! Unset or unparseable variables fall back to the defaults in
//! [`crate::constants::defaults`].

use super::cache::CacheConfig;
use super::env_or;
use crate::constants::defaults;
use crate::errors::{AppError, AppResult};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use url::Url;

/// Top-level server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,
    /// JSON seed file with clients and identities for the bundled collaborators
    pub seed_file: Option<PathBuf>,
    /// PEM-encoded RSA private key used to sign tokens; generated when absent
    pub signing_key_path: Option<PathBuf>,
    /// AMR/ACR mapping document; the built-in mapping is used when absent
    pub amr_acr_mapping_file: Option<PathBuf>,
    /// Authorization engine settings
    pub oidc: OidcConfig,
    /// Transaction store settings
    pub cache: CacheConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a URL setting is not a valid absolute URL
    pub fn from_env() -> AppResult<Self> {
        info!("Loading configuration from environment variables");

        let config = Self {
            http_port: env_or("HTTP_PORT", defaults::HTTP_PORT),
            seed_file: env_path("IDP_SEED_FILE"),
            signing_key_path: env_path("SIGNING_KEY_PATH"),
            amr_acr_mapping_file: env_path("AMR_ACR_MAPPING_FILE"),
            oidc: OidcConfig::from_env(),
            cache: CacheConfig::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check values that cannot be defaulted
    ///
    /// # Errors
    ///
    /// Returns an error if the issuer or token endpoint is not an absolute URL
    pub fn validate(&self) -> AppResult<()> {
        for (name, value) in [
            ("ISSUER_ID", &self.oidc.issuer),
            ("TOKEN_ENDPOINT", &self.oidc.token_endpoint),
        ] {
            Url::parse(value)
                .map_err(|e| AppError::config(format!("{name} is not a valid URL: {e}")))?;
        }
        if self.oidc.link_code_length == 0 {
            return Err(AppError::config("LINK_CODE_LENGTH must be positive"));
        }
        Ok(())
    }

    /// One-line summary for startup logs
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "port={} issuer={} store={} link_status_timeout={}s",
            self.http_port,
            self.oidc.issuer,
            if self.cache.redis_url.is_some() {
                "redis"
            } else {
                "memory"
            },
            self.oidc.link_status_timeout.as_secs()
        )
    }
}

/// Authorization engine settings
#[derive(Debug, Clone)]
pub struct OidcConfig {
    /// Issuer identifier placed in `iss` of every token
    pub issuer: String,
    /// Token endpoint URL; accepted as client assertion audience
    pub token_endpoint: String,
    /// Access token lifetime in seconds
    pub access_token_expire_secs: u64,
    /// ID token lifetime in seconds
    pub id_token_expire_secs: u64,
    /// Leeway applied to client assertion `exp`/`iat`
    pub client_assertion_max_clock_skew_secs: u64,
    /// Allowed distance between a request's `requestTime` and now
    pub request_time_variance_secs: i64,
    /// Characters in the authenticator transaction id
    pub auth_txn_id_length: usize,
    /// Characters in a link code
    pub link_code_length: usize,
    /// Link codes one transaction may generate
    pub link_code_limit: u32,
    /// Link code validity in seconds
    pub link_code_expire_secs: u64,
    /// Upper bound of a single long poll
    pub link_status_timeout: Duration,
    /// Interval at which a waiting long poll re-reads the store
    pub link_poll_interval: Duration,
    /// Non-OIDC scopes clients may request
    pub authorize_scopes: Vec<String>,
    /// Claims released by each OIDC scope
    pub scope_claims: HashMap<String, Vec<String>>,
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            issuer: defaults::ISSUER_ID.to_owned(),
            token_endpoint: defaults::TOKEN_ENDPOINT.to_owned(),
            access_token_expire_secs: defaults::ACCESS_TOKEN_EXPIRE_SECS,
            id_token_expire_secs: defaults::ID_TOKEN_EXPIRE_SECS,
            client_assertion_max_clock_skew_secs: defaults::CLIENT_ASSERTION_MAX_CLOCK_SKEW_SECS,
            request_time_variance_secs: defaults::REQUEST_TIME_VARIANCE_SECS,
            auth_txn_id_length: defaults::AUTH_TXN_ID_LENGTH,
            link_code_length: defaults::LINK_CODE_LENGTH,
            link_code_limit: defaults::LINK_CODE_LIMIT_PER_TRANSACTION,
            link_code_expire_secs: defaults::LINK_CODE_EXPIRE_SECS,
            link_status_timeout: Duration::from_secs(defaults::LINK_STATUS_TIMEOUT_SECS),
            link_poll_interval: Duration::from_millis(defaults::LINK_POLL_INTERVAL_MS),
            authorize_scopes: defaults::AUTHORIZE_SCOPES
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            scope_claims: default_scope_claims(),
        }
    }
}

impl OidcConfig {
    /// Load engine settings from environment
    #[must_use]
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            issuer: env::var("ISSUER_ID").unwrap_or(base.issuer),
            token_endpoint: env::var("TOKEN_ENDPOINT").unwrap_or(base.token_endpoint),
            access_token_expire_secs: env_or(
                "ACCESS_TOKEN_EXPIRE_SECS",
                base.access_token_expire_secs,
            ),
            id_token_expire_secs: env_or("ID_TOKEN_EXPIRE_SECS", base.id_token_expire_secs),
            client_assertion_max_clock_skew_secs: env_or(
                "CLIENT_ASSERTION_MAX_CLOCK_SKEW_SECS",
                base.client_assertion_max_clock_skew_secs,
            ),
            request_time_variance_secs: env_or(
                "REQUEST_TIME_VARIANCE_SECS",
                base.request_time_variance_secs,
            ),
            auth_txn_id_length: env_or("AUTH_TXN_ID_LENGTH", base.auth_txn_id_length),
            link_code_length: env_or("LINK_CODE_LENGTH", base.link_code_length),
            link_code_limit: env_or("LINK_CODE_LIMIT_PER_TRANSACTION", base.link_code_limit),
            link_code_expire_secs: env_or("LINK_CODE_EXPIRE_SECS", base.link_code_expire_secs),
            link_status_timeout: Duration::from_secs(env_or(
                "LINK_STATUS_TIMEOUT_SECS",
                defaults::LINK_STATUS_TIMEOUT_SECS,
            )),
            link_poll_interval: Duration::from_millis(env_or(
                "LINK_POLL_INTERVAL_MS",
                defaults::LINK_POLL_INTERVAL_MS,
            )),
            authorize_scopes: env::var("AUTHORIZE_SCOPES")
                .map(|s| parse_list(&s))
                .unwrap_or(base.authorize_scopes),
            scope_claims: base.scope_claims,
        }
    }
}

/// Standard OIDC scope to claim mapping (OpenID Connect Core 5.4)
pub(crate) fn default_scope_claims() -> HashMap<String, Vec<String>> {
    let mapping: [(&str, &[&str]); 4] = [
        (
            "profile",
            &[
                "name",
                "family_name",
                "given_name",
                "middle_name",
                "nickname",
                "preferred_username",
                "gender",
                "birthdate",
                "zoneinfo",
                "locale",
                "picture",
                "updated_at",
            ],
        ),
        ("email", &["email", "email_verified"]),
        ("phone", &["phone_number", "phone_number_verified"]),
        ("address", &["address"]),
    ];
    mapping
        .into_iter()
        .map(|(scope, claims)| {
            (
                scope.to_owned(),
                claims.iter().map(|c| (*c).to_owned()).collect(),
            )
        })
        .collect()
}

fn env_path(name: &str) -> Option<PathBuf> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}

/// Parse a comma or space separated list
fn parse_list(value: &str) -> Vec<String> {
    value
        .split([',', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

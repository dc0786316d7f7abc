// ABOUTME: Constants module with domain-separated organization
// ABOUTME: Protocol literals, header names, cache namespaces defaults and OIDC tunables
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Constants module
//!
//! Constants are grouped by domain. Values that operators may tune are only the
//! defaults here; [`crate::config`] reads the environment overrides.

/// Transaction store defaults
pub mod cache {
    /// Prefix for every key written to a shared Redis instance
    pub const CACHE_KEY_PREFIX: &str = "oidc:";
    /// Default LRU capacity for the in-memory backend
    pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 100_000;
    /// Default interval between expired-entry sweeps
    pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;

    /// Pre-authentication transactions (details issued, not yet authenticated)
    pub const TTL_PREAUTH_SECS: u64 = 600;
    /// Authenticated transactions awaiting consent or code issuance
    pub const TTL_AUTHENTICATED_SECS: u64 = 600;
    /// Issued authorization codes awaiting redemption
    pub const TTL_AUTHCODE_SECS: u64 = 120;
    /// Markers deciding how a transaction left the details phase
    pub const TTL_PHASE_CLAIM_SECS: u64 = 600;
    /// Link codes generated and not yet used
    pub const TTL_LINK_CODE_GENERATED_SECS: u64 = 600;
    /// Link codes after a device has linked
    pub const TTL_LINKED_CODE_SECS: u64 = 600;
    /// Linked transactions (session, authenticated and consented phases)
    pub const TTL_LINKED_SECS: u64 = 600;
    /// Cached results of the link auth code long poll
    pub const TTL_LINK_AUTH_CODE_RESULT_SECS: u64 = 120;
    /// Transactions reachable by access token hash
    pub const TTL_USERINFO_SECS: u64 = 3600;
    /// Client assertion `jti` replay markers
    pub const TTL_ASSERTION_JTI_SECS: u64 = 600;
    /// Blocked individual markers
    pub const TTL_BLOCKED_INDIVIDUAL_SECS: u64 = 900;
}

/// OIDC and OAuth2 protocol literals
pub mod oidc {
    /// The only PKCE method accepted
    pub const PKCE_METHOD_S256: &str = "S256";
    /// Minimum PKCE verifier length (RFC 7636)
    pub const PKCE_VERIFIER_MIN_LEN: usize = 43;
    /// Maximum PKCE verifier length (RFC 7636)
    pub const PKCE_VERIFIER_MAX_LEN: usize = 128;

    /// Supported client assertion type
    pub const JWT_BEARER_ASSERTION_TYPE: &str =
        "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
    /// Supported grant type
    pub const GRANT_TYPE_AUTHORIZATION_CODE: &str = "authorization_code";
    /// Supported response type
    pub const RESPONSE_TYPE_CODE: &str = "code";
    /// Token type returned by the token endpoint
    pub const TOKEN_TYPE_BEARER: &str = "Bearer";

    /// Scope required for any OIDC request
    pub const SCOPE_OPENID: &str = "openid";
    /// Standard scopes that expand into user claims
    pub const OPENID_SCOPES: &[&str] = &["profile", "email", "phone", "address"];

    /// Link status reported once the secondary device has linked
    pub const LINK_STATUS_LINKED: &str = "LINKED";

    /// Header carrying the transaction id on primary-device calls
    pub const HEADER_OAUTH_DETAILS_KEY: &str = "oauth-details-key";
    /// Header carrying the details hash on primary-device calls
    pub const HEADER_OAUTH_DETAILS_HASH: &str = "oauth-details-hash";

    /// Length of a raw authorization code in random bytes
    pub const AUTH_CODE_BYTES: usize = 32;
    /// Length of a raw transaction id in random bytes
    pub const TRANSACTION_ID_BYTES: usize = 32;
    /// Number of link codes a transaction keeps live at once
    pub const LINK_CODE_QUEUE_CAPACITY: usize = 2;
    /// Key id of the server signing key
    pub const SIGNING_KEY_ID: &str = "oidc-signing-key";
    /// Media type of the userinfo response
    pub const CONTENT_TYPE_JWT: &str = "application/jwt";
}

/// Default values for [`crate::config::environment::OidcConfig`]
pub mod defaults {
    /// Default HTTP port
    pub const HTTP_PORT: u16 = 8088;
    /// Default issuer identifier
    pub const ISSUER_ID: &str = "http://localhost:8088";
    /// Default token endpoint URL
    pub const TOKEN_ENDPOINT: &str = "http://localhost:8088/oauth/token";
    /// Default authorize scopes (non-OIDC scopes a client may request)
    pub const AUTHORIZE_SCOPES: &[&str] = &[];

    /// Access token lifetime
    pub const ACCESS_TOKEN_EXPIRE_SECS: u64 = 3600;
    /// ID token lifetime
    pub const ID_TOKEN_EXPIRE_SECS: u64 = 3600;
    /// Clock skew tolerated on client assertions
    pub const CLIENT_ASSERTION_MAX_CLOCK_SKEW_SECS: u64 = 5;
    /// Allowed distance between `requestTime` and server time
    pub const REQUEST_TIME_VARIANCE_SECS: i64 = 120;
    /// Characters in a derived authenticator transaction id
    pub const AUTH_TXN_ID_LENGTH: usize = 10;
    /// Characters in a link code
    pub const LINK_CODE_LENGTH: usize = 15;
    /// Link codes a transaction may generate over its lifetime
    pub const LINK_CODE_LIMIT_PER_TRANSACTION: u32 = 10;
    /// Link code validity
    pub const LINK_CODE_EXPIRE_SECS: u64 = 600;
    /// Upper bound of a single long poll
    pub const LINK_STATUS_TIMEOUT_SECS: u64 = 25;
    /// Store poll interval while a long poll waits
    pub const LINK_POLL_INTERVAL_MS: u64 = 1000;
    /// Key size for generated signing keys
    pub const RSA_KEY_SIZE_BITS: usize = 2048;
}

/// Service identity used in logs and health output
pub mod service_names {
    /// Service name
    pub const SERVICE_NAME: &str = "oidc-transaction-server";
}

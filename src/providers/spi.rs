// ABOUTME: Service Provider Interface for the external collaborators of the authorization engine
// ABOUTME: Defines the authenticator, signer, client registry and consent store contracts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Collaborator Service Provider Interface (SPI)
//!
//! The authorization engine never verifies credentials, signs tokens, stores clients or
//! persists consent itself. It calls the traits in this module, which deployments
//! implement against their identity backend, key service and databases.
//!
//! - **[`Authenticator`]**: verifies challenges, sends OTPs, exchanges KYC tokens for claims
//! - **[`Signer`]**: signs and verifies server-issued JWTs
//! - **[`ClientRegistry`]**: looks up relying-party clients
//! - **[`ConsentStore`]**: persists user consent decisions

use crate::errors::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClientStatus {
    /// Client may start authorizations
    #[default]
    Active,
    /// Client is disabled
    Inactive,
}

/// Registered relying-party client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDetail {
    /// Client identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Logo shown on consent screens
    #[serde(default)]
    pub logo_uri: Option<String>,
    /// Relying party the client belongs to
    pub relying_party_id: String,
    /// Redirect URI patterns; the path may contain `*` wildcards
    pub redirect_uris: Vec<String>,
    /// Claims the client may request, in display order
    #[serde(default)]
    pub claims: Vec<String>,
    /// ACR values registered for the client
    #[serde(default)]
    pub acr_values: Vec<String>,
    /// PEM public key used to verify client assertions
    pub public_key: String,
    /// Lifecycle status
    #[serde(default)]
    pub status: ClientStatus,
    /// Minutes a captured consent stays valid; `None` means no expiry
    #[serde(default)]
    pub consent_expire_minutes: Option<i64>,
}

impl ClientDetail {
    /// Whether the client may start authorizations
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ClientStatus::Active
    }
}

/// One credential presented by the end-user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthChallenge {
    /// Factor type, e.g. `PIN`, `OTP`, `BIO`
    pub auth_factor_type: String,
    /// Challenge value
    pub challenge: String,
    /// Challenge encoding, e.g. `alpha-numeric`
    #[serde(default)]
    pub format: String,
}

/// Input to [`Authenticator::verify`]
#[derive(Debug, Clone)]
pub struct KycAuthRequest {
    /// End-user identifier
    pub individual_id: String,
    /// Transaction id presented to the authenticator
    pub auth_transaction_id: String,
    /// Credentials to verify
    pub challenges: Vec<AuthChallenge>,
    /// Relying party of the requesting client
    pub relying_party_id: String,
    /// Requesting client
    pub client_id: String,
}

/// Successful verification result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KycAuthResult {
    /// Opaque token later exchanged for user claims
    pub kyc_token: String,
    /// Pairwise subject identifier for the relying party
    pub partner_specific_user_token: String,
}

/// Input to [`Authenticator::send_otp`]
#[derive(Debug, Clone)]
pub struct SendOtpRequest {
    /// End-user identifier
    pub individual_id: String,
    /// Transaction id presented to the authenticator
    pub auth_transaction_id: String,
    /// Delivery channels, e.g. `email`, `phone`
    pub otp_channels: Vec<String>,
    /// Relying party of the requesting client
    pub relying_party_id: String,
    /// Requesting client
    pub client_id: String,
}

/// OTP delivery result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOtpResult {
    /// Transaction id echoed by the authenticator
    pub transaction_id: String,
    /// Masked email the OTP was sent to
    pub masked_email: Option<String>,
    /// Masked phone number the OTP was sent to
    pub masked_mobile: Option<String>,
}

/// Input to [`Authenticator::kyc_exchange`]
#[derive(Debug, Clone)]
pub struct KycExchangeRequest {
    /// Token returned by [`Authenticator::verify`]
    pub kyc_token: String,
    /// End-user identifier
    pub individual_id: String,
    /// Pairwise subject identifier
    pub partner_specific_user_token: String,
    /// Claims the user agreed to release
    pub accepted_claims: Vec<String>,
    /// Preferred locales for claim values
    pub claims_locales: Vec<String>,
    /// Relying party of the requesting client
    pub relying_party_id: String,
    /// Requesting client
    pub client_id: String,
}

/// Credential verification and user data backend
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Verify the challenges for an individual
    ///
    /// # Errors
    ///
    /// Returns `auth_failed` when the challenges are rejected
    async fn verify(&self, request: &KycAuthRequest) -> AppResult<KycAuthResult>;

    /// Deliver a one-time password
    ///
    /// # Errors
    ///
    /// Returns `send_otp_failed` when delivery fails
    async fn send_otp(&self, request: &SendOtpRequest) -> AppResult<SendOtpResult>;

    /// Exchange a KYC token for the signed or encrypted user claims document
    ///
    /// # Errors
    ///
    /// Returns an error when the token is unknown or expired
    async fn kyc_exchange(&self, request: &KycExchangeRequest) -> AppResult<String>;
}

/// JWT signing capability for server-issued tokens
#[async_trait]
pub trait Signer: Send + Sync {
    /// Sign a claims object
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails
    async fn sign(&self, claims: &Value) -> AppResult<String>;

    /// Verify a token signed by this signer and return its claims
    ///
    /// `exp` is always enforced; `audience` is checked when given.
    ///
    /// # Errors
    ///
    /// Returns `invalid_token` when verification fails
    async fn verify(&self, token: &str, audience: Option<&str>) -> AppResult<Value>;
}

/// Read-only client lookup
#[async_trait]
pub trait ClientRegistry: Send + Sync {
    /// Find a client by id
    ///
    /// # Errors
    ///
    /// Returns an error if the registry backend fails
    async fn lookup(&self, client_id: &str) -> AppResult<Option<ClientDetail>>;
}

/// Stored consent decision of one user for one client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRecord {
    /// Client the consent was given to
    pub client_id: String,
    /// Pairwise subject identifier of the user
    pub psu_token: String,
    /// Hash of the requested claims and scopes the decision covers
    pub hash: String,
    /// Claims the user accepted
    pub accepted_claims: Vec<String>,
    /// Scopes the user permitted
    pub permitted_scopes: Vec<String>,
    /// When the record was written
    pub created_at: DateTime<Utc>,
    /// When the record stops applying
    pub expires_at: Option<DateTime<Utc>>,
}

impl ConsentRecord {
    /// Whether the record still applies at `now`
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires_at| expires_at > now)
    }
}

/// Persistence of consent decisions
#[async_trait]
pub trait ConsentStore: Send + Sync {
    /// Fetch the decision for a client and user
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails
    async fn get(&self, client_id: &str, psu_token: &str) -> AppResult<Option<ConsentRecord>>;

    /// Save or replace a decision
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails
    async fn put(&self, record: ConsentRecord) -> AppResult<()>;

    /// Remove the decision for a client and user
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails
    async fn delete(&self, client_id: &str, psu_token: &str) -> AppResult<()>;
}

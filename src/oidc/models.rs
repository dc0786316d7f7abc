// ABOUTME: Data models for the OIDC authorization transaction and its request/response types
// ABOUTME: The Transaction record, link-code queue, claims request and endpoint DTOs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::constants::oidc::LINK_CODE_QUEUE_CAPACITY;
use crate::providers::spi::AuthChallenge;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// One authentication factor of an AMR definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationFactor {
    /// Factor type, e.g. `PIN`, `OTP`, `BIO`
    #[serde(rename = "type")]
    pub factor_type: String,
    /// Number of captures required (biometrics)
    #[serde(default)]
    pub count: u32,
    /// Allowed sub-types, e.g. finger or iris
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_types: Option<Vec<String>>,
}

/// Phase of an authorization transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionPhase {
    /// Details issued, waiting for authentication
    DetailsIssued,
    /// Secondary device linked, waiting for authentication
    Linked,
    /// End-user authenticated
    Authenticated,
    /// Consent recorded
    Consented,
    /// Authorization code issued
    CodeIssued,
    /// Tokens issued
    TokenIssued,
}

/// Whether consent must be captured from the end-user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConsentAction {
    /// Consent screen must be shown and the decision stored
    Capture,
    /// A stored decision already covers this request
    #[serde(rename = "NOCAPTURE")]
    NoCapture,
}

/// PKCE parameters recorded at details time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofKeyCodeExchange {
    /// Code challenge sent by the client
    pub code_challenge: String,
    /// Transform method, always `S256`
    pub code_challenge_method: String,
}

/// Per-claim request detail (OIDC Core 5.5.1)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimDetail {
    /// Whether the claim is essential
    #[serde(default)]
    pub essential: bool,
    /// Requested value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Requested values, in preference order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}

/// `claims` request parameter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsRequest {
    /// Claims requested from the userinfo endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo: Option<BTreeMap<String, Option<ClaimDetail>>>,
    /// Claims requested in the ID token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<BTreeMap<String, Option<ClaimDetail>>>,
}

/// Bounded FIFO of link code hashes; the newest entry is the only one accepted for linking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCodeQueue {
    capacity: usize,
    codes: VecDeque<String>,
}

impl Default for LinkCodeQueue {
    fn default() -> Self {
        Self::new(LINK_CODE_QUEUE_CAPACITY)
    }
}

impl LinkCodeQueue {
    /// Create an empty queue; a zero capacity is raised to one
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            codes: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a code hash and return the evicted oldest one, if any
    pub fn push(&mut self, code_hash: String) -> Option<String> {
        let evicted = if self.codes.len() >= self.capacity {
            self.codes.pop_front()
        } else {
            None
        };
        self.codes.push_back(code_hash);
        evicted
    }

    /// The newest code hash
    #[must_use]
    pub fn head(&self) -> Option<&str> {
        self.codes.back().map(String::as_str)
    }

    /// Remove and return every code hash
    pub fn drain(&mut self) -> Vec<String> {
        self.codes.drain(..).collect()
    }

    /// Number of codes held
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Whether no code is held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// State of one authorization attempt, stored in the transaction store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Server-generated transaction id
    pub transaction_id: String,
    /// Current phase
    pub phase: TransactionPhase,

    /// Requesting client
    pub client_id: String,
    /// Relying party of the client
    pub relying_party_id: String,
    /// Redirect URI validated at details time
    pub redirect_uri: String,
    /// Requested scopes that map to authorization decisions
    pub requested_authorize_scopes: Vec<String>,
    /// Requested claims after resolution against the client's registration
    pub requested_claims: ClaimsRequest,
    /// Claims the user must release
    pub essential_claims: Vec<String>,
    /// Claims the user may release
    pub voluntary_claims: Vec<String>,
    /// Resolved ACR values in precedence order
    pub acr_values: Vec<String>,
    /// Client nonce
    pub nonce: Option<String>,
    /// Client state
    pub state: Option<String>,
    /// Preferred claim locales
    pub claims_locales: Vec<String>,

    /// PKCE parameters
    pub proof_key_code_exchange: Option<ProofKeyCodeExchange>,
    /// Hash of the details response shown to the end-user
    pub oauth_details_hash: String,

    /// Transaction id presented to the authenticator
    pub auth_transaction_id: String,
    /// Hash of the individual id
    pub individual_id_hash: Option<String>,
    /// Authenticated individual id
    pub individual_id: Option<String>,
    /// Token later exchanged for user claims
    pub kyc_token: Option<String>,
    /// Pairwise subject identifier
    pub partner_specific_user_token: Option<String>,
    /// Factor-type combinations satisfied by the presented challenges
    pub provided_auth_factors: Vec<Vec<String>>,
    /// Authentication time (epoch seconds)
    pub auth_time_in_seconds: Option<i64>,

    /// Claims the user accepted
    pub accepted_claims: Vec<String>,
    /// Scopes the user permitted
    pub permitted_scopes: Vec<String>,
    /// Consent evaluation outcome
    pub consent_action: Option<ConsentAction>,
    /// Minutes a captured consent stays valid
    pub consent_expire_minutes: Option<i64>,
    /// Whether authentication was performed internally
    pub is_internal_auth_success: bool,

    /// Hash of the issued authorization code
    pub code_hash: Option<String>,
    /// `at_hash` of the issued access token
    pub a_hash: Option<String>,
    /// Claims document returned by the userinfo endpoint
    pub encrypted_kyc: Option<String>,

    /// Outstanding link code hashes
    pub link_code_queue: LinkCodeQueue,
    /// Remaining link codes this transaction may generate
    pub current_link_code_limit: u32,
    /// Hash of the link code that was consumed
    pub linked_code_hash: Option<String>,
    /// Id of the linked secondary-device transaction
    pub linked_transaction_id: Option<String>,
    /// Server-generated nonce
    pub server_nonce: String,
}

/// Forward pointer from a link code hash to its transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkTransactionMetadata {
    /// Primary transaction id
    pub transaction_id: String,
    /// Secondary transaction id once linked
    pub linked_transaction_id: Option<String>,
}

/// Request envelope used by every JSON endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestWrapper<T> {
    /// Client timestamp (RFC 3339)
    pub request_time: String,
    /// Request payload
    pub request: T,
}

/// `POST /authorization/oauth-details`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthDetailRequest {
    /// Client identifier
    pub client_id: String,
    /// Space-separated scopes
    pub scope: String,
    /// Must be `code`
    pub response_type: String,
    /// Redirect URI
    pub redirect_uri: String,
    /// Space-separated ACR values
    #[serde(default)]
    pub acr_values: Option<String>,
    /// `claims` request parameter
    #[serde(default)]
    pub claims: Option<ClaimsRequest>,
    /// Space-separated claim locales
    #[serde(default)]
    pub claims_locales: Option<String>,
    /// Client nonce
    #[serde(default)]
    pub nonce: Option<String>,
    /// Client state
    #[serde(default)]
    pub state: Option<String>,
    /// PKCE challenge
    #[serde(default)]
    pub code_challenge: Option<String>,
    /// PKCE method
    #[serde(default)]
    pub code_challenge_method: Option<String>,
}

/// Details shown to the end-user; its canonical hash guards later steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthDetailResponse {
    /// New transaction id
    pub transaction_id: String,
    /// Client display name
    pub client_name: String,
    /// Client logo
    pub logo_url: Option<String>,
    /// Acceptable factor combinations in ACR precedence order
    pub auth_factors: Vec<Vec<AuthenticationFactor>>,
    /// Scopes requiring a permission decision
    pub authorize_scopes: Vec<String>,
    /// Claims the user must release
    pub essential_claims: Vec<String>,
    /// Claims the user may release
    pub voluntary_claims: Vec<String>,
    /// Validated redirect URI
    pub redirect_uri: String,
}

/// `POST /authorization/send-otp` and its linked counterpart
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpRequest {
    /// Transaction id (linked transaction id on the linked endpoint)
    pub transaction_id: String,
    /// End-user identifier
    pub individual_id: String,
    /// Delivery channels
    pub otp_channels: Vec<String>,
}

/// OTP delivery result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpResponse {
    /// Transaction id
    pub transaction_id: String,
    /// Masked email the OTP was sent to
    pub masked_email: Option<String>,
    /// Masked phone number the OTP was sent to
    pub masked_mobile: Option<String>,
}

/// `POST /authorization/authenticate`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    /// Transaction id
    pub transaction_id: String,
    /// End-user identifier
    pub individual_id: String,
    /// Presented credentials
    pub challenge_list: Vec<AuthChallenge>,
}

/// Authentication result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    /// Transaction id
    pub transaction_id: String,
    /// Consent evaluation outcome
    pub consent_action: ConsentAction,
}

/// `POST /authorization/consent` and `POST /authorization/auth-code`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRequest {
    /// Transaction id
    pub transaction_id: String,
    /// Claims the user accepted; `None` keeps the recorded decision
    #[serde(default)]
    pub accepted_claims: Option<Vec<String>>,
    /// Scopes the user permitted; `None` keeps the recorded decision
    #[serde(default)]
    pub permitted_authorize_scopes: Option<Vec<String>>,
}

/// Consent result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentResponse {
    /// Transaction id
    pub transaction_id: String,
    /// Consent evaluation outcome
    pub consent_action: ConsentAction,
}

/// Authorization code delivered to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthCodeResponse {
    /// Authorization code
    pub code: String,
    /// Client state
    pub state: Option<String>,
    /// Client nonce
    pub nonce: Option<String>,
    /// Redirect URI
    pub redirect_uri: String,
}

/// `POST /linked-authorization/link-code`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkCodeRequest {
    /// Primary transaction id
    pub transaction_id: String,
}

/// Newly generated link code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkCodeResponse {
    /// Primary transaction id
    pub transaction_id: String,
    /// Link code to show to the secondary device
    pub link_code: String,
    /// When the code stops being accepted (RFC 3339)
    pub expire_date_time: String,
}

/// `POST /linked-authorization/link-transaction`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkTransactionRequest {
    /// Link code scanned by the secondary device
    pub link_code: String,
}

/// What the secondary device needs to continue the flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkTransactionResponse {
    /// Linked transaction id
    pub link_transaction_id: String,
    /// Client display name
    pub client_name: String,
    /// Client logo
    pub logo_url: Option<String>,
    /// Acceptable factor combinations
    pub auth_factors: Vec<Vec<AuthenticationFactor>>,
    /// Scopes requiring a permission decision
    pub authorize_scopes: Vec<String>,
    /// Claims the user must release
    pub essential_claims: Vec<String>,
    /// Claims the user may release
    pub voluntary_claims: Vec<String>,
}

/// `POST /linked-authorization/link-status` and `/link-auth-code`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkStatusRequest {
    /// Primary transaction id
    pub transaction_id: String,
    /// Link code the primary device generated
    pub link_code: String,
}

/// Link state observed by the primary device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkStatusResponse {
    /// Primary transaction id
    pub transaction_id: String,
    /// Always `LINKED`
    pub link_status: String,
    /// Linked transaction id
    pub linked_transaction_id: String,
}

/// `POST /linked-authorization/authenticate`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedAuthRequest {
    /// Linked transaction id
    pub linked_transaction_id: String,
    /// End-user identifier
    pub individual_id: String,
    /// Presented credentials
    pub challenge_list: Vec<AuthChallenge>,
}

/// Linked authentication result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedAuthResponse {
    /// Linked transaction id
    pub linked_transaction_id: String,
    /// Consent evaluation outcome
    pub consent_action: ConsentAction,
}

/// `POST /linked-authorization/consent`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedConsentRequest {
    /// Linked transaction id
    pub linked_transaction_id: String,
    /// Claims the user accepted
    #[serde(default)]
    pub accepted_claims: Vec<String>,
    /// Scopes the user permitted
    #[serde(default)]
    pub permitted_authorize_scopes: Vec<String>,
}

/// Linked consent result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedConsentResponse {
    /// Linked transaction id
    pub linked_transaction_id: String,
}

/// Form body of `POST /oauth/token`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenRequest {
    /// Must be `authorization_code`
    pub grant_type: String,
    /// Authorization code
    pub code: String,
    /// Client identifier
    pub client_id: String,
    /// Redirect URI used at details time
    pub redirect_uri: String,
    /// Must be the JWT bearer assertion type
    pub client_assertion_type: String,
    /// Signed client assertion
    pub client_assertion: String,
    /// PKCE verifier
    #[serde(default)]
    pub code_verifier: Option<String>,
}

/// Token endpoint success body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Signed access token
    pub access_token: String,
    /// Signed ID token
    pub id_token: String,
    /// Always `Bearer`
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_code_queue_evicts_oldest() {
        let mut queue = LinkCodeQueue::new(2);
        assert_eq!(queue.push("a".to_owned()), None);
        assert_eq!(queue.push("b".to_owned()), None);
        assert_eq!(queue.push("c".to_owned()), Some("a".to_owned()));
        assert_eq!(queue.head(), Some("c"));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.drain(), vec!["b".to_owned(), "c".to_owned()]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_consent_action_wire_names() {
        assert_eq!(
            serde_json::to_string(&ConsentAction::NoCapture).unwrap(),
            "\"NOCAPTURE\""
        );
        assert_eq!(
            serde_json::to_string(&ConsentAction::Capture).unwrap(),
            "\"CAPTURE\""
        );
    }

    #[test]
    fn test_phase_ordering() {
        assert!(TransactionPhase::Consented > TransactionPhase::Authenticated);
        assert!(TransactionPhase::Linked < TransactionPhase::Authenticated);
    }
}

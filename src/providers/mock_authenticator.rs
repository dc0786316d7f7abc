// ABOUTME: In-memory authenticator for development and tests
// ABOUTME: Verifies PIN/OTP challenges, masks OTP destinations and signs KYC claim documents
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::spi::{
    Authenticator, KycAuthRequest, KycAuthResult, KycExchangeRequest, SendOtpRequest,
    SendOtpResult,
};
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::utils::crypto::{constant_time_eq, generate_random_string, random_bytes, sha256_base64url};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

const KYC_TOKEN_BYTES: usize = 32;
const KYC_TOKEN_TTL_MINUTES: i64 = 10;

/// Identity known to the mock authenticator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockIdentity {
    /// End-user identifier
    pub individual_id: String,
    /// Static PIN
    #[serde(default)]
    pub pin: Option<String>,
    /// Fixed OTP accepted for this identity
    #[serde(default)]
    pub otp: Option<String>,
    /// Email address for OTP delivery
    #[serde(default)]
    pub email: Option<String>,
    /// Phone number for OTP delivery
    #[serde(default)]
    pub phone: Option<String>,
    /// User claims released through KYC exchange
    #[serde(default)]
    pub claims: Map<String, Value>,
}

#[derive(Debug, Clone)]
struct KycSession {
    individual_id: String,
    client_id: String,
    expires_at: DateTime<Utc>,
}

/// Authenticator backed by a map of [`MockIdentity`] records
#[derive(Clone)]
pub struct MockAuthenticator {
    identities: Arc<DashMap<String, MockIdentity>>,
    kyc_sessions: Arc<DashMap<String, KycSession>>,
    kyc_signing_key: Arc<EncodingKey>,
}

impl MockAuthenticator {
    /// Create an authenticator with a fresh KYC signing secret
    ///
    /// # Errors
    ///
    /// Returns an error if the system RNG fails
    pub fn new() -> AppResult<Self> {
        let secret = random_bytes(32)?;
        Ok(Self {
            identities: Arc::new(DashMap::new()),
            kyc_sessions: Arc::new(DashMap::new()),
            kyc_signing_key: Arc::new(EncodingKey::from_secret(&secret)),
        })
    }

    /// Add or replace an identity
    pub fn register(&self, identity: MockIdentity) {
        self.identities
            .insert(identity.individual_id.clone(), identity);
    }

    /// Number of known identities
    #[must_use]
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    /// Whether no identity is known
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    fn check_challenge(identity: &MockIdentity, factor_type: &str, challenge: &str) -> bool {
        let expected = match factor_type {
            "PIN" => identity.pin.as_deref(),
            "OTP" => identity.otp.as_deref(),
            _ => None,
        };
        expected.is_some_and(|expected| constant_time_eq(expected, challenge))
    }
}

/// Mask all but the last two characters of the local part
fn mask_email(email: &str) -> String {
    let Some((local, domain)) = email.split_once('@') else {
        return mask_tail(email, 2);
    };
    format!("{}@{domain}", mask_tail(local, 2))
}

fn mask_tail(value: &str, visible: usize) -> String {
    let len = value.chars().count();
    value
        .chars()
        .enumerate()
        .map(|(i, c)| if i + visible < len { 'X' } else { c })
        .collect()
}

#[async_trait]
impl Authenticator for MockAuthenticator {
    async fn verify(&self, request: &KycAuthRequest) -> AppResult<KycAuthResult> {
        let identity = self
            .identities
            .get(&request.individual_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::auth_failed("Unknown individual"))?;

        if request.challenges.is_empty()
            || !request.challenges.iter().all(|challenge| {
                Self::check_challenge(&identity, &challenge.auth_factor_type, &challenge.challenge)
            })
        {
            return Err(AppError::auth_failed("Challenge verification failed"));
        }

        let kyc_token = generate_random_string(KYC_TOKEN_BYTES)?;
        self.kyc_sessions.insert(
            kyc_token.clone(),
            KycSession {
                individual_id: identity.individual_id.clone(),
                client_id: request.client_id.clone(),
                expires_at: Utc::now() + Duration::minutes(KYC_TOKEN_TTL_MINUTES),
            },
        );

        Ok(KycAuthResult {
            kyc_token,
            partner_specific_user_token: sha256_base64url(&format!(
                "{}:{}",
                identity.individual_id, request.relying_party_id
            )),
        })
    }

    async fn send_otp(&self, request: &SendOtpRequest) -> AppResult<SendOtpResult> {
        let identity = self
            .identities
            .get(&request.individual_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::new(ErrorCode::SendOtpFailed, "Unknown individual"))?;

        let wants = |channel: &str| {
            request
                .otp_channels
                .iter()
                .any(|c| c.eq_ignore_ascii_case(channel))
        };
        let masked_email = identity
            .email
            .as_deref()
            .filter(|_| wants("email"))
            .map(mask_email);
        let masked_mobile = identity
            .phone
            .as_deref()
            .filter(|_| wants("phone") || wants("mobile"))
            .map(|phone| mask_tail(phone, 4));

        if masked_email.is_none() && masked_mobile.is_none() {
            return Err(AppError::new(
                ErrorCode::SendOtpFailed,
                "No OTP channel available for this individual",
            ));
        }

        tracing::debug!(
            auth_transaction_id = %request.auth_transaction_id,
            "OTP dispatched"
        );
        Ok(SendOtpResult {
            transaction_id: request.auth_transaction_id.clone(),
            masked_email,
            masked_mobile,
        })
    }

    async fn kyc_exchange(&self, request: &KycExchangeRequest) -> AppResult<String> {
        let (_, session) = self
            .kyc_sessions
            .remove(&request.kyc_token)
            .ok_or_else(|| AppError::invalid_grant("Unknown KYC token"))?;

        if session.expires_at <= Utc::now()
            || session.client_id != request.client_id
            || session.individual_id != request.individual_id
        {
            return Err(AppError::invalid_grant("KYC token is expired or not bound to this request"));
        }

        let identity = self
            .identities
            .get(&session.individual_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::invalid_grant("Unknown individual"))?;

        let mut document: Map<String, Value> = request
            .accepted_claims
            .iter()
            .filter_map(|claim| {
                identity
                    .claims
                    .get(claim)
                    .map(|value| (claim.clone(), value.clone()))
            })
            .collect();
        document.insert(
            "sub".to_owned(),
            Value::String(request.partner_specific_user_token.clone()),
        );
        document.insert("iat".to_owned(), Value::from(Utc::now().timestamp()));

        encode(
            &Header::new(Algorithm::HS256),
            &Value::Object(document),
            &self.kyc_signing_key,
        )
        .map_err(|e| AppError::internal(format!("Failed to sign KYC document: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::spi::AuthChallenge;
    use serde_json::json;

    fn authenticator() -> MockAuthenticator {
        let auth = MockAuthenticator::new().unwrap();
        let Value::Object(claims) = json!({"email": "jane@example.com", "name": "Jane"}) else {
            unreachable!()
        };
        auth.register(MockIdentity {
            individual_id: "8267411571".to_owned(),
            pin: Some("111111".to_owned()),
            otp: Some("123456".to_owned()),
            email: Some("jane.doe@example.com".to_owned()),
            phone: Some("9876543210".to_owned()),
            claims,
        });
        auth
    }

    fn auth_request(factor: &str, challenge: &str) -> KycAuthRequest {
        KycAuthRequest {
            individual_id: "8267411571".to_owned(),
            auth_transaction_id: "abc".to_owned(),
            challenges: vec![AuthChallenge {
                auth_factor_type: factor.to_owned(),
                challenge: challenge.to_owned(),
                format: "number".to_owned(),
            }],
            relying_party_id: "rp".to_owned(),
            client_id: "C1".to_owned(),
        }
    }

    #[tokio::test]
    async fn test_verify_pin_and_reject_wrong_pin() {
        let auth = authenticator();
        let result = auth.verify(&auth_request("PIN", "111111")).await.unwrap();
        assert!(!result.kyc_token.is_empty());
        assert_eq!(
            result.partner_specific_user_token,
            sha256_base64url("8267411571:rp")
        );

        let err = auth.verify(&auth_request("PIN", "000000")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthFailed);

        let err = auth.verify(&auth_request("BIO", "x")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthFailed);
    }

    #[tokio::test]
    async fn test_send_otp_masks_destinations() {
        let auth = authenticator();
        let result = auth
            .send_otp(&SendOtpRequest {
                individual_id: "8267411571".to_owned(),
                auth_transaction_id: "txn".to_owned(),
                otp_channels: vec!["email".to_owned(), "phone".to_owned()],
                relying_party_id: "rp".to_owned(),
                client_id: "C1".to_owned(),
            })
            .await
            .unwrap();
        assert_eq!(result.transaction_id, "txn");
        assert_eq!(result.masked_email.as_deref(), Some("XXXXXXoe@example.com"));
        assert_eq!(result.masked_mobile.as_deref(), Some("XXXXXX3210"));
    }

    #[tokio::test]
    async fn test_kyc_exchange_is_single_use() {
        let auth = authenticator();
        let result = auth.verify(&auth_request("OTP", "123456")).await.unwrap();
        let exchange = KycExchangeRequest {
            kyc_token: result.kyc_token,
            individual_id: "8267411571".to_owned(),
            partner_specific_user_token: result.partner_specific_user_token,
            accepted_claims: vec!["email".to_owned()],
            claims_locales: Vec::new(),
            relying_party_id: "rp".to_owned(),
            client_id: "C1".to_owned(),
        };

        let document = auth.kyc_exchange(&exchange).await.unwrap();
        assert_eq!(document.split('.').count(), 3);
        assert!(auth.kyc_exchange(&exchange).await.is_err());
    }
}

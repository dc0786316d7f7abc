// ABOUTME: OIDC authorization engine driving transactions through details, auth, consent and code
// ABOUTME: Holds injected collaborators and the transaction store; flows live in submodules
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Authorization Engine
//!
//! [`AuthorizationServer`] implements the authorization-code flow as a state machine over
//! the [`TransactionStore`]. Every phase lives under its own namespace and moves forward
//! by writing the new key before deleting the old one.
//!
//! - [`authorization`]: details, OTP, authenticate, consent and code issuance
//! - [`linked`]: cross-device rendezvous through short link codes and long polls
//! - [`token`]: code redemption, client assertions and userinfo

/// ACR/AMR resolution
pub mod acr;
/// Client assertion verification
pub mod assertion;
/// Single-device authorization flow
pub mod authorization;
/// Scope and claim resolution
pub mod claims;
/// Consent evaluation and persistence
pub mod consent;
/// Linked cross-device flow
pub mod linked;
/// Long poll wake-up registry
pub mod long_poll;
/// Transaction record and endpoint DTOs
pub mod models;
/// PKCE validation
pub mod pkce;
/// Token endpoint and userinfo
pub mod token;

pub use acr::AcrResolver;
pub use long_poll::PollRegistry;
pub use models::{ConsentAction, Transaction, TransactionPhase};

use crate::cache::{Namespace, TransactionStore};
use crate::config::environment::OidcConfig;
use crate::constants::oidc::AUTH_CODE_BYTES;
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::logging::AppLogger;
use crate::providers::spi::{
    AuthChallenge, Authenticator, ClientDetail, ClientRegistry, ConsentStore, KycAuthRequest,
    SendOtpRequest, Signer,
};
use crate::utils::crypto::{constant_time_eq, generate_random_string, sha256_base64url};
use chrono::{DateTime, Utc};
use claims::{validate_accepted_claims, validate_permitted_scopes};
use models::{AuthCodeResponse, OtpResponse};
use std::sync::Arc;

/// Values of the `oauth-details-key` and `oauth-details-hash` request headers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailsHeaders {
    /// Transaction id the caller claims to act on
    pub transaction_id: String,
    /// Hash of the details response the caller was shown
    pub details_hash: String,
}

/// OIDC authorization server
pub struct AuthorizationServer {
    store: TransactionStore,
    clients: Arc<dyn ClientRegistry>,
    authenticator: Arc<dyn Authenticator>,
    signer: Arc<dyn Signer>,
    consents: Arc<dyn ConsentStore>,
    acr: AcrResolver,
    config: OidcConfig,
    polls: PollRegistry,
}

impl AuthorizationServer {
    /// Create an engine over a store and its collaborators
    #[must_use]
    pub fn new(
        store: TransactionStore,
        clients: Arc<dyn ClientRegistry>,
        authenticator: Arc<dyn Authenticator>,
        signer: Arc<dyn Signer>,
        consents: Arc<dyn ConsentStore>,
        acr: AcrResolver,
        config: OidcConfig,
    ) -> Self {
        Self {
            store,
            clients,
            authenticator,
            signer,
            consents,
            acr,
            config,
            polls: PollRegistry::new(),
        }
    }

    /// Transaction store backing this engine
    #[must_use]
    pub const fn store(&self) -> &TransactionStore {
        &self.store
    }

    /// Engine settings
    #[must_use]
    pub const fn config(&self) -> &OidcConfig {
        &self.config
    }

    /// ACR/AMR resolver
    #[must_use]
    pub const fn acr(&self) -> &AcrResolver {
        &self.acr
    }

    /// Long poll registry
    #[must_use]
    pub const fn polls(&self) -> &PollRegistry {
        &self.polls
    }

    /// Check a wrapped request's `requestTime` against the server clock
    ///
    /// # Errors
    ///
    /// Returns `invalid_request` when the time is not RFC 3339 or outside the allowed variance
    pub fn validate_request_time(&self, request_time: &str) -> AppResult<()> {
        let sent = DateTime::parse_from_rfc3339(request_time)
            .map_err(|e| AppError::invalid_request(format!("Invalid requestTime: {e}")))?;
        let drift = (Utc::now() - sent.with_timezone(&Utc)).num_seconds().abs();
        if drift > self.config.request_time_variance_secs {
            return Err(AppError::invalid_request(
                "requestTime is outside the allowed variance",
            ));
        }
        Ok(())
    }

    /// Active client with the given id
    async fn active_client(&self, client_id: &str) -> AppResult<ClientDetail> {
        self.clients
            .lookup(client_id)
            .await?
            .filter(ClientDetail::is_active)
            .ok_or_else(|| {
                AppError::from_code(ErrorCode::InvalidClientId).with_client_id(client_id)
            })
    }

    /// Header transaction id must match the body's
    fn check_details_key(headers: &DetailsHeaders, transaction_id: &str) -> AppResult<()> {
        if headers.transaction_id == transaction_id {
            return Ok(());
        }
        Err(AppError::new(
            ErrorCode::InvalidTransactionId,
            "oauth-details-key does not match the transaction",
        ))
    }

    /// Presented details hash must equal the one recorded at details time
    fn check_details_hash(headers: &DetailsHeaders, transaction: &Transaction) -> AppResult<()> {
        if constant_time_eq(&headers.details_hash, &transaction.oauth_details_hash) {
            return Ok(());
        }
        AppLogger::log_security_event(
            "details_hash_mismatch",
            &transaction.transaction_id,
            Some(&transaction.client_id),
        );
        Err(AppError::invalid_transaction().with_transaction_id(&transaction.transaction_id))
    }

    /// Hash the individual id and reject blocked individuals
    async fn unblocked_individual_hash(
        &self,
        transaction: &Transaction,
        individual_id: &str,
    ) -> AppResult<String> {
        let hash = sha256_base64url(individual_id);
        if self.store.is_blocked(&hash).await? {
            AppLogger::log_security_event(
                "individual_blocked",
                &transaction.transaction_id,
                Some(&transaction.client_id),
            );
            return Err(AppError::from_code(ErrorCode::IndividualIdBlocked)
                .with_transaction_id(&transaction.transaction_id));
        }
        Ok(hash)
    }

    /// Deliver an OTP for a transaction through the authenticator
    async fn deliver_otp(
        &self,
        transaction: &Transaction,
        response_transaction_id: &str,
        individual_id: &str,
        otp_channels: Vec<String>,
    ) -> AppResult<OtpResponse> {
        self.unblocked_individual_hash(transaction, individual_id)
            .await?;

        let result = self
            .authenticator
            .send_otp(&SendOtpRequest {
                individual_id: individual_id.to_owned(),
                auth_transaction_id: transaction.auth_transaction_id.clone(),
                otp_channels,
                relying_party_id: transaction.relying_party_id.clone(),
                client_id: transaction.client_id.clone(),
            })
            .await?;

        if result.transaction_id != transaction.auth_transaction_id {
            return Err(AppError::new(
                ErrorCode::SendOtpFailed,
                "Authenticator answered for a different transaction",
            )
            .with_transaction_id(response_transaction_id));
        }

        Ok(OtpResponse {
            transaction_id: response_transaction_id.to_owned(),
            masked_email: result.masked_email,
            masked_mobile: result.masked_mobile,
        })
    }

    /// Claim the single exit of a transaction from the details phase
    ///
    /// Authentication on the primary device and linking to a secondary device are
    /// mutually exclusive; whichever claims first wins across all processes.
    async fn claim_phase(&self, transaction_id: &str, phase: TransactionPhase) -> AppResult<bool> {
        let claimed = self
            .store
            .claim_once(Namespace::PhaseClaim, transaction_id, &phase)
            .await?;
        if !claimed {
            tracing::warn!(transaction.id = %transaction_id, phase = ?phase, "Phase claim lost");
        }
        Ok(claimed)
    }

    /// Whether the transaction already left the details phase
    async fn phase_claimed(&self, transaction_id: &str) -> AppResult<bool> {
        Ok(self
            .store
            .get::<TransactionPhase>(Namespace::PhaseClaim, transaction_id)
            .await?
            .is_some())
    }

    /// Verify challenges, record the result and pre-evaluate consent
    ///
    /// Mutates only the in-memory transaction; the caller persists it.
    async fn verify_and_record(
        &self,
        transaction: &mut Transaction,
        individual_id: &str,
        challenges: Vec<AuthChallenge>,
    ) -> AppResult<()> {
        let individual_id_hash = self
            .unblocked_individual_hash(transaction, individual_id)
            .await?;
        let provided = self
            .acr
            .provided_auth_factors(&transaction.acr_values, &challenges)
            .map_err(|e| e.with_transaction_id(&transaction.transaction_id))?;

        let result = self
            .authenticator
            .verify(&KycAuthRequest {
                individual_id: individual_id.to_owned(),
                auth_transaction_id: transaction.auth_transaction_id.clone(),
                challenges,
                relying_party_id: transaction.relying_party_id.clone(),
                client_id: transaction.client_id.clone(),
            })
            .await
            .inspect_err(|e| {
                AppLogger::log_auth_event(&transaction.transaction_id, false, Some(&e.message));
            })?;
        AppLogger::log_auth_event(&transaction.transaction_id, true, None);

        let now = Utc::now();
        transaction.individual_id_hash = Some(individual_id_hash);
        transaction.individual_id = Some(individual_id.to_owned());
        transaction.kyc_token = Some(result.kyc_token);
        transaction.partner_specific_user_token = Some(result.partner_specific_user_token);
        transaction.provided_auth_factors = provided;
        transaction.auth_time_in_seconds = Some(now.timestamp());
        transaction.is_internal_auth_success = true;
        transaction.phase = TransactionPhase::Authenticated;

        consent::evaluate(self.consents.as_ref(), transaction, now).await
    }

    /// Apply a consent selection to the transaction after validating it
    async fn apply_consent(
        &self,
        transaction: &mut Transaction,
        accepted_claims: Vec<String>,
        permitted_scopes: Vec<String>,
    ) -> AppResult<ConsentAction> {
        validate_accepted_claims(transaction, &accepted_claims)?;
        validate_permitted_scopes(transaction, &permitted_scopes)?;
        let action = consent::evaluate_submission(
            self.consents.as_ref(),
            transaction,
            &accepted_claims,
            &permitted_scopes,
            Utc::now(),
        )
        .await?;
        transaction.accepted_claims = accepted_claims;
        transaction.permitted_scopes = permitted_scopes;
        transaction.consent_action = Some(action);
        transaction.phase = TransactionPhase::Consented;
        Ok(action)
    }

    /// Mint an authorization code, persist consent and store the transaction under the code hash
    ///
    /// The caller deletes the transaction's previous key.
    async fn issue_code(&self, transaction: &mut Transaction) -> AppResult<AuthCodeResponse> {
        let code = generate_random_string(AUTH_CODE_BYTES)?;
        let code_hash = sha256_base64url(&code);
        transaction.code_hash = Some(code_hash.clone());
        transaction.phase = TransactionPhase::CodeIssued;

        consent::record(self.consents.as_ref(), transaction, Utc::now()).await?;
        self.store
            .put(Namespace::AuthCode, &code_hash, transaction)
            .await?;

        AppLogger::log_transaction_event(
            &transaction.transaction_id,
            &transaction.client_id,
            "CODE_ISSUED",
        );
        Ok(AuthCodeResponse {
            code,
            state: transaction.state.clone(),
            nonce: transaction.nonce.clone(),
            redirect_uri: transaction.redirect_uri.clone(),
        })
    }
}

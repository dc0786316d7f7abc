// ABOUTME: Single-device authorization flow: details, OTP, authenticate, consent and code issuance
// ABOUTME: Each step validates the phase and details hash, then re-keys the transaction forward
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::acr::select_acr_values;
use super::claims::{
    resolve_requested_claims, split_values, validate_accepted_claims, validate_permitted_scopes,
};
use super::models::{
    AuthCodeResponse, AuthRequest, AuthResponse, ClaimsRequest, ConsentAction, ConsentRequest,
    ConsentResponse, LinkCodeQueue, OAuthDetailRequest, OAuthDetailResponse, OtpRequest,
    OtpResponse, Transaction, TransactionPhase,
};
use super::{pkce, AuthorizationServer, DetailsHeaders};
use crate::cache::Namespace;
use crate::constants::oidc::{
    OPENID_SCOPES, RESPONSE_TYPE_CODE, SCOPE_OPENID, TRANSACTION_ID_BYTES,
};
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::logging::AppLogger;
use crate::utils::crypto::{
    canonical_json_hash, derive_auth_transaction_id, generate_random_string,
};
use crate::utils::redirect::matches_any;

/// Details response together with the hash later calls must present
#[derive(Debug, Clone)]
pub struct OAuthDetails {
    /// Response body
    pub response: OAuthDetailResponse,
    /// Canonical hash of `response`
    pub oauth_details_hash: String,
}

impl AuthorizationServer {
    /// Validate an authorization request and open a transaction
    ///
    /// # Errors
    ///
    /// Returns `invalid_client_id`, `invalid_redirect_uri`, `invalid_response_type`,
    /// `invalid_scope`, `no_acr_registered` or a PKCE error for a rejected request
    pub async fn oauth_details(&self, request: OAuthDetailRequest) -> AppResult<OAuthDetails> {
        let client = self.active_client(&request.client_id).await?;
        if !matches_any(&request.redirect_uri, &client.redirect_uris) {
            return Err(AppError::from_code(ErrorCode::InvalidRedirectUri)
                .with_client_id(&client.id));
        }
        if request.response_type != RESPONSE_TYPE_CODE {
            return Err(AppError::from_code(ErrorCode::InvalidResponseType)
                .with_client_id(&client.id));
        }

        let scopes = split_values(Some(&request.scope));
        let authorize_scopes = self.check_scopes(&scopes)?;
        let acr_values = select_acr_values(
            &client.acr_values,
            request.acr_values.as_deref(),
            request.claims.as_ref(),
        )?;
        let resolved = resolve_requested_claims(
            &scopes,
            request.claims.as_ref(),
            &client.claims,
            &self.config.scope_claims,
        )?;
        let proof_key_code_exchange = pkce::validate_challenge(
            request.code_challenge.as_deref(),
            request.code_challenge_method.as_deref(),
        )?;

        let transaction_id = generate_random_string(TRANSACTION_ID_BYTES)?;
        let response = OAuthDetailResponse {
            transaction_id: transaction_id.clone(),
            client_name: client.name.clone(),
            logo_url: client.logo_uri.clone(),
            auth_factors: self.acr.resolve(&acr_values),
            authorize_scopes: authorize_scopes.clone(),
            essential_claims: resolved.essential.clone(),
            voluntary_claims: resolved.voluntary.clone(),
            redirect_uri: request.redirect_uri.clone(),
        };
        let oauth_details_hash = canonical_json_hash(&response)?;

        let transaction = Transaction {
            auth_transaction_id: derive_auth_transaction_id(
                &transaction_id,
                self.config.auth_txn_id_length,
            ),
            transaction_id,
            phase: TransactionPhase::DetailsIssued,
            client_id: client.id.clone(),
            relying_party_id: client.relying_party_id.clone(),
            redirect_uri: request.redirect_uri,
            requested_authorize_scopes: authorize_scopes,
            requested_claims: ClaimsRequest {
                userinfo: Some(resolved.userinfo),
                id_token: request.claims.and_then(|claims| claims.id_token),
            },
            essential_claims: resolved.essential,
            voluntary_claims: resolved.voluntary,
            acr_values,
            nonce: request.nonce,
            state: request.state,
            claims_locales: split_values(request.claims_locales.as_deref()),
            proof_key_code_exchange,
            oauth_details_hash: oauth_details_hash.clone(),
            individual_id_hash: None,
            individual_id: None,
            kyc_token: None,
            partner_specific_user_token: None,
            provided_auth_factors: Vec::new(),
            auth_time_in_seconds: None,
            accepted_claims: Vec::new(),
            permitted_scopes: Vec::new(),
            consent_action: None,
            consent_expire_minutes: client.consent_expire_minutes,
            is_internal_auth_success: false,
            code_hash: None,
            a_hash: None,
            encrypted_kyc: None,
            link_code_queue: LinkCodeQueue::default(),
            current_link_code_limit: self.config.link_code_limit,
            linked_code_hash: None,
            linked_transaction_id: None,
            server_nonce: generate_random_string(TRANSACTION_ID_BYTES)?,
        };

        self.store
            .put(Namespace::PreAuth, &transaction.transaction_id, &transaction)
            .await?;
        AppLogger::log_transaction_event(
            &transaction.transaction_id,
            &transaction.client_id,
            "DETAILS_ISSUED",
        );

        Ok(OAuthDetails {
            response,
            oauth_details_hash,
        })
    }

    /// Scopes must include `openid` and be known; returns the authorize scopes among them
    fn check_scopes(&self, scopes: &[String]) -> AppResult<Vec<String>> {
        if !scopes.iter().any(|scope| scope == SCOPE_OPENID) {
            return Err(AppError::new(
                ErrorCode::InvalidScope,
                "The openid scope is required",
            ));
        }
        let authorize_scopes = &self.config.authorize_scopes;
        if let Some(unknown) = scopes.iter().find(|scope| {
            scope.as_str() != SCOPE_OPENID
                && !OPENID_SCOPES.contains(&scope.as_str())
                && !authorize_scopes.contains(scope)
        }) {
            return Err(AppError::new(
                ErrorCode::InvalidScope,
                format!("Unsupported scope: {unknown}"),
            ));
        }
        Ok(scopes
            .iter()
            .filter(|scope| authorize_scopes.contains(scope))
            .cloned()
            .collect())
    }

    /// Load a pre-authentication transaction and check the request headers against it
    async fn preauth_transaction(
        &self,
        headers: &DetailsHeaders,
        transaction_id: &str,
    ) -> AppResult<Transaction> {
        Self::check_details_key(headers, transaction_id)?;
        let transaction: Transaction = self
            .store
            .get(Namespace::PreAuth, transaction_id)
            .await?
            .filter(|txn: &Transaction| txn.phase == TransactionPhase::DetailsIssued)
            .ok_or_else(|| AppError::invalid_transaction().with_transaction_id(transaction_id))?;
        Self::check_details_hash(headers, &transaction)?;
        Ok(transaction)
    }

    /// Send an OTP to the individual for a transaction awaiting authentication
    ///
    /// # Errors
    ///
    /// Returns `invalid_transaction`, `individual_id_blocked` or `send_otp_failed`
    pub async fn send_otp(
        &self,
        headers: &DetailsHeaders,
        request: OtpRequest,
    ) -> AppResult<OtpResponse> {
        let transaction = self
            .preauth_transaction(headers, &request.transaction_id)
            .await?;
        self.deliver_otp(
            &transaction,
            &request.transaction_id,
            &request.individual_id,
            request.otp_channels,
        )
        .await
    }

    /// Authenticate the end-user and advance the transaction to AUTHENTICATED
    ///
    /// Verification runs outside the transaction lock. The phase move re-reads the
    /// transaction under the lock and must win the phase claim, so a transaction linked
    /// to another device in the meantime is not authenticated here as well.
    ///
    /// # Errors
    ///
    /// Returns `invalid_transaction` when the transaction is missing, already authenticated,
    /// linked or the details hash differs, or the authenticator's error when verification fails
    pub async fn authenticate(
        &self,
        headers: &DetailsHeaders,
        request: AuthRequest,
    ) -> AppResult<AuthResponse> {
        let transaction_id = request.transaction_id;
        let mut transaction = self.preauth_transaction(headers, &transaction_id).await?;
        self.verify_and_record(
            &mut transaction,
            &request.individual_id,
            request.challenge_list,
        )
        .await?;

        let _guard = self.store.lock(Namespace::PreAuth, &transaction_id).await;
        let mut current = self.preauth_transaction(headers, &transaction_id).await?;
        if current.linked_transaction_id.is_some()
            || !self
                .claim_phase(&transaction_id, TransactionPhase::Authenticated)
                .await?
        {
            return Err(AppError::invalid_transaction().with_transaction_id(&transaction_id));
        }
        let retired = current.link_code_queue.drain();
        transaction.link_code_queue = current.link_code_queue;
        if !self
            .store
            .claim_once(Namespace::Authenticated, &transaction_id, &transaction)
            .await?
        {
            return Err(AppError::invalid_transaction().with_transaction_id(&transaction_id));
        }
        self.store.delete(Namespace::PreAuth, &transaction_id).await?;
        for code_hash in &retired {
            self.store
                .delete(Namespace::LinkCodeGenerated, code_hash)
                .await?;
        }

        AppLogger::log_transaction_event(
            &transaction.transaction_id,
            &transaction.client_id,
            "AUTHENTICATED",
        );
        Ok(AuthResponse {
            transaction_id,
            consent_action: transaction
                .consent_action
                .unwrap_or(ConsentAction::Capture),
        })
    }

    /// Load an authenticated transaction and check the request headers against it
    async fn authenticated_transaction(
        &self,
        headers: &DetailsHeaders,
        transaction_id: &str,
    ) -> AppResult<Transaction> {
        Self::check_details_key(headers, transaction_id)?;
        let transaction: Transaction = self
            .store
            .get(Namespace::Authenticated, transaction_id)
            .await?
            .filter(|txn: &Transaction| {
                matches!(
                    txn.phase,
                    TransactionPhase::Authenticated | TransactionPhase::Consented
                )
            })
            .ok_or_else(|| AppError::invalid_transaction().with_transaction_id(transaction_id))?;
        Self::check_details_hash(headers, &transaction)?;
        Ok(transaction)
    }

    /// Record the user's consent decision
    ///
    /// # Errors
    ///
    /// Returns `invalid_transaction`, `invalid_accepted_claim` or `invalid_permitted_scope`
    pub async fn consent(
        &self,
        headers: &DetailsHeaders,
        request: ConsentRequest,
    ) -> AppResult<ConsentResponse> {
        let _guard = self
            .store
            .lock(Namespace::Authenticated, &request.transaction_id)
            .await;
        let mut transaction = self
            .authenticated_transaction(headers, &request.transaction_id)
            .await?;

        let action = self
            .apply_consent(
                &mut transaction,
                request.accepted_claims.unwrap_or_default(),
                request.permitted_authorize_scopes.unwrap_or_default(),
            )
            .await?;
        self.store
            .put(Namespace::Authenticated, &request.transaction_id, &transaction)
            .await?;

        AppLogger::log_transaction_event(
            &transaction.transaction_id,
            &transaction.client_id,
            "CONSENTED",
        );
        Ok(ConsentResponse {
            transaction_id: request.transaction_id,
            consent_action: action,
        })
    }

    /// Issue the authorization code for an authenticated transaction
    ///
    /// Selections in the request replace the recorded ones; omitted selections keep them.
    ///
    /// # Errors
    ///
    /// Returns `invalid_transaction` when the transaction is missing or has already been
    /// given a code, or a consent validation error
    pub async fn issue_auth_code(
        &self,
        headers: &DetailsHeaders,
        request: ConsentRequest,
    ) -> AppResult<AuthCodeResponse> {
        let _guard = self
            .store
            .lock(Namespace::Authenticated, &request.transaction_id)
            .await;
        let mut transaction = self
            .authenticated_transaction(headers, &request.transaction_id)
            .await?;

        if request.accepted_claims.is_some() || request.permitted_authorize_scopes.is_some() {
            let accepted = request
                .accepted_claims
                .unwrap_or_else(|| transaction.accepted_claims.clone());
            let permitted = request
                .permitted_authorize_scopes
                .unwrap_or_else(|| transaction.permitted_scopes.clone());
            self.apply_consent(&mut transaction, accepted, permitted)
                .await?;
        } else {
            validate_accepted_claims(&transaction, &transaction.accepted_claims)?;
            validate_permitted_scopes(&transaction, &transaction.permitted_scopes)?;
        }

        let response = self.issue_code(&mut transaction).await?;
        self.store
            .delete(Namespace::Authenticated, &request.transaction_id)
            .await?;
        Ok(response)
    }
}


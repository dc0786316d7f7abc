// ABOUTME: Token endpoint redemption of authorization codes and the userinfo lookup
// ABOUTME: Single-use redemption, client authentication, PKCE, token signing and KYC exchange
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::models::{TokenRequest, TokenResponse, Transaction, TransactionPhase};
use super::{pkce, AuthorizationServer};
use crate::cache::Namespace;
use crate::constants::oidc::{GRANT_TYPE_AUTHORIZATION_CODE, TOKEN_TYPE_BEARER};
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::logging::AppLogger;
use crate::providers::spi::KycExchangeRequest;
use crate::utils::crypto::{access_token_hash, sha256_base64url};
use chrono::Utc;
use serde_json::{json, Value};

fn expiry(issued_at: i64, lifetime_secs: u64) -> i64 {
    issued_at.saturating_add(i64::try_from(lifetime_secs).unwrap_or(i64::MAX))
}

impl AuthorizationServer {
    /// Redeem an authorization code for an access token and an ID token
    ///
    /// The code is taken out of the store before any other check, so it is spent even when
    /// the request is later rejected and a concurrent redemption finds nothing.
    ///
    /// # Errors
    ///
    /// Returns `unsupported_grant_type`, `invalid_grant` for an unknown, reused or PKCE-failing
    /// code, `invalid_client_id`, `invalid_redirect_uri`, or a client assertion error
    pub async fn redeem_token(&self, request: TokenRequest) -> AppResult<TokenResponse> {
        if request.grant_type != GRANT_TYPE_AUTHORIZATION_CODE {
            return Err(AppError::from_code(ErrorCode::UnsupportedGrantType));
        }

        let code_hash = sha256_base64url(&request.code);
        let Some(mut transaction) = self
            .store
            .take::<Transaction>(Namespace::AuthCode, &code_hash)
            .await?
        else {
            AppLogger::log_security_event(
                "auth_code_rejected",
                "unknown, expired or already used",
                Some(&request.client_id),
            );
            return Err(AppError::invalid_grant(
                "Unknown, expired or already used authorization code",
            ));
        };

        if request.client_id != transaction.client_id {
            return Err(AppError::from_code(ErrorCode::InvalidClientId)
                .with_client_id(&request.client_id));
        }
        if request.redirect_uri != transaction.redirect_uri {
            return Err(AppError::from_code(ErrorCode::InvalidRedirectUri)
                .with_client_id(&request.client_id));
        }
        let client = self.active_client(&request.client_id).await?;
        self.verify_client_assertion(
            &client,
            &request.client_assertion_type,
            &request.client_assertion,
        )
        .await?;
        pkce::verify(
            transaction.proof_key_code_exchange.as_ref(),
            request.code_verifier.as_deref(),
        )?;

        let response = self.sign_tokens(&mut transaction).await?;
        self.attach_user_claims(&mut transaction).await?;

        let a_hash = transaction
            .a_hash
            .clone()
            .ok_or_else(|| AppError::internal("Access token hash missing after signing"))?;
        self.store
            .put(Namespace::UserInfo, &a_hash, &transaction)
            .await?;
        self.discard_linked_residue(&transaction).await?;

        Ok(response)
    }

    /// Drop the linked-flow entries that still reference a redeemed code
    async fn discard_linked_residue(&self, transaction: &Transaction) -> AppResult<()> {
        if let Some(linked_id) = &transaction.linked_transaction_id {
            self.store
                .delete(Namespace::LinkAuthCodeResult, linked_id)
                .await?;
        }
        if let Some(link_code_hash) = &transaction.linked_code_hash {
            self.store
                .delete(Namespace::LinkedCode, link_code_hash)
                .await?;
        }
        Ok(())
    }

    /// Sign the access and ID tokens and record `at_hash`
    async fn sign_tokens(&self, transaction: &mut Transaction) -> AppResult<TokenResponse> {
        let subject = transaction
            .partner_specific_user_token
            .clone()
            .ok_or_else(|| AppError::invalid_grant("Transaction was never authenticated"))?;
        let issued_at = Utc::now().timestamp();

        let access_claims = json!({
            "iss": self.config.issuer,
            "sub": subject,
            "aud": transaction.client_id,
            "iat": issued_at,
            "exp": expiry(issued_at, self.config.access_token_expire_secs),
            "azp": transaction.client_id,
            "client_id": transaction.client_id,
            "scope": transaction.permitted_scopes.join(" "),
        });
        let access_token = self.signer.sign(&access_claims).await?;
        let at_hash = access_token_hash(&access_token);

        let acr = self
            .acr
            .satisfied_acrs(&transaction.provided_auth_factors)
            .join(" ");
        let mut id_claims = json!({
            "iss": self.config.issuer,
            "sub": subject,
            "aud": transaction.client_id,
            "iat": issued_at,
            "exp": expiry(issued_at, self.config.id_token_expire_secs),
            "auth_time": transaction.auth_time_in_seconds,
            "acr": acr,
            "at_hash": at_hash,
        });
        if let (Some(nonce), Value::Object(map)) = (&transaction.nonce, &mut id_claims) {
            map.insert("nonce".to_owned(), Value::String(nonce.clone()));
        }
        let id_token = self.signer.sign(&id_claims).await?;

        transaction.a_hash = Some(at_hash);
        transaction.phase = TransactionPhase::TokenIssued;
        AppLogger::log_token_issued(&transaction.transaction_id, &transaction.client_id, &acr);

        Ok(TokenResponse {
            access_token,
            id_token,
            token_type: TOKEN_TYPE_BEARER.to_owned(),
            expires_in: self.config.access_token_expire_secs,
        })
    }

    /// Exchange the KYC token for the claims document the user agreed to release
    async fn attach_user_claims(&self, transaction: &mut Transaction) -> AppResult<()> {
        let (Some(kyc_token), Some(individual_id), Some(psut)) = (
            transaction.kyc_token.clone(),
            transaction.individual_id.clone(),
            transaction.partner_specific_user_token.clone(),
        ) else {
            return Err(AppError::invalid_grant("Transaction was never authenticated"));
        };

        let document = self
            .authenticator
            .kyc_exchange(&KycExchangeRequest {
                kyc_token,
                individual_id,
                partner_specific_user_token: psut,
                accepted_claims: transaction.accepted_claims.clone(),
                claims_locales: transaction.claims_locales.clone(),
                relying_party_id: transaction.relying_party_id.clone(),
                client_id: transaction.client_id.clone(),
            })
            .await?;
        transaction.encrypted_kyc = Some(document);
        Ok(())
    }

    /// Claims document for a bearer access token
    ///
    /// # Errors
    ///
    /// Returns `invalid_token` when the token fails verification or its transaction is gone
    pub async fn userinfo(&self, access_token: &str) -> AppResult<String> {
        let invalid = || AppError::from_code(ErrorCode::InvalidToken);

        self.signer
            .verify(access_token, None)
            .await
            .map_err(|e| AppError::new(ErrorCode::InvalidToken, e.message))?;

        let a_hash = access_token_hash(access_token);
        let transaction: Transaction = self
            .store
            .get(Namespace::UserInfo, &a_hash)
            .await
            .map_err(|_| invalid())?
            .ok_or_else(invalid)?;
        transaction.encrypted_kyc.ok_or_else(invalid)
    }
}

// ABOUTME: Cross-device linked authorization: link codes, linking, linked auth/consent and long polls
// ABOUTME: The primary device waits on link status and auth code while the secondary device authenticates
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Linked flow
//!
//! ```text
//! primary                      store                           secondary
//! link-code ──────────▶ preauth[txn], link_code_generated[h]
//!                                                     ◀────── link-transaction(code)
//!                       linked_code[h], linked_session[lid]
//! link-status ◀── signal "link:h"
//!                                                     ◀────── authenticate / consent
//!                       linked_auth[lid] → consented[lid]
//! link-auth-code ◀── signal "linked:lid"
//!                       authcode[ch], link_auth_code_result[lid]
//! ```
//!
//! Only the newest link code of a transaction links. Every step that could race across
//! processes is decided by `claim_once` on a dedicated key; linking and primary-device
//! authentication share the `phase_claim` key so a transaction takes exactly one of them.

use super::models::{
    AuthCodeResponse, ConsentAction, LinkCodeResponse, LinkStatusRequest, LinkStatusResponse,
    LinkTransactionMetadata, LinkTransactionRequest, LinkTransactionResponse, LinkedAuthRequest,
    LinkedAuthResponse, LinkedConsentRequest, LinkedConsentResponse, OtpRequest, OtpResponse,
    Transaction, TransactionPhase,
};
use super::AuthorizationServer;
use crate::cache::Namespace;
use crate::constants::oidc::{LINK_STATUS_LINKED, TRANSACTION_ID_BYTES};
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::logging::AppLogger;
use crate::utils::crypto::{generate_alphanumeric, generate_random_string, sha256_base64url};
use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;

/// Attempts at drawing an unused link code
const LINK_CODE_ATTEMPTS: usize = 2;

fn link_poll_key(link_code_hash: &str) -> String {
    format!("link:{link_code_hash}")
}

fn linked_poll_key(linked_transaction_id: &str) -> String {
    format!("linked:{linked_transaction_id}")
}

fn invalid_link_code() -> AppError {
    AppError::from_code(ErrorCode::InvalidLinkCode)
}

impl AuthorizationServer {
    /// Generate a link code for the secondary device
    ///
    /// The new code becomes the only one accepted for linking; the oldest queued code is
    /// evicted and invalidated.
    ///
    /// # Errors
    ///
    /// Returns `invalid_transaction` when the transaction is missing or past details, or
    /// `link_code_limit_reached` when its allowance is used up
    pub async fn generate_link_code(&self, transaction_id: &str) -> AppResult<LinkCodeResponse> {
        let _guard = self.store.lock(Namespace::PreAuth, transaction_id).await;
        let mut transaction: Transaction = self
            .store
            .get(Namespace::PreAuth, transaction_id)
            .await?
            .filter(|txn: &Transaction| txn.phase == TransactionPhase::DetailsIssued)
            .ok_or_else(|| AppError::invalid_transaction().with_transaction_id(transaction_id))?;
        if self.phase_claimed(transaction_id).await? {
            return Err(AppError::invalid_transaction().with_transaction_id(transaction_id));
        }

        if transaction.current_link_code_limit == 0 {
            return Err(AppError::from_code(ErrorCode::LinkCodeLimitReached)
                .with_transaction_id(transaction_id));
        }

        let (link_code, link_code_hash) = self.claim_new_link_code(transaction_id).await?;
        if let Some(evicted) = transaction.link_code_queue.push(link_code_hash.clone()) {
            self.store
                .delete(Namespace::LinkCodeGenerated, &evicted)
                .await?;
            AppLogger::log_link_event(transaction_id, &evicted, "EVICTED");
        }
        transaction.current_link_code_limit -= 1;
        self.store
            .put(Namespace::PreAuth, transaction_id, &transaction)
            .await?;

        AppLogger::log_link_event(transaction_id, &link_code_hash, "GENERATED");
        let expires_at = Utc::now()
            + ChronoDuration::from_std(Duration::from_secs(self.config.link_code_expire_secs))
                .map_err(|e| AppError::config(format!("Invalid link code expiry: {e}")))?;
        Ok(LinkCodeResponse {
            transaction_id: transaction_id.to_owned(),
            link_code,
            expire_date_time: expires_at.to_rfc3339(),
        })
    }

    /// Draw a link code and register it; a collision with a live code is retried
    async fn claim_new_link_code(&self, transaction_id: &str) -> AppResult<(String, String)> {
        let metadata = LinkTransactionMetadata {
            transaction_id: transaction_id.to_owned(),
            linked_transaction_id: None,
        };
        let ttl = Duration::from_secs(self.config.link_code_expire_secs);

        for _ in 0..LINK_CODE_ATTEMPTS {
            let link_code = generate_alphanumeric(self.config.link_code_length)?;
            let link_code_hash = sha256_base64url(&link_code);
            if self
                .store
                .claim_once_with_ttl(Namespace::LinkCodeGenerated, &link_code_hash, &metadata, ttl)
                .await?
            {
                return Ok((link_code, link_code_hash));
            }
            tracing::warn!(transaction.id = %transaction_id, "Link code collision, retrying");
        }
        Err(AppError::internal("Could not generate a unique link code"))
    }

    /// Link the secondary device to the transaction that generated `link_code`
    ///
    /// # Errors
    ///
    /// Returns `invalid_link_code` when the code is unknown, expired, evicted, not the
    /// newest or already used
    pub async fn link_transaction(
        &self,
        request: LinkTransactionRequest,
    ) -> AppResult<LinkTransactionResponse> {
        let link_code_hash = sha256_base64url(&request.link_code);
        let metadata: LinkTransactionMetadata = self
            .store
            .get(Namespace::LinkCodeGenerated, &link_code_hash)
            .await?
            .ok_or_else(invalid_link_code)?;
        let transaction_id = metadata.transaction_id;

        let _guard = self.store.lock(Namespace::PreAuth, &transaction_id).await;
        let mut transaction: Transaction = self
            .store
            .get(Namespace::PreAuth, &transaction_id)
            .await?
            .filter(|txn: &Transaction| {
                txn.phase == TransactionPhase::DetailsIssued
                    && txn.link_code_queue.head() == Some(link_code_hash.as_str())
            })
            .ok_or_else(invalid_link_code)?;
        if !self
            .claim_phase(&transaction_id, TransactionPhase::Linked)
            .await?
        {
            AppLogger::log_link_event(&transaction_id, &link_code_hash, "PHASE_CLAIM_LOST");
            return Err(invalid_link_code());
        }

        let linked_transaction_id = generate_random_string(TRANSACTION_ID_BYTES)?;
        let linked = LinkTransactionMetadata {
            transaction_id: transaction_id.clone(),
            linked_transaction_id: Some(linked_transaction_id.clone()),
        };
        if !self
            .store
            .claim_once(Namespace::LinkedCode, &link_code_hash, &linked)
            .await?
        {
            AppLogger::log_link_event(&transaction_id, &link_code_hash, "LINK_RACE_LOST");
            return Err(invalid_link_code());
        }

        transaction.linked_code_hash = Some(link_code_hash.clone());
        transaction.linked_transaction_id = Some(linked_transaction_id.clone());
        transaction.phase = TransactionPhase::Linked;
        let retired = transaction.link_code_queue.drain();
        self.store
            .move_to(
                (Namespace::PreAuth, &transaction_id),
                (Namespace::LinkedSession, &linked_transaction_id),
                &transaction,
            )
            .await?;
        for code_hash in &retired {
            self.store
                .delete(Namespace::LinkCodeGenerated, code_hash)
                .await?;
        }

        self.polls.notify(&link_poll_key(&link_code_hash));
        AppLogger::log_link_event(&transaction_id, &link_code_hash, "LINKED");

        let client = self.active_client(&transaction.client_id).await?;
        Ok(LinkTransactionResponse {
            link_transaction_id: linked_transaction_id,
            client_name: client.name,
            logo_url: client.logo_uri,
            auth_factors: self.acr.resolve(&transaction.acr_values),
            authorize_scopes: transaction.requested_authorize_scopes,
            essential_claims: transaction.essential_claims,
            voluntary_claims: transaction.voluntary_claims,
        })
    }

    /// Linked transaction waiting for authentication
    async fn linked_session(&self, linked_transaction_id: &str) -> AppResult<Transaction> {
        self.store
            .get(Namespace::LinkedSession, linked_transaction_id)
            .await?
            .filter(|txn: &Transaction| txn.phase == TransactionPhase::Linked)
            .ok_or_else(|| {
                AppError::invalid_transaction().with_transaction_id(linked_transaction_id)
            })
    }

    /// Send an OTP for a linked transaction; `transaction_id` carries the linked id
    ///
    /// # Errors
    ///
    /// Returns `invalid_transaction`, `individual_id_blocked` or `send_otp_failed`
    pub async fn linked_send_otp(&self, request: OtpRequest) -> AppResult<OtpResponse> {
        let transaction = self.linked_session(&request.transaction_id).await?;
        self.deliver_otp(
            &transaction,
            &request.transaction_id,
            &request.individual_id,
            request.otp_channels,
        )
        .await
    }

    /// Authenticate on the secondary device
    ///
    /// When a stored consent already covers the request the transaction goes straight to
    /// consented and the primary device's auth code poll is woken.
    ///
    /// # Errors
    ///
    /// Returns `invalid_transaction` when the linked transaction is missing or already
    /// authenticated, or the authenticator's error
    pub async fn linked_authenticate(
        &self,
        request: LinkedAuthRequest,
    ) -> AppResult<LinkedAuthResponse> {
        let linked_id = request.linked_transaction_id;
        let mut transaction = self.linked_session(&linked_id).await?;
        self.verify_and_record(
            &mut transaction,
            &request.individual_id,
            request.challenge_list,
        )
        .await?;

        let consent_action = transaction
            .consent_action
            .unwrap_or(ConsentAction::Capture);
        let target = if consent_action == ConsentAction::NoCapture {
            transaction.phase = TransactionPhase::Consented;
            Namespace::Consented
        } else {
            Namespace::LinkedAuth
        };
        if !self.store.claim_once(target, &linked_id, &transaction).await? {
            return Err(AppError::invalid_transaction().with_transaction_id(&linked_id));
        }
        self.store
            .delete(Namespace::LinkedSession, &linked_id)
            .await?;

        AppLogger::log_transaction_event(
            &transaction.transaction_id,
            &transaction.client_id,
            "LINKED_AUTHENTICATED",
        );
        if target == Namespace::Consented {
            self.polls.notify(&linked_poll_key(&linked_id));
        }
        Ok(LinkedAuthResponse {
            linked_transaction_id: linked_id,
            consent_action,
        })
    }

    /// Record consent on the secondary device and wake the primary device
    ///
    /// # Errors
    ///
    /// Returns `invalid_transaction` when the linked transaction is not awaiting consent,
    /// or a consent validation error
    pub async fn linked_consent(
        &self,
        request: LinkedConsentRequest,
    ) -> AppResult<LinkedConsentResponse> {
        let linked_id = request.linked_transaction_id;
        let mut transaction: Transaction = self
            .store
            .get(Namespace::LinkedAuth, &linked_id)
            .await?
            .filter(|txn: &Transaction| {
                txn.phase == TransactionPhase::Authenticated
                    && txn.consent_action != Some(ConsentAction::NoCapture)
            })
            .ok_or_else(|| AppError::invalid_transaction().with_transaction_id(&linked_id))?;

        self.apply_consent(
            &mut transaction,
            request.accepted_claims,
            request.permitted_authorize_scopes,
        )
        .await?;

        if !self
            .store
            .claim_once(Namespace::Consented, &linked_id, &transaction)
            .await?
        {
            return Err(AppError::invalid_transaction().with_transaction_id(&linked_id));
        }
        self.store.delete(Namespace::LinkedAuth, &linked_id).await?;

        AppLogger::log_transaction_event(
            &transaction.transaction_id,
            &transaction.client_id,
            "LINKED_CONSENTED",
        );
        self.polls.notify(&linked_poll_key(&linked_id));
        Ok(LinkedConsentResponse {
            linked_transaction_id: linked_id,
        })
    }

    /// Long poll until the secondary device links with `link_code`
    ///
    /// # Errors
    ///
    /// Returns `invalid_link_code` when the code does not belong to the transaction or is
    /// no longer live, or `response_timeout`
    pub async fn link_status(&self, request: LinkStatusRequest) -> AppResult<LinkStatusResponse> {
        let link_code_hash = sha256_base64url(&request.link_code);
        let transaction_id = request.transaction_id.as_str();
        let code_hash = link_code_hash.as_str();

        self.polls
            .wait_for(
                &link_poll_key(code_hash),
                self.config.link_status_timeout,
                self.config.link_poll_interval,
                move || self.check_link_status(transaction_id, code_hash),
            )
            .await
    }

    async fn check_link_status(
        &self,
        transaction_id: &str,
        link_code_hash: &str,
    ) -> AppResult<Option<LinkStatusResponse>> {
        if let Some(response) = self.linked_status(transaction_id, link_code_hash).await? {
            return Ok(Some(response));
        }

        let generated: Option<LinkTransactionMetadata> = self
            .store
            .get(Namespace::LinkCodeGenerated, link_code_hash)
            .await?;
        match generated {
            Some(metadata) if metadata.transaction_id == transaction_id => Ok(None),
            Some(_) => Err(invalid_link_code()),
            // Linking deletes the generated entry after writing the linked one
            None => self
                .linked_status(transaction_id, link_code_hash)
                .await?
                .map(Some)
                .ok_or_else(invalid_link_code),
        }
    }

    async fn linked_status(
        &self,
        transaction_id: &str,
        link_code_hash: &str,
    ) -> AppResult<Option<LinkStatusResponse>> {
        let linked: Option<LinkTransactionMetadata> = self
            .store
            .get(Namespace::LinkedCode, link_code_hash)
            .await?;
        let Some(metadata) = linked else {
            return Ok(None);
        };
        match metadata.linked_transaction_id {
            Some(linked_transaction_id) if metadata.transaction_id == transaction_id => {
                Ok(Some(LinkStatusResponse {
                    transaction_id: transaction_id.to_owned(),
                    link_status: LINK_STATUS_LINKED.to_owned(),
                    linked_transaction_id,
                }))
            }
            _ => Err(invalid_link_code()),
        }
    }

    /// Long poll until the secondary device completes consent, then return the code
    ///
    /// The code is produced once per linked transaction; later polls get the cached result
    /// while it lives.
    ///
    /// # Errors
    ///
    /// Returns `invalid_link_code` when the code never linked this transaction, or
    /// `response_timeout`
    pub async fn link_auth_code(&self, request: LinkStatusRequest) -> AppResult<AuthCodeResponse> {
        let link_code_hash = sha256_base64url(&request.link_code);
        let linked_id = self
            .linked_status(&request.transaction_id, &link_code_hash)
            .await?
            .ok_or_else(invalid_link_code)?
            .linked_transaction_id;
        let linked = linked_id.as_str();

        self.polls
            .wait_for(
                &linked_poll_key(linked),
                self.config.link_status_timeout,
                self.config.link_poll_interval,
                move || self.check_link_auth_code(linked),
            )
            .await
    }

    async fn check_link_auth_code(&self, linked_id: &str) -> AppResult<Option<AuthCodeResponse>> {
        let cached: Option<AuthCodeResponse> = self
            .store
            .get(Namespace::LinkAuthCodeResult, linked_id)
            .await?;
        if cached.is_some() {
            return Ok(cached);
        }

        let _guard = self.store.lock(Namespace::Consented, linked_id).await;
        let consented: Option<Transaction> =
            self.store.get(Namespace::Consented, linked_id).await?;
        let Some(mut transaction) = consented else {
            return Ok(None);
        };

        let response = self.issue_code(&mut transaction).await?;
        if !self
            .store
            .claim_once(Namespace::LinkAuthCodeResult, linked_id, &response)
            .await?
        {
            // Another process produced the code first; withdraw ours
            if let Some(code_hash) = &transaction.code_hash {
                self.store.delete(Namespace::AuthCode, code_hash).await?;
            }
            return self
                .store
                .get(Namespace::LinkAuthCodeResult, linked_id)
                .await;
        }
        self.store.delete(Namespace::Consented, linked_id).await?;
        self.polls.notify(&linked_poll_key(linked_id));
        Ok(Some(response))
    }
}

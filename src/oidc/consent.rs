// ABOUTME: Consent evaluation against stored user decisions and persistence of new decisions
// ABOUTME: Decides CAPTURE or NOCAPTURE from a canonical hash of the requested claims and scopes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::models::{ConsentAction, Transaction};
use crate::errors::{AppError, AppResult};
use crate::providers::spi::{ConsentRecord, ConsentStore};
use crate::utils::crypto::canonical_json_hash;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::collections::BTreeSet;

fn sorted(values: &[String]) -> BTreeSet<&str> {
    values.iter().map(String::as_str).collect()
}

fn nothing_requested(transaction: &Transaction) -> bool {
    transaction.essential_claims.is_empty()
        && transaction.voluntary_claims.is_empty()
        && transaction.requested_authorize_scopes.is_empty()
}

/// Canonical hash of what the transaction asks the user to consent to
///
/// # Errors
///
/// Returns an error if serialization fails
pub fn consent_hash(transaction: &Transaction) -> AppResult<String> {
    canonical_json_hash(&json!({
        "essentialClaims": sorted(&transaction.essential_claims),
        "voluntaryClaims": sorted(&transaction.voluntary_claims),
        "authorizeScopes": sorted(&transaction.requested_authorize_scopes),
    }))
}

fn psu_token(transaction: &Transaction) -> AppResult<&str> {
    transaction
        .partner_specific_user_token
        .as_deref()
        .ok_or_else(AppError::invalid_transaction)
}

/// Stored decision that still covers this transaction's request
async fn matching_record(
    store: &dyn ConsentStore,
    transaction: &Transaction,
    now: DateTime<Utc>,
) -> AppResult<Option<ConsentRecord>> {
    let Some(record) = store
        .get(&transaction.client_id, psu_token(transaction)?)
        .await?
    else {
        return Ok(None);
    };
    if record.is_valid_at(now) && record.hash == consent_hash(transaction)? {
        Ok(Some(record))
    } else {
        Ok(None)
    }
}

/// Set `consent_action` after authentication, pre-filling a matching stored decision
///
/// # Errors
///
/// Returns an error if the consent store fails
pub async fn evaluate(
    store: &dyn ConsentStore,
    transaction: &mut Transaction,
    now: DateTime<Utc>,
) -> AppResult<()> {
    if nothing_requested(transaction) {
        transaction.consent_action = Some(ConsentAction::NoCapture);
        transaction.accepted_claims = Vec::new();
        transaction.permitted_scopes = Vec::new();
        return Ok(());
    }

    match matching_record(store, transaction, now).await? {
        Some(record) => {
            transaction.consent_action = Some(ConsentAction::NoCapture);
            transaction.accepted_claims = record.accepted_claims;
            transaction.permitted_scopes = record.permitted_scopes;
        }
        None => transaction.consent_action = Some(ConsentAction::Capture),
    }
    Ok(())
}

/// Decide the action for an explicit consent submission
///
/// NOCAPTURE only when a stored, unexpired decision holds exactly the submitted selection.
///
/// # Errors
///
/// Returns an error if the consent store fails
pub async fn evaluate_submission(
    store: &dyn ConsentStore,
    transaction: &Transaction,
    accepted_claims: &[String],
    permitted_scopes: &[String],
    now: DateTime<Utc>,
) -> AppResult<ConsentAction> {
    if nothing_requested(transaction) {
        return Ok(ConsentAction::NoCapture);
    }
    let unchanged = matching_record(store, transaction, now)
        .await?
        .is_some_and(|record| {
            sorted(&record.accepted_claims) == sorted(accepted_claims)
                && sorted(&record.permitted_scopes) == sorted(permitted_scopes)
        });
    Ok(if unchanged {
        ConsentAction::NoCapture
    } else {
        ConsentAction::Capture
    })
}

/// Persist the decision once a code is issued
///
/// CAPTURE stores the selection; NOCAPTURE with nothing requested clears any stale record.
///
/// # Errors
///
/// Returns an error if the consent store fails
pub async fn record(
    store: &dyn ConsentStore,
    transaction: &Transaction,
    now: DateTime<Utc>,
) -> AppResult<()> {
    match transaction.consent_action {
        Some(ConsentAction::Capture) => {
            let expires_at = transaction
                .consent_expire_minutes
                .filter(|minutes| *minutes > 0)
                .map(|minutes| now + Duration::minutes(minutes));
            store
                .put(ConsentRecord {
                    client_id: transaction.client_id.clone(),
                    psu_token: psu_token(transaction)?.to_owned(),
                    hash: consent_hash(transaction)?,
                    accepted_claims: transaction.accepted_claims.clone(),
                    permitted_scopes: transaction.permitted_scopes.clone(),
                    created_at: now,
                    expires_at,
                })
                .await
        }
        Some(ConsentAction::NoCapture) if nothing_requested(transaction) => {
            store
                .delete(&transaction.client_id, psu_token(transaction)?)
                .await
        }
        _ => Ok(()),
    }
}

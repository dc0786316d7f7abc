// ABOUTME: Claim and scope resolution for details requests and consent validation
// ABOUTME: Maps scopes to claims, applies the claims parameter and checks accepted subsets
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::models::{ClaimDetail, ClaimsRequest, Transaction};
use crate::constants::oidc::SCOPE_OPENID;
use crate::errors::{AppError, AppResult, ErrorCode};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Requested userinfo claims after resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedClaims {
    /// Claim name to its request detail
    pub userinfo: BTreeMap<String, Option<ClaimDetail>>,
    /// Essential claims, in the client's registration order
    pub essential: Vec<String>,
    /// Voluntary claims, in the client's registration order
    pub voluntary: Vec<String>,
}

/// Split a space-separated parameter, dropping empty items
#[must_use]
pub fn split_values(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_owned)
        .collect()
}

/// Resolve requested claims against the client's registered claims
///
/// Only registered claims are considered. An explicit `claims.userinfo` entry wins over a
/// claim derived from a scope.
///
/// # Errors
///
/// Returns `invalid_scope` when a `claims` parameter is sent without the `openid` scope
pub fn resolve_requested_claims(
    scopes: &[String],
    claims: Option<&ClaimsRequest>,
    registered: &[String],
    scope_claims: &HashMap<String, Vec<String>>,
) -> AppResult<ResolvedClaims> {
    let requested_userinfo = claims.and_then(|c| c.userinfo.as_ref());
    if requested_userinfo.is_some() && !scopes.iter().any(|s| s == SCOPE_OPENID) {
        return Err(AppError::new(
            ErrorCode::InvalidScope,
            "claims parameter requires the openid scope",
        ));
    }

    let from_scopes: HashSet<&str> = scopes
        .iter()
        .filter_map(|scope| scope_claims.get(scope))
        .flatten()
        .map(String::as_str)
        .collect();

    let mut resolved = ResolvedClaims::default();
    for claim in registered {
        let detail = match requested_userinfo.and_then(|userinfo| userinfo.get(claim)) {
            Some(detail) => detail.clone(),
            None if from_scopes.contains(claim.as_str()) => None,
            None => continue,
        };
        if detail.as_ref().is_some_and(|d| d.essential) {
            resolved.essential.push(claim.clone());
        } else {
            resolved.voluntary.push(claim.clone());
        }
        resolved.userinfo.insert(claim.clone(), detail);
    }
    Ok(resolved)
}

/// Check accepted claims: every essential claim accepted, nothing outside the request
///
/// # Errors
///
/// Returns `invalid_accepted_claim` when either rule is broken
pub fn validate_accepted_claims(transaction: &Transaction, accepted: &[String]) -> AppResult<()> {
    let accepted_set: HashSet<&str> = accepted.iter().map(String::as_str).collect();
    let missing_essential = transaction
        .essential_claims
        .iter()
        .any(|claim| !accepted_set.contains(claim.as_str()));
    let unrequested = accepted.iter().any(|claim| {
        !transaction.essential_claims.contains(claim) && !transaction.voluntary_claims.contains(claim)
    });

    if missing_essential || unrequested {
        return Err(AppError::new(
            ErrorCode::InvalidAcceptedClaim,
            "Accepted claims must include every essential claim and only requested claims",
        )
        .with_transaction_id(&transaction.transaction_id));
    }
    Ok(())
}

/// Check permitted scopes are a subset of the requested authorize scopes
///
/// # Errors
///
/// Returns `invalid_permitted_scope` when a scope was not requested
pub fn validate_permitted_scopes(transaction: &Transaction, permitted: &[String]) -> AppResult<()> {
    if permitted
        .iter()
        .all(|scope| transaction.requested_authorize_scopes.contains(scope))
    {
        return Ok(());
    }
    Err(AppError::new(
        ErrorCode::InvalidPermittedScope,
        "Permitted scopes must be a subset of the requested scopes",
    )
    .with_transaction_id(&transaction.transaction_id))
}

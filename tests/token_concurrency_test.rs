// ABOUTME: Concurrency tests for single-use transitions of the authorization flow
// ABOUTME: Parallel redemption, authentication and code issuance must each succeed exactly once
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use common::{auth_request, authorize, consent_request, details_request, test_context, token_request};
use futures_util::future::join_all;
use oidc_transaction_server::{errors::ErrorCode, oidc::DetailsHeaders};

const PARALLELISM: usize = 16;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_redemption_yields_one_token() {
    let ctx = test_context().await;
    let code = authorize(&ctx.engine, details_request()).await;

    let attempts = (0..PARALLELISM).map(|_| {
        let engine = ctx.engine.clone();
        let request = token_request(&engine, &code.code, None);
        tokio::spawn(async move { engine.redeem_token(request).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| e.code == ErrorCode::InvalidGrant));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_authentication_advances_once() {
    let ctx = test_context().await;
    let details = ctx.engine.oauth_details(details_request()).await.unwrap();
    let txn = details.response.transaction_id.clone();
    let headers = DetailsHeaders {
        transaction_id: txn.clone(),
        details_hash: details.oauth_details_hash,
    };

    let attempts = (0..PARALLELISM).map(|_| {
        let engine = ctx.engine.clone();
        let headers = headers.clone();
        let request = auth_request(&txn);
        tokio::spawn(async move { engine.authenticate(&headers, request).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| e.code == ErrorCode::InvalidTransaction));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_auth_code_requests_issue_one_code() {
    let ctx = test_context().await;
    let details = ctx.engine.oauth_details(details_request()).await.unwrap();
    let txn = details.response.transaction_id.clone();
    let headers = DetailsHeaders {
        transaction_id: txn.clone(),
        details_hash: details.oauth_details_hash,
    };
    ctx.engine
        .authenticate(&headers, auth_request(&txn))
        .await
        .unwrap();

    let attempts = (0..PARALLELISM).map(|_| {
        let engine = ctx.engine.clone();
        let headers = headers.clone();
        let request = consent_request(&txn);
        tokio::spawn(async move { engine.issue_auth_code(&headers, request).await })
    });
    let codes: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .filter_map(Result::ok)
        .collect();

    assert_eq!(codes.len(), 1);
    ctx.engine
        .redeem_token(token_request(&ctx.engine, &codes[0].code, None))
        .await
        .unwrap();
}

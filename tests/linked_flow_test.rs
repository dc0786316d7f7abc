// ABOUTME: Integration tests for the linked (cross-device) authorization flow
// ABOUTME: Link code rotation and limits, link races, long poll wake-ups, timeouts and cached results
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use async_trait::async_trait;
use common::{
    auth_request, authorize, consent_request, details_request, pin_challenge, test_context,
    test_context_with_authenticator, token_request, TestContext, INDIVIDUAL_ID,
};
use futures_util::future::join_all;
use oidc_transaction_server::{
    cache::Namespace,
    errors::{AppResult, ErrorCode},
    oidc::{
        models::{
            AuthCodeResponse, LinkStatusRequest, LinkTransactionRequest, LinkedAuthRequest,
            LinkedConsentRequest, OtpRequest,
        },
        ConsentAction, DetailsHeaders,
    },
    providers::{
        spi::{
            Authenticator, KycAuthRequest, KycAuthResult, KycExchangeRequest, SendOtpRequest,
            SendOtpResult,
        },
        MockAuthenticator,
    },
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Authenticator that answers verification only after a delay
struct SlowAuthenticator {
    inner: MockAuthenticator,
    delay: Duration,
}

#[async_trait]
impl Authenticator for SlowAuthenticator {
    async fn verify(&self, request: &KycAuthRequest) -> AppResult<KycAuthResult> {
        tokio::time::sleep(self.delay).await;
        self.inner.verify(request).await
    }

    async fn send_otp(&self, request: &SendOtpRequest) -> AppResult<SendOtpResult> {
        self.inner.send_otp(request).await
    }

    async fn kyc_exchange(&self, request: &KycExchangeRequest) -> AppResult<String> {
        self.inner.kyc_exchange(request).await
    }
}

struct Started {
    transaction_id: String,
    details_hash: String,
    link_code: String,
}

async fn start(ctx: &TestContext) -> Started {
    let details = ctx.engine.oauth_details(details_request()).await.unwrap();
    let transaction_id = details.response.transaction_id;
    let link = ctx
        .engine
        .generate_link_code(&transaction_id)
        .await
        .unwrap();
    assert_eq!(link.transaction_id, transaction_id);
    Started {
        transaction_id,
        details_hash: details.oauth_details_hash,
        link_code: link.link_code,
    }
}

fn status_request(started: &Started) -> LinkStatusRequest {
    LinkStatusRequest {
        transaction_id: started.transaction_id.clone(),
        link_code: started.link_code.clone(),
    }
}

fn link_request(link_code: &str) -> LinkTransactionRequest {
    LinkTransactionRequest {
        link_code: link_code.to_owned(),
    }
}

fn linked_auth(linked_id: &str) -> LinkedAuthRequest {
    LinkedAuthRequest {
        linked_transaction_id: linked_id.to_owned(),
        individual_id: INDIVIDUAL_ID.to_owned(),
        challenge_list: pin_challenge(),
    }
}

fn linked_consent(linked_id: &str) -> LinkedConsentRequest {
    LinkedConsentRequest {
        linked_transaction_id: linked_id.to_owned(),
        accepted_claims: vec!["name".to_owned(), "email".to_owned()],
        permitted_authorize_scopes: Vec::new(),
    }
}

#[tokio::test]
async fn test_linked_flow_end_to_end() {
    let ctx = test_context().await;
    let engine = &ctx.engine;
    let started = start(&ctx).await;
    assert_eq!(started.link_code.len(), engine.config().link_code_length);

    let linked = engine
        .link_transaction(link_request(&started.link_code))
        .await
        .unwrap();
    assert_eq!(linked.client_name, "Demo Relying Party");
    assert_eq!(
        linked.voluntary_claims,
        vec!["name".to_owned(), "email".to_owned()]
    );
    let linked_id = linked.link_transaction_id;

    let status = engine.link_status(status_request(&started)).await.unwrap();
    assert_eq!(status.link_status, "LINKED");
    assert_eq!(status.linked_transaction_id, linked_id);

    let otp = engine
        .linked_send_otp(OtpRequest {
            transaction_id: linked_id.clone(),
            individual_id: INDIVIDUAL_ID.to_owned(),
            otp_channels: vec!["email".to_owned()],
        })
        .await
        .unwrap();
    assert_eq!(otp.transaction_id, linked_id);
    assert!(otp.masked_email.is_some());

    let auth = engine.linked_authenticate(linked_auth(&linked_id)).await.unwrap();
    assert_eq!(auth.consent_action, ConsentAction::Capture);
    engine.linked_consent(linked_consent(&linked_id)).await.unwrap();

    let code = engine
        .link_auth_code(status_request(&started))
        .await
        .unwrap();
    assert_eq!(code.state.as_deref(), Some("af0ifjsldkj"));

    let tokens = engine
        .redeem_token(token_request(engine, &code.code, None))
        .await
        .unwrap();
    assert!(!tokens.id_token.is_empty());

    let cached: Option<AuthCodeResponse> = engine
        .store()
        .get(Namespace::LinkAuthCodeResult, &linked_id)
        .await
        .unwrap();
    assert!(cached.is_none());
    let err = engine
        .link_auth_code(status_request(&started))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidLinkCode);
}

#[tokio::test]
async fn test_primary_cannot_authenticate_after_linking() {
    let ctx = test_context().await;
    let started = start(&ctx).await;
    ctx.engine
        .link_transaction(link_request(&started.link_code))
        .await
        .unwrap();

    let headers = DetailsHeaders {
        transaction_id: started.transaction_id.clone(),
        details_hash: started.details_hash.clone(),
    };
    let err = ctx
        .engine
        .authenticate(&headers, auth_request(&started.transaction_id))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidTransaction);
}

#[tokio::test]
async fn test_only_newest_link_code_links() {
    let ctx = test_context().await;
    let started = start(&ctx).await;
    let newer = ctx
        .engine
        .generate_link_code(&started.transaction_id)
        .await
        .unwrap();

    let err = ctx
        .engine
        .link_transaction(link_request(&started.link_code))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidLinkCode);

    ctx.engine
        .link_transaction(link_request(&newer.link_code))
        .await
        .unwrap();
    let err = ctx
        .engine
        .link_transaction(link_request(&newer.link_code))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidLinkCode);
}

#[tokio::test]
async fn test_link_code_limit() {
    let ctx = test_context().await;
    let started = start(&ctx).await;
    let limit = ctx.engine.config().link_code_limit;

    for _ in 1..limit {
        ctx.engine
            .generate_link_code(&started.transaction_id)
            .await
            .unwrap();
    }
    let err = ctx
        .engine
        .generate_link_code(&started.transaction_id)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::LinkCodeLimitReached);
}

#[tokio::test]
async fn test_unknown_link_code_is_rejected() {
    let ctx = test_context().await;
    let err = ctx
        .engine
        .link_transaction(link_request("NOSUCHCODE00000"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidLinkCode);

    let err = ctx
        .engine
        .generate_link_code("missing-transaction")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidTransaction);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_link_has_single_winner() {
    let ctx = test_context().await;
    let started = start(&ctx).await;

    let attempts = (0..8).map(|_| {
        let engine = ctx.engine.clone();
        let request = link_request(&started.link_code);
        tokio::spawn(async move { engine.link_transaction(request).await })
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
        .all(|e| e.code == ErrorCode::InvalidLinkCode));
}

#[tokio::test]
async fn test_link_status_wakes_when_secondary_links() {
    let ctx = test_context().await;
    let started = start(&ctx).await;

    let waiter = {
        let engine = ctx.engine.clone();
        let request = status_request(&started);
        tokio::spawn(async move { engine.link_status(request).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    let linked = ctx
        .engine
        .link_transaction(link_request(&started.link_code))
        .await
        .unwrap();

    let status = waiter.await.unwrap().unwrap();
    assert_eq!(status.linked_transaction_id, linked.link_transaction_id);
}

#[tokio::test]
async fn test_link_status_times_out_within_window() {
    let ctx = test_context().await;
    let started = start(&ctx).await;
    let timeout = ctx.engine.config().link_status_timeout;

    let begin = Instant::now();
    let err = ctx
        .engine
        .link_status(status_request(&started))
        .await
        .unwrap_err();
    let elapsed = begin.elapsed();

    assert_eq!(err.code, ErrorCode::ResponseTimeout);
    assert!(elapsed >= timeout - Duration::from_millis(50), "{elapsed:?}");
    assert!(elapsed < timeout * 3, "{elapsed:?}");
    assert_eq!(ctx.engine.polls().waiting_keys(), 0);
}

#[tokio::test]
async fn test_link_status_rejects_foreign_transaction() {
    let ctx = test_context().await;
    let started = start(&ctx).await;
    let err = ctx
        .engine
        .link_status(LinkStatusRequest {
            transaction_id: "someone-else".to_owned(),
            link_code: started.link_code.clone(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidLinkCode);
}

#[tokio::test]
async fn test_link_auth_code_before_linking_is_rejected() {
    let ctx = test_context().await;
    let started = start(&ctx).await;
    let err = ctx
        .engine
        .link_auth_code(status_request(&started))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidLinkCode);
}

#[tokio::test]
async fn test_link_auth_code_wakes_on_late_consent() {
    let ctx = test_context().await;
    let engine = &ctx.engine;
    let started = start(&ctx).await;
    let linked_id = engine
        .link_transaction(link_request(&started.link_code))
        .await
        .unwrap()
        .link_transaction_id;
    engine.linked_authenticate(linked_auth(&linked_id)).await.unwrap();

    let waiter = {
        let engine = engine.clone();
        let request = status_request(&started);
        tokio::spawn(async move { engine.link_auth_code(request).await })
    };
    tokio::time::sleep(Duration::from_millis(150)).await;
    engine.linked_consent(linked_consent(&linked_id)).await.unwrap();

    let code = waiter.await.unwrap().unwrap();
    assert_eq!(code.nonce.as_deref(), Some("n-0S6_WzA2Mj"));
}

#[tokio::test]
async fn test_link_auth_code_times_out_without_consent() {
    let ctx = test_context().await;
    let started = start(&ctx).await;
    ctx.engine
        .link_transaction(link_request(&started.link_code))
        .await
        .unwrap();

    let err = ctx
        .engine
        .link_auth_code(status_request(&started))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ResponseTimeout);
}

#[tokio::test]
async fn test_link_auth_code_repoll_returns_cached_code() {
    let ctx = test_context().await;
    let engine = &ctx.engine;
    let started = start(&ctx).await;
    let linked_id = engine
        .link_transaction(link_request(&started.link_code))
        .await
        .unwrap()
        .link_transaction_id;
    engine.linked_authenticate(linked_auth(&linked_id)).await.unwrap();
    engine.linked_consent(linked_consent(&linked_id)).await.unwrap();

    let first = engine
        .link_auth_code(status_request(&started))
        .await
        .unwrap();
    let second = engine
        .link_auth_code(status_request(&started))
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_auth_code_polls_share_one_code() {
    let ctx = test_context().await;
    let engine = &ctx.engine;
    let started = start(&ctx).await;
    let linked_id = engine
        .link_transaction(link_request(&started.link_code))
        .await
        .unwrap()
        .link_transaction_id;
    engine.linked_authenticate(linked_auth(&linked_id)).await.unwrap();

    let pollers: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            let request = status_request(&started);
            tokio::spawn(async move { engine.link_auth_code(request).await })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(100)).await;
    engine.linked_consent(linked_consent(&linked_id)).await.unwrap();

    let codes: Vec<String> = join_all(pollers)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap().code)
        .collect();
    assert!(codes.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test]
async fn test_linked_consent_twice_fails() {
    let ctx = test_context().await;
    let engine = &ctx.engine;
    let started = start(&ctx).await;
    let linked_id = engine
        .link_transaction(link_request(&started.link_code))
        .await
        .unwrap()
        .link_transaction_id;
    engine.linked_authenticate(linked_auth(&linked_id)).await.unwrap();
    engine.linked_consent(linked_consent(&linked_id)).await.unwrap();

    let err = engine
        .linked_consent(linked_consent(&linked_id))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidTransaction);
}

#[tokio::test]
async fn test_linked_stored_consent_skips_consent_step() {
    let ctx = test_context().await;
    let engine = &ctx.engine;
    authorize(engine, details_request()).await;

    let started = start(&ctx).await;
    let linked_id = engine
        .link_transaction(link_request(&started.link_code))
        .await
        .unwrap()
        .link_transaction_id;
    let auth = engine.linked_authenticate(linked_auth(&linked_id)).await.unwrap();
    assert_eq!(auth.consent_action, ConsentAction::NoCapture);

    let err = engine
        .linked_consent(linked_consent(&linked_id))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidTransaction);

    let code = engine
        .link_auth_code(status_request(&started))
        .await
        .unwrap();
    engine
        .redeem_token(token_request(engine, &code.code, None))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_link_code_is_dead_after_primary_authenticates() {
    let ctx = test_context().await;
    let started = start(&ctx).await;
    let headers = DetailsHeaders {
        transaction_id: started.transaction_id.clone(),
        details_hash: started.details_hash.clone(),
    };
    ctx.engine
        .authenticate(&headers, auth_request(&started.transaction_id))
        .await
        .unwrap();

    let err = ctx
        .engine
        .link_transaction(link_request(&started.link_code))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidLinkCode);
    let err = ctx
        .engine
        .generate_link_code(&started.transaction_id)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidTransaction);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_link_during_slow_authentication_has_single_winner() {
    let ctx = test_context_with_authenticator(|mock| {
        Arc::new(SlowAuthenticator {
            inner: mock,
            delay: Duration::from_millis(300),
        }) as Arc<dyn Authenticator>
    })
    .await;
    let started = start(&ctx).await;
    let headers = DetailsHeaders {
        transaction_id: started.transaction_id.clone(),
        details_hash: started.details_hash.clone(),
    };

    let primary = {
        let engine = ctx.engine.clone();
        let headers = headers.clone();
        let request = auth_request(&started.transaction_id);
        tokio::spawn(async move { engine.authenticate(&headers, request).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let linked = ctx
        .engine
        .link_transaction(link_request(&started.link_code))
        .await;
    let authenticated = primary.await.unwrap();

    assert_eq!(
        u8::from(linked.is_ok()) + u8::from(authenticated.is_ok()),
        1,
        "exactly one of linking and authentication may advance the transaction"
    );
    let linked_id = linked.unwrap().link_transaction_id;
    assert_eq!(
        authenticated.unwrap_err().code,
        ErrorCode::InvalidTransaction
    );

    assert!(ctx
        .engine
        .issue_auth_code(&headers, consent_request(&started.transaction_id))
        .await
        .is_err());
    ctx.engine
        .linked_authenticate(linked_auth(&linked_id))
        .await
        .unwrap();
    ctx.engine
        .linked_consent(linked_consent(&linked_id))
        .await
        .unwrap();
    let code = ctx
        .engine
        .link_auth_code(status_request(&started))
        .await
        .unwrap();
    ctx.engine
        .redeem_token(token_request(&ctx.engine, &code.code, None))
        .await
        .unwrap();
}

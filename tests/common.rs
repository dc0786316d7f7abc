// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Builds an in-memory engine with a seeded client and identity, plus request builders
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::unwrap_used,
    clippy::expect_used
)]
//! Shared test utilities for `oidc_transaction_server`

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use oidc_transaction_server::{
    cache::{Cache, CacheConfig, CacheTtlConfig, TransactionStore},
    config::{
        acr::AcrMappingConfig,
        environment::{OidcConfig, ServerConfig},
    },
    constants::oidc::{JWT_BEARER_ASSERTION_TYPE, SIGNING_KEY_ID},
    oidc::{
        models::{AuthCodeResponse, AuthRequest, ConsentRequest, OAuthDetailRequest, TokenRequest},
        AcrResolver, AuthorizationServer, DetailsHeaders,
    },
    providers::{
        spi::{AuthChallenge, Authenticator, ClientDetail, ClientStatus},
        InMemoryClientRegistry, InMemoryConsentStore, MockAuthenticator, MockIdentity,
        RsaJwtSigner,
    },
    resources::ServerResources,
};
use serde_json::{json, Map};
use std::sync::{Arc, Once, OnceLock};
use std::time::Duration;
use uuid::Uuid;

pub const CLIENT_ID: &str = "C1";
pub const REDIRECT_URI: &str = "https://app.example.com/callback";
pub const INDIVIDUAL_ID: &str = "8267411571";
pub const PIN: &str = "111111";
pub const OTP: &str = "123456";
pub const ACR_STATIC_CODE: &str = "idp:acr:static-code";
pub const ACR_GENERATED_CODE: &str = "idp:acr:generated-code";
/// RFC 7636 appendix B verifier and its S256 challenge
pub const PKCE_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
pub const PKCE_CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGjSstw-cM";

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };
        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// RSA key shared by the test client and the server signer; generated once per test binary
pub fn test_key() -> &'static RsaJwtSigner {
    static KEY: OnceLock<RsaJwtSigner> = OnceLock::new();
    KEY.get_or_init(|| RsaJwtSigner::generate("test-client", 2048).expect("RSA key generation"))
}

/// Engine settings tuned for fast long polls
pub fn test_oidc_config() -> OidcConfig {
    OidcConfig {
        link_status_timeout: Duration::from_millis(600),
        link_poll_interval: Duration::from_millis(50),
        link_code_limit: 3,
        ..OidcConfig::default()
    }
}

pub fn test_client() -> ClientDetail {
    ClientDetail {
        id: CLIENT_ID.to_owned(),
        name: "Demo Relying Party".to_owned(),
        logo_uri: Some("https://app.example.com/logo.png".to_owned()),
        relying_party_id: "rp-demo".to_owned(),
        redirect_uris: vec![REDIRECT_URI.to_owned(), "https://app.example.com/flow/*".to_owned()],
        claims: vec![
            "name".to_owned(),
            "email".to_owned(),
            "phone_number".to_owned(),
        ],
        acr_values: vec![ACR_STATIC_CODE.to_owned(), ACR_GENERATED_CODE.to_owned()],
        public_key: test_key().public_key_pem().unwrap(),
        status: ClientStatus::Active,
        consent_expire_minutes: None,
    }
}

pub fn test_identity() -> MockIdentity {
    let mut claims = Map::new();
    claims.insert("name".to_owned(), json!("Asha Rao"));
    claims.insert("email".to_owned(), json!("asha@example.com"));
    claims.insert("phone_number".to_owned(), json!("+910000000000"));
    MockIdentity {
        individual_id: INDIVIDUAL_ID.to_owned(),
        pin: Some(PIN.to_owned()),
        otp: Some(OTP.to_owned()),
        email: Some("asha@example.com".to_owned()),
        phone: Some("+910000000000".to_owned()),
        claims,
    }
}

/// In-memory transaction store without background cleanup
pub async fn memory_store() -> TransactionStore {
    let config = CacheConfig {
        enable_background_cleanup: false,
        ..CacheConfig::default()
    };
    TransactionStore::new(
        Cache::new(config).await.unwrap(),
        CacheTtlConfig::default(),
    )
}

/// Engine plus the collaborators tests poke at directly
pub struct TestContext {
    pub engine: Arc<AuthorizationServer>,
    pub clients: Arc<InMemoryClientRegistry>,
    pub resources: Arc<ServerResources>,
}

pub async fn test_context() -> TestContext {
    test_context_with(test_oidc_config()).await
}

pub async fn test_context_with(oidc: OidcConfig) -> TestContext {
    build_context(oidc, |mock| Arc::new(mock) as Arc<dyn Authenticator>).await
}

/// Context whose authenticator wraps the seeded mock
pub async fn test_context_with_authenticator<F>(wrap: F) -> TestContext
where
    F: FnOnce(MockAuthenticator) -> Arc<dyn Authenticator>,
{
    build_context(test_oidc_config(), wrap).await
}

async fn build_context<F>(oidc: OidcConfig, wrap: F) -> TestContext
where
    F: FnOnce(MockAuthenticator) -> Arc<dyn Authenticator>,
{
    init_test_logging();
    let clients = Arc::new(InMemoryClientRegistry::new());
    clients.register(test_client());
    let authenticator = MockAuthenticator::new().unwrap();
    authenticator.register(test_identity());

    let signer = RsaJwtSigner::from_pem(SIGNING_KEY_ID, test_key().private_key_pem()).unwrap();
    let jwks = vec![signer.to_jwk()];
    let engine = AuthorizationServer::new(
        memory_store().await,
        clients.clone(),
        wrap(authenticator),
        Arc::new(signer),
        Arc::new(InMemoryConsentStore::new()),
        AcrResolver::new(AcrMappingConfig::load(None).unwrap()),
        oidc.clone(),
    );
    let config = ServerConfig {
        http_port: 0,
        seed_file: None,
        signing_key_path: None,
        amr_acr_mapping_file: None,
        oidc,
        cache: CacheConfig::default(),
    };
    let resources = Arc::new(ServerResources::new(engine, jwks, config));
    TestContext {
        engine: resources.engine.clone(),
        clients,
        resources,
    }
}

pub fn details_request() -> OAuthDetailRequest {
    OAuthDetailRequest {
        client_id: CLIENT_ID.to_owned(),
        scope: "openid profile email".to_owned(),
        response_type: "code".to_owned(),
        redirect_uri: REDIRECT_URI.to_owned(),
        acr_values: Some(ACR_STATIC_CODE.to_owned()),
        nonce: Some("n-0S6_WzA2Mj".to_owned()),
        state: Some("af0ifjsldkj".to_owned()),
        ..OAuthDetailRequest::default()
    }
}

pub fn pkce_details_request() -> OAuthDetailRequest {
    OAuthDetailRequest {
        code_challenge: Some(PKCE_CHALLENGE.to_owned()),
        code_challenge_method: Some("S256".to_owned()),
        ..details_request()
    }
}

pub fn pin_challenge() -> Vec<AuthChallenge> {
    vec![AuthChallenge {
        auth_factor_type: "PIN".to_owned(),
        challenge: PIN.to_owned(),
        format: "number".to_owned(),
    }]
}

pub fn auth_request(transaction_id: &str) -> AuthRequest {
    AuthRequest {
        transaction_id: transaction_id.to_owned(),
        individual_id: INDIVIDUAL_ID.to_owned(),
        challenge_list: pin_challenge(),
    }
}

pub fn consent_request(transaction_id: &str) -> ConsentRequest {
    ConsentRequest {
        transaction_id: transaction_id.to_owned(),
        accepted_claims: Some(vec!["name".to_owned(), "email".to_owned()]),
        permitted_authorize_scopes: Some(Vec::new()),
    }
}

/// Client assertion signed with the test key for `audience`
pub fn client_assertion_for(audience: &str, jti: &str) -> String {
    let now = Utc::now().timestamp();
    let claims = json!({
        "iss": CLIENT_ID,
        "sub": CLIENT_ID,
        "aud": audience,
        "iat": now,
        "exp": now + 60,
        "jti": jti,
    });
    let key = EncodingKey::from_rsa_pem(test_key().private_key_pem().as_bytes()).unwrap();
    encode(&Header::new(Algorithm::RS256), &claims, &key).unwrap()
}

pub fn client_assertion(engine: &AuthorizationServer) -> String {
    client_assertion_for(
        &engine.config().token_endpoint,
        &Uuid::new_v4().to_string(),
    )
}

pub fn token_request(
    engine: &AuthorizationServer,
    code: &str,
    code_verifier: Option<&str>,
) -> TokenRequest {
    TokenRequest {
        grant_type: "authorization_code".to_owned(),
        code: code.to_owned(),
        client_id: CLIENT_ID.to_owned(),
        redirect_uri: REDIRECT_URI.to_owned(),
        client_assertion_type: JWT_BEARER_ASSERTION_TYPE.to_owned(),
        client_assertion: client_assertion(engine),
        code_verifier: code_verifier.map(str::to_owned),
    }
}

/// Run details, authenticate, consent and auth-code for `request`
pub async fn authorize(
    engine: &AuthorizationServer,
    request: OAuthDetailRequest,
) -> AuthCodeResponse {
    let details = engine.oauth_details(request).await.unwrap();
    let transaction_id = details.response.transaction_id.clone();
    let headers = DetailsHeaders {
        transaction_id: transaction_id.clone(),
        details_hash: details.oauth_details_hash,
    };
    engine
        .authenticate(&headers, auth_request(&transaction_id))
        .await
        .unwrap();
    engine
        .consent(&headers, consent_request(&transaction_id))
        .await
        .unwrap();
    engine
        .issue_auth_code(
            &headers,
            ConsentRequest {
                transaction_id,
                ..ConsentRequest::default()
            },
        )
        .await
        .unwrap()
}

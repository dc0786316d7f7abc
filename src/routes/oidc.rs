// ABOUTME: OpenID Connect userinfo, JWKS and discovery endpoints
// ABOUTME: Userinfo returns the signed claims document for a bearer access token
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! OIDC routes
//!
//! Relying parties fetch the public keys from `/.well-known/jwks.json` to verify the
//! ID token and the userinfo document.

use crate::constants::oidc::{
    CONTENT_TYPE_JWT, GRANT_TYPE_AUTHORIZATION_CODE, OPENID_SCOPES, PKCE_METHOD_S256,
    RESPONSE_TYPE_CODE, SCOPE_OPENID,
};
use crate::errors::{AppError, ErrorCode, OAuth2Error};
use crate::resources::ServerResources;
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::iter;
use std::sync::Arc;

/// OIDC routes implementation
pub struct OidcRoutes;

impl OidcRoutes {
    /// Create userinfo and discovery routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/oidc/userinfo", get(Self::handle_userinfo))
            .route("/.well-known/jwks.json", get(Self::handle_jwks))
            .route(
                "/.well-known/openid-configuration",
                get(Self::handle_discovery),
            )
            .with_state(resources)
    }

    /// Pull the token out of `Authorization: Bearer <token>`
    fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| {
                value
                    .strip_prefix("Bearer ")
                    .or_else(|| value.strip_prefix("bearer "))
            })
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                AppError::new(ErrorCode::InvalidToken, "Missing bearer access token")
            })
    }

    async fn handle_userinfo(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Result<Response, OAuth2Error> {
        let token = Self::bearer_token(&headers)?;
        let document = resources.engine.userinfo(token).await?;
        Ok((
            [(CONTENT_TYPE, CONTENT_TYPE_JWT), (CACHE_CONTROL, "no-store")],
            document,
        )
            .into_response())
    }

    async fn handle_jwks(State(resources): State<Arc<ServerResources>>) -> Json<Value> {
        Json(json!({ "keys": resources.jwks }))
    }

    async fn handle_discovery(State(resources): State<Arc<ServerResources>>) -> Json<Value> {
        let oidc = resources.engine.config();
        let issuer = oidc.issuer.trim_end_matches('/');
        let scopes: Vec<&str> = iter::once(SCOPE_OPENID)
            .chain(OPENID_SCOPES.iter().copied())
            .chain(oidc.authorize_scopes.iter().map(String::as_str))
            .collect();

        Json(json!({
            "issuer": oidc.issuer,
            "token_endpoint": oidc.token_endpoint,
            "userinfo_endpoint": format!("{issuer}/oidc/userinfo"),
            "jwks_uri": format!("{issuer}/.well-known/jwks.json"),
            "scopes_supported": scopes,
            "response_types_supported": [RESPONSE_TYPE_CODE],
            "grant_types_supported": [GRANT_TYPE_AUTHORIZATION_CODE],
            "subject_types_supported": ["pairwise"],
            "id_token_signing_alg_values_supported": ["RS256"],
            "userinfo_signing_alg_values_supported": ["RS256"],
            "token_endpoint_auth_methods_supported": ["private_key_jwt"],
            "token_endpoint_auth_signing_alg_values_supported": ["RS256"],
            "code_challenge_methods_supported": [PKCE_METHOD_S256],
            "acr_values_supported": resources.engine.acr().supported_acr_values(),
            "claims_parameter_supported": true,
        }))
    }
}

// ABOUTME: Token endpoint route exchanging authorization codes for signed tokens
// ABOUTME: Form-encoded request, RFC 6749 JSON body and error shape, never cached
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::errors::{AppError, OAuth2Error};
use crate::oidc::models::TokenRequest;
use crate::resources::ServerResources;
use axum::extract::rejection::FormRejection;
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, PRAGMA};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Form, Json, Router};
use std::sync::Arc;

/// Token endpoint routes implementation
pub struct TokenRoutes;

impl TokenRoutes {
    /// Create the token endpoint route
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/oauth/token", post(Self::handle_token))
            .with_state(resources)
    }

    async fn handle_token(
        State(resources): State<Arc<ServerResources>>,
        form: Result<Form<TokenRequest>, FormRejection>,
    ) -> Result<Response, OAuth2Error> {
        let Form(request) = form
            .map_err(|e| AppError::invalid_request(format!("Malformed token request: {e}")))?;
        let tokens = resources.engine.redeem_token(request).await?;
        Ok((
            [(CACHE_CONTROL, "no-store"), (PRAGMA, "no-cache")],
            Json(tokens),
        )
            .into_response())
    }
}

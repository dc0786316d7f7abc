// ABOUTME: Route handlers for the single-device authorization flow
// ABOUTME: oauth-details, send-otp, authenticate, consent and auth-code behind the JSON envelope
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Authorization routes
//!
//! Every call after `oauth-details` must carry the `oauth-details-key` and
//! `oauth-details-hash` headers returned by it.

use super::{details_headers, unwrap_request, wrapped, WrappedJson};
use crate::constants::oidc::HEADER_OAUTH_DETAILS_HASH;
use crate::errors::AppError;
use crate::oidc::models::{
    AuthCodeResponse, AuthRequest, AuthResponse, ConsentRequest, ConsentResponse,
    OAuthDetailRequest, OtpRequest, OtpResponse, RequestWrapper,
};
use crate::resources::ServerResources;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use std::sync::Arc;

/// Authorization routes implementation
pub struct AuthorizationRoutes;

impl AuthorizationRoutes {
    /// Create all single-device authorization routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route(
                "/authorization/oauth-details",
                post(Self::handle_oauth_details),
            )
            .route("/authorization/send-otp", post(Self::handle_send_otp))
            .route(
                "/authorization/authenticate",
                post(Self::handle_authenticate),
            )
            .route("/authorization/consent", post(Self::handle_consent))
            .route("/authorization/auth-code", post(Self::handle_auth_code))
            .with_state(resources)
    }

    async fn handle_oauth_details(
        State(resources): State<Arc<ServerResources>>,
        payload: Result<Json<RequestWrapper<OAuthDetailRequest>>, JsonRejection>,
    ) -> Result<Response, AppError> {
        let request = unwrap_request(&resources, payload)?;
        let details = resources.engine.oauth_details(request).await?;

        let hash = HeaderValue::from_str(&details.oauth_details_hash)
            .map_err(|e| AppError::internal(format!("Unrepresentable details hash: {e}")))?;
        let mut response = wrapped(details.response)?.into_response();
        response
            .headers_mut()
            .insert(HEADER_OAUTH_DETAILS_HASH, hash);
        Ok(response)
    }

    async fn handle_send_otp(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        payload: Result<Json<RequestWrapper<OtpRequest>>, JsonRejection>,
    ) -> WrappedJson<OtpResponse> {
        let details = details_headers(&headers)?;
        let request = unwrap_request(&resources, payload)?;
        wrapped(resources.engine.send_otp(&details, request).await?)
    }

    async fn handle_authenticate(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        payload: Result<Json<RequestWrapper<AuthRequest>>, JsonRejection>,
    ) -> WrappedJson<AuthResponse> {
        let details = details_headers(&headers)?;
        let request = unwrap_request(&resources, payload)?;
        wrapped(resources.engine.authenticate(&details, request).await?)
    }

    async fn handle_consent(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        payload: Result<Json<RequestWrapper<ConsentRequest>>, JsonRejection>,
    ) -> WrappedJson<ConsentResponse> {
        let details = details_headers(&headers)?;
        let request = unwrap_request(&resources, payload)?;
        wrapped(resources.engine.consent(&details, request).await?)
    }

    async fn handle_auth_code(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        payload: Result<Json<RequestWrapper<ConsentRequest>>, JsonRejection>,
    ) -> WrappedJson<AuthCodeResponse> {
        let details = details_headers(&headers)?;
        let request = unwrap_request(&resources, payload)?;
        wrapped(resources.engine.issue_auth_code(&details, request).await?)
    }
}

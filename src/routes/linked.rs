// ABOUTME: Route handlers for the linked (cross-device) authorization flow
// ABOUTME: Link code issuance, linking, the two long polls and the secondary device's auth steps
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Linked authorization routes
//!
//! `link-status` and `link-auth-code` hold the request open until the other device
//! makes progress or the configured timeout passes.

use super::{unwrap_request, wrapped, WrappedJson};
use crate::oidc::models::{
    AuthCodeResponse, LinkCodeRequest, LinkCodeResponse, LinkStatusRequest, LinkStatusResponse,
    LinkTransactionRequest, LinkTransactionResponse, LinkedAuthRequest, LinkedAuthResponse,
    LinkedConsentRequest, LinkedConsentResponse, OtpRequest, OtpResponse, RequestWrapper,
};
use crate::resources::ServerResources;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use std::sync::Arc;

/// Linked authorization routes implementation
pub struct LinkedAuthorizationRoutes;

impl LinkedAuthorizationRoutes {
    /// Create all linked authorization routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route(
                "/linked-authorization/link-code",
                post(Self::handle_link_code),
            )
            .route(
                "/linked-authorization/link-transaction",
                post(Self::handle_link_transaction),
            )
            .route(
                "/linked-authorization/link-status",
                post(Self::handle_link_status),
            )
            .route(
                "/linked-authorization/send-otp",
                post(Self::handle_send_otp),
            )
            .route(
                "/linked-authorization/authenticate",
                post(Self::handle_authenticate),
            )
            .route(
                "/linked-authorization/consent",
                post(Self::handle_consent),
            )
            .route(
                "/linked-authorization/link-auth-code",
                post(Self::handle_link_auth_code),
            )
            .with_state(resources)
    }

    async fn handle_link_code(
        State(resources): State<Arc<ServerResources>>,
        payload: Result<Json<RequestWrapper<LinkCodeRequest>>, JsonRejection>,
    ) -> WrappedJson<LinkCodeResponse> {
        let request = unwrap_request(&resources, payload)?;
        wrapped(
            resources
                .engine
                .generate_link_code(&request.transaction_id)
                .await?,
        )
    }

    async fn handle_link_transaction(
        State(resources): State<Arc<ServerResources>>,
        payload: Result<Json<RequestWrapper<LinkTransactionRequest>>, JsonRejection>,
    ) -> WrappedJson<LinkTransactionResponse> {
        let request = unwrap_request(&resources, payload)?;
        wrapped(resources.engine.link_transaction(request).await?)
    }

    async fn handle_link_status(
        State(resources): State<Arc<ServerResources>>,
        payload: Result<Json<RequestWrapper<LinkStatusRequest>>, JsonRejection>,
    ) -> WrappedJson<LinkStatusResponse> {
        let request = unwrap_request(&resources, payload)?;
        wrapped(resources.engine.link_status(request).await?)
    }

    async fn handle_send_otp(
        State(resources): State<Arc<ServerResources>>,
        payload: Result<Json<RequestWrapper<OtpRequest>>, JsonRejection>,
    ) -> WrappedJson<OtpResponse> {
        let request = unwrap_request(&resources, payload)?;
        wrapped(resources.engine.linked_send_otp(request).await?)
    }

    async fn handle_authenticate(
        State(resources): State<Arc<ServerResources>>,
        payload: Result<Json<RequestWrapper<LinkedAuthRequest>>, JsonRejection>,
    ) -> WrappedJson<LinkedAuthResponse> {
        let request = unwrap_request(&resources, payload)?;
        wrapped(resources.engine.linked_authenticate(request).await?)
    }

    async fn handle_consent(
        State(resources): State<Arc<ServerResources>>,
        payload: Result<Json<RequestWrapper<LinkedConsentRequest>>, JsonRejection>,
    ) -> WrappedJson<LinkedConsentResponse> {
        let request = unwrap_request(&resources, payload)?;
        wrapped(resources.engine.linked_consent(request).await?)
    }

    async fn handle_link_auth_code(
        State(resources): State<Arc<ServerResources>>,
        payload: Result<Json<RequestWrapper<LinkStatusRequest>>, JsonRejection>,
    ) -> WrappedJson<AuthCodeResponse> {
        let request = unwrap_request(&resources, payload)?;
        wrapped(resources.engine.link_auth_code(request).await?)
    }
}

// ABOUTME: HTTP route assembly and the request/response envelope shared by JSON endpoints
// ABOUTME: Unwraps {requestTime, request}, wraps {responseTime, response, errors} and reads details headers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! HTTP routes
//!
//! Every route group exposes `routes(resources) -> Router`; [`router`] merges them and
//! adds request tracing.

/// Single-device authorization endpoints
pub mod authorization;
/// Liveness and readiness
pub mod health;
/// Linked authorization endpoints
pub mod linked;
/// Token endpoint
pub mod oauth;
/// Userinfo and discovery endpoints
pub mod oidc;

pub use authorization::AuthorizationRoutes;
pub use health::HealthRoutes;
pub use linked::LinkedAuthorizationRoutes;
pub use oauth::TokenRoutes;
pub use oidc::OidcRoutes;

use crate::constants::oidc::{HEADER_OAUTH_DETAILS_HASH, HEADER_OAUTH_DETAILS_KEY};
use crate::errors::{AppError, AppResult, ErrorDto};
use crate::oidc::models::RequestWrapper;
use crate::oidc::DetailsHeaders;
use crate::resources::ServerResources;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the complete application router
pub fn router(resources: Arc<ServerResources>) -> Router {
    Router::new()
        .merge(HealthRoutes::routes(resources.clone()))
        .merge(AuthorizationRoutes::routes(resources.clone()))
        .merge(LinkedAuthorizationRoutes::routes(resources.clone()))
        .merge(TokenRoutes::routes(resources.clone()))
        .merge(OidcRoutes::routes(resources))
        .layer(TraceLayer::new_for_http())
}

/// Successful response envelope
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseWrapper<T> {
    /// Server time the response was produced
    pub response_time: String,
    /// Response payload
    pub response: T,
    /// Always empty on success
    pub errors: Vec<ErrorDto>,
}

impl<T> ResponseWrapper<T> {
    /// Wrap a payload
    pub fn new(response: T) -> Self {
        Self {
            response_time: Utc::now().to_rfc3339(),
            response,
            errors: Vec::new(),
        }
    }
}

/// JSON result of a wrapped endpoint
pub type WrappedJson<T> = AppResult<Json<ResponseWrapper<T>>>;

/// Wrap a payload into the JSON envelope
pub fn wrapped<T>(response: T) -> WrappedJson<T> {
    Ok(Json(ResponseWrapper::new(response)))
}

/// Accept a wrapped request body, checking it parsed and its `requestTime`
///
/// # Errors
///
/// Returns `invalid_request` for a malformed body or a stale `requestTime`
pub fn unwrap_request<T>(
    resources: &ServerResources,
    payload: Result<Json<RequestWrapper<T>>, JsonRejection>,
) -> AppResult<T> {
    let Json(wrapper) =
        payload.map_err(|e| AppError::invalid_request(format!("Malformed request: {e}")))?;
    resources
        .engine
        .validate_request_time(&wrapper.request_time)?;
    Ok(wrapper.request)
}

/// Read the `oauth-details-key` and `oauth-details-hash` headers
///
/// # Errors
///
/// Returns `invalid_request` when either header is missing or not text
pub fn details_headers(headers: &HeaderMap) -> AppResult<DetailsHeaders> {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .ok_or_else(|| AppError::invalid_request(format!("Missing {name} header")))
    };
    Ok(DetailsHeaders {
        transaction_id: read(HEADER_OAUTH_DETAILS_KEY)?,
        details_hash: read(HEADER_OAUTH_DETAILS_HASH)?,
    })
}

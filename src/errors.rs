// ABOUTME: Unified error handling with protocol error codes and HTTP response formatting
// ABOUTME: Renders the wrapped-response envelope and the OAuth2 token error shape
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Unified Error Handling System
//!
//! Every failure in the authorization engine is an [`AppError`] carrying a closed
//! [`ErrorCode`]. The code is what callers see on the wire: wrapped endpoints render it
//! inside the `errors` array of the response envelope, the token endpoint renders it in
//! the RFC 6749 `{error, error_description}` shape.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Protocol error codes surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Validation
    /// Malformed or missing request input
    InvalidRequest,
    /// Unknown or inactive client
    InvalidClientId,
    /// Redirect URI does not match a registered pattern
    InvalidRedirectUri,
    /// Requested scope is not permitted
    InvalidScope,
    /// Requested claim is malformed
    InvalidClaim,
    /// Requested ACR values are not usable
    InvalidAcr,
    /// Client has no registered ACR values
    NoAcrRegistered,
    /// Unsupported `response_type`
    InvalidResponseType,
    /// Malformed PKCE challenge
    InvalidPkceChallenge,
    /// PKCE method other than S256
    UnsupportedPkceMethod,

    // Transaction
    /// Transaction missing, expired, out of phase or details hash mismatch
    InvalidTransaction,
    /// Transaction identifier is malformed or does not match headers
    InvalidTransactionId,

    // Grant / token
    /// Code missing, already redeemed, or PKCE mismatch
    InvalidGrant,
    /// Grant type other than `authorization_code`
    UnsupportedGrantType,
    /// Unsupported client assertion type
    InvalidAssertionType,
    /// Client assertion failed verification
    InvalidAssertion,
    /// Bearer token missing or invalid
    InvalidToken,

    // Authentication
    /// Authenticator rejected the challenge
    AuthFailed,
    /// Challenges do not cover any resolved factor combination
    AuthFactorMismatch,
    /// Authenticator could not send the OTP
    SendOtpFailed,
    /// Individual is temporarily blocked
    IndividualIdBlocked,

    // Consent
    /// Accepted claims outside the requested set or missing an essential claim
    InvalidAcceptedClaim,
    /// Permitted scopes outside the requested set
    InvalidPermittedScope,

    // Linked flow
    /// Link code unknown, evicted, expired or already used
    InvalidLinkCode,
    /// Transaction exhausted its link code allowance
    LinkCodeLimitReached,
    /// Long poll finished without a result
    ResponseTimeout,

    // Internal
    /// Configuration error
    ConfigError,
    /// Transaction store failure
    StorageError,
    /// Collaborator or unexpected failure
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::InvalidToken => 401,
            Self::IndividualIdBlocked => 403,
            Self::ResponseTimeout => 408,
            Self::LinkCodeLimitReached => 429,
            Self::ConfigError | Self::StorageError | Self::InternalError => 500,
            _ => 400,
        }
    }

    /// Wire representation of the code
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClientId => "invalid_client_id",
            Self::InvalidRedirectUri => "invalid_redirect_uri",
            Self::InvalidScope => "invalid_scope",
            Self::InvalidClaim => "invalid_claim",
            Self::InvalidAcr => "invalid_acr",
            Self::NoAcrRegistered => "no_acr_registered",
            Self::InvalidResponseType => "invalid_response_type",
            Self::InvalidPkceChallenge => "invalid_pkce_challenge",
            Self::UnsupportedPkceMethod => "unsupported_pkce_method",
            Self::InvalidTransaction => "invalid_transaction",
            Self::InvalidTransactionId => "invalid_transaction_id",
            Self::InvalidGrant => "invalid_grant",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::InvalidAssertionType => "invalid_assertion_type",
            Self::InvalidAssertion => "invalid_assertion",
            Self::InvalidToken => "invalid_token",
            Self::AuthFailed => "auth_failed",
            Self::AuthFactorMismatch => "auth_factor_mismatch",
            Self::SendOtpFailed => "send_otp_failed",
            Self::IndividualIdBlocked => "individual_id_blocked",
            Self::InvalidAcceptedClaim => "invalid_accepted_claim",
            Self::InvalidPermittedScope => "invalid_permitted_scope",
            Self::InvalidLinkCode => "invalid_link_code",
            Self::LinkCodeLimitReached => "link_code_limit_reached",
            Self::ResponseTimeout => "response_timeout",
            Self::ConfigError => "config_error",
            Self::StorageError => "storage_error",
            Self::InternalError => "internal_error",
        }
    }

    /// Get a user-friendly description of this error
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::InvalidRequest => "The request is malformed",
            Self::InvalidClientId => "The client is unknown or inactive",
            Self::InvalidRedirectUri => "The redirect URI is not registered for this client",
            Self::InvalidScope => "The requested scope is not permitted",
            Self::InvalidClaim => "The requested claims are invalid",
            Self::InvalidAcr => "The requested authentication context is invalid",
            Self::NoAcrRegistered => "The client has no registered authentication context",
            Self::InvalidResponseType => "The response type is not supported",
            Self::InvalidPkceChallenge => "The PKCE code challenge is invalid",
            Self::UnsupportedPkceMethod => "The PKCE challenge method is not supported",
            Self::InvalidTransaction => "The transaction is invalid or has expired",
            Self::InvalidTransactionId => "The transaction identifier is invalid",
            Self::InvalidGrant => "The authorization grant is invalid",
            Self::UnsupportedGrantType => "The grant type is not supported",
            Self::InvalidAssertionType => "The client assertion type is not supported",
            Self::InvalidAssertion => "The client assertion is invalid",
            Self::InvalidToken => "The access token is invalid",
            Self::AuthFailed => "Authentication failed",
            Self::AuthFactorMismatch => {
                "The provided factors do not satisfy the requested authentication context"
            }
            Self::SendOtpFailed => "The one-time password could not be sent",
            Self::IndividualIdBlocked => "The individual is temporarily blocked",
            Self::InvalidAcceptedClaim => "The accepted claims are invalid",
            Self::InvalidPermittedScope => "The permitted scopes are invalid",
            Self::InvalidLinkCode => "The link code is invalid or has expired",
            Self::LinkCodeLimitReached => "The link code limit for this transaction was reached",
            Self::ResponseTimeout => "No result was available before the timeout",
            Self::ConfigError => "Configuration error encountered",
            Self::StorageError => "Transaction storage failed",
            Self::InternalError => "An internal server error occurred",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Additional context that can be attached to errors
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Transaction the error relates to
    pub transaction_id: Option<String>,
    /// Client the error relates to
    pub client_id: Option<String>,
}

/// Unified error type for the application
#[derive(Debug, Error)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Additional context
    pub context: ErrorContext,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn StdError + Send + Sync>>,
}

impl AppError {
    /// Create a new `AppError` with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Create an error whose message is the code's description
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.description())
    }

    /// Add a transaction id to the error context
    #[must_use]
    pub fn with_transaction_id(mut self, transaction_id: impl Into<String>) -> Self {
        self.context.transaction_id = Some(transaction_id.into());
        self
    }

    /// Add a client id to the error context
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.context.client_id = Some(client_id.into());
        self
    }

    /// Add a source error for error chaining
    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Convenience functions for creating common errors
impl AppError {
    /// Malformed request input
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Transaction missing, expired or tampered with
    #[must_use]
    pub fn invalid_transaction() -> Self {
        Self::from_code(ErrorCode::InvalidTransaction)
    }

    /// Authorization grant rejected
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidGrant, message)
    }

    /// Client assertion rejected
    pub fn invalid_assertion(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidAssertion, message)
    }

    /// Authentication rejected by the authenticator
    pub fn auth_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthFailed, message)
    }

    /// Transaction store failure
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StorageError, message)
    }

    /// Internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }
}

/// Conversion from `anyhow::Error` to `AppError`
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::internal(format!("{error:#}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::internal(format!("Serialization failed: {error}"))
    }
}

/// One entry of the `errors` array in a wrapped response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDto {
    /// Protocol error code
    pub error_code: String,
    /// Human-readable message
    pub error_message: String,
}

/// Wrapped error response: `{responseTime, response: null, errors: [...]}`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Server time the response was produced
    pub response_time: String,
    /// Always null for errors
    pub response: Option<serde_json::Value>,
    /// The errors
    pub errors: Vec<ErrorDto>,
}

impl From<&AppError> for ErrorResponse {
    fn from(error: &AppError) -> Self {
        Self {
            response_time: Utc::now().to_rfc3339(),
            response: None,
            errors: vec![ErrorDto {
                error_code: error.code.as_str().to_owned(),
                error_message: error.message.clone(),
            }],
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.http_status() >= 500 {
            tracing::error!(code = %self.code, message = %self.message, "Request failed");
        } else {
            tracing::debug!(code = %self.code, message = %self.message, "Request rejected");
        }
        let status = self.status_code();
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

/// RFC 6749 error body returned by the token and userinfo endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct OAuth2ErrorBody {
    /// Error code
    pub error: String,
    /// Human-readable description
    pub error_description: String,
}

/// Wrapper that renders an [`AppError`] in the OAuth2 error shape
#[derive(Debug)]
pub struct OAuth2Error(pub AppError);

impl From<AppError> for OAuth2Error {
    fn from(error: AppError) -> Self {
        Self(error)
    }
}

impl IntoResponse for OAuth2Error {
    fn into_response(self) -> Response {
        let error = self.0;
        tracing::debug!(code = %error.code, message = %error.message, "OAuth2 request rejected");
        let status = error.status_code();
        let body = OAuth2ErrorBody {
            error: error.code.as_str().to_owned(),
            error_description: error.message,
        };
        (status, Json(body)).into_response()
    }
}

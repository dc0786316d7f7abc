// ABOUTME: private_key_jwt client authentication for the token endpoint
// ABOUTME: Verifies RS256 client assertions against the registered key and rejects replayed jti values
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::AuthorizationServer;
use crate::cache::Namespace;
use crate::constants::oidc::JWT_BEARER_ASSERTION_TYPE;
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::logging::AppLogger;
use crate::providers::spi::ClientDetail;
use chrono::Utc;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

/// Assertion claims not covered by [`Validation`]; `iss`, `sub`, `aud` and `exp` are
/// checked there
#[derive(Debug, Deserialize)]
struct ClientAssertionClaims {
    iat: i64,
    jti: String,
}

impl AuthorizationServer {
    /// Authenticate the client through its signed assertion
    ///
    /// # Errors
    ///
    /// Returns `invalid_assertion_type` for an unsupported assertion type and
    /// `invalid_assertion` for any signature, claim or replay failure
    pub async fn verify_client_assertion(
        &self,
        client: &ClientDetail,
        assertion_type: &str,
        assertion: &str,
    ) -> AppResult<()> {
        if assertion_type != JWT_BEARER_ASSERTION_TYPE {
            return Err(AppError::from_code(ErrorCode::InvalidAssertionType)
                .with_client_id(&client.id));
        }

        let key = DecodingKey::from_rsa_pem(client.public_key.as_bytes()).map_err(|e| {
            tracing::error!(client.id = %client.id, "Registered client key is unusable: {e}");
            AppError::invalid_assertion("Client key cannot verify assertions")
        })?;

        let leeway = self.config.client_assertion_max_clock_skew_secs;
        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = leeway;
        validation.set_audience(&[&self.config.token_endpoint, &self.config.issuer]);
        validation.set_issuer(&[&client.id]);
        validation.sub = Some(client.id.clone());
        validation.set_required_spec_claims(&["exp", "iss", "sub", "aud"]);

        let claims = decode::<ClientAssertionClaims>(assertion, &key, &validation)
            .map_err(|e| {
                AppLogger::log_security_event(
                    "client_assertion_rejected",
                    &e.to_string(),
                    Some(&client.id),
                );
                AppError::invalid_assertion(format!("Client assertion rejected: {e}"))
            })?
            .claims;

        let latest_iat = Utc::now()
            .timestamp()
            .saturating_add(i64::try_from(leeway).unwrap_or(i64::MAX));
        if claims.iat > latest_iat {
            return Err(AppError::invalid_assertion("Client assertion issued in the future"));
        }
        if claims.jti.is_empty() {
            return Err(AppError::invalid_assertion("Client assertion has no jti"));
        }

        let replay_key = format!("{}:{}", client.id, claims.jti);
        if !self
            .store
            .claim_once(Namespace::AssertionJti, &replay_key, &true)
            .await?
        {
            AppLogger::log_security_event("client_assertion_replay", &claims.jti, Some(&client.id));
            return Err(AppError::invalid_assertion("Client assertion was already used"));
        }
        Ok(())
    }
}

// ABOUTME: PKCE (RFC 7636) challenge validation at details time and verifier check at redemption
// ABOUTME: Only the S256 transform is supported; comparison is constant time
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::models::ProofKeyCodeExchange;
use crate::constants::oidc::{PKCE_METHOD_S256, PKCE_VERIFIER_MAX_LEN, PKCE_VERIFIER_MIN_LEN};
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::utils::crypto::{constant_time_eq, sha256_base64url};

/// Length of a base64url-encoded SHA-256 digest
const S256_CHALLENGE_LEN: usize = 43;

fn is_unreserved(c: char) -> bool {
    matches!(c, 'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '.' | '_' | '~')
}

/// Validate the challenge parameters of a details request
///
/// Returns `None` when the client did not use PKCE.
///
/// # Errors
///
/// - `unsupported_pkce_method` for any method other than `S256`, or a challenge without a method
/// - `invalid_pkce_challenge` for a blank or malformed challenge
pub fn validate_challenge(
    code_challenge: Option<&str>,
    code_challenge_method: Option<&str>,
) -> AppResult<Option<ProofKeyCodeExchange>> {
    let challenge = code_challenge.map(str::trim).filter(|c| !c.is_empty());
    let method = code_challenge_method.map(str::trim).filter(|m| !m.is_empty());

    match (challenge, method) {
        (None, None) => Ok(None),
        (_, Some(method)) if method != PKCE_METHOD_S256 => Err(AppError::new(
            ErrorCode::UnsupportedPkceMethod,
            format!("Unsupported code_challenge_method '{method}'"),
        )),
        (Some(_), None) => Err(AppError::new(
            ErrorCode::UnsupportedPkceMethod,
            "code_challenge_method is required; only S256 is supported",
        )),
        (None, Some(_)) => Err(AppError::new(
            ErrorCode::InvalidPkceChallenge,
            "code_challenge is required when code_challenge_method is present",
        )),
        (Some(challenge), Some(method)) => {
            if challenge.len() != S256_CHALLENGE_LEN || !challenge.chars().all(is_unreserved) {
                return Err(AppError::new(
                    ErrorCode::InvalidPkceChallenge,
                    "code_challenge is not a valid S256 challenge",
                ));
            }
            Ok(Some(ProofKeyCodeExchange {
                code_challenge: challenge.to_owned(),
                code_challenge_method: method.to_owned(),
            }))
        }
    }
}

/// Check the verifier presented at redemption against the recorded challenge
///
/// # Errors
///
/// Returns `invalid_grant` when the verifier is missing, malformed, unexpected or wrong
pub fn verify(pkce: Option<&ProofKeyCodeExchange>, code_verifier: Option<&str>) -> AppResult<()> {
    let Some(pkce) = pkce else {
        if code_verifier.is_some() {
            return Err(AppError::invalid_grant(
                "code_verifier provided but no code_challenge was issued",
            ));
        }
        return Ok(());
    };

    let verifier = code_verifier
        .ok_or_else(|| AppError::invalid_grant("code_verifier is required (PKCE)"))?;

    if verifier.len() < PKCE_VERIFIER_MIN_LEN || verifier.len() > PKCE_VERIFIER_MAX_LEN {
        return Err(AppError::invalid_grant(
            "code_verifier must be between 43 and 128 characters",
        ));
    }
    if !verifier.chars().all(is_unreserved) {
        return Err(AppError::invalid_grant(
            "code_verifier contains invalid characters",
        ));
    }
    if pkce.code_challenge_method != PKCE_METHOD_S256 {
        return Err(AppError::invalid_grant(
            "Only S256 code_challenge_method is supported",
        ));
    }

    if constant_time_eq(&sha256_base64url(verifier), &pkce.code_challenge) {
        Ok(())
    } else {
        tracing::warn!("PKCE verification failed - code_verifier does not match code_challenge");
        Err(AppError::invalid_grant("Invalid code_verifier"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7636 Appendix B
    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    fn recorded() -> ProofKeyCodeExchange {
        validate_challenge(Some(CHALLENGE), Some("S256"))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_validate_challenge_rules() {
        assert_eq!(validate_challenge(None, None).unwrap(), None);
        assert_eq!(validate_challenge(Some(" "), Some("")).unwrap(), None);

        let err = validate_challenge(Some(CHALLENGE), Some("plain")).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnsupportedPkceMethod);

        let err = validate_challenge(Some(CHALLENGE), None).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnsupportedPkceMethod);

        let err = validate_challenge(Some("  "), Some("S256")).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidPkceChallenge);

        let err = validate_challenge(Some("short"), Some("S256")).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidPkceChallenge);
    }

    #[test]
    fn test_verify_round_trip() {
        let pkce = recorded();
        verify(Some(&pkce), Some(VERIFIER)).unwrap();

        let wrong = "eBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let err = verify(Some(&pkce), Some(wrong)).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidGrant);
    }

    #[test]
    fn test_verify_missing_or_unexpected_verifier() {
        let pkce = recorded();
        assert_eq!(
            verify(Some(&pkce), None).unwrap_err().code,
            ErrorCode::InvalidGrant
        );
        assert_eq!(
            verify(None, Some(VERIFIER)).unwrap_err().code,
            ErrorCode::InvalidGrant
        );
        verify(None, None).unwrap();
    }

    #[test]
    fn test_verify_rejects_malformed_verifier() {
        let pkce = recorded();
        assert_eq!(
            verify(Some(&pkce), Some("too-short")).unwrap_err().code,
            ErrorCode::InvalidGrant
        );
        let bad_chars = "dBjftJeZ4CVP+mB92K27uhbUJU1p1r/wW1gFWFOEjXk";
        assert_eq!(
            verify(Some(&pkce), Some(bad_chars)).unwrap_err().code,
            ErrorCode::InvalidGrant
        );
    }
}

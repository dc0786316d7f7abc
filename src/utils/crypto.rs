// ABOUTME: Secure random generation, hashing and identifier derivation helpers
// ABOUTME: Codes, link codes, SHA-256 digests, at_hash and canonical JSON hashing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::errors::{AppError, AppResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ring::rand::{SecureRandom, SystemRandom};
use serde::Serialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Fill a buffer from the system CSPRNG
///
/// # Errors
///
/// Returns an error if the system RNG fails
pub fn random_bytes(length: usize) -> AppResult<Vec<u8>> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; length];

    rng.fill(&mut bytes).map_err(|e| {
        tracing::error!(
            "CRITICAL: SystemRandom failed - cannot generate secure random bytes: {}",
            e
        );
        AppError::internal("System RNG failure - server cannot operate securely")
    })?;

    Ok(bytes)
}

/// URL-safe base64 encoding of `byte_length` random bytes
///
/// # Errors
///
/// Returns an error if the system RNG fails
pub fn generate_random_string(byte_length: usize) -> AppResult<String> {
    Ok(URL_SAFE_NO_PAD.encode(random_bytes(byte_length)?))
}

/// Uniformly random `[A-Za-z0-9]` string of exactly `length` characters
///
/// # Errors
///
/// Returns an error if the system RNG fails
pub fn generate_alphanumeric(length: usize) -> AppResult<String> {
    // Largest multiple of 62 that fits in a byte; higher values would bias the modulo
    const LIMIT: u8 = 248;
    let mut out = String::with_capacity(length);
    while out.len() < length {
        for byte in random_bytes(length)? {
            if byte < LIMIT {
                out.push(char::from(ALPHANUMERIC[usize::from(byte) % ALPHANUMERIC.len()]));
                if out.len() == length {
                    break;
                }
            }
        }
    }
    Ok(out)
}

/// Base64url (unpadded) SHA-256 digest of a string
#[must_use]
pub fn sha256_base64url(input: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(input.as_bytes()))
}

/// OIDC `at_hash`: base64url of the left half of the SHA-256 digest of the access token
#[must_use]
pub fn access_token_hash(access_token: &str) -> String {
    let digest = Sha256::digest(access_token.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2])
}

/// Constant-time string comparison
#[must_use]
pub fn constant_time_eq(left: &str, right: &str) -> bool {
    left.as_bytes().ct_eq(right.as_bytes()).into()
}

/// Hash of a value's canonical JSON form
///
/// `serde_json` maps are ordered by key, so equal values hash equally regardless of the
/// order their fields were built in.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized
pub fn canonical_json_hash<T: Serialize>(value: &T) -> AppResult<String> {
    let canonical = serde_json::to_value(value)?;
    Ok(sha256_base64url(&serde_json::to_string(&canonical)?))
}

/// Authenticator-facing transaction id derived from the transaction id
///
/// Separators are dropped and `length` characters are read backwards, wrapping around
/// when the source is shorter than `length`.
#[must_use]
pub fn derive_auth_transaction_id(transaction_id: &str, length: usize) -> String {
    let chars: Vec<char> = transaction_id
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .collect();
    if chars.is_empty() {
        return String::new();
    }
    chars.iter().rev().cycle().take(length).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_alphanumeric_length_and_charset() {
        let code = generate_alphanumeric(15).unwrap();
        assert_eq!(code.len(), 15);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_random_strings_differ() {
        assert_ne!(
            generate_random_string(32).unwrap(),
            generate_random_string(32).unwrap()
        );
    }

    #[test]
    fn test_at_hash_is_left_half() {
        // 16 bytes encode to 22 unpadded base64 characters
        assert_eq!(access_token_hash("token").len(), 22);
        assert_eq!(sha256_base64url("token").len(), 43);
    }

    #[test]
    fn test_canonical_hash_ignores_field_order() {
        let a = json!({"b": 1, "a": [1, 2]});
        let b = json!({"a": [1, 2], "b": 1});
        assert_eq!(
            canonical_json_hash(&a).unwrap(),
            canonical_json_hash(&b).unwrap()
        );
    }

    #[test]
    fn test_derive_auth_transaction_id_reverses_and_cycles() {
        assert_eq!(derive_auth_transaction_id("ab-c_d", 4), "dcba");
        assert_eq!(derive_auth_transaction_id("abc", 5), "cbacb");
        assert_eq!(derive_auth_transaction_id("--", 5), "");
    }
}

// ABOUTME: RS256 JWT signer for access tokens, ID tokens and userinfo documents
// ABOUTME: Generates or imports an RSA key pair and exposes it as a JWK
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! RSA-based implementation of the [`Signer`] capability.
//!
//! ```text
//! RsaJwtSigner::generate("kid-1", 2048)?  // fresh key pair
//! RsaJwtSigner::from_pem("kid-1", pem)?   // PKCS#8 private key from disk
//! ```

use super::spi::Signer;
use crate::errors::{AppError, AppResult, ErrorCode};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// JSON Web Key (RFC 7517) for an RSA signing key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type (always "RSA")
    pub kty: String,
    /// Public key use (always "sig")
    #[serde(rename = "use")]
    pub key_use: String,
    /// Key identifier
    pub kid: String,
    /// Algorithm (always "RS256")
    pub alg: String,
    /// RSA modulus, base64url
    pub n: String,
    /// RSA exponent, base64url
    pub e: String,
}

/// RS256 signer holding one RSA key pair
pub struct RsaJwtSigner {
    kid: String,
    public_key: RsaPublicKey,
    private_key_pem: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl RsaJwtSigner {
    /// Generate a new key pair
    ///
    /// # Errors
    ///
    /// Returns an error if key generation or PEM encoding fails
    pub fn generate(kid: &str, key_size_bits: usize) -> AppResult<Self> {
        let private_key = RsaPrivateKey::new(&mut OsRng, key_size_bits)
            .map_err(|e| AppError::internal(format!("Failed to generate RSA private key: {e}")))?;
        Self::from_private_key(kid, &private_key)
    }

    /// Import a PKCS#8 PEM private key
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM cannot be parsed
    pub fn from_pem(kid: &str, pem: &str) -> AppResult<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| AppError::config(format!("Failed to parse private key PEM: {e}")))?;
        Self::from_private_key(kid, &private_key)
    }

    fn from_private_key(kid: &str, private_key: &RsaPrivateKey) -> AppResult<Self> {
        let public_key = RsaPublicKey::from(private_key);

        let private_key_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map(|pem| pem.to_string())
            .map_err(|e| AppError::internal(format!("Failed to export private key as PEM: {e}")))?;
        let public_key_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| AppError::internal(format!("Failed to export public key as PEM: {e}")))?;

        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| AppError::internal(format!("Failed to create encoding key: {e}")))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| AppError::internal(format!("Failed to create decoding key: {e}")))?;

        Ok(Self {
            kid: kid.to_owned(),
            public_key,
            private_key_pem,
            encoding_key,
            decoding_key,
        })
    }

    /// Key identifier placed in every token header
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// PKCS#8 PEM of the private key
    #[must_use]
    pub fn private_key_pem(&self) -> &str {
        &self.private_key_pem
    }

    /// SPKI PEM of the public key
    ///
    /// # Errors
    ///
    /// Returns an error if PEM encoding fails
    pub fn public_key_pem(&self) -> AppResult<String> {
        self.public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| AppError::internal(format!("Failed to export public key as PEM: {e}")))
    }

    /// Public key as a JWK
    #[must_use]
    pub fn to_jwk(&self) -> JsonWebKey {
        JsonWebKey {
            kty: "RSA".to_owned(),
            key_use: "sig".to_owned(),
            kid: self.kid.clone(),
            alg: "RS256".to_owned(),
            n: URL_SAFE_NO_PAD.encode(self.public_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(self.public_key.e().to_bytes_be()),
        }
    }
}

#[async_trait]
impl Signer for RsaJwtSigner {
    async fn sign(&self, claims: &Value) -> AppResult<String> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());

        encode(&header, claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Failed to encode RS256 JWT: {e}")))
    }

    async fn verify(&self, token: &str, audience: Option<&str>) -> AppResult<Value> {
        let invalid = |message: String| AppError::new(ErrorCode::InvalidToken, message);

        let header =
            decode_header(token).map_err(|e| invalid(format!("Malformed token header: {e}")))?;
        if header.kid.as_deref() != Some(self.kid.as_str()) {
            return Err(invalid("Unknown signing key".to_owned()));
        }

        let mut validation = Validation::new(Algorithm::RS256);
        validation.required_spec_claims = HashSet::from(["exp".to_owned()]);
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        decode::<Value>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| invalid(format!("Token verification failed: {e}")))
    }
}

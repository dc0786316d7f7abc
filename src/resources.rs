// ABOUTME: Shared server resources handed to every route as axum state
// ABOUTME: Bootstraps the transaction store, collaborators, signer and engine from configuration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Server resources
//!
//! [`ServerResources`] is built once at startup and shared behind an `Arc`. It owns the
//! authorization engine and whatever the routes need besides it.

use crate::cache::{Cache, TransactionStore};
use crate::config::acr::AcrMappingConfig;
use crate::config::environment::ServerConfig;
use crate::constants::defaults::RSA_KEY_SIZE_BITS;
use crate::constants::oidc::SIGNING_KEY_ID;
use crate::errors::{AppError, AppResult};
use crate::oidc::{AcrResolver, AuthorizationServer};
use crate::providers::{
    InMemoryClientRegistry, InMemoryConsentStore, JsonWebKey, MockAuthenticator, RsaJwtSigner,
    SeedData,
};
use std::sync::Arc;
use tokio::fs;
use tracing::info;

/// Resources shared by all request handlers
pub struct ServerResources {
    /// Authorization engine
    pub engine: Arc<AuthorizationServer>,
    /// Public signing keys published at the JWKS endpoint
    pub jwks: Vec<JsonWebKey>,
    /// Server configuration
    pub config: Arc<ServerConfig>,
}

impl ServerResources {
    /// Assemble resources from a prepared engine
    #[must_use]
    pub fn new(engine: AuthorizationServer, jwks: Vec<JsonWebKey>, config: ServerConfig) -> Self {
        Self {
            engine: Arc::new(engine),
            jwks,
            config: Arc::new(config),
        }
    }

    /// Build the store, the bundled collaborators and the engine from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot start or a configured file cannot be loaded
    pub async fn bootstrap(config: ServerConfig) -> AppResult<Self> {
        let cache = Cache::new(config.cache.clone()).await?;
        let store = TransactionStore::new(cache, config.cache.ttl.clone());
        info!(backend = store.backend_name(), "Transaction store ready");

        let mapping = AcrMappingConfig::load(config.amr_acr_mapping_file.as_deref())?;
        let signer = Self::load_signer(&config).await?;
        let jwks = vec![signer.to_jwk()];

        let clients = InMemoryClientRegistry::new();
        let authenticator = MockAuthenticator::new()?;
        if let Some(path) = &config.seed_file {
            SeedData::load(path).await?.apply(&clients, &authenticator);
        }

        let engine = AuthorizationServer::new(
            store,
            Arc::new(clients),
            Arc::new(authenticator),
            Arc::new(signer),
            Arc::new(InMemoryConsentStore::new()),
            AcrResolver::new(mapping),
            config.oidc.clone(),
        );
        Ok(Self::new(engine, jwks, config))
    }

    async fn load_signer(config: &ServerConfig) -> AppResult<RsaJwtSigner> {
        match &config.signing_key_path {
            Some(path) => {
                let pem = fs::read_to_string(path).await.map_err(|e| {
                    AppError::config(format!(
                        "Failed to read signing key {}: {e}",
                        path.display()
                    ))
                })?;
                info!(path = %path.display(), "Loaded signing key");
                RsaJwtSigner::from_pem(SIGNING_KEY_ID, &pem)
            }
            None => {
                info!("No SIGNING_KEY_PATH set, generating an ephemeral signing key");
                RsaJwtSigner::generate(SIGNING_KEY_ID, RSA_KEY_SIZE_BITS)
            }
        }
    }
}

// ABOUTME: Main library entry point for the OIDC transaction server
// ABOUTME: Exposes the transaction store, authorization engine, collaborators and HTTP routes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![recursion_limit = "256"]
#![deny(unsafe_code)]

//! # OIDC Transaction Server
//!
//! An OpenID Connect authorization server that carries an end-user from client
//! authorization details through authentication and consent to signed tokens, with a
//! linked flow that lets a second device finish what the first one started.
//!
//! ## Architecture
//!
//! - **Cache**: namespaced transaction store with atomic claim primitives (memory, Redis)
//! - **OIDC**: the authorization engine (state machine, PKCE, ACR/AMR, consent, tokens)
//! - **Providers**: client registry, authenticator, consent store and signer seams
//! - **Routes**: axum handlers behind the `{requestTime, request}` envelope
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use oidc_transaction_server::config::environment::ServerConfig;
//! use oidc_transaction_server::errors::AppResult;
//! use oidc_transaction_server::resources::ServerResources;
//!
//! #[tokio::main]
//! async fn main() -> AppResult<()> {
//!     let config = ServerConfig::from_env()?;
//!     let resources = ServerResources::bootstrap(config).await?;
//!     println!("Issuer: {}", resources.engine.config().issuer);
//!     Ok(())
//! }
//! ```

/// Namespaced transaction store and cache backends
pub mod cache;

/// Environment, store and ACR mapping configuration
pub mod config;

/// Protocol constants and defaults
pub mod constants;

/// Error codes and HTTP error rendering
pub mod errors;

/// Logging setup and structured event helpers
pub mod logging;

/// Authorization engine
pub mod oidc;

/// Collaborator interfaces and bundled implementations
pub mod providers;

/// Shared server resources
pub mod resources;

/// HTTP routes
pub mod routes;

/// Hashing, random codes and redirect URI matching
pub mod utils;

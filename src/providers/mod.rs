// ABOUTME: External collaborators of the authorization engine and their development implementations
// ABOUTME: SPI traits plus in-memory registry, consent store, mock authenticator and RSA signer
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// In-memory client registry and consent store
pub mod memory;
/// Development authenticator
pub mod mock_authenticator;
/// Seed file loader
pub mod seed;
/// RS256 JWT signer
pub mod signer;
/// Collaborator traits
pub mod spi;

pub use memory::{InMemoryClientRegistry, InMemoryConsentStore};
pub use mock_authenticator::{MockAuthenticator, MockIdentity};
pub use seed::SeedData;
pub use signer::{JsonWebKey, RsaJwtSigner};
pub use spi::{
    AuthChallenge, Authenticator, ClientDetail, ClientRegistry, ClientStatus, ConsentRecord,
    ConsentStore, Signer,
};

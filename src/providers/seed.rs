// ABOUTME: JSON seed file loader for the development client registry and authenticator
// ABOUTME: Registers clients and mock identities at server startup
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::memory::InMemoryClientRegistry;
use super::mock_authenticator::{MockAuthenticator, MockIdentity};
use super::spi::ClientDetail;
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Contents of a seed file
///
/// ```json
/// {
///   "clients": [{ "id": "C1", "name": "Demo", "relyingPartyId": "rp", ... }],
///   "identities": [{ "individualId": "8267411571", "pin": "111111", ... }]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedData {
    /// Clients to register
    #[serde(default)]
    pub clients: Vec<ClientDetail>,
    /// Identities known to the mock authenticator
    #[serde(default)]
    pub identities: Vec<MockIdentity>,
}

impl SeedData {
    /// Read and parse a seed file
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or parsed
    pub async fn load(path: &Path) -> AppResult<Self> {
        let json = fs::read_to_string(path).await.map_err(|e| {
            AppError::config(format!("Failed to read seed file {}: {e}", path.display()))
        })?;
        serde_json::from_str(&json)
            .map_err(|e| AppError::config(format!("Invalid seed file {}: {e}", path.display())))
    }

    /// Register every client and identity
    pub fn apply(self, registry: &InMemoryClientRegistry, authenticator: &MockAuthenticator) {
        let (clients, identities) = (self.clients.len(), self.identities.len());
        for client in self.clients {
            registry.register(client);
        }
        for identity in self.identities {
            authenticator.register(identity);
        }
        tracing::info!(clients, identities, "Applied seed data");
    }
}

// ABOUTME: In-memory client registry and consent store implementations
// ABOUTME: Concurrent maps used by the bundled server and by tests
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::spi::{ClientDetail, ClientRegistry, ConsentRecord, ConsentStore};
use crate::errors::AppResult;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// Client registry backed by a concurrent map
#[derive(Clone, Default)]
pub struct InMemoryClientRegistry {
    clients: Arc<DashMap<String, ClientDetail>>,
}

impl InMemoryClientRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a client
    pub fn register(&self, client: ClientDetail) {
        self.clients.insert(client.id.clone(), client);
    }

    /// Number of registered clients
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no client is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[async_trait]
impl ClientRegistry for InMemoryClientRegistry {
    async fn lookup(&self, client_id: &str) -> AppResult<Option<ClientDetail>> {
        Ok(self.clients.get(client_id).map(|entry| entry.value().clone()))
    }
}

/// Consent store backed by a concurrent map keyed by client and user
#[derive(Clone, Default)]
pub struct InMemoryConsentStore {
    records: Arc<DashMap<(String, String), ConsentRecord>>,
}

impl InMemoryConsentStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConsentStore for InMemoryConsentStore {
    async fn get(&self, client_id: &str, psu_token: &str) -> AppResult<Option<ConsentRecord>> {
        Ok(self
            .records
            .get(&(client_id.to_owned(), psu_token.to_owned()))
            .map(|entry| entry.value().clone()))
    }

    async fn put(&self, record: ConsentRecord) -> AppResult<()> {
        self.records.insert(
            (record.client_id.clone(), record.psu_token.clone()),
            record,
        );
        Ok(())
    }

    async fn delete(&self, client_id: &str, psu_token: &str) -> AppResult<()> {
        self.records
            .remove(&(client_id.to_owned(), psu_token.to_owned()));
        Ok(())
    }
}

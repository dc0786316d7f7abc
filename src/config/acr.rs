// ABOUTME: AMR/ACR mapping document loaded from a JSON file or the built-in default
// ABOUTME: Maps AMR names to factor lists and ACR values to AMR names
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::errors::{AppError, AppResult};
use crate::oidc::models::AuthenticationFactor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Built-in mapping used when no file is configured
const DEFAULT_MAPPING: &str = r#"{
  "amr": {
    "PIN": [{ "type": "PIN" }],
    "OTP": [{ "type": "OTP" }],
    "WLA": [{ "type": "WLA" }],
    "L1-bio-device": [{ "type": "BIO", "count": 1 }]
  },
  "acr_amr": {
    "idp:acr:static-code": ["PIN"],
    "idp:acr:generated-code": ["OTP"],
    "idp:acr:linked-wallet": ["WLA"],
    "idp:acr:biometrics": ["L1-bio-device"]
  }
}"#;

/// AMR/ACR mapping document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcrMappingConfig {
    /// AMR name to the factors it requires
    pub amr: BTreeMap<String, Vec<AuthenticationFactor>>,
    /// ACR value to the AMR names it accepts, in preference order
    pub acr_amr: BTreeMap<String, Vec<String>>,
}

impl Default for AcrMappingConfig {
    fn default() -> Self {
        // The literal above is covered by `test_default_mapping_parses`
        serde_json::from_str(DEFAULT_MAPPING).unwrap_or_else(|_| Self {
            amr: BTreeMap::new(),
            acr_amr: BTreeMap::new(),
        })
    }
}

impl AcrMappingConfig {
    /// Parse a mapping document
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the JSON is malformed
    pub fn from_json(json: &str) -> AppResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| AppError::config(format!("Invalid AMR/ACR mapping: {e}")))
    }

    /// Load from a file, or use the built-in mapping when no path is given
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or parsed
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let json = fs::read_to_string(path).map_err(|e| {
            AppError::config(format!(
                "Failed to read AMR/ACR mapping {}: {e}",
                path.display()
            ))
        })?;
        let mapping = Self::from_json(&json)?;
        tracing::info!(
            path = %path.display(),
            acr_count = mapping.acr_amr.len(),
            amr_count = mapping.amr.len(),
            "Loaded AMR/ACR mapping"
        );
        Ok(mapping)
    }
}

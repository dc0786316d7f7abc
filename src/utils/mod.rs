// ABOUTME: Utility modules for common functionality across the application
// ABOUTME: Contains cryptographic helpers and redirect URI matching
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Secure random generation and hashing
pub mod crypto;
/// Redirect URI matching
pub mod redirect;

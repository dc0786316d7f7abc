// ABOUTME: Redirect URI matching against registered client patterns
// ABOUTME: Exact scheme/host/port comparison with glob templates on the path
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use glob::{MatchOptions, Pattern};
use url::Url;

const PATH_MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Whether `redirect_uri` matches any registered pattern
///
/// Scheme, host and port must be identical. The pattern path is a template where `*`
/// matches within one segment and `**` across segments. Patterns without wildcards
/// must match the whole URI exactly.
#[must_use]
pub fn matches_any(redirect_uri: &str, registered: &[String]) -> bool {
    let Ok(candidate) = Url::parse(redirect_uri) else {
        return false;
    };
    if candidate.fragment().is_some() {
        return false;
    }
    registered
        .iter()
        .any(|pattern| matches_pattern(&candidate, redirect_uri, pattern))
}

fn matches_pattern(candidate: &Url, raw: &str, pattern: &str) -> bool {
    if !pattern.contains('*') {
        return raw == pattern;
    }
    let Ok(template) = Url::parse(pattern) else {
        return false;
    };
    if template.scheme() != candidate.scheme()
        || template.host_str() != candidate.host_str()
        || template.port_or_known_default() != candidate.port_or_known_default()
        || template.query() != candidate.query()
    {
        return false;
    }
    Pattern::new(template.path())
        .is_ok_and(|glob| glob.matches_with(candidate.path(), PATH_MATCH))
}

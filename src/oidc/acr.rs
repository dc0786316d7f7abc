// ABOUTME: ACR/AMR resolver mapping requested ACR values to acceptable factor combinations
// ABOUTME: Also maps factors actually presented back to the ACR values they satisfy
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::claims::split_values;
use super::models::{AuthenticationFactor, ClaimsRequest};
use crate::config::acr::AcrMappingConfig;
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::providers::spi::AuthChallenge;
use std::collections::HashSet;

/// Pure resolver over a loaded [`AcrMappingConfig`]
#[derive(Debug, Clone, Default)]
pub struct AcrResolver {
    mapping: AcrMappingConfig,
}

impl AcrResolver {
    /// Create a resolver over a mapping document
    #[must_use]
    pub const fn new(mapping: AcrMappingConfig) -> Self {
        Self { mapping }
    }

    /// ACR values known to the mapping, as advertised by discovery
    #[must_use]
    pub fn supported_acr_values(&self) -> Vec<String> {
        self.mapping.acr_amr.keys().cloned().collect()
    }

    /// Factor combinations acceptable for the given ACRs
    ///
    /// The caller's ACR order is kept, and within each ACR the order of its AMRs.
    /// Unknown ACR or AMR names contribute nothing.
    #[must_use]
    pub fn resolve(&self, acr_values: &[String]) -> Vec<Vec<AuthenticationFactor>> {
        acr_values
            .iter()
            .filter_map(|acr| self.mapping.acr_amr.get(acr))
            .flatten()
            .filter_map(|amr| self.mapping.amr.get(amr))
            .cloned()
            .collect()
    }

    /// ACR values satisfied by the provided factor-type combinations
    ///
    /// An AMR is satisfied when some combination contains all of its factor types; an
    /// ACR is satisfied when it references at least one AMR and all of them are.
    #[must_use]
    pub fn satisfied_acrs(&self, provided: &[Vec<String>]) -> Vec<String> {
        if provided.is_empty() {
            return Vec::new();
        }

        let satisfied_amrs: HashSet<&str> = self
            .mapping
            .amr
            .iter()
            .filter(|(_, factors)| {
                provided.iter().any(|combination| {
                    factors
                        .iter()
                        .all(|factor| combination.contains(&factor.factor_type))
                })
            })
            .map(|(name, _)| name.as_str())
            .collect();

        self.mapping
            .acr_amr
            .iter()
            .filter(|(_, amrs)| {
                !amrs.is_empty() && amrs.iter().all(|amr| satisfied_amrs.contains(amr.as_str()))
            })
            .map(|(acr, _)| acr.clone())
            .collect()
    }

    /// Resolved combinations fully covered by the presented challenges
    ///
    /// # Errors
    ///
    /// Returns `auth_factor_mismatch` when no resolved combination is covered
    pub fn provided_auth_factors(
        &self,
        acr_values: &[String],
        challenges: &[AuthChallenge],
    ) -> AppResult<Vec<Vec<String>>> {
        let presented: HashSet<&str> = challenges
            .iter()
            .map(|challenge| challenge.auth_factor_type.as_str())
            .collect();

        let mut matched: Vec<Vec<String>> = Vec::new();
        for combination in self.resolve(acr_values) {
            let types: Vec<String> = combination
                .into_iter()
                .map(|factor| factor.factor_type)
                .collect();
            if types.iter().all(|t| presented.contains(t.as_str())) && !matched.contains(&types) {
                matched.push(types);
            }
        }

        if matched.is_empty() {
            tracing::warn!(
                presented = ?presented,
                acr_values = ?acr_values,
                "Presented auth factors do not match any resolved combination"
            );
            return Err(AppError::from_code(ErrorCode::AuthFactorMismatch));
        }
        Ok(matched)
    }
}

/// ACR values for a new transaction, filtered by the client's registered ACRs
///
/// `claims.id_token.acr.values` wins, then `acr_values`; when neither yields a registered
/// value every registered ACR is used.
///
/// # Errors
///
/// Returns `no_acr_registered` when the client has no ACR values
pub fn select_acr_values(
    registered: &[String],
    acr_values: Option<&str>,
    claims: Option<&ClaimsRequest>,
) -> AppResult<Vec<String>> {
    if registered.is_empty() {
        return Err(AppError::from_code(ErrorCode::NoAcrRegistered));
    }

    let registered_only = |values: &[String]| -> Vec<String> {
        values
            .iter()
            .filter(|acr| registered.contains(acr))
            .cloned()
            .collect()
    };

    let from_claims = claims
        .and_then(|c| c.id_token.as_ref())
        .and_then(|id_token| id_token.get("acr"))
        .and_then(|detail| detail.as_ref())
        .and_then(|detail| detail.values.as_deref())
        .map(registered_only)
        .unwrap_or_default();
    if !from_claims.is_empty() {
        return Ok(from_claims);
    }

    let from_param = registered_only(&split_values(acr_values));
    if !from_param.is_empty() {
        return Ok(from_param);
    }

    Ok(registered.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> AcrResolver {
        AcrResolver::new(
            AcrMappingConfig::from_json(
                r#"{
                  "amr": {
                    "PIN": [{"type": "PIN"}],
                    "OTP": [{"type": "OTP"}],
                    "BIO": [{"type": "BIO", "count": 1}],
                    "PIN_OTP": [{"type": "PIN"}, {"type": "OTP"}]
                  },
                  "acr_amr": {
                    "acr:pin": ["PIN"],
                    "acr:otp": ["OTP"],
                    "acr:strong": ["PIN_OTP"],
                    "acr:bio": ["BIO", "UNKNOWN"]
                  }
                }"#,
            )
            .unwrap(),
        )
    }

    fn acrs(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_owned()).collect()
    }

    fn types(result: &[Vec<AuthenticationFactor>]) -> Vec<Vec<&str>> {
        result
            .iter()
            .map(|c| c.iter().map(|f| f.factor_type.as_str()).collect())
            .collect()
    }

    #[test]
    fn test_resolve_keeps_caller_order() {
        let r = resolver();
        assert_eq!(
            types(&r.resolve(&acrs(&["acr:otp", "acr:pin"]))),
            vec![vec!["OTP"], vec!["PIN"]]
        );
        assert_eq!(
            types(&r.resolve(&acrs(&["acr:pin", "acr:otp"]))),
            vec![vec!["PIN"], vec!["OTP"]]
        );
    }

    #[test]
    fn test_resolve_skips_unknown_names() {
        let r = resolver();
        assert_eq!(
            types(&r.resolve(&acrs(&["acr:nope", "acr:bio"]))),
            vec![vec!["BIO"]]
        );
        assert!(r.resolve(&acrs(&["acr:nope"])).is_empty());
    }

    #[test]
    fn test_satisfied_acrs() {
        let r = resolver();
        let provided = vec![vec!["PIN".to_owned(), "OTP".to_owned()]];
        let satisfied = r.satisfied_acrs(&provided);
        assert!(satisfied.contains(&"acr:pin".to_owned()));
        assert!(satisfied.contains(&"acr:otp".to_owned()));
        assert!(satisfied.contains(&"acr:strong".to_owned()));
        // References an AMR that does not exist
        assert!(!satisfied.contains(&"acr:bio".to_owned()));
        assert!(r.satisfied_acrs(&[]).is_empty());
    }

    #[test]
    fn test_select_acr_values_precedence() {
        use crate::oidc::models::ClaimDetail;
        use std::collections::BTreeMap;

        let registered = acrs(&["acr:pin", "acr:otp"]);
        let mut id_token = BTreeMap::new();
        id_token.insert(
            "acr".to_owned(),
            Some(ClaimDetail {
                essential: true,
                value: None,
                values: Some(acrs(&["acr:otp", "acr:unregistered"])),
            }),
        );
        let claims = ClaimsRequest {
            userinfo: None,
            id_token: Some(id_token),
        };

        assert_eq!(
            select_acr_values(&registered, Some("acr:pin"), Some(&claims)).unwrap(),
            acrs(&["acr:otp"])
        );
        assert_eq!(
            select_acr_values(&registered, Some("acr:x acr:pin"), None).unwrap(),
            acrs(&["acr:pin"])
        );
        assert_eq!(
            select_acr_values(&registered, Some("acr:x"), None).unwrap(),
            registered
        );
        assert_eq!(
            select_acr_values(&[], None, None).unwrap_err().code,
            ErrorCode::NoAcrRegistered
        );
    }

    #[test]
    fn test_provided_auth_factors() {
        let r = resolver();
        let pin = AuthChallenge {
            auth_factor_type: "PIN".to_owned(),
            challenge: "1234".to_owned(),
            format: "number".to_owned(),
        };
        let matched = r
            .provided_auth_factors(&acrs(&["acr:pin", "acr:strong"]), &[pin.clone()])
            .unwrap();
        assert_eq!(matched, vec![vec!["PIN".to_owned()]]);

        let err = r
            .provided_auth_factors(&acrs(&["acr:otp"]), &[pin])
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthFactorMismatch);
    }
}

//! Validated subject token
//!
//! Canonical, verified view of a subject token regardless of whether it was
//! verified with the gateway's own keys or through a trusted issuer.

use crate::{
    claims::{self, Claims},
    error::{ExchangeError, Result},
    token_type::TokenType,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

/// Verified subject token
///
/// Built once per exchange request and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedToken {
    /// Subject (`sub`)
    pub subject: String,

    /// Issuer (`iss`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Token identifier (`jti`), used for revocation lookups
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,

    /// Client the token was issued to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Audience, in claim order
    pub audience: Vec<String>,

    /// Granted scopes
    pub scopes: BTreeSet<String>,

    /// Full claim set
    pub claims: Claims,

    /// Expiration time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,

    /// Issued at
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,

    /// Not before
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,

    /// RFC 8693 token type URN
    pub token_type: String,

    /// Tenant the token claims to belong to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// True only when verified against a trusted issuer's key material
    pub trusted_issuer_validated: bool,
}

impl ValidatedToken {
    /// Build from a verified claim set
    ///
    /// Fails when the claim set carries no usable `sub`.
    pub fn from_claims(claims: Claims, token_type: TokenType) -> Result<Self> {
        let subject = claims::string_claim(&claims, claims::SUB).ok_or_else(|| {
            ExchangeError::InvalidGrant(format!("{} is missing 'sub' claim", token_type.urn()))
        })?;

        let client_id = claims::string_claim(&claims, claims::CLIENT_ID)
            .or_else(|| claims::string_claim(&claims, claims::AZP));

        Ok(Self {
            subject,
            issuer: claims::string_claim(&claims, claims::ISS),
            token_id: claims::string_claim(&claims, claims::JTI),
            client_id,
            audience: claims::parse_audience(claims.get(claims::AUD)),
            scopes: claims::parse_scopes(claims.get(claims::SCOPE)),
            expiration: claims::instant_claim(&claims, claims::EXP),
            issued_at: claims::instant_claim(&claims, claims::IAT),
            not_before: claims::instant_claim(&claims, claims::NBF),
            token_type: token_type.urn().to_string(),
            domain: claims::string_claim(&claims, claims::DOMAIN),
            trusted_issuer_validated: false,
            claims,
        })
    }

    /// Check `exp`/`nbf` against the current time
    pub fn validate_temporal(&self) -> Result<()> {
        claims::validate_temporal(&self.token_type, self.expiration, self.not_before, Utc::now())
    }

    /// Look up a string claim
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(|v| v.as_str())
    }

    /// Whether the token belongs to the given tenant
    pub fn belongs_to(&self, domain_id: &str) -> bool {
        self.domain.as_deref() == Some(domain_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: serde_json::Value) -> Claims {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_from_claims() {
        let exp = Utc::now().timestamp() + 3600;
        let token = ValidatedToken::from_claims(
            claims(json!({
                "sub": "user-123",
                "iss": "https://issuer.example.com",
                "jti": "at-1",
                "aud": ["client-a", "client-b"],
                "scope": "read write",
                "exp": exp,
                "domain": "acme",
                "azp": "client-a",
            })),
            TokenType::AccessToken,
        )
        .unwrap();

        assert_eq!(token.subject, "user-123");
        assert_eq!(token.issuer.as_deref(), Some("https://issuer.example.com"));
        assert_eq!(token.token_id.as_deref(), Some("at-1"));
        assert_eq!(token.client_id.as_deref(), Some("client-a"));
        assert_eq!(token.audience, vec!["client-a", "client-b"]);
        assert_eq!(token.scopes.len(), 2);
        assert_eq!(token.expiration.unwrap().timestamp(), exp);
        assert!(token.belongs_to("acme"));
        assert!(!token.trusted_issuer_validated);
        assert_eq!(token.token_type, crate::token_type::ACCESS_TOKEN_URN);
        assert!(token.validate_temporal().is_ok());
    }

    #[test]
    fn test_missing_subject() {
        let err = ValidatedToken::from_claims(claims(json!({"iss": "x"})), TokenType::Jwt)
            .unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidGrant(_)));
    }

    #[test]
    fn test_zero_temporal_claims_round_trip_to_absent() {
        let token = ValidatedToken::from_claims(
            claims(json!({"sub": "user-123", "exp": 0, "iat": 0, "nbf": 0})),
            TokenType::IdToken,
        )
        .unwrap();

        assert!(token.expiration.is_none());
        assert!(token.issued_at.is_none());
        assert!(token.not_before.is_none());
        assert!(token.validate_temporal().is_ok());

        let json = serde_json::to_value(&token).unwrap();
        assert!(json.get("expiration").is_none());
    }
}

//! Claim extraction helpers shared by every validator

use crate::error::{ExchangeError, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeSet;

/// JWT claim set
pub type Claims = serde_json::Map<String, Value>;

/// Subject
pub const SUB: &str = "sub";
/// Issuer
pub const ISS: &str = "iss";
/// JWT ID
pub const JTI: &str = "jti";
/// Audience
pub const AUD: &str = "aud";
/// Scope (space-delimited string or list)
pub const SCOPE: &str = "scope";
/// Expiration time
pub const EXP: &str = "exp";
/// Issued at
pub const IAT: &str = "iat";
/// Not before
pub const NBF: &str = "nbf";
/// OAuth client identifier
pub const CLIENT_ID: &str = "client_id";
/// Authorized party, used when `client_id` is absent
pub const AZP: &str = "azp";
/// Tenant the token was issued for
pub const DOMAIN: &str = "domain";
/// Preferred username (OIDC)
pub const PREFERRED_USERNAME: &str = "preferred_username";
/// Internal subject of a gateway-issued token
pub const INTERNAL_SUBJECT: &str = "gis";

/// Read a string claim, ignoring blank values
pub fn string_claim(claims: &Claims, name: &str) -> Option<String> {
    claims
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

/// Parse scopes from a space-delimited string or a list of strings
///
/// Any other shape yields an empty set.
pub fn parse_scopes(value: Option<&Value>) -> BTreeSet<String> {
    match value {
        Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => BTreeSet::new(),
    }
}

/// Parse audience from a single string or a list of strings
///
/// Any other shape yields an empty list. Order is preserved.
pub fn parse_audience(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Read a NumericDate claim
///
/// A value of exactly zero means "unset" and yields `None`.
pub fn instant_claim(claims: &Claims, name: &str) -> Option<DateTime<Utc>> {
    let seconds = match claims.get(name)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        _ => return None,
    };

    if seconds == 0 {
        return None;
    }

    DateTime::<Utc>::from_timestamp(seconds, 0)
}

/// Check `exp` and `nbf` against the current time
///
/// Only positive instants are enforced.
pub fn validate_temporal(
    token_type_urn: &str,
    expiration: Option<DateTime<Utc>>,
    not_before: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<()> {
    if let Some(exp) = expiration {
        if exp.timestamp() > 0 && now >= exp {
            return Err(ExchangeError::InvalidGrant(format!(
                "{} has expired",
                token_type_urn
            )));
        }
    }

    if let Some(nbf) = not_before {
        if nbf.timestamp() > 0 && nbf > now {
            return Err(ExchangeError::InvalidGrant(format!(
                "{} is not yet valid",
                token_type_urn
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn claims(value: Value) -> Claims {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_parse_scopes() {
        let scopes = parse_scopes(Some(&json!("read  write")));
        assert_eq!(scopes.len(), 2);
        assert!(scopes.contains("read"));
        assert!(scopes.contains("write"));

        let scopes = parse_scopes(Some(&json!(["read", 42, "admin"])));
        assert_eq!(
            scopes.into_iter().collect::<Vec<_>>(),
            vec!["admin", "read"]
        );

        assert!(parse_scopes(Some(&json!({"read": true}))).is_empty());
        assert!(parse_scopes(Some(&json!(7))).is_empty());
        assert!(parse_scopes(None).is_empty());
    }

    #[test]
    fn test_parse_audience() {
        assert_eq!(parse_audience(Some(&json!("client-a"))), vec!["client-a"]);
        assert_eq!(
            parse_audience(Some(&json!(["b", "a"]))),
            vec!["b".to_string(), "a".to_string()]
        );
        assert!(parse_audience(Some(&json!(12))).is_empty());
        assert!(parse_audience(None).is_empty());
    }

    #[test]
    fn test_zero_instants_are_absent() {
        let c = claims(json!({"exp": 0, "iat": 0, "nbf": 0}));
        assert!(instant_claim(&c, EXP).is_none());
        assert!(instant_claim(&c, IAT).is_none());
        assert!(instant_claim(&c, NBF).is_none());

        let c = claims(json!({"exp": 1_700_000_000, "iat": 1_699_999_000.7}));
        assert_eq!(instant_claim(&c, EXP).unwrap().timestamp(), 1_700_000_000);
        assert_eq!(instant_claim(&c, IAT).unwrap().timestamp(), 1_699_999_000);

        let c = claims(json!({"exp": "1700000000"}));
        assert!(instant_claim(&c, EXP).is_none());
    }

    #[test]
    fn test_string_claim_ignores_blank() {
        let c = claims(json!({"sub": "  ", "iss": "https://issuer.example.com", "n": 1}));
        assert!(string_claim(&c, SUB).is_none());
        assert!(string_claim(&c, "n").is_none());
        assert_eq!(
            string_claim(&c, ISS).as_deref(),
            Some("https://issuer.example.com")
        );
    }

    #[test]
    fn test_validate_temporal() {
        let now = Utc::now();
        let urn = crate::token_type::ACCESS_TOKEN_URN;

        assert!(validate_temporal(urn, Some(now + Duration::hours(1)), None, now).is_ok());
        assert!(validate_temporal(urn, None, Some(now - Duration::hours(1)), now).is_ok());

        let err = validate_temporal(urn, Some(now - Duration::hours(1)), None, now).unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidGrant(_)));
        assert!(err.to_string().ends_with("has expired"));
        assert!(err.to_string().starts_with(urn));

        let err = validate_temporal(urn, None, Some(now + Duration::hours(1)), now).unwrap_err();
        assert!(err.to_string().ends_with("is not yet valid"));
    }
}

//! Token exchange settings
//!
//! Per-tenant configuration consumed read-only by the exchange pipeline.

use crate::error::{ExchangeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use validator::Validate;

/// Tenant (security domain)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Domain {
    /// Tenant identifier, compared against a token's `domain` claim
    #[validate(length(min = 1, max = 255))]
    pub id: String,

    /// Token exchange settings (absent = exchange disabled)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub token_exchange: Option<TokenExchangeSettings>,
}

impl Domain {
    /// Create a tenant with the given settings
    pub fn new(id: impl Into<String>, token_exchange: Option<TokenExchangeSettings>) -> Self {
        Self {
            id: id.into(),
            token_exchange,
        }
    }

    /// Validate the tenant id and its token exchange settings
    pub fn validate_settings(&self) -> Result<()> {
        self.validate().map_err(|e| {
            ExchangeError::Configuration(format!("domain '{}': Invalid settings: {}", self.id, e))
        })?;

        match &self.token_exchange {
            Some(settings) => settings.validate_settings().map_err(|e| match e {
                ExchangeError::Configuration(msg) => {
                    ExchangeError::Configuration(format!("domain '{}': {}", self.id, msg))
                }
                other => other,
            }),
            None => Ok(()),
        }
    }
}

/// Calling OAuth client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Client identifier
    pub client_id: String,
}

impl Client {
    /// Create a client
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
        }
    }
}

/// Token exchange settings for one tenant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct TokenExchangeSettings {
    /// Whether token exchange is enabled
    #[serde(default)]
    pub enabled: bool,

    /// Subject token type URNs accepted by this tenant
    #[serde(default)]
    pub allowed_subject_token_types: Vec<String>,

    /// External issuers whose tokens may be exchanged
    #[serde(default)]
    #[validate(nested)]
    pub trusted_issuers: Vec<TrustedIssuer>,
}

impl TokenExchangeSettings {
    /// Whether the subject token type is accepted
    pub fn allows_subject_token_type(&self, urn: &str) -> bool {
        self.allowed_subject_token_types.iter().any(|t| t == urn)
    }

    /// Find the trusted issuer whose `issuer` matches verbatim
    pub fn find_trusted_issuer(&self, issuer: &str) -> Option<&TrustedIssuer> {
        self.trusted_issuers.iter().find(|t| t.issuer == issuer)
    }

    /// Validate settings, including method-specific key material
    pub fn validate_settings(&self) -> Result<()> {
        self.validate()
            .map_err(|e| ExchangeError::Configuration(format!("Invalid settings: {}", e)))?;

        for trusted_issuer in &self.trusted_issuers {
            trusted_issuer.check_key_material()?;
        }

        Ok(())
    }
}

/// How a trusted issuer's verification keys are obtained
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum KeyResolutionMethod {
    /// Inline PEM certificate or public key
    #[default]
    Pem,

    /// JSON Web Key Set fetched from a URL
    JwksUrl,

    /// Unknown method, rejected when resolving keys
    Unsupported(String),
}

impl From<String> for KeyResolutionMethod {
    fn from(value: String) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "PEM" => KeyResolutionMethod::Pem,
            "JWKS_URL" => KeyResolutionMethod::JwksUrl,
            _ => KeyResolutionMethod::Unsupported(value),
        }
    }
}

impl From<KeyResolutionMethod> for String {
    fn from(value: KeyResolutionMethod) -> Self {
        value.to_string()
    }
}

impl fmt::Display for KeyResolutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyResolutionMethod::Pem => f.write_str("PEM"),
            KeyResolutionMethod::JwksUrl => f.write_str("JWKS_URL"),
            KeyResolutionMethod::Unsupported(other) => f.write_str(other),
        }
    }
}

/// External issuer trusted for token exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct TrustedIssuer {
    /// Issuer identifier, matched verbatim against `iss`
    #[validate(length(min = 1))]
    pub issuer: String,

    /// Key resolution method
    #[serde(default)]
    pub key_resolution_method: KeyResolutionMethod,

    /// PEM certificate or public key (PEM method)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,

    /// JWKS endpoint (JWKS_URL method)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(url)]
    pub jwks_uri: Option<String>,

    /// External scope -> local scope
    ///
    /// When non-empty, scopes without an entry are dropped.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scope_mappings: BTreeMap<String, String>,

    /// Bind the external subject to a domain user
    #[serde(default)]
    pub user_binding_enabled: bool,

    /// Criteria used for user binding, all of which must match
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[validate(nested)]
    pub user_binding_criteria: Vec<UserBindingCriterion>,
}

impl TrustedIssuer {
    /// Trusted issuer with an inline PEM key
    pub fn pem(issuer: impl Into<String>, certificate: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            key_resolution_method: KeyResolutionMethod::Pem,
            certificate: Some(certificate.into()),
            jwks_uri: None,
            scope_mappings: BTreeMap::new(),
            user_binding_enabled: false,
            user_binding_criteria: Vec::new(),
        }
    }

    /// Trusted issuer resolved through a JWKS endpoint
    pub fn jwks(issuer: impl Into<String>, jwks_uri: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            key_resolution_method: KeyResolutionMethod::JwksUrl,
            certificate: None,
            jwks_uri: Some(jwks_uri.into()),
            scope_mappings: BTreeMap::new(),
            user_binding_enabled: false,
            user_binding_criteria: Vec::new(),
        }
    }

    /// Add a scope mapping
    pub fn with_scope_mapping(mut self, external: impl Into<String>, local: impl Into<String>) -> Self {
        self.scope_mappings.insert(external.into(), local.into());
        self
    }

    /// Enable user binding with the given criteria
    pub fn with_user_binding(mut self, criteria: Vec<UserBindingCriterion>) -> Self {
        self.user_binding_enabled = true;
        self.user_binding_criteria = criteria;
        self
    }

    /// Check that the configured method has its key material
    pub fn check_key_material(&self) -> Result<()> {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());

        match &self.key_resolution_method {
            KeyResolutionMethod::Pem if !present(&self.certificate) => {
                Err(ExchangeError::Configuration(format!(
                    "Trusted issuer {} uses PEM but has no certificate",
                    self.issuer
                )))
            }
            KeyResolutionMethod::JwksUrl if !present(&self.jwks_uri) => {
                Err(ExchangeError::Configuration(format!(
                    "Trusted issuer {} uses JWKS_URL but has no jwks_uri",
                    self.issuer
                )))
            }
            KeyResolutionMethod::Unsupported(method) => Err(ExchangeError::Configuration(format!(
                "Unsupported key resolution method '{}' for trusted issuer {}",
                method, self.issuer
            ))),
            _ => Ok(()),
        }
    }
}

/// One user binding criterion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct UserBindingCriterion {
    /// Domain user attribute to match (e.g. `email`)
    #[validate(length(min = 1))]
    pub attribute: String,

    /// Claim expression producing the value to match
    #[validate(length(min = 1))]
    pub expression: String,
}

impl UserBindingCriterion {
    /// Create a criterion
    pub fn new(attribute: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            expression: expression.into(),
        }
    }
}

//! Gateway configuration
//!
//! TOML file describing the gateway's own verification key, resolver options
//! and tenants. Tenants may carry fixture data (users, live token ids) that
//! seed the in-memory stores for offline runs.
//!
//! ```toml
//! [local_keys]
//! secret = "gateway-secret"
//!
//! [resolver]
//! jwks_timeout = "5s"
//!
//! [[domains]]
//! id = "acme"
//! live_access_tokens = ["at-1"]
//!
//! [domains.token_exchange]
//! enabled = true
//! allowed_subject_token_types = ["urn:ietf:params:oauth:token-type:jwt"]
//!
//! [[domains.token_exchange.trusted_issuers]]
//! issuer = "https://partner.example.com"
//! key_resolution_method = "JWKS_URL"
//! jwks_uri = "https://partner.example.com/.well-known/jwks.json"
//! ```

use crate::{
    codec::{JwtTokenCodec, TokenCodec, VerificationKey},
    error::{ExchangeError, Result},
    exchange::{ExchangeResult, TokenExchangeRequest, TokenExchangeService},
    issuer_resolver::{ResolverOptions, TrustedIssuerResolver},
    repository::{InMemoryTokenStore, InMemoryUserStore, TokenRecord, User},
    settings::{Client, Domain, TokenExchangeSettings},
    token_type::TokenType,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Gateway configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway's own verification keys
    pub local_keys: LocalKeysConfig,

    /// Trusted issuer resolver options
    #[serde(default)]
    pub resolver: ResolverOptions,

    /// Tenants
    #[serde(default)]
    pub domains: Vec<DomainConfig>,
}

/// Gateway verification key material
///
/// Exactly one of `secret` or `public_key_pem` per key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalKeysConfig {
    /// Shared HMAC secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Public key or certificate (RSA, EC or Ed25519)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_pem: Option<String>,

    /// Per token type overrides, keyed by `access_token`, `refresh_token`,
    /// `id_token` or `jwt`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, KeyConfig>,
}

/// One verification key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyConfig {
    /// Shared HMAC secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Public key or certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_pem: Option<String>,
}

impl KeyConfig {
    fn verification_key(&self, name: &str) -> Result<VerificationKey> {
        match (&self.secret, &self.public_key_pem) {
            (Some(secret), None) if !secret.is_empty() => Ok(VerificationKey::hmac(secret.as_bytes())),
            (None, Some(pem)) => VerificationKey::from_pem(pem),
            (Some(_), Some(_)) => Err(ExchangeError::Configuration(format!(
                "{}: set either secret or public_key_pem, not both",
                name
            ))),
            _ => Err(ExchangeError::Configuration(format!(
                "{}: secret or public_key_pem is required",
                name
            ))),
        }
    }
}

impl LocalKeysConfig {
    /// Build the local token codec
    pub fn codec(&self) -> Result<JwtTokenCodec> {
        let default_key = KeyConfig {
            secret: self.secret.clone(),
            public_key_pem: self.public_key_pem.clone(),
        }
        .verification_key("local_keys")?;

        let mut codec = JwtTokenCodec::new(default_key);
        for (name, key) in &self.overrides {
            let token_type = token_type_by_name(name).ok_or_else(|| {
                ExchangeError::Configuration(format!("Unknown token type in local_keys.overrides: {}", name))
            })?;
            let key = key.verification_key(&format!("local_keys.overrides.{}", name))?;
            codec = codec.with_category_key(token_type, key);
        }

        Ok(codec)
    }
}

fn token_type_by_name(name: &str) -> Option<TokenType> {
    TokenType::ALL
        .into_iter()
        .find(|t| t.urn().rsplit(':').next() == Some(name))
}

/// Tenant with its settings and optional fixture data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Tenant identifier
    pub id: String,

    /// Token exchange settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_exchange: Option<TokenExchangeSettings>,

    /// Known domain users
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<User>,

    /// Live access token ids
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub live_access_tokens: Vec<String>,

    /// Live refresh token ids
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub live_refresh_tokens: Vec<String>,
}

impl DomainConfig {
    /// Tenant as seen by the exchange pipeline
    pub fn domain(&self) -> Domain {
        Domain::new(self.id.clone(), self.token_exchange.clone())
    }
}

impl GatewayConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        debug!(path = %path.display(), domains = config.domains.len(), "Configuration loaded");
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Validate keys and every tenant's settings
    pub fn validate(&self) -> Result<()> {
        self.local_keys.codec()?;

        let mut seen = HashSet::new();
        for domain in &self.domains {
            domain.domain().validate_settings()?;
            if !seen.insert(domain.id.as_str()) {
                return Err(ExchangeError::Configuration(format!(
                    "Duplicate domain '{}'",
                    domain.id
                )));
            }
        }

        Ok(())
    }

    /// Build a gateway backed by in-memory stores seeded from the fixtures
    ///
    /// Each tenant gets its own token stores, so a live token id only
    /// passes the revocation check of the tenant that lists it.
    pub async fn build(&self) -> Result<Gateway> {
        self.validate()?;

        let codec: Arc<dyn TokenCodec> = Arc::new(self.local_keys.codec()?);
        let resolver = Arc::new(TrustedIssuerResolver::with_options(self.resolver.clone())?);
        let users = Arc::new(InMemoryUserStore::new());

        let mut tenants = Vec::with_capacity(self.domains.len());
        for domain in &self.domains {
            let access_tokens = Arc::new(InMemoryTokenStore::new());
            let refresh_tokens = Arc::new(InMemoryTokenStore::new());

            for token_id in &domain.live_access_tokens {
                access_tokens.insert(TokenRecord::new(token_id.clone())).await;
            }
            for token_id in &domain.live_refresh_tokens {
                refresh_tokens.insert(TokenRecord::new(token_id.clone())).await;
            }
            for user in &domain.users {
                users.insert(domain.id.clone(), user.clone()).await;
            }

            let service = TokenExchangeService::with_standard_validators(
                codec.clone(),
                resolver.clone(),
                access_tokens,
                refresh_tokens,
                users.clone(),
            );

            debug!(
                domain = %domain.id,
                access_tokens = domain.live_access_tokens.len(),
                refresh_tokens = domain.live_refresh_tokens.len(),
                users = domain.users.len(),
                "Tenant fixtures loaded"
            );
            tenants.push(Tenant {
                domain: domain.domain(),
                service,
            });
        }

        info!(domains = tenants.len(), "Gateway initialized");

        Ok(Gateway { resolver, tenants })
    }
}

/// Tenant and the exchange service wired to its stores
pub struct Tenant {
    /// Tenant settings
    pub domain: Domain,

    /// Token exchange service over this tenant's stores
    pub service: TokenExchangeService,
}

/// Configured gateway
pub struct Gateway {
    /// Shared trusted issuer resolver
    pub resolver: Arc<TrustedIssuerResolver>,

    tenants: Vec<Tenant>,
}

impl Gateway {
    /// Find a tenant by id
    pub fn tenant(&self, id: &str) -> Option<&Tenant> {
        self.tenants.iter().find(|t| t.domain.id == id)
    }

    /// Find a tenant's settings by id
    pub fn domain(&self, id: &str) -> Option<&Domain> {
        self.tenant(id).map(|t| &t.domain)
    }

    /// All tenants' settings
    pub fn domains(&self) -> impl Iterator<Item = &Domain> {
        self.tenants.iter().map(|t| &t.domain)
    }

    /// Exchange a subject token on behalf of a configured tenant
    pub async fn exchange(
        &self,
        request: &TokenExchangeRequest,
        client: &Client,
        domain_id: &str,
    ) -> Result<ExchangeResult> {
        let tenant = self.tenant(domain_id).ok_or_else(|| {
            ExchangeError::InvalidRequest(format!("Unknown domain: {}", domain_id))
        })?;
        tenant.service.exchange(request, client, &tenant.domain).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::KeyResolutionMethod;
    use crate::testutil::{gateway_token, in_one_hour, GATEWAY_SECRET};
    use crate::token_type::ACCESS_TOKEN_URN;
    use serde_json::json;
    use std::time::Duration;

    fn sample() -> String {
        format!(
            r#"
[local_keys]
secret = "{}"

[local_keys.overrides.refresh_token]
secret = "refresh-secret"

[resolver]
jwks_timeout = "3s"

[[domains]]
id = "acme"
live_access_tokens = ["at-1"]

[[domains.users]]
id = "u-1"
username = "alice"
email = "alice@example.com"

[domains.token_exchange]
enabled = true
allowed_subject_token_types = ["urn:ietf:params:oauth:token-type:access_token"]

[[domains.token_exchange.trusted_issuers]]
issuer = "https://partner.example.com"
key_resolution_method = "JWKS_URL"
jwks_uri = "https://partner.example.com/jwks"
scope_mappings = {{ "ext:read" = "domain:read" }}
user_binding_enabled = true
user_binding_criteria = [{{ attribute = "email", expression = "email" }}]

[[domains]]
id = "globex"
"#,
            std::str::from_utf8(GATEWAY_SECRET).unwrap()
        )
    }

    #[test]
    fn test_parse() {
        let config = GatewayConfig::from_toml(&sample()).unwrap();

        assert_eq!(config.resolver.jwks_timeout, Duration::from_secs(3));
        assert_eq!(config.domains.len(), 2);
        assert_eq!(config.local_keys.overrides.len(), 1);

        let settings = config.domains[0].token_exchange.as_ref().unwrap();
        let issuer = &settings.trusted_issuers[0];
        assert_eq!(issuer.key_resolution_method, KeyResolutionMethod::JwksUrl);
        assert_eq!(issuer.scope_mappings["ext:read"], "domain:read");
        assert_eq!(issuer.user_binding_criteria[0].attribute, "email");
        assert!(config.domains[1].token_exchange.is_none());

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_resolver_options() {
        let config = GatewayConfig::from_toml("[local_keys]\nsecret = \"s\"\n").unwrap();
        assert_eq!(config.resolver.jwks_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        let config = GatewayConfig::from_toml("[local_keys]\n").unwrap();
        assert!(matches!(config.validate(), Err(ExchangeError::Configuration(_))));

        let config = GatewayConfig::from_toml(
            "[local_keys]\nsecret = \"s\"\n[[domains]]\nid = \"a\"\n[[domains]]\nid = \"a\"\n",
        )
        .unwrap();
        assert!(config.validate().unwrap_err().to_string().contains("Duplicate"));

        let config =
            GatewayConfig::from_toml("[local_keys]\nsecret = \"s\"\n[[domains]]\nid = \"\"\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ExchangeError::Configuration(_)));
        assert!(err.to_string().contains("domain '': Invalid settings"));

        let config = GatewayConfig::from_toml(
            r#"
[local_keys]
secret = "s"

[[domains]]
id = "a"

[domains.token_exchange]
enabled = true

[[domains.token_exchange.trusted_issuers]]
issuer = "https://partner.example.com"
"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("no certificate"));
    }

    #[test]
    fn test_unknown_override() {
        let config = GatewayConfig::from_toml(
            "[local_keys]\nsecret = \"s\"\n[local_keys.overrides.saml2]\nsecret = \"x\"\n",
        )
        .unwrap();
        assert!(config.validate().is_err());
        assert_eq!(token_type_by_name("id_token"), Some(TokenType::IdToken));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            GatewayConfig::from_toml("local_keys = ["),
            Err(ExchangeError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_build_seeds_fixtures() {
        let gateway = GatewayConfig::from_toml(&sample()).unwrap().build().await.unwrap();
        assert!(gateway.domain("acme").is_some());
        assert!(gateway.domain("initech").is_none());
        assert_eq!(gateway.domains().count(), 2);

        let token = gateway_token(json!({
            "sub": "user-123",
            "jti": "at-1",
            "domain": "acme",
            "exp": in_one_hour(),
        }));
        let request = TokenExchangeRequest::new(&token, ACCESS_TOKEN_URN);

        let result = gateway
            .exchange(&request, &Client::new("cli"), "acme")
            .await
            .unwrap();
        assert_eq!(result.identity.id, "user-123");

        let err = gateway
            .exchange(&request, &Client::new("cli"), "initech")
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_live_tokens_are_scoped_to_their_domain() {
        let mut config = GatewayConfig::from_toml(&sample()).unwrap();
        config.domains[1].token_exchange = config.domains[0].token_exchange.clone();
        let gateway = config.build().await.unwrap();

        let token_for = |domain: &str| {
            gateway_token(json!({
                "sub": "user-123",
                "jti": "at-1",
                "domain": domain,
                "exp": in_one_hour(),
            }))
        };

        let acme = TokenExchangeRequest::new(token_for("acme"), ACCESS_TOKEN_URN);
        assert!(gateway.exchange(&acme, &Client::new("cli"), "acme").await.is_ok());

        let globex = TokenExchangeRequest::new(token_for("globex"), ACCESS_TOKEN_URN);
        let err = gateway
            .exchange(&globex, &Client::new("cli"), "globex")
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidGrant(_)));
        assert_eq!(err.to_string(), "token has been revoked");
    }
}

//! Token exchange orchestration (RFC 8693)
//!
//! [`TokenExchangeService::exchange`] validates the request shape, selects the
//! validator chain for the declared subject token type, optionally binds the
//! external identity to a domain user and assembles the [`ExchangeResult`].
//! Minting the new access token is left to the caller.

use crate::{
    claims,
    codec::TokenCodec,
    error::{ExchangeError, Result},
    issuer_resolver::TrustedIssuerResolver,
    repository::{AccessTokenStore, RefreshTokenStore, User, UserLookup},
    settings::{Client, Domain, TokenExchangeSettings},
    token_type::{TokenType, ACCESS_TOKEN_URN},
    user_binding::TokenExchangeUserResolver,
    validated_token::ValidatedToken,
    validator::{
        DefaultTokenValidator, DomainTokenValidator, TokenValidator, TrustedIssuerTokenValidator,
    },
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Metadata keys recorded on the exchanged identity
pub mod metadata {
    /// Always `true`
    pub const TOKEN_EXCHANGE: &str = "token_exchange";
    /// Always `true`
    pub const IMPERSONATION: &str = "impersonation";
    /// Subject token type URN
    pub const SUBJECT_TOKEN_TYPE: &str = "subject_token_type";
    /// Requested token type URN
    pub const REQUESTED_TOKEN_TYPE: &str = "requested_token_type";
    /// Calling client
    pub const CLIENT_ID: &str = "client_id";
    /// Space-joined scopes, omitted when empty
    pub const SCOPE: &str = "scope";
    /// Subject token `jti`
    pub const SUBJECT_TOKEN_ID: &str = "subject_token_id";
    /// Trusted issuer the subject token was verified against
    pub const ISSUER: &str = "issuer";
    /// Domain user bound through user binding
    pub const BOUND_USER: &str = "bound_user";
}

/// Token exchange request parameters
///
/// Field names follow the form parameters of RFC 8693 section 2.1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenExchangeRequest {
    /// Grant type (checked by the token endpoint)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_type: Option<String>,

    /// Token to exchange
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_token: Option<String>,

    /// Subject token type URN
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_token_type: Option<String>,

    /// Requested token type URN (defaults to access token)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_token_type: Option<String>,

    /// Target audience
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,

    /// Requested scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenExchangeRequest {
    /// Request for a subject token of the given type
    pub fn new(subject_token: impl Into<String>, subject_token_type: impl Into<String>) -> Self {
        Self {
            grant_type: Some(crate::GRANT_TYPE_TOKEN_EXCHANGE.to_string()),
            subject_token: Some(subject_token.into()),
            subject_token_type: Some(subject_token_type.into()),
            ..Default::default()
        }
    }

    /// Set the requested token type
    pub fn with_requested_token_type(mut self, requested_token_type: impl Into<String>) -> Self {
        self.requested_token_type = Some(requested_token_type.into());
        self
    }
}

/// Outcome of a successful exchange
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeResult {
    /// Identity the new token is issued for, with exchange metadata
    pub identity: User,

    /// Token type to issue
    pub issued_token_type: String,

    /// Scopes carried over from the subject token
    pub scopes: BTreeSet<String>,

    /// Expiration inherited from the subject token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

/// Token exchange service
pub struct TokenExchangeService {
    validators: Vec<Arc<dyn TokenValidator>>,
    user_resolver: TokenExchangeUserResolver,
}

impl TokenExchangeService {
    /// Create a service from explicit validators
    ///
    /// The first validator registered for a token type wins.
    pub fn new(validators: Vec<Arc<dyn TokenValidator>>, users: Arc<dyn UserLookup>) -> Self {
        Self {
            validators,
            user_resolver: TokenExchangeUserResolver::new(users),
        }
    }

    /// Create a service with the standard validator chains
    ///
    /// Access and refresh tokens get the revocation check; every type gets
    /// the trusted issuer fallback.
    pub fn with_standard_validators(
        codec: Arc<dyn TokenCodec>,
        resolver: Arc<TrustedIssuerResolver>,
        access_tokens: Arc<dyn AccessTokenStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        users: Arc<dyn UserLookup>,
    ) -> Self {
        let validators = TokenType::ALL
            .into_iter()
            .map(|token_type| {
                let mut chain: Arc<dyn TokenValidator> =
                    Arc::new(DefaultTokenValidator::new(token_type, codec.clone()));

                if matches!(token_type, TokenType::AccessToken | TokenType::RefreshToken) {
                    chain = Arc::new(DomainTokenValidator::new(
                        chain,
                        access_tokens.clone(),
                        refresh_tokens.clone(),
                    ));
                }

                Arc::new(TrustedIssuerTokenValidator::new(
                    chain,
                    codec.clone(),
                    resolver.clone(),
                )) as Arc<dyn TokenValidator>
            })
            .collect();

        Self::new(validators, users)
    }

    /// Exchange a subject token
    pub async fn exchange(
        &self,
        request: &TokenExchangeRequest,
        client: &Client,
        domain: &Domain,
    ) -> Result<ExchangeResult> {
        match self.perform_exchange(request, client, domain).await {
            Ok(result) => {
                info!(
                    domain = %domain.id,
                    client_id = %client.client_id,
                    subject_token_type = ?request.subject_token_type,
                    identity = %result.identity.id,
                    "Token exchange succeeded"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(
                    domain = %domain.id,
                    client_id = %client.client_id,
                    kind = e.kind(),
                    error = %e,
                    "Token exchange rejected"
                );
                Err(e)
            }
        }
    }

    async fn perform_exchange(
        &self,
        request: &TokenExchangeRequest,
        client: &Client,
        domain: &Domain,
    ) -> Result<ExchangeResult> {
        let settings = enabled_settings(domain)?;

        let subject_token = present(&request.subject_token)
            .ok_or_else(|| ExchangeError::InvalidRequest("subject_token is required".to_string()))?;

        let subject_token_type = present(&request.subject_token_type).ok_or_else(|| {
            ExchangeError::InvalidRequest("subject_token_type is required".to_string())
        })?;

        if !settings.allows_subject_token_type(subject_token_type) {
            return Err(ExchangeError::InvalidRequest(
                "Unsupported subject_token_type".to_string(),
            ));
        }

        let requested_token_type = match present(&request.requested_token_type) {
            None => ACCESS_TOKEN_URN,
            Some(urn) if TokenType::from_urn(urn).is_some_and(|t| t.is_issuable()) => urn,
            Some(_) => {
                return Err(ExchangeError::InvalidRequest(
                    "Unsupported requested_token_type".to_string(),
                ))
            }
        };

        let validator = self
            .validators
            .iter()
            .find(|v| v.token_type().urn() == subject_token_type)
            .ok_or_else(|| {
                ExchangeError::InvalidGrant("No validator found for token type".to_string())
            })?;

        debug!(domain = %domain.id, subject_token_type = %subject_token_type, "Validating subject token");
        let validated = validator.validate(subject_token, settings, domain).await?;

        let mut metadata = exchange_metadata(&validated, client, subject_token_type, requested_token_type);
        let mut identity = synthesized_identity(&validated);

        if validated.trusted_issuer_validated {
            let trusted_issuer = validated
                .issuer
                .as_deref()
                .and_then(|iss| settings.find_trusted_issuer(iss));

            if let Some(user) = self
                .user_resolver
                .resolve(&validated, trusted_issuer, &domain.id)
                .await?
            {
                metadata.insert(metadata::BOUND_USER.to_string(), Value::String(user.id.clone()));
                identity = user;
            }
        }

        identity.additional_information.extend(metadata);

        Ok(ExchangeResult {
            identity,
            issued_token_type: requested_token_type.to_string(),
            scopes: validated.scopes,
            expiration: validated.expiration,
        })
    }
}

fn enabled_settings(domain: &Domain) -> Result<&TokenExchangeSettings> {
    domain
        .token_exchange
        .as_ref()
        .filter(|settings| settings.enabled)
        .ok_or_else(|| ExchangeError::InvalidRequest("Token exchange is not enabled".to_string()))
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Identity derived from the subject token itself
fn synthesized_identity(validated: &ValidatedToken) -> User {
    let username = claims::string_claim(&validated.claims, claims::PREFERRED_USERNAME)
        .unwrap_or_else(|| validated.subject.clone());
    User::new(validated.subject.clone(), username)
}

fn exchange_metadata(
    validated: &ValidatedToken,
    client: &Client,
    subject_token_type: &str,
    requested_token_type: &str,
) -> claims::Claims {
    let mut metadata = claims::Claims::new();
    metadata.insert(metadata::TOKEN_EXCHANGE.to_string(), Value::Bool(true));
    metadata.insert(metadata::IMPERSONATION.to_string(), Value::Bool(true));
    metadata.insert(
        metadata::SUBJECT_TOKEN_TYPE.to_string(),
        Value::String(subject_token_type.to_string()),
    );
    metadata.insert(
        metadata::REQUESTED_TOKEN_TYPE.to_string(),
        Value::String(requested_token_type.to_string()),
    );
    metadata.insert(
        metadata::CLIENT_ID.to_string(),
        Value::String(client.client_id.clone()),
    );

    if !validated.scopes.is_empty() {
        let scope = validated.scopes.iter().cloned().collect::<Vec<_>>().join(" ");
        metadata.insert(metadata::SCOPE.to_string(), Value::String(scope));
    }
    if let Some(token_id) = &validated.token_id {
        metadata.insert(
            metadata::SUBJECT_TOKEN_ID.to_string(),
            Value::String(token_id.clone()),
        );
    }
    if let Some(gis) = validated.claims.get(claims::INTERNAL_SUBJECT) {
        metadata.insert(claims::INTERNAL_SUBJECT.to_string(), gis.clone());
    }
    if validated.trusted_issuer_validated {
        if let Some(issuer) = &validated.issuer {
            metadata.insert(metadata::ISSUER.to_string(), Value::String(issuer.clone()));
        }
    }

    metadata
}

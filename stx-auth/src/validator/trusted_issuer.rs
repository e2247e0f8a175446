//! Trusted issuer fallback

use super::TokenValidator;
use crate::{
    claims,
    codec::TokenCodec,
    error::{ExchangeError, Result},
    issuer_resolver::TrustedIssuerResolver,
    settings::{Domain, TokenExchangeSettings, TrustedIssuer},
    token_type::TokenType,
    validated_token::ValidatedToken,
};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Falls back to a trusted external issuer when local verification fails
pub struct TrustedIssuerTokenValidator {
    delegate: Arc<dyn TokenValidator>,
    codec: Arc<dyn TokenCodec>,
    resolver: Arc<TrustedIssuerResolver>,
}

impl TrustedIssuerTokenValidator {
    /// Wrap a validator with the trusted issuer fallback
    pub fn new(
        delegate: Arc<dyn TokenValidator>,
        codec: Arc<dyn TokenCodec>,
        resolver: Arc<TrustedIssuerResolver>,
    ) -> Self {
        Self {
            delegate,
            codec,
            resolver,
        }
    }

    async fn validate_with_trusted_issuer(
        &self,
        token: &str,
        settings: &TokenExchangeSettings,
        local_error: ExchangeError,
    ) -> Result<ValidatedToken> {
        let unverified = match self.codec.decode_unverified(token) {
            Ok(claims) => claims,
            Err(_) => return Err(local_error),
        };

        let issuer = claims::string_claim(&unverified, claims::ISS)
            .ok_or_else(|| ExchangeError::InvalidGrant("JWT missing 'iss' claim".to_string()))?;

        let trusted_issuer = settings.find_trusted_issuer(&issuer).ok_or_else(|| {
            warn!(issuer = %issuer, "Subject token from untrusted issuer");
            ExchangeError::InvalidGrant(format!("Untrusted issuer: {}", issuer))
        })?;

        debug!(issuer = %issuer, token_type = %self.token_type(), "Attempting trusted issuer verification");

        let verified = self.resolver.resolve(token, trusted_issuer).await?;

        let mut validated = ValidatedToken::from_claims(verified, self.token_type())?;
        validated.trusted_issuer_validated = true;
        validated.scopes = map_scopes(&validated.scopes, trusted_issuer);
        validated.validate_temporal()?;

        info!(
            issuer = %issuer,
            jti = ?validated.token_id,
            token_type = %self.token_type(),
            "Subject token verified by trusted issuer"
        );

        Ok(validated)
    }
}

/// Translate external scopes through the issuer's mapping table
///
/// Without a table scopes pass through; with one, unmapped scopes are dropped.
fn map_scopes(scopes: &BTreeSet<String>, trusted_issuer: &TrustedIssuer) -> BTreeSet<String> {
    if trusted_issuer.scope_mappings.is_empty() {
        return scopes.clone();
    }

    scopes
        .iter()
        .filter_map(|scope| trusted_issuer.scope_mappings.get(scope).cloned())
        .collect()
}

#[async_trait]
impl TokenValidator for TrustedIssuerTokenValidator {
    fn token_type(&self) -> TokenType {
        self.delegate.token_type()
    }

    async fn validate(
        &self,
        token: &str,
        settings: &TokenExchangeSettings,
        domain: &Domain,
    ) -> Result<ValidatedToken> {
        match self.delegate.validate(token, settings, domain).await {
            Ok(validated) => Ok(validated),
            Err(ExchangeError::TokenVerification(message)) if settings.trusted_issuers.is_empty() => {
                debug!(token_type = %self.token_type(), "No trusted issuers configured, skipping fallback");
                Err(ExchangeError::InvalidGrant(message))
            }
            Err(e) if e.is_token_verification() => {
                self.validate_with_trusted_issuer(token, settings, e).await
            }
            Err(e) => Err(e),
        }
    }
}

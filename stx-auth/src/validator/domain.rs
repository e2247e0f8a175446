//! Same-tenant revocation check

use super::TokenValidator;
use crate::{
    error::{ExchangeError, Result},
    repository::{AccessTokenStore, RefreshTokenStore},
    settings::{Domain, TokenExchangeSettings},
    token_type::TokenType,
    validated_token::ValidatedToken,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

const REVOKED: &str = "token has been revoked";

/// Checks tokens issued for the current tenant against the live token stores
///
/// Tokens of another tenant (or of none) pass through unchanged.
pub struct DomainTokenValidator {
    delegate: Arc<dyn TokenValidator>,
    access_tokens: Arc<dyn AccessTokenStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
}

impl DomainTokenValidator {
    /// Wrap a validator with the revocation check
    pub fn new(
        delegate: Arc<dyn TokenValidator>,
        access_tokens: Arc<dyn AccessTokenStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
    ) -> Self {
        Self {
            delegate,
            access_tokens,
            refresh_tokens,
        }
    }

    async fn is_live(&self, token: &ValidatedToken) -> Result<bool> {
        let Some(token_id) = token.token_id.as_deref() else {
            return Ok(false);
        };

        let record = match self.delegate.token_type() {
            TokenType::AccessToken => self.access_tokens.find_by_token_id(token_id).await?,
            TokenType::RefreshToken => self.refresh_tokens.find_by_token_id(token_id).await?,
            // Only access and refresh tokens have a live store
            TokenType::IdToken | TokenType::Jwt => None,
        };

        Ok(record.is_some())
    }
}

#[async_trait]
impl TokenValidator for DomainTokenValidator {
    fn token_type(&self) -> TokenType {
        self.delegate.token_type()
    }

    async fn validate(
        &self,
        token: &str,
        settings: &TokenExchangeSettings,
        domain: &Domain,
    ) -> Result<ValidatedToken> {
        let validated = self.delegate.validate(token, settings, domain).await?;

        if !validated.belongs_to(&domain.id) {
            debug!(
                domain = %domain.id,
                token_domain = ?validated.domain,
                "Subject token not issued for this tenant, skipping revocation check"
            );
            return Ok(validated);
        }

        if !self.is_live(&validated).await? {
            warn!(
                domain = %domain.id,
                token_type = %self.token_type(),
                jti = ?validated.token_id,
                "Subject token revoked or unknown"
            );
            return Err(ExchangeError::InvalidGrant(REVOKED.to_string()));
        }

        Ok(validated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{JwtTokenCodec, VerificationKey};
    use crate::repository::{InMemoryTokenStore, TokenRecord};
    use crate::testutil::{gateway_token, in_one_hour, GATEWAY_SECRET};
    use crate::validator::DefaultTokenValidator;
    use serde_json::json;

    async fn validator(token_type: TokenType) -> (DomainTokenValidator, Arc<InMemoryTokenStore>) {
        let codec = Arc::new(JwtTokenCodec::new(VerificationKey::hmac(GATEWAY_SECRET)));
        let store = Arc::new(InMemoryTokenStore::new());
        store.insert(TokenRecord::new("at-live")).await;

        let validator = DomainTokenValidator::new(
            Arc::new(DefaultTokenValidator::new(token_type, codec)),
            store.clone(),
            store.clone(),
        );
        (validator, store)
    }

    fn token(jti: &str, domain: &str) -> String {
        gateway_token(json!({
            "sub": "user-123",
            "jti": jti,
            "domain": domain,
            "exp": in_one_hour(),
        }))
    }

    #[tokio::test]
    async fn test_live_same_tenant_token() {
        let (validator, _) = validator(TokenType::AccessToken).await;
        let validated = validator
            .validate(
                &token("at-live", "acme"),
                &TokenExchangeSettings::default(),
                &Domain::new("acme", None),
            )
            .await
            .unwrap();

        assert_eq!(validated.token_id.as_deref(), Some("at-live"));
    }

    #[tokio::test]
    async fn test_revoked_same_tenant_token() {
        let (validator, store) = validator(TokenType::AccessToken).await;
        store.revoke("at-live").await;

        let err = validator
            .validate(
                &token("at-live", "acme"),
                &TokenExchangeSettings::default(),
                &Domain::new("acme", None),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ExchangeError::InvalidGrant(_)));
        assert_eq!(err.to_string(), "token has been revoked");
    }

    #[tokio::test]
    async fn test_other_tenant_skips_store() {
        let (validator, _) = validator(TokenType::RefreshToken).await;
        let validated = validator
            .validate(
                &token("unknown", "globex"),
                &TokenExchangeSettings::default(),
                &Domain::new("acme", None),
            )
            .await;

        assert!(validated.is_ok());
    }

    #[tokio::test]
    async fn test_same_tenant_id_token_is_always_revoked() {
        let (validator, _) = validator(TokenType::IdToken).await;
        let err = validator
            .validate(
                &token("at-live", "acme"),
                &TokenExchangeSettings::default(),
                &Domain::new("acme", None),
            )
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "token has been revoked");
    }
}

//! Local signature and claim validation

use super::TokenValidator;
use crate::{
    codec::TokenCodec,
    error::Result,
    settings::{Domain, TokenExchangeSettings},
    token_type::TokenType,
    validated_token::ValidatedToken,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Verifies subject tokens with the gateway's own key material
pub struct DefaultTokenValidator {
    token_type: TokenType,
    codec: Arc<dyn TokenCodec>,
}

impl DefaultTokenValidator {
    /// Create a validator for one token type
    pub fn new(token_type: TokenType, codec: Arc<dyn TokenCodec>) -> Self {
        Self { token_type, codec }
    }
}

#[async_trait]
impl TokenValidator for DefaultTokenValidator {
    fn token_type(&self) -> TokenType {
        self.token_type
    }

    async fn validate(
        &self,
        token: &str,
        _settings: &TokenExchangeSettings,
        _domain: &Domain,
    ) -> Result<ValidatedToken> {
        let claims = self.codec.verify(token, self.token_type)?;
        let validated = ValidatedToken::from_claims(claims, self.token_type)?;
        validated.validate_temporal()?;

        debug!(
            token_type = %self.token_type,
            jti = ?validated.token_id,
            "Subject token verified with local keys"
        );

        Ok(validated)
    }
}

//! Subject token validators
//!
//! Validators compose by decoration. Each layer adds one concern:
//!
//! ```text
//! TrustedIssuerTokenValidator   federation fallback on TokenVerification
//!   └─ DomainTokenValidator     same-tenant revocation check
//!        └─ DefaultTokenValidator   local signature + temporal claims
//! ```
//!
//! Only [`ExchangeError::TokenVerification`](crate::error::ExchangeError::TokenVerification)
//! from the inner layers triggers the trusted issuer fallback; business rule
//! failures ([`ExchangeError::InvalidGrant`](crate::error::ExchangeError::InvalidGrant))
//! propagate unchanged.

mod default;
mod domain;
mod trusted_issuer;

pub use default::DefaultTokenValidator;
pub use domain::DomainTokenValidator;
pub use trusted_issuer::TrustedIssuerTokenValidator;

use crate::{
    error::Result,
    settings::{Domain, TokenExchangeSettings},
    token_type::TokenType,
    validated_token::ValidatedToken,
};
use async_trait::async_trait;

/// Subject token validator for one token type
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Token type this validator handles
    fn token_type(&self) -> TokenType;

    /// Validate a subject token for the given tenant
    async fn validate(
        &self,
        token: &str,
        settings: &TokenExchangeSettings,
        domain: &Domain,
    ) -> Result<ValidatedToken>;
}

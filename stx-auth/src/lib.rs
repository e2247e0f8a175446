//! # stx-auth: OAuth 2.0 Token Exchange (RFC 8693) with Trusted-Issuer Federation
//!
//! This crate validates caller-presented subject tokens for the token
//! exchange grant and produces the identity a new access token is minted for.
//!
//! ## Features
//!
//! - **Local verification**: signature and temporal checks with the gateway's own keys
//! - **Revocation check**: same-tenant access/refresh tokens must still be live
//! - **Federation**: tokens from pre-registered external issuers (PEM or JWKS)
//! - **Scope mapping**: per-issuer translation of external scopes
//! - **User binding**: map an external identity onto exactly one domain user
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │           TOKEN ENDPOINT (out of scope)                 │
//! │  grant_type=urn:ietf:params:oauth:grant-type:           │
//! │             token-exchange                              │
//! └─────────────────────────────────────────────────────────┘
//!                       ↓
//!         ┌─────────────────────────────┐
//!         │   TokenExchangeService      │
//!         │   request checks, selects   │
//!         │   validator by token type   │
//!         └─────────────────────────────┘
//!                       ↓
//!         ┌─────────────────────────────┐
//!         │   Validator chain           │
//!         │   TrustedIssuer             │
//!         │    └─ Domain (revocation)   │
//!         │        └─ Default (local)   │
//!         └─────────────────────────────┘
//!                       ↓
//!         ┌─────────────────────────────┐
//!         │   TokenExchangeUserResolver │
//!         │   (trusted issuers only)    │
//!         └─────────────────────────────┘
//!                       ↓
//!         ┌─────────────────────────────┐
//!         │   ExchangeResult            │
//!         │   identity, scopes, expiry  │
//!         └─────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod claims;
pub mod codec;
pub mod config;
pub mod error;
pub mod exchange;
pub mod issuer_resolver;
pub mod repository;
pub mod settings;
pub mod token_type;
pub mod user_binding;
pub mod validated_token;
pub mod validator;

#[cfg(test)]
mod testutil;

// Re-exports for convenience
pub use codec::{JwtTokenCodec, KeyFamily, TokenCodec, VerificationKey};
pub use config::{Gateway, GatewayConfig, Tenant};
pub use error::{ExchangeError, OAuthErrorResponse, Result};
pub use exchange::{ExchangeResult, TokenExchangeRequest, TokenExchangeService};
pub use issuer_resolver::{ResolverOptions, TrustedIssuerResolver, VerificationEngine};
pub use repository::{
    AccessTokenStore, AttributeMatch, InMemoryTokenStore, InMemoryUserStore, RefreshTokenStore,
    TokenRecord, User, UserLookup,
};
pub use settings::{
    Client, Domain, KeyResolutionMethod, TokenExchangeSettings, TrustedIssuer,
    UserBindingCriterion,
};
pub use token_type::TokenType;
pub use user_binding::TokenExchangeUserResolver;
pub use validated_token::ValidatedToken;
pub use validator::{
    DefaultTokenValidator, DomainTokenValidator, TokenValidator, TrustedIssuerTokenValidator,
};

/// Token exchange grant type (RFC 8693 section 2.1)
pub const GRANT_TYPE_TOKEN_EXCHANGE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";

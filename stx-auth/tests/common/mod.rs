//! Common test utilities shared across integration tests

#![allow(dead_code)]

#[path = "../../src/testutil.rs"]
mod testutil;

pub use testutil::*;

use std::sync::Arc;
use stx_auth::{
    Domain, InMemoryTokenStore, InMemoryUserStore, JwtTokenCodec, TokenCodec,
    TokenExchangeService, TokenExchangeSettings, TrustedIssuer, TrustedIssuerResolver,
    VerificationKey,
};

pub const TENANT: &str = "acme";

/// Trusted issuer entry with the test issuer's PEM key
pub fn trusted(issuer: &TestIssuer) -> TrustedIssuer {
    TrustedIssuer::pem(issuer.issuer.clone(), issuer.public_pem())
}

/// Service wired with in-memory collaborators
pub struct TestGateway {
    pub service: TokenExchangeService,
    pub resolver: Arc<TrustedIssuerResolver>,
    pub access_tokens: Arc<InMemoryTokenStore>,
    pub refresh_tokens: Arc<InMemoryTokenStore>,
    pub users: Arc<InMemoryUserStore>,
}

impl TestGateway {
    pub fn new() -> Self {
        let codec: Arc<dyn TokenCodec> =
            Arc::new(JwtTokenCodec::new(VerificationKey::hmac(GATEWAY_SECRET)));
        let resolver = Arc::new(TrustedIssuerResolver::new().expect("resolver"));
        let access_tokens = Arc::new(InMemoryTokenStore::new());
        let refresh_tokens = Arc::new(InMemoryTokenStore::new());
        let users = Arc::new(InMemoryUserStore::new());

        let service = TokenExchangeService::with_standard_validators(
            codec,
            resolver.clone(),
            access_tokens.clone(),
            refresh_tokens.clone(),
            users.clone(),
        );

        Self {
            service,
            resolver,
            access_tokens,
            refresh_tokens,
            users,
        }
    }
}

/// Tenant accepting every subject token type
pub fn tenant(trusted_issuers: Vec<TrustedIssuer>) -> Domain {
    Domain::new(
        TENANT,
        Some(TokenExchangeSettings {
            enabled: true,
            allowed_subject_token_types: stx_auth::TokenType::ALL
                .iter()
                .map(|t| t.urn().to_string())
                .collect(),
            trusted_issuers,
        }),
    )
}

/// Setup logging for tests
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

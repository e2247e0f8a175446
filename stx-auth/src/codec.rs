//! Local token codec
//!
//! Verifies tokens signed with the gateway's own key material.

use crate::{
    claims::Claims,
    error::{ExchangeError, Result},
    token_type::TokenType,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::collections::HashMap;
use tracing::debug;

/// Local token codec
///
/// Implementations verify a token with the key material configured for its
/// category. Temporal claims are *not* checked here; validators apply the
/// exchange rules themselves.
pub trait TokenCodec: Send + Sync {
    /// Verify signature and structure, returning the claim set
    ///
    /// Fails with [`ExchangeError::TokenVerification`].
    fn verify(&self, token: &str, token_type: TokenType) -> Result<Claims>;

    /// Decode the claim set without verifying the signature
    ///
    /// Only used to read `iss` before the trusted issuer fallback.
    fn decode_unverified(&self, token: &str) -> Result<Claims>;
}

/// Public key family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    /// Shared secret
    Hmac,
    /// RSA
    Rsa,
    /// NIST elliptic curve
    Ec,
    /// Ed25519
    Ed,
}

impl KeyFamily {
    /// Algorithms accepted for this family
    pub fn algorithms(&self) -> &'static [Algorithm] {
        match self {
            KeyFamily::Hmac => &[Algorithm::HS256, Algorithm::HS384, Algorithm::HS512],
            KeyFamily::Rsa => &[
                Algorithm::RS256,
                Algorithm::RS384,
                Algorithm::RS512,
                Algorithm::PS256,
                Algorithm::PS384,
                Algorithm::PS512,
            ],
            KeyFamily::Ec => &[Algorithm::ES256, Algorithm::ES384],
            KeyFamily::Ed => &[Algorithm::EdDSA],
        }
    }

    /// Whether `alg` may be used with this family
    pub fn accepts(&self, alg: Algorithm) -> bool {
        self.algorithms().contains(&alg)
    }
}

/// Parse a PEM public key or X.509 certificate
///
/// RSA, EC and Ed25519 keys are recognised, in that order.
pub fn decoding_key_from_pem(pem: &str) -> Result<(KeyFamily, DecodingKey)> {
    let bytes = pem.trim().as_bytes();

    if let Ok(key) = DecodingKey::from_rsa_pem(bytes) {
        return Ok((KeyFamily::Rsa, key));
    }
    if let Ok(key) = DecodingKey::from_ec_pem(bytes) {
        return Ok((KeyFamily::Ec, key));
    }
    if let Ok(key) = DecodingKey::from_ed_pem(bytes) {
        return Ok((KeyFamily::Ed, key));
    }

    Err(ExchangeError::Configuration(
        "Invalid PEM certificate: no RSA, EC or Ed25519 public key found".to_string(),
    ))
}

/// Validation settings shared by local and federated verification
///
/// Signature and algorithm are enforced; `exp`, `nbf`, `aud` and required
/// claims are left to the exchange rules.
pub(crate) fn signature_only_validation(algorithms: &[Algorithm]) -> Validation {
    let mut validation = Validation::new(algorithms.first().copied().unwrap_or(Algorithm::HS256));
    validation.algorithms = algorithms.to_vec();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    validation
}

/// Verification key for one token category
#[derive(Clone)]
pub struct VerificationKey {
    key: DecodingKey,
    family: KeyFamily,
}

impl VerificationKey {
    /// Shared HMAC secret (HS256/384/512)
    pub fn hmac(secret: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            family: KeyFamily::Hmac,
        }
    }

    /// Public key or certificate in PEM form
    pub fn from_pem(pem: &str) -> Result<Self> {
        let (family, key) = decoding_key_from_pem(pem)?;
        Ok(Self { key, family })
    }

    /// Key family
    pub fn family(&self) -> KeyFamily {
        self.family
    }
}

impl std::fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationKey")
            .field("family", &self.family)
            .finish_non_exhaustive()
    }
}

/// JWT codec backed by `jsonwebtoken`
///
/// One default key, optionally overridden per token category.
#[derive(Debug, Clone)]
pub struct JwtTokenCodec {
    default_key: VerificationKey,
    category_keys: HashMap<TokenType, VerificationKey>,
}

impl JwtTokenCodec {
    /// Create a codec using one key for every category
    pub fn new(default_key: VerificationKey) -> Self {
        Self {
            default_key,
            category_keys: HashMap::new(),
        }
    }

    /// Use a dedicated key for one category
    pub fn with_category_key(mut self, token_type: TokenType, key: VerificationKey) -> Self {
        self.category_keys.insert(token_type, key);
        self
    }

    fn key_for(&self, token_type: TokenType) -> &VerificationKey {
        self.category_keys
            .get(&token_type)
            .unwrap_or(&self.default_key)
    }
}

impl TokenCodec for JwtTokenCodec {
    fn verify(&self, token: &str, token_type: TokenType) -> Result<Claims> {
        let key = self.key_for(token_type);
        let validation = signature_only_validation(key.family.algorithms());

        decode::<Claims>(token, &key.key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(
                    token_type = %token_type,
                    reason = ?e.kind(),
                    "Local signature verification failed"
                );
                ExchangeError::TokenVerification(format!("Invalid {}", token_type.urn()))
            })
    }

    fn decode_unverified(&self, token: &str) -> Result<Claims> {
        let mut validation = signature_only_validation(&[Algorithm::HS256]);
        validation.insecure_disable_signature_validation();

        decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map(|data| data.claims)
            .map_err(|e| ExchangeError::TokenVerification(format!("Malformed token: {}", e)))
    }
}

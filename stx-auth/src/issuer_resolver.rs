//! Trusted issuer resolution
//!
//! Verifies subject tokens against the key material registered for a trusted
//! external issuer.
//!
//! # Cache Strategy
//!
//! Verification engines are built lazily, once per issuer configuration, and
//! live for the lifetime of the resolver:
//!
//! ```text
//! resolve(token, trusted_issuer)
//!   → cache key = (issuer, sha256(method, certificate, jwks_uri))
//!   → hit?  verify with cached engine
//!   → miss? build engine (parse PEM / fetch JWKS) exactly once, then verify
//! ```
//!
//! Because the key includes a fingerprint of the key configuration, an edited
//! certificate or JWKS URL never reuses a stale engine. [`TrustedIssuerResolver::invalidate`]
//! drops the engines of one issuer explicitly (key rotation behind an
//! unchanged JWKS URL, or removing old fingerprints).

use crate::{
    claims::Claims,
    codec::{decoding_key_from_pem, signature_only_validation, KeyFamily},
    error::{ExchangeError, Result},
    settings::{KeyResolutionMethod, TrustedIssuer},
};
use dashmap::DashMap;
use jsonwebtoken::{
    decode, decode_header,
    jwk::{AlgorithmParameters, JwkSet, PublicKeyUse},
    DecodingKey,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Default JWKS fetch timeout
pub const DEFAULT_JWKS_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolver options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverOptions {
    /// Upper bound for fetching a JWKS document
    #[serde(with = "humantime_serde", default = "default_jwks_timeout")]
    pub jwks_timeout: Duration,
}

fn default_jwks_timeout() -> Duration {
    DEFAULT_JWKS_TIMEOUT
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            jwks_timeout: DEFAULT_JWKS_TIMEOUT,
        }
    }
}

struct EngineKey {
    kid: Option<String>,
    family: KeyFamily,
    key: DecodingKey,
}

/// Signature verifier for one trusted issuer configuration
pub struct VerificationEngine {
    issuer: String,
    keys: Vec<EngineKey>,
}

impl VerificationEngine {
    /// Build from an inline PEM certificate or public key
    pub fn from_pem(issuer: &str, pem: &str) -> Result<Self> {
        let (family, key) = decoding_key_from_pem(pem).map_err(|_| {
            ExchangeError::Configuration(format!("Invalid certificate for trusted issuer {}", issuer))
        })?;

        Ok(Self {
            issuer: issuer.to_string(),
            keys: vec![EngineKey {
                kid: None,
                family,
                key,
            }],
        })
    }

    /// Build from a JSON Web Key Set
    ///
    /// Encryption keys and symmetric keys are skipped.
    pub fn from_jwks(issuer: &str, jwks: &JwkSet) -> Result<Self> {
        let mut keys = Vec::new();

        for jwk in &jwks.keys {
            if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
                continue;
            }

            let family = match &jwk.algorithm {
                AlgorithmParameters::RSA(_) => KeyFamily::Rsa,
                AlgorithmParameters::EllipticCurve(_) => KeyFamily::Ec,
                AlgorithmParameters::OctetKeyPair(_) => KeyFamily::Ed,
                AlgorithmParameters::OctetKey(_) => {
                    debug!(issuer = %issuer, kid = ?jwk.common.key_id, "Skipping symmetric JWK");
                    continue;
                }
            };

            match DecodingKey::from_jwk(jwk) {
                Ok(key) => keys.push(EngineKey {
                    kid: jwk.common.key_id.clone(),
                    family,
                    key,
                }),
                Err(e) => {
                    warn!(issuer = %issuer, kid = ?jwk.common.key_id, error = %e, "Skipping unusable JWK");
                }
            }
        }

        if keys.is_empty() {
            return Err(ExchangeError::Configuration(format!(
                "JWKS for trusted issuer {} contains no usable signing key",
                issuer
            )));
        }

        Ok(Self {
            issuer: issuer.to_string(),
            keys,
        })
    }

    /// Issuer this engine verifies for
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Number of keys held
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Verify the token signature and return its claims
    ///
    /// A `kid` in the header narrows the candidate keys when it matches one.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let header = decode_header(token).map_err(|_| {
            ExchangeError::InvalidGrant(format!(
                "Malformed token for trusted issuer {}",
                self.issuer
            ))
        })?;

        let kid_matches = |k: &&EngineKey| match (&header.kid, &k.kid) {
            (Some(wanted), Some(kid)) => wanted == kid,
            _ => false,
        };
        let mut candidates: Vec<&EngineKey> = self.keys.iter().filter(kid_matches).collect();
        if candidates.is_empty() {
            candidates = self.keys.iter().collect();
        }

        let mut algorithm_accepted = false;
        for key in candidates {
            if !key.family.accepts(header.alg) {
                continue;
            }
            algorithm_accepted = true;

            let mut validation = signature_only_validation(&[header.alg]);
            validation.set_issuer(&[self.issuer.as_str()]);

            match decode::<Claims>(token, &key.key, &validation) {
                Ok(data) => return Ok(data.claims),
                Err(e) => {
                    debug!(issuer = %self.issuer, kid = ?key.kid, reason = ?e.kind(), "Trusted issuer key rejected token");
                }
            }
        }

        if !algorithm_accepted {
            return Err(ExchangeError::InvalidGrant(format!(
                "Algorithm {:?} is not accepted for trusted issuer {}",
                header.alg, self.issuer
            )));
        }

        Err(ExchangeError::InvalidGrant(format!(
            "Signature verification failed for trusted issuer {}",
            self.issuer
        )))
    }
}

type CacheKey = (String, String);

/// Trusted issuer resolver
///
/// Safe to share across concurrent exchanges; engine creation is
/// single-assignment per cache key.
pub struct TrustedIssuerResolver {
    engines: DashMap<CacheKey, Arc<OnceCell<Arc<VerificationEngine>>>>,
    http_client: reqwest::Client,
    options: ResolverOptions,
}

impl TrustedIssuerResolver {
    /// Create a resolver with default options
    pub fn new() -> Result<Self> {
        Self::with_options(ResolverOptions::default())
    }

    /// Create a resolver with the given options
    pub fn with_options(options: ResolverOptions) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(options.jwks_timeout)
            .build()
            .map_err(|e| ExchangeError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            engines: DashMap::new(),
            http_client,
            options,
        })
    }

    /// Verify `token` against the trusted issuer's key material
    pub async fn resolve(&self, token: &str, trusted_issuer: &TrustedIssuer) -> Result<Claims> {
        let engine = self.engine_for(trusted_issuer).await?;
        engine.verify(token)
    }

    /// Get or build the verification engine for a trusted issuer
    pub async fn engine_for(&self, trusted_issuer: &TrustedIssuer) -> Result<Arc<VerificationEngine>> {
        let cache_key = (
            trusted_issuer.issuer.clone(),
            key_fingerprint(trusted_issuer),
        );

        // Clone the cell out so no shard lock is held across the build
        let cell = self.engines.entry(cache_key).or_default().value().clone();

        if let Some(engine) = cell.get() {
            debug!(issuer = %trusted_issuer.issuer, "Verification engine cache hit");
            return Ok(engine.clone());
        }

        let engine = cell
            .get_or_try_init(|| self.build_engine(trusted_issuer))
            .await?;

        Ok(engine.clone())
    }

    async fn build_engine(&self, trusted_issuer: &TrustedIssuer) -> Result<Arc<VerificationEngine>> {
        let issuer = trusted_issuer.issuer.as_str();

        let engine = match &trusted_issuer.key_resolution_method {
            KeyResolutionMethod::Pem => {
                let pem = trusted_issuer.certificate.as_deref().ok_or_else(|| {
                    ExchangeError::Configuration(format!(
                        "Trusted issuer {} uses PEM but has no certificate",
                        issuer
                    ))
                })?;
                VerificationEngine::from_pem(issuer, pem)?
            }
            KeyResolutionMethod::JwksUrl => {
                let uri = trusted_issuer.jwks_uri.as_deref().ok_or_else(|| {
                    ExchangeError::Configuration(format!(
                        "Trusted issuer {} uses JWKS_URL but has no jwks_uri",
                        issuer
                    ))
                })?;
                let jwks = self.fetch_jwks(issuer, uri).await?;
                VerificationEngine::from_jwks(issuer, &jwks)?
            }
            KeyResolutionMethod::Unsupported(method) => {
                return Err(ExchangeError::Configuration(format!(
                    "Unsupported key resolution method '{}' for trusted issuer {}",
                    method, issuer
                )));
            }
        };

        info!(
            issuer = %issuer,
            method = %trusted_issuer.key_resolution_method,
            keys = engine.key_count(),
            "Verification engine created"
        );

        Ok(Arc::new(engine))
    }

    async fn fetch_jwks(&self, issuer: &str, uri: &str) -> Result<JwkSet> {
        debug!(issuer = %issuer, jwks_uri = %uri, "Fetching JWKS");

        let fetch = async {
            let response = self.http_client.get(uri).send().await?.error_for_status()?;
            response.json::<JwkSet>().await
        };

        match tokio::time::timeout(self.options.jwks_timeout, fetch).await {
            Ok(Ok(jwks)) => Ok(jwks),
            Ok(Err(e)) => {
                warn!(issuer = %issuer, error = %e, "JWKS fetch failed");
                Err(e.into())
            }
            Err(_) => {
                warn!(issuer = %issuer, timeout = ?self.options.jwks_timeout, "JWKS fetch timed out");
                Err(ExchangeError::Configuration(format!(
                    "JWKS fetch for trusted issuer {} timed out",
                    issuer
                )))
            }
        }
    }

    /// Drop every cached engine of an issuer
    ///
    /// Returns the number of engines removed.
    pub fn invalidate(&self, issuer: &str) -> usize {
        let before = self.engines.len();
        self.engines.retain(|(cached_issuer, _), _| cached_issuer != issuer);
        let removed = before.saturating_sub(self.engines.len());
        if removed > 0 {
            info!(issuer = %issuer, removed, "Verification engines invalidated");
        }
        removed
    }

    /// Drop every cached engine
    pub fn clear(&self) {
        self.engines.clear();
    }

    /// Number of built engines
    pub fn cached_engines(&self) -> usize {
        self.engines
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }
}

/// Fingerprint of a trusted issuer's key configuration
fn key_fingerprint(trusted_issuer: &TrustedIssuer) -> String {
    let mut hasher = Sha256::new();
    hasher.update(trusted_issuer.key_resolution_method.to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(trusted_issuer.certificate.as_deref().unwrap_or_default().trim().as_bytes());
    hasher.update([0u8]);
    hasher.update(trusted_issuer.jwks_uri.as_deref().unwrap_or_default().as_bytes());
    hex::encode(hasher.finalize())
}

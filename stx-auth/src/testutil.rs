//! Test fixtures: Ed25519 trusted issuers and HS256 gateway tokens
//!
//! Shared with the integration tests through `tests/common`.

#![allow(dead_code)]

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use ed25519_compact::{KeyPair, Seed};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rand::RngCore;
use serde_json::{json, Value};

/// HS256 secret of the gateway's own keys in tests
pub const GATEWAY_SECRET: &[u8] = b"gateway-test-secret";

const ED25519_SPKI_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];
const ED25519_PKCS8_PREFIX: [u8; 16] = [
    0x30, 0x2e, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x04, 0x22, 0x04, 0x20,
];

/// External issuer signing with a fresh Ed25519 key
pub struct TestIssuer {
    pub issuer: String,
    pub kid: Option<String>,
    public_key: Vec<u8>,
    encoding_key: EncodingKey,
}

impl TestIssuer {
    pub fn new(issuer: &str) -> Self {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        let keypair = KeyPair::from_seed(Seed::from_slice(&seed).unwrap());

        let mut pkcs8 = ED25519_PKCS8_PREFIX.to_vec();
        pkcs8.extend_from_slice(&seed);

        Self {
            issuer: issuer.to_string(),
            kid: None,
            public_key: keypair.pk.as_ref().to_vec(),
            encoding_key: EncodingKey::from_ed_der(&pkcs8),
        }
    }

    pub fn with_kid(issuer: &str, kid: &str) -> Self {
        let mut test_issuer = Self::new(issuer);
        test_issuer.kid = Some(kid.to_string());
        test_issuer
    }

    /// SubjectPublicKeyInfo PEM
    pub fn public_pem(&self) -> String {
        let mut der = ED25519_SPKI_PREFIX.to_vec();
        der.extend_from_slice(&self.public_key);
        format!(
            "-----BEGIN PUBLIC KEY-----\n{}\n-----END PUBLIC KEY-----\n",
            STANDARD.encode(der)
        )
    }

    pub fn jwks(&self) -> Value {
        json!({
            "keys": [{
                "kty": "OKP",
                "crv": "Ed25519",
                "use": "sig",
                "alg": "EdDSA",
                "kid": self.kid,
                "x": URL_SAFE_NO_PAD.encode(&self.public_key),
            }]
        })
    }

    pub fn sign(&self, claims: Value) -> String {
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = self.kid.clone();
        encode(&header, &claims, &self.encoding_key).unwrap()
    }
}

/// Token signed with the gateway's own HS256 secret
pub fn gateway_token(claims: Value) -> String {
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(GATEWAY_SECRET),
    )
    .unwrap()
}

pub fn in_one_hour() -> i64 {
    chrono::Utc::now().timestamp() + 3600
}

pub fn one_hour_ago() -> i64 {
    chrono::Utc::now().timestamp() - 3600
}

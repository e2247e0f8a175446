//! RFC 8693 token types

use serde::{Deserialize, Serialize};
use std::fmt;

/// `urn:ietf:params:oauth:token-type:access_token`
pub const ACCESS_TOKEN_URN: &str = "urn:ietf:params:oauth:token-type:access_token";

/// `urn:ietf:params:oauth:token-type:refresh_token`
pub const REFRESH_TOKEN_URN: &str = "urn:ietf:params:oauth:token-type:refresh_token";

/// `urn:ietf:params:oauth:token-type:id_token`
pub const ID_TOKEN_URN: &str = "urn:ietf:params:oauth:token-type:id_token";

/// `urn:ietf:params:oauth:token-type:jwt`
pub const JWT_URN: &str = "urn:ietf:params:oauth:token-type:jwt";

/// Token category
///
/// Selects the local key material used to verify a subject token and which
/// token store (if any) backs the revocation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Access token issued by this gateway
    AccessToken,

    /// Refresh token issued by this gateway
    RefreshToken,

    /// OpenID Connect ID token
    IdToken,

    /// Generic signed JWT
    Jwt,
}

impl TokenType {
    /// All token types, in registration order
    pub const ALL: [TokenType; 4] = [
        TokenType::AccessToken,
        TokenType::RefreshToken,
        TokenType::IdToken,
        TokenType::Jwt,
    ];

    /// URN identifying this token type
    pub fn urn(&self) -> &'static str {
        match self {
            TokenType::AccessToken => ACCESS_TOKEN_URN,
            TokenType::RefreshToken => REFRESH_TOKEN_URN,
            TokenType::IdToken => ID_TOKEN_URN,
            TokenType::Jwt => JWT_URN,
        }
    }

    /// Parse a token type URN
    pub fn from_urn(urn: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.urn() == urn)
    }

    /// Token types this gateway can issue through an exchange
    pub fn is_issuable(&self) -> bool {
        matches!(self, TokenType::AccessToken)
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.urn())
    }
}

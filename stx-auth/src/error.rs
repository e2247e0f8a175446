//! Error types for token exchange

use serde::{Deserialize, Serialize};

/// Result type for token exchange operations
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// Token exchange errors
///
/// The first three variants are the OAuth2-facing kinds. Callers must branch
/// on the variant, never on the message: the trusted issuer fallback only
/// runs for [`ExchangeError::TokenVerification`].
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// Malformed exchange parameters (client-fixable)
    #[error("{0}")]
    InvalidRequest(String),

    /// Well-formed subject token rejected by a business rule
    #[error("{0}")]
    InvalidGrant(String),

    /// Subject token could not be verified with the gateway's own keys
    #[error("{0}")]
    TokenVerification(String),

    /// Invalid trusted issuer or gateway configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Token store or user lookup failure
    #[error("Store error: {0}")]
    Store(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExchangeError {
    /// Short name of the error kind, for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            ExchangeError::InvalidRequest(_) => "invalid_request",
            ExchangeError::InvalidGrant(_) => "invalid_grant",
            ExchangeError::TokenVerification(_) => "token_verification",
            ExchangeError::Configuration(_) => "configuration",
            ExchangeError::Store(_) => "store",
            ExchangeError::Internal(_) => "internal",
        }
    }

    /// OAuth2 error code (RFC 6749 section 5.2)
    pub fn error_code(&self) -> &'static str {
        match self {
            ExchangeError::InvalidRequest(_) => "invalid_request",
            ExchangeError::InvalidGrant(_) | ExchangeError::TokenVerification(_) => {
                "invalid_grant"
            }
            ExchangeError::Configuration(_)
            | ExchangeError::Store(_)
            | ExchangeError::Internal(_) => "server_error",
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            ExchangeError::InvalidRequest(_) => 400,
            ExchangeError::InvalidGrant(_) => 400,
            ExchangeError::TokenVerification(_) => 400,
            ExchangeError::Configuration(_) => 500,
            ExchangeError::Store(_) => 500,
            ExchangeError::Internal(_) => 500,
        }
    }

    /// Check if error is retryable
    ///
    /// Nothing in this crate retries; this only informs callers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExchangeError::Store(_))
    }

    /// Whether the error is a verification failure eligible for federation fallback
    pub fn is_token_verification(&self) -> bool {
        matches!(self, ExchangeError::TokenVerification(_))
    }

    /// Render as an OAuth2 error body
    pub fn to_response(&self) -> OAuthErrorResponse {
        let description = match self {
            ExchangeError::Configuration(_)
            | ExchangeError::Store(_)
            | ExchangeError::Internal(_) => "The token exchange could not be processed".to_string(),
            other => other.to_string(),
        };

        OAuthErrorResponse {
            error: self.error_code().to_string(),
            error_description: Some(description),
        }
    }
}

/// OAuth2 error response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthErrorResponse {
    /// Error code
    pub error: String,

    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl actix_web::error::ResponseError for ExchangeError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        actix_web::http::StatusCode::from_u16(ExchangeError::status_code(self))
            .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> actix_web::HttpResponse {
        actix_web::HttpResponse::build(actix_web::error::ResponseError::status_code(self))
            .insert_header((actix_web::http::header::CACHE_CONTROL, "no-store"))
            .json(self.to_response())
    }
}

// Conversions from common error types
impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::Internal(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        ExchangeError::Configuration(format!("Key material fetch failed: {}", err))
    }
}

impl From<toml::de::Error> for ExchangeError {
    fn from(err: toml::de::Error) -> Self {
        ExchangeError::Configuration(format!("Failed to parse config: {}", err))
    }
}

impl From<std::io::Error> for ExchangeError {
    fn from(err: std::io::Error) -> Self {
        ExchangeError::Configuration(format!("Failed to read config: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::ResponseError;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ExchangeError::InvalidRequest("x".into()).error_code(),
            "invalid_request"
        );
        assert_eq!(
            ExchangeError::InvalidGrant("x".into()).error_code(),
            "invalid_grant"
        );
        // Verification failures surface as invalid_grant
        assert_eq!(
            ExchangeError::TokenVerification("x".into()).error_code(),
            "invalid_grant"
        );
        assert_eq!(
            ExchangeError::Configuration("x".into()).error_code(),
            "server_error"
        );
    }

    #[test]
    fn test_response_hides_internal_details() {
        let response = ExchangeError::Store("connection refused on 10.0.0.3".into()).to_response();
        assert_eq!(response.error, "server_error");
        assert!(!response
            .error_description
            .unwrap()
            .contains("10.0.0.3"));

        let response = ExchangeError::InvalidGrant("token has been revoked".into()).to_response();
        assert_eq!(
            response.error_description.as_deref(),
            Some("token has been revoked")
        );
    }

    #[test]
    fn test_actix_response() {
        let err = ExchangeError::InvalidRequest("subject_token is required".into());
        let response = err.error_response();
        assert_eq!(response.status().as_u16(), 400);

        let err = ExchangeError::Internal("boom".into());
        assert_eq!(ResponseError::status_code(&err).as_u16(), 500);
    }

    #[test]
    fn test_retryable() {
        assert!(ExchangeError::Store("timeout".into()).is_retryable());
        assert!(!ExchangeError::InvalidGrant("expired".into()).is_retryable());
    }
}

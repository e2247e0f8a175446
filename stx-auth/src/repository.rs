//! Token stores and user lookup
//!
//! These are collaborators owned by the surrounding gateway. The traits are
//! what the exchange pipeline queries; the in-memory implementations back
//! tests and offline runs of the CLI.

use crate::{claims::Claims, error::Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Live token record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Token identifier (`jti`)
    pub token_id: String,

    /// Client the token was issued to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Subject the token was issued for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Expiration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenRecord {
    /// Record with only an identifier
    pub fn new(token_id: impl Into<String>) -> Self {
        Self {
            token_id: token_id.into(),
            client_id: None,
            subject: None,
            expires_at: None,
        }
    }
}

/// Issued access tokens
#[async_trait]
pub trait AccessTokenStore: Send + Sync {
    /// Find a live access token by its identifier
    async fn find_by_token_id(&self, token_id: &str) -> Result<Option<TokenRecord>>;
}

/// Issued refresh tokens
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Find a live refresh token by its identifier
    async fn find_by_token_id(&self, token_id: &str) -> Result<Option<TokenRecord>>;
}

/// Domain user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// User identifier
    pub id: String,

    /// Username
    pub username: String,

    /// Email
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Additional attributes and metadata
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub additional_information: Claims,
}

impl User {
    /// Create a user
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            email: None,
            additional_information: Claims::new(),
        }
    }

    /// Set the email
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Add an attribute
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.additional_information.insert(name.into(), value.into());
        self
    }

    /// Read an attribute as a string
    ///
    /// `id`, `username` and `email` are built in; anything else is read from
    /// `additional_information`.
    pub fn attribute(&self, name: &str) -> Option<String> {
        match name {
            "id" => Some(self.id.clone()),
            "username" => Some(self.username.clone()),
            "email" => self.email.clone(),
            other => match self.additional_information.get(other)? {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Null => None,
                value => Some(value.to_string()),
            },
        }
    }
}

/// One attribute/value pair a user must match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMatch {
    /// User attribute
    pub attribute: String,

    /// Required value
    pub value: String,
}

impl AttributeMatch {
    /// Create a match
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }
}

/// Domain user lookup
#[async_trait]
pub trait UserLookup: Send + Sync {
    /// Find users of the domain matching *all* criteria
    async fn find_by_criteria(&self, domain_id: &str, criteria: &[AttributeMatch]) -> Result<Vec<User>>;
}

/// In-memory token store
///
/// Serves both as access and refresh token store.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    tokens: RwLock<HashMap<String, TokenRecord>>,
}

impl InMemoryTokenStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a token record
    pub async fn insert(&self, record: TokenRecord) {
        self.tokens
            .write()
            .await
            .insert(record.token_id.clone(), record);
    }

    /// Remove a token (revocation)
    pub async fn revoke(&self, token_id: &str) -> bool {
        self.tokens.write().await.remove(token_id).is_some()
    }

    async fn find(&self, token_id: &str) -> Option<TokenRecord> {
        self.tokens.read().await.get(token_id).cloned()
    }
}

#[async_trait]
impl AccessTokenStore for InMemoryTokenStore {
    async fn find_by_token_id(&self, token_id: &str) -> Result<Option<TokenRecord>> {
        Ok(self.find(token_id).await)
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryTokenStore {
    async fn find_by_token_id(&self, token_id: &str) -> Result<Option<TokenRecord>> {
        Ok(self.find(token_id).await)
    }
}

/// In-memory user directory
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<String, Vec<User>>>,
}

impl InMemoryUserStore {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user to a domain
    pub async fn insert(&self, domain_id: impl Into<String>, user: User) {
        self.users
            .write()
            .await
            .entry(domain_id.into())
            .or_default()
            .push(user);
    }
}

#[async_trait]
impl UserLookup for InMemoryUserStore {
    async fn find_by_criteria(&self, domain_id: &str, criteria: &[AttributeMatch]) -> Result<Vec<User>> {
        let users = self.users.read().await;
        let Some(domain_users) = users.get(domain_id) else {
            return Ok(Vec::new());
        };

        Ok(domain_users
            .iter()
            .filter(|user| {
                criteria
                    .iter()
                    .all(|c| user.attribute(&c.attribute).as_deref() == Some(c.value.as_str()))
            })
            .cloned()
            .collect())
    }
}

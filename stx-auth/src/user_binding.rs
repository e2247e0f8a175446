//! User binding
//!
//! Maps an identity verified by a trusted issuer onto exactly one user of the
//! local domain. Each binding criterion pairs a user attribute with a claim
//! expression; all criteria must match the same user.
//!
//! # Claim expressions
//!
//! | Expression | Resolves to |
//! |---|---|
//! | `email` | the `email` claim (exact claim names always win) |
//! | `address.country` | nested object member |
//! | `/groups/0` | JSON Pointer into the claim set |
//! | `{{ given_name }}.{{ family_name }}` | rendered template |

use crate::{
    claims::Claims,
    error::{ExchangeError, Result},
    repository::{AttributeMatch, User, UserLookup},
    settings::TrustedIssuer,
    validated_token::ValidatedToken,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Binds trusted issuer identities to domain users
pub struct TokenExchangeUserResolver {
    users: Arc<dyn UserLookup>,
}

impl TokenExchangeUserResolver {
    /// Create a resolver backed by the given user lookup
    pub fn new(users: Arc<dyn UserLookup>) -> Self {
        Self { users }
    }

    /// Resolve the domain user for a validated token
    ///
    /// Returns `Ok(None)` when binding is not configured for the issuer.
    pub async fn resolve(
        &self,
        token: &ValidatedToken,
        trusted_issuer: Option<&TrustedIssuer>,
        domain_id: &str,
    ) -> Result<Option<User>> {
        let Some(trusted_issuer) = trusted_issuer else {
            return Ok(None);
        };
        if !trusted_issuer.user_binding_enabled || trusted_issuer.user_binding_criteria.is_empty() {
            return Ok(None);
        }

        if token.claims.is_empty() {
            return Err(ExchangeError::InvalidGrant(
                "User binding failed: no claims available".to_string(),
            ));
        }

        let mut criteria = Vec::with_capacity(trusted_issuer.user_binding_criteria.len());
        for criterion in &trusted_issuer.user_binding_criteria {
            let value = evaluate_expression(&criterion.expression, &token.claims);
            let value = match value {
                None | Some(Value::Null) => {
                    return Err(ExchangeError::InvalidGrant(format!(
                        "User binding criterion '{}' evaluated to null",
                        criterion.attribute
                    )));
                }
                Some(value) => render_value(&value),
            };

            if value.trim().is_empty() {
                return Err(ExchangeError::InvalidGrant(format!(
                    "User binding criterion '{}' evaluated to empty value",
                    criterion.attribute
                )));
            }

            criteria.push(AttributeMatch::new(criterion.attribute.clone(), value));
        }

        let mut users = self.users.find_by_criteria(domain_id, &criteria).await?;

        match users.len() {
            0 => {
                warn!(issuer = %trusted_issuer.issuer, domain = %domain_id, "No domain user matches token binding");
                Err(ExchangeError::InvalidGrant(
                    "No domain user found for token binding".to_string(),
                ))
            }
            1 => {
                let user = users.remove(0);
                debug!(issuer = %trusted_issuer.issuer, user_id = %user.id, "Token bound to domain user");
                Ok(Some(user))
            }
            count => {
                warn!(issuer = %trusted_issuer.issuer, domain = %domain_id, count, "Ambiguous token binding");
                Err(ExchangeError::InvalidGrant(
                    "Multiple domain users match token binding".to_string(),
                ))
            }
        }
    }
}

/// Evaluate a claim expression against a claim set
pub fn evaluate_expression(expression: &str, claims: &Claims) -> Option<Value> {
    let expression = expression.trim();

    if let Some(value) = claims.get(expression) {
        return Some(value.clone());
    }

    if expression.contains("{{") {
        return render_template(expression, claims);
    }

    lookup_path(expression, claims)
}

fn lookup_path(path: &str, claims: &Claims) -> Option<Value> {
    if path.starts_with('/') {
        return Value::Object(claims.clone()).pointer(path).cloned();
    }

    let mut segments = path.split('.');
    let mut current = claims.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current.clone())
}

/// Render `{{ path }}` placeholders
///
/// A template consisting of exactly one placeholder yields the raw value.
/// Any placeholder that resolves to nothing or null makes the whole
/// template unresolved.
fn render_template(template: &str, claims: &Claims) -> Option<Value> {
    if let Some(path) = sole_placeholder(template) {
        return lookup_path(path, claims).filter(|v| !v.is_null());
    }

    let mut rendered = String::new();
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        let path = rest[start + 2..start + 2 + len].trim();
        let value = lookup_path(path, claims).filter(|v| !v.is_null())?;

        rendered.push_str(&rest[..start]);
        rendered.push_str(&render_value(&value));
        rest = &rest[start + 4 + len..];
    }
    rendered.push_str(rest);

    Some(Value::String(rendered))
}

/// Path of a template that is nothing but one `{{ path }}`
fn sole_placeholder(template: &str) -> Option<&str> {
    let inner = template.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

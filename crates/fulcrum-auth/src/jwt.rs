//! JWT validation and claims extraction.
//!
//! This module provides the core JWT validation logic, including signature
//! verification and claims validation, and maps validated claims onto a
//! [`fulcrum_core::Identity`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde::Deserialize;

use fulcrum_core::Identity;

use crate::error::{AuthError, Result};
use crate::jwks::JwksProvider;
use crate::AuthConfig;

/// Which kind of caller a validated token authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// A human or service user, identified by an opaque user id.
    User,
    /// An agent, identified by its `AgentId`.
    Agent,
}

/// Validated claims extracted from a JWT.
#[derive(Debug, Clone)]
pub struct ValidatedClaims {
    /// The subject claim: a user id or an agent id, per `role`.
    pub subject: String,
    /// Whether `subject` names a user or an agent.
    pub role: Role,
    /// When the token expires.
    pub expires_at: DateTime<Utc>,
}

impl ValidatedClaims {
    /// Map these claims onto the `Identity` the control plane expects.
    #[must_use]
    pub fn into_identity(self) -> Identity {
        match self.role {
            Role::User => Identity::User { id: self.subject },
            Role::Agent => Identity::Agent {
                agent_id: self.subject,
            },
        }
    }
}

/// Trait for validating JWTs.
#[async_trait]
pub trait JwtValidator: Send + Sync {
    /// Validate a JWT and extract claims.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is invalid, expired, or cannot be validated.
    async fn validate(&self, token: &str) -> Result<ValidatedClaims>;
}

/// Raw claims from a JWT before validation.
#[derive(Debug, Deserialize)]
struct RawClaims {
    /// Issuer (validated by jsonwebtoken)
    #[allow(dead_code)]
    iss: String,
    /// Subject: a user id or agent id, disambiguated by `role`.
    sub: String,
    /// "user" or "agent".
    role: String,
    /// Audience (can be string or array)
    #[serde(default)]
    aud: Audience,
    /// Expiration timestamp
    exp: u64,
    /// Issued at timestamp (validated by jsonwebtoken)
    #[allow(dead_code)]
    iat: u64,
}

/// Audience claim that can be either a string or array.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(untagged)]
enum Audience {
    Single(String),
    Multiple(Vec<String>),
    #[default]
    None,
}

impl Audience {
    fn contains(&self, value: &str) -> bool {
        match self {
            Self::Single(s) => s == value,
            Self::Multiple(v) => v.iter().any(|s| s == value),
            Self::None => false,
        }
    }
}

/// JWKS-based JWT validator.
///
/// This validator fetches public keys from a JWKS endpoint and validates
/// JWT signatures using Ed25519 (`EdDSA`).
pub struct JwksValidator {
    config: AuthConfig,
    jwks: JwksProvider,
}

impl JwksValidator {
    /// Create a new JWKS-based validator.
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        let jwks = JwksProvider::new(config.clone());
        Self { config, jwks }
    }

    /// Get a reference to the JWKS provider for manual operations.
    #[must_use]
    pub const fn jwks(&self) -> &JwksProvider {
        &self.jwks
    }
}

#[async_trait]
impl JwtValidator for JwksValidator {
    async fn validate(&self, token: &str) -> Result<ValidatedClaims> {
        let header = decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        let kid = header
            .kid
            .ok_or_else(|| AuthError::MissingClaim("kid".to_string()))?;

        let key = self.jwks.get_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.set_issuer(&[self.config.issuer()]);
        // Audience can be a string or array, so validate it manually below.
        validation.validate_aud = false;
        validation.validate_exp = true;

        let token_data =
            decode::<RawClaims>(token, &key, &validation).map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::InvalidToken(e.to_string()),
            })?;

        let claims = token_data.claims;

        if !claims.aud.contains(&self.config.audience) {
            return Err(AuthError::InvalidAudience);
        }

        let role = match claims.role.as_str() {
            "user" => Role::User,
            "agent" => Role::Agent,
            _ => return Err(AuthError::InvalidSubject),
        };

        let exp_secs = i64::try_from(claims.exp).unwrap_or(i64::MAX);
        let expires_at = DateTime::from_timestamp(exp_secs, 0)
            .ok_or_else(|| AuthError::InvalidToken("invalid exp timestamp".to_string()))?;

        Ok(ValidatedClaims {
            subject: claims.sub,
            role,
            expires_at,
        })
    }
}

/// A mock JWT validator for testing.
///
/// This validator accepts any token in the format `test-token:<role>:<subject>`
/// and extracts the role and subject from it.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct MockJwtValidator;

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl JwtValidator for MockJwtValidator {
    async fn validate(&self, token: &str) -> Result<ValidatedClaims> {
        let rest = token
            .strip_prefix("test-token:")
            .ok_or_else(|| AuthError::InvalidToken("expected test-token:<role>:<subject>".to_string()))?;

        let (role_str, subject) = rest
            .split_once(':')
            .ok_or_else(|| AuthError::InvalidToken("expected test-token:<role>:<subject>".to_string()))?;

        let role = match role_str {
            "user" => Role::User,
            "agent" => Role::Agent,
            _ => return Err(AuthError::InvalidSubject),
        };

        Ok(ValidatedClaims {
            subject: subject.to_string(),
            role,
            expires_at: Utc::now() + chrono::Duration::hours(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_validator_user() {
        let validator = MockJwtValidator;
        let claims = validator.validate("test-token:user:alice").await.unwrap();
        assert_eq!(claims.subject, "alice");
        assert_eq!(claims.role, Role::User);
        assert!(matches!(claims.into_identity(), Identity::User { id } if id == "alice"));
    }

    #[tokio::test]
    async fn mock_validator_agent() {
        let validator = MockJwtValidator;
        let claims = validator.validate("test-token:agent:a-42").await.unwrap();
        assert_eq!(claims.role, Role::Agent);
        assert!(matches!(claims.into_identity(), Identity::Agent { agent_id } if agent_id == "a-42"));
    }

    #[tokio::test]
    async fn mock_validator_rejects_invalid() {
        let validator = MockJwtValidator;
        let result = validator.validate("invalid-token").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn mock_validator_rejects_unknown_role() {
        let validator = MockJwtValidator;
        let result = validator.validate("test-token:admin:bob").await;
        assert!(matches!(result, Err(AuthError::InvalidSubject)));
    }
}

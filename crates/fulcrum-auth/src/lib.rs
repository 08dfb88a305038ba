//! Bearer-token authentication for the Fulcrum gateway.
//!
//! This crate validates the JWTs the gateway receives on inbound requests
//! and turns them into a [`fulcrum_core::Identity`]. It has no opinion on
//! authorization: policy evaluation is the control plane's `Authorizer`
//! collaborator (`fulcrum_control::authorize`), consulted once the identity
//! has been established.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │   Gateway        │────▶│   JwtValidator   │
//! │   (auth extract) │     │   (trait)        │
//! └──────────────────┘     └────────┬─────────┘
//!                                   │
//!                          ┌────────▼─────────┐
//!                          │  JwksValidator   │
//!                          │  (impl)          │
//!                          └────────┬─────────┘
//!                                   │
//!                          ┌────────▼─────────┐
//!                          │  JwksProvider    │
//!                          │  (key cache)     │
//!                          └────────┬─────────┘
//!                                   │ HTTPS
//!                          ┌────────▼─────────┐
//!                          │  identity         │
//!                          │  provider's JWKS │
//!                          │  endpoint        │
//!                          └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use fulcrum_auth::{AuthConfig, JwksValidator, JwtValidator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig {
//!     base_url: "https://idp.example.com".to_string(),
//!     audience: "fulcrum".to_string(),
//!     jwks_refresh_seconds: 300,
//! };
//!
//! let validator = JwksValidator::new(config);
//!
//! let token = "eyJhbGciOiJFZERTQSIsInR5cCI6IkpXVCJ9...";
//! let claims = validator.validate(token).await?;
//! let identity = claims.into_identity();
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod jwks;
pub mod jwt;

pub use error::{AuthError, Result};
pub use jwt::{JwksValidator, JwtValidator, Role, ValidatedClaims};

#[cfg(any(test, feature = "test-utils"))]
pub use jwt::MockJwtValidator;

/// Configuration for validating tokens issued by an external identity
/// provider.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Base URL of the identity provider (e.g. `https://idp.example.com`).
    pub base_url: String,
    /// Expected JWT audience (`aud` claim).
    pub audience: String,
    /// How often to refresh the JWKS cache, in seconds.
    pub jwks_refresh_seconds: u64,
}

impl AuthConfig {
    /// Get the JWKS endpoint URL.
    #[must_use]
    pub fn jwks_url(&self) -> String {
        format!("{}/.well-known/jwks.json", self.base_url)
    }

    /// Get the expected JWT issuer.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.base_url
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            base_url: "https://idp.example.com".to_string(),
            audience: "fulcrum".to_string(),
            jwks_refresh_seconds: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = AuthConfig::default();
        assert_eq!(config.base_url, "https://idp.example.com");
        assert_eq!(config.audience, "fulcrum");
        assert_eq!(config.jwks_refresh_seconds, 300);
    }

    #[test]
    fn config_urls() {
        let config = AuthConfig::default();
        assert_eq!(
            config.jwks_url(),
            "https://idp.example.com/.well-known/jwks.json"
        );
        assert_eq!(config.issuer(), "https://idp.example.com");
    }

    #[test]
    fn auth_error_status_codes() {
        assert_eq!(AuthError::TokenExpired.http_status_code(), 401);
        assert_eq!(AuthError::InvalidSignature.http_status_code(), 401);
        assert_eq!(AuthError::RateLimited.http_status_code(), 429);
        assert_eq!(
            AuthError::JwksFetchFailed("test".into()).http_status_code(),
            500
        );
    }

    #[test]
    fn auth_error_retriable() {
        assert!(AuthError::TokenExpired.is_retriable());
        assert!(AuthError::JwksFetchFailed("test".into()).is_retriable());
        assert!(AuthError::RateLimited.is_retriable());
        assert!(!AuthError::InvalidSignature.is_retriable());
    }
}

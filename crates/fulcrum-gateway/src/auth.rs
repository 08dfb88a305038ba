//! Authentication middleware and extractors.
//!
//! This module provides the `AuthUser` extractor that validates JWT
//! tokens and turns them into a [`fulcrum_core::Identity`].

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use fulcrum_auth::{JwtValidator, Role};
use fulcrum_control::ControlPlane;
use fulcrum_core::{AgentId, Identity, RequestContext};

use crate::error::ApiError;
use crate::state::GatewayState;

/// An authenticated caller extracted from a JWT token.
///
/// Wraps the resolved [`Identity`]; handlers that need to build a
/// [`RequestContext`] call [`AuthUser::context`], and agent-only handlers
/// call [`AuthUser::agent_id`] to both narrow the role and parse the
/// subject as an [`AgentId`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The caller's resolved identity.
    pub identity: Identity,
}

impl AuthUser {
    /// Build a [`RequestContext`] for this caller, tagging it with the
    /// given correlation id.
    #[must_use]
    pub fn context(&self, correlation_id: uuid::Uuid) -> RequestContext {
        RequestContext {
            identity: self.identity.clone(),
            cancellation: tokio_util::sync::CancellationToken::new(),
            correlation_id,
        }
    }

    /// Require that this caller authenticated as an agent, returning its
    /// parsed [`AgentId`].
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Forbidden` if the caller is a user or system
    /// identity, or `ApiError::BadRequest` if the agent subject isn't a
    /// valid id.
    pub fn agent_id(&self) -> Result<AgentId, ApiError> {
        match &self.identity {
            Identity::Agent { agent_id } => agent_id
                .parse()
                .map_err(|_| ApiError::BadRequest(format!("invalid agent id: {agent_id}"))),
            _ => Err(ApiError::Forbidden),
        }
    }
}

impl<C, V> FromRequestParts<Arc<GatewayState<C, V>>> for AuthUser
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<GatewayState<C, V>>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let auth_header = parts
                .headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .ok_or(ApiError::Unauthorized)?;

            let token = auth_header
                .strip_prefix("Bearer ")
                .ok_or(ApiError::Unauthorized)?;

            let claims = state.jwt_validator.validate(token).await?;
            let _: Role = claims.role;
            let identity = claims.into_identity();

            Ok(Self { identity })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_id_rejects_user_identity() {
        let user = AuthUser {
            identity: Identity::User { id: "u1".into() },
        };
        assert!(matches!(user.agent_id(), Err(ApiError::Forbidden)));
    }

    #[test]
    fn agent_id_parses_valid_agent_subject() {
        let id = AgentId::generate();
        let user = AuthUser {
            identity: Identity::Agent {
                agent_id: id.to_string(),
            },
        };
        assert_eq!(user.agent_id().unwrap(), id);
    }

    #[test]
    fn context_carries_identity_and_correlation_id() {
        let user = AuthUser {
            identity: Identity::User { id: "u1".into() },
        };
        let correlation_id = uuid::Uuid::new_v4();
        let ctx = user.context(correlation_id);
        assert_eq!(ctx.correlation_id, correlation_id);
    }
}

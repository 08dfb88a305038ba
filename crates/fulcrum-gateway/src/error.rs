//! API error types and responses.
//!
//! This module defines the standard error format for all API responses.
//! Every error response carries a correlation id; for `500`s it is also
//! attached to the `tracing::error!` record so the caller-visible id can
//! be matched back to a server-side log line.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use fulcrum_auth::AuthError;
use fulcrum_control::ControlError;

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid authentication token.
    #[error("unauthorized")]
    Unauthorized,

    /// The caller's identity is not authorized for this action.
    #[error("forbidden")]
    Forbidden,

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request conflicts with the current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Too many requests, rate limit exceeded.
    #[error("rate limited")]
    RateLimited,

    /// Invalid request body, parameters, or state-machine violation.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A property write violates its schema's source or mutability rule.
    #[error("unprocessable: {0}")]
    UnprocessableEntity(String),

    /// Internal server error. The correlation id is surfaced to the
    /// caller so they can reference it when reporting the failure.
    #[error("internal error (correlation id: {correlation_id})")]
    Internal {
        /// Id that ties this response to the server-side log record.
        correlation_id: Uuid,
    },
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

/// Error details.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<Uuid>,
}

impl ApiError {
    /// Build an `Internal` error, generating a fresh correlation id.
    #[must_use]
    pub fn internal() -> Self {
        Self::Internal {
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::RateLimited => "rate_limited",
            Self::BadRequest(_) => "bad_request",
            Self::UnprocessableEntity(_) => "unprocessable_entity",
            Self::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();
        let correlation_id = match &self {
            Self::Internal { correlation_id } => Some(*correlation_id),
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code,
                message,
                correlation_id,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::TokenExpired
            | AuthError::InvalidSignature
            | AuthError::InvalidIssuer
            | AuthError::InvalidAudience
            | AuthError::InvalidSubject
            | AuthError::MissingClaim(_)
            | AuthError::InvalidToken(_) => Self::Unauthorized,
            AuthError::RateLimited => Self::RateLimited,
            AuthError::KeyNotFound(_) | AuthError::JwksFetchFailed(_) | AuthError::Internal(_) => {
                let api_err = Self::internal();
                tracing::error!(error = %err, correlation = ?api_err, "auth internal error");
                api_err
            }
        }
    }
}

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::ServiceNotFound(id) => Self::NotFound(format!("service {id}")),
            ControlError::JobNotFound(id) => Self::NotFound(format!("job {id}")),
            ControlError::AgentNotFound(id) => Self::NotFound(format!("agent {id}")),
            ControlError::GroupNotFound(id) => Self::NotFound(format!("service group {id}")),
            ControlError::ServiceTypeNotFound(id) => Self::NotFound(format!("service type {id}")),
            ControlError::SubscriberNotFound(id) => Self::NotFound(format!("subscriber {id}")),
            ControlError::NoEligibleAgent | ControlError::AmbiguousAgentSelector => {
                Self::BadRequest(err.to_string())
            }
            ControlError::NotStable { .. }
            | ControlError::InvalidTransition { .. }
            | ControlError::NotFailed(_)
            | ControlError::Conflict(_)
            | ControlError::LeaseHeld(_)
            | ControlError::LeaseNotHeld(_) => Self::Conflict(err.to_string()),
            ControlError::PropertySource(_) | ControlError::PropertyImmutable(_) => {
                Self::UnprocessableEntity(err.to_string())
            }
            ControlError::Unauthorized => Self::Forbidden,
            ControlError::Store(store_err) => {
                let api_err = Self::internal();
                tracing::error!(error = %store_err, correlation = ?api_err, "store error");
                api_err
            }
            ControlError::Internal(msg) => {
                let api_err = Self::internal();
                tracing::error!(error = %msg, correlation = ?api_err, "internal control error");
                api_err
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_codes() {
        assert_eq!(
            ApiError::Unauthorized.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::NotFound("test".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict("test".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::RateLimited.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(ApiError::internal().status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ApiError::UnprocessableEntity("test".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn error_codes() {
        assert_eq!(ApiError::Unauthorized.code(), "unauthorized");
        assert_eq!(ApiError::Forbidden.code(), "forbidden");
        assert_eq!(ApiError::NotFound("test".into()).code(), "not_found");
        assert_eq!(ApiError::RateLimited.code(), "rate_limited");
    }

    #[test]
    fn control_not_stable_maps_to_conflict() {
        let id = fulcrum_core::ServiceId::generate();
        let err: ApiError = ControlError::NotStable {
            service_id: id,
            status: fulcrum_store::ServiceStatus::Creating,
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn control_property_source_maps_to_unprocessable() {
        let err: ApiError = ControlError::PropertySource("cpu".into()).into();
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}

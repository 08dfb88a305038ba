//! Health and readiness endpoints.
//!
//! This module provides the public `/health` and `/ready` endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use fulcrum_auth::JwtValidator;
use fulcrum_control::ControlPlane;

use crate::state::GatewayState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
}

/// Liveness probe. Always returns `200` once the process has started
/// serving requests; does not touch the store.
pub async fn health() -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    };

    (StatusCode::OK, Json(response))
}

/// Readiness probe. Returns `200` if the store answers a cheap read,
/// `503` otherwise, so a load balancer can hold off traffic until the
/// database is actually reachable.
pub async fn ready<C, V>(State(state): State<Arc<GatewayState<C, V>>>) -> impl IntoResponse
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    match state.control.list_events_from(0, 1).await {
        Ok(_) => (StatusCode::OK, Json(HealthResponse {
            status: "ready",
            version: env!("CARGO_PKG_VERSION"),
        })),
        Err(err) => {
            tracing::warn!(error = %err, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(HealthResponse {
                status: "not_ready",
                version: env!("CARGO_PKG_VERSION"),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_returns_ok() {
        let response = health().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

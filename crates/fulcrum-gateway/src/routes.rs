//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, patch, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use fulcrum_auth::JwtValidator;
use fulcrum_control::ControlPlane;

use crate::handlers::{agents, events, health, jobs, services, subscriptions};
use crate::state::GatewayState;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - liveness probe
/// - `GET /ready` - readiness probe
///
/// ## Services (§4.1)
/// - `GET /services?groupId=` - list services in a group
/// - `POST /services` - create a service
/// - `GET /services/{id}` - fetch a service
/// - `PATCH /services/{id}` - update name/properties
/// - `POST /services/{id}/start` - drive toward `Started`
/// - `POST /services/{id}/stop` - drive toward `Stopped`
/// - `DELETE /services/{id}` - drive toward `Deleted`
/// - `POST /services/{id}/retry` - replay a failed action
///
/// ## Jobs (§4.2, agent-authenticated)
/// - `GET /jobs/pending?limit=` - list pending jobs for the caller
/// - `POST /jobs/{id}/claim` - claim a job
/// - `POST /jobs/{id}/complete` - report completion
/// - `POST /jobs/{id}/fail` - report failure
///
/// ## Agents (§4.3, agent-authenticated)
/// - `PUT /agents/me/status` - self-report liveness
///
/// ## Events and subscriptions (§4.4, §4.5)
/// - `GET /events?fromSequence=&limit=` - read the journal
/// - `POST /event-subscriptions/{sub}/lease` - acquire a lease
/// - `POST /event-subscriptions/{sub}/renew` - renew a lease
/// - `POST /event-subscriptions/{sub}/ack` - advance the cursor
/// - `DELETE /event-subscriptions/{sub}/lease` - release a lease
/// - `PATCH /event-subscriptions/{sub}` - pause/resume a subscriber
pub fn create_router<C, V>(state: GatewayState<C, V>) -> Router
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_secs = state.config.request_timeout_secs;

    let cors = build_cors_layer(&cors_origins);
    let state = Arc::new(state);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready::<C, V>))
        .route(
            "/services",
            get(services::list_services::<C, V>).post(services::create_service::<C, V>),
        )
        .route(
            "/services/{id}",
            get(services::get_service::<C, V>)
                .patch(services::update_service::<C, V>)
                .delete(services::delete_service::<C, V>),
        )
        .route("/services/{id}/start", post(services::start_service::<C, V>))
        .route("/services/{id}/stop", post(services::stop_service::<C, V>))
        .route("/services/{id}/retry", post(services::retry_service::<C, V>))
        .route("/jobs/pending", get(jobs::list_pending::<C, V>))
        .route("/jobs/{id}/claim", post(jobs::claim_job::<C, V>))
        .route("/jobs/{id}/complete", post(jobs::complete_job::<C, V>))
        .route("/jobs/{id}/fail", post(jobs::fail_job::<C, V>))
        .route("/agents/me/status", put(agents::update_my_status::<C, V>))
        .route("/events", get(events::list_events::<C, V>))
        .route(
            "/event-subscriptions/{sub}/lease",
            post(subscriptions::acquire_lease::<C, V>).delete(subscriptions::release_lease::<C, V>),
        )
        .route(
            "/event-subscriptions/{sub}/renew",
            post(subscriptions::renew_lease::<C, V>),
        )
        .route(
            "/event-subscriptions/{sub}/ack",
            post(subscriptions::acknowledge::<C, V>),
        )
        .route(
            "/event-subscriptions/{sub}",
            patch(subscriptions::set_active::<C, V>),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(request_timeout_secs)))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_any_origin() {
        let origins = vec!["*".to_string()];
        let _layer = build_cors_layer(&origins);
    }

    #[test]
    fn cors_specific_origins() {
        let origins = vec![
            "http://localhost:3000".to_string(),
            "https://app.example.com".to_string(),
        ];
        let _layer = build_cors_layer(&origins);
    }
}

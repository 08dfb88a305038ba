//! Event subscription lease protocol (§4.5).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Duration;
use serde::Deserialize;

use fulcrum_auth::JwtValidator;
use fulcrum_control::ControlPlane;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::GatewayState;

/// `POST /event-subscriptions/{sub}/lease` and `.../renew` body.
#[derive(Debug, Deserialize)]
pub struct LeaseBody {
    #[serde(rename = "instanceId")]
    instance_id: String,
    /// Requested lease duration, in seconds.
    duration: i64,
}

/// `POST /event-subscriptions/{sub}/ack` body.
#[derive(Debug, Deserialize)]
pub struct AckBody {
    #[serde(rename = "instanceId")]
    instance_id: String,
    #[serde(rename = "lastSeq")]
    last_seq: u64,
}

/// `DELETE /event-subscriptions/{sub}/lease` body.
#[derive(Debug, Deserialize)]
pub struct ReleaseBody {
    #[serde(rename = "instanceId")]
    instance_id: String,
}

/// `PATCH /event-subscriptions/{sub}` body, administratively pausing or
/// resuming a subscriber. Not part of the representative HTTP surface but
/// required by the `ControlPlane` trait's `setSubscriberActive`.
#[derive(Debug, Deserialize)]
pub struct SetActiveBody {
    active: bool,
}

/// Acquire a subscriber's lease.
///
/// # Errors
///
/// Returns a conflict if another instance currently holds the lease.
pub async fn acquire_lease<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    _user: AuthUser,
    Path(subscriber_id): Path<String>,
    Json(body): Json<LeaseBody>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let sub = state
        .control
        .acquire_lease(&subscriber_id, &body.instance_id, Duration::seconds(body.duration))
        .await?;
    Ok(Json(sub))
}

/// Renew a subscriber's lease.
///
/// # Errors
///
/// Returns an error if the caller does not hold the current lease.
pub async fn renew_lease<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    _user: AuthUser,
    Path(subscriber_id): Path<String>,
    Json(body): Json<LeaseBody>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let sub = state
        .control
        .renew_lease(&subscriber_id, &body.instance_id, Duration::seconds(body.duration))
        .await?;
    Ok(Json(sub))
}

/// Advance a subscriber's processed-sequence cursor.
///
/// # Errors
///
/// Returns an error if the caller does not hold the current lease.
pub async fn acknowledge<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    _user: AuthUser,
    Path(subscriber_id): Path<String>,
    Json(body): Json<AckBody>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let sub = state
        .control
        .acknowledge_events(&subscriber_id, &body.instance_id, body.last_seq)
        .await?;
    Ok(Json(sub))
}

/// Release a subscriber's lease.
///
/// # Errors
///
/// Returns an error if the caller does not hold the current lease.
pub async fn release_lease<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    _user: AuthUser,
    Path(subscriber_id): Path<String>,
    Json(body): Json<ReleaseBody>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    state
        .control
        .release_lease(&subscriber_id, &body.instance_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Administratively pause or resume a subscriber.
///
/// # Errors
///
/// Returns an error if the subscriber does not exist.
pub async fn set_active<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    _user: AuthUser,
    Path(subscriber_id): Path<String>,
    Json(body): Json<SetActiveBody>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let sub = state
        .control
        .set_subscriber_active(&subscriber_id, body.active)
        .await?;
    Ok(Json(sub))
}

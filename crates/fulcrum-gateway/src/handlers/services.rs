//! Service CRUD and lifecycle endpoints (§4.1).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use fulcrum_auth::JwtValidator;
use fulcrum_control::lifecycle::TransitionTarget;
use fulcrum_control::{ControlPlane, CreateServiceRequest, UpdateServiceRequest};
use fulcrum_core::{ServiceGroupId, ServiceId};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::GatewayState;

/// `GET /services?groupId=`
#[derive(Debug, Deserialize)]
pub struct ListServicesQuery {
    #[serde(rename = "groupId")]
    group_id: String,
}

/// List the services in a group.
///
/// # Errors
///
/// Returns an error if `groupId` is missing or malformed, or if the group
/// does not exist.
pub async fn list_services<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    _user: AuthUser,
    Query(query): Query<ListServicesQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let group_id = parse_id::<ServiceGroupId>(&query.group_id, "groupId")?;
    let services = state.control.list_services_by_group(&group_id).await?;
    Ok(Json(services))
}

/// Create a new service.
///
/// # Errors
///
/// Returns an error if the group or service type does not exist, both
/// `agentId` and `agentTags` are given, or no eligible agent matches.
pub async fn create_service<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Json(body): Json<CreateServiceRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let ctx = user.context(uuid::Uuid::new_v4());
    let service = state.control.create_service(&ctx, body).await?;
    Ok((StatusCode::CREATED, Json(service)))
}

/// Fetch a single service by id.
///
/// # Errors
///
/// Returns an error if the id is malformed or the service does not exist.
pub async fn get_service<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let id = parse_id::<ServiceId>(&id, "id")?;
    let service = state.control.get_service(&id).await?;
    Ok(Json(service))
}

/// Update a stable service's name and/or properties.
///
/// # Errors
///
/// Returns an error if the service is not stable, or a property write
/// violates its schema's source or mutability rule.
pub async fn update_service<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateServiceRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let id = parse_id::<ServiceId>(&id, "id")?;
    let ctx = user.context(uuid::Uuid::new_v4());
    let service = state.control.update_service(&ctx, id, body).await?;
    Ok(Json(service))
}

/// Drive a service toward `Started`.
///
/// # Errors
///
/// Returns an error if the transition is not valid from the service's
/// current status.
pub async fn start_service<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    transition::<C, V>(state, user, id, TransitionTarget::Started).await
}

/// Drive a service toward `Stopped`.
///
/// # Errors
///
/// Returns an error if the transition is not valid from the service's
/// current status.
pub async fn stop_service<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    transition::<C, V>(state, user, id, TransitionTarget::Stopped).await
}

/// Tear a service down.
///
/// # Errors
///
/// Returns an error if the transition is not valid from the service's
/// current status.
pub async fn delete_service<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    transition::<C, V>(state, user, id, TransitionTarget::Deleted).await
}

async fn transition<C, V>(
    state: Arc<GatewayState<C, V>>,
    user: AuthUser,
    id: String,
    target: TransitionTarget,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let id = parse_id::<ServiceId>(&id, "id")?;
    let ctx = user.context(uuid::Uuid::new_v4());
    state.control.transition_service(&ctx, id, target).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Replay a failed service's last action.
///
/// # Errors
///
/// Returns an error if the service is not currently `Failed`.
pub async fn retry_service<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let id = parse_id::<ServiceId>(&id, "id")?;
    let ctx = user.context(uuid::Uuid::new_v4());
    state.control.retry_service(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Parse a path or query parameter into a typed id, mapping a parse
/// failure onto `400 Bad Request`.
fn parse_id<T: std::str::FromStr>(raw: &str, field: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid {field}: {raw}")))
}

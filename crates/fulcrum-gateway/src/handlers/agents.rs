//! Agent self-reporting endpoint (§4.3).

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use fulcrum_auth::JwtValidator;
use fulcrum_control::ControlPlane;
use fulcrum_store::AgentStatus;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::GatewayState;

/// `PUT /agents/me/status` body.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusBody {
    status: AgentStatus,
}

/// Record the calling agent's self-reported liveness.
///
/// Agents call this on connect, on graceful disconnect, and periodically
/// as a heartbeat; the connectivity sweeper independently marks agents
/// `Disconnected` when this call stops arriving (§4.3).
///
/// # Errors
///
/// Returns `403` if the caller did not authenticate as an agent, or
/// `404` if the agent is not registered.
pub async fn update_my_status<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Json(body): Json<UpdateStatusBody>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let agent_id = user.agent_id()?;
    let agent = state
        .control
        .update_agent_status(&agent_id, body.status)
        .await?;
    Ok(Json(agent))
}

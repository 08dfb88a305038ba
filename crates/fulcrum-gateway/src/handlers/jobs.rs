//! Job queue endpoints, consumed by agents (§4.2).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use fulcrum_auth::JwtValidator;
use fulcrum_control::{CompleteJobRequest, ControlPlane, FailJobRequest};
use fulcrum_core::JobId;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::GatewayState;

/// `GET /jobs/pending?limit=`
#[derive(Debug, Deserialize)]
pub struct ListPendingQuery {
    limit: Option<usize>,
}

/// List pending jobs dispatched to the calling agent.
///
/// # Errors
///
/// Returns `403` if the caller did not authenticate as an agent.
pub async fn list_pending<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Query(query): Query<ListPendingQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let agent_id = user.agent_id()?;
    let limit = state.config.clamp_page_size(query.limit);
    let jobs = state.control.list_pending_jobs(&agent_id, limit).await?;
    Ok(Json(jobs))
}

/// Claim a pending job.
///
/// # Errors
///
/// Returns an error if the job does not exist, is not pending, or was not
/// dispatched to the calling agent.
pub async fn claim_job<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let agent_id = user.agent_id()?;
    let id = parse_job_id(&id)?;
    let ctx = user.context(uuid::Uuid::new_v4());
    state.control.claim_job(&ctx, &agent_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Report a claimed job as complete.
///
/// # Errors
///
/// Returns an error if the job is not claimed by this agent, or a
/// property write-back violates its schema's source rule.
pub async fn complete_job<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<CompleteJobRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    user.agent_id()?;
    let id = parse_job_id(&id)?;
    let ctx = user.context(uuid::Uuid::new_v4());
    state.control.complete_job(&ctx, id, body).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Report a claimed job as failed.
///
/// # Errors
///
/// Returns an error if the job is not claimed by this agent.
pub async fn fail_job<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<FailJobRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    user.agent_id()?;
    let id = parse_job_id(&id)?;
    let ctx = user.context(uuid::Uuid::new_v4());
    state.control.fail_job(&ctx, id, body).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_job_id(raw: &str) -> Result<JobId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid job id: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_job_id_rejects_garbage() {
        assert!(parse_job_id("nope").is_err());
    }
}

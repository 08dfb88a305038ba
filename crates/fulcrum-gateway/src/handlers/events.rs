//! Event journal read endpoint (§4.4).

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use fulcrum_auth::JwtValidator;
use fulcrum_control::ControlPlane;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::GatewayState;

/// `GET /events?fromSequence=&limit=`
#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    #[serde(rename = "fromSequence", default)]
    from_sequence: u64,
    limit: Option<usize>,
}

/// List journal events after a given sequence number.
///
/// # Errors
///
/// Returns an error if the store read fails.
pub async fn list_events<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    _user: AuthUser,
    Query(query): Query<ListEventsQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let limit = state.config.clamp_page_size(query.limit);
    let events = state
        .control
        .list_events_from(query.from_sequence, limit)
        .await?;
    Ok(Json(events))
}

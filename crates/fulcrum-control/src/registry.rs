//! Agent registry operations (§4.3): self-reported liveness, service
//! matching, and the background connectivity sweeper.
//!
//! Agent CRUD itself is a thin pass-through to [`fulcrum_store::Store`]; the
//! behavior that belongs here is `updateStatus`, `findForService`, and the
//! selection rule `create` (see [`crate::commander`]) uses when a caller
//! supplies `agentTags` instead of a specific `agentId`.

use chrono::{DateTime, Utc};
use fulcrum_core::AgentTypeId;
use fulcrum_store::{Agent, AgentStatus, Store};

use crate::error::{ControlError, Result};

/// Record an agent's self-reported liveness, stamping `last_status_update`.
/// Called from the gateway's heartbeat endpoint; not itself transactional,
/// since it neither reads-then-writes a Job nor appends an event (§4.3
/// describes this as plain CRUD with a timestamp side effect).
///
/// # Errors
///
/// Returns `ControlError::AgentNotFound` if the agent does not exist, or a
/// store error if the write fails.
pub fn update_status<S: Store>(
    store: &S,
    agent_id: &fulcrum_core::AgentId,
    status: AgentStatus,
) -> Result<Agent> {
    let mut agent = store
        .get_agent(agent_id)?
        .ok_or(ControlError::AgentNotFound(*agent_id))?;
    agent.status = status;
    agent.last_status_update = Utc::now();
    agent.updated_at = agent.last_status_update;
    store.put_agent(&agent)?;
    Ok(agent)
}

/// Find every `Connected` agent of agent types that support `service_type_id`
/// and whose tags are a superset of `tags` (§4.3). The candidate pool for
/// `findForService`, before the tie-break rule in `select_agent_for_service`
/// narrows it to one.
///
/// # Errors
///
/// Returns a store error if a lookup fails.
pub fn find_for_service<S: Store>(
    store: &S,
    service_type_id: &fulcrum_core::ServiceTypeId,
    tags: &[String],
) -> Result<Vec<Agent>> {
    let supporting_types: Vec<AgentTypeId> = store
        .list_agent_types()?
        .into_iter()
        .filter(|agent_type| agent_type.service_types.contains(service_type_id))
        .map(|agent_type| agent_type.id)
        .collect();

    let mut candidates = Vec::new();
    for agent_type_id in supporting_types {
        for agent in store.list_agents_by_type(&agent_type_id)? {
            if agent.status.is_selectable() && tags.iter().all(|tag| agent.tags.contains(tag)) {
                candidates.push(agent);
            }
        }
    }
    Ok(candidates)
}

/// Resolve `create`'s `agentTags` selector down to a single agent: among the
/// `findForService` candidates, pick the one with the fewest currently
/// assigned services, breaking ties by ascending agent id (§9).
///
/// # Errors
///
/// Returns `ControlError::NoEligibleAgent` if no candidate matches.
pub fn select_agent_for_service<S: Store>(
    store: &S,
    service_type_id: &fulcrum_core::ServiceTypeId,
    tags: &[String],
) -> Result<Agent> {
    let candidates = find_for_service(store, service_type_id, tags)?;
    let mut scored = Vec::with_capacity(candidates.len());
    for agent in candidates {
        let load = store.list_services_by_agent(&agent.id)?.len();
        scored.push((load, agent));
    }
    scored.sort_by(|(load_a, agent_a), (load_b, agent_b)| {
        load_a.cmp(load_b).then_with(|| agent_a.id.to_canonical().cmp(&agent_b.id.to_canonical()))
    });
    scored
        .into_iter()
        .next()
        .map(|(_, agent)| agent)
        .ok_or(ControlError::NoEligibleAgent)
}

/// Mark every `Connected` agent whose `last_status_update` is at or before
/// `cutoff` as `Disconnected` (§4.3, §5 background sweepers). Each agent is
/// updated independently; one failure does not block the rest of the sweep.
///
/// Returns the ids of agents that were marked disconnected.
///
/// # Errors
///
/// Returns a store error only if the initial full scan fails; per-agent
/// write failures are logged and skipped.
pub fn connectivity_sweep<S: Store>(
    store: &S,
    cutoff: DateTime<Utc>,
) -> Result<Vec<fulcrum_core::AgentId>> {
    let mut disconnected = Vec::new();
    for agent in store.list_agents()? {
        if agent.status == AgentStatus::Connected && agent.last_status_update <= cutoff {
            match update_status(store, &agent.id, AgentStatus::Disconnected) {
                Ok(_) => disconnected.push(agent.id),
                Err(err) => {
                    tracing::warn!(agent_id = %agent.id, error = %err, "connectivity sweep: failed to mark agent disconnected");
                }
            }
        }
    }
    Ok(disconnected)
}

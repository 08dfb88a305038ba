//! Service state machine commander (§4.1): `create`, `update`, `transition`,
//! `retry`. Every operation here runs inside one [`Store::with_tx`] call,
//! locked on the service id, so the Service write, the enqueued Job, and the
//! journal entries commit together or not at all.

use std::collections::HashMap;

use chrono::Utc;
use fulcrum_core::{Identity, RequestContext, ServiceId};
use fulcrum_store::{
    InitiatorType, Job, JobAction, JobStatus, PropertyMutability, PropertySource, Service,
    ServiceStatus, ServiceType, Store,
};

use crate::authorize::{Action, Authorizer, Scope};
use crate::error::{ControlError, Result};
use crate::lifecycle::{self, TransitionTarget};
use crate::types::{CreateServiceRequest, UpdateServiceRequest};
use crate::validate::Validator;
use crate::registry;

fn initiator_of(identity: &Identity) -> (InitiatorType, String) {
    let initiator_type = match identity.initiator_type() {
        "user" => InitiatorType::User,
        "agent" => InitiatorType::Agent,
        _ => InitiatorType::System,
    };
    (initiator_type, identity.initiator_id())
}

/// Split a property delta into keys that require a service restart (`cold`)
/// and keys that don't (`hot`), per the `ServiceType`'s schema. A key absent
/// from the schema is treated as cold, the conservative default.
fn partition_by_mutability<'a>(
    service_type: &ServiceType,
    delta: &'a HashMap<String, serde_json::Value>,
) -> (Vec<&'a str>, Vec<&'a str>) {
    let mut hot = Vec::new();
    let mut cold = Vec::new();
    for key in delta.keys() {
        match service_type.property_schema.get(key).map(|rule| rule.mutability) {
            Some(PropertyMutability::Hot) => hot.push(key.as_str()),
            Some(PropertyMutability::Cold) | None => cold.push(key.as_str()),
            Some(PropertyMutability::Immutable) => cold.push(key.as_str()),
        }
    }
    (hot, cold)
}

fn merge_properties(
    current: Option<&serde_json::Value>,
    delta: &HashMap<String, serde_json::Value>,
) -> serde_json::Value {
    let mut merged = current
        .and_then(serde_json::Value::as_object)
        .cloned()
        .unwrap_or_default();
    for (key, value) in delta {
        merged.insert(key.clone(), value.clone());
    }
    serde_json::Value::Object(merged)
}

/// Reject any key in `properties` whose schema marks `source` as excluding
/// `User` (§4.1 create: "any property whose schema marks `source=agent`
/// must not appear").
fn reject_agent_only_properties(
    service_type: &ServiceType,
    properties: &HashMap<String, serde_json::Value>,
) -> Result<()> {
    for key in properties.keys() {
        if let Some(rule) = service_type.property_schema.get(key) {
            if !rule.source.contains(&PropertySource::User) {
                return Err(ControlError::PropertySource(key.clone()));
            }
        }
    }
    Ok(())
}

/// Reject an update delta key whose schema forbids user updates, or whose
/// schema restricts updates to statuses that don't include `current_status`
/// (§4.1 update, §4.7).
fn check_updatable(
    service_type: &ServiceType,
    properties: &HashMap<String, serde_json::Value>,
    current_status: ServiceStatus,
) -> Result<()> {
    for key in properties.keys() {
        if let Some(rule) = service_type.property_schema.get(key) {
            if !rule.updatable_by.contains(&PropertySource::User) {
                return Err(ControlError::PropertyImmutable(key.clone()));
            }
            if !rule.updatable_in_status.is_empty()
                && !rule.updatable_in_status.contains(&current_status)
            {
                return Err(ControlError::PropertyImmutable(key.clone()));
            }
        }
    }
    Ok(())
}

fn new_job(
    agent_id: fulcrum_core::AgentId,
    service: &Service,
    action: JobAction,
    params: serde_json::Value,
) -> Job {
    let now = Utc::now();
    Job {
        id: fulcrum_core::JobId::generate(),
        agent_id,
        service_id: service.id,
        provider_id: service.provider_id,
        consumer_id: service.consumer_id,
        action,
        status: JobStatus::Pending,
        priority: action.default_priority(),
        params,
        claimed_at: None,
        completed_at: None,
        error_message: None,
        created_at: now,
        updated_at: now,
    }
}

/// Create a new service (§4.1).
///
/// # Errors
///
/// Returns `ControlError::AmbiguousAgentSelector` if `agent_id` and
/// `agent_tags` are both given or both absent, `ControlError::NoEligibleAgent`
/// if an `agent_tags` selector matches nothing, `ControlError::AgentNotFound`
/// if a direct `agent_id` doesn't exist or isn't connected and eligible,
/// `ControlError::PropertySource` if a create property is agent-only, or a
/// store error.
pub fn create<S: Store, A: Authorizer, V: Validator>(
    store: &S,
    authorizer: &A,
    validator: &V,
    ctx: &RequestContext,
    req: CreateServiceRequest,
) -> Result<Service> {
    let group = store
        .get_service_group(&req.group_id)?
        .ok_or(ControlError::GroupNotFound(req.group_id))?;
    let service_type = store
        .get_service_type(&req.service_type_id)?
        .ok_or(ControlError::ServiceTypeNotFound(req.service_type_id))?;

    authorizer.check(
        &ctx.identity,
        Action::Create,
        &Scope::consumer(group.consumer_id),
    )?;

    let agent = match (req.agent_id, &req.agent_tags) {
        (Some(_), Some(_)) | (None, None) => return Err(ControlError::AmbiguousAgentSelector),
        (Some(agent_id), None) => {
            let agent = store
                .get_agent(&agent_id)?
                .ok_or(ControlError::AgentNotFound(agent_id))?;
            let agent_type = store
                .get_agent_type(&agent.agent_type_id)?
                .ok_or_else(|| ControlError::Internal("agent references unknown agent type".into()))?;
            if !agent.status.is_selectable() || !agent_type.service_types.contains(&req.service_type_id)
            {
                return Err(ControlError::NoEligibleAgent);
            }
            agent
        }
        (None, Some(tags)) => registry::select_agent_for_service(store, &req.service_type_id, tags)?,
    };

    validator.validate(&service_type, &req.properties)?;
    reject_agent_only_properties(&service_type, &req.properties)?;

    let properties_value = serde_json::to_value(&req.properties)
        .map_err(|e| ControlError::Internal(e.to_string()))?;

    let service_id = ServiceId::generate();
    let now = Utc::now();
    let service = Service {
        id: service_id,
        name: req.name,
        agent_id: agent.id,
        service_type_id: req.service_type_id,
        group_id: req.group_id,
        consumer_id: group.consumer_id,
        provider_id: agent.provider_id,
        agent_instance_id: None,
        current_status: ServiceStatus::New,
        target_status: Some(ServiceStatus::Creating),
        failed_action: None,
        error_message: None,
        retry_count: 0,
        current_properties: None,
        target_properties: Some(properties_value.clone()),
        agent_instance_data: None,
        created_at: now,
        updated_at: now,
    };

    let (initiator_type, initiator_id) = initiator_of(&ctx.identity);

    store.with_tx(&service_id.to_canonical(), |txn| {
        txn.put_service(&service)?;
        let job = new_job(agent.id, &service, JobAction::Create, serde_json::json!({ "properties": properties_value }));
        txn.create_job(&job)?;

        txn.append_event(
            "service.created".into(),
            initiator_type,
            initiator_id.clone(),
            service.id.to_canonical(),
            "service".into(),
            Some(service.provider_id),
            Some(service.consumer_id),
            Some(service.agent_id),
            fulcrum_store::EventDiff {
                before: None,
                after: Some(serde_json::to_value(&service).map_err(|e| fulcrum_store::StoreError::Serialization(e.to_string()))?),
            },
        )?;
        txn.append_event(
            "job.created".into(),
            initiator_type,
            initiator_id,
            job.id.to_canonical(),
            "job".into(),
            Some(job.provider_id),
            Some(job.consumer_id),
            Some(job.agent_id),
            fulcrum_store::EventDiff::empty(),
        )?;
        Ok(())
    })?;

    Ok(service)
}

/// Update a stable service's name and/or properties (§4.1, §4.7).
///
/// # Errors
///
/// Returns `ControlError::NotStable` if the service isn't in a stable
/// status, `ControlError::PropertyImmutable` if a delta key isn't
/// user-updatable in the current status, or a store error.
pub fn update<S: Store, A: Authorizer, V: Validator>(
    store: &S,
    authorizer: &A,
    validator: &V,
    ctx: &RequestContext,
    id: ServiceId,
    req: UpdateServiceRequest,
) -> Result<Service> {
    let mut service = store.get_service(&id)?.ok_or(ControlError::ServiceNotFound(id))?;

    authorizer.check(
        &ctx.identity,
        Action::Update,
        &Scope::consumer_and_provider(service.consumer_id, service.provider_id),
    )?;

    if !service.current_status.is_stable() || service.target_status.is_some() {
        return Err(ControlError::NotStable {
            service_id: id,
            status: service.current_status,
        });
    }

    let service_type = store
        .get_service_type(&service.service_type_id)?
        .ok_or(ControlError::ServiceTypeNotFound(service.service_type_id))?;

    let before = serde_json::to_value(&service).map_err(|e| ControlError::Internal(e.to_string()))?;
    let mut job_to_create = None;

    if let Some(name) = req.name {
        service.name = name;
    }

    if let Some(delta) = req.properties {
        validator.validate(&service_type, &delta)?;
        check_updatable(&service_type, &delta, service.current_status)?;

        let (_hot, cold) = partition_by_mutability(&service_type, &delta);
        let action = if cold.is_empty() {
            JobAction::HotUpdate
        } else {
            JobAction::ColdUpdate
        };

        let target_properties = merge_properties(service.current_properties.as_ref(), &delta);
        service.target_properties = Some(target_properties.clone());
        service.target_status = Some(match action {
            JobAction::HotUpdate => ServiceStatus::HotUpdating,
            JobAction::ColdUpdate => ServiceStatus::ColdUpdating,
            _ => unreachable!("partition only yields hot/cold actions"),
        });
        // current_status deliberately stays at its stable value: the
        // completion handler needs to know which of Created/Started/Stopped
        // to resolve back to, and this is the only place that's recorded.

        job_to_create = Some(new_job(
            service.agent_id,
            &service,
            action,
            serde_json::json!({ "delta": target_properties }),
        ));
    }

    service.updated_at = Utc::now();
    let (initiator_type, initiator_id) = initiator_of(&ctx.identity);
    let after = serde_json::to_value(&service).map_err(|e| ControlError::Internal(e.to_string()))?;

    store.with_tx(&id.to_canonical(), |txn| {
        txn.put_service(&service)?;
        if let Some(job) = &job_to_create {
            txn.create_job(job)?;
        }
        txn.append_event(
            "service.updated".into(),
            initiator_type,
            initiator_id.clone(),
            service.id.to_canonical(),
            "service".into(),
            Some(service.provider_id),
            Some(service.consumer_id),
            Some(service.agent_id),
            fulcrum_store::EventDiff {
                before: Some(before.clone()),
                after: Some(after.clone()),
            },
        )?;
        if let Some(job) = &job_to_create {
            txn.append_event(
                "job.created".into(),
                initiator_type,
                initiator_id,
                job.id.to_canonical(),
                "job".into(),
                Some(job.provider_id),
                Some(job.consumer_id),
                Some(job.agent_id),
                fulcrum_store::EventDiff::empty(),
            )?;
        }
        Ok(())
    })?;

    Ok(service)
}

/// Transition a service to `Started`, `Stopped`, or `Deleted` (§4.1).
///
/// # Errors
///
/// Returns `ControlError::InvalidTransition` if the cell is illegal, or a
/// store error.
pub fn transition<S: Store, A: Authorizer>(
    store: &S,
    authorizer: &A,
    ctx: &RequestContext,
    id: ServiceId,
    requested: TransitionTarget,
) -> Result<Service> {
    let mut service = store.get_service(&id)?.ok_or(ControlError::ServiceNotFound(id))?;

    authorizer.check(
        &ctx.identity,
        Action::Update,
        &Scope::consumer_and_provider(service.consumer_id, service.provider_id),
    )?;

    if service.target_status.is_some() && service.current_status != ServiceStatus::Failed {
        // A hot/cold update is in flight; current_status is left at its
        // stable value for that case (see `update`), so plan_transition's
        // own is_transitional() check can't see it. `Failed` also carries a
        // non-null target_status (the action that failed, kept for retry),
        // but a Failed service is never "in flight" — plan_transition below
        // is the authority on what's legal from Failed.
        return Err(ControlError::NotStable {
            service_id: id,
            status: service.current_status,
        });
    }
    let (action, target_status) = lifecycle::plan_transition(id, service.current_status, requested)?;

    let before = serde_json::to_value(&service).map_err(|e| ControlError::Internal(e.to_string()))?;
    service.current_status = target_status;
    service.target_status = Some(target_status);
    service.updated_at = Utc::now();

    let job = new_job(service.agent_id, &service, action, serde_json::json!({}));
    let after = serde_json::to_value(&service).map_err(|e| ControlError::Internal(e.to_string()))?;
    let (initiator_type, initiator_id) = initiator_of(&ctx.identity);

    store.with_tx(&id.to_canonical(), |txn| {
        txn.put_service(&service)?;
        txn.create_job(&job)?;
        txn.append_event(
            "service.transitioning".into(),
            initiator_type,
            initiator_id.clone(),
            service.id.to_canonical(),
            "service".into(),
            Some(service.provider_id),
            Some(service.consumer_id),
            Some(service.agent_id),
            fulcrum_store::EventDiff {
                before: Some(before.clone()),
                after: Some(after.clone()),
            },
        )?;
        txn.append_event(
            "job.created".into(),
            initiator_type,
            initiator_id,
            job.id.to_canonical(),
            "job".into(),
            Some(job.provider_id),
            Some(job.consumer_id),
            Some(job.agent_id),
            fulcrum_store::EventDiff::empty(),
        )?;
        Ok(())
    })?;

    Ok(service)
}

/// Retry a failed service by replaying its last failed action (§4.1).
///
/// # Errors
///
/// Returns `ControlError::NotFailed` if the service isn't `Failed`, or a
/// store error.
pub fn retry<S: Store, A: Authorizer>(
    store: &S,
    authorizer: &A,
    ctx: &RequestContext,
    id: ServiceId,
) -> Result<Service> {
    let mut service = store.get_service(&id)?.ok_or(ControlError::ServiceNotFound(id))?;

    authorizer.check(
        &ctx.identity,
        Action::Update,
        &Scope::consumer_and_provider(service.consumer_id, service.provider_id),
    )?;

    if service.current_status != ServiceStatus::Failed {
        return Err(ControlError::NotFailed(id));
    }
    let failed_action = service
        .failed_action
        .ok_or_else(|| ControlError::Internal("Failed service has no failedAction".into()))?;
    let resumed_status = service
        .target_status
        .ok_or_else(|| ControlError::Internal("Failed service has no targetStatus to resume".into()))?;

    let before = serde_json::to_value(&service).map_err(|e| ControlError::Internal(e.to_string()))?;

    service.current_status = resumed_status;
    service.retry_count += 1;
    service.failed_action = None;
    service.error_message = None;
    service.updated_at = Utc::now();

    let job = new_job(service.agent_id, &service, failed_action, serde_json::json!({}));
    let after = serde_json::to_value(&service).map_err(|e| ControlError::Internal(e.to_string()))?;
    let (initiator_type, initiator_id) = initiator_of(&ctx.identity);

    store.with_tx(&id.to_canonical(), |txn| {
        txn.put_service(&service)?;
        txn.create_job(&job)?;
        txn.append_event(
            "service.retried".into(),
            initiator_type,
            initiator_id.clone(),
            service.id.to_canonical(),
            "service".into(),
            Some(service.provider_id),
            Some(service.consumer_id),
            Some(service.agent_id),
            fulcrum_store::EventDiff {
                before: Some(before.clone()),
                after: Some(after.clone()),
            },
        )?;
        txn.append_event(
            "job.created".into(),
            initiator_type,
            initiator_id,
            job.id.to_canonical(),
            "job".into(),
            Some(job.provider_id),
            Some(job.consumer_id),
            Some(job.agent_id),
            fulcrum_store::EventDiff::empty(),
        )?;
        Ok(())
    })?;

    Ok(service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorize::AllowAllAuthorizer;
    use crate::validate::NoopValidator;
    use fulcrum_core::{AgentId, AgentTypeId, ParticipantId, ServiceGroupId, ServiceTypeId};
    use fulcrum_store::{Agent, AgentStatus, AgentType, ParticipantStatus, Participant, RocksStore, ServiceGroup};
    use std::collections::HashSet;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: RocksStore,
        agent: Agent,
        group_id: ServiceGroupId,
        service_type: ServiceType,
    }

    fn setup() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        let now = Utc::now();

        let consumer = Participant {
            id: ParticipantId::generate(),
            name: "acme".into(),
            status: ParticipantStatus::Enabled,
            created_at: now,
            updated_at: now,
        };
        store.put_participant(&consumer).unwrap();

        let provider_id = ParticipantId::generate();
        let agent_type_id = AgentTypeId::generate();
        let service_type_id = ServiceTypeId::generate();

        store
            .put_agent_type(&AgentType {
                id: agent_type_id,
                name: "vm-runner".into(),
                service_types: HashSet::from([service_type_id]),
            })
            .unwrap();

        let agent = Agent {
            id: AgentId::generate(),
            name: "agent-1".into(),
            provider_id,
            agent_type_id,
            tags: HashSet::new(),
            status: AgentStatus::Connected,
            last_status_update: now,
            created_at: now,
            updated_at: now,
        };
        store.put_agent(&agent).unwrap();

        let group = ServiceGroup {
            id: ServiceGroupId::generate(),
            name: "group-1".into(),
            consumer_id: consumer.id,
            created_at: now,
            updated_at: now,
        };
        store.put_service_group(&group).unwrap();

        let service_type = ServiceType {
            id: service_type_id,
            name: "db".into(),
            property_schema: HashMap::new(),
        };
        store.put_service_type(&service_type).unwrap();

        Fixture {
            _dir: dir,
            store,
            agent,
            group_id: group.id,
            service_type,
        }
    }

    #[test]
    fn create_rejects_both_agent_selectors() {
        let fx = setup();
        let req = CreateServiceRequest {
            name: "s1".into(),
            group_id: fx.group_id,
            service_type_id: fx.service_type.id,
            properties: HashMap::new(),
            agent_id: Some(fx.agent.id),
            agent_tags: Some(vec![]),
        };
        let ctx = RequestContext::system();
        let result = create(&fx.store, &AllowAllAuthorizer, &NoopValidator, &ctx, req);
        assert!(matches!(result, Err(ControlError::AmbiguousAgentSelector)));
    }

    #[test]
    fn create_succeeds_with_direct_agent_id_and_enqueues_job() {
        let fx = setup();
        let req = CreateServiceRequest {
            name: "s1".into(),
            group_id: fx.group_id,
            service_type_id: fx.service_type.id,
            properties: HashMap::new(),
            agent_id: Some(fx.agent.id),
            agent_tags: None,
        };
        let ctx = RequestContext::system();
        let service = create(&fx.store, &AllowAllAuthorizer, &NoopValidator, &ctx, req).unwrap();

        assert_eq!(service.current_status, ServiceStatus::New);
        assert_eq!(service.target_status, Some(ServiceStatus::Creating));

        let jobs = fx.store.list_jobs_by_service(&service.id).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].action, JobAction::Create);
        assert_eq!(fx.store.latest_event_sequence().unwrap(), 2);
    }

    #[test]
    fn transition_started_to_started_rejected() {
        let fx = setup();
        let service = store_started_service(&fx);
        fx.store.put_service(&service).unwrap();

        let ctx = RequestContext::system();
        let result = transition(
            &fx.store,
            &AllowAllAuthorizer,
            &ctx,
            service.id,
            TransitionTarget::Started,
        );
        assert!(matches!(result, Err(ControlError::InvalidTransition { .. })));
    }

    #[test]
    fn transition_failed_to_deleted_succeeds() {
        let fx = setup();
        let mut service = store_started_service(&fx);
        service.current_status = ServiceStatus::Failed;
        service.failed_action = Some(JobAction::Start);
        service.target_status = Some(ServiceStatus::Starting);
        service.error_message = Some("boom".into());
        fx.store.put_service(&service).unwrap();

        let ctx = RequestContext::system();
        let result = transition(
            &fx.store,
            &AllowAllAuthorizer,
            &ctx,
            service.id,
            TransitionTarget::Deleted,
        )
        .unwrap();

        assert_eq!(result.current_status, ServiceStatus::Deleting);
        assert_eq!(result.target_status, Some(ServiceStatus::Deleting));

        let jobs = fx.store.list_jobs_by_service(&service.id).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].action, JobAction::Delete);
    }

    #[test]
    fn transition_failed_to_started_rejected() {
        let fx = setup();
        let mut service = store_started_service(&fx);
        service.current_status = ServiceStatus::Failed;
        service.failed_action = Some(JobAction::Start);
        service.target_status = Some(ServiceStatus::Starting);
        service.error_message = Some("boom".into());
        fx.store.put_service(&service).unwrap();

        let ctx = RequestContext::system();
        let result = transition(
            &fx.store,
            &AllowAllAuthorizer,
            &ctx,
            service.id,
            TransitionTarget::Started,
        );
        assert!(matches!(result, Err(ControlError::InvalidTransition { .. })));
    }

    #[test]
    fn update_rejects_when_not_stable() {
        let fx = setup();
        let mut service = store_started_service(&fx);
        service.current_status = ServiceStatus::Starting;
        fx.store.put_service(&service).unwrap();

        let ctx = RequestContext::system();
        let result = update(
            &fx.store,
            &AllowAllAuthorizer,
            &NoopValidator,
            &ctx,
            service.id,
            UpdateServiceRequest {
                name: Some("renamed".into()),
                properties: None,
            },
        );
        assert!(matches!(result, Err(ControlError::NotStable { .. })));
    }

    #[test]
    fn retry_replays_failed_action_and_increments_count() {
        let fx = setup();
        let mut service = store_started_service(&fx);
        service.current_status = ServiceStatus::Failed;
        service.failed_action = Some(JobAction::Start);
        service.target_status = Some(ServiceStatus::Starting);
        service.error_message = Some("boom".into());
        fx.store.put_service(&service).unwrap();

        let ctx = RequestContext::system();
        let retried = retry(&fx.store, &AllowAllAuthorizer, &ctx, service.id).unwrap();

        assert_eq!(retried.current_status, ServiceStatus::Starting);
        assert_eq!(retried.retry_count, 1);
        assert!(retried.failed_action.is_none());
        assert!(retried.error_message.is_none());

        let jobs = fx.store.list_jobs_by_service(&service.id).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].action, JobAction::Start);
    }

    fn store_started_service(fx: &Fixture) -> Service {
        let now = Utc::now();
        Service {
            id: ServiceId::generate(),
            name: "s1".into(),
            agent_id: fx.agent.id,
            service_type_id: fx.service_type.id,
            group_id: fx.group_id,
            consumer_id: ParticipantId::generate(),
            provider_id: fx.agent.provider_id,
            agent_instance_id: None,
            current_status: ServiceStatus::Started,
            target_status: None,
            failed_action: None,
            error_message: None,
            retry_count: 0,
            current_properties: None,
            target_properties: None,
            agent_instance_data: None,
            created_at: now,
            updated_at: now,
        }
    }
}

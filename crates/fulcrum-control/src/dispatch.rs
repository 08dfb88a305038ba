//! Job queue & dispatch (§4.2): `listPendingForAgent`, `claim`, `complete`,
//! `fail`, and the timeout sweeper.
//!
//! `claim` is implemented by [`fulcrum_store::Store::claim_job`], which is
//! its own atomic operation keyed on the job id rather than a `with_tx`
//! closure (§5: claim is a compare-and-swap against a known record's status,
//! not a read-modify-write staged through the caller). Two concurrent claims
//! of the same job race on that id's lock stripe; the loser sees
//! `StoreError::Conflict` and surfaces as `ControlError::Conflict`.
//! `complete` and `fail` run inside `with_tx`, since both the Job and its
//! Service mutate together.

use chrono::{DateTime, Utc};
use fulcrum_core::{AgentId, JobId, RequestContext};
use fulcrum_store::{Job, JobAction, JobStatus, PropertySource, Service, ServiceStatus, Store};

use crate::authorize::{Action, Authorizer, Scope};
use crate::error::{ControlError, Result};
use crate::types::{CompleteJobRequest, ControlConfig, FailJobRequest};

fn initiator_of(identity: &fulcrum_core::Identity) -> (fulcrum_store::InitiatorType, String) {
    let initiator_type = match identity.initiator_type() {
        "user" => fulcrum_store::InitiatorType::User,
        "agent" => fulcrum_store::InitiatorType::Agent,
        _ => fulcrum_store::InitiatorType::System,
    };
    (initiator_type, identity.initiator_id())
}

fn authorize_agent_action<A: Authorizer>(
    authorizer: &A,
    ctx: &RequestContext,
    job: &Job,
) -> Result<()> {
    authorizer.check(
        &ctx.identity,
        Action::Agent,
        &Scope::consumer_and_provider(job.consumer_id, job.provider_id),
    )
}

/// List up to `limit` pending jobs for `agent_id`, in dispatch order
/// (priority descending, then age ascending). Read-only.
///
/// # Errors
///
/// Returns a store error if the lookup fails.
pub fn list_pending_for_agent<S: Store>(
    store: &S,
    agent_id: &AgentId,
    limit: usize,
) -> Result<Vec<Job>> {
    Ok(store.list_pending_jobs_for_agent(agent_id, limit)?)
}

/// Atomically claim a specific pending job for `agent_id` (§4.2). Rejects
/// with `ControlError::Unauthorized` if the job is not queued for this
/// agent, and with `ControlError::Conflict` if a concurrent claim (or
/// completion, or failure) already moved it out of `Pending` — exactly one
/// of two racing claims on the same job id succeeds.
///
/// # Errors
///
/// Returns `ControlError::JobNotFound` if the job doesn't exist,
/// `ControlError::Unauthorized` if it isn't queued for `agent_id`,
/// `ControlError::Conflict` if it isn't `Pending`, or a store error.
pub fn claim<S: Store, A: Authorizer>(
    store: &S,
    authorizer: &A,
    ctx: &RequestContext,
    agent_id: &AgentId,
    job_id: JobId,
) -> Result<Job> {
    let peek = store.get_job(&job_id)?.ok_or(ControlError::JobNotFound(job_id))?;
    if peek.agent_id != *agent_id {
        return Err(ControlError::Unauthorized);
    }

    let job = match store.claim_job(&job_id) {
        Ok(job) => job,
        Err(fulcrum_store::StoreError::Conflict(msg)) => return Err(ControlError::Conflict(msg)),
        Err(fulcrum_store::StoreError::NotFound) => {
            return Err(ControlError::JobNotFound(job_id));
        }
        Err(e) => return Err(e.into()),
    };
    authorize_agent_action(authorizer, ctx, &job)?;

    let (initiator_type, initiator_id) = initiator_of(&ctx.identity);
    store.with_tx(&job.service_id.to_canonical(), |txn| {
        txn.append_event(
            "job.claimed".into(),
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

    Ok(job)
}

/// Resolve the service-side effect of a job completing successfully and
/// apply it in place (§4.1 transition completion table).
fn apply_completion(service: &mut Service, action: JobAction, req: &CompleteJobRequest) {
    match action {
        JobAction::Create => {
            service.current_status = ServiceStatus::Created;
            service.agent_instance_id = req.agent_instance_id.clone();
            service.current_properties = service.target_properties.take();
        }
        JobAction::Start => service.current_status = ServiceStatus::Started,
        JobAction::Stop => service.current_status = ServiceStatus::Stopped,
        JobAction::HotUpdate | JobAction::ColdUpdate => {
            // current_status was left at its stable value by `update`; only
            // the property bag moves from target to current.
            service.current_properties = service.target_properties.take();
        }
        JobAction::Delete => service.current_status = ServiceStatus::Deleted,
    }

    // Agent write-back merges on top of whatever the action above landed in
    // current_properties (the full target bag for create/hot/cold, or the
    // untouched current bag for start/stop/delete).
    if let Some(properties) = &req.properties {
        let mut merged = service
            .current_properties
            .as_ref()
            .and_then(serde_json::Value::as_object)
            .cloned()
            .unwrap_or_default();
        for (k, v) in properties {
            merged.insert(k.clone(), v.clone());
        }
        service.current_properties = Some(serde_json::Value::Object(merged));
    }

    if let Some(data) = &req.agent_instance_data {
        service.agent_instance_data = Some(data.clone());
    }
    service.target_status = None;
    service.updated_at = Utc::now();
}

/// Validate a completion's property write-back against the service type's
/// schema: only keys whose `source` includes `Agent` are accepted.
///
/// # Errors
///
/// Returns `ControlError::PropertySource` for a non-agent-writable key.
fn check_agent_writable<S: Store>(
    store: &S,
    service: &Service,
    req: &CompleteJobRequest,
) -> Result<()> {
    let Some(properties) = &req.properties else {
        return Ok(());
    };
    let service_type = store
        .get_service_type(&service.service_type_id)?
        .ok_or(ControlError::ServiceTypeNotFound(service.service_type_id))?;
    for key in properties.keys() {
        if let Some(rule) = service_type.property_schema.get(key) {
            if !rule.source.contains(&PropertySource::Agent) {
                return Err(ControlError::PropertySource(key.clone()));
            }
        }
    }
    Ok(())
}

/// Complete a claimed job (§4.1, §4.2).
///
/// # Errors
///
/// Returns `ControlError::JobNotFound` if the job doesn't exist,
/// `ControlError::Conflict` if it isn't `Processing`,
/// `ControlError::PropertySource` if a write-back key isn't agent-writable,
/// or a store error.
pub fn complete<S: Store, A: Authorizer>(
    store: &S,
    authorizer: &A,
    ctx: &RequestContext,
    job_id: JobId,
    req: CompleteJobRequest,
) -> Result<Job> {
    let mut job = store.get_job(&job_id)?.ok_or(ControlError::JobNotFound(job_id))?;
    authorize_agent_action(authorizer, ctx, &job)?;

    if job.status != JobStatus::Processing {
        return Err(ControlError::Conflict(format!(
            "job {job_id} is not processing (status: {:?})",
            job.status
        )));
    }

    let mut service = store
        .get_service(&job.service_id)?
        .ok_or(ControlError::ServiceNotFound(job.service_id))?;

    check_agent_writable(store, &service, &req)?;
    apply_completion(&mut service, job.action, &req);

    job.status = JobStatus::Completed;
    job.completed_at = Some(Utc::now());
    job.updated_at = job.completed_at.unwrap();

    let (initiator_type, initiator_id) = initiator_of(&ctx.identity);
    let service_id = service.id;
    let job_for_txn = job.clone();
    let service_for_txn = service.clone();

    store.with_tx(&service_id.to_canonical(), move |txn| {
        txn.finish_job(&job_for_txn)?;
        txn.put_service(&service_for_txn)?;
        txn.append_event(
            "job.completed".into(),
            initiator_type,
            initiator_id.clone(),
            job_for_txn.id.to_canonical(),
            "job".into(),
            Some(job_for_txn.provider_id),
            Some(job_for_txn.consumer_id),
            Some(job_for_txn.agent_id),
            fulcrum_store::EventDiff::empty(),
        )?;
        txn.append_event(
            "service.updated".into(),
            initiator_type,
            initiator_id,
            service_for_txn.id.to_canonical(),
            "service".into(),
            Some(service_for_txn.provider_id),
            Some(service_for_txn.consumer_id),
            Some(service_for_txn.agent_id),
            fulcrum_store::EventDiff {
                before: None,
                after: Some(
                    serde_json::to_value(&service_for_txn)
                        .map_err(|e| fulcrum_store::StoreError::Serialization(e.to_string()))?,
                ),
            },
        )?;
        Ok(())
    })?;

    Ok(job)
}

/// Fail a claimed job, driving its service into `Failed` (§4.1, §4.2).
///
/// # Errors
///
/// Returns `ControlError::JobNotFound` if the job doesn't exist,
/// `ControlError::Conflict` if it isn't `Processing`, or a store error.
pub fn fail<S: Store, A: Authorizer>(
    store: &S,
    authorizer: &A,
    ctx: &RequestContext,
    job_id: JobId,
    req: FailJobRequest,
) -> Result<Job> {
    let mut job = store.get_job(&job_id)?.ok_or(ControlError::JobNotFound(job_id))?;
    authorize_agent_action(authorizer, ctx, &job)?;

    if job.status != JobStatus::Processing {
        return Err(ControlError::Conflict(format!(
            "job {job_id} is not processing (status: {:?})",
            job.status
        )));
    }

    let mut service = store
        .get_service(&job.service_id)?
        .ok_or(ControlError::ServiceNotFound(job.service_id))?;

    service.current_status = ServiceStatus::Failed;
    service.failed_action = Some(job.action);
    service.error_message = Some(req.error_message.clone());
    service.updated_at = Utc::now();

    job.status = JobStatus::Failed;
    job.error_message = Some(req.error_message);
    job.completed_at = Some(Utc::now());
    job.updated_at = job.completed_at.unwrap();

    let (initiator_type, initiator_id) = initiator_of(&ctx.identity);
    let job_for_txn = job.clone();
    let service_for_txn = service.clone();

    store.with_tx(&service.id.to_canonical(), move |txn| {
        txn.finish_job(&job_for_txn)?;
        txn.put_service(&service_for_txn)?;
        txn.append_event(
            "job.failed".into(),
            initiator_type,
            initiator_id.clone(),
            job_for_txn.id.to_canonical(),
            "job".into(),
            Some(job_for_txn.provider_id),
            Some(job_for_txn.consumer_id),
            Some(job_for_txn.agent_id),
            fulcrum_store::EventDiff::empty(),
        )?;
        txn.append_event(
            "service.failed".into(),
            initiator_type,
            initiator_id,
            service_for_txn.id.to_canonical(),
            "service".into(),
            Some(service_for_txn.provider_id),
            Some(service_for_txn.consumer_id),
            Some(service_for_txn.agent_id),
            fulcrum_store::EventDiff::empty(),
        )?;
        Ok(())
    })?;

    Ok(job)
}

/// Fail every job still `Processing` past its timeout, driving each
/// service into `Failed` exactly as an explicit `fail` would (§4.2
/// background timeout sweeper). Each job is handled in its own
/// transaction, so the sweep as a whole is not atomic but each timeout is.
///
/// # Errors
///
/// Returns a store error only if the initial scan fails; per-job failures
/// are logged and skipped so one bad record doesn't block the rest.
pub fn sweep_timeouts<S: Store, A: Authorizer>(
    store: &S,
    authorizer: &A,
    config: &ControlConfig,
) -> Result<Vec<JobId>> {
    let cutoff: DateTime<Utc> =
        Utc::now() - chrono::Duration::seconds(config.job_timeout_secs as i64);
    let stale = store.list_processing_jobs_claimed_before(cutoff)?;

    let mut timed_out = Vec::new();
    let ctx = RequestContext::system();
    for job in stale.into_iter().take(config.sweep_batch_size) {
        let job_id = job.id;
        match fail(
            store,
            authorizer,
            &ctx,
            job_id,
            FailJobRequest {
                error_message: "timeout".into(),
            },
        ) {
            Ok(_) => timed_out.push(job_id),
            Err(err) => {
                tracing::warn!(job_id = %job_id, error = %err, "timeout sweep: failed to fail job");
            }
        }
    }
    Ok(timed_out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorize::AllowAllAuthorizer;
    use fulcrum_core::{AgentTypeId, ParticipantId, ServiceGroupId, ServiceTypeId};
    use fulcrum_store::{Agent, AgentStatus, AgentType, RocksStore};
    use std::collections::{HashMap, HashSet};
    use tempfile::TempDir;

    fn setup() -> (TempDir, RocksStore, Service, Job) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        let now = Utc::now();

        let provider_id = ParticipantId::generate();
        let consumer_id = ParticipantId::generate();
        let agent_type_id = AgentTypeId::generate();
        let service_type_id = ServiceTypeId::generate();

        let agent = Agent {
            id: AgentId::generate(),
            name: "a1".into(),
            provider_id,
            agent_type_id,
            tags: HashSet::new(),
            status: AgentStatus::Connected,
            last_status_update: now,
            created_at: now,
            updated_at: now,
        };
        store.put_agent(&agent).unwrap();
        store
            .put_agent_type(&AgentType {
                id: agent_type_id,
                name: "t".into(),
                service_types: HashSet::from([service_type_id]),
            })
            .unwrap();
        store
            .put_service_type(&fulcrum_store::ServiceType {
                id: service_type_id,
                name: "st".into(),
                property_schema: HashMap::new(),
            })
            .unwrap();

        let service = Service {
            id: fulcrum_core::ServiceId::generate(),
            name: "s1".into(),
            agent_id: agent.id,
            service_type_id,
            group_id: ServiceGroupId::generate(),
            consumer_id,
            provider_id,
            agent_instance_id: None,
            current_status: ServiceStatus::New,
            target_status: Some(ServiceStatus::Creating),
            failed_action: None,
            error_message: None,
            retry_count: 0,
            current_properties: None,
            target_properties: Some(serde_json::json!({"cpu": 2})),
            agent_instance_data: None,
            created_at: now,
            updated_at: now,
        };
        store.put_service(&service).unwrap();

        let job = Job {
            id: JobId::generate(),
            agent_id: agent.id,
            service_id: service.id,
            provider_id,
            consumer_id,
            action: JobAction::Create,
            status: JobStatus::Pending,
            priority: JobAction::Create.default_priority(),
            params: serde_json::json!({}),
            claimed_at: None,
            completed_at: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        store.with_tx("setup", |txn| txn.create_job(&job)).unwrap();

        (dir, store, service, job)
    }

    #[test]
    fn claim_then_complete_resolves_service_to_created() {
        let (_dir, store, service, job) = setup();
        let ctx = RequestContext::system();

        let claimed = claim(&store, &AllowAllAuthorizer, &ctx, &service.agent_id, job.id).unwrap();
        assert_eq!(claimed.status, JobStatus::Processing);

        let completed = complete(
            &store,
            &AllowAllAuthorizer,
            &ctx,
            claimed.id,
            CompleteJobRequest {
                agent_instance_id: Some("inst-1".into()),
                agent_instance_data: None,
                properties: None,
            },
        )
        .unwrap();
        assert_eq!(completed.status, JobStatus::Completed);

        let updated = store.get_service(&service.id).unwrap().unwrap();
        assert_eq!(updated.current_status, ServiceStatus::Created);
        assert_eq!(updated.agent_instance_id, Some("inst-1".to_string()));
        assert!(updated.target_status.is_none());
        assert_eq!(updated.current_properties, Some(serde_json::json!({"cpu": 2})));
    }

    #[test]
    fn complete_twice_conflicts() {
        let (_dir, store, service, job) = setup();
        let ctx = RequestContext::system();
        let claimed = claim(&store, &AllowAllAuthorizer, &ctx, &service.agent_id, job.id).unwrap();
        complete(&store, &AllowAllAuthorizer, &ctx, claimed.id, CompleteJobRequest::default()).unwrap();

        let result = complete(&store, &AllowAllAuthorizer, &ctx, claimed.id, CompleteJobRequest::default());
        assert!(matches!(result, Err(ControlError::Conflict(_))));
    }

    #[test]
    fn claim_by_wrong_agent_is_unauthorized() {
        let (_dir, store, _service, job) = setup();
        let ctx = RequestContext::system();
        let result = claim(&store, &AllowAllAuthorizer, &ctx, &AgentId::generate(), job.id);
        assert!(matches!(result, Err(ControlError::Unauthorized)));
    }

    #[test]
    fn second_concurrent_claim_of_same_job_conflicts() {
        let (_dir, store, service, job) = setup();
        let ctx = RequestContext::system();
        claim(&store, &AllowAllAuthorizer, &ctx, &service.agent_id, job.id).unwrap();
        let second = claim(&store, &AllowAllAuthorizer, &ctx, &service.agent_id, job.id);
        assert!(matches!(second, Err(ControlError::Conflict(_))));
    }

    #[test]
    fn fail_drives_service_to_failed_and_preserves_target() {
        let (_dir, store, service, job) = setup();
        let ctx = RequestContext::system();
        let claimed = claim(&store, &AllowAllAuthorizer, &ctx, &service.agent_id, job.id).unwrap();

        let failed = fail(
            &store,
            &AllowAllAuthorizer,
            &ctx,
            claimed.id,
            FailJobRequest {
                error_message: "boom".into(),
            },
        )
        .unwrap();
        assert_eq!(failed.status, JobStatus::Failed);

        let updated = store.get_service(&service.id).unwrap().unwrap();
        assert_eq!(updated.current_status, ServiceStatus::Failed);
        assert_eq!(updated.failed_action, Some(JobAction::Create));
        assert_eq!(updated.target_status, Some(ServiceStatus::Creating));
    }

    #[test]
    fn sweep_timeouts_fails_stale_processing_jobs() {
        let (_dir, store, service, job) = setup();
        let ctx = RequestContext::system();
        let claimed = claim(&store, &AllowAllAuthorizer, &ctx, &service.agent_id, job.id).unwrap();

        // A zero-second timeout means anything already claimed is stale by
        // the time the sweep runs.
        let config = ControlConfig {
            job_timeout_secs: 0,
            ..ControlConfig::default()
        };
        let timed_out = sweep_timeouts(&store, &AllowAllAuthorizer, &config).unwrap();
        assert_eq!(timed_out, vec![claimed.id]);

        let job = store.get_job(&claimed.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message, Some("timeout".to_string()));

        let updated = store.get_service(&service.id).unwrap().unwrap();
        assert_eq!(updated.current_status, ServiceStatus::Failed);
    }
}

//! The control plane façade.
//!
//! `ControlPlaneService` composes [`crate::commander`], [`crate::dispatch`],
//! [`crate::registry`], and [`crate::subscriptions`] behind one object so
//! the gateway deals with a single `ControlPlane` trait rather than
//! importing each module directly.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use fulcrum_core::{AgentId, JobId, RequestContext, ServiceId};
use fulcrum_store::{Agent, AgentStatus, Event, EventSubscription, Job, Service, Store};

use crate::authorize::{AllowAllAuthorizer, Authorizer};
use crate::commander;
use crate::dispatch;
use crate::error::{ControlError, Result};
use crate::lifecycle::TransitionTarget;
use crate::registry;
use crate::subscriptions;
use crate::types::{
    CompleteJobRequest, ControlConfig, CreateServiceRequest, FailJobRequest, UpdateServiceRequest,
};
use crate::validate::{NoopValidator, Validator};

/// The complete control-plane API: service lifecycle, job dispatch, the
/// agent registry, and the event subscription protocol.
///
/// Implementations handle authorization and property validation on every
/// call; `ControlPlaneService` delegates both to its `A: Authorizer` and
/// `V: Validator` type parameters.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    // =========================================================================
    // Service commander (§4.1)
    // =========================================================================

    /// Create a new service (`POST /services`).
    async fn create_service(
        &self,
        ctx: &RequestContext,
        req: CreateServiceRequest,
    ) -> Result<Service>;

    /// Fetch a service by id (`GET /services/{id}`).
    async fn get_service(&self, id: &ServiceId) -> Result<Service>;

    /// List the services in a group (backs `GET /services?groupId=`).
    async fn list_services_by_group(
        &self,
        group_id: &fulcrum_core::ServiceGroupId,
    ) -> Result<Vec<Service>>;

    /// Update a stable service's name and/or properties (`PATCH /services/{id}`).
    async fn update_service(
        &self,
        ctx: &RequestContext,
        id: ServiceId,
        req: UpdateServiceRequest,
    ) -> Result<Service>;

    /// Drive a service toward `Started`, `Stopped`, or `Deleted`
    /// (`POST /services/{id}/start|stop`, `DELETE /services/{id}`).
    async fn transition_service(
        &self,
        ctx: &RequestContext,
        id: ServiceId,
        target: TransitionTarget,
    ) -> Result<Service>;

    /// Replay a failed service's last action (`POST /services/{id}/retry`).
    async fn retry_service(&self, ctx: &RequestContext, id: ServiceId) -> Result<Service>;

    // =========================================================================
    // Job queue & dispatch (§4.2)
    // =========================================================================

    /// List pending jobs for an agent (`GET /jobs/pending?limit=`).
    async fn list_pending_jobs(&self, agent_id: &AgentId, limit: usize) -> Result<Vec<Job>>;

    /// Claim a specific pending job (`POST /jobs/{id}/claim`).
    async fn claim_job(
        &self,
        ctx: &RequestContext,
        agent_id: &AgentId,
        job_id: JobId,
    ) -> Result<Job>;

    /// Complete a claimed job (`POST /jobs/{id}/complete`).
    async fn complete_job(
        &self,
        ctx: &RequestContext,
        job_id: JobId,
        req: CompleteJobRequest,
    ) -> Result<Job>;

    /// Fail a claimed job (`POST /jobs/{id}/fail`).
    async fn fail_job(
        &self,
        ctx: &RequestContext,
        job_id: JobId,
        req: FailJobRequest,
    ) -> Result<Job>;

    // =========================================================================
    // Agent registry (§4.3)
    // =========================================================================

    /// Record an agent's self-reported liveness (`PUT /agents/me/status`).
    async fn update_agent_status(&self, agent_id: &AgentId, status: AgentStatus) -> Result<Agent>;

    // =========================================================================
    // Event journal & subscriptions (§4.4, §4.5)
    // =========================================================================

    /// List events from a sequence number (`GET /events?fromSequence=&limit=`).
    async fn list_events_from(&self, after: u64, limit: usize) -> Result<Vec<Event>>;

    /// Acquire a subscriber's lease (`POST /event-subscriptions/{sub}/lease`).
    async fn acquire_lease(
        &self,
        subscriber_id: &str,
        instance_id: &str,
        duration: Duration,
    ) -> Result<EventSubscription>;

    /// Renew a subscriber's lease (`POST /event-subscriptions/{sub}/renew`).
    async fn renew_lease(
        &self,
        subscriber_id: &str,
        instance_id: &str,
        duration: Duration,
    ) -> Result<EventSubscription>;

    /// Advance a subscriber's cursor (`POST /event-subscriptions/{sub}/ack`).
    async fn acknowledge_events(
        &self,
        subscriber_id: &str,
        instance_id: &str,
        last_seq: u64,
    ) -> Result<EventSubscription>;

    /// Release a subscriber's lease (`DELETE /event-subscriptions/{sub}/lease`).
    async fn release_lease(
        &self,
        subscriber_id: &str,
        instance_id: &str,
    ) -> Result<EventSubscription>;

    /// Administratively pause or resume a subscriber.
    async fn set_subscriber_active(
        &self,
        subscriber_id: &str,
        active: bool,
    ) -> Result<EventSubscription>;
}

/// The control plane's implementation over a [`Store`], an [`Authorizer`],
/// and a [`Validator`]. Defaults to [`AllowAllAuthorizer`] and
/// [`NoopValidator`] for local/dev use; callers that need real policy
/// enforcement or property validation supply their own type parameters.
pub struct ControlPlaneService<S: Store, A: Authorizer = AllowAllAuthorizer, V: Validator = NoopValidator> {
    store: Arc<S>,
    config: ControlConfig,
    authorizer: Arc<A>,
    validator: Arc<V>,
}

impl<S: Store> ControlPlaneService<S, AllowAllAuthorizer, NoopValidator> {
    /// Create a service with default configuration and no authorization or
    /// validation policy.
    #[must_use]
    pub fn with_defaults(store: Arc<S>) -> Self {
        Self::new(
            store,
            ControlConfig::default(),
            Arc::new(AllowAllAuthorizer),
            Arc::new(NoopValidator),
        )
    }
}

impl<S: Store, A: Authorizer, V: Validator> ControlPlaneService<S, A, V> {
    /// Create a control plane service with explicit configuration,
    /// authorizer, and validator.
    #[must_use]
    pub fn new(store: Arc<S>, config: ControlConfig, authorizer: Arc<A>, validator: Arc<V>) -> Self {
        Self {
            store,
            config,
            authorizer,
            validator,
        }
    }

    /// Access the underlying store, for sweeper wiring in `main`.
    #[must_use]
    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    /// Access the authorizer, for sweeper wiring in `main`.
    #[must_use]
    pub fn authorizer(&self) -> Arc<A> {
        Arc::clone(&self.authorizer)
    }

    /// The control plane's runtime configuration.
    #[must_use]
    pub const fn config(&self) -> &ControlConfig {
        &self.config
    }
}

#[async_trait]
impl<S, A, V> ControlPlane for ControlPlaneService<S, A, V>
where
    S: Store + 'static,
    A: Authorizer + 'static,
    V: Validator + 'static,
{
    async fn create_service(
        &self,
        ctx: &RequestContext,
        req: CreateServiceRequest,
    ) -> Result<Service> {
        commander::create(
            self.store.as_ref(),
            self.authorizer.as_ref(),
            self.validator.as_ref(),
            ctx,
            req,
        )
    }

    async fn get_service(&self, id: &ServiceId) -> Result<Service> {
        self.store
            .get_service(id)?
            .ok_or(ControlError::ServiceNotFound(*id))
    }

    async fn list_services_by_group(
        &self,
        group_id: &fulcrum_core::ServiceGroupId,
    ) -> Result<Vec<Service>> {
        Ok(self.store.list_services_by_group(group_id)?)
    }

    async fn update_service(
        &self,
        ctx: &RequestContext,
        id: ServiceId,
        req: UpdateServiceRequest,
    ) -> Result<Service> {
        commander::update(
            self.store.as_ref(),
            self.authorizer.as_ref(),
            self.validator.as_ref(),
            ctx,
            id,
            req,
        )
    }

    async fn transition_service(
        &self,
        ctx: &RequestContext,
        id: ServiceId,
        target: TransitionTarget,
    ) -> Result<Service> {
        commander::transition(self.store.as_ref(), self.authorizer.as_ref(), ctx, id, target)
    }

    async fn retry_service(&self, ctx: &RequestContext, id: ServiceId) -> Result<Service> {
        commander::retry(self.store.as_ref(), self.authorizer.as_ref(), ctx, id)
    }

    async fn list_pending_jobs(&self, agent_id: &AgentId, limit: usize) -> Result<Vec<Job>> {
        dispatch::list_pending_for_agent(self.store.as_ref(), agent_id, limit)
    }

    async fn claim_job(
        &self,
        ctx: &RequestContext,
        agent_id: &AgentId,
        job_id: JobId,
    ) -> Result<Job> {
        dispatch::claim(self.store.as_ref(), self.authorizer.as_ref(), ctx, agent_id, job_id)
    }

    async fn complete_job(
        &self,
        ctx: &RequestContext,
        job_id: JobId,
        req: CompleteJobRequest,
    ) -> Result<Job> {
        dispatch::complete(self.store.as_ref(), self.authorizer.as_ref(), ctx, job_id, req)
    }

    async fn fail_job(
        &self,
        ctx: &RequestContext,
        job_id: JobId,
        req: FailJobRequest,
    ) -> Result<Job> {
        dispatch::fail(self.store.as_ref(), self.authorizer.as_ref(), ctx, job_id, req)
    }

    async fn update_agent_status(&self, agent_id: &AgentId, status: AgentStatus) -> Result<Agent> {
        registry::update_status(self.store.as_ref(), agent_id, status)
    }

    async fn list_events_from(&self, after: u64, limit: usize) -> Result<Vec<Event>> {
        subscriptions::list_from_sequence(self.store.as_ref(), after, limit)
    }

    async fn acquire_lease(
        &self,
        subscriber_id: &str,
        instance_id: &str,
        duration: Duration,
    ) -> Result<EventSubscription> {
        subscriptions::acquire_lease(self.store.as_ref(), subscriber_id, instance_id, duration)
    }

    async fn renew_lease(
        &self,
        subscriber_id: &str,
        instance_id: &str,
        duration: Duration,
    ) -> Result<EventSubscription> {
        subscriptions::renew_lease(self.store.as_ref(), subscriber_id, instance_id, duration)
    }

    async fn acknowledge_events(
        &self,
        subscriber_id: &str,
        instance_id: &str,
        last_seq: u64,
    ) -> Result<EventSubscription> {
        subscriptions::acknowledge_events(self.store.as_ref(), subscriber_id, instance_id, last_seq)
    }

    async fn release_lease(
        &self,
        subscriber_id: &str,
        instance_id: &str,
    ) -> Result<EventSubscription> {
        subscriptions::release_lease(self.store.as_ref(), subscriber_id, instance_id)
    }

    async fn set_subscriber_active(
        &self,
        subscriber_id: &str,
        active: bool,
    ) -> Result<EventSubscription> {
        subscriptions::set_active(self.store.as_ref(), subscriber_id, active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fulcrum_core::{AgentTypeId, ParticipantId, ServiceGroupId, ServiceTypeId};
    use fulcrum_store::{AgentType, ParticipantStatus, RocksStore, ServiceGroup, ServiceType};
    use std::collections::{HashMap, HashSet};
    use tempfile::TempDir;

    fn setup() -> (
        TempDir,
        ControlPlaneService<RocksStore>,
        AgentId,
        ServiceGroupId,
        ServiceTypeId,
    ) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let now = chrono::Utc::now();

        let consumer_id = ParticipantId::generate();
        let provider_id = ParticipantId::generate();
        store
            .put_participant(&fulcrum_store::Participant {
                id: consumer_id,
                name: "acme".into(),
                status: ParticipantStatus::Enabled,
                created_at: now,
                updated_at: now,
            })
            .unwrap();

        let agent_type_id = AgentTypeId::generate();
        let service_type_id = ServiceTypeId::generate();
        store
            .put_agent_type(&AgentType {
                id: agent_type_id,
                name: "vm-runner".into(),
                service_types: HashSet::from([service_type_id]),
            })
            .unwrap();
        store
            .put_service_type(&ServiceType {
                id: service_type_id,
                name: "vm".into(),
                property_schema: HashMap::new(),
            })
            .unwrap();

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

        let group_id = ServiceGroupId::generate();
        store
            .put_service_group(&ServiceGroup {
                id: group_id,
                name: "grp".into(),
                consumer_id,
                created_at: now,
                updated_at: now,
            })
            .unwrap();

        let service = ControlPlaneService::with_defaults(Arc::clone(&store));
        (dir, service, agent.id, group_id, service_type_id)
    }

    #[tokio::test]
    async fn create_claim_complete_round_trip() {
        let (_dir, service, agent_id, group_id, service_type_id) = setup();
        let ctx = RequestContext::system();

        let created = service
            .create_service(
                &ctx,
                CreateServiceRequest {
                    name: "s1".into(),
                    group_id,
                    service_type_id,
                    properties: HashMap::new(),
                    agent_id: Some(agent_id),
                    agent_tags: None,
                },
            )
            .await
            .unwrap();

        let pending = service.list_pending_jobs(&agent_id, 10).await.unwrap();
        assert_eq!(pending.len(), 1);

        let claimed = service
            .claim_job(&ctx, &agent_id, pending[0].id)
            .await
            .unwrap();

        let completed = service
            .complete_job(
                &ctx,
                claimed.id,
                CompleteJobRequest {
                    agent_instance_id: Some("inst-1".into()),
                    ..CompleteJobRequest::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(completed.status, fulcrum_store::JobStatus::Completed);

        let service_after = service.get_service(&created.id).await.unwrap();
        assert_eq!(service_after.current_status, fulcrum_store::ServiceStatus::Created);
    }

    #[tokio::test]
    async fn subscription_lease_round_trip() {
        let (_dir, service, ..) = setup();
        let leased = service
            .acquire_lease("bill", "inst-1", Duration::seconds(30))
            .await
            .unwrap();
        assert_eq!(leased.lease_instance_id, Some("inst-1".to_string()));

        let acked = service
            .acknowledge_events("bill", "inst-1", 5)
            .await
            .unwrap();
        assert_eq!(acked.last_event_sequence_processed, 5);

        service.release_lease("bill", "inst-1").await.unwrap();
    }
}

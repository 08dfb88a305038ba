//! Domain types persisted by the store.
//!
//! These types mirror the data model: each carries its own id plus
//! `created_at`/`updated_at` timestamps that only move forward.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fulcrum_core::{
    AgentId, AgentTypeId, EventId, JobId, ParticipantId, ServiceGroupId, ServiceId, ServiceTypeId,
};

/// An organizational tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Unique identifier.
    pub id: ParticipantId,
    /// Human-readable name.
    pub name: String,
    /// Whether the participant is active.
    pub status: ParticipantStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle status of a [`Participant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    /// Participant may act as provider and/or consumer.
    Enabled,
    /// Participant is suspended; its agents and services are unaffected but
    /// no new ones may be created under it.
    Disabled,
}

/// The type of an agent, carrying the set of service types it can run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentType {
    /// Unique identifier.
    pub id: AgentTypeId,
    /// Human-readable name.
    pub name: String,
    /// Service types this agent type is capable of running.
    pub service_types: HashSet<ServiceTypeId>,
}

/// A worker endpoint owned by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique identifier.
    pub id: AgentId,
    /// Human-readable name, unique within its provider.
    pub name: String,
    /// The participant that owns this agent.
    pub provider_id: ParticipantId,
    /// The agent's type, determining which service types it supports.
    pub agent_type_id: AgentTypeId,
    /// Case-sensitive tag set used for matching (§4.3).
    pub tags: HashSet<String>,
    /// Self-reported liveness status.
    pub status: AgentStatus,
    /// When the agent last reported its status.
    pub last_status_update: DateTime<Utc>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Liveness status of an [`Agent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Registered but never connected.
    New,
    /// Connected and eligible for new service assignment.
    Connected,
    /// Missed its heartbeat deadline.
    Disconnected,
    /// Administratively disabled.
    Disabled,
    /// Reported an unrecoverable error.
    Error,
}

impl AgentStatus {
    /// Whether an agent in this status may be selected for new services
    /// (§4.3: only `Connected` agents are eligible).
    #[must_use]
    pub const fn is_selectable(self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// A consumer-owned logical grouping of services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceGroup {
    /// Unique identifier.
    pub id: ServiceGroupId,
    /// Human-readable name.
    pub name: String,
    /// The participant that owns this group.
    pub consumer_id: ParticipantId,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Who may write a property key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertySource {
    /// Only a user-originated request may write this key.
    User,
    /// Only an agent completion payload may write this key.
    Agent,
}

/// Whether and when a property key may be changed post-create (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyMutability {
    /// Rejects any post-create change.
    Immutable,
    /// Changeable without a service restart; drives a `hot_update` Job.
    Hot,
    /// Changeable only via a service-affecting action; drives a
    /// `cold_update` Job.
    Cold,
}

/// Metadata rule for a single property key, drawn from the service type's
/// schema (§4.7). The schema itself is otherwise treated as opaque data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyRule {
    /// Who may originate a write of this key.
    pub source: HashSet<PropertySource>,
    /// Who may update this key (subset of `source`, evaluated on `update`).
    pub updatable_by: HashSet<PropertySource>,
    /// Which current statuses permit updating this key (evaluated on
    /// `update` only; `create` ignores this field).
    pub updatable_in_status: HashSet<ServiceStatus>,
    /// Mutability class of this key.
    pub mutability: PropertyMutability,
}

/// The type of a service, carrying its property schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceType {
    /// Unique identifier.
    pub id: ServiceTypeId,
    /// Human-readable name.
    pub name: String,
    /// Per-key metadata rules.
    pub property_schema: HashMap<String, PropertyRule>,
}

/// Observed or intended lifecycle status of a [`Service`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    /// Just created, create Job not yet dispatched.
    New,
    /// Create Job in flight.
    Creating,
    /// Stable: created but never started, or stopped and not yet deleted.
    Created,
    /// Start Job in flight.
    Starting,
    /// Stable: running.
    Started,
    /// Stop Job in flight.
    Stopping,
    /// Stable: stopped.
    Stopped,
    /// Hot-update Job in flight.
    HotUpdating,
    /// Cold-update Job in flight.
    ColdUpdating,
    /// Delete Job in flight.
    Deleting,
    /// Terminal: no further commander operation succeeds.
    Deleted,
    /// A Job failed; only `retry` or `delete` are legal next steps.
    Failed,
}

impl ServiceStatus {
    /// Stable statuses permit `update`, `transition`, and are the precondition
    /// states `retry` restores `targetStatus` around.
    #[must_use]
    pub const fn is_stable(self) -> bool {
        matches!(self, Self::Created | Self::Started | Self::Stopped)
    }

    /// Transitional (`…ing`) statuses mean an action is already in flight.
    #[must_use]
    pub const fn is_transitional(self) -> bool {
        matches!(
            self,
            Self::Creating
                | Self::Starting
                | Self::Stopping
                | Self::HotUpdating
                | Self::ColdUpdating
                | Self::Deleting
        )
    }
}

/// An action dispatched to an agent (§3, §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobAction {
    /// Provision the service.
    Create,
    /// Start a created/stopped service.
    Start,
    /// Stop a started service.
    Stop,
    /// Apply a non-disruptive property change.
    HotUpdate,
    /// Apply a service-affecting property change.
    ColdUpdate,
    /// Tear down the service.
    Delete,
}

impl JobAction {
    /// Default queue priority for this action (higher dispatched first).
    #[must_use]
    pub const fn default_priority(self) -> i32 {
        match self {
            Self::Delete => 100,
            Self::Create => 50,
            Self::ColdUpdate => 40,
            Self::HotUpdate => 30,
            Self::Start | Self::Stop => 20,
        }
    }
}

/// A provisioned workload tracked by the state machine (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    /// Unique identifier.
    pub id: ServiceId,
    /// Human-readable name.
    pub name: String,
    /// The agent assigned to run this service.
    pub agent_id: AgentId,
    /// The service's type.
    pub service_type_id: ServiceTypeId,
    /// The group this service belongs to.
    pub group_id: ServiceGroupId,
    /// Derived from `group_id`.
    pub consumer_id: ParticipantId,
    /// Derived from `agent_id`.
    pub provider_id: ParticipantId,
    /// Opaque handle the agent assigns on completion of `create`.
    pub agent_instance_id: Option<String>,
    /// The observed state.
    pub current_status: ServiceStatus,
    /// Non-null precisely when an action is in flight.
    pub target_status: Option<ServiceStatus>,
    /// The action that last failed, if `current_status == Failed`.
    pub failed_action: Option<JobAction>,
    /// Error message from the last failure, if any.
    pub error_message: Option<String>,
    /// Number of times `retry` has been invoked.
    pub retry_count: u32,
    /// The validated, currently-applied property bag.
    pub current_properties: Option<serde_json::Value>,
    /// The intent bag awaiting agent application.
    pub target_properties: Option<serde_json::Value>,
    /// Opaque resources the agent reports.
    pub agent_instance_data: Option<serde_json::Value>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Execution status of a [`Job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be claimed by its agent.
    Pending,
    /// Claimed; the agent is executing it.
    Processing,
    /// Finished successfully.
    Completed,
    /// Finished with an error, or timed out.
    Failed,
}

impl JobStatus {
    /// Whether this status is terminal (no further transition legal).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// An action dispatched to an agent (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier.
    pub id: JobId,
    /// The agent this job is dispatched to.
    pub agent_id: AgentId,
    /// The service this job acts on.
    pub service_id: ServiceId,
    /// Denormalized from the service, for filtering.
    pub provider_id: ParticipantId,
    /// Denormalized from the service, for filtering.
    pub consumer_id: ParticipantId,
    /// The action to perform.
    pub action: JobAction,
    /// Current execution status.
    pub status: JobStatus,
    /// Queue priority; higher dispatched first.
    pub priority: i32,
    /// Action-specific opaque parameter bag.
    pub params: serde_json::Value,
    /// When the job was claimed.
    pub claimed_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Error message, set on failure.
    pub error_message: Option<String>,
    /// Creation timestamp; used as the tiebreaker in queue order.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Who initiated a mutation, for the event journal (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitiatorType {
    /// A human or service user.
    User,
    /// An agent.
    Agent,
    /// The coordinator itself (background sweepers).
    System,
}

/// A journal record (§3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonically increasing, gap-free within this coordinator.
    pub sequence: u64,
    /// Unique identifier, independent of `sequence`, for subscriber
    /// idempotency (§4.5: "subscribers must be idempotent on event id").
    pub id: EventId,
    /// Namespaced event type, e.g. `service.created`.
    pub event_type: String,
    /// Who initiated the mutation.
    pub initiator_type: InitiatorType,
    /// The initiator's id (or the system sentinel).
    pub initiator_id: String,
    /// The id of the entity this event describes, rendered as a string
    /// since events may reference any of several entity kinds.
    pub entity_id: String,
    /// The kind of entity referenced by `entity_id`.
    pub entity_type: String,
    /// Scope fields, any of which may be absent depending on entity kind.
    pub provider_id: Option<ParticipantId>,
    /// See `provider_id`.
    pub consumer_id: Option<ParticipantId>,
    /// See `provider_id`.
    pub agent_id: Option<AgentId>,
    /// Structured delta: before/after snapshots of changed fields only.
    pub diff: EventDiff,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Before/after snapshot of an [`Event`]'s changed fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDiff {
    /// State before the mutation; `None` for create events.
    pub before: Option<serde_json::Value>,
    /// State after the mutation; `None` for delete/terminal events.
    pub after: Option<serde_json::Value>,
}

impl EventDiff {
    /// An empty diff, used when a mutation produced no observable change
    /// (e.g. the second application of an idempotent hot-update, §8.7).
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            before: None,
            after: None,
        }
    }
}

/// An external consumer's cursor into the event journal (§3, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSubscription {
    /// String key identifying the subscriber.
    pub subscriber_id: String,
    /// The sequence number of the last event this subscriber acknowledged.
    pub last_event_sequence_processed: u64,
    /// The instance id currently holding the lease, if any.
    pub lease_instance_id: Option<String>,
    /// When the current lease expires; meaningless if `lease_instance_id`
    /// is `None`.
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// Administrative pause/resume flag.
    pub is_active: bool,
}

impl EventSubscription {
    /// Whether the lease is currently held by anyone (`leaseExpiresAt ≤
    /// now` counts as unleased, per §4.5).
    #[must_use]
    pub fn has_valid_lease(&self, now: DateTime<Utc>) -> bool {
        match (self.lease_instance_id.as_ref(), self.lease_expires_at) {
            (Some(_), Some(expires)) => expires > now,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_states() {
        assert!(ServiceStatus::Created.is_stable());
        assert!(ServiceStatus::Started.is_stable());
        assert!(ServiceStatus::Stopped.is_stable());
        assert!(!ServiceStatus::New.is_stable());
        assert!(!ServiceStatus::Failed.is_stable());
        assert!(!ServiceStatus::Deleted.is_stable());
    }

    #[test]
    fn transitional_states() {
        assert!(ServiceStatus::Creating.is_transitional());
        assert!(ServiceStatus::ColdUpdating.is_transitional());
        assert!(!ServiceStatus::Created.is_transitional());
    }

    #[test]
    fn job_action_priorities() {
        assert_eq!(JobAction::Delete.default_priority(), 100);
        assert_eq!(JobAction::Create.default_priority(), 50);
        assert_eq!(JobAction::ColdUpdate.default_priority(), 40);
        assert_eq!(JobAction::HotUpdate.default_priority(), 30);
        assert_eq!(JobAction::Start.default_priority(), 20);
        assert_eq!(JobAction::Stop.default_priority(), 20);
    }

    #[test]
    fn agent_selectable_only_when_connected() {
        assert!(AgentStatus::Connected.is_selectable());
        assert!(!AgentStatus::Disconnected.is_selectable());
        assert!(!AgentStatus::Disabled.is_selectable());
        assert!(!AgentStatus::Error.is_selectable());
        assert!(!AgentStatus::New.is_selectable());
    }

    #[test]
    fn lease_validity() {
        let now = Utc::now();
        let mut sub = EventSubscription {
            subscriber_id: "bill".into(),
            last_event_sequence_processed: 0,
            lease_instance_id: None,
            lease_expires_at: None,
            is_active: true,
        };
        assert!(!sub.has_valid_lease(now));

        sub.lease_instance_id = Some("inst-1".into());
        sub.lease_expires_at = Some(now + chrono::Duration::seconds(30));
        assert!(sub.has_valid_lease(now));
        assert!(!sub.has_valid_lease(now + chrono::Duration::seconds(31)));
    }
}

//! `RocksDB` storage layer for the Fulcrum control plane.
//!
//! This crate provides persistent storage for every entity in the data
//! model using `RocksDB` with column families for efficient indexing, plus
//! a transactional primitive (see [`Store::with_tx`]) that gives callers a
//! single atomic `WriteBatch` and gap-free event sequence assignment.
//!
//! # Architecture
//!
//! The storage uses one column family per entity plus one per secondary
//! index; see [`schema::cf`] for the full list. Lookups by id go straight
//! to the primary column family; scoped listings (agents by provider,
//! services by group, the per-agent job dispatch queue, …) go through a
//! `scope || entity_id`-keyed index column family that supports an
//! efficient prefix scan.
//!
//! # Example
//!
//! ```no_run
//! use fulcrum_store::{RocksStore, Store};
//! use fulcrum_core::ParticipantId;
//!
//! let store = RocksStore::open("/tmp/fulcrum-db").unwrap();
//! let consumer_id = ParticipantId::generate();
//! let groups = store.list_service_groups_by_consumer(&consumer_id).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;
pub mod types;

pub use error::{Result, StoreError};
pub use rocks::{RocksStore, Transaction};
pub use types::{
    Agent, AgentStatus, AgentType, Event, EventDiff, EventSubscription, InitiatorType, Job,
    JobAction, JobStatus, Participant, ParticipantStatus, PropertyMutability, PropertyRule,
    PropertySource, Service, ServiceGroup, ServiceStatus, ServiceType,
};

use fulcrum_core::{
    AgentId, AgentTypeId, JobId, ParticipantId, ServiceGroupId, ServiceId, ServiceTypeId,
};

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer so the control plane can be
/// exercised against a real `RocksDB` instance or (in tests) a
/// temporary-directory-backed one interchangeably.
pub trait Store: Send + Sync {
    // =========================================================================
    // Participant operations
    // =========================================================================

    /// Insert or update a participant record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_participant(&self, participant: &Participant) -> Result<()>;

    /// Get a participant by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_participant(&self, id: &ParticipantId) -> Result<Option<Participant>>;

    // =========================================================================
    // Agent type operations
    // =========================================================================

    /// Insert or update an agent-type record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_agent_type(&self, agent_type: &AgentType) -> Result<()>;

    /// Get an agent type by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_agent_type(&self, id: &AgentTypeId) -> Result<Option<AgentType>>;

    /// List every agent type. Agent types are a reference entity with a
    /// small, administrator-managed cardinality, so a full scan is the
    /// straightforward way to resolve "which agent types support this
    /// service type" during agent matching (§4.3).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_agent_types(&self) -> Result<Vec<AgentType>>;

    // =========================================================================
    // Agent operations
    // =========================================================================

    /// Insert or update an agent record, maintaining the provider and
    /// agent-type indexes.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_agent(&self, agent: &Agent) -> Result<()>;

    /// Get an agent by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_agent(&self, id: &AgentId) -> Result<Option<Agent>>;

    /// List all agents owned by a provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_agents_by_provider(&self, provider_id: &ParticipantId) -> Result<Vec<Agent>>;

    /// List all agents of a given agent type, the candidate pool for
    /// service-to-agent matching.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_agents_by_type(&self, agent_type_id: &AgentTypeId) -> Result<Vec<Agent>>;

    /// List every agent, for the connectivity sweeper (§4.3). Bounded by
    /// the deployment's total agent count, which this coordinator's
    /// single-process design already assumes is modest.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_agents(&self) -> Result<Vec<Agent>>;

    // =========================================================================
    // Service group operations
    // =========================================================================

    /// Insert or update a service-group record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_service_group(&self, group: &ServiceGroup) -> Result<()>;

    /// Get a service group by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_service_group(&self, id: &ServiceGroupId) -> Result<Option<ServiceGroup>>;

    /// List all service groups owned by a consumer.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_service_groups_by_consumer(
        &self,
        consumer_id: &ParticipantId,
    ) -> Result<Vec<ServiceGroup>>;

    // =========================================================================
    // Service type operations
    // =========================================================================

    /// Insert or update a service-type record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_service_type(&self, service_type: &ServiceType) -> Result<()>;

    /// Get a service type by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_service_type(&self, id: &ServiceTypeId) -> Result<Option<ServiceType>>;

    // =========================================================================
    // Service operations
    // =========================================================================

    /// Insert or update a service record outside of a transaction. Used for
    /// seeding and by callers that don't need a paired job/event write.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_service(&self, service: &Service) -> Result<()>;

    /// Get a service by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_service(&self, id: &ServiceId) -> Result<Option<Service>>;

    /// List all services in a group.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_services_by_group(&self, group_id: &ServiceGroupId) -> Result<Vec<Service>>;

    /// List all services assigned to an agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_services_by_agent(&self, agent_id: &AgentId) -> Result<Vec<Service>>;

    // =========================================================================
    // Job operations
    // =========================================================================

    /// Get a job by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_job(&self, id: &JobId) -> Result<Option<Job>>;

    /// List all jobs dispatched for a service, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_jobs_by_service(&self, service_id: &ServiceId) -> Result<Vec<Job>>;

    /// List up to `limit` pending jobs queued for an agent, in dispatch
    /// order (highest priority first, oldest first within a priority).
    /// Read-only; does not claim anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_pending_jobs_for_agent(&self, agent_id: &AgentId, limit: usize) -> Result<Vec<Job>>;

    /// Atomically claim a specific job by id, marking it `Processing`. Locks
    /// on the job id itself, so two concurrent claims of the same job race
    /// on that lock rather than on the agent's queue: exactly one observes
    /// `Pending` and wins, the other sees `Processing` (or `Completed` /
    /// `Failed`, if it lost by more than a beat) and gets
    /// [`StoreError::Conflict`].
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no job with this id exists, or
    /// `StoreError::Conflict` if it is not currently `Pending`.
    fn claim_job(&self, job_id: &JobId) -> Result<Job>;

    /// List jobs still `Processing` whose `claimed_at` is at or before
    /// `cutoff`, for the job-timeout sweeper.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_processing_jobs_claimed_before(
        &self,
        cutoff: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<Job>>;

    // =========================================================================
    // Event operations
    // =========================================================================

    /// The highest sequence number assigned so far, or 0 if the journal is
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn latest_event_sequence(&self) -> Result<u64>;

    /// List events with `sequence > after`, oldest first, up to `limit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_events_since(&self, after: u64, limit: usize) -> Result<Vec<Event>>;

    // =========================================================================
    // Event subscription operations
    // =========================================================================

    /// Get a subscription by subscriber id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_subscription(&self, subscriber_id: &str) -> Result<Option<EventSubscription>>;

    /// Insert or update a subscription record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_subscription(&self, subscription: &EventSubscription) -> Result<()>;

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Run `f` with an exclusive lock on `lock_key` held for its duration.
    /// Every write `f` issues through the passed [`rocks::StoreTxn`] is
    /// buffered and committed as a single atomic `WriteBatch` only if `f`
    /// returns `Ok`; any event appended through it is assigned the next
    /// sequence number under the same lock, so sequence assignment is
    /// gap-free with respect to every other `with_tx` call (§5, §9).
    ///
    /// Callers lock on the id of the entity they are about to
    /// read-modify-write: a service id for commander operations, an agent
    /// id for job-queue operations, a subscriber id for lease operations.
    ///
    /// # Errors
    ///
    /// Returns an error if `f` returns an error, or if the underlying
    /// database write fails.
    fn with_tx<T>(
        &self,
        lock_key: &str,
        f: impl FnOnce(&mut dyn rocks::StoreTxn) -> Result<T>,
    ) -> Result<T>;
}

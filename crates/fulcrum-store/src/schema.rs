//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary participant records, keyed by `participant_id`.
    pub const PARTICIPANTS: &str = "participants";

    /// Primary agent-type records, keyed by `agent_type_id`.
    pub const AGENT_TYPES: &str = "agent_types";

    /// Primary agent records, keyed by `agent_id`.
    pub const AGENTS: &str = "agents";

    /// Index: agents by provider, keyed by `provider_id || agent_id`.
    pub const AGENTS_BY_PROVIDER: &str = "agents_by_provider";

    /// Index: agents by agent type, keyed by `agent_type_id || agent_id`.
    pub const AGENTS_BY_TYPE: &str = "agents_by_type";

    /// Primary service-group records, keyed by `group_id`.
    pub const SERVICE_GROUPS: &str = "service_groups";

    /// Index: service groups by consumer, keyed by `consumer_id || group_id`.
    pub const SERVICE_GROUPS_BY_CONSUMER: &str = "service_groups_by_consumer";

    /// Primary service-type records, keyed by `service_type_id`.
    pub const SERVICE_TYPES: &str = "service_types";

    /// Primary service records, keyed by `service_id`.
    pub const SERVICES: &str = "services";

    /// Index: services by group, keyed by `group_id || service_id`.
    pub const SERVICES_BY_GROUP: &str = "services_by_group";

    /// Index: services by agent, keyed by `agent_id || service_id`.
    pub const SERVICES_BY_AGENT: &str = "services_by_agent";

    /// Primary job records, keyed by `job_id`.
    pub const JOBS: &str = "jobs";

    /// Dispatch queue: pending jobs only, keyed by
    /// `agent_id || inverted_priority || created_at || job_id`. Entries are
    /// removed from this column family the moment a job is claimed.
    pub const JOBS_QUEUE: &str = "jobs_queue";

    /// In-flight index: processing jobs only, keyed by `claimed_at || job_id`,
    /// scanned by the job-timeout sweeper.
    pub const JOBS_PROCESSING: &str = "jobs_processing";

    /// Index: jobs by service, keyed by `service_id || job_id`.
    pub const JOBS_BY_SERVICE: &str = "jobs_by_service";

    /// Journal records, keyed by the big-endian `sequence` number.
    pub const EVENTS: &str = "events";

    /// Subscription cursors, keyed by `subscriber_id`.
    pub const EVENT_SUBSCRIPTIONS: &str = "event_subscriptions";

    /// Singleton metadata values (currently only the event sequence counter).
    pub const META: &str = "meta";
}

/// The key under [`cf::META`] holding the next unassigned event sequence
/// number, as an 8-byte big-endian `u64`.
pub const SEQUENCE_COUNTER_KEY: &[u8] = b"event_sequence";

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::PARTICIPANTS,
        cf::AGENT_TYPES,
        cf::AGENTS,
        cf::AGENTS_BY_PROVIDER,
        cf::AGENTS_BY_TYPE,
        cf::SERVICE_GROUPS,
        cf::SERVICE_GROUPS_BY_CONSUMER,
        cf::SERVICE_TYPES,
        cf::SERVICES,
        cf::SERVICES_BY_GROUP,
        cf::SERVICES_BY_AGENT,
        cf::JOBS,
        cf::JOBS_QUEUE,
        cf::JOBS_PROCESSING,
        cf::JOBS_BY_SERVICE,
        cf::EVENTS,
        cf::EVENT_SUBSCRIPTIONS,
        cf::META,
    ]
}

//! Key encoding utilities for `RocksDB`.
//!
//! This module provides functions to encode and decode keys for various indexes.
//! All keys are designed to support efficient prefix scans.

use chrono::{DateTime, Utc};
use fulcrum_core::{AgentId, AgentTypeId, JobId, ParticipantId, ServiceGroupId, ServiceId};

/// Encode a primary key from a 16-byte id (all ids are UUID-based).
#[must_use]
pub fn id_key(id: &[u8]) -> Vec<u8> {
    id.to_vec()
}

/// Encode a two-id index key: `outer || inner`, for scoped prefix scans.
#[must_use]
pub fn scoped_key(outer: &[u8], inner: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(outer.len() + inner.len());
    key.extend_from_slice(outer);
    key.extend_from_slice(inner);
    key
}

/// Extract the trailing 16-byte id from a `scoped_key`-style key whose
/// prefix is exactly 16 bytes.
///
/// # Panics
///
/// Panics if the key is shorter than 32 bytes.
#[must_use]
pub fn extract_trailing_id(key: &[u8]) -> [u8; 16] {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    bytes
}

/// Encode a timestamp as a sortable big-endian millisecond count.
#[must_use]
pub fn timestamp_be(ts: DateTime<Utc>) -> [u8; 8] {
    ts.timestamp_millis().to_be_bytes()
}

/// Encode a priority so that ascending byte order yields descending
/// priority order (higher-priority jobs dispatch first).
#[must_use]
pub fn inverted_priority_be(priority: i32) -> [u8; 4] {
    (i32::MAX - priority).to_be_bytes()
}

/// Encode the pending-job dispatch queue key:
/// `agent_id || inverted_priority || created_at || job_id`.
#[must_use]
pub fn job_queue_key(
    agent_id: &AgentId,
    priority: i32,
    created_at: DateTime<Utc>,
    job_id: &JobId,
) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + 4 + 8 + 16);
    key.extend_from_slice(agent_id.as_bytes());
    key.extend_from_slice(&inverted_priority_be(priority));
    key.extend_from_slice(&timestamp_be(created_at));
    key.extend_from_slice(job_id.as_bytes());
    key
}

/// Encode the processing-job sweep index key: `claimed_at || job_id`.
#[must_use]
pub fn job_processing_key(claimed_at: DateTime<Utc>, job_id: &JobId) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + 16);
    key.extend_from_slice(&timestamp_be(claimed_at));
    key.extend_from_slice(job_id.as_bytes());
    key
}

/// Extract the trailing job id from a `job_queue_key` or `job_processing_key`.
#[must_use]
pub fn extract_job_id(key: &[u8]) -> JobId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[key.len() - 16..]);
    JobId::from_uuid(uuid::Uuid::from_bytes(bytes))
}

/// Encode a subscriber key (its string id, UTF-8).
#[must_use]
pub fn subscriber_key(subscriber_id: &str) -> Vec<u8> {
    subscriber_id.as_bytes().to_vec()
}

/// Encode a big-endian event sequence key.
#[must_use]
pub fn sequence_key(sequence: u64) -> [u8; 8] {
    sequence.to_be_bytes()
}

/// Prefix for scanning all agents owned by a provider.
#[must_use]
pub fn provider_prefix(provider_id: &ParticipantId) -> Vec<u8> {
    provider_id.as_bytes().to_vec()
}

/// Prefix for scanning all agents of a given type.
#[must_use]
pub fn agent_type_prefix(agent_type_id: &AgentTypeId) -> Vec<u8> {
    agent_type_id.as_bytes().to_vec()
}

/// Prefix for scanning all service groups owned by a consumer.
#[must_use]
pub fn consumer_prefix(consumer_id: &ParticipantId) -> Vec<u8> {
    consumer_id.as_bytes().to_vec()
}

/// Prefix for scanning all services in a group.
#[must_use]
pub fn group_prefix(group_id: &ServiceGroupId) -> Vec<u8> {
    group_id.as_bytes().to_vec()
}

/// Prefix for scanning all services/jobs belonging to an agent.
#[must_use]
pub fn agent_prefix(agent_id: &AgentId) -> Vec<u8> {
    agent_id.as_bytes().to_vec()
}

/// Prefix for scanning all jobs belonging to a service.
#[must_use]
pub fn service_prefix(service_id: &ServiceId) -> Vec<u8> {
    service_id.as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fulcrum_core::ServiceTypeId;

    #[test]
    fn scoped_key_roundtrip() {
        let provider = ParticipantId::generate();
        let agent = AgentId::generate();

        let key = scoped_key(provider.as_bytes(), agent.as_bytes());
        assert_eq!(key.len(), 32);
        assert_eq!(&extract_trailing_id(&key), agent.as_bytes());
    }

    #[test]
    fn prefix_scan_simulation() {
        let provider = ParticipantId::generate();
        let agent1 = AgentId::generate();
        let agent2 = AgentId::generate();

        let key1 = scoped_key(provider.as_bytes(), agent1.as_bytes());
        let key2 = scoped_key(provider.as_bytes(), agent2.as_bytes());
        let prefix = provider_prefix(&provider);

        assert!(key1.starts_with(&prefix));
        assert!(key2.starts_with(&prefix));
    }

    #[test]
    fn job_queue_key_orders_by_priority_then_age() {
        let agent = AgentId::generate();
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(1);

        let high_old = job_queue_key(&agent, 100, t0, &JobId::generate());
        let high_new = job_queue_key(&agent, 100, t1, &JobId::generate());
        let low_old = job_queue_key(&agent, 20, t0, &JobId::generate());

        // Same priority: older created_at sorts first.
        assert!(high_old < high_new);
        // Higher priority sorts before lower priority regardless of age.
        assert!(high_new < low_old);
    }

    #[test]
    fn extract_job_id_roundtrip() {
        let agent = AgentId::generate();
        let job_id = JobId::generate();
        let key = job_queue_key(&agent, 50, Utc::now(), &job_id);
        assert_eq!(extract_job_id(&key), job_id);
    }

    #[test]
    fn service_type_id_not_confused_with_agent_type_id() {
        let service_type = ServiceTypeId::generate();
        let agent_type = AgentTypeId::generate();
        assert_ne!(service_type.to_canonical(), agent_type.to_canonical());
    }
}

//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store`
//! trait, including the transactional `with_tx` primitive: a coarse
//! per-entity-id lock table (so two callers touching different services
//! never block each other) guarding a single `WriteBatch` commit, plus a
//! dedicated lock serializing the event sequence counter across entities.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use fulcrum_core::{
    AgentId, AgentTypeId, EventId, JobId, ParticipantId, ServiceGroupId, ServiceId, ServiceTypeId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf, SEQUENCE_COUNTER_KEY};
use crate::types::{
    Agent, AgentType, Event, EventDiff, EventSubscription, InitiatorType, Job, JobStatus,
    Participant, Service, ServiceGroup, ServiceType,
};
use crate::Store;

/// Number of stripes in the per-entity lock table. Coarse on purpose: two
/// unrelated ids occasionally hashing to the same stripe only costs a
/// little contention. Correctness of event ordering does not rely on this
/// table at all — that's `sequence_lock`'s job.
const LOCK_STRIPES: usize = 64;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    locks: Vec<Mutex<()>>,
    /// Serializes the read-modify-write of the event sequence counter
    /// across `with_tx` calls on different entities. The per-entity stripe
    /// lock above does not provide this: two services can hash to
    /// different stripes and run concurrently, and both would otherwise
    /// read the same starting sequence.
    sequence_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let locks = (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect();

        Ok(Self {
            db: Arc::new(db),
            locks,
            sequence_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Acquire the stripe lock for `key`, held for the duration of the
    /// returned guard.
    fn lock_for(&self, key: &str) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let shard = (hasher.finish() as usize) % self.locks.len();
        self.locks[shard].lock()
    }

    fn read_sequence_counter(&self) -> Result<u64> {
        let cf = self.cf(cf::META)?;
        let raw = self
            .db
            .get_cf(&cf, SEQUENCE_COUNTER_KEY)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(raw.map_or(0, |bytes| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes);
            u64::from_be_bytes(buf)
        }))
    }

    fn scan_prefix<T: serde::de::DeserializeOwned>(
        &self,
        index_cf: &str,
        primary_cf: &str,
        prefix: &[u8],
    ) -> Result<Vec<T>> {
        let cf_index = self.cf(index_cf)?;
        let cf_primary = self.cf(primary_cf)?;

        let mut out = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf_index, IteratorMode::From(prefix, rocksdb::Direction::Forward));

        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            let id_bytes = keys::extract_trailing_id(&key);
            if let Some(value) = self
                .db
                .get_cf(&cf_primary, id_bytes)
                .map_err(|e| StoreError::Database(e.to_string()))?
            {
                out.push(Self::deserialize(&value)?);
            }
        }
        Ok(out)
    }

    /// Deserialize every value in a primary column family, with no
    /// prefix filtering. Reserved for reference entities and bounded
    /// populations where a full scan is the straightforward answer
    /// (agent types, the agent roster for the connectivity sweeper).
    fn scan_all<T: serde::de::DeserializeOwned>(&self, primary_cf: &str) -> Result<Vec<T>> {
        let cf = self.cf(primary_cf)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            out.push(Self::deserialize(&value)?);
        }
        Ok(out)
    }
}

/// The write surface exposed inside a [`Store::with_tx`] closure. Every
/// method stages its writes into the enclosing `WriteBatch`; nothing
/// touches the database until the closure returns `Ok` and the batch
/// commits.
pub trait StoreTxn {
    /// Stage an upsert of a service record.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn put_service(&mut self, service: &Service) -> Result<()>;

    /// Stage the creation of a new, `Pending` job: adds it to the primary
    /// record, the per-agent dispatch queue, and the by-service index.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn create_job(&mut self, job: &Job) -> Result<()>;

    /// Stage the terminal update of a job already `Completed` or `Failed`:
    /// updates the primary record and removes it from the in-flight
    /// processing index.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn finish_job(&mut self, job: &Job) -> Result<()>;

    /// Stage an upsert of a subscription record.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn put_subscription(&mut self, subscription: &EventSubscription) -> Result<()>;

    /// Assign the next gap-free sequence number and stage a new journal
    /// record, returning the assigned [`Event`].
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    #[allow(clippy::too_many_arguments)]
    fn append_event(
        &mut self,
        event_type: String,
        initiator_type: InitiatorType,
        initiator_id: String,
        entity_id: String,
        entity_type: String,
        provider_id: Option<ParticipantId>,
        consumer_id: Option<ParticipantId>,
        agent_id: Option<AgentId>,
        diff: EventDiff,
    ) -> Result<Event>;
}

/// A buffered, not-yet-committed set of writes created by
/// [`Store::with_tx`].
pub struct Transaction<'a> {
    store: &'a RocksStore,
    batch: WriteBatch,
    next_sequence: u64,
}

impl<'a> Transaction<'a> {
    fn new(store: &'a RocksStore, starting_sequence: u64) -> Self {
        Self {
            store,
            batch: WriteBatch::default(),
            next_sequence: starting_sequence,
        }
    }
}

impl StoreTxn for Transaction<'_> {
    fn put_service(&mut self, service: &Service) -> Result<()> {
        let cf_services = self.store.cf(cf::SERVICES)?;
        let cf_by_group = self.store.cf(cf::SERVICES_BY_GROUP)?;
        let cf_by_agent = self.store.cf(cf::SERVICES_BY_AGENT)?;

        let value = RocksStore::serialize(service)?;
        self.batch
            .put_cf(&cf_services, service.id.as_bytes(), &value);
        self.batch.put_cf(
            &cf_by_group,
            keys::scoped_key(service.group_id.as_bytes(), service.id.as_bytes()),
            [],
        );
        self.batch.put_cf(
            &cf_by_agent,
            keys::scoped_key(service.agent_id.as_bytes(), service.id.as_bytes()),
            [],
        );
        Ok(())
    }

    fn create_job(&mut self, job: &Job) -> Result<()> {
        let cf_jobs = self.store.cf(cf::JOBS)?;
        let cf_queue = self.store.cf(cf::JOBS_QUEUE)?;
        let cf_by_service = self.store.cf(cf::JOBS_BY_SERVICE)?;

        let value = RocksStore::serialize(job)?;
        self.batch.put_cf(&cf_jobs, job.id.as_bytes(), &value);
        self.batch.put_cf(
            &cf_queue,
            keys::job_queue_key(&job.agent_id, job.priority, job.created_at, &job.id),
            [],
        );
        self.batch.put_cf(
            &cf_by_service,
            keys::scoped_key(job.service_id.as_bytes(), job.id.as_bytes()),
            [],
        );
        Ok(())
    }

    fn finish_job(&mut self, job: &Job) -> Result<()> {
        let cf_jobs = self.store.cf(cf::JOBS)?;
        let cf_processing = self.store.cf(cf::JOBS_PROCESSING)?;

        let value = RocksStore::serialize(job)?;
        self.batch.put_cf(&cf_jobs, job.id.as_bytes(), &value);
        if let Some(claimed_at) = job.claimed_at {
            self.batch.delete_cf(
                &cf_processing,
                keys::job_processing_key(claimed_at, &job.id),
            );
        }
        Ok(())
    }

    fn put_subscription(&mut self, subscription: &EventSubscription) -> Result<()> {
        let cf_subs = self.store.cf(cf::EVENT_SUBSCRIPTIONS)?;
        let value = RocksStore::serialize(subscription)?;
        self.batch.put_cf(
            &cf_subs,
            keys::subscriber_key(&subscription.subscriber_id),
            &value,
        );
        Ok(())
    }

    fn append_event(
        &mut self,
        event_type: String,
        initiator_type: InitiatorType,
        initiator_id: String,
        entity_id: String,
        entity_type: String,
        provider_id: Option<ParticipantId>,
        consumer_id: Option<ParticipantId>,
        agent_id: Option<AgentId>,
        diff: EventDiff,
    ) -> Result<Event> {
        self.next_sequence += 1;
        let event = Event {
            sequence: self.next_sequence,
            id: EventId::generate(),
            event_type,
            initiator_type,
            initiator_id,
            entity_id,
            entity_type,
            provider_id,
            consumer_id,
            agent_id,
            diff,
            created_at: Utc::now(),
        };

        let cf_events = self.store.cf(cf::EVENTS)?;
        let value = RocksStore::serialize(&event)?;
        self.batch
            .put_cf(&cf_events, keys::sequence_key(event.sequence), &value);

        Ok(event)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Participant operations
    // =========================================================================

    fn put_participant(&self, participant: &Participant) -> Result<()> {
        let cf = self.cf(cf::PARTICIPANTS)?;
        let value = Self::serialize(participant)?;
        self.db
            .put_cf(&cf, participant.id.as_bytes(), value)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    fn get_participant(&self, id: &ParticipantId) -> Result<Option<Participant>> {
        let cf = self.cf(cf::PARTICIPANTS)?;
        self.db
            .get_cf(&cf, id.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    // =========================================================================
    // Agent type operations
    // =========================================================================

    fn put_agent_type(&self, agent_type: &AgentType) -> Result<()> {
        let cf = self.cf(cf::AGENT_TYPES)?;
        let value = Self::serialize(agent_type)?;
        self.db
            .put_cf(&cf, agent_type.id.as_bytes(), value)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    fn get_agent_type(&self, id: &AgentTypeId) -> Result<Option<AgentType>> {
        let cf = self.cf(cf::AGENT_TYPES)?;
        self.db
            .get_cf(&cf, id.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_agent_types(&self) -> Result<Vec<AgentType>> {
        self.scan_all(cf::AGENT_TYPES)
    }

    // =========================================================================
    // Agent operations
    // =========================================================================

    fn put_agent(&self, agent: &Agent) -> Result<()> {
        let cf_agents = self.cf(cf::AGENTS)?;
        let cf_by_provider = self.cf(cf::AGENTS_BY_PROVIDER)?;
        let cf_by_type = self.cf(cf::AGENTS_BY_TYPE)?;

        let value = Self::serialize(agent)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_agents, agent.id.as_bytes(), &value);
        // Provider and agent type are fixed at creation, so these index
        // entries are always idempotent re-puts, never stale leftovers.
        batch.put_cf(
            &cf_by_provider,
            keys::scoped_key(agent.provider_id.as_bytes(), agent.id.as_bytes()),
            [],
        );
        batch.put_cf(
            &cf_by_type,
            keys::scoped_key(agent.agent_type_id.as_bytes(), agent.id.as_bytes()),
            [],
        );

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    fn get_agent(&self, id: &AgentId) -> Result<Option<Agent>> {
        let cf = self.cf(cf::AGENTS)?;
        self.db
            .get_cf(&cf, id.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_agents_by_provider(&self, provider_id: &ParticipantId) -> Result<Vec<Agent>> {
        self.scan_prefix(
            cf::AGENTS_BY_PROVIDER,
            cf::AGENTS,
            &keys::provider_prefix(provider_id),
        )
    }

    fn list_agents_by_type(&self, agent_type_id: &AgentTypeId) -> Result<Vec<Agent>> {
        self.scan_prefix(
            cf::AGENTS_BY_TYPE,
            cf::AGENTS,
            &keys::agent_type_prefix(agent_type_id),
        )
    }

    fn list_agents(&self) -> Result<Vec<Agent>> {
        self.scan_all(cf::AGENTS)
    }

    // =========================================================================
    // Service group operations
    // =========================================================================

    fn put_service_group(&self, group: &ServiceGroup) -> Result<()> {
        let cf_groups = self.cf(cf::SERVICE_GROUPS)?;
        let cf_by_consumer = self.cf(cf::SERVICE_GROUPS_BY_CONSUMER)?;

        let value = Self::serialize(group)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_groups, group.id.as_bytes(), &value);
        batch.put_cf(
            &cf_by_consumer,
            keys::scoped_key(group.consumer_id.as_bytes(), group.id.as_bytes()),
            [],
        );

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    fn get_service_group(&self, id: &ServiceGroupId) -> Result<Option<ServiceGroup>> {
        let cf = self.cf(cf::SERVICE_GROUPS)?;
        self.db
            .get_cf(&cf, id.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_service_groups_by_consumer(
        &self,
        consumer_id: &ParticipantId,
    ) -> Result<Vec<ServiceGroup>> {
        self.scan_prefix(
            cf::SERVICE_GROUPS_BY_CONSUMER,
            cf::SERVICE_GROUPS,
            &keys::consumer_prefix(consumer_id),
        )
    }

    // =========================================================================
    // Service type operations
    // =========================================================================

    fn put_service_type(&self, service_type: &ServiceType) -> Result<()> {
        let cf = self.cf(cf::SERVICE_TYPES)?;
        let value = Self::serialize(service_type)?;
        self.db
            .put_cf(&cf, service_type.id.as_bytes(), value)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    fn get_service_type(&self, id: &ServiceTypeId) -> Result<Option<ServiceType>> {
        let cf = self.cf(cf::SERVICE_TYPES)?;
        self.db
            .get_cf(&cf, id.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    // =========================================================================
    // Service operations
    // =========================================================================

    fn put_service(&self, service: &Service) -> Result<()> {
        let cf_services = self.cf(cf::SERVICES)?;
        let cf_by_group = self.cf(cf::SERVICES_BY_GROUP)?;
        let cf_by_agent = self.cf(cf::SERVICES_BY_AGENT)?;

        let value = Self::serialize(service)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_services, service.id.as_bytes(), &value);
        batch.put_cf(
            &cf_by_group,
            keys::scoped_key(service.group_id.as_bytes(), service.id.as_bytes()),
            [],
        );
        batch.put_cf(
            &cf_by_agent,
            keys::scoped_key(service.agent_id.as_bytes(), service.id.as_bytes()),
            [],
        );

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    fn get_service(&self, id: &ServiceId) -> Result<Option<Service>> {
        let cf = self.cf(cf::SERVICES)?;
        self.db
            .get_cf(&cf, id.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_services_by_group(&self, group_id: &ServiceGroupId) -> Result<Vec<Service>> {
        self.scan_prefix(
            cf::SERVICES_BY_GROUP,
            cf::SERVICES,
            &keys::group_prefix(group_id),
        )
    }

    fn list_services_by_agent(&self, agent_id: &AgentId) -> Result<Vec<Service>> {
        self.scan_prefix(
            cf::SERVICES_BY_AGENT,
            cf::SERVICES,
            &keys::agent_prefix(agent_id),
        )
    }

    // =========================================================================
    // Job operations
    // =========================================================================

    fn get_job(&self, id: &JobId) -> Result<Option<Job>> {
        let cf = self.cf(cf::JOBS)?;
        self.db
            .get_cf(&cf, id.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_jobs_by_service(&self, service_id: &ServiceId) -> Result<Vec<Job>> {
        self.scan_prefix(
            cf::JOBS_BY_SERVICE,
            cf::JOBS,
            &keys::service_prefix(service_id),
        )
    }

    fn list_pending_jobs_for_agent(&self, agent_id: &AgentId, limit: usize) -> Result<Vec<Job>> {
        let cf_queue = self.cf(cf::JOBS_QUEUE)?;
        let prefix = keys::agent_prefix(agent_id);

        let mut out = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf_queue, IteratorMode::From(&prefix, rocksdb::Direction::Forward));

        for item in iter {
            if out.len() >= limit {
                break;
            }
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            let job_id = keys::extract_job_id(&key);
            if let Some(job) = self.get_job(&job_id)? {
                out.push(job);
            }
        }
        Ok(out)
    }

    fn claim_job(&self, job_id: &JobId) -> Result<Job> {
        let _guard = self.lock_for(&job_id.to_canonical());

        let mut job = self.get_job(job_id)?.ok_or(StoreError::NotFound)?;
        if job.status != JobStatus::Pending {
            return Err(StoreError::Conflict(format!(
                "job {job_id} is not pending (status: {:?})",
                job.status
            )));
        }

        let queue_key = keys::job_queue_key(&job.agent_id, job.priority, job.created_at, job_id);

        let now = Utc::now();
        job.status = JobStatus::Processing;
        job.claimed_at = Some(now);
        job.updated_at = now;

        let cf_queue = self.cf(cf::JOBS_QUEUE)?;
        let cf_processing = self.cf(cf::JOBS_PROCESSING)?;
        let cf_jobs = self.cf(cf::JOBS)?;
        let value = Self::serialize(&job)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_queue, &queue_key);
        batch.put_cf(&cf_processing, keys::job_processing_key(now, job_id), []);
        batch.put_cf(&cf_jobs, job_id.as_bytes(), &value);

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(job)
    }

    fn list_processing_jobs_claimed_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Job>> {
        let cf_processing = self.cf(cf::JOBS_PROCESSING)?;
        let cf_jobs = self.cf(cf::JOBS)?;

        let mut out = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf_processing, IteratorMode::Start);

        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let mut ts_bytes = [0u8; 8];
            ts_bytes.copy_from_slice(&key[..8]);
            let claimed_at_millis = i64::from_be_bytes(ts_bytes);
            if claimed_at_millis > cutoff.timestamp_millis() {
                break;
            }
            let job_id = keys::extract_job_id(&key);
            if let Some(value) = self
                .db
                .get_cf(&cf_jobs, job_id.as_bytes())
                .map_err(|e| StoreError::Database(e.to_string()))?
            {
                out.push(Self::deserialize(&value)?);
            }
        }
        Ok(out)
    }

    // =========================================================================
    // Event operations
    // =========================================================================

    fn latest_event_sequence(&self) -> Result<u64> {
        self.read_sequence_counter()
    }

    fn list_events_since(&self, after: u64, limit: usize) -> Result<Vec<Event>> {
        let cf = self.cf(cf::EVENTS)?;
        let start = keys::sequence_key(after + 1);

        let mut out = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&start, rocksdb::Direction::Forward));

        for item in iter {
            if out.len() >= limit {
                break;
            }
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            out.push(Self::deserialize(&value)?);
        }
        Ok(out)
    }

    // =========================================================================
    // Event subscription operations
    // =========================================================================

    fn get_subscription(&self, subscriber_id: &str) -> Result<Option<EventSubscription>> {
        let cf = self.cf(cf::EVENT_SUBSCRIPTIONS)?;
        self.db
            .get_cf(&cf, keys::subscriber_key(subscriber_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn put_subscription(&self, subscription: &EventSubscription) -> Result<()> {
        let cf = self.cf(cf::EVENT_SUBSCRIPTIONS)?;
        let value = Self::serialize(subscription)?;
        self.db
            .put_cf(&cf, keys::subscriber_key(&subscription.subscriber_id), value)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    fn with_tx<T>(
        &self,
        lock_key: &str,
        f: impl FnOnce(&mut dyn StoreTxn) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.lock_for(lock_key);
        // Held until the batch commits below: the sequence counter's
        // read-modify-write must be atomic with respect to every other
        // `with_tx` call, not just ones sharing this entity's stripe.
        let _seq_guard = self.sequence_lock.lock();

        let starting_sequence = self.read_sequence_counter()?;
        let mut txn = Transaction::new(self, starting_sequence);

        let result = f(&mut txn)?;

        if txn.next_sequence != starting_sequence {
            let cf_meta = self.cf(cf::META)?;
            txn.batch.put_cf(
                &cf_meta,
                SEQUENCE_COUNTER_KEY,
                txn.next_sequence.to_be_bytes(),
            );
        }

        self.db
            .write(txn.batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AgentStatus, JobAction, ParticipantStatus,
    };
    use fulcrum_core::AgentTypeId as CoreAgentTypeId;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn test_agent(provider_id: ParticipantId, agent_type_id: CoreAgentTypeId) -> Agent {
        let now = Utc::now();
        Agent {
            id: AgentId::generate(),
            name: "worker-1".into(),
            provider_id,
            agent_type_id,
            tags: HashSet::new(),
            status: AgentStatus::Connected,
            last_status_update: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn participant_crud() {
        let (store, _dir) = create_test_store();
        let now = Utc::now();
        let participant = Participant {
            id: ParticipantId::generate(),
            name: "acme".into(),
            status: ParticipantStatus::Enabled,
            created_at: now,
            updated_at: now,
        };
        store.put_participant(&participant).unwrap();
        let fetched = store.get_participant(&participant.id).unwrap().unwrap();
        assert_eq!(fetched.name, "acme");
    }

    #[test]
    fn agent_indexes_by_provider_and_type() {
        let (store, _dir) = create_test_store();
        let provider = ParticipantId::generate();
        let other_provider = ParticipantId::generate();
        let agent_type = CoreAgentTypeId::generate();

        let a1 = test_agent(provider, agent_type);
        let a2 = test_agent(provider, agent_type);
        let a3 = test_agent(other_provider, agent_type);
        store.put_agent(&a1).unwrap();
        store.put_agent(&a2).unwrap();
        store.put_agent(&a3).unwrap();

        let by_provider = store.list_agents_by_provider(&provider).unwrap();
        assert_eq!(by_provider.len(), 2);

        let by_type = store.list_agents_by_type(&agent_type).unwrap();
        assert_eq!(by_type.len(), 3);
    }

    #[test]
    fn job_queue_dispatches_by_priority_then_age() {
        let (store, _dir) = create_test_store();
        let provider = ParticipantId::generate();
        let consumer = ParticipantId::generate();
        let agent_type = CoreAgentTypeId::generate();
        let agent = test_agent(provider, agent_type);
        store.put_agent(&agent).unwrap();

        let service_id = ServiceId::generate();
        let low = Job {
            id: JobId::generate(),
            agent_id: agent.id,
            service_id,
            provider_id: provider,
            consumer_id: consumer,
            action: JobAction::Start,
            status: JobStatus::Pending,
            priority: JobAction::Start.default_priority(),
            params: serde_json::json!({}),
            claimed_at: None,
            completed_at: None,
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let high = Job {
            id: JobId::generate(),
            action: JobAction::Delete,
            priority: JobAction::Delete.default_priority(),
            created_at: Utc::now() + chrono::Duration::seconds(1),
            ..low.clone()
        };

        store
            .with_tx(&agent.id.to_canonical(), |tx| {
                tx.create_job(&low)?;
                tx.create_job(&high)?;
                Ok(())
            })
            .unwrap();

        let pending = store.list_pending_jobs_for_agent(&agent.id, 10).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, high.id, "higher-priority job dispatches first");
        assert_eq!(pending[1].id, low.id);

        let claimed = store.claim_job(&high.id).unwrap();
        assert_eq!(claimed.status, JobStatus::Processing);

        let claimed2 = store.claim_job(&low.id).unwrap();
        assert_eq!(claimed2.id, low.id);

        assert!(store.list_pending_jobs_for_agent(&agent.id, 10).unwrap().is_empty());
    }

    #[test]
    fn claim_job_rejects_a_job_that_is_already_claimed() {
        let (store, _dir) = create_test_store();
        let provider = ParticipantId::generate();
        let consumer = ParticipantId::generate();
        let agent_type = CoreAgentTypeId::generate();
        let agent = test_agent(provider, agent_type);
        store.put_agent(&agent).unwrap();

        let job = Job {
            id: JobId::generate(),
            agent_id: agent.id,
            service_id: ServiceId::generate(),
            provider_id: provider,
            consumer_id: consumer,
            action: JobAction::Create,
            status: JobStatus::Pending,
            priority: JobAction::Create.default_priority(),
            params: serde_json::json!({}),
            claimed_at: None,
            completed_at: None,
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store
            .with_tx(&agent.id.to_canonical(), |tx| tx.create_job(&job))
            .unwrap();

        store.claim_job(&job.id).unwrap();
        let second = store.claim_job(&job.id);
        assert!(matches!(second, Err(StoreError::Conflict(_))));
    }

    #[test]
    fn with_tx_assigns_gapless_sequence_and_is_atomic() {
        let (store, _dir) = create_test_store();
        assert_eq!(store.latest_event_sequence().unwrap(), 0);

        let event1 = store
            .with_tx("svc-1", |tx| {
                tx.append_event(
                    "service.created".into(),
                    InitiatorType::User,
                    "user-1".into(),
                    "svc-1".into(),
                    "service".into(),
                    None,
                    None,
                    None,
                    EventDiff::empty(),
                )
            })
            .unwrap();
        assert_eq!(event1.sequence, 1);

        let event2 = store
            .with_tx("svc-2", |tx| {
                tx.append_event(
                    "service.created".into(),
                    InitiatorType::User,
                    "user-1".into(),
                    "svc-2".into(),
                    "service".into(),
                    None,
                    None,
                    None,
                    EventDiff::empty(),
                )
            })
            .unwrap();
        assert_eq!(event2.sequence, 2);
        assert_eq!(store.latest_event_sequence().unwrap(), 2);

        let events = store.list_events_since(0, 10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence, 1);
        assert_eq!(events[1].sequence, 2);
    }

    #[test]
    fn with_tx_sequence_is_gapless_under_concurrent_entities() {
        let (store, _dir) = create_test_store();
        let store = std::sync::Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = std::sync::Arc::clone(&store);
                std::thread::spawn(move || {
                    let svc = format!("svc-{i}");
                    store
                        .with_tx(&svc, |tx| {
                            tx.append_event(
                                "service.created".into(),
                                InitiatorType::User,
                                "user-1".into(),
                                svc.clone(),
                                "service".into(),
                                None,
                                None,
                                None,
                                EventDiff::empty(),
                            )
                        })
                        .unwrap()
                })
            })
            .collect();

        let mut sequences: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap().sequence).collect();
        sequences.sort_unstable();

        assert_eq!(sequences, (1..=8).collect::<Vec<u64>>());
        assert_eq!(store.latest_event_sequence().unwrap(), 8);
    }

    #[test]
    fn with_tx_rolls_back_on_error() {
        let (store, _dir) = create_test_store();

        let result: Result<()> = store.with_tx("svc-1", |tx| {
            tx.append_event(
                "service.created".into(),
                InitiatorType::System,
                "system".into(),
                "svc-1".into(),
                "service".into(),
                None,
                None,
                None,
                EventDiff::empty(),
            )?;
            Err(StoreError::Conflict("svc-1".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.latest_event_sequence().unwrap(), 0);
    }

    #[test]
    fn processing_sweep_finds_stale_claims() {
        let (store, _dir) = create_test_store();
        let provider = ParticipantId::generate();
        let consumer = ParticipantId::generate();
        let agent_type = CoreAgentTypeId::generate();
        let agent = test_agent(provider, agent_type);
        store.put_agent(&agent).unwrap();

        let job = Job {
            id: JobId::generate(),
            agent_id: agent.id,
            service_id: ServiceId::generate(),
            provider_id: provider,
            consumer_id: consumer,
            action: JobAction::Create,
            status: JobStatus::Pending,
            priority: JobAction::Create.default_priority(),
            params: serde_json::json!({}),
            claimed_at: None,
            completed_at: None,
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store
            .with_tx(&agent.id.to_canonical(), |tx| tx.create_job(&job))
            .unwrap();
        store.claim_job(&job.id).unwrap();

        let stale = store
            .list_processing_jobs_claimed_before(Utc::now() + chrono::Duration::seconds(5))
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, job.id);

        let none_yet = store
            .list_processing_jobs_claimed_before(Utc::now() - chrono::Duration::seconds(5))
            .unwrap();
        assert!(none_yet.is_empty());
    }
}

//! Event subscription lease protocol (§4.5): a single-holder lease over a
//! subscriber's read cursor through the event journal.
//!
//! Unlike the commander and dispatch operations, lease mutations append no
//! event of their own (§4.4 scopes the append-on-every-mutation rule to
//! §4.1–4.3); `with_tx` is used here purely for its per-key mutex, so two
//! callers racing on the same subscriber id still serialize correctly.

use chrono::{Duration, Utc};
use fulcrum_store::{Event, EventSubscription, Store};

use crate::error::{ControlError, Result};

fn default_subscription(subscriber_id: &str) -> EventSubscription {
    EventSubscription {
        subscriber_id: subscriber_id.to_string(),
        last_event_sequence_processed: 0,
        lease_instance_id: None,
        lease_expires_at: None,
        is_active: true,
    }
}

/// Acquire the lease for `subscriber_id` on behalf of `instance_id`.
/// Succeeds if no valid lease is held, or if `instance_id` already holds it
/// (re-acquisition is idempotent and simply extends the lease).
///
/// # Errors
///
/// Returns `ControlError::LeaseHeld` if another instance holds a valid
/// lease, or a store error.
pub fn acquire_lease<S: Store>(
    store: &S,
    subscriber_id: &str,
    instance_id: &str,
    duration: Duration,
) -> Result<EventSubscription> {
    let mut sub = store
        .get_subscription(subscriber_id)?
        .unwrap_or_else(|| default_subscription(subscriber_id));

    let now = Utc::now();
    if sub.has_valid_lease(now) && sub.lease_instance_id.as_deref() != Some(instance_id) {
        return Err(ControlError::LeaseHeld(subscriber_id.to_string()));
    }

    sub.lease_instance_id = Some(instance_id.to_string());
    sub.lease_expires_at = Some(now + duration);

    store.with_tx(subscriber_id, |txn| txn.put_subscription(&sub))?;
    Ok(sub)
}

/// Renew `instance_id`'s lease for another `duration`. Legal only for the
/// current holder.
///
/// # Errors
///
/// Returns `ControlError::SubscriberNotFound` if no subscription exists,
/// `ControlError::LeaseNotHeld` if `instance_id` is not the current holder,
/// or a store error.
pub fn renew_lease<S: Store>(
    store: &S,
    subscriber_id: &str,
    instance_id: &str,
    duration: Duration,
) -> Result<EventSubscription> {
    let mut sub = store
        .get_subscription(subscriber_id)?
        .ok_or_else(|| ControlError::SubscriberNotFound(subscriber_id.to_string()))?;

    let now = Utc::now();
    if !sub.has_valid_lease(now) || sub.lease_instance_id.as_deref() != Some(instance_id) {
        return Err(ControlError::LeaseNotHeld(subscriber_id.to_string()));
    }

    sub.lease_expires_at = Some(now + duration);
    store.with_tx(subscriber_id, |txn| txn.put_subscription(&sub))?;
    Ok(sub)
}

/// Advance the subscriber's processed cursor to `last_seq`. Requires
/// `instance_id` to currently hold the lease; `last_seq` must not go
/// backwards.
///
/// # Errors
///
/// Returns `ControlError::SubscriberNotFound`, `ControlError::LeaseNotHeld`,
/// `ControlError::Conflict` if `last_seq` is behind the current cursor, or a
/// store error.
pub fn acknowledge_events<S: Store>(
    store: &S,
    subscriber_id: &str,
    instance_id: &str,
    last_seq: u64,
) -> Result<EventSubscription> {
    let mut sub = store
        .get_subscription(subscriber_id)?
        .ok_or_else(|| ControlError::SubscriberNotFound(subscriber_id.to_string()))?;

    let now = Utc::now();
    if !sub.has_valid_lease(now) || sub.lease_instance_id.as_deref() != Some(instance_id) {
        return Err(ControlError::LeaseNotHeld(subscriber_id.to_string()));
    }
    if last_seq < sub.last_event_sequence_processed {
        return Err(ControlError::Conflict(format!(
            "subscriber {subscriber_id} cannot acknowledge sequence {last_seq} behind its cursor at {}",
            sub.last_event_sequence_processed
        )));
    }

    sub.last_event_sequence_processed = last_seq;
    store.with_tx(subscriber_id, |txn| txn.put_subscription(&sub))?;
    Ok(sub)
}

/// Release `instance_id`'s lease, if it holds one. Does not advance the
/// cursor. Releasing an already-unleased subscriber is a no-op, not an
/// error, so a crashed-then-restarted holder can clean up unconditionally.
///
/// # Errors
///
/// Returns `ControlError::SubscriberNotFound` if no subscription exists,
/// `ControlError::LeaseNotHeld` if another instance holds the lease, or a
/// store error.
pub fn release_lease<S: Store>(
    store: &S,
    subscriber_id: &str,
    instance_id: &str,
) -> Result<EventSubscription> {
    let mut sub = store
        .get_subscription(subscriber_id)?
        .ok_or_else(|| ControlError::SubscriberNotFound(subscriber_id.to_string()))?;

    match sub.lease_instance_id.as_deref() {
        Some(holder) if holder == instance_id => {
            sub.lease_instance_id = None;
            sub.lease_expires_at = None;
            store.with_tx(subscriber_id, |txn| txn.put_subscription(&sub))?;
            Ok(sub)
        }
        None => Ok(sub),
        Some(_) => Err(ControlError::LeaseNotHeld(subscriber_id.to_string())),
    }
}

/// Administratively pause or resume a subscriber. Creates the subscription
/// record if it does not yet exist, so an operator can disable a subscriber
/// before its first lease acquisition.
///
/// # Errors
///
/// Returns a store error if the write fails.
pub fn set_active<S: Store>(
    store: &S,
    subscriber_id: &str,
    active: bool,
) -> Result<EventSubscription> {
    let mut sub = store
        .get_subscription(subscriber_id)?
        .unwrap_or_else(|| default_subscription(subscriber_id));
    sub.is_active = active;
    store.with_tx(subscriber_id, |txn| txn.put_subscription(&sub))?;
    Ok(sub)
}

/// List events with `sequence > after`, oldest first, up to `limit`
/// (`listFromSequence`). The read side of a subscriber's loop; read-only.
///
/// # Errors
///
/// Returns a store error if the lookup fails.
pub fn list_from_sequence<S: Store>(store: &S, after: u64, limit: usize) -> Result<Vec<Event>> {
    Ok(store.list_events_since(after, limit)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fulcrum_store::RocksStore;
    use tempfile::TempDir;

    fn store() -> (TempDir, RocksStore) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn acquire_then_second_instance_is_rejected_until_released() {
        let (_dir, store) = store();
        acquire_lease(&store, "bill", "inst-1", Duration::seconds(30)).unwrap();

        let second = acquire_lease(&store, "bill", "inst-2", Duration::seconds(30));
        assert!(matches!(second, Err(ControlError::LeaseHeld(_))));

        release_lease(&store, "bill", "inst-1").unwrap();
        let acquired = acquire_lease(&store, "bill", "inst-2", Duration::seconds(30)).unwrap();
        assert_eq!(acquired.lease_instance_id, Some("inst-2".to_string()));
    }

    #[test]
    fn reacquiring_own_lease_is_idempotent() {
        let (_dir, store) = store();
        acquire_lease(&store, "bill", "inst-1", Duration::seconds(30)).unwrap();
        let reacquired = acquire_lease(&store, "bill", "inst-1", Duration::seconds(60)).unwrap();
        assert_eq!(reacquired.lease_instance_id, Some("inst-1".to_string()));
    }

    #[test]
    fn renew_requires_current_holder() {
        let (_dir, store) = store();
        acquire_lease(&store, "bill", "inst-1", Duration::seconds(30)).unwrap();
        let result = renew_lease(&store, "bill", "inst-2", Duration::seconds(30));
        assert!(matches!(result, Err(ControlError::LeaseNotHeld(_))));
    }

    #[test]
    fn acknowledge_advances_cursor_and_rejects_going_backwards() {
        let (_dir, store) = store();
        acquire_lease(&store, "bill", "inst-1", Duration::seconds(30)).unwrap();
        let sub = acknowledge_events(&store, "bill", "inst-1", 10).unwrap();
        assert_eq!(sub.last_event_sequence_processed, 10);

        let result = acknowledge_events(&store, "bill", "inst-1", 5);
        assert!(matches!(result, Err(ControlError::Conflict(_))));
    }

    #[test]
    fn acknowledge_without_lease_is_rejected() {
        let (_dir, store) = store();
        let result = acknowledge_events(&store, "bill", "inst-1", 1);
        assert!(matches!(result, Err(ControlError::SubscriberNotFound(_))));
    }

    #[test]
    fn set_active_creates_subscriber_record_if_missing() {
        let (_dir, store) = store();
        let sub = set_active(&store, "audit", false).unwrap();
        assert!(!sub.is_active);
        assert_eq!(sub.last_event_sequence_processed, 0);
    }

    #[test]
    fn release_by_non_holder_is_rejected() {
        let (_dir, store) = store();
        acquire_lease(&store, "bill", "inst-1", Duration::seconds(30)).unwrap();
        let result = release_lease(&store, "bill", "inst-2");
        assert!(matches!(result, Err(ControlError::LeaseNotHeld(_))));
    }
}

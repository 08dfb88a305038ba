//! Service lifecycle state machine.
//!
//! This module defines the valid state transitions for services and
//! provides validation logic to ensure state machine invariants are
//! maintained (§4.1).
//!
//! # State Machine
//!
//! ```text
//!   New ──create──▶ Creating ──▶ Created ──start──▶ Starting ──▶ Started
//!                       │                               │            │
//!                       │                              stop        stop
//!                       ▼                               ▼            ▼
//!                     Failed ◀── (job fails) ──── Stopping ◀─────────┘
//!                       │                               │
//!                    retry                            Stopped ──start──▶ Starting
//!                       │                               │
//!                       ▼                            delete
//!                  (resumes in-flight action)          ▼
//!                                                    Deleting ──▶ Deleted
//! ```
//!
//! `HotUpdating`/`ColdUpdating` branch off any stable state and return to
//! it on completion; they are reached via `update`, not `transition`, so
//! they are modeled separately below.

use fulcrum_core::ServiceId;
use fulcrum_store::{JobAction, ServiceStatus};

use crate::error::{ControlError, Result};

/// The requested target of a `transition` call (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionTarget {
    /// Bring the service to `Started`.
    Started,
    /// Bring the service to `Stopped`.
    Stopped,
    /// Tear the service down.
    Deleted,
}

impl TransitionTarget {
    const fn as_status(self) -> ServiceStatus {
        match self {
            Self::Started => ServiceStatus::Started,
            Self::Stopped => ServiceStatus::Stopped,
            Self::Deleted => ServiceStatus::Deleted,
        }
    }
}

/// Look up the `(action, targetStatus)` pair for a `transition` call from
/// `current` to `requested`, per the table in §4.1.
///
/// # Errors
///
/// Returns `ControlError::InvalidTransition` if the cell is marked "—", if
/// `current` is already transitional (an action is in flight), or if
/// `current == Failed` and `requested` is anything other than `Deleted`
/// (only `retry` or `delete` may move a failed service).
pub fn plan_transition(
    service_id: ServiceId,
    current: ServiceStatus,
    requested: TransitionTarget,
) -> Result<(JobAction, ServiceStatus)> {
    if current.is_transitional() {
        return Err(ControlError::InvalidTransition {
            service_id,
            from: current,
            to: requested.as_status(),
        });
    }

    use ServiceStatus::{Created, Failed, Started, Stopped};

    let plan = match (current, requested) {
        (Created, TransitionTarget::Started) => Some((JobAction::Start, ServiceStatus::Starting)),
        (Created, TransitionTarget::Deleted) => Some((JobAction::Delete, ServiceStatus::Deleting)),
        (Started, TransitionTarget::Stopped) => Some((JobAction::Stop, ServiceStatus::Stopping)),
        (Started, TransitionTarget::Deleted) => Some((JobAction::Delete, ServiceStatus::Deleting)),
        (Stopped, TransitionTarget::Started) => Some((JobAction::Start, ServiceStatus::Starting)),
        (Stopped, TransitionTarget::Deleted) => Some((JobAction::Delete, ServiceStatus::Deleting)),
        (Failed, TransitionTarget::Deleted) => Some((JobAction::Delete, ServiceStatus::Deleting)),
        _ => None,
    };

    plan.ok_or(ControlError::InvalidTransition {
        service_id,
        from: current,
        to: requested.as_status(),
    })
}

/// The stable status an in-flight transitional status resolves back to on
/// successful completion of its action, per the completion table in §4.1.
#[must_use]
pub const fn resolves_to(transitional: ServiceStatus) -> Option<ServiceStatus> {
    match transitional {
        ServiceStatus::Creating => Some(ServiceStatus::Created),
        ServiceStatus::Starting => Some(ServiceStatus::Started),
        ServiceStatus::Stopping => Some(ServiceStatus::Stopped),
        ServiceStatus::Deleting => Some(ServiceStatus::Deleted),
        // Hot/cold update return to whichever stable state was active
        // before the update Job was enqueued; the commander restores it
        // from the Service's own pre-update snapshot rather than from a
        // fixed table entry, since both statuses can follow any stable
        // state.
        ServiceStatus::HotUpdating | ServiceStatus::ColdUpdating => None,
        _ => None,
    }
}

/// The `JobAction` that drove the service into `transitional`, used to
/// populate `failedAction` on a Job failure.
#[must_use]
pub const fn action_for(transitional: ServiceStatus) -> Option<JobAction> {
    match transitional {
        ServiceStatus::Creating => Some(JobAction::Create),
        ServiceStatus::Starting => Some(JobAction::Start),
        ServiceStatus::Stopping => Some(JobAction::Stop),
        ServiceStatus::Deleting => Some(JobAction::Delete),
        ServiceStatus::HotUpdating => Some(JobAction::HotUpdate),
        ServiceStatus::ColdUpdating => Some(JobAction::ColdUpdate),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_can_start_or_delete() {
        let id = ServiceId::generate();
        assert!(plan_transition(id, ServiceStatus::Created, TransitionTarget::Started).is_ok());
        assert!(plan_transition(id, ServiceStatus::Created, TransitionTarget::Deleted).is_ok());
        assert!(plan_transition(id, ServiceStatus::Created, TransitionTarget::Stopped).is_err());
    }

    #[test]
    fn started_to_started_is_rejected_not_a_noop() {
        let id = ServiceId::generate();
        let result = plan_transition(id, ServiceStatus::Started, TransitionTarget::Started);
        assert!(matches!(result, Err(ControlError::InvalidTransition { .. })));
    }

    #[test]
    fn transitional_state_rejects_any_transition() {
        let id = ServiceId::generate();
        let result = plan_transition(id, ServiceStatus::Creating, TransitionTarget::Started);
        assert!(matches!(result, Err(ControlError::InvalidTransition { .. })));
    }

    #[test]
    fn failed_rejects_transition_only_retry_allowed() {
        let id = ServiceId::generate();
        let result = plan_transition(id, ServiceStatus::Failed, TransitionTarget::Deleted);
        assert!(result.is_err());
    }

    #[test]
    fn stopped_can_start_or_delete_but_not_stop() {
        let id = ServiceId::generate();
        assert!(plan_transition(id, ServiceStatus::Stopped, TransitionTarget::Started).is_ok());
        assert!(plan_transition(id, ServiceStatus::Stopped, TransitionTarget::Deleted).is_ok());
        assert!(plan_transition(id, ServiceStatus::Stopped, TransitionTarget::Stopped).is_err());
    }

    #[test]
    fn resolves_to_matches_action_for() {
        assert_eq!(resolves_to(ServiceStatus::Creating), Some(ServiceStatus::Created));
        assert_eq!(action_for(ServiceStatus::Creating), Some(JobAction::Create));
        assert_eq!(resolves_to(ServiceStatus::HotUpdating), None);
    }
}

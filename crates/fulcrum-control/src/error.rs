//! Error types for the control plane.
//!
//! This module defines all errors that can occur during service
//! provisioning, job dispatch, agent registry, and event journal
//! operations.

use fulcrum_core::{AgentId, JobId, ServiceGroupId, ServiceId, ServiceTypeId};
use fulcrum_store::{ServiceStatus, StoreError};
use thiserror::Error;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur in control plane operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The requested service was not found.
    #[error("service not found: {0}")]
    ServiceNotFound(ServiceId),

    /// The requested job was not found.
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// The requested agent was not found.
    #[error("agent not found: {0}")]
    AgentNotFound(AgentId),

    /// The requested service group was not found.
    #[error("service group not found: {0}")]
    GroupNotFound(ServiceGroupId),

    /// The requested service type was not found.
    #[error("service type not found: {0}")]
    ServiceTypeNotFound(ServiceTypeId),

    /// No subscription record exists for this subscriber id.
    #[error("no subscription for subscriber: {0}")]
    SubscriberNotFound(String),

    /// A lease acquisition lost to another valid holder.
    #[error("subscriber {0} lease is held by another instance")]
    LeaseHeld(String),

    /// The caller does not hold the current lease for this subscriber.
    #[error("caller does not hold the lease for subscriber: {0}")]
    LeaseNotHeld(String),

    /// No eligible agent was found for the requested tags and service type.
    #[error("no connected agent matches the requested tags and service type")]
    NoEligibleAgent,

    /// Both `agentId` and `agentTags` were given in a create request.
    #[error("exactly one of agentId or agentTags must be given")]
    AmbiguousAgentSelector,

    /// The service is not in a stable state required by this operation.
    #[error("service {service_id} is not stable (current status: {status:?})")]
    NotStable {
        /// The service being operated on.
        service_id: ServiceId,
        /// Its current status.
        status: ServiceStatus,
    },

    /// The requested state transition is not valid.
    #[error(
        "invalid transition for service {service_id}: cannot go from {from:?} to {to:?}"
    )]
    InvalidTransition {
        /// The service being transitioned.
        service_id: ServiceId,
        /// The current status.
        from: ServiceStatus,
        /// The requested target status.
        to: ServiceStatus,
    },

    /// `retry` was called on a service that is not `Failed`.
    #[error("service {0} is not in a failed state")]
    NotFailed(ServiceId),

    /// A property write violates its schema's `source` metadata rule.
    #[error("property '{0}' may not be written by this caller")]
    PropertySource(String),

    /// A property write violates its schema's `mutability` or
    /// `updatableInStatus` rule.
    #[error("property '{0}' is not updatable in the current state")]
    PropertyImmutable(String),

    /// A job or service write lost a race with a concurrent mutation.
    #[error("conflicting concurrent write: {0}")]
    Conflict(String),

    /// The caller's identity is not authorized for this action.
    #[error("not authorized")]
    Unauthorized,

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::ServiceNotFound(_)
            | Self::JobNotFound(_)
            | Self::AgentNotFound(_)
            | Self::GroupNotFound(_)
            | Self::ServiceTypeNotFound(_)
            | Self::SubscriberNotFound(_) => 404,
            Self::NoEligibleAgent | Self::AmbiguousAgentSelector => 400,
            Self::NotStable { .. } | Self::InvalidTransition { .. } | Self::NotFailed(_) => 409,
            Self::PropertySource(_) | Self::PropertyImmutable(_) => 422,
            Self::Conflict(_) | Self::LeaseHeld(_) | Self::LeaseNotHeld(_) => 409,
            Self::Unauthorized => 403,
            Self::Store(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Store(_) | Self::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_codes() {
        let service_id = ServiceId::generate();
        let job_id = JobId::generate();
        let agent_id = AgentId::generate();

        assert_eq!(ControlError::ServiceNotFound(service_id).http_status_code(), 404);
        assert_eq!(ControlError::JobNotFound(job_id).http_status_code(), 404);
        assert_eq!(ControlError::AgentNotFound(agent_id).http_status_code(), 404);
        assert_eq!(ControlError::NoEligibleAgent.http_status_code(), 400);
        assert_eq!(
            ControlError::InvalidTransition {
                service_id,
                from: ServiceStatus::Started,
                to: ServiceStatus::Started,
            }
            .http_status_code(),
            409
        );
        assert_eq!(
            ControlError::PropertySource("cpu".into()).http_status_code(),
            422
        );
        assert!(ControlError::Conflict("job".into()).is_retriable());
        assert!(!ControlError::NoEligibleAgent.is_retriable());
    }
}

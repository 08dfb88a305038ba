//! Authorization scopes and the `Authorizer` collaborator trait (§4.6).
//!
//! The core does not implement policy. It guarantees every entity can
//! compute its scope from its id, and it consults an `Authorizer` before
//! every mutation. Production deployments supply their own; a permissive
//! default and a scope-containment default are provided for local
//! operation and tests.

use fulcrum_core::{AgentId, Identity, ParticipantId};

use crate::error::Result;

/// The action being authorized, used only to let an `Authorizer`
/// implementation vary its policy by action; the core's own checks never
/// branch on it beyond passing it through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Read a resource.
    Read,
    /// Create a new resource.
    Create,
    /// Update an existing resource.
    Update,
    /// Delete a resource.
    Delete,
    /// Act as the owning agent (claim/complete/fail a job, report status).
    Agent,
}

/// The scope an entity belongs to, composed from its owning chain of
/// participants and agent (§4.6). Any field may be absent depending on
/// entity kind: a `ServiceGroup` carries only `consumer_id`, an `Agent`
/// only `provider_id`, and so on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    /// The participant this entity is scoped under, if not more
    /// specifically a provider or consumer.
    pub participant_id: Option<ParticipantId>,
    /// The consumer that owns this entity (directly, or via its group).
    pub consumer_id: Option<ParticipantId>,
    /// The provider that owns this entity (directly, or via its agent).
    pub provider_id: Option<ParticipantId>,
    /// The agent this entity is scoped under, if any.
    pub agent_id: Option<AgentId>,
}

impl Scope {
    /// A scope with no restriction fields set — never matches a
    /// containment check and is only meaningful for entities with no
    /// tenant ownership (none, at present).
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            participant_id: None,
            consumer_id: None,
            provider_id: None,
            agent_id: None,
        }
    }

    /// A scope restricted to a single consumer, e.g. a `ServiceGroup`.
    #[must_use]
    pub const fn consumer(consumer_id: ParticipantId) -> Self {
        Self {
            participant_id: None,
            consumer_id: Some(consumer_id),
            provider_id: None,
            agent_id: None,
        }
    }

    /// A scope restricted to a single provider, e.g. an `Agent`.
    #[must_use]
    pub const fn provider(provider_id: ParticipantId) -> Self {
        Self {
            participant_id: None,
            consumer_id: None,
            provider_id: Some(provider_id),
            agent_id: None,
        }
    }

    /// A scope restricted to both a consumer and a provider, e.g. a
    /// `Service` (derived from its group and its agent) or a `Job`
    /// (identical to its Service's scope, per §4.6).
    #[must_use]
    pub const fn consumer_and_provider(consumer_id: ParticipantId, provider_id: ParticipantId) -> Self {
        Self {
            participant_id: None,
            consumer_id: Some(consumer_id),
            provider_id: Some(provider_id),
            agent_id: None,
        }
    }

    /// Whether `identity`'s own scope contains this one: every field set
    /// on `self` must equal the corresponding field set on `identity_scope`
    /// (a field unset on `self` is unrestricted and always passes).
    #[must_use]
    pub fn contained_in(&self, identity_scope: &Scope) -> bool {
        (self.participant_id.is_none() || self.participant_id == identity_scope.participant_id)
            && (self.consumer_id.is_none() || self.consumer_id == identity_scope.consumer_id)
            && (self.provider_id.is_none() || self.provider_id == identity_scope.provider_id)
            && (self.agent_id.is_none() || self.agent_id == identity_scope.agent_id)
    }
}

/// External policy-evaluation collaborator (§4.6). Consulted before every
/// mutation; the core passes the acting `Identity`, the `Action`, and the
/// target's computed `Scope`.
pub trait Authorizer: Send + Sync {
    /// Check whether `identity` may perform `action` against an entity in
    /// `scope`.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Unauthorized` if the check fails.
    fn check(&self, identity: &Identity, action: Action, scope: &Scope) -> Result<()>;
}

/// Permissive default for local operation and tests: every check passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllAuthorizer;

impl Authorizer for AllowAllAuthorizer {
    fn check(&self, _identity: &Identity, _action: Action, _scope: &Scope) -> Result<()> {
        Ok(())
    }
}

/// Checks that the target scope is contained in the identity's own scope.
/// This is the shape a real policy engine would be swapped in for: it
/// trusts whatever scope the caller presents for itself (a production
/// deployment derives that scope from a verified token, upstream of this
/// trait) and only enforces containment.
#[derive(Debug, Clone)]
pub struct ScopedAuthorizer {
    /// The calling identity's own scope, established once per request.
    pub identity_scope: Scope,
}

impl ScopedAuthorizer {
    /// Build an authorizer that accepts anything within `identity_scope`.
    #[must_use]
    pub const fn new(identity_scope: Scope) -> Self {
        Self { identity_scope }
    }
}

impl Authorizer for ScopedAuthorizer {
    fn check(&self, _identity: &Identity, _action: Action, scope: &Scope) -> Result<()> {
        if scope.contained_in(&self.identity_scope) {
            Ok(())
        } else {
            Err(crate::error::ControlError::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_all_always_passes() {
        let authorizer = AllowAllAuthorizer;
        let identity = Identity::System;
        let scope = Scope::consumer(ParticipantId::generate());
        assert!(authorizer.check(&identity, Action::Delete, &scope).is_ok());
    }

    #[test]
    fn scoped_authorizer_rejects_foreign_consumer() {
        let mine = ParticipantId::generate();
        let other = ParticipantId::generate();
        let authorizer = ScopedAuthorizer::new(Scope::consumer(mine));

        let identity = Identity::User { id: "u1".into() };
        assert!(authorizer
            .check(&identity, Action::Read, &Scope::consumer(mine))
            .is_ok());
        assert!(authorizer
            .check(&identity, Action::Read, &Scope::consumer(other))
            .is_err());
    }

    #[test]
    fn unrestricted_field_always_passes() {
        let authorizer = ScopedAuthorizer::new(Scope::consumer(ParticipantId::generate()));
        let identity = Identity::System;
        assert!(authorizer.check(&identity, Action::Read, &Scope::empty()).is_ok());
    }
}

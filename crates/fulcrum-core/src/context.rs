//! Ambient request context.
//!
//! Every commander and querier call threads a [`RequestContext`] explicitly
//! rather than reaching for a thread-local or a global: the identity behind
//! the call, a cancellation signal propagated from the inbound request, and
//! a correlation id for tying logs and error responses back to one request.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Who is making the call, and in what capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// An authenticated human or service user.
    User {
        /// Opaque identifier for the calling user.
        id: String,
    },
    /// An agent acting under its own `AgentId`, rendered as a string to
    /// keep this crate free of a dependency on the agent id's own module
    /// ordering; callers compare against `AgentId::to_string()`.
    Agent {
        /// Canonical string form of the agent's id.
        agent_id: String,
    },
    /// The coordinator itself, acting without a human or agent behind it
    /// (background sweepers, migrations).
    System,
}

impl Identity {
    /// The sentinel initiator id used for system-driven sweeps (§4.4).
    pub const SYSTEM_INITIATOR: &'static str = "system";

    /// Render this identity's initiator kind as used on `Event.initiatorType`.
    #[must_use]
    pub const fn initiator_type(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Agent { .. } => "agent",
            Self::System => "system",
        }
    }

    /// Render this identity's initiator id as used on `Event.initiatorId`.
    #[must_use]
    pub fn initiator_id(&self) -> String {
        match self {
            Self::User { id } => id.clone(),
            Self::Agent { agent_id } => agent_id.clone(),
            Self::System => Self::SYSTEM_INITIATOR.to_string(),
        }
    }
}

/// The ambient value passed through every commander/querier call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The caller's identity.
    pub identity: Identity,
    /// Cancellation signal, set when the inbound request is aborted.
    pub cancellation: CancellationToken,
    /// Correlation id for log and error correlation.
    pub correlation_id: Uuid,
}

impl RequestContext {
    /// Build a context for a user-initiated request.
    #[must_use]
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            identity: Identity::User { id: user_id.into() },
            cancellation: CancellationToken::new(),
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Build a context for an agent-initiated request.
    #[must_use]
    pub fn for_agent(agent_id: impl Into<String>) -> Self {
        Self {
            identity: Identity::Agent {
                agent_id: agent_id.into(),
            },
            cancellation: CancellationToken::new(),
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Build a context for a system-driven background operation.
    #[must_use]
    pub fn system() -> Self {
        Self {
            identity: Identity::System,
            cancellation: CancellationToken::new(),
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Whether cancellation has been requested for this call.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

//! Core types shared across the Fulcrum provisioning control plane.
//!
//! - **Identifiers**: strongly-typed ids for every entity in the data model.
//! - **Error types**: the base error kind shared across crates.
//! - **Request context**: the ambient `{identity, cancellation,
//!   correlationId}` value threaded explicitly through every call.
//!
//! # Example
//!
//! ```
//! use fulcrum_core::{ServiceId, RequestContext};
//!
//! let service_id = ServiceId::generate();
//! let ctx = RequestContext::for_user("user-123");
//! assert_eq!(ctx.identity.initiator_type(), "user");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod context;
pub mod error;
pub mod ids;

pub use context::{Identity, RequestContext};
pub use error::{CoreError, Result};
pub use ids::{
    AgentId, AgentTypeId, EventId, IdError, JobId, ParticipantId, ServiceGroupId, ServiceId,
    ServiceTypeId,
};

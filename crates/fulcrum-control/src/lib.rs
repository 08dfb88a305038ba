//! Control plane for Fulcrum's provisioning coordination engine.
//!
//! This crate owns the service state machine, the job dispatch queue, the
//! agent registry, and the event journal and subscription lease protocol. It
//! has no knowledge of HTTP; the gateway crate is a thin transport shim over
//! the [`ControlPlane`] trait this crate exposes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Gateway (HTTP)                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ControlPlaneService                       │
//! │  ┌───────────┐ ┌──────────┐ ┌──────────┐ ┌───────────────┐  │
//! │  │ commander │ │ dispatch │ │ registry │ │ subscriptions │  │
//! │  └───────────┘ └──────────┘ └──────────┘ └───────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌────────────┐  ┌────────────┐
//!        │  Store   │   │ Authorizer │  │  Validator │
//!        │ (RocksDB)│   │            │  │            │
//!        └──────────┘   └────────────┘  └────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use fulcrum_control::{ControlPlane, ControlPlaneService, CreateServiceRequest};
//! use fulcrum_core::{Identity, RequestContext};
//! use fulcrum_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/fulcrum")?);
//! let control = ControlPlaneService::with_defaults(store);
//!
//! let ctx = RequestContext::system();
//! # Ok(())
//! # }
//! ```
//!
//! # Service state machine
//!
//! See the [`lifecycle`] module for the full transition table and its
//! stable-state rules; see [`dispatch`] for how transitions enqueue jobs and
//! [`sweepers`] for the background processes that fail stale jobs and mark
//! unreachable agents disconnected.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod authorize;
pub mod commander;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod service;
pub mod subscriptions;
pub mod sweepers;
pub mod types;
pub mod validate;

pub use authorize::{AllowAllAuthorizer, Authorizer, ScopedAuthorizer};
pub use error::{ControlError, Result};
pub use service::{ControlPlane, ControlPlaneService};
pub use sweepers::{spawn_connectivity_sweeper, spawn_job_timeout_sweeper};
pub use types::{
    CompleteJobRequest, ControlConfig, CreateServiceRequest, FailJobRequest, UpdateServiceRequest,
};
pub use validate::{NoopValidator, Validator};

//! HTTP gateway for the Fulcrum provisioning control plane.
//!
//! This crate is a thin transport shim over [`fulcrum_control::ControlPlane`]:
//! it terminates JWT bearer auth, routes requests to control-plane
//! operations, and renders their results and errors as JSON. It carries no
//! business logic of its own.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Clients                               │
//! │                      (HTTP only)                            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    fulcrum-gateway                           │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐   │
//! │  │   Auth      │ │   Router    │ │   Error mapping      │   │
//! │  │  Extractor  │ │  + Handlers │ │   (ApiError)         │   │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                ┌─────────────┴─────────────┐
//!                ▼                           ▼
//!        ┌──────────────┐           ┌──────────────┐
//!        │ ControlPlane │           │  JwtValidator │
//!        │ (fulcrum-    │           │  (fulcrum-    │
//!        │  control)    │           │   auth)       │
//!        └──────────────┘           └──────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fulcrum_gateway::{GatewayConfig, GatewayState, create_router};
//! use fulcrum_control::ControlPlaneService;
//! use fulcrum_auth::{JwksValidator, AuthConfig};
//! use fulcrum_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Initialize dependencies
//! let store = Arc::new(RocksStore::open("/tmp/fulcrum")?);
//! let control = Arc::new(ControlPlaneService::with_defaults(store));
//! let jwt_validator = Arc::new(JwksValidator::new(AuthConfig::default()));
//!
//! // Create gateway state
//! let config = GatewayConfig::default();
//! let state = GatewayState::new(control, jwt_validator, config);
//!
//! // Create router
//! let app = create_router(state);
//!
//! // Run server
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::GatewayConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::GatewayState;

// Re-export key types for convenience
pub use auth::AuthUser;

//! Fulcrum Gateway - HTTP entry point for the provisioning control plane.
//!
//! This is the main entry point for the gateway service: it opens the
//! `RocksDB` store, builds the control plane, spawns its background
//! sweepers, and serves the HTTP API.
//!
//! # Dev Mode
//!
//! Build with `--features dev-mode` to use a mock JWT validator that
//! doesn't require network access to a real identity provider. Use
//! tokens in the format: `test-token:<role>:<subject>` (role is `user`
//! or `agent`).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "dev-mode")]
use fulcrum_auth::MockJwtValidator;
#[cfg(not(feature = "dev-mode"))]
use fulcrum_auth::{AuthConfig, JwksValidator};
use fulcrum_control::{
    spawn_connectivity_sweeper, spawn_job_timeout_sweeper, ControlPlaneService,
};
use fulcrum_gateway::{create_router, GatewayConfig, GatewayState};
use fulcrum_store::RocksStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fulcrum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Fulcrum Gateway");

    let config = GatewayConfig::from_env();
    tracing::info!(
        bind_addr = %config.bind_addr,
        db_path = %config.db_path,
        "Gateway configuration loaded"
    );

    tracing::info!(path = %config.db_path, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&config.db_path)?);

    let control = Arc::new(ControlPlaneService::with_defaults(store));
    tracing::info!("Control plane initialized");

    let shutdown = CancellationToken::new();
    let control_config = config.control_config();
    let job_sweeper = spawn_job_timeout_sweeper(
        control.store(),
        control.authorizer(),
        control_config.clone(),
        shutdown.clone(),
    );
    let connectivity_sweeper =
        spawn_connectivity_sweeper(control.store(), control_config, shutdown.clone());
    tracing::info!("Background sweepers started");

    #[cfg(feature = "dev-mode")]
    let jwt_validator = {
        tracing::warn!("DEV MODE ENABLED - using mock JWT validator");
        tracing::warn!("Use tokens in format: test-token:<role>:<subject>");
        Arc::new(MockJwtValidator)
    };

    #[cfg(not(feature = "dev-mode"))]
    let jwt_validator = {
        let auth_base_url =
            std::env::var("FULCRUM_AUTH_BASE_URL").unwrap_or_else(|_| "https://idp.example.com".into());
        let auth_audience = std::env::var("FULCRUM_AUTH_AUDIENCE").unwrap_or_else(|_| "fulcrum".into());
        let auth_config = AuthConfig {
            base_url: auth_base_url,
            audience: auth_audience,
            jwks_refresh_seconds: 300,
        };
        Arc::new(JwksValidator::new(auth_config))
    };
    tracing::info!("JWT validator initialized");

    let bind_addr = config.bind_addr.clone();
    let state = GatewayState::new(control, jwt_validator, config);
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    tracing::info!(bind_addr = %bind_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    shutdown.cancel();
    let _ = tokio::join!(job_sweeper, connectivity_sweeper);

    serve_result?;
    Ok(())
}

/// Wait for a Ctrl-C or SIGTERM so sweepers and in-flight requests get a
/// chance to wind down before the process exits.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

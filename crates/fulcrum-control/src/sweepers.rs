//! Background sweepers (§5, §4.2, §4.3): the job-timeout sweeper and the
//! agent connectivity sweeper, each a `tokio::spawn`'d interval loop over
//! the corresponding one-shot sweep function.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::authorize::Authorizer;
use crate::dispatch;
use crate::registry;
use crate::types::ControlConfig;
use fulcrum_store::Store;

/// Spawn the job-timeout sweeper: on every tick, fails every `Processing`
/// job whose `claimedAt` is older than `config.job_timeout_secs`.
///
/// The returned handle resolves once `shutdown` is cancelled.
pub fn spawn_job_timeout_sweeper<S, A>(
    store: Arc<S>,
    authorizer: Arc<A>,
    config: ControlConfig,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()>
where
    S: Store + 'static,
    A: Authorizer + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(config.sweep_interval_secs));
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!("job timeout sweeper shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    match dispatch::sweep_timeouts(store.as_ref(), authorizer.as_ref(), &config) {
                        Ok(timed_out) if !timed_out.is_empty() => {
                            tracing::info!(count = timed_out.len(), "timeout sweep failed stale jobs");
                        }
                        Ok(_) => {}
                        Err(err) => {
                            tracing::error!(error = %err, "job timeout sweep failed");
                        }
                    }
                }
            }
        }
    })
}

/// Spawn the connectivity sweeper: on every tick, marks every `Connected`
/// agent whose last heartbeat is older than `config.heartbeat_timeout_secs`
/// as `Disconnected`.
///
/// The returned handle resolves once `shutdown` is cancelled.
pub fn spawn_connectivity_sweeper<S>(
    store: Arc<S>,
    config: ControlConfig,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()>
where
    S: Store + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(config.sweep_interval_secs));
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!("connectivity sweeper shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    let cutoff = chrono::Utc::now()
                        - chrono::Duration::seconds(config.heartbeat_timeout_secs as i64);
                    match registry::connectivity_sweep(store.as_ref(), cutoff) {
                        Ok(disconnected) if !disconnected.is_empty() => {
                            tracing::info!(count = disconnected.len(), "connectivity sweep marked agents disconnected");
                        }
                        Ok(_) => {}
                        Err(err) => {
                            tracing::error!(error = %err, "connectivity sweep failed");
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorize::AllowAllAuthorizer;
    use fulcrum_store::RocksStore;
    use tempfile::TempDir;

    #[tokio::test]
    async fn job_timeout_sweeper_stops_on_cancellation() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let shutdown = CancellationToken::new();
        let handle = spawn_job_timeout_sweeper(
            store,
            Arc::new(AllowAllAuthorizer),
            ControlConfig {
                sweep_interval_secs: 3600,
                ..ControlConfig::default()
            },
            shutdown.clone(),
        );

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweeper should exit promptly on shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn connectivity_sweeper_stops_on_cancellation() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let shutdown = CancellationToken::new();
        let handle = spawn_connectivity_sweeper(
            store,
            ControlConfig {
                sweep_interval_secs: 3600,
                ..ControlConfig::default()
            },
            shutdown.clone(),
        );

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweeper should exit promptly on shutdown")
            .unwrap();
    }
}

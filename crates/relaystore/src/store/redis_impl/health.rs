//! Health supervision for the shared Redis connection.
//!
//! A background task checks the connection with `PING`. Healthy checks are
//! spaced by the configured interval; failed ones are retried with bounded
//! exponential backoff. Every transition is published on the store's
//! `watch` channel instead of being raised from the task.

use std::sync::Arc;
use std::time::Duration;

use relaystore_core::store::{BackoffPolicy, HealthStatus, Result, StoreError};

use super::error::map_redis_error;
use super::store::Shared;

/// Sends a single `PING` over the shared connection.
async fn ping(shared: &Shared) -> Result<()> {
    let mut conn = shared.connection().await?;
    let _pong: String = redis::cmd("PING")
        .query_async(&mut conn)
        .await
        .map_err(map_redis_error)?;
    Ok(())
}

/// Runs until the store's shutdown signal fires.
pub(super) async fn run_health_supervisor(
    shared: Arc<Shared>,
    interval: Duration,
    backoff: BackoffPolicy,
) {
    let mut shutdown_rx = shared.shutdown_tx.subscribe();
    let mut failures: u32 = 0;

    loop {
        let outcome = tokio::select! {
            _ = shutdown_rx.recv() => break,
            outcome = ping(&shared) => outcome,
        };

        let delay = match outcome {
            Ok(()) => {
                if failures > 0 {
                    tracing::info!(failures, "Redis connection recovered");
                }
                failures = 0;
                shared.status_tx.send_if_modified(|status| {
                    let changed = !status.is_healthy();
                    *status = HealthStatus::Healthy;
                    changed
                });
                interval
            }
            Err(StoreError::ShutDown) => break,
            Err(err) => {
                let delay = backoff.delay_for(failures);
                failures = failures.saturating_add(1);
                tracing::warn!(
                    error = %err,
                    failures,
                    retry_in_ms = delay.as_millis() as u64,
                    "Redis health check failed"
                );
                shared.status_tx.send_replace(HealthStatus::Degraded {
                    consecutive_failures: failures,
                    last_error: err.to_string(),
                });
                delay
            }
        };

        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    tracing::debug!("Redis health supervisor stopped");
}

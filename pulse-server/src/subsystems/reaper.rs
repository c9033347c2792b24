//! Periodic session reaping and the coordinator heartbeat.

use chrono::Utc;
use pulse_core::config::SessionConfig;
use tokio::sync::broadcast;
use tokio::time::{Duration, MissedTickBehavior};

use crate::agents::CoordinatorHandle;

/// Sweep expired sessions every `sweep_interval_seconds` and log the number
/// of active sessions every `heartbeat_interval_seconds`.
pub async fn run_reaper_loop(
    handle: CoordinatorHandle,
    config: SessionConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut sweep = tokio::time::interval(Duration::from_secs(config.sweep_interval_seconds.max(1)));
    sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut heartbeat =
        tokio::time::interval(Duration::from_secs(config.heartbeat_interval_seconds.max(1)));
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        "Session reaper started (sweep: {}s, ttl: {}s)",
        config.sweep_interval_seconds,
        config.ttl_seconds
    );

    loop {
        tokio::select! {
            _ = sweep.tick() => {
                match handle.sweep(Utc::now()).await {
                    Ok(0) => tracing::debug!("Session sweep: nothing expired"),
                    Ok(reaped) => tracing::info!("Session sweep reaped {} session(s)", reaped),
                    Err(e) => {
                        tracing::warn!("Session sweep failed: {}", e);
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => {
                match handle.session_count().await {
                    Ok(active) => tracing::info!(active_sessions = active, "Coordinator heartbeat"),
                    Err(e) => tracing::warn!("Heartbeat failed: {}", e),
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Session reaper shutting down");
                break;
            }
        }
    }
}

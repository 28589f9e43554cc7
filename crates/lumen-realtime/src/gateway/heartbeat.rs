use super::Gateway;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Spawns a task that pings every session on a fixed interval.
///
/// Pings keep idle sessions open through proxies; a session whose peer is
/// gone fails its next send and leaves. Abort the handle to stop.
pub fn start_heartbeat(gateway: Arc<Gateway>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let count = gateway.session_count().await;
            debug!(count, "Realtime heartbeat ping");
            gateway.ping_all().await;
        }
    })
}

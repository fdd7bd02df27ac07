//! Keepalive watchdog.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};

use super::connection::ClientConnection;

/// Outcome of the watchdog loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// No inbound activity for longer than the timeout.
    TimedOut,
    /// The connection closed for some other reason.
    Cancelled,
}

/// Watch a connection's inbound activity.
///
/// Every `interval` the time since the last inbound frame is compared with
/// `timeout`; pings are written by the outbound loop, and any answer (or any
/// other frame) resets the clock. A silent connection is therefore detected
/// between `timeout` and `timeout + interval` after its last frame.
pub async fn run_heartbeat(
    connection: Arc<ClientConnection>,
    interval: Duration,
    timeout: Duration,
) -> HeartbeatResult {
    let mut check_interval = time::interval(interval);
    check_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = connection.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
            _ = check_interval.tick() => {
                if connection.idle_for() > timeout {
                    return HeartbeatResult::TimedOut;
                }
            }
        }
    }
}

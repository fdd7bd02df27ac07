//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

use crate::hub::HubStats;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"`, or `"degraded"` when the room registry does not answer.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Live WebSocket sessions.
    pub connections: usize,
    /// Rooms with at least one member.
    pub rooms: usize,
}

/// Build a health response from live counters.
///
/// `hub` is `None` when the registry could not be queried.
pub fn health_check(start_time: Instant, connections: usize, hub: Option<HubStats>) -> HealthResponse {
    HealthResponse {
        status: if hub.is_some() { "ok" } else { "degraded" }.into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        rooms: hub.map_or(0, |stats| stats.rooms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_ok_with_registry() {
        let resp = health_check(Instant::now(), 0, Some(HubStats::default()));
        assert_eq!(resp.status, "ok");
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn status_is_degraded_without_registry() {
        let resp = health_check(Instant::now(), 3, None);
        assert_eq!(resp.status, "degraded");
        assert_eq!(resp.connections, 3);
        assert_eq!(resp.rooms, 0);
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let resp = health_check(start, 0, None);
        assert!(resp.uptime_secs >= 59);
    }

    #[test]
    fn rooms_come_from_registry() {
        let stats = HubStats {
            rooms: 2,
            connections: 5,
        };
        let resp = health_check(Instant::now(), 5, Some(stats));
        assert_eq!(resp.rooms, 2);
        assert_eq!(resp.connections, 5);
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_value(health_check(Instant::now(), 1, Some(HubStats::default()))).unwrap();
        assert!(json.get("uptime_secs").is_some());
        assert_eq!(json["rooms"], 0);
    }
}

//! Time utilities and simulation rates

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Full tick rate of a populated room, before the speed multiplier
pub const SIMULATION_TPS: u32 = 60;
/// Tick rate of a room with fewer than two living combatants
pub const IDLE_TPS: u32 = 10;
/// Observations sent per second on each connection
pub const OBSERVATION_TPS: u32 = 60;

/// Period between observations on one connection
pub fn observation_interval() -> Duration {
    Duration::from_micros(1_000_000 / OBSERVATION_TPS as u64)
}

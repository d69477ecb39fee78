//! Types and wire format shared by the Snowfall client and server.

pub mod chart;
pub mod error;
pub mod judgment;
pub mod protocol;
pub mod stats;

pub use chart::{Chart, Note};
pub use error::{ChartError, HandshakeError, ProtocolError};
pub use judgment::Judgment;
pub use protocol::JudgmentMessage;
pub use stats::SessionStats;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const LANE_COUNT: usize = 8;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 65432;
pub const DEFAULT_CHART: &str = "charts/basic.chart";
/// How far in the future the server schedules the common start instant.
pub const START_LEAD_MS: u64 = 3000;

/// Wall-clock seconds since the Unix epoch, the unit of the start instant.
pub fn unix_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs_f64()
}

/// Milliseconds elapsed since `start` (seconds since the epoch). Negative
/// before the start instant.
pub fn elapsed_ms_since(start: f64) -> f64 {
    (unix_seconds() - start) * 1000.0
}

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch; the timestamp unit used throughout project manifests.
pub fn unix_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

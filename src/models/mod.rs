pub mod analysis;
pub mod bug;
pub mod development;
pub mod generation;
pub mod relevance;
pub mod request;
pub mod testing;

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch.
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Fresh opaque identifier with a readable prefix, e.g. `bug_1b9d…`.
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
}

/// Clamp a score into `[0, 1]`; NaN collapses to 0.
pub fn unit(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

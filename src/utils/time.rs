use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Current unix time as (seconds, microseconds within the second)
pub fn unix_time() -> (u64, u32) {
    let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    (since_epoch.as_secs(), since_epoch.subsec_micros())
}

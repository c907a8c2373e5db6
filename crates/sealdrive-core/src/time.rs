//! Wall-clock helper.
//!
//! All timestamps in Sealdrive are Unix milliseconds as i64, never floats.

/// Get the current time in Unix milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}

//! Shared timestamp helpers for metadata records and archive names.

use chrono::{DateTime, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Compact stamp used in archive and backup-directory names (e.g. `20260119_134502`).
pub fn file_stamp(at: &DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

/// Unix-epoch seconds for `at`.
pub fn epoch_secs(at: &DateTime<Utc>) -> i64 {
    at.timestamp()
}

/// Whole days elapsed between `then` and `now`, never negative.
pub fn age_days(then: &DateTime<Utc>, now: &DateTime<Utc>) -> i64 {
    (*now - *then).num_days().max(0)
}

use chrono::{DateTime, Utc};

/// Wall-clock timestamp carried on records, edges and index entries.
pub type Timestamp = DateTime<Utc>;

/// Current time, truncated to microsecond precision.
///
/// Relational backends persist microseconds; truncating here keeps the
/// in-memory backend's timestamps identical to what a relational round-trip
/// would return.
pub fn now() -> Timestamp {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}

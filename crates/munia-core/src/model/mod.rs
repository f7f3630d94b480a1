pub mod action;
pub mod session;

use chrono::{SecondsFormat, Utc};

/// RFC 3339 timestamp with fixed microsecond precision, so stored values
/// order the same lexicographically and chronologically.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

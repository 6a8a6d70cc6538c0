//! Conversions between ripple-epoch seconds and other time representations.
//!
//! Ledger timestamps count seconds since 2000-01-01T00:00:00Z.

use crate::error::{ClientError, Result};
use chrono::{DateTime, SecondsFormat, Utc};

/// Seconds between the unix epoch and the ripple epoch.
pub const RIPPLE_EPOCH_OFFSET: i64 = 946_684_800;

/// Ripple-epoch seconds to unix seconds, `None` on overflow.
pub const fn ripple_to_unix(ripple_time: i64) -> Option<i64> {
    ripple_time.checked_add(RIPPLE_EPOCH_OFFSET)
}

/// Unix seconds to ripple-epoch seconds, `None` on overflow.
pub const fn unix_to_ripple(unix_time: i64) -> Option<i64> {
    unix_time.checked_sub(RIPPLE_EPOCH_OFFSET)
}

/// Ripple-epoch seconds as an RFC 3339 UTC timestamp, e.g.
/// `2000-01-01T00:00:00Z`. Out-of-range values yield `None`.
pub fn ripple_to_iso8601(ripple_time: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(ripple_to_unix(ripple_time)?, 0)
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Parse an RFC 3339 timestamp into ripple-epoch seconds.
pub fn iso8601_to_ripple(iso: &str) -> Result<i64> {
    let parsed = DateTime::parse_from_rfc3339(iso)
        .map_err(|e| ClientError::decode(format!("invalid timestamp {iso:?}: {e}")))?;
    unix_to_ripple(parsed.timestamp())
        .ok_or_else(|| ClientError::decode(format!("timestamp {iso:?} out of range")))
}

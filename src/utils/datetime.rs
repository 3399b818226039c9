//! Timestamp encoding for backend records.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

/// Parse a datetime string in various common formats into a UTC [`DateTime`].
///
/// Supported formats (attempted in order):
/// 1. RFC 3339 with timezone: `"2024-01-15T10:30:00Z"`, `"2024-01-15T10:30:00+05:00"`
/// 2. ISO 8601 with sub-seconds, no timezone (assumed UTC): `"2024-01-15T10:30:00.123"`
/// 3. ISO 8601 without timezone: `"2024-01-15T10:30:00"`
/// 4. Date only (midnight UTC): `"2024-01-15"`
///
/// Returns `None` for empty input or unrecognised formats.
pub fn parse_flexible_datetime(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&ndt));
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&ndt));
    }

    if let Ok(nd) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return nd
            .and_hms_opt(0, 0, 0)
            .map(|ndt| Utc.from_utc_datetime(&ndt));
    }

    None
}

/// Format a timestamp the way it is stored in the backend (RFC 3339, nanoseconds, `Z`).
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

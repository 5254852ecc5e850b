//! Timestamp helpers for backend payloads.
//!
//! The backend emits zone-less local date-times (`2025-01-10T08:30:00`) while
//! clients send RFC 3339. Both are accepted on input; zone-less values are
//! read in the local time zone, matching how the backend writes them. Output
//! is always RFC 3339 with a `Z` suffix.

use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, Utc};
use serde::de::{self, Deserialize, Deserializer};
use serde::ser::Serializer;

/// Parse an RFC 3339 or zone-less timestamp.
///
/// # Errors
///
/// Returns an error when the value matches neither form.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)).or_else(|_| {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").map(from_local)
    })
}

/// Resolve a local wall-clock time. The earlier instant wins when clocks go
/// back; a time skipped when clocks go forward is read as UTC.
fn from_local(naive: NaiveDateTime) -> DateTime<Utc> {
    naive
        .and_local_timezone(Local)
        .earliest()
        .map_or_else(|| naive.and_utc(), |local| local.with_timezone(&Utc))
}

pub fn deserialize_option_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) if s.is_empty() => Ok(None),
        Some(s) => parse_timestamp(&s).map(Some).map_err(de::Error::custom),
    }
}

#[allow(clippy::ref_option)]
pub fn serialize_option_timestamp<S>(
    ts: &Option<DateTime<Utc>>, serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match ts {
        None => serializer.serialize_none(),
        Some(ts) => serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
    }
}

//! A single timestamp-keyed log entry.

use chrono::{DateTime, FixedOffset, Local, SecondsFormat, SubsecRound};
use std::time::SystemTime;

/// One record of the running log. The key is kept exactly as it appears in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    key: String,
    time: DateTime<FixedOffset>,
    body: String,
}

impl Entry {
    /// Create a new entry; the key is the time rendered in local time.
    /// Sub-microsecond precision is dropped so the key and time agree.
    pub fn new(time: DateTime<FixedOffset>, body: impl Into<String>) -> Self {
        let time = time.with_timezone(&Local).fixed_offset().trunc_subsecs(6);
        Self {
            key: format_key(&time),
            time,
            body: body.into(),
        }
    }

    /// Rebuild an entry read from disk, validating its key.
    pub fn from_stored(key: &str, body: String) -> Result<Self, String> {
        let time = parse_key(key)?;
        Ok(Self {
            key: key.to_string(),
            time,
            body,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn time(&self) -> DateTime<FixedOffset> {
        self.time
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

/// Render an entry time as an RFC 3339 key with microsecond precision.
pub fn format_key(time: &DateTime<FixedOffset>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Parse a stored key. Accepts RFC 3339 and the space separated ISO 8601 variant.
pub fn parse_key(key: &str) -> Result<DateTime<FixedOffset>, String> {
    let trimmed = key.trim();
    DateTime::parse_from_rfc3339(trimmed)
        .or_else(|_| DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f%:z"))
        .map_err(|_| format!("Expected an ISO 8601-like string, but was given '{}'.", key))
}

/// Convert a file modification time into an entry time.
pub fn from_system_time(time: SystemTime) -> DateTime<FixedOffset> {
    DateTime::<Local>::from(time).fixed_offset()
}

pub fn now() -> DateTime<FixedOffset> {
    Local::now().fixed_offset()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_key_parses_back_to_same_instant() {
        let time = DateTime::parse_from_rfc3339("2024-10-30T09:12:44.503211-07:00").unwrap();
        let entry = Entry::new(time, "hello");
        assert_eq!(parse_key(entry.key()).unwrap(), time);
        assert_eq!(entry.body(), "hello");
    }

    #[test]
    fn nanoseconds_are_truncated_to_key_precision() {
        let time = DateTime::parse_from_rfc3339("2024-10-30T09:12:44.503211999Z").unwrap();
        let entry = Entry::new(time, "");
        assert_eq!(parse_key(entry.key()).unwrap(), entry.time());
    }

    #[test]
    fn stored_key_is_kept_verbatim() {
        let entry = Entry::from_stored("2024-10-29T09:00:00+02:00", "x".into()).unwrap();
        assert_eq!(entry.key(), "2024-10-29T09:00:00+02:00");
        assert_eq!(entry.time().offset().local_minus_utc(), 2 * 3600);
    }

    #[test]
    fn space_separated_keys_are_accepted() {
        assert!(parse_key("2024-10-29 09:00:00.250000-07:00").is_ok());
    }

    #[test]
    fn bad_key_is_reported() {
        let err = parse_key("not a date").unwrap_err();
        assert_eq!(
            err,
            "Expected an ISO 8601-like string, but was given 'not a date'."
        );
    }
}

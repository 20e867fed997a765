//! Retention policy: how old, how many and how few entries a running log keeps.

use crate::running_log::RunningLog;
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const MINUTE: f64 = 60.0;
const HOUR: f64 = 60.0 * MINUTE;
const DAY: f64 = 24.0 * HOUR;

/// Unit suffixes accepted by `--keep-for`, in seconds. A bare number means days.
const UNITS: &[(&[&str], f64)] = &[
    (&["s", "sec", "second", "seconds"], 1.0),
    (&["m", "min", "minute", "minutes"], MINUTE),
    (&["h", "hr", "hour", "hours"], HOUR),
    (&["d", "day", "days"], DAY),
    (&["w", "W", "week", "weeks"], 7.0 * DAY),
    (&["M", "month", "months"], 30.0 * DAY),
    (&["y", "Y", "year", "years"], 365.0 * DAY),
];

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("invalid duration '{0}': use a number of days or forms like '36h', '2w', '6M'.")]
    InvalidDuration(String),

    #[error("{0}: expected strictly positive number.")]
    NotPositive(&'static str),
}

/// Limits applied to the existing entries of a running log before a new entry is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Drop entries older than this.
    pub keep_for: Option<Duration>,
    /// Upper bound on entries after the write, new entry included.
    pub max_entries: Option<usize>,
    /// Age pruning never leaves fewer entries than this, new entry included.
    pub min_entries: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_for: None,
            max_entries: None,
            min_entries: 1,
        }
    }
}

impl RetentionPolicy {
    /// Prune `log` to make room for one new entry. Returns the number of entries dropped.
    pub fn apply(&self, log: &mut RunningLog, now: DateTime<FixedOffset>) -> usize {
        let before = log.len();
        let min_entries = self.min_entries.max(1);

        // A zero age means no age limit.
        if let Some(keep_for) = self.keep_for.filter(|d| !d.is_zero()) {
            if log.len() >= min_entries {
                if let Some(oldest) = cutoff(now, keep_for) {
                    let newer = log.entries().iter().filter(|e| e.time() > oldest).count();
                    if newer < min_entries - 1 {
                        log.truncate(min_entries - 1);
                    } else {
                        log.retain(|e| e.time() > oldest);
                    }
                    debug!(%oldest, kept = log.len(), "applied age limit");
                }
            }
        }

        if let Some(max_entries) = self.max_entries {
            if log.len() >= max_entries {
                log.truncate(max_entries.saturating_sub(1));
            }
        }

        let dropped = before - log.len();
        if dropped > 0 {
            info!(dropped, remaining = log.len(), "pruned running log");
        }
        dropped
    }
}

fn cutoff(now: DateTime<FixedOffset>, keep_for: Duration) -> Option<DateTime<FixedOffset>> {
    let keep_for = chrono::Duration::from_std(keep_for).ok()?;
    now.checked_sub_signed(keep_for)
}

/// Parse a retention age: a number with an optional unit, days by default.
/// Anything else is handed to humantime (e.g. `1week 2days`).
pub fn parse_keep_for(text: &str) -> Result<Duration, PolicyError> {
    let trimmed = text.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    if let Ok(value) = number.parse::<f64>() {
        let unit = unit.trim();
        let scale = if unit.is_empty() {
            Some(DAY)
        } else {
            UNITS
                .iter()
                .find(|(names, _)| names.contains(&unit))
                .map(|(_, scale)| *scale)
        };
        if let Some(scale) = scale {
            return Duration::try_from_secs_f64(value * scale)
                .map_err(|_| PolicyError::InvalidDuration(text.to_string()));
        }
    }

    humantime::parse_duration(trimmed).map_err(|_| PolicyError::InvalidDuration(text.to_string()))
}

/// `keep_for` in a config file may be a number of days or a string with units.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum KeepFor {
    Days(f64),
    Text(String),
}

impl KeepFor {
    fn to_duration(&self) -> Result<Duration, PolicyError> {
        match self {
            KeepFor::Days(days) => parse_keep_for(&days.to_string()),
            KeepFor::Text(text) => parse_keep_for(text),
        }
    }
}

/// Retention settings as read from a JSON config file. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    pub keep_for: Option<KeepFor>,
    pub max_entries: Option<usize>,
    pub min_entries: Option<usize>,
}

impl PolicyConfig {
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let s = std::fs::read_to_string(path).map_err(|source| PolicyError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&s).map_err(|source| PolicyError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Build the effective policy; values already set on the command line win.
    pub fn resolve(
        &self,
        keep_for: Option<Duration>,
        max_entries: Option<usize>,
        min_entries: Option<usize>,
    ) -> Result<RetentionPolicy, PolicyError> {
        let keep_for = match keep_for {
            Some(d) => Some(d),
            None => self.keep_for.as_ref().map(KeepFor::to_duration).transpose()?,
        };
        let max_entries = max_entries.or(self.max_entries);
        let min_entries = min_entries.or(self.min_entries).unwrap_or(1);
        if max_entries == Some(0) {
            return Err(PolicyError::NotPositive("max_entries"));
        }
        if min_entries == 0 {
            return Err(PolicyError::NotPositive("min_entries"));
        }
        Ok(RetentionPolicy {
            keep_for,
            max_entries,
            min_entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use chrono::Duration as Span;

    fn now() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-10-30T12:00:00-07:00").unwrap()
    }

    /// One entry per day, `days` of them, newest written one day ago.
    fn daily_log(days: i64) -> RunningLog {
        let mut log = RunningLog::empty(Path::new("t.log.nt"));
        for age in 1..=days {
            let body = format!("entry written = {} days ago.", age);
            log.insert(Entry::new(now() - Span::days(age), body)).unwrap();
        }
        log
    }

    fn ages(log: &RunningLog) -> Vec<i64> {
        log.entries()
            .iter()
            .map(|e| (now() - e.time()).num_days())
            .collect()
    }

    #[test]
    fn bare_numbers_are_days() {
        assert_eq!(parse_keep_for("7").unwrap(), Duration::from_secs(7 * 86400));
        assert_eq!(parse_keep_for("1.5").unwrap(), Duration::from_secs(36 * 3600));
    }

    #[test]
    fn unit_suffixes_are_recognized() {
        assert_eq!(parse_keep_for("90m").unwrap(), Duration::from_secs(90 * 60));
        assert_eq!(parse_keep_for("2w").unwrap(), Duration::from_secs(14 * 86400));
        assert_eq!(parse_keep_for("6M").unwrap(), Duration::from_secs(180 * 86400));
        assert_eq!(parse_keep_for("1 year").unwrap(), Duration::from_secs(365 * 86400));
        assert_eq!(parse_keep_for("36 hours").unwrap(), Duration::from_secs(36 * 3600));
    }

    #[test]
    fn humantime_forms_are_accepted() {
        assert_eq!(parse_keep_for("2h 30m").unwrap(), Duration::from_secs(9000));
    }

    #[test]
    fn garbage_durations_are_rejected() {
        assert!(matches!(
            parse_keep_for("soon"),
            Err(PolicyError::InvalidDuration(_))
        ));
        assert!(parse_keep_for("3 fortnights").is_err());
    }

    #[test]
    fn keep_for_drops_older_entries() {
        let mut log = daily_log(10);
        let policy = RetentionPolicy {
            keep_for: Some(Duration::from_secs(3 * 86400 + 60)),
            ..Default::default()
        };
        assert_eq!(policy.apply(&mut log, now()), 7);
        assert_eq!(ages(&log), [1, 2, 3]);
        assert_eq!(log.entries()[0].body(), "entry written = 1 days ago.");
    }

    #[test]
    fn min_entries_overrides_age_limit() {
        let mut log = daily_log(10);
        let policy = RetentionPolicy {
            keep_for: Some(Duration::from_secs(86400 + 60)),
            min_entries: 4,
            ..Default::default()
        };
        policy.apply(&mut log, now());
        assert_eq!(ages(&log), [1, 2, 3]);
    }

    #[test]
    fn max_entries_leaves_room_for_new_entry() {
        let mut log = daily_log(10);
        let policy = RetentionPolicy {
            max_entries: Some(3),
            ..Default::default()
        };
        policy.apply(&mut log, now());
        assert_eq!(ages(&log), [1, 2]);
    }

    #[test]
    fn max_entries_below_min_entries_wins() {
        let mut log = daily_log(10);
        let policy = RetentionPolicy {
            keep_for: Some(Duration::from_secs(60)),
            max_entries: Some(2),
            min_entries: 5,
        };
        policy.apply(&mut log, now());
        assert_eq!(ages(&log), [1]);
    }

    #[test]
    fn zero_keep_for_is_no_age_limit() {
        let mut log = daily_log(5);
        let policy = RetentionPolicy {
            keep_for: Some(parse_keep_for("0").unwrap()),
            ..Default::default()
        };
        assert_eq!(policy.apply(&mut log, now()), 0);
        assert_eq!(log.len(), 5);
    }

    #[test]
    fn no_limits_keeps_everything() {
        let mut log = daily_log(5);
        assert_eq!(RetentionPolicy::default().apply(&mut log, now()), 0);
        assert_eq!(log.len(), 5);
    }

    #[test]
    fn config_values_fill_in_missing_flags() {
        let config: PolicyConfig =
            serde_json::from_str(r#"{"keep_for": "14d", "max_entries": 20}"#).unwrap();
        let policy = config.resolve(None, Some(5), None).unwrap();
        assert_eq!(policy.keep_for, Some(Duration::from_secs(14 * 86400)));
        assert_eq!(policy.max_entries, Some(5));
        assert_eq!(policy.min_entries, 1);
    }

    #[test]
    fn numeric_keep_for_in_config_is_days() {
        let config: PolicyConfig = serde_json::from_str(r#"{"keep_for": 2}"#).unwrap();
        let policy = config.resolve(None, None, None).unwrap();
        assert_eq!(policy.keep_for, Some(Duration::from_secs(2 * 86400)));
    }

    #[test]
    fn config_rejects_unknown_fields_and_zero_counts() {
        assert!(serde_json::from_str::<PolicyConfig>(r#"{"keep": 1}"#).is_err());
        let config: PolicyConfig = serde_json::from_str(r#"{"min_entries": 0}"#).unwrap();
        assert!(matches!(
            config.resolve(None, None, None),
            Err(PolicyError::NotPositive("min_entries"))
        ));
    }
}

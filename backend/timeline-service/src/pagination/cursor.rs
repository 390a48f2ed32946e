use crate::clock::truncate_micros;
use crate::error::ValidationError;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;

/// Raw cursor query values as received from a client
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CursorParams {
    pub after: Option<String>,
    pub before: Option<String>,
    /// Client-requested page size, clamped by the paginator
    pub size: Option<usize>,
}

impl CursorParams {
    pub fn after(ts: DateTime<Utc>) -> Self {
        Self {
            after: Some(ts.to_rfc3339()),
            ..Self::default()
        }
    }

    pub fn before(ts: DateTime<Utc>) -> Self {
        Self {
            before: Some(ts.to_rfc3339()),
            ..Self::default()
        }
    }
}

/// Position in a newest-first sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// Start at the newest item
    Newest,
    /// Items strictly newer than the timestamp, all of them
    After(DateTime<Utc>),
    /// Items strictly older than the timestamp, one page
    Before(DateTime<Utc>),
}

impl Cursor {
    /// `after` wins when both values are present
    pub fn parse(params: &CursorParams) -> Result<Self, ValidationError> {
        if let Some(raw) = params.after.as_deref() {
            return parse_timestamp(raw).map(Cursor::After);
        }
        if let Some(raw) = params.before.as_deref() {
            return parse_timestamp(raw).map(Cursor::Before);
        }
        Ok(Cursor::Newest)
    }

    pub fn window(&self) -> TimeWindow {
        match *self {
            Cursor::Newest => TimeWindow::Newest,
            Cursor::After(ts) => TimeWindow::NewerThan(ts),
            Cursor::Before(ts) => TimeWindow::OlderThan(ts),
        }
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Cursor::Newest
    }
}

/// Timestamp filter handed to durable queries and range scans.
/// Results are always ordered newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    Newest,
    OlderThan(DateTime<Utc>),
    NewerThan(DateTime<Utc>),
}

impl TimeWindow {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        match *self {
            TimeWindow::Newest => true,
            TimeWindow::OlderThan(bound) => ts < bound,
            TimeWindow::NewerThan(bound) => ts > bound,
        }
    }

    /// Bounds as nullable query parameters: (older_than, newer_than)
    pub fn bounds(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        match *self {
            TimeWindow::Newest => (None, None),
            TimeWindow::OlderThan(ts) => (Some(ts), None),
            TimeWindow::NewerThan(ts) => (None, Some(ts)),
        }
    }
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// ISO-8601 timestamp; values without an offset are read as UTC
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ValidationError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(truncate_micros(ts.with_timezone(&Utc)));
    }
    if let Ok(ts) = raw.parse::<DateTime<Utc>>() {
        return Ok(truncate_micros(ts));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(truncate_micros(Utc.from_utc_datetime(&naive)));
        }
    }
    Err(ValidationError::InvalidCursor(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn params(after: Option<&str>, before: Option<&str>) -> CursorParams {
        CursorParams {
            after: after.map(str::to_string),
            before: before.map(str::to_string),
            size: None,
        }
    }

    #[test]
    fn test_no_values_means_newest() {
        assert_eq!(Cursor::parse(&CursorParams::default()), Ok(Cursor::Newest));
    }

    #[test]
    fn test_after_takes_precedence() {
        let cursor = Cursor::parse(&params(
            Some("2024-01-02T00:00:00Z"),
            Some("2024-01-01T00:00:00Z"),
        ))
        .unwrap();
        assert!(matches!(cursor, Cursor::After(_)));
    }

    #[test]
    fn test_offsets_and_naive_values() {
        let with_offset = Cursor::parse(&params(None, Some("2024-01-01T08:00:00+08:00"))).unwrap();
        let naive = Cursor::parse(&params(None, Some("2024-01-01T00:00:00"))).unwrap();
        assert_eq!(with_offset, naive);
    }

    #[test]
    fn test_truncates_to_microseconds() {
        let cursor = Cursor::parse(&params(None, Some("2024-01-01T00:00:00.123456789Z"))).unwrap();
        match cursor {
            Cursor::Before(ts) => assert_eq!(ts.nanosecond(), 123_456_000),
            other => panic!("unexpected cursor {:?}", other),
        }
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert_eq!(
            Cursor::parse(&params(Some("yesterday"), None)),
            Err(ValidationError::InvalidCursor("yesterday".to_string()))
        );
    }

    #[test]
    fn test_window_bounds_are_strict() {
        let ts = Utc::now();
        assert!(!TimeWindow::OlderThan(ts).contains(ts));
        assert!(!TimeWindow::NewerThan(ts).contains(ts));
        assert!(TimeWindow::Newest.contains(ts));
    }
}

//! Timestamp parsing for exported messages.
//!
//! Exports write ISO-8601 timestamps, usually with a trailing `Z`. The `Z` is
//! rewritten to an explicit `+00:00` offset before parsing so that both
//! spellings of the same instant compare equal. Timestamps without any offset
//! are taken to be UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::borrow::Cow;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Replace a trailing `Z` zone marker with `+00:00`.
pub fn normalize_zulu(raw: &str) -> Cow<'_, str> {
    match raw.strip_suffix('Z') {
        Some(stripped) => Cow::Owned(format!("{}+00:00", stripped)),
        None => Cow::Borrowed(raw),
    }
}

/// Parse an export timestamp into UTC.
///
/// Returns `None` for empty or unparseable input; callers decide how to order
/// such messages.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let normalized = normalize_zulu(trimmed);

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_zulu_matches_explicit_offset() {
        let zulu = parse_timestamp("2024-01-01T00:05:00Z");
        let explicit = parse_timestamp("2024-01-01T00:05:00+00:00");
        assert!(zulu.is_some());
        assert_eq!(zulu, explicit);
    }

    #[test]
    fn test_normalize_zulu() {
        assert_eq!(normalize_zulu("2024-01-01T00:00:00Z"), "2024-01-01T00:00:00+00:00");
        assert_eq!(normalize_zulu("2024-01-01T00:00:00+08:00"), "2024-01-01T00:00:00+08:00");
    }

    #[test]
    fn test_offset_is_converted_to_utc() {
        let parsed = parse_timestamp("2024-01-01T08:00:00+08:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_fractional_seconds() {
        let parsed = parse_timestamp("2024-03-05T10:20:30.123Z").unwrap();
        assert_eq!(parsed.timestamp_subsec_millis(), 123);
    }

    #[test]
    fn test_naive_timestamps_are_utc() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-01T12:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01 12:30:00"), Some(expected));
    }

    #[test]
    fn test_date_only() {
        assert_eq!(
            parse_timestamp("2024-01-02"),
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_unparseable() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("   "), None);
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("2024-13-01T00:00:00Z"), None);
    }
}

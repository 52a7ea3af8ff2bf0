//! Best-effort scan of payload text that neither decoder accepted.
//!
//! Exports truncate long payloads at a fixed column width, so the text is
//! usually valid JSON up to the cut. The scan looks for the handful of keys
//! the reports care about and records what it found. Its output is
//! diagnostic: it never feeds the metrics of the record.

use crate::types::PartialScan;
use regex::Regex;
use std::sync::LazyLock;

static TOTAL_TURNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["']totalTurns["']\s*:\s*(\d+)"#).unwrap());

static TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""timestamp"\s*:\s*"([^"]+)""#).unwrap());

static TEST_HISTORY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["']testHistory["']"#).unwrap());

static FEEDBACK_HISTORY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["']feedbackHistory["']"#).unwrap());

/// Scan undecodable payload text for known keys.
pub fn scan(raw: &str) -> PartialScan {
    let declared_total_turns = TOTAL_TURNS
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok());

    let timestamps: Vec<&str> = TIMESTAMP
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .collect();

    let scan = PartialScan {
        declared_total_turns,
        has_test_history: TEST_HISTORY.is_match(raw),
        has_feedback_history: FEEDBACK_HISTORY.is_match(raw),
        first_timestamp: timestamps.first().map(|s| s.to_string()),
        last_timestamp: timestamps.last().map(|s| s.to_string()),
        timestamp_count: timestamps.len(),
    };

    tracing::debug!(
        declared_total_turns = ?scan.declared_total_turns,
        timestamps = scan.timestamp_count,
        has_test_history = scan.has_test_history,
        has_feedback_history = scan.has_feedback_history,
        "partial payload scan"
    );

    scan
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_truncated_payload() {
        let raw = r#"{"totalTurns": 12, "testHistory": [{"role":"user","timestamp":"2024-01-01T00:00:00Z"},{"role":"assistant","timestamp":"2024-01-01T00:02:00Z"},{"role":"user","cont"#;

        let scan = scan(raw);
        assert_eq!(scan.declared_total_turns, Some(12));
        assert!(scan.has_test_history);
        assert!(!scan.has_feedback_history);
        assert_eq!(scan.first_timestamp.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(scan.last_timestamp.as_deref(), Some("2024-01-01T00:02:00Z"));
        assert_eq!(scan.timestamp_count, 2);
    }

    #[test]
    fn test_scan_ignores_cut_timestamp() {
        let raw = r#"{"feedbackHistory":[{"timestamp":"2024-01-01T00:06:00Z"},{"timestamp":"2024-01"#;

        let scan = scan(raw);
        assert!(scan.has_feedback_history);
        assert_eq!(scan.timestamp_count, 1);
        assert_eq!(scan.declared_total_turns, None);
    }

    #[test]
    fn test_scan_single_quoted_keys() {
        let scan = scan("{'totalTurns': 4, 'testHistory': [");
        assert_eq!(scan.declared_total_turns, Some(4));
        assert!(scan.has_test_history);
    }

    #[test]
    fn test_scan_garbage() {
        assert_eq!(scan("not a payload"), PartialScan::default());
    }
}

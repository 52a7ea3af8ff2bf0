//! Payload decoding.
//!
//! Decoding is an explicit two-stage pipeline:
//!
//! 1. [`parse_payload`]: strict JSON via `serde_json`
//! 2. the [`relaxed`](super::relaxed) literal parser, tried only after
//!    strict JSON failed and only when enabled
//!
//! If both fail the caller receives a [`ParseFailure`] and the record is
//! reported as incomplete. Nothing in this module panics on bad input.
//!
//! Field types inside a decoded payload are not trusted either: numeric
//! fields that hold something non-numeric decode as `None`, text fields that
//! hold something other than a string decode as empty, and history entries
//! that are not objects are skipped.

use super::relaxed;
use crate::types::{DecodeStage, FeedbackEvent, Message, Payload, PayloadSource};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Recovery behaviour for payloads that fail strict decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryOptions {
    /// Retry with the relaxed literal parser
    pub relaxed_parser: bool,
    /// Scan the text of failed payloads for known keys
    pub partial_scan: bool,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self {
            relaxed_parser: true,
            partial_scan: true,
        }
    }
}

impl RecoveryOptions {
    /// Strict decoding only, no scan.
    pub fn strict() -> Self {
        Self {
            relaxed_parser: false,
            partial_scan: false,
        }
    }
}

/// A payload that could not be decoded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseFailure {
    /// Strict JSON failed and the relaxed parser was not tried
    #[error("invalid JSON: {0}")]
    Strict(String),

    /// Both decoders failed
    #[error("invalid JSON ({strict}); relaxed parser: {relaxed}")]
    Relaxed { strict: String, relaxed: String },

    /// Decoded, but the top-level value is not an object
    #[error("payload is {found}, expected an object")]
    NotAnObject { found: &'static str },
}

/// A successfully decoded payload and the stage that accepted it.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPayload {
    pub payload: Payload,
    pub stage: DecodeStage,
}

// ============================================
// Raw payload types (serde deserialization)
// ============================================

/// Top-level payload object.
///
/// Every field is kept as a raw [`Value`] so that a type mismatch in one
/// field never fails the whole payload.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawPayload {
    total_turns: Option<Value>,
    test_history: Option<Value>,
    feedback_history: Option<Value>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawMessage {
    role: Option<Value>,
    speaker: Option<Value>,
    content: Option<Value>,
    #[serde(rename = "type")]
    message_type: Option<Value>,
    timestamp: Option<Value>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawFeedback {
    task_level: Option<Value>,
    task_name: Option<Value>,
    score: Option<Value>,
    summary: Option<Value>,
    timestamp: Option<Value>,
}

impl From<RawMessage> for Message {
    fn from(raw: RawMessage) -> Self {
        Message {
            role: text(raw.role).unwrap_or_default(),
            speaker: text(raw.speaker).unwrap_or_default(),
            content: text(raw.content).unwrap_or_default(),
            message_type: text(raw.message_type),
            timestamp: text(raw.timestamp),
        }
    }
}

impl From<RawFeedback> for FeedbackEvent {
    fn from(raw: RawFeedback) -> Self {
        FeedbackEvent {
            task_level: text(raw.task_level).unwrap_or_default(),
            task_name: text(raw.task_name).unwrap_or_default(),
            score: number(raw.score),
            summary: text(raw.summary).unwrap_or_default(),
            timestamp: text(raw.timestamp),
        }
    }
}

/// String fields only; anything else is treated as absent.
fn text(value: Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

/// Numbers and numeric strings; anything else is treated as absent.
pub(crate) fn number(value: Option<Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Integral numbers and integer strings; anything else is treated as absent,
/// including whole numbers outside the `i64` range.
pub(crate) fn integer(value: Option<Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Decode each entry of a history array, skipping entries that are not objects.
fn history<T, R>(value: Option<Value>, field: &str) -> Vec<T>
where
    R: for<'de> Deserialize<'de>,
    T: From<R>,
{
    let items = match value {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => return Vec::new(),
        Some(other) => {
            tracing::warn!(field, found = value_kind(&other), "history is not an array");
            return Vec::new();
        }
    };

    let mut decoded = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        if !item.is_object() {
            tracing::warn!(field, index, found = value_kind(&item), "skipping history entry");
            continue;
        }
        match serde_json::from_value::<R>(item) {
            Ok(raw) => decoded.push(T::from(raw)),
            Err(e) => {
                tracing::warn!(field, index, error = %e, "skipping history entry");
            }
        }
    }
    decoded
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Convert an already-parsed JSON value into a [`Payload`].
///
/// `null` is an empty payload; any other non-object is a failure.
pub fn payload_from_value(value: Value) -> Result<Payload, ParseFailure> {
    match value {
        Value::Null => Ok(Payload::default()),
        Value::Object(_) => {
            let raw: RawPayload = serde_json::from_value(value).map_err(|e| {
                // Unreachable in practice: every field is an Option<Value>
                ParseFailure::Strict(e.to_string())
            })?;
            Ok(Payload {
                total_turns: integer(raw.total_turns),
                test_history: history::<Message, RawMessage>(raw.test_history, "testHistory"),
                feedback_history: history::<FeedbackEvent, RawFeedback>(
                    raw.feedback_history,
                    "feedbackHistory",
                ),
            })
        }
        other => Err(ParseFailure::NotAnObject {
            found: value_kind(&other),
        }),
    }
}

/// Strict JSON decoding of a payload string.
///
/// Empty or whitespace-only text is an empty payload.
pub fn parse_payload(raw: &str) -> Result<Payload, ParseFailure> {
    if raw.trim().is_empty() {
        return Ok(Payload::default());
    }
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ParseFailure::Strict(e.to_string()))?;
    payload_from_value(value)
}

/// Run the decode pipeline over payload text.
///
/// See the module docs for the stages. The returned [`DecodedPayload`] says
/// which stage accepted the text.
pub fn decode_payload(raw: &str, options: &RecoveryOptions) -> Result<DecodedPayload, ParseFailure> {
    let strict_error = match parse_payload(raw) {
        Ok(payload) => {
            return Ok(DecodedPayload {
                payload,
                stage: DecodeStage::Strict,
            })
        }
        Err(ParseFailure::Strict(message)) => message,
        // A well-formed non-object will not become an object under the
        // relaxed grammar either
        Err(failure) => return Err(failure),
    };

    if !options.relaxed_parser {
        return Err(ParseFailure::Strict(strict_error));
    }

    match relaxed::parse(raw) {
        Ok(value) => {
            let payload = payload_from_value(value)?;
            tracing::debug!("payload recovered by relaxed parser");
            Ok(DecodedPayload {
                payload,
                stage: DecodeStage::Relaxed,
            })
        }
        Err(e) => Err(ParseFailure::Relaxed {
            strict: strict_error,
            relaxed: e.to_string(),
        }),
    }
}

/// Decode a record's payload field, whatever shape it arrived in.
pub fn decode_record_payload(
    source: &PayloadSource,
    options: &RecoveryOptions,
) -> Result<DecodedPayload, ParseFailure> {
    match source {
        PayloadSource::Missing => Ok(DecodedPayload {
            payload: Payload::default(),
            stage: DecodeStage::Strict,
        }),
        PayloadSource::Text(raw) => decode_payload(raw, options),
        PayloadSource::Inline(value) => Ok(DecodedPayload {
            payload: payload_from_value(value.clone())?,
            stage: DecodeStage::Strict,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FULL: &str = r#"{
        "totalTurns": 3,
        "testHistory": [
            {"role": "user", "speaker": "", "timestamp": "2024-01-01T00:00:00Z", "content": "hi", "type": "answer"},
            {"role": "assistant", "speaker": "TEACHER", "timestamp": "2024-01-01T00:05:00Z", "content": "hello"}
        ],
        "feedbackHistory": [
            {"taskLevel": "Remember", "taskName": "Recall", "score": 6, "summary": "ok", "timestamp": "2024-01-01T00:06:00Z"}
        ]
    }"#;

    #[test]
    fn test_parse_full_payload() {
        let payload = parse_payload(FULL).unwrap();

        assert_eq!(payload.total_turns, Some(3));
        assert_eq!(payload.test_history.len(), 2);
        assert_eq!(payload.test_history[0].role, "user");
        assert_eq!(payload.test_history[0].message_type.as_deref(), Some("answer"));
        assert_eq!(payload.test_history[1].speaker, "TEACHER");
        assert_eq!(payload.feedback_history.len(), 1);
        assert_eq!(payload.feedback_history[0].task_level, "Remember");
        assert_eq!(payload.feedback_history[0].score, Some(6.0));
    }

    #[test]
    fn test_empty_payloads() {
        assert_eq!(parse_payload("").unwrap(), Payload::default());
        assert_eq!(parse_payload("{}").unwrap(), Payload::default());
        assert_eq!(parse_payload("null").unwrap(), Payload::default());
    }

    #[test]
    fn test_truncated_payload_fails() {
        let truncated = &FULL[..FULL.len() / 2];
        assert!(matches!(parse_payload(truncated), Err(ParseFailure::Strict(_))));
    }

    #[test]
    fn test_non_object_payload_fails() {
        assert_eq!(
            parse_payload("[1, 2]"),
            Err(ParseFailure::NotAnObject { found: "an array" })
        );
        assert!(matches!(
            decode_payload("42", &RecoveryOptions::default()),
            Err(ParseFailure::NotAnObject { .. })
        ));
    }

    #[test]
    fn test_non_numeric_fields_are_absent() {
        let payload = parse_payload(
            r#"{"totalTurns": "many", "feedbackHistory": [
                {"taskLevel": "apply", "score": "high"},
                {"taskLevel": "apply", "score": "7.5"},
                {"taskLevel": "apply", "score": true},
                {"taskLevel": "apply"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(payload.total_turns, None);
        let scores: Vec<_> = payload.feedback_history.iter().map(|f| f.score).collect();
        assert_eq!(scores, vec![None, Some(7.5), None, None]);
    }

    #[test]
    fn test_integer_coercions() {
        assert_eq!(integer(Some(json!(4))), Some(4));
        assert_eq!(integer(Some(json!(4.0))), Some(4));
        assert_eq!(integer(Some(json!(4.5))), None);
        assert_eq!(integer(Some(json!(" 12 "))), Some(12));
        assert_eq!(integer(Some(json!(null))), None);
        assert_eq!(integer(None), None);
    }

    #[test]
    fn test_out_of_range_integers_are_absent() {
        assert_eq!(integer(Some(json!(1e20))), None);
        assert_eq!(integer(Some(json!(-1e20))), None);
        assert_eq!(integer(Some(json!(u64::MAX))), None);
        assert_eq!(integer(Some(json!("99999999999999999999"))), None);
        assert_eq!(integer(Some(json!(i64::MAX))), Some(i64::MAX));

        let payload = parse_payload(r#"{"totalTurns": 1e20}"#).unwrap();
        assert_eq!(payload.total_turns, None);
    }

    #[test]
    fn test_bad_history_entries_are_skipped() {
        let payload = parse_payload(
            r#"{"testHistory": ["oops", {"role": "user", "speaker": 7}, null],
                "feedbackHistory": {"not": "an array"}}"#,
        )
        .unwrap();

        assert_eq!(payload.test_history.len(), 1);
        assert_eq!(payload.test_history[0].role, "user");
        assert_eq!(payload.test_history[0].speaker, "");
        assert!(payload.feedback_history.is_empty());
    }

    #[test]
    fn test_decode_pipeline_strict_first() {
        let decoded = decode_payload(FULL, &RecoveryOptions::default()).unwrap();
        assert_eq!(decoded.stage, DecodeStage::Strict);
    }

    #[test]
    fn test_decode_pipeline_relaxed_fallback() {
        let raw = "{'totalTurns': 2, 'testHistory': [{'role': 'user', 'speaker': ''},], }";

        let decoded = decode_payload(raw, &RecoveryOptions::default()).unwrap();
        assert_eq!(decoded.stage, DecodeStage::Relaxed);
        assert_eq!(decoded.payload.total_turns, Some(2));
        assert_eq!(decoded.payload.test_history.len(), 1);

        let strict = decode_payload(raw, &RecoveryOptions::strict());
        assert!(matches!(strict, Err(ParseFailure::Strict(_))));
    }

    #[test]
    fn test_decode_pipeline_both_fail() {
        let failure = decode_payload(r#"{"totalTurns": 3, "testHis"#, &RecoveryOptions::default())
            .unwrap_err();
        match failure {
            ParseFailure::Relaxed { strict, relaxed } => {
                assert!(!strict.is_empty());
                assert!(relaxed.contains("unterminated"));
            }
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[test]
    fn test_decode_record_payload_shapes() {
        let options = RecoveryOptions::default();

        let missing = decode_record_payload(&PayloadSource::Missing, &options).unwrap();
        assert_eq!(missing.payload, Payload::default());

        let inline = decode_record_payload(
            &PayloadSource::Inline(json!({"totalTurns": 5})),
            &options,
        )
        .unwrap();
        assert_eq!(inline.payload.total_turns, Some(5));

        let text = decode_record_payload(&PayloadSource::Text("{".to_string()), &options);
        assert!(text.is_err());
    }
}

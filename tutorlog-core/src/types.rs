//! Core domain types for tutorlog
//!
//! These types describe the three layers of the extraction pass:
//!
//! | Layer | Types |
//! |-------|-------|
//! | **Input** | [`LogRecord`], [`PayloadSource`] |
//! | **Decoded** | [`Payload`], [`Message`], [`FeedbackEvent`] |
//! | **Derived** | [`UserMetrics`], [`RecordSummary`], [`ExtractionReport`] |
//!
//! ### Teacher, peer, user
//!
//! Exported conversations mix three kinds of participants. The examiner agent
//! is the **teacher**, the grading/feedback agent is the **peer**, and the
//! learner is the **user**. The log format does not carry these directly; they
//! are inferred from `role` and `speaker` by
//! [`classify_message`](crate::metrics::classify_message).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================
// Input records
// ============================================

/// One stored session chunk from the export file.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Owner of the session. Records without one are dropped during aggregation.
    pub user_id: Option<String>,
    /// Record identifier (`record_{index}` when the export has none)
    pub record_id: String,
    /// Informational creation timestamp, kept verbatim
    pub created_at: Option<String>,
    /// Embedded session payload
    pub payload: PayloadSource,
}

/// The `payload` field of a record as it appeared in the export.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PayloadSource {
    /// Absent or `null`; treated as an empty payload
    #[default]
    Missing,
    /// JSON text that still has to be decoded (possibly truncated)
    Text(String),
    /// Already-structured JSON value embedded directly in the export
    Inline(serde_json::Value),
}

// ============================================
// Decoded payload
// ============================================

/// Decoded session payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    /// Self-reported turn count; `None` when absent or non-numeric
    pub total_turns: Option<i64>,
    /// Conversation between the learner and the agents
    pub test_history: Vec<Message>,
    /// Grader feedback, one event per completed task
    pub feedback_history: Vec<FeedbackEvent>,
}

impl Payload {
    /// All messages of this payload, with feedback events re-expressed as
    /// messages (role `feedback`) after the test history.
    pub fn conversation(&self) -> Vec<Message> {
        let mut messages = self.test_history.clone();
        messages.extend(self.feedback_history.iter().map(FeedbackEvent::to_message));
        messages
    }
}

/// Role string assigned to feedback events re-expressed as messages.
pub const FEEDBACK_ROLE: &str = "feedback";

/// A single chat message from `testHistory`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    /// Open string set; "assistant" and "user" are recognized
    pub role: String,
    /// Free-text speaker label, possibly one of the reserved markers
    pub speaker: String,
    pub content: String,
    /// Free-text message type, carried through for reporting
    pub message_type: Option<String>,
    /// Raw ISO-8601 timestamp
    pub timestamp: Option<String>,
}

/// A grader feedback event from `feedbackHistory`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedbackEvent {
    /// Cognitive level label as written by the grader (any case)
    pub task_level: String,
    pub task_name: String,
    /// Score in 0-10; `None` when absent or non-numeric
    pub score: Option<f64>,
    pub summary: String,
    /// Raw ISO-8601 timestamp
    pub timestamp: Option<String>,
}

impl FeedbackEvent {
    /// Re-express this event as a message so it takes part in ordering,
    /// duration and role classification.
    pub fn to_message(&self) -> Message {
        Message {
            role: FEEDBACK_ROLE.to_string(),
            speaker: String::new(),
            content: self.summary.clone(),
            message_type: Some(FEEDBACK_ROLE.to_string()),
            timestamp: self.timestamp.clone(),
        }
    }
}

// ============================================
// Classification
// ============================================

/// Participant a message is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Teacher,
    Peer,
    User,
    /// Matches no classification rule; counted in no turn total
    Unclassified,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Peer => "peer",
            Role::User => "user",
            Role::Unclassified => "unclassified",
        }
    }

    /// Whether this role counts as a turn.
    pub fn is_classified(&self) -> bool {
        !matches!(self, Role::Unclassified)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The six canonical Bloom taxonomy levels, in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BloomLevel {
    Remember,
    Understand,
    Apply,
    Analyze,
    Evaluate,
    Create,
}

impl BloomLevel {
    pub const ALL: [BloomLevel; 6] = [
        BloomLevel::Remember,
        BloomLevel::Understand,
        BloomLevel::Apply,
        BloomLevel::Analyze,
        BloomLevel::Evaluate,
        BloomLevel::Create,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BloomLevel::Remember => "remember",
            BloomLevel::Understand => "understand",
            BloomLevel::Apply => "apply",
            BloomLevel::Analyze => "analyze",
            BloomLevel::Evaluate => "evaluate",
            BloomLevel::Create => "create",
        }
    }
}

impl std::fmt::Display for BloomLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BloomLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        BloomLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == normalized)
            .ok_or_else(|| format!("unknown bloom level: {}", s))
    }
}

/// Merged Bloom scores keyed by normalized (lower-case) level name.
///
/// Non-canonical level names are kept as written (lower-cased) so that no
/// grader output is silently discarded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BloomScores(BTreeMap<String, f64>);

impl BloomScores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one score into the map.
    ///
    /// The first score for a level is stored as-is; each later score replaces
    /// the stored value with the mean of the stored value and the new score.
    pub fn record(&mut self, level: &str, score: f64) {
        self.0
            .entry(level.to_string())
            .and_modify(|stored| *stored = (*stored + score) / 2.0)
            .or_insert(score);
    }

    pub fn get(&self, level: &str) -> Option<f64> {
        self.0.get(level).copied()
    }

    pub fn level(&self, level: BloomLevel) -> Option<f64> {
        self.get(level.as_str())
    }

    /// Number of levels whose merged score is strictly positive.
    pub fn completed_count(&self) -> usize {
        self.0.values().filter(|score| **score > 0.0).count()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(level, score)| (level.as_str(), *score))
    }
}

// ============================================
// Derived output
// ============================================

/// Whether a record's payload could be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonStatus {
    Complete,
    Incomplete,
}

impl JsonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JsonStatus::Complete => "complete",
            JsonStatus::Incomplete => "incomplete",
        }
    }
}

/// Which decoder accepted a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeStage {
    /// Strict JSON
    Strict,
    /// Relaxed literal-object syntax, after strict JSON failed
    Relaxed,
}

/// What a pattern scan could still find in an undecodable payload.
///
/// Diagnostic only: none of these values feed the metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialScan {
    /// `totalTurns` value found in the text, if any
    pub declared_total_turns: Option<i64>,
    pub has_test_history: bool,
    pub has_feedback_history: bool,
    /// First `"timestamp"` string in the text
    pub first_timestamp: Option<String>,
    /// Last `"timestamp"` string in the text
    pub last_timestamp: Option<String>,
    /// Number of `"timestamp"` strings in the text
    pub timestamp_count: usize,
}

/// Per-record view of the extraction, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub user_id: String,
    pub record_id: String,
    pub created_at: Option<String>,
    pub json_status: JsonStatus,
    /// Decoder that accepted the payload; `None` for incomplete records
    pub decoded_with: Option<DecodeStage>,
    pub total_turns: i64,
    pub message_count: usize,
    pub teacher_turns: usize,
    pub peer_turns: usize,
    pub user_turns: usize,
    pub role_switches: usize,
    /// Span of this record alone
    pub duration_minutes: f64,
    /// Messages with a missing or unparseable timestamp
    pub unparsed_timestamps: usize,
    /// Set when any timestamp could not be parsed; ordering and duration
    /// for this record are then less reliable
    pub low_confidence: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<PartialScan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated metrics for one user across all of their records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMetrics {
    pub user_id: String,
    pub record_count: usize,
    pub incomplete_records: usize,
    /// Sum of self-reported `totalTurns`
    pub total_turns: i64,
    /// Messages across all decoded records, feedback included
    pub message_count: usize,
    pub teacher_turns: usize,
    pub peer_turns: usize,
    pub user_turns: usize,
    /// Summed per record, never recomputed over the pooled sequence
    pub role_switches: usize,
    /// Span over the pooled messages of all records
    pub session_duration_minutes: f64,
    pub first_message_time: Option<String>,
    pub last_message_time: Option<String>,
    pub bloom_scores: BloomScores,
    pub bloom_completed_count: usize,
}

impl UserMetrics {
    /// Sum of the three turn counters.
    pub fn classified_turns(&self) -> usize {
        self.teacher_turns + self.peer_turns + self.user_turns
    }
}

/// Counters for the end-of-run diagnostic summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub input_records: usize,
    /// Records discarded for lacking a `user_id`
    pub dropped_records: usize,
    pub complete_records: usize,
    pub incomplete_records: usize,
    /// Incomplete payloads that the relaxed parser recovered
    pub relaxed_records: usize,
    pub user_count: usize,
}

/// Full result of one extraction pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub summary: RunSummary,
    /// Per-user metrics, sorted by user id
    pub users: BTreeMap<String, UserMetrics>,
    /// Per-record status in input order
    pub records: Vec<RecordSummary>,
}

impl ExtractionReport {
    /// Render the report as pretty-printed JSON.
    ///
    /// Users are keyed in sorted order, so identical input gives identical text.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A message paired with its parsed timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedMessage {
    pub message: Message,
    /// `None` when the timestamp is missing or unparseable
    pub emitted_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bloom_level_from_str() {
        assert_eq!("Remember".parse::<BloomLevel>(), Ok(BloomLevel::Remember));
        assert_eq!(" ANALYZE ".parse::<BloomLevel>(), Ok(BloomLevel::Analyze));
        assert!("synthesize".parse::<BloomLevel>().is_err());
    }

    #[test]
    fn test_bloom_scores_record_and_complete() {
        let mut scores = BloomScores::new();
        scores.record("apply", 0.0);
        scores.record("remember", 4.0);
        scores.record("remember", 8.0);

        assert_eq!(scores.level(BloomLevel::Remember), Some(6.0));
        assert_eq!(scores.get("apply"), Some(0.0));
        assert_eq!(scores.completed_count(), 1);
        assert_eq!(scores.len(), 2);
    }

    #[test]
    fn test_bloom_scores_serialize_as_map() {
        let mut scores = BloomScores::new();
        scores.record("understand", 7.5);
        scores.record("create", 3.0);

        let json = serde_json::to_string(&scores).unwrap();
        assert_eq!(json, r#"{"create":3.0,"understand":7.5}"#);
    }

    #[test]
    fn test_feedback_event_to_message() {
        let event = FeedbackEvent {
            task_level: "Apply".to_string(),
            task_name: "Task 3".to_string(),
            score: Some(7.0),
            summary: "Good".to_string(),
            timestamp: Some("2024-01-01T00:06:00Z".to_string()),
        };

        let message = event.to_message();
        assert_eq!(message.role, FEEDBACK_ROLE);
        assert!(message.speaker.is_empty());
        assert_eq!(message.content, "Good");
        assert_eq!(message.timestamp.as_deref(), Some("2024-01-01T00:06:00Z"));
    }

    #[test]
    fn test_payload_conversation_appends_feedback() {
        let payload = Payload {
            total_turns: Some(1),
            test_history: vec![Message {
                role: "user".to_string(),
                ..Default::default()
            }],
            feedback_history: vec![FeedbackEvent::default()],
        };

        let messages = payload.conversation();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].role, FEEDBACK_ROLE);
    }

    #[test]
    fn test_json_status_serialization() {
        assert_eq!(
            serde_json::to_string(&JsonStatus::Incomplete).unwrap(),
            "\"incomplete\""
        );
        assert_eq!(JsonStatus::Complete.as_str(), "complete");
    }
}

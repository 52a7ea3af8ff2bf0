//! Interaction metrics for decoded conversations
//!
//! The building blocks here are pure functions over decoded messages:
//!
//! - [`classify_message`]: teacher / peer / user / unclassified
//! - [`order_messages`]: stable time ordering
//! - [`compute_role_switches`]: transitions between classified turns
//! - [`compute_duration`]: span between first and last parseable timestamp
//! - [`merge_bloom_scores`]: per-level Bloom scores
//!
//! [`aggregate_by_user`] combines them into per-user [`UserMetrics`].
//!
//! [`UserMetrics`]: crate::types::UserMetrics

pub mod aggregate;

pub use aggregate::{aggregate_by_user, summarize_record, ExtractOptions, RecordMetrics};

use crate::config::{DEFAULT_PEER_MARKER, DEFAULT_TEACHER_MARKER};
use crate::ingest::parse_timestamp;
use crate::types::{BloomScores, FeedbackEvent, Message, Role, TimedMessage, FEEDBACK_ROLE};
use chrono::{DateTime, Utc};

/// Reserved speaker labels that identify the teacher and the peer agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakerMarkers {
    teacher: String,
    peer: String,
}

impl SpeakerMarkers {
    pub fn new(teacher: impl Into<String>, peer: impl Into<String>) -> Self {
        Self {
            teacher: teacher.into(),
            peer: peer.into(),
        }
    }

    pub fn teacher(&self) -> &str {
        &self.teacher
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Classify a `(role, speaker)` pair. First matching rule wins:
    ///
    /// 1. speaker is the teacher marker
    /// 2. role is `assistant` and speaker is not the peer marker
    /// 3. speaker is the peer marker
    /// 4. role is `feedback`
    /// 5. role is `user`
    pub fn classify(&self, role: &str, speaker: &str) -> Role {
        if speaker == self.teacher {
            Role::Teacher
        } else if role == "assistant" && speaker != self.peer {
            Role::Teacher
        } else if speaker == self.peer {
            Role::Peer
        } else if role == FEEDBACK_ROLE {
            Role::Peer
        } else if role == "user" {
            Role::User
        } else {
            Role::Unclassified
        }
    }
}

impl Default for SpeakerMarkers {
    fn default() -> Self {
        Self::new(DEFAULT_TEACHER_MARKER, DEFAULT_PEER_MARKER)
    }
}

/// Attribute a message to a participant.
pub fn classify_message(message: &Message, markers: &SpeakerMarkers) -> Role {
    markers.classify(&message.role, &message.speaker)
}

/// Turn counts per participant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnCounts {
    pub teacher: usize,
    pub peer: usize,
    pub user: usize,
    pub unclassified: usize,
}

impl TurnCounts {
    pub fn tally(roles: impl IntoIterator<Item = Role>) -> Self {
        let mut counts = Self::default();
        for role in roles {
            match role {
                Role::Teacher => counts.teacher += 1,
                Role::Peer => counts.peer += 1,
                Role::User => counts.user += 1,
                Role::Unclassified => counts.unclassified += 1,
            }
        }
        counts
    }

    /// Turns attributed to a participant.
    pub fn classified(&self) -> usize {
        self.teacher + self.peer + self.user
    }
}

/// Sort messages by time.
///
/// The sort is stable. Messages whose timestamp is missing or unparseable
/// sort before every timestamped message, keeping their relative order.
pub fn order_messages(messages: Vec<Message>) -> Vec<TimedMessage> {
    let mut timed: Vec<TimedMessage> = messages
        .into_iter()
        .map(|message| {
            let emitted_at = message.timestamp.as_deref().and_then(parse_timestamp);
            TimedMessage {
                message,
                emitted_at,
            }
        })
        .collect();
    // Option orders None before Some
    timed.sort_by_key(|m| m.emitted_at);
    timed
}

/// Count transitions between differently classified consecutive turns.
///
/// Unclassified messages are transparent: they neither count nor reset the
/// previous role.
pub fn compute_role_switches(roles: impl IntoIterator<Item = Role>) -> usize {
    let mut switches = 0;
    let mut last_role: Option<Role> = None;

    for role in roles.into_iter().filter(Role::is_classified) {
        if matches!(last_role, Some(last) if last != role) {
            switches += 1;
        }
        last_role = Some(role);
    }

    switches
}

/// Minutes between the earliest and latest parseable timestamps, rounded to
/// two decimals. Zero when fewer than two timestamps parse.
pub fn compute_duration(messages: &[TimedMessage]) -> f64 {
    let mut min_ts: Option<DateTime<Utc>> = None;
    let mut max_ts: Option<DateTime<Utc>> = None;
    let mut parsed = 0usize;

    for ts in messages.iter().filter_map(|m| m.emitted_at) {
        parsed += 1;
        min_ts = Some(min_ts.map_or(ts, |current| current.min(ts)));
        max_ts = Some(max_ts.map_or(ts, |current| current.max(ts)));
    }

    match (min_ts, max_ts) {
        (Some(start), Some(end)) if parsed >= 2 => {
            let millis = end.signed_duration_since(start).num_milliseconds();
            round_to_hundredths(millis as f64 / 60_000.0)
        }
        _ => 0.0,
    }
}

/// Merge feedback scores per Bloom level.
///
/// Levels are lower-cased and trimmed. Events with an empty level or without
/// a numeric score are ignored. A repeated level stores the mean of its
/// previous merged value and the new score, so the result depends on order.
pub fn merge_bloom_scores<'a>(events: impl IntoIterator<Item = &'a FeedbackEvent>) -> BloomScores {
    let mut scores = BloomScores::new();
    for event in events {
        let level = event.task_level.trim().to_lowercase();
        if level.is_empty() {
            continue;
        }
        if let Some(score) = event.score {
            scores.record(&level, score);
        }
    }
    scores
}

pub(crate) fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers() -> SpeakerMarkers {
        SpeakerMarkers::new("TEACHER", "PEER")
    }

    fn msg(role: &str, speaker: &str, timestamp: Option<&str>) -> Message {
        Message {
            role: role.to_string(),
            speaker: speaker.to_string(),
            content: String::new(),
            message_type: None,
            timestamp: timestamp.map(|s| s.to_string()),
        }
    }

    fn feedback(level: &str, score: Option<f64>) -> FeedbackEvent {
        FeedbackEvent {
            task_level: level.to_string(),
            score,
            ..Default::default()
        }
    }

    #[test]
    fn test_classification_precedence() {
        let m = markers();

        // Teacher marker wins over every role
        assert_eq!(m.classify("user", "TEACHER"), Role::Teacher);
        assert_eq!(m.classify("feedback", "TEACHER"), Role::Teacher);
        // Assistant without the peer marker is the teacher
        assert_eq!(m.classify("assistant", ""), Role::Teacher);
        assert_eq!(m.classify("assistant", "someone"), Role::Teacher);
        // Assistant speaking as the peer agent is the peer
        assert_eq!(m.classify("assistant", "PEER"), Role::Peer);
        assert_eq!(m.classify("user", "PEER"), Role::Peer);
        assert_eq!(m.classify("feedback", ""), Role::Peer);
        assert_eq!(m.classify("user", ""), Role::User);
        assert_eq!(m.classify("system", ""), Role::Unclassified);
        assert_eq!(m.classify("", ""), Role::Unclassified);
    }

    #[test]
    fn test_classification_is_case_sensitive() {
        let m = markers();
        assert_eq!(m.classify("Assistant", ""), Role::Unclassified);
        assert_eq!(m.classify("user", "teacher"), Role::User);
    }

    #[test]
    fn test_classify_message_is_pure() {
        let m = markers();
        let message = msg("assistant", "", None);
        let first = classify_message(&message, &m);
        for _ in 0..3 {
            assert_eq!(classify_message(&message, &m), first);
        }
    }

    #[test]
    fn test_feedback_messages_are_peer() {
        let m = markers();
        let message = feedback("apply", Some(5.0)).to_message();
        assert_eq!(classify_message(&message, &m), Role::Peer);
    }

    #[test]
    fn test_default_markers() {
        let m = SpeakerMarkers::default();
        assert_eq!(m.classify("user", DEFAULT_TEACHER_MARKER), Role::Teacher);
        assert_eq!(m.classify("assistant", DEFAULT_PEER_MARKER), Role::Peer);
    }

    #[test]
    fn test_turn_counts() {
        let counts = TurnCounts::tally([
            Role::Teacher,
            Role::User,
            Role::Unclassified,
            Role::Peer,
            Role::User,
        ]);
        assert_eq!(counts.teacher, 1);
        assert_eq!(counts.peer, 1);
        assert_eq!(counts.user, 2);
        assert_eq!(counts.unclassified, 1);
        assert_eq!(counts.classified(), 4);
    }

    #[test]
    fn test_order_messages_sorts_unparseable_first() {
        let ordered = order_messages(vec![
            msg("user", "", Some("2024-01-01T00:10:00Z")),
            msg("assistant", "", Some("garbage")),
            msg("user", "", Some("2024-01-01T00:00:00+00:00")),
            msg("feedback", "", None),
        ]);

        let roles: Vec<_> = ordered.iter().map(|m| m.message.role.as_str()).collect();
        assert_eq!(roles, vec!["assistant", "feedback", "user", "user"]);
        assert!(ordered[0].emitted_at.is_none());
        assert!(ordered[1].emitted_at.is_none());
        assert!(ordered[2].emitted_at < ordered[3].emitted_at);
    }

    #[test]
    fn test_order_messages_is_stable_for_ties() {
        let ordered = order_messages(vec![
            msg("user", "a", Some("2024-01-01T00:00:00Z")),
            msg("user", "b", Some("2024-01-01T00:00:00+00:00")),
            msg("user", "c", Some("2024-01-01T00:00:00Z")),
        ]);
        let speakers: Vec<_> = ordered.iter().map(|m| m.message.speaker.as_str()).collect();
        assert_eq!(speakers, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_role_switches_trivial() {
        assert_eq!(compute_role_switches(Vec::new()), 0);
        assert_eq!(compute_role_switches([Role::User]), 0);
        assert_eq!(
            compute_role_switches([Role::Unclassified, Role::Teacher, Role::Unclassified]),
            0
        );
    }

    #[test]
    fn test_role_switches_count_changes() {
        let roles = [
            Role::User,
            Role::Teacher,
            Role::Teacher,
            Role::User,
            Role::Peer,
        ];
        assert_eq!(compute_role_switches(roles), 3);
    }

    #[test]
    fn test_unclassified_is_transparent() {
        // user, ?, user: no switch; the unclassified message does not reset
        assert_eq!(
            compute_role_switches([Role::User, Role::Unclassified, Role::User]),
            0
        );
        // user, ?, teacher: one switch
        assert_eq!(
            compute_role_switches([Role::User, Role::Unclassified, Role::Teacher]),
            1
        );
    }

    #[test]
    fn test_duration() {
        let ordered = order_messages(vec![
            msg("user", "", Some("2024-01-01T00:00:00Z")),
            msg("user", "", None),
            msg("assistant", "", Some("2024-01-01T00:06:00Z")),
            msg("assistant", "", Some("2024-01-01T00:01:30Z")),
        ]);
        assert_eq!(compute_duration(&ordered), 6.0);
    }

    #[test]
    fn test_duration_rounding() {
        let ordered = order_messages(vec![
            msg("user", "", Some("2024-01-01T00:00:00Z")),
            msg("user", "", Some("2024-01-01T00:00:20Z")),
        ]);
        assert_eq!(compute_duration(&ordered), 0.33);
    }

    #[test]
    fn test_duration_needs_two_timestamps() {
        assert_eq!(compute_duration(&[]), 0.0);

        let single = order_messages(vec![
            msg("user", "", Some("2024-01-01T00:00:00Z")),
            msg("user", "", Some("not a time")),
        ]);
        assert_eq!(compute_duration(&single), 0.0);
    }

    #[test]
    fn test_merge_bloom_scores_is_order_dependent() {
        let events = [
            feedback("Remember", Some(4.0)),
            feedback("remember", Some(8.0)),
            feedback("REMEMBER", Some(10.0)),
        ];
        let scores = merge_bloom_scores(&events);
        // ((4 + 8) / 2 + 10) / 2, not the mean of all three
        assert_eq!(scores.get("remember"), Some(8.0));
    }

    #[test]
    fn test_merge_bloom_scores_two_events() {
        let scores = merge_bloom_scores(&[feedback("apply", Some(4.0)), feedback("apply", Some(8.0))]);
        assert_eq!(scores.get("apply"), Some(6.0));
    }

    #[test]
    fn test_merge_bloom_scores_skips_unusable_events() {
        let events = [
            feedback("", Some(9.0)),
            feedback("  ", Some(9.0)),
            feedback("create", None),
            feedback(" Analyze ", Some(0.0)),
            feedback("understand", Some(3.5)),
        ];
        let scores = merge_bloom_scores(&events);

        assert_eq!(scores.len(), 2);
        assert_eq!(scores.get("analyze"), Some(0.0));
        assert_eq!(scores.get("create"), None);
        assert_eq!(scores.completed_count(), 1);
    }
}

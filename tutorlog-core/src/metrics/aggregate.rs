//! Per-record summaries and per-user aggregation.
//!
//! Turn counts and role switches are computed for each record on its own
//! ordering and then summed. Duration and first/last message time are
//! computed once over the pooled messages of a user. Bloom scores are merged
//! over the user's feedback events in input order.

use super::{
    classify_message, compute_duration, compute_role_switches, merge_bloom_scores,
    order_messages, SpeakerMarkers, TurnCounts,
};
use crate::config::Config;
use crate::ingest::{decode_record_payload, partial, RecoveryOptions};
use crate::types::{
    DecodeStage, ExtractionReport, FeedbackEvent, JsonStatus, LogRecord, Message, PayloadSource,
    RecordSummary, RunSummary, UserMetrics,
};
use std::collections::BTreeMap;

/// Everything an extraction pass can be configured with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    pub markers: SpeakerMarkers,
    pub recovery: RecoveryOptions,
}

impl From<&Config> for ExtractOptions {
    fn from(config: &Config) -> Self {
        Self {
            markers: config.markers.to_markers(),
            recovery: config.recovery.to_options(),
        }
    }
}

/// A record's summary plus the decoded content the user aggregate needs.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordMetrics {
    pub summary: RecordSummary,
    /// Conversation of the record, feedback included, in record order
    pub messages: Vec<Message>,
    pub feedback: Vec<FeedbackEvent>,
}

/// Decode one record and compute its own metrics.
///
/// Never fails: an undecodable payload yields an incomplete summary with
/// zero counters and the decode error.
pub fn summarize_record(user_id: &str, record: &LogRecord, options: &ExtractOptions) -> RecordMetrics {
    let decoded = match decode_record_payload(&record.payload, &options.recovery) {
        Ok(decoded) => decoded,
        Err(failure) => {
            tracing::warn!(
                user_id,
                record_id = %record.record_id,
                error = %failure,
                "payload could not be decoded"
            );

            let partial = match &record.payload {
                PayloadSource::Text(raw) if options.recovery.partial_scan => Some(partial::scan(raw)),
                _ => None,
            };

            return RecordMetrics {
                summary: RecordSummary {
                    partial,
                    error: Some(failure.to_string()),
                    ..empty_summary(user_id, record, JsonStatus::Incomplete)
                },
                messages: Vec::new(),
                feedback: Vec::new(),
            };
        }
    };

    let payload = decoded.payload;
    let ordered = order_messages(payload.conversation());
    let roles: Vec<_> = ordered
        .iter()
        .map(|m| classify_message(&m.message, &options.markers))
        .collect();
    let counts = TurnCounts::tally(roles.iter().copied());
    let unparsed_timestamps = ordered.iter().filter(|m| m.emitted_at.is_none()).count();

    let summary = RecordSummary {
        decoded_with: Some(decoded.stage),
        total_turns: payload.total_turns.unwrap_or(0),
        message_count: ordered.len(),
        teacher_turns: counts.teacher,
        peer_turns: counts.peer,
        user_turns: counts.user,
        role_switches: compute_role_switches(roles),
        duration_minutes: compute_duration(&ordered),
        unparsed_timestamps,
        low_confidence: unparsed_timestamps > 0,
        ..empty_summary(user_id, record, JsonStatus::Complete)
    };

    RecordMetrics {
        summary,
        messages: ordered.into_iter().map(|m| m.message).collect(),
        feedback: payload.feedback_history,
    }
}

fn empty_summary(user_id: &str, record: &LogRecord, json_status: JsonStatus) -> RecordSummary {
    RecordSummary {
        user_id: user_id.to_string(),
        record_id: record.record_id.clone(),
        created_at: record.created_at.clone(),
        json_status,
        decoded_with: None,
        total_turns: 0,
        message_count: 0,
        teacher_turns: 0,
        peer_turns: 0,
        user_turns: 0,
        role_switches: 0,
        duration_minutes: 0.0,
        unparsed_timestamps: 0,
        low_confidence: false,
        partial: None,
        error: None,
    }
}

/// Running totals for one user while records stream in.
#[derive(Debug, Default)]
struct UserAccumulator {
    record_count: usize,
    incomplete_records: usize,
    total_turns: i64,
    teacher_turns: usize,
    peer_turns: usize,
    user_turns: usize,
    role_switches: usize,
    messages: Vec<Message>,
    feedback: Vec<FeedbackEvent>,
}

impl UserAccumulator {
    fn add(&mut self, record: &RecordMetrics) {
        let summary = &record.summary;
        self.record_count += 1;
        if summary.json_status == JsonStatus::Incomplete {
            self.incomplete_records += 1;
        }
        self.total_turns = self.total_turns.saturating_add(summary.total_turns);
        self.teacher_turns += summary.teacher_turns;
        self.peer_turns += summary.peer_turns;
        self.user_turns += summary.user_turns;
        self.role_switches += summary.role_switches;
        self.messages.extend(record.messages.iter().cloned());
        self.feedback.extend(record.feedback.iter().cloned());
    }

    fn finish(self, user_id: String) -> UserMetrics {
        let ordered = order_messages(self.messages);
        let bloom_scores = merge_bloom_scores(&self.feedback);

        UserMetrics {
            record_count: self.record_count,
            incomplete_records: self.incomplete_records,
            total_turns: self.total_turns,
            message_count: ordered.len(),
            teacher_turns: self.teacher_turns,
            peer_turns: self.peer_turns,
            user_turns: self.user_turns,
            role_switches: self.role_switches,
            session_duration_minutes: compute_duration(&ordered),
            first_message_time: ordered.first().and_then(|m| m.message.timestamp.clone()),
            last_message_time: ordered.last().and_then(|m| m.message.timestamp.clone()),
            bloom_completed_count: bloom_scores.completed_count(),
            bloom_scores,
            user_id,
        }
    }
}

/// Run the extraction over every record and group the results by user.
///
/// Records without a `user_id` are dropped and counted. Users whose records
/// all failed to decode still appear, with zero counters.
pub fn aggregate_by_user(records: &[LogRecord], options: &ExtractOptions) -> ExtractionReport {
    let mut summary = RunSummary {
        input_records: records.len(),
        ..Default::default()
    };
    let mut accumulators: BTreeMap<String, UserAccumulator> = BTreeMap::new();
    let mut summaries = Vec::with_capacity(records.len());

    for record in records {
        let Some(user_id) = record.user_id.as_deref() else {
            tracing::debug!(record_id = %record.record_id, "dropping record without user_id");
            summary.dropped_records += 1;
            continue;
        };

        let metrics = summarize_record(user_id, record, options);
        match metrics.summary.json_status {
            JsonStatus::Complete => summary.complete_records += 1,
            JsonStatus::Incomplete => summary.incomplete_records += 1,
        }
        if metrics.summary.decoded_with == Some(DecodeStage::Relaxed) {
            summary.relaxed_records += 1;
        }

        accumulators.entry(user_id.to_string()).or_default().add(&metrics);
        summaries.push(metrics.summary);
    }

    let users: BTreeMap<String, UserMetrics> = accumulators
        .into_iter()
        .map(|(user_id, acc)| (user_id.clone(), acc.finish(user_id)))
        .collect();
    summary.user_count = users.len();

    tracing::info!(
        input = summary.input_records,
        dropped = summary.dropped_records,
        complete = summary.complete_records,
        incomplete = summary.incomplete_records,
        users = summary.user_count,
        "extraction complete"
    );

    ExtractionReport {
        summary,
        users,
        records: summaries,
    }
}

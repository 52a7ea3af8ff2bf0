//! Ingestion layer for exported conversation logs
//!
//! Turns the export file into [`LogRecord`]s and decodes their payloads.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │   Export file   │ ──► │   load_records   │ ──► │    LogRecord     │
//! │ (JSON array)    │     │ (array or lines) │     │ (payload: text)  │
//! └─────────────────┘     └──────────────────┘     └────────┬─────────┘
//!                                                           │
//!                                                           ▼
//!                                             ┌───────────────────────────┐
//!                                             │   decode_record_payload   │
//!                                             │  ├─ strict JSON           │
//!                                             │  ├─ relaxed literal       │
//!                                             │  └─ ParseFailure (+ scan) │
//!                                             └───────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tutorlog_core::ingest::load_records;
//! use std::path::Path;
//!
//! let loaded = load_records(Path::new("conversation_logs_rows.json"))?;
//! println!("Found {} records", loaded.records.len());
//! # Ok::<(), tutorlog_core::Error>(())
//! ```

pub mod partial;
pub mod payload;
pub mod relaxed;
pub mod timestamp;

pub use payload::{
    decode_payload, decode_record_payload, parse_payload, payload_from_value, DecodedPayload,
    ParseFailure, RecoveryOptions,
};
pub use timestamp::parse_timestamp;

use crate::error::{Error, Result};
use crate::types::{LogRecord, PayloadSource};
use payload::value_kind;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// Records read from an export, plus anything worth reporting about the read.
#[derive(Debug, Default)]
pub struct LoadedRecords {
    pub records: Vec<LogRecord>,
    /// Non-fatal problems (skipped elements or lines)
    pub warnings: Vec<String>,
    /// Whether the file was not a valid JSON array and was read line by line
    pub line_fallback: bool,
}

/// One element of the export array.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawRecord {
    id: Option<Value>,
    user_id: Option<Value>,
    created_at: Option<Value>,
    payload: Option<Value>,
}

impl RawRecord {
    fn into_record(self, index: usize) -> LogRecord {
        LogRecord {
            user_id: user_identifier(self.user_id),
            record_id: identifier(self.id).unwrap_or_else(|| format!("record_{}", index)),
            created_at: match self.created_at {
                Some(Value::String(s)) => Some(s),
                _ => None,
            },
            payload: match self.payload {
                None | Some(Value::Null) => PayloadSource::Missing,
                Some(Value::String(s)) => PayloadSource::Text(s),
                Some(other) => PayloadSource::Inline(other),
            },
        }
    }
}

/// Record identifiers may be strings or numbers; an empty string counts as
/// missing.
fn identifier(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Owner ids follow the export's falsy rule: `null`, `""`, `0` and
/// non-scalar values mean no owner. Whitespace-only strings are kept.
fn user_identifier(value: Option<Value>) -> Option<String> {
    match value? {
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => identifier(Some(other)),
    }
}

/// Read an export file.
///
/// A missing or unreadable file is an error; everything after that is
/// handled by [`parse_records`].
pub fn load_records(path: &Path) -> Result<LoadedRecords> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to open {}: {}", path.display(), e),
        ))
    })?;

    tracing::info!(path = %path.display(), bytes = content.len(), "Loaded export file");

    parse_records(&content, &path.display().to_string())
}

/// Parse export text into records.
///
/// The text is read as a JSON array first. When that fails it is read line by
/// line, one record object per line, which recovers exports whose array was
/// cut short or that contain a corrupt element. `source_name` is only used in
/// messages.
pub fn parse_records(content: &str, source_name: &str) -> Result<LoadedRecords> {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Array(items)) => Ok(records_from_array(items)),
        Ok(other) => Err(Error::Input {
            source_name: source_name.to_string(),
            message: format!("expected a JSON array of records, found {}", value_kind(&other)),
        }),
        Err(e) => {
            tracing::warn!(
                source = source_name,
                error = %e,
                "Export is not a valid JSON array, reading line by line"
            );
            let mut loaded = records_from_lines(content);
            loaded
                .warnings
                .insert(0, format!("export is not a valid JSON array: {}", e));
            Ok(loaded)
        }
    }
}

fn records_from_array(items: Vec<Value>) -> LoadedRecords {
    let mut loaded = LoadedRecords::default();

    for (index, item) in items.into_iter().enumerate() {
        if !item.is_object() {
            loaded.warnings.push(format!(
                "element {}: expected a record object, found {}",
                index,
                value_kind(&item)
            ));
            continue;
        }
        match serde_json::from_value::<RawRecord>(item) {
            Ok(raw) => loaded.records.push(raw.into_record(index)),
            Err(e) => loaded
                .warnings
                .push(format!("element {}: deserialization error: {}", index, e)),
        }
    }

    loaded
}

fn records_from_lines(content: &str) -> LoadedRecords {
    let mut loaded = LoadedRecords {
        line_fallback: true,
        ..Default::default()
    };

    for (line_number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('[') || line.starts_with(']') {
            continue;
        }
        let line = line.strip_suffix(',').unwrap_or(line);

        let raw = match serde_json::from_str::<Value>(line) {
            Ok(value @ Value::Object(_)) => serde_json::from_value::<RawRecord>(value),
            Ok(other) => {
                loaded.warnings.push(format!(
                    "line {}: expected a record object, found {}",
                    line_number + 1,
                    value_kind(&other)
                ));
                continue;
            }
            Err(e) => {
                loaded
                    .warnings
                    .push(format!("line {}: JSON parse error: {}", line_number + 1, e));
                continue;
            }
        };

        match raw {
            Ok(raw) => {
                let index = loaded.records.len();
                loaded.records.push(raw.into_record(index));
            }
            Err(e) => loaded.warnings.push(format!(
                "line {}: deserialization error: {}",
                line_number + 1,
                e
            )),
        }
    }

    loaded
}

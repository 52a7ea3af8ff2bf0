//! Formatting helpers for console output.

use crate::types::{BloomLevel, BloomScores};

/// Format a score, dropping the fraction when it is whole (e.g. "6", "7.25").
pub fn format_score(score: f64) -> String {
    if score.fract() == 0.0 && score.abs() < 1e15 {
        format!("{}", score as i64)
    } else {
        format!("{:.2}", score)
    }
}

/// Format merged Bloom scores as `level=score` pairs.
///
/// Canonical levels come first in taxonomy order, then any other level
/// alphabetically. Empty scores format as "-".
pub fn format_bloom_scores(scores: &BloomScores) -> String {
    if scores.is_empty() {
        return "-".to_string();
    }

    let mut parts: Vec<String> = BloomLevel::ALL
        .iter()
        .filter_map(|level| {
            scores
                .level(*level)
                .map(|score| format!("{}={}", level, format_score(score)))
        })
        .collect();
    parts.extend(
        scores
            .iter()
            .filter(|(level, _)| level.parse::<BloomLevel>().is_err())
            .map(|(level, score)| format!("{}={}", level, format_score(score))),
    );
    parts.join(" ")
}

/// Format a duration in minutes (e.g. "45.50m", "2h 05m").
pub fn format_minutes(minutes: f64) -> String {
    if minutes < 60.0 {
        format!("{}m", format_score(minutes))
    } else {
        let total = minutes.round() as i64;
        format!("{}h {:02}m", total / 60, total % 60)
    }
}

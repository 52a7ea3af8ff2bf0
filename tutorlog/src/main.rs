//! tutorlog-extract - CLI tool to compute interaction metrics from conversation logs
//!
//! Reads an exported conversation log table, decodes every payload and prints
//! per-user metrics, or writes them as a JSON report.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tutorlog_core::format::{format_bloom_scores, format_minutes};
use tutorlog_core::{
    aggregate_by_user, load_records, Config, ExtractOptions, ExtractionReport, JsonStatus,
    LoadedRecords,
};

#[derive(Parser)]
#[command(name = "tutorlog-extract")]
#[command(about = "Compute interaction metrics from exported tutoring conversation logs")]
#[command(version)]
struct Args {
    /// Export file: a JSON array of {id, user_id, created_at, payload} records
    input: PathBuf,

    /// Write the JSON report to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Config file (defaults to $XDG_CONFIG_HOME/tutorlog/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Speaker label that marks teacher turns
    #[arg(long)]
    teacher_marker: Option<String>,

    /// Speaker label that marks peer (feedback agent) turns
    #[arg(long)]
    peer_marker: Option<String>,

    /// Only accept strict JSON payloads
    #[arg(long)]
    strict: bool,

    /// Do not scan undecodable payloads for known keys
    #[arg(long)]
    no_partial_scan: bool,

    /// Verbose output (list every record, not just users)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    // Load configuration, then apply command-line overrides
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::load().context("failed to load configuration")?,
    };
    apply_overrides(&mut config, &args);
    config.validate().context("invalid configuration")?;

    // Initialize logging
    let _log_guard =
        tutorlog_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!(input = %args.input.display(), "starting extraction");

    let loaded = load_records(&args.input)
        .with_context(|| format!("failed to read export {}", args.input.display()))?;

    let report = aggregate_by_user(&loaded.records, &ExtractOptions::from(&config));

    match args.format {
        OutputFormat::Json => {
            let json = report.to_json().context("failed to serialize report")?;
            match &args.output {
                Some(path) => {
                    write_report(path, &json)?;
                    print_diagnostics(&report, &loaded);
                    println!("Report written to {}", path.display());
                }
                None => {
                    println!("{}", json);
                    // Keep stdout parseable
                    eprint_diagnostics(&report, &loaded);
                }
            }
        }
        OutputFormat::Text => {
            print_text_report(&report, args.verbose);
            if let Some(path) = &args.output {
                let json = report.to_json().context("failed to serialize report")?;
                write_report(path, &json)?;
                println!("\nReport written to {}", path.display());
            }
            print_diagnostics(&report, &loaded);
        }
    }

    Ok(())
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(ref marker) = args.teacher_marker {
        config.markers.teacher = marker.clone();
    }
    if let Some(ref marker) = args.peer_marker {
        config.markers.peer = marker.clone();
    }
    if args.strict {
        config.recovery.relaxed_parser = false;
    }
    if args.no_partial_scan {
        config.recovery.partial_scan = false;
    }
}

fn write_report(path: &Path, json: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, format!("{}\n", json))
        .with_context(|| format!("failed to write {}", path.display()))
}

fn print_text_report(report: &ExtractionReport, verbose: bool) {
    if report.users.is_empty() {
        println!("No users found in export.");
        return;
    }

    for metrics in report.users.values() {
        println!("User: {}", metrics.user_id);
        println!(
            "  records: {} ({} incomplete)",
            metrics.record_count, metrics.incomplete_records
        );
        println!(
            "  turns: {} declared, {} teacher, {} peer, {} user",
            metrics.total_turns, metrics.teacher_turns, metrics.peer_turns, metrics.user_turns
        );
        println!("  role switches: {}", metrics.role_switches);
        println!(
            "  duration: {}",
            format_minutes(metrics.session_duration_minutes)
        );
        if let (Some(first), Some(last)) = (&metrics.first_message_time, &metrics.last_message_time)
        {
            println!("  span: {} .. {}", first, last);
        }
        println!(
            "  bloom: {} ({} completed)",
            format_bloom_scores(&metrics.bloom_scores),
            metrics.bloom_completed_count
        );
    }

    if verbose {
        println!("\nRecords:");
        for record in &report.records {
            let status_icon = match record.json_status {
                JsonStatus::Complete if record.low_confidence => "~",
                JsonStatus::Complete => "+",
                JsonStatus::Incomplete => "!",
            };
            println!(
                "  [{}] {} / {} ({} messages, {} switches, {})",
                status_icon,
                record.user_id,
                record.record_id,
                record.message_count,
                record.role_switches,
                format_minutes(record.duration_minutes)
            );
            if let Some(ref e) = record.error {
                println!("      error: {}", e);
            }
            if let Some(ref partial) = record.partial {
                println!(
                    "      partial: totalTurns={} timestamps={}",
                    partial
                        .declared_total_turns
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "?".to_string()),
                    partial.timestamp_count
                );
            }
        }
    }
}

fn diagnostic_lines(report: &ExtractionReport, loaded: &LoadedRecords) -> Vec<String> {
    let summary = &report.summary;
    let mut lines = vec![
        "---".to_string(),
        format!("Found {} record(s)", summary.input_records),
        format!("Dropped {} record(s) without user_id", summary.dropped_records),
        format!(
            "Payloads: {} complete, {} incomplete ({} recovered by relaxed parser)",
            summary.complete_records, summary.incomplete_records, summary.relaxed_records
        ),
        format!("Users: {}", summary.user_count),
    ];
    if loaded.line_fallback {
        lines.push("Export was read line by line".to_string());
    }
    if !loaded.warnings.is_empty() {
        lines.push(format!("Warnings ({}):", loaded.warnings.len()));
        lines.extend(loaded.warnings.iter().map(|w| format!("  - {}", w)));
    }
    lines
}

fn print_diagnostics(report: &ExtractionReport, loaded: &LoadedRecords) {
    for line in diagnostic_lines(report, loaded) {
        println!("{}", line);
    }
}

fn eprint_diagnostics(report: &ExtractionReport, loaded: &LoadedRecords) {
    for line in diagnostic_lines(report, loaded) {
        eprintln!("{}", line);
    }
}

//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/tutorlog/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/tutorlog/` (~/.config/tutorlog/)
//! - State/Logs: `$XDG_STATE_HOME/tutorlog/` (~/.local/state/tutorlog/)
//!
//! Input and output files are never configured here; they are passed
//! explicitly to the extractor by the caller.

use crate::error::{Error, Result};
use crate::ingest::RecoveryOptions;
use crate::metrics::SpeakerMarkers;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Speaker label the source dataset uses for the examiner agent.
pub const DEFAULT_TEACHER_MARKER: &str = "考官";

/// Speaker label the source dataset uses for the feedback agent.
pub const DEFAULT_PEER_MARKER: &str = "反馈 Agent";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Speaker labels used for role classification
    #[serde(default)]
    pub markers: MarkerConfig,

    /// How undecodable payloads are handled
    #[serde(default)]
    pub recovery: RecoveryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Reserved speaker labels
#[derive(Debug, Deserialize, Clone)]
pub struct MarkerConfig {
    /// Speaker value that always marks a teacher turn
    #[serde(default = "default_teacher_marker")]
    pub teacher: String,

    /// Speaker value that marks a peer (feedback agent) turn
    #[serde(default = "default_peer_marker")]
    pub peer: String,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            teacher: default_teacher_marker(),
            peer: default_peer_marker(),
        }
    }
}

impl MarkerConfig {
    /// Validate markers, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.teacher.is_empty() {
            return Err(Error::Config(
                "markers.teacher must not be empty".to_string(),
            ));
        }
        if self.peer.is_empty() {
            return Err(Error::Config("markers.peer must not be empty".to_string()));
        }
        if self.teacher == self.peer {
            return Err(Error::Config(format!(
                "markers.teacher and markers.peer must differ (both are {:?})",
                self.teacher
            )));
        }
        Ok(())
    }

    /// Build the classifier markers from this configuration.
    pub fn to_markers(&self) -> SpeakerMarkers {
        SpeakerMarkers::new(self.teacher.clone(), self.peer.clone())
    }
}

fn default_teacher_marker() -> String {
    DEFAULT_TEACHER_MARKER.to_string()
}

fn default_peer_marker() -> String {
    DEFAULT_PEER_MARKER.to_string()
}

/// Payload recovery configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RecoveryConfig {
    /// Retry payloads that fail strict JSON with the relaxed literal parser
    #[serde(default = "default_true")]
    pub relaxed_parser: bool,

    /// Scan undecodable payloads for known keys and report what was found
    #[serde(default = "default_true")]
    pub partial_scan: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            relaxed_parser: true,
            partial_scan: true,
        }
    }
}

impl RecoveryConfig {
    pub fn to_options(&self) -> RecoveryOptions {
        RecoveryOptions {
            relaxed_parser: self.relaxed_parser,
            partial_scan: self.partial_scan,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> Result<()> {
        self.markers.validate()
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/tutorlog/config.toml` (~/.config/tutorlog/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("tutorlog").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/tutorlog/` (~/.local/state/tutorlog/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("tutorlog")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/tutorlog/tutorlog.log` (~/.local/state/tutorlog/tutorlog.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("tutorlog.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}

use std::path::{Path, PathBuf};

use chrono::{NaiveTime, TimeDelta};
use roster_core::ledger::DEFAULT_COOLDOWN_SECS;
use roster_core::matcher::DEFAULT_ACCEPTANCE_THRESHOLD;
use roster_core::{AttendanceLedger, DayWindow, DEFAULT_DESCRIPTOR_DIM};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{key}: invalid time of day {value:?} (expected HH:MM or HH:MM:SS)")]
    InvalidTime { key: &'static str, value: String },
    #[error("{0}")]
    Invalid(String),
}

/// Daemon configuration.
///
/// Defaults, then an optional TOML file named by `ROSTER_CONFIG`, then
/// `ROSTER_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Descriptor length produced by the configured extractor model.
    pub descriptor_dim: usize,
    /// Maximum L2 distance (exclusive) for a positive match.
    pub match_threshold: f32,
    /// Minimum seconds between two recorded events for one identity.
    pub cooldown_secs: u64,
    /// Start of the local `entry` window, inclusive.
    pub day_start: String,
    /// End of the local `entry` window, exclusive.
    pub day_end: String,
    /// Extractor model that produced the enrolled descriptors (e.g. "Facenet").
    pub extractor_model: String,
    /// Serve on the system bus instead of the session bus.
    pub system_bus: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_data_dir().join("attendance.db"),
            descriptor_dim: DEFAULT_DESCRIPTOR_DIM,
            match_threshold: DEFAULT_ACCEPTANCE_THRESHOLD,
            cooldown_secs: DEFAULT_COOLDOWN_SECS as u64,
            day_start: "05:00".to_string(),
            day_end: "17:00".to_string(),
            extractor_model: "Facenet".to_string(),
            system_bus: false,
        }
    }
}

impl Config {
    /// Load from `ROSTER_CONFIG` (if set) and environment overrides, then validate.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("ROSTER_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// Override fields from `ROSTER_*` variables. Unparseable numbers keep the
    /// current value.
    pub fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("ROSTER_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        self.descriptor_dim = env_usize("ROSTER_DESCRIPTOR_DIM", self.descriptor_dim);
        self.match_threshold = env_f32("ROSTER_MATCH_THRESHOLD", self.match_threshold);
        self.cooldown_secs = env_u64("ROSTER_COOLDOWN_SECS", self.cooldown_secs);
        if let Ok(v) = std::env::var("ROSTER_DAY_START") {
            self.day_start = v;
        }
        if let Ok(v) = std::env::var("ROSTER_DAY_END") {
            self.day_end = v;
        }
        if let Ok(v) = std::env::var("ROSTER_EXTRACTOR_MODEL") {
            self.extractor_model = v;
        }
        if let Ok(v) = std::env::var("ROSTER_SYSTEM_BUS") {
            self.system_bus = v != "0";
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.descriptor_dim == 0 {
            return Err(ConfigError::Invalid("descriptor_dim must be positive".into()));
        }
        if !(self.match_threshold.is_finite() && self.match_threshold > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "match_threshold must be a positive number, got {}",
                self.match_threshold
            )));
        }
        self.cooldown()?;
        self.day_window()?;
        Ok(())
    }

    pub fn cooldown(&self) -> Result<TimeDelta, ConfigError> {
        i64::try_from(self.cooldown_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| {
                ConfigError::Invalid(format!("cooldown_secs out of range: {}", self.cooldown_secs))
            })
    }

    pub fn day_window(&self) -> Result<DayWindow, ConfigError> {
        Ok(DayWindow::new(
            parse_time("day_start", &self.day_start)?,
            parse_time("day_end", &self.day_end)?,
        ))
    }

    pub fn ledger(&self) -> Result<AttendanceLedger, ConfigError> {
        Ok(AttendanceLedger::new(self.cooldown()?, self.day_window()?))
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("roster")
}

fn parse_time(key: &'static str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| ConfigError::InvalidTime {
            key,
            value: value.to_string(),
        })
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

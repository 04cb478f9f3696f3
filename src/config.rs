//! Engine configuration: CLI flags, an optional TOML file, and the resolved settings.
//!
//! Resolution order is CLI flag, then file value, then built-in default. The
//! result is a single [`SchedulerSettings`] so the cooldown has one source of
//! truth for the whole session.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::scoring::ScoringWeights;

pub const DEFAULT_COOLDOWN_MS: u64 = 90_000;
pub const RAPID_REPLAY_COOLDOWN_MS: u64 = 15_000;
pub const MAX_COOLDOWN_MS: u64 = 24 * 60 * 60 * 1000;
pub const DEFAULT_SWEEP_MAX_AGE_MS: u64 = 24 * 60 * 60 * 1000;
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 5 * 60 * 1000;
pub const DEFAULT_AREA_RADIUS_M: f64 = 100.0;
pub const MIN_AREA_RADIUS_M: f64 = 1.0;
pub const MAX_AREA_RADIUS_M: f64 = 50_000.0;

const CONFIG_FILE: &str = "config.toml";
const CONFIG_DIR_ENV: &str = "ECHOTRAIL_CONFIG_DIR";

#[derive(Debug, Args, Clone, Default)]
pub struct AppConfig {
    /// Minimum time before the same memory may play again (ms)
    #[arg(long = "cooldown-ms", value_parser = parse_cooldown_ms)]
    pub cooldown_ms: Option<u64>,

    /// Use the short rapid-replay cooldown unless --cooldown-ms is given
    #[arg(long = "rapid-replay", default_value_t = false)]
    pub rapid_replay: bool,

    /// Forget last-played entries older than this (ms)
    #[arg(long = "sweep-max-age-ms", value_parser = parse_cooldown_ms)]
    pub sweep_max_age_ms: Option<u64>,

    /// How often the cooldown ledger is swept (ms)
    #[arg(long = "sweep-interval-ms")]
    pub sweep_interval_ms: Option<u64>,

    /// Radius used when asking the memory store for nearby memories (meters)
    #[arg(long = "area-radius-m", value_parser = parse_area_radius_m)]
    pub area_radius_m: Option<f64>,

    /// Config file path (defaults to ~/.config/echotrail/config.toml)
    #[arg(long = "config", env = "ECHOTRAIL_CONFIG")]
    pub config_path: Option<PathBuf>,

    /// Enable structured trace logging
    #[arg(long = "logs", default_value_t = false)]
    pub logs: bool,

    /// Disable all logging (overrides --logs)
    #[arg(long = "no-logs", default_value_t = false)]
    pub no_logs: bool,
}

/// Values accepted from the TOML config file. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub cooldown_ms: Option<u64>,
    pub rapid_replay: Option<bool>,
    pub sweep_max_age_ms: Option<u64>,
    pub sweep_interval_ms: Option<u64>,
    pub area_radius_m: Option<f64>,
    pub logs: Option<bool>,
    pub scoring: Option<ScoringWeights>,
}

/// Resolved runtime settings shared by the scheduler and the area driver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SchedulerSettings {
    pub cooldown_ms: u64,
    pub sweep_max_age_ms: u64,
    pub sweep_interval_ms: u64,
    pub area_radius_m: f64,
    pub weights: ScoringWeights,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            sweep_max_age_ms: DEFAULT_SWEEP_MAX_AGE_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            area_radius_m: DEFAULT_AREA_RADIUS_M,
            weights: ScoringWeights::default(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, message: String },
    Parse { path: PathBuf, message: String },
    OutOfRange(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, message } => {
                write!(f, "failed to read config {}: {message}", path.display())
            }
            Self::Parse { path, message } => {
                write!(f, "invalid config {}: {message}", path.display())
            }
            Self::OutOfRange(message) => write!(f, "config value out of range: {message}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl AppConfig {
    #[inline]
    #[must_use]
    pub fn logging_enabled(&self, file: &FileConfig) -> bool {
        (self.logs || file.logs.unwrap_or(false)) && !self.no_logs
    }

    /// Loads the config file (explicit path or default location) if present.
    ///
    /// A missing file at the default location is not an error; a missing file
    /// at an explicit `--config` path is.
    pub fn load_file(&self) -> Result<FileConfig, ConfigError> {
        match &self.config_path {
            Some(path) => load_file_config(path),
            None => match default_config_path() {
                Some(path) if path.exists() => load_file_config(&path),
                _ => Ok(FileConfig::default()),
            },
        }
    }

    /// Merges flags over file values over defaults.
    pub fn resolve(&self, file: &FileConfig) -> Result<SchedulerSettings, ConfigError> {
        let defaults = SchedulerSettings::default();
        let rapid = self.rapid_replay || file.rapid_replay.unwrap_or(false);
        let fallback_cooldown = if rapid {
            RAPID_REPLAY_COOLDOWN_MS
        } else {
            defaults.cooldown_ms
        };

        let cooldown_ms = self
            .cooldown_ms
            .or(file.cooldown_ms)
            .unwrap_or(fallback_cooldown);
        if cooldown_ms > MAX_COOLDOWN_MS {
            return Err(ConfigError::OutOfRange(format!(
                "cooldown_ms {cooldown_ms} exceeds {MAX_COOLDOWN_MS}"
            )));
        }

        let area_radius_m = self
            .area_radius_m
            .or(file.area_radius_m)
            .unwrap_or(defaults.area_radius_m);
        if !(MIN_AREA_RADIUS_M..=MAX_AREA_RADIUS_M).contains(&area_radius_m) {
            return Err(ConfigError::OutOfRange(format!(
                "area_radius_m {area_radius_m} must be between {MIN_AREA_RADIUS_M} and {MAX_AREA_RADIUS_M}"
            )));
        }

        let sweep_max_age_ms = self
            .sweep_max_age_ms
            .or(file.sweep_max_age_ms)
            .unwrap_or(defaults.sweep_max_age_ms);
        if sweep_max_age_ms < cooldown_ms {
            return Err(ConfigError::OutOfRange(format!(
                "sweep_max_age_ms {sweep_max_age_ms} is shorter than cooldown_ms {cooldown_ms}"
            )));
        }

        Ok(SchedulerSettings {
            cooldown_ms,
            sweep_max_age_ms,
            sweep_interval_ms: self
                .sweep_interval_ms
                .or(file.sweep_interval_ms)
                .unwrap_or(defaults.sweep_interval_ms),
            area_radius_m,
            weights: file.scoring.unwrap_or(defaults.weights),
        })
    }
}

/// `$ECHOTRAIL_CONFIG_DIR/config.toml`, else `<config dir>/echotrail/config.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(dir) = env::var(CONFIG_DIR_ENV) {
        let trimmed = dir.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed).join(CONFIG_FILE));
        }
    }
    dirs::config_dir().map(|dir| dir.join("echotrail").join(CONFIG_FILE))
}

pub fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    toml::from_str::<FileConfig>(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn parse_cooldown_ms(raw: &str) -> Result<u64, String> {
    let value: u64 = raw
        .parse()
        .map_err(|_| format!("invalid duration '{raw}'"))?;
    if value > MAX_COOLDOWN_MS {
        return Err(format!("duration must be at most {MAX_COOLDOWN_MS} ms"));
    }
    Ok(value)
}

fn parse_area_radius_m(raw: &str) -> Result<f64, String> {
    let value: f64 = raw
        .parse()
        .map_err(|_| format!("invalid radius '{raw}'"))?;
    if !(MIN_AREA_RADIUS_M..=MAX_AREA_RADIUS_M).contains(&value) {
        return Err(format!(
            "radius must be between {MIN_AREA_RADIUS_M} and {MAX_AREA_RADIUS_M} meters"
        ));
    }
    Ok(value)
}

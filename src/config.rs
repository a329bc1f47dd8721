// src/config.rs
use comfy_table::Color;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;
use strum::IntoEnumIterator;
use strum_macros::EnumIter;
use thiserror::Error;

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_CONFIG_DIR: &str = "liftlog";
const CONFIG_ENV_VAR: &str = "LIFTLOG_CONFIG_DIR"; // Environment variable name

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine configuration directory.")]
    CannotDetermineConfigDir,
    #[error("I/O error accessing config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file (TOML): {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize config data (TOML): {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Invalid color name: {0}")]
    InvalidColor(String),
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric, // kg, km
    Imperial, // lbs, miles
}

/// Which value decides whether a new set beats the stored personal record.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PrMetric {
    /// Estimated one-rep max, ties broken by raw weight.
    #[default]
    #[serde(rename = "estimated-1rm")]
    Estimated1rm,
    /// Raw weight, ties broken by reps.
    Weight,
}

// Define standard colors using strum for easy iteration/parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum StandardColor {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    DarkGrey,
    Grey,
}

impl From<StandardColor> for Color {
    fn from(value: StandardColor) -> Self {
        match value {
            StandardColor::Black => Self::Black,
            StandardColor::Red => Self::Red,
            StandardColor::Green => Self::Green,
            StandardColor::Yellow => Self::Yellow,
            StandardColor::Blue => Self::Blue,
            StandardColor::Magenta => Self::Magenta,
            StandardColor::Cyan => Self::Cyan,
            StandardColor::White => Self::White,
            StandardColor::DarkGrey => Self::DarkGrey,
            StandardColor::Grey => Self::Grey,
        }
    }
}

/// Parses a case-insensitive color name into a `StandardColor`.
/// # Errors
/// Returns `ConfigError::InvalidColor` for unknown names.
pub fn parse_color(color_str: &str) -> Result<StandardColor, ConfigError> {
    StandardColor::iter()
        .find(|color| format!("{color:?}").eq_ignore_ascii_case(color_str.trim()))
        .ok_or_else(|| ConfigError::InvalidColor(color_str.to_string()))
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Theme {
    pub header_color: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            header_color: "Green".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)] // Ensure defaults are used if fields are missing
pub struct Config {
    pub units: Units,
    pub autosave_delay_ms: u64,
    pub autosave_max_wait_ms: u64,
    pub draft_max_age_hours: u64,
    pub history_max_entries: usize,
    pub pr_metric: PrMetric,
    pub streak_interval_days: u32,
    pub weight_increment: f64,
    pub theme: Theme,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            units: Units::default(),
            autosave_delay_ms: 2_000,
            autosave_max_wait_ms: 10_000,
            draft_max_age_hours: 12,
            history_max_entries: 200,
            pr_metric: PrMetric::default(),
            streak_interval_days: 1,
            weight_increment: 2.5,
            theme: Theme::default(),
        }
    }
}

impl Config {
    pub const fn autosave_delay(&self) -> StdDuration {
        StdDuration::from_millis(self.autosave_delay_ms)
    }

    pub const fn autosave_max_wait(&self) -> StdDuration {
        StdDuration::from_millis(self.autosave_max_wait_ms)
    }

    pub fn draft_max_age(&self) -> chrono::Duration {
        let hours = i64::try_from(self.draft_max_age_hours).unwrap_or(i64::MAX);
        chrono::Duration::try_hours(hours).unwrap_or(chrono::Duration::MAX)
    }

    /// Checks the values that would make the session or history logic misbehave.
    /// # Errors
    /// Returns `ConfigError::InvalidValue` naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_max_entries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "history_max_entries",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.autosave_max_wait_ms < self.autosave_delay_ms {
            return Err(ConfigError::InvalidValue {
                field: "autosave_max_wait_ms",
                reason: format!(
                    "must not be shorter than autosave_delay_ms ({})",
                    self.autosave_delay_ms
                ),
            });
        }
        if self.streak_interval_days == 0 {
            return Err(ConfigError::InvalidValue {
                field: "streak_interval_days",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.weight_increment.is_finite() && self.weight_increment > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "weight_increment",
                reason: "must be a positive number".to_string(),
            });
        }
        Ok(())
    }
}

/// Determines the path to the configuration file, creating its directory.
/// # Errors
/// Returns `ConfigError` if no config directory exists or it cannot be created.
pub fn get_config_path() -> Result<PathBuf, ConfigError> {
    let config_dir_path = if let Ok(path_str) = std::env::var(CONFIG_ENV_VAR) {
        PathBuf::from(path_str)
    } else {
        let base_config_dir = dirs::config_dir().ok_or(ConfigError::CannotDetermineConfigDir)?;
        base_config_dir.join(APP_CONFIG_DIR)
    };

    if !config_dir_path.exists() {
        tracing::debug!(dir = %config_dir_path.display(), "creating config directory");
        fs::create_dir_all(&config_dir_path)?;
    }

    Ok(config_dir_path.join(CONFIG_FILE_NAME))
}

/// Loads the configuration from the TOML file at the given path,
/// writing a default file first if none exists.
/// # Errors
/// Returns `ConfigError` on I/O, parse or validation failures.
pub fn load(config_path: &Path) -> Result<Config, ConfigError> {
    if config_path.exists() {
        let config_content = fs::read_to_string(config_path)?;
        let config: Config = toml::from_str(&config_content)?;
        config.validate()?;
        Ok(config)
    } else {
        let default_config = Config::default();
        save(config_path, &default_config)?;
        Ok(default_config)
    }
}

/// Saves the configuration to the TOML file.
/// # Errors
/// Returns `ConfigError` on serialization or I/O failures.
pub fn save(config_path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent_dir) = config_path.parent() {
        if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
            fs::create_dir_all(parent_dir)?;
        }
    }
    let config_content = toml::to_string_pretty(config)?;
    fs::write(config_path, config_content)?;
    Ok(())
}

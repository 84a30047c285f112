//! Monitor configuration file.
//!
//! The file is YAML and lists one entry per monitored stop or route:
//!
//! ```yaml
//! bind: 127.0.0.1:3000
//! locale: he
//! entries:
//!   - id: home
//!     target:
//!       transport: bus
//!       station_id: "24068"
//!       lines: "249, 40"
//!   - id: commute
//!     update_interval: 60
//!     target:
//!       transport: train
//!       from_station: "3600"
//!       to_station: "2300"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::busnearby::string_or_number;
use crate::domain::{LineSet, Transport};
use crate::schedule::ScheduleConfig;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "SILENT_BUS_CONFIG";

/// Config file used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "silent-bus.yaml";

/// Largest number of arrivals an entry may request per line.
const MAX_ARRIVALS_LIMIT: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Address the HTTP adapter listens on (default: 127.0.0.1:3000)
    #[serde(default = "Config::default_bind")]
    pub bind: String,
    /// Locale passed to station search (default: he)
    #[serde(default = "Config::default_locale")]
    pub locale: String,
    #[serde(default)]
    pub entries: Vec<EntryConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: Self::default_bind(),
            locale: Self::default_locale(),
            entries: Vec::new(),
        }
    }
}

impl Config {
    fn default_bind() -> String {
        "127.0.0.1:3000".to_string()
    }
    fn default_locale() -> String {
        "he".to_string()
    }

    /// Read, parse and validate a config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_yaml(&content)
    }

    /// Parse and validate YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Check every entry and that entry ids are unique.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.id.as_str()) {
                return Err(ConfigError::DuplicateEntry(entry.id.clone()));
            }
            entry.validate()?;
        }
        Ok(())
    }

    pub fn entry(&self, id: &str) -> Option<&EntryConfig> {
        self.entries.iter().find(|e| e.id == id)
    }
}

/// One monitored stop or route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryConfig {
    /// Unique name used in URLs and logs
    pub id: String,
    /// Base refresh period in seconds, 15..=600 (default: 30)
    #[serde(default = "EntryConfig::default_update_interval")]
    pub update_interval: u64,
    /// Arrivals (or itineraries) fetched per cycle, 1..=10 (default: 3)
    #[serde(default = "EntryConfig::default_max_arrivals")]
    pub max_arrivals: u32,
    pub target: TargetConfig,
}

impl EntryConfig {
    fn default_update_interval() -> u64 {
        30
    }
    fn default_max_arrivals() -> u32 {
        3
    }

    /// A bus stop entry with default cadence.
    pub fn bus(id: impl Into<String>, station_id: &str, lines: &str) -> Self {
        Self {
            id: id.into(),
            update_interval: Self::default_update_interval(),
            max_arrivals: Self::default_max_arrivals(),
            target: TargetConfig::Bus(StopConfig {
                station_id: station_id.to_string(),
                station_name: None,
                lines: lines.to_string(),
            }),
        }
    }

    /// A train route entry with default cadence.
    pub fn route(id: impl Into<String>, from_station: &str, to_station: &str) -> Self {
        Self {
            id: id.into(),
            update_interval: Self::default_update_interval(),
            max_arrivals: Self::default_max_arrivals(),
            target: TargetConfig::Train(RouteConfig {
                from_station: from_station.to_string(),
                to_station: to_station.to_string(),
                from_station_name: None,
                to_station_name: None,
            }),
        }
    }

    /// The base refresh period.
    pub fn update_period(&self) -> Duration {
        Duration::from_secs(self.update_interval)
    }

    pub fn transport(&self) -> Transport {
        self.target.transport()
    }

    /// Check bounds and that stop entries name at least one line.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !ScheduleConfig::default().period_in_bounds(self.update_interval) {
            return Err(ConfigError::IntervalOutOfRange {
                id: self.id.clone(),
                secs: self.update_interval,
            });
        }

        if !(1..=MAX_ARRIVALS_LIMIT).contains(&self.max_arrivals) {
            return Err(ConfigError::MaxArrivalsOutOfRange {
                id: self.id.clone(),
                value: self.max_arrivals,
            });
        }

        if let Some(stop) = self.target.as_stop() {
            LineSet::parse(&stop.lines).map_err(|_| ConfigError::NoLines(self.id.clone()))?;
        }

        Ok(())
    }
}

/// What an entry monitors, tagged by transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum TargetConfig {
    Bus(StopConfig),
    LightRail(StopConfig),
    Train(RouteConfig),
}

impl TargetConfig {
    pub fn transport(&self) -> Transport {
        match self {
            TargetConfig::Bus(_) => Transport::Bus,
            TargetConfig::LightRail(_) => Transport::LightRail,
            TargetConfig::Train(_) => Transport::Train,
        }
    }

    pub fn as_stop(&self) -> Option<&StopConfig> {
        match self {
            TargetConfig::Bus(stop) | TargetConfig::LightRail(stop) => Some(stop),
            TargetConfig::Train(_) => None,
        }
    }

    fn as_stop_mut(&mut self) -> Option<&mut StopConfig> {
        match self {
            TargetConfig::Bus(stop) | TargetConfig::LightRail(stop) => Some(stop),
            TargetConfig::Train(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopConfig {
    #[serde(deserialize_with = "string_or_number")]
    pub station_id: String,
    /// Display name; resolved from station search when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_name: Option<String>,
    /// Comma-separated line numbers, e.g. "249, 40"
    #[serde(deserialize_with = "string_or_number")]
    pub lines: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    #[serde(deserialize_with = "string_or_number")]
    pub from_station: String,
    #[serde(deserialize_with = "string_or_number")]
    pub to_station: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_station_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_station_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {reason}")]
    ReadError { path: String, reason: String },
    #[error("failed to parse config: {0}")]
    ParseError(String),
    #[error("failed to write config file {path}: {reason}")]
    WriteError { path: String, reason: String },
    #[error("duplicate entry id '{0}'")]
    DuplicateEntry(String),
    #[error("unknown entry '{0}'")]
    UnknownEntry(String),
    #[error("entry '{id}': update interval {secs}s is outside 15..=600")]
    IntervalOutOfRange { id: String, secs: u64 },
    #[error("entry '{id}': max arrivals {value} is outside 1..=10")]
    MaxArrivalsOutOfRange { id: String, value: u32 },
    #[error("entry '{0}': at least one line is required")]
    NoLines(String),
    #[error("entry '{0}' monitors a route and has no lines")]
    NotAStopEntry(String),
}

/// The live configuration plus where to persist it.
///
/// Changes are written to disk before they replace the in-memory copy, so
/// a failed write leaves both unchanged.
#[derive(Debug)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    config: Mutex<Config>,
}

impl ConfigStore {
    /// Load the file at `path` and persist future changes back to it.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = Config::load(&path)?;
        Ok(Self {
            path: Some(path),
            config: Mutex::new(config),
        })
    }

    /// A store that keeps changes in memory only.
    pub fn in_memory(config: Config) -> Self {
        Self {
            path: None,
            config: Mutex::new(config),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// A copy of the current configuration.
    pub fn current(&self) -> Config {
        self.config.lock().clone()
    }

    pub fn entry(&self, id: &str) -> Option<EntryConfig> {
        self.config.lock().entry(id).cloned()
    }

    /// Replace the line filters of a stop entry and persist.
    ///
    /// Returns the updated entry. Blocks on the file write when the store is
    /// backed by a file.
    pub fn update_lines(&self, id: &str, lines: &LineSet) -> Result<EntryConfig, ConfigError> {
        let mut config = self.config.lock();

        let mut updated = config.clone();
        let entry = updated
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| ConfigError::UnknownEntry(id.to_string()))?;
        let stop = entry
            .target
            .as_stop_mut()
            .ok_or_else(|| ConfigError::NotAStopEntry(id.to_string()))?;
        stop.lines = lines.to_string();
        let entry = entry.clone();

        updated.validate()?;
        self.persist(&updated)?;
        *config = updated;

        info!(entry = id, lines = %lines, "Saved line filters");
        Ok(entry)
    }

    fn persist(&self, config: &Config) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let write_error = |e: std::io::Error| ConfigError::WriteError {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        let yaml = config.to_yaml()?;
        let tmp = path.with_extension("yaml.tmp");
        std::fs::write(&tmp, yaml).map_err(write_error)?;
        std::fs::rename(&tmp, path).map_err(write_error)
    }
}

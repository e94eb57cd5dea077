//! TOML-based application configuration.
//!
//! Holds the process-wide gauge rules (bounds, steps, timezone) and the
//! storage backend selection. Stored at `<data dir>/config.toml`; a default
//! file is written on first load.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::calendar::ZonedCalendar;
use crate::error::ConfigError;

/// Bounds, steps and timezone applied to every gauge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GaugeSettings {
    #[serde(default = "default_max_value")]
    pub max_value: i64,
    #[serde(default)]
    pub min_value: i64,
    #[serde(default = "default_increase_step")]
    pub increase_step: i64,
    #[serde(default = "default_decrease_step")]
    pub decrease_step: i64,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

/// Which backend persists gauges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Json,
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Overrides the default file location inside the data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data dir>/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub gauge: GaugeSettings,
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_max_value() -> i64 {
    10
}
fn default_increase_step() -> i64 {
    1
}
fn default_decrease_step() -> i64 {
    2
}
fn default_timezone() -> String {
    "Europe/Berlin".into()
}

impl Default for GaugeSettings {
    fn default() -> Self {
        Self {
            max_value: default_max_value(),
            min_value: 0,
            increase_step: default_increase_step(),
            decrease_step: default_decrease_step(),
            timezone: default_timezone(),
        }
    }
}

impl GaugeSettings {
    /// Check bounds, steps and timezone.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidBounds`] when `min_value > max_value`,
    /// [`ConfigError::InvalidValue`] for negative steps and
    /// [`ConfigError::UnknownTimezone`] for an unresolvable zone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_value > self.max_value {
            return Err(ConfigError::InvalidBounds {
                min: self.min_value,
                max: self.max_value,
            });
        }
        for (key, step) in [
            ("gauge.increase_step", self.increase_step),
            ("gauge.decrease_step", self.decrease_step),
        ] {
            if step < 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.into(),
                    message: format!("step must not be negative, got {step}"),
                });
            }
        }
        ZonedCalendar::new(&self.timezone)?;
        Ok(())
    }

    /// Clamp `value` into `[min_value, max_value]`.
    ///
    /// Assumes validated settings.
    pub fn clamp(&self, value: i64) -> i64 {
        value.max(self.min_value).min(self.max_value)
    }

    /// Value given to a newly created gauge.
    pub fn initial_value(&self) -> i64 {
        self.clamp(0)
    }
}

impl StorageConfig {
    /// Resolve the store file path, defaulting into `data_dir`.
    pub fn resolve_path(&self, data_dir: &Path) -> PathBuf {
        match &self.path {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => data_dir.join(p),
            None => data_dir.join(match self.backend {
                StorageBackend::Sqlite => "daygauge.db",
                StorageBackend::Json => "gauges.json",
            }),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let (parent, leaf) = match key.rsplit_once('.') {
            Some((parent, leaf)) => (Some(parent), leaf),
            None => (None, key),
        };
        if leaf.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        if let Some(parent) = parent {
            for part in parent.split('.') {
                current = current.get_mut(part).ok_or_else(unknown)?;
            }
        }

        let obj = current.as_object_mut().ok_or_else(unknown)?;
        let new_value = match obj.get(leaf) {
            Some(serde_json::Value::Number(_)) => value
                .parse::<i64>()
                .map(|n| serde_json::Value::Number(n.into()))
                .map_err(|_| invalid(format!("cannot parse '{value}' as integer")))?,
            Some(serde_json::Value::Bool(_)) => value
                .parse::<bool>()
                .map(serde_json::Value::Bool)
                .map_err(|_| invalid(format!("cannot parse '{value}' as bool")))?,
            Some(_) => serde_json::Value::String(value.into()),
            // Optional keys are skipped when unset; only `storage.path` is optional.
            None if key == "storage.path" => serde_json::Value::String(value.into()),
            None => return Err(unknown()),
        };

        obj.insert(leaf.to_string(), new_value);
        Ok(())
    }

    /// Default config file location.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location or create it with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults there if the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "creating default configuration file");
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    /// Persist to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Check every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gauge.validate()
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key. The result must still validate.
    ///
    /// Does not save; call [`Config::save_to`] afterwards.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }
}

mod config;
pub mod database;
pub mod file;
pub mod migrations;

pub use config::{Config, GaugeSettings, StorageBackend, StorageConfig};
pub use database::SqliteGaugeStore;
pub use file::JsonFileStore;

use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{ConfigError, Result};
use crate::gauge::{Gauge, GaugeId};
use crate::timestamp::Timestamp;

/// Durable keyed collection of gauges.
///
/// Every call reads from durable storage; implementations must not cache
/// gauge state between calls. Each method is atomic: on error the stored
/// state is unchanged.
pub trait GaugeStore: Send + Sync {
    /// Create a gauge together with its first value record.
    ///
    /// # Errors
    /// [`GaugeError::Conflict`](crate::GaugeError::Conflict) if the name exists.
    fn create(&self, name: &str, initial_value: i64) -> Result<GaugeId>;

    /// Current state of one gauge.
    fn get(&self, name: &str) -> Result<Gauge>;

    /// Current state of every gauge, in creation order.
    fn list(&self) -> Result<Vec<Gauge>>;

    /// Record a new current value. History is never rewritten.
    fn append_value(&self, name: &str, value: i64, last_increase: Option<&Timestamp>)
        -> Result<()>;

    /// Read-modify-write of one gauge as a single atomic step.
    ///
    /// `apply` sees the current state and returns the state to record, or
    /// `None` to leave the gauge as it is. Returns the state after the step.
    fn update(
        &self,
        name: &str,
        apply: &mut dyn FnMut(&Gauge) -> Option<Gauge>,
    ) -> Result<Gauge>;

    /// Like [`GaugeStore::update`], at most once per gauge and `day`.
    ///
    /// Marks the gauge as decayed on `day` in the same atomic step. Returns
    /// `Ok(None)` without calling `apply` if the mark is already set, unless
    /// `force` is true.
    fn decay_once(
        &self,
        name: &str,
        day: NaiveDate,
        force: bool,
        apply: &mut dyn FnMut(&Gauge) -> Option<Gauge>,
    ) -> Result<Option<Gauge>>;

    /// Delete a gauge and all of its history.
    fn remove(&self, name: &str) -> Result<()>;

    /// Calendar day the decay cycle last ran, if ever.
    fn last_cycle_day(&self) -> Result<Option<NaiveDate>>;

    fn set_last_cycle_day(&self, day: NaiveDate) -> Result<()>;
}

/// Returns the data directory.
///
/// `DAYGAUGE_DATA_DIR` wins when set; otherwise `~/.config/daygauge[-dev]/`
/// depending on `DAYGAUGE_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("DAYGAUGE_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("DAYGAUGE_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("daygauge-dev")
            } else {
                base_dir.join("daygauge")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
    Ok(dir)
}

/// Open the store selected by `config`, relative to the data directory.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn GaugeStore>> {
    let path = config.resolve_path(&data_dir()?);
    let store: Arc<dyn GaugeStore> = match config.backend {
        StorageBackend::Sqlite => Arc::new(SqliteGaugeStore::open_at(&path)?),
        StorageBackend::Json => Arc::new(JsonFileStore::open(path)),
    };
    Ok(store)
}

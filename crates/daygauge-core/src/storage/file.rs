//! Flat-file gauge storage.
//!
//! A single JSON document holds every gauge in creation order:
//!
//! ```json
//! {"gauges":[{"id":1,"name":"reading","value":3,"last_increase":"2024-05-02T21:10:00+02:00"}]}
//! ```
//!
//! There is no history; each write replaces the document through a temp file
//! and a rename, so a crash leaves either the old or the new document.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::GaugeStore;
use crate::error::{GaugeError, Result, StorageError};
use crate::gauge::{Gauge, GaugeId};
use crate::timestamp::{self, Timestamp};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GaugeRecord {
    /// Absent in documents written before ids were tracked.
    #[serde(default)]
    id: i64,
    name: String,
    value: i64,
    #[serde(with = "timestamp::optional", default)]
    last_increase: Option<Timestamp>,
    /// Day of the last decay applied by the cycle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_decay: Option<NaiveDate>,
}

impl GaugeRecord {
    fn set(&mut self, gauge: &Gauge) {
        self.value = gauge.value;
        self.last_increase = gauge.last_increase;
    }
}

impl From<&GaugeRecord> for Gauge {
    fn from(record: &GaugeRecord) -> Self {
        Gauge {
            name: record.name.clone(),
            value: record.value,
            last_increase: record.last_increase,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GaugeDocument {
    #[serde(default)]
    gauges: Vec<GaugeRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_cycle: Option<NaiveDate>,
}

impl GaugeDocument {
    fn find_mut(&mut self, name: &str) -> Result<&mut GaugeRecord> {
        self.gauges
            .iter_mut()
            .find(|g| g.name == name)
            .ok_or_else(|| GaugeError::not_found(name))
    }
}

/// JSON document store.
///
/// Load-modify-save runs under a mutex, so writers in one process never lose
/// each other's updates.
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Use the document at `path`. A missing file reads as an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<GaugeDocument> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(GaugeDocument::default())
            }
            Err(e) => return Err(StorageError::Io(e).into()),
        };
        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(GaugeDocument::default());
        }
        let doc = serde_json::from_slice(&content).map_err(|source| StorageError::Document {
            path: self.path.clone(),
            source,
        })?;
        Ok(doc)
    }

    fn save(&self, doc: &GaugeDocument) -> Result<()> {
        let content = serde_json::to_vec_pretty(doc).map_err(|source| StorageError::Document {
            path: self.path.clone(),
            source,
        })?;

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let write = || -> std::io::Result<()> {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(&content)?;
            file.sync_all()?;
            std::fs::rename(&tmp_path, &self.path)
        };
        if let Err(e) = write() {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(StorageError::Io(e).into());
        }
        Ok(())
    }

    /// Load, apply `f`, and save only if `f` succeeds.
    fn modify<T>(&self, f: impl FnOnce(&mut GaugeDocument) -> Result<T>) -> Result<T> {
        let _guard = self.write_lock.lock()?;
        let mut doc = self.load()?;
        let out = f(&mut doc)?;
        self.save(&doc)?;
        Ok(out)
    }
}

impl GaugeStore for JsonFileStore {
    fn create(&self, name: &str, initial_value: i64) -> Result<GaugeId> {
        self.modify(|doc| {
            if doc.gauges.iter().any(|g| g.name == name) {
                return Err(GaugeError::conflict(name));
            }
            let id = doc.gauges.iter().map(|g| g.id).max().unwrap_or(0) + 1;
            doc.gauges.push(GaugeRecord {
                id,
                name: name.to_string(),
                value: initial_value,
                last_increase: None,
                last_decay: None,
            });
            Ok(GaugeId(id))
        })
    }

    fn get(&self, name: &str) -> Result<Gauge> {
        let doc = self.load()?;
        doc.gauges
            .iter()
            .find(|g| g.name == name)
            .map(Gauge::from)
            .ok_or_else(|| GaugeError::not_found(name))
    }

    fn list(&self) -> Result<Vec<Gauge>> {
        Ok(self.load()?.gauges.iter().map(Gauge::from).collect())
    }

    fn append_value(
        &self,
        name: &str,
        value: i64,
        last_increase: Option<&Timestamp>,
    ) -> Result<()> {
        self.modify(|doc| {
            let record = doc.find_mut(name)?;
            record.value = value;
            record.last_increase = last_increase.copied();
            Ok(())
        })
    }

    fn update(
        &self,
        name: &str,
        apply: &mut dyn FnMut(&Gauge) -> Option<Gauge>,
    ) -> Result<Gauge> {
        self.modify(|doc| {
            let record = doc.find_mut(name)?;
            let current = Gauge::from(&*record);
            Ok(match apply(&current) {
                Some(next) => {
                    record.set(&next);
                    next
                }
                None => current,
            })
        })
    }

    fn decay_once(
        &self,
        name: &str,
        day: NaiveDate,
        force: bool,
        apply: &mut dyn FnMut(&Gauge) -> Option<Gauge>,
    ) -> Result<Option<Gauge>> {
        let _guard = self.write_lock.lock()?;
        let mut doc = self.load()?;
        let record = doc.find_mut(name)?;
        if !force && record.last_decay == Some(day) {
            return Ok(None);
        }
        let current = Gauge::from(&*record);
        let after = match apply(&current) {
            Some(next) => {
                record.set(&next);
                next
            }
            None => current,
        };
        record.last_decay = Some(day);
        self.save(&doc)?;
        Ok(Some(after))
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.modify(|doc| {
            let before = doc.gauges.len();
            doc.gauges.retain(|g| g.name != name);
            if doc.gauges.len() == before {
                return Err(GaugeError::not_found(name));
            }
            Ok(())
        })
    }

    fn last_cycle_day(&self) -> Result<Option<NaiveDate>> {
        Ok(self.load()?.last_cycle)
    }

    fn set_last_cycle_day(&self, day: NaiveDate) -> Result<()> {
        self.modify(|doc| {
            doc.last_cycle = Some(day);
            Ok(())
        })
    }
}

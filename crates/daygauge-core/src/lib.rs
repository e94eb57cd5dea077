//! # daygauge Core Library
//!
//! Named, bounded counters ("gauges") that can be raised at most once per
//! calendar day and decay by a fixed step once per day.
//!
//! ## Architecture
//!
//! - **Calendar**: calendar-day arithmetic in the configured timezone
//! - **Storage**: SQLite (append-only history) or a JSON document, behind the
//!   [`GaugeStore`] trait; TOML-based configuration
//! - **Engine**: pure increment/decay rules over gauge snapshots
//! - **Cycle**: the daily decay pass over every gauge
//!
//! ## Key Components
//!
//! - [`GaugeService`]: entry point for add/remove/increment/cycle
//! - [`GaugeEngine`]: mutation rules
//! - [`SqliteGaugeStore`], [`JsonFileStore`]: persistence
//! - [`Config`]: application configuration management

pub mod calendar;
pub mod cycle;
pub mod engine;
pub mod error;
pub mod gauge;
pub mod service;
pub mod storage;
pub mod timestamp;

pub use calendar::{Calendar, ZonedCalendar};
pub use cycle::{CycleFailure, CycleReport, CycleRunner};
pub use engine::{DecayOutcome, GaugeEngine, IncrementOutcome};
pub use error::{ConfigError, GaugeError, StorageError};
pub use gauge::{Gauge, GaugeId, GaugeName};
pub use service::{GaugeService, Increment};
pub use storage::{
    Config, GaugeSettings, GaugeStore, JsonFileStore, SqliteGaugeStore, StorageBackend,
    StorageConfig,
};
pub use timestamp::Timestamp;

//! Gauge operations as the request layer sees them.
//!
//! [`GaugeService`] ties a [`GaugeStore`], the [`GaugeEngine`] rules and a
//! [`Calendar`] together. Each read-modify-write on a gauge is handed to the
//! store as one atomic step, so concurrent callers in this process or in
//! others sharing the same database never interleave on one gauge.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::calendar::{Calendar, ZonedCalendar};
use crate::cycle::{CycleReport, CycleRunner};
use crate::engine::{GaugeEngine, IncrementOutcome};
use crate::error::Result;
use crate::gauge::{Gauge, GaugeName};
use crate::storage::{GaugeSettings, GaugeStore};
use crate::timestamp::Timestamp;

/// An increment attempt and the gauge state after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Increment {
    pub gauge: Gauge,
    pub outcome: IncrementOutcome,
}

pub struct GaugeService {
    store: Arc<dyn GaugeStore>,
    settings: GaugeSettings,
    calendar: Arc<dyn Calendar>,
}

impl GaugeService {
    /// Build a service whose calendar follows `settings.timezone`.
    ///
    /// # Errors
    /// Returns a configuration error for invalid bounds, steps or timezone.
    pub fn new(store: Arc<dyn GaugeStore>, settings: GaugeSettings) -> Result<Self> {
        let calendar = Arc::new(ZonedCalendar::new(&settings.timezone)?);
        Self::with_calendar(store, settings, calendar)
    }

    /// Build a service with an injected calendar.
    pub fn with_calendar(
        store: Arc<dyn GaugeStore>,
        settings: GaugeSettings,
        calendar: Arc<dyn Calendar>,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            store,
            settings,
            calendar,
        })
    }

    pub fn settings(&self) -> &GaugeSettings {
        &self.settings
    }

    pub fn store(&self) -> &dyn GaugeStore {
        self.store.as_ref()
    }

    /// Current instant in the configured timezone.
    pub fn now(&self) -> Timestamp {
        self.calendar.now()
    }

    fn engine(&self) -> Result<GaugeEngine<'_>> {
        Ok(GaugeEngine::new(&self.settings, self.calendar.as_ref())?)
    }

    /// Create a gauge at the initial value (0 clamped into the bounds).
    pub fn add(&self, name: &str) -> Result<Gauge> {
        let name = GaugeName::parse(name)?;
        let initial = self.settings.initial_value();
        let id = self.store.create(name.as_str(), initial)?;
        info!(gauge = %name, %id, value = initial, "gauge added");
        Ok(Gauge::new(name.as_str(), initial))
    }

    pub fn get(&self, name: &str) -> Result<Gauge> {
        self.store.get(name)
    }

    pub fn list(&self) -> Result<Vec<Gauge>> {
        self.store.list()
    }

    /// Delete a gauge and its history.
    pub fn remove(&self, name: &str) -> Result<()> {
        let name = GaugeName::parse(name)?;
        self.store.remove(name.as_str())?;
        info!(gauge = %name, "gauge removed");
        Ok(())
    }

    /// Increment `name` at `now`, at most once per calendar day.
    ///
    /// The check and the write happen in one store step, so two concurrent
    /// calls on the same day yield exactly one [`IncrementOutcome::Applied`].
    pub fn increment(&self, name: &str, now: Timestamp) -> Result<Increment> {
        let name = GaugeName::parse(name)?;
        let engine = self.engine()?;

        let mut outcome = IncrementOutcome::AlreadyIncrementedToday;
        let mut before = 0;
        let gauge = self.store.update(name.as_str(), &mut |current| {
            let (next, result) = engine.increment(current, now);
            before = current.value;
            outcome = result;
            (result == IncrementOutcome::Applied).then_some(next)
        })?;

        match outcome {
            IncrementOutcome::Applied => {
                info!(gauge = %name, from = before, to = gauge.value, "gauge incremented");
            }
            IncrementOutcome::AlreadyIncrementedToday => {
                debug!(gauge = %name, value = gauge.value, "already incremented today");
            }
        }
        Ok(Increment { gauge, outcome })
    }

    /// Decay every gauge once for the calendar day of `now`.
    ///
    /// A second run on the same day does nothing unless `force` is set.
    pub fn run_cycle(&self, now: Timestamp, force: bool) -> Result<CycleReport> {
        let engine = self.engine()?;
        CycleRunner::new(self.store.as_ref(), &engine, self.calendar.as_ref()).run(now, force)
    }
}

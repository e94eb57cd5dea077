//! Gauge mutation rules.
//!
//! Pure: takes a snapshot, returns a new snapshot. Persisting the result is
//! the caller's job.

use serde::{Deserialize, Serialize};

use crate::calendar::Calendar;
use crate::error::ConfigError;
use crate::gauge::Gauge;
use crate::storage::GaugeSettings;
use crate::timestamp::Timestamp;

/// Result of an increment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncrementOutcome {
    Applied,
    /// Refused; the gauge already moved up on this calendar day.
    AlreadyIncrementedToday,
}

/// Result of a decay attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayOutcome {
    Decayed,
    SkippedIncrementedToday,
}

/// Applies increment and decay to gauge snapshots.
pub struct GaugeEngine<'a> {
    settings: &'a GaugeSettings,
    calendar: &'a dyn Calendar,
}

impl<'a> GaugeEngine<'a> {
    /// # Errors
    /// Rejects settings that fail [`GaugeSettings::validate`].
    pub fn new(
        settings: &'a GaugeSettings,
        calendar: &'a dyn Calendar,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self { settings, calendar })
    }

    pub fn settings(&self) -> &GaugeSettings {
        self.settings
    }

    /// Blocks a second increment on the same calendar day.
    pub fn already_incremented_today(&self, gauge: &Gauge, now: &Timestamp) -> bool {
        gauge
            .last_increase
            .as_ref()
            .is_some_and(|last| self.calendar.is_same_calendar_day(last, now))
    }

    /// Spares a gauge from decay on the day it gained value.
    pub fn gained_value_today(&self, gauge: &Gauge, now: &Timestamp) -> bool {
        gauge
            .last_increase
            .as_ref()
            .is_some_and(|last| self.calendar.is_same_calendar_day(last, now))
    }

    /// Raise the gauge by one step unless it was already raised today.
    ///
    /// `last_increase` moves to `now` even when the value is pinned at max.
    pub fn increment(&self, gauge: &Gauge, now: Timestamp) -> (Gauge, IncrementOutcome) {
        if self.already_incremented_today(gauge, &now) {
            return (gauge.clone(), IncrementOutcome::AlreadyIncrementedToday);
        }
        let next = Gauge {
            name: gauge.name.clone(),
            value: self
                .settings
                .clamp(gauge.value.saturating_add(self.settings.increase_step)),
            last_increase: Some(now),
        };
        (next, IncrementOutcome::Applied)
    }

    /// Lower the gauge by one step unless it gained value today.
    pub fn decay(&self, gauge: &Gauge, now: Timestamp) -> (Gauge, DecayOutcome) {
        if self.gained_value_today(gauge, &now) {
            return (gauge.clone(), DecayOutcome::SkippedIncrementedToday);
        }
        let next = Gauge {
            value: self
                .settings
                .clamp(gauge.value.saturating_sub(self.settings.decrease_step)),
            ..gauge.clone()
        };
        (next, DecayOutcome::Decayed)
    }
}

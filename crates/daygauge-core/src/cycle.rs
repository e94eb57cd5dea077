//! The daily decay cycle.
//!
//! Best-effort across gauges: one gauge failing to persist is recorded in the
//! report and the rest are still decayed. Each gauge carries the day it was
//! last decayed, written in the same store step as the decay itself, so a run
//! interrupted halfway can be repeated without decaying any gauge twice. The
//! run's day is recorded once every gauge went through, and a second run on
//! that day is a no-op.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::calendar::Calendar;
use crate::engine::{DecayOutcome, GaugeEngine};
use crate::error::{GaugeError, Result};
use crate::storage::GaugeStore;
use crate::timestamp::Timestamp;

/// A gauge the cycle could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleFailure {
    pub name: String,
    pub error: String,
}

/// Aggregate result of one cycle run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub day: NaiveDate,
    /// The cycle had already run on `day`; nothing was touched.
    pub already_ran: bool,
    /// Gauges processed without error, including skipped ones.
    pub succeeded: usize,
    pub failed: usize,
    /// Gauges spared because they were incremented on `day`.
    pub skipped: usize,
    /// Gauges an earlier, unfinished run had already decayed on `day`.
    pub already_decayed: usize,
    pub failures: Vec<CycleFailure>,
}

impl CycleReport {
    fn empty(day: NaiveDate) -> Self {
        Self {
            day,
            already_ran: false,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            already_decayed: 0,
            failures: Vec::new(),
        }
    }
}

enum GaugeStep {
    Decayed { from: i64, to: i64 },
    Unchanged,
    Skipped,
    AlreadyDecayed,
    Vanished,
}

/// Applies decay to every stored gauge.
pub struct CycleRunner<'a> {
    store: &'a dyn GaugeStore,
    engine: &'a GaugeEngine<'a>,
    calendar: &'a dyn Calendar,
}

impl<'a> CycleRunner<'a> {
    pub fn new(
        store: &'a dyn GaugeStore,
        engine: &'a GaugeEngine<'a>,
        calendar: &'a dyn Calendar,
    ) -> Self {
        Self {
            store,
            engine,
            calendar,
        }
    }

    /// Run the cycle for the calendar day of `now`.
    ///
    /// `force` ignores both the run's day and the per-gauge decay marks.
    ///
    /// # Errors
    /// Only failures to list gauges or to read/write the cycle-day marker
    /// abort the run; per-gauge failures end up in the report.
    pub fn run(&self, now: Timestamp, force: bool) -> Result<CycleReport> {
        let day = self.calendar.day_of(&now);
        let mut report = CycleReport::empty(day);

        if !force && self.store.last_cycle_day()? == Some(day) {
            info!(%day, "decay cycle already ran today");
            report.already_ran = true;
            return Ok(report);
        }

        let gauges = self.store.list()?;
        for gauge in &gauges {
            match self.decay_one(&gauge.name, day, now, force) {
                Ok(GaugeStep::Decayed { from, to }) => {
                    debug!(gauge = %gauge.name, from, to, "gauge decayed");
                    report.succeeded += 1;
                }
                Ok(GaugeStep::Unchanged) => report.succeeded += 1,
                Ok(GaugeStep::Skipped) => {
                    debug!(gauge = %gauge.name, "incremented today, decay skipped");
                    report.succeeded += 1;
                    report.skipped += 1;
                }
                Ok(GaugeStep::AlreadyDecayed) => {
                    debug!(gauge = %gauge.name, "already decayed today");
                    report.already_decayed += 1;
                }
                // Removed after the listing.
                Ok(GaugeStep::Vanished) => {}
                Err(e) => {
                    warn!(gauge = %gauge.name, error = %e, "decay failed");
                    report.failed += 1;
                    report.failures.push(CycleFailure {
                        name: gauge.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        // Failed gauges stay eligible for a rerun today.
        if report.failed == 0 {
            self.store.set_last_cycle_day(day)?;
        }
        info!(
            %day,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            already_decayed = report.already_decayed,
            "decay cycle finished"
        );
        Ok(report)
    }

    fn decay_one(
        &self,
        name: &str,
        day: NaiveDate,
        now: Timestamp,
        force: bool,
    ) -> Result<GaugeStep> {
        let mut step = GaugeStep::Unchanged;
        let result = self.store.decay_once(name, day, force, &mut |current| {
            let (next, outcome) = self.engine.decay(current, now);
            if outcome == DecayOutcome::SkippedIncrementedToday {
                step = GaugeStep::Skipped;
                return None;
            }
            if next.value == current.value {
                step = GaugeStep::Unchanged;
                return None;
            }
            step = GaugeStep::Decayed {
                from: current.value,
                to: next.value,
            };
            Some(next)
        });
        match result {
            Ok(Some(_)) => Ok(step),
            Ok(None) => Ok(GaugeStep::AlreadyDecayed),
            Err(GaugeError::NotFound { .. }) => Ok(GaugeStep::Vanished),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::ZonedCalendar;
    use crate::error::StorageError;
    use crate::gauge::{Gauge, GaugeId};
    use crate::storage::{GaugeSettings, SqliteGaugeStore};
    use chrono::DateTime;
    use std::panic::{self, AssertUnwindSafe};

    fn ts(raw: &str) -> Timestamp {
        DateTime::parse_from_rfc3339(raw).unwrap()
    }

    fn run(store: &dyn GaugeStore, now: &str, force: bool) -> CycleReport {
        let settings = GaugeSettings::default();
        let cal = ZonedCalendar::new(&settings.timezone).unwrap();
        let engine = GaugeEngine::new(&settings, &cal).unwrap();
        CycleRunner::new(store, &engine, &cal)
            .run(ts(now), force)
            .unwrap()
    }

    /// Wraps a real store; writes to one gauge fail, or abort the process
    /// (a panic) when `crash` is set.
    struct FaultyStore<'a> {
        inner: &'a SqliteGaugeStore,
        broken: &'static str,
        crash: bool,
    }

    impl FaultyStore<'_> {
        fn fault(&self, name: &str) -> Result<()> {
            if name != self.broken {
                return Ok(());
            }
            if self.crash {
                panic!("process killed while decaying {name}");
            }
            Err(StorageError::QueryFailed("disk I/O error".into()).into())
        }
    }

    impl GaugeStore for FaultyStore<'_> {
        fn create(&self, name: &str, initial_value: i64) -> Result<GaugeId> {
            self.inner.create(name, initial_value)
        }
        fn get(&self, name: &str) -> Result<Gauge> {
            self.inner.get(name)
        }
        fn list(&self) -> Result<Vec<Gauge>> {
            self.inner.list()
        }
        fn append_value(&self, name: &str, value: i64, last: Option<&Timestamp>) -> Result<()> {
            self.fault(name)?;
            self.inner.append_value(name, value, last)
        }
        fn update(
            &self,
            name: &str,
            apply: &mut dyn FnMut(&Gauge) -> Option<Gauge>,
        ) -> Result<Gauge> {
            self.fault(name)?;
            self.inner.update(name, apply)
        }
        fn decay_once(
            &self,
            name: &str,
            day: NaiveDate,
            force: bool,
            apply: &mut dyn FnMut(&Gauge) -> Option<Gauge>,
        ) -> Result<Option<Gauge>> {
            self.fault(name)?;
            self.inner.decay_once(name, day, force, apply)
        }
        fn remove(&self, name: &str) -> Result<()> {
            self.inner.remove(name)
        }
        fn last_cycle_day(&self) -> Result<Option<NaiveDate>> {
            self.inner.last_cycle_day()
        }
        fn set_last_cycle_day(&self, day: NaiveDate) -> Result<()> {
            self.inner.set_last_cycle_day(day)
        }
    }

    #[test]
    fn one_failing_gauge_does_not_block_the_rest() {
        let inner = SqliteGaugeStore::open_memory().unwrap();
        let store = FaultyStore {
            inner: &inner,
            broken: "water",
            crash: false,
        };
        for name in ["reading", "water", "sport"] {
            store.create(name, 5).unwrap();
        }

        let report = run(&store, "2024-06-11T03:00:00+02:00", false);

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].name, "water");
        assert_eq!(store.get("reading").unwrap().value, 3);
        assert_eq!(store.get("water").unwrap().value, 5);
        assert_eq!(store.get("sport").unwrap().value, 3);
    }

    /// After a partial failure the day stays open; the retry only touches
    /// the gauge that failed.
    #[test]
    fn retry_after_failure_decays_only_the_failed_gauge() {
        let inner = SqliteGaugeStore::open_memory().unwrap();
        let store = FaultyStore {
            inner: &inner,
            broken: "water",
            crash: false,
        };
        for name in ["reading", "water"] {
            store.create(name, 5).unwrap();
        }
        run(&store, "2024-06-11T03:00:00+02:00", false);
        assert_eq!(inner.last_cycle_day().unwrap(), None);

        let retry = run(&inner, "2024-06-11T04:00:00+02:00", false);
        assert!(!retry.already_ran);
        assert_eq!(retry.succeeded, 1);
        assert_eq!(retry.already_decayed, 1);
        assert_eq!(inner.get("reading").unwrap().value, 3);
        assert_eq!(inner.get("water").unwrap().value, 3);
        assert_eq!(
            inner.last_cycle_day().unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 11)
        );
    }

    /// A run that dies halfway leaves finished gauges marked, so the next run
    /// picks up only the rest.
    #[test]
    fn rerun_after_abort_does_not_decay_twice() {
        let inner = SqliteGaugeStore::open_memory().unwrap();
        for name in ["reading", "water", "sport"] {
            inner.create(name, 8).unwrap();
        }
        let crashing = FaultyStore {
            inner: &inner,
            broken: "water",
            crash: true,
        };

        let aborted = panic::catch_unwind(AssertUnwindSafe(|| {
            run(&crashing, "2024-06-11T03:00:00+02:00", false)
        }));
        assert!(aborted.is_err());
        assert_eq!(inner.get("reading").unwrap().value, 6);
        assert_eq!(inner.get("water").unwrap().value, 8);
        assert_eq!(inner.last_cycle_day().unwrap(), None);

        let rerun = run(&inner, "2024-06-11T03:05:00+02:00", false);
        assert_eq!(rerun.already_decayed, 1);
        assert_eq!(rerun.succeeded, 2);
        assert_eq!(inner.get("reading").unwrap().value, 6);
        assert_eq!(inner.get("water").unwrap().value, 6);
        assert_eq!(inner.get("sport").unwrap().value, 6);
    }

    #[test]
    fn gauge_at_min_is_not_rewritten() {
        let store = SqliteGaugeStore::open_memory().unwrap();
        store.create("reading", 0).unwrap();

        let report = run(&store, "2024-06-11T03:00:00+02:00", false);
        assert_eq!(report.succeeded, 1);
        assert_eq!(store.history_len("reading").unwrap(), 1);
    }

    #[test]
    fn second_run_same_day_is_a_no_op_unless_forced() {
        let store = SqliteGaugeStore::open_memory().unwrap();
        store.create("reading", 9).unwrap();

        let first = run(&store, "2024-06-11T03:00:00+02:00", false);
        assert!(!first.already_ran);
        assert_eq!(store.get("reading").unwrap().value, 7);

        let second = run(&store, "2024-06-11T21:00:00+02:00", false);
        assert!(second.already_ran);
        assert_eq!(second.succeeded, 0);
        assert_eq!(store.get("reading").unwrap().value, 7);

        run(&store, "2024-06-11T22:00:00+02:00", true);
        assert_eq!(store.get("reading").unwrap().value, 5);
    }
}

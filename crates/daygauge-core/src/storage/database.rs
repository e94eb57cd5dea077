//! SQLite-based gauge storage.
//!
//! Layout:
//! - `gauges`: identity rows, `name` unique, plus the day of the last decay
//! - `data`: append-only history of `(value, timestamp)` per gauge; the
//!   current value is the row with the greatest `id`
//! - `kv`: key-value store for runner state (last cycle day)

use chrono::NaiveDate;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use super::{migrations, GaugeStore};
use crate::error::{GaugeError, Result, StorageError};
use crate::gauge::{Gauge, GaugeId};
use crate::timestamp::{self, Timestamp};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const LAST_CYCLE_KEY: &str = "last_cycle_day";

/// Current row per gauge: the history row with the greatest surrogate id.
const CURRENT_ROWS: &str = "SELECT g.name, d.value, d.timestamp, g.id, g.last_decay
     FROM gauges g
     JOIN data d ON d.id = (SELECT MAX(id) FROM data WHERE gauge_id = g.id)";

fn row_to_gauge(row: &rusqlite::Row) -> Result<Gauge> {
    let name: String = row.get(0)?;
    let value: i64 = row.get(1)?;
    let raw_ts: String = row.get(2)?;
    let last_increase =
        timestamp::parse_optional(&raw_ts).map_err(|e| StorageError::Corrupt {
            name: name.clone(),
            message: format!("bad timestamp '{raw_ts}': {e}"),
        })?;
    Ok(Gauge {
        name,
        value,
        last_increase,
    })
}

fn parse_day(key: &str, raw: Option<String>) -> Result<Option<NaiveDate>> {
    raw.map(|s| {
        s.parse::<NaiveDate>().map_err(|e| {
            GaugeError::from(StorageError::Corrupt {
                name: key.into(),
                message: format!("bad date '{s}': {e}"),
            })
        })
    })
    .transpose()
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

/// Current state of one gauge as seen inside a transaction.
struct CurrentRow {
    id: i64,
    gauge: Gauge,
    last_decay: Option<NaiveDate>,
}

/// SQLite database for gauge storage.
///
/// The single connection sits behind a mutex. Every read-modify-write runs
/// inside one `IMMEDIATE` transaction, which takes SQLite's write lock before
/// the read, so a second handle or process waits instead of interleaving.
pub struct SqliteGaugeStore {
    conn: Mutex<Connection>,
}

impl SqliteGaugeStore {
    /// Open (creating if needed) the database file at `path` and migrate it.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| StorageError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::init(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::migrate(&conn)
            .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn gauge_id(conn: &Connection, name: &str) -> Result<Option<i64>> {
        Ok(conn
            .query_row("SELECT id FROM gauges WHERE name = ?1", params![name], |row| {
                row.get(0)
            })
            .optional()?)
    }

    fn current_row(conn: &Connection, name: &str) -> Result<CurrentRow> {
        let mut stmt = conn.prepare(&format!("{CURRENT_ROWS} WHERE g.name = ?1"))?;
        let mut rows = stmt.query(params![name])?;
        let current = match rows.next()? {
            Some(row) => CurrentRow {
                gauge: row_to_gauge(row)?,
                id: row.get(3)?,
                last_decay: parse_day(name, row.get(4)?)?,
            },
            None => return Err(GaugeError::not_found(name)),
        };
        Ok(current)
    }

    fn insert_value(
        conn: &Connection,
        gauge_id: i64,
        value: i64,
        last_increase: Option<&Timestamp>,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO data (value, timestamp, gauge_id) VALUES (?1, ?2, ?3)",
            params![value, timestamp::format_optional(last_increase), gauge_id],
        )?;
        Ok(())
    }

    /// Number of history rows recorded for `name`.
    pub fn history_len(&self, name: &str) -> Result<usize> {
        let conn = self.conn.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM data d JOIN gauges g ON g.id = d.gauge_id WHERE g.name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

impl GaugeStore for SqliteGaugeStore {
    fn create(&self, name: &str, initial_value: i64) -> Result<GaugeId> {
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        match tx.execute("INSERT INTO gauges (name) VALUES (?1)", params![name]) {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Err(GaugeError::conflict(name)),
            Err(e) => return Err(e.into()),
        }
        let id = tx.last_insert_rowid();
        Self::insert_value(&tx, id, initial_value, None)?;

        tx.commit()?;
        Ok(GaugeId(id))
    }

    fn get(&self, name: &str) -> Result<Gauge> {
        let conn = self.conn.lock()?;
        Ok(Self::current_row(&conn, name)?.gauge)
    }

    fn list(&self) -> Result<Vec<Gauge>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(&format!("{CURRENT_ROWS} ORDER BY g.id"))?;
        let mut rows = stmt.query([])?;
        let mut gauges = Vec::new();
        while let Some(row) = rows.next()? {
            gauges.push(row_to_gauge(row)?);
        }
        Ok(gauges)
    }

    fn append_value(
        &self,
        name: &str,
        value: i64,
        last_increase: Option<&Timestamp>,
    ) -> Result<()> {
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let id = Self::gauge_id(&tx, name)?.ok_or_else(|| GaugeError::not_found(name))?;
        Self::insert_value(&tx, id, value, last_increase)?;

        tx.commit()?;
        Ok(())
    }

    fn update(
        &self,
        name: &str,
        apply: &mut dyn FnMut(&Gauge) -> Option<Gauge>,
    ) -> Result<Gauge> {
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = Self::current_row(&tx, name)?;
        let after = match apply(&current.gauge) {
            Some(next) => {
                Self::insert_value(&tx, current.id, next.value, next.last_increase.as_ref())?;
                next
            }
            None => current.gauge,
        };

        tx.commit()?;
        Ok(after)
    }

    fn decay_once(
        &self,
        name: &str,
        day: NaiveDate,
        force: bool,
        apply: &mut dyn FnMut(&Gauge) -> Option<Gauge>,
    ) -> Result<Option<Gauge>> {
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = Self::current_row(&tx, name)?;
        if !force && current.last_decay == Some(day) {
            return Ok(None);
        }
        let after = match apply(&current.gauge) {
            Some(next) => {
                Self::insert_value(&tx, current.id, next.value, next.last_increase.as_ref())?;
                next
            }
            None => current.gauge,
        };
        tx.execute(
            "UPDATE gauges SET last_decay = ?1 WHERE id = ?2",
            params![day.to_string(), current.id],
        )?;

        tx.commit()?;
        Ok(Some(after))
    }

    fn remove(&self, name: &str) -> Result<()> {
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let id = Self::gauge_id(&tx, name)?.ok_or_else(|| GaugeError::not_found(name))?;
        // History first; older databases lack the cascading foreign key.
        tx.execute("DELETE FROM data WHERE gauge_id = ?1", params![id])?;
        tx.execute("DELETE FROM gauges WHERE id = ?1", params![id])?;

        tx.commit()?;
        Ok(())
    }

    fn last_cycle_day(&self) -> Result<Option<NaiveDate>> {
        let conn = self.conn.lock()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![LAST_CYCLE_KEY],
                |row| row.get(0),
            )
            .optional()?;
        parse_day(LAST_CYCLE_KEY, raw)
    }

    fn set_last_cycle_day(&self, day: NaiveDate) -> Result<()> {
        let conn = self.conn.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![LAST_CYCLE_KEY, day.to_string()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn ts(raw: &str) -> Timestamp {
        DateTime::parse_from_rfc3339(raw).unwrap()
    }

    #[test]
    fn create_then_get() {
        let store = SqliteGaugeStore::open_memory().unwrap();
        let id = store.create("reading", 0).unwrap();
        assert_eq!(id, GaugeId(1));

        let gauge = store.get("reading").unwrap();
        assert_eq!(gauge, Gauge::new("reading", 0));
        assert_eq!(store.history_len("reading").unwrap(), 1);
    }

    #[test]
    fn duplicate_create_conflicts_without_extra_rows() {
        let store = SqliteGaugeStore::open_memory().unwrap();
        store.create("reading", 0).unwrap();
        let err = store.create("reading", 0).unwrap_err();
        assert!(matches!(err, GaugeError::Conflict { ref name } if name == "reading"));
        assert_eq!(store.list().unwrap().len(), 1);
        assert_eq!(store.history_len("reading").unwrap(), 1);
    }

    #[test]
    fn get_missing_is_not_found() {
        let store = SqliteGaugeStore::open_memory().unwrap();
        assert!(matches!(store.get("ghost"), Err(GaugeError::NotFound { .. })));
    }

    #[test]
    fn append_then_get_round_trips() {
        let store = SqliteGaugeStore::open_memory().unwrap();
        store.create("water", 0).unwrap();
        let at = ts("2024-05-02T21:10:00.250+02:00");
        store.append_value("water", 4, Some(&at)).unwrap();

        let gauge = store.get("water").unwrap();
        assert_eq!(gauge.value, 4);
        assert_eq!(gauge.last_increase, Some(at));
        assert_eq!(store.list().unwrap(), vec![gauge]);
        assert_eq!(store.history_len("water").unwrap(), 2);
    }

    #[test]
    fn append_to_missing_gauge_is_not_found() {
        let store = SqliteGaugeStore::open_memory().unwrap();
        let err = store.append_value("ghost", 1, None).unwrap_err();
        assert!(matches!(err, GaugeError::NotFound { .. }));
    }

    /// The newest row wins even when its timestamp is older.
    #[test]
    fn latest_row_wins_over_later_timestamp() {
        let store = SqliteGaugeStore::open_memory().unwrap();
        store.create("sport", 0).unwrap();
        store
            .append_value("sport", 5, Some(&ts("2024-06-10T10:00:00Z")))
            .unwrap();
        store
            .append_value("sport", 2, Some(&ts("2024-06-09T10:00:00Z")))
            .unwrap();

        let gauge = store.get("sport").unwrap();
        assert_eq!(gauge.value, 2);
        assert_eq!(gauge.last_increase, Some(ts("2024-06-09T10:00:00Z")));
    }

    #[test]
    fn list_has_one_entry_per_gauge_in_creation_order() {
        let store = SqliteGaugeStore::open_memory().unwrap();
        store.create("b", 0).unwrap();
        store.create("a", 0).unwrap();
        store.append_value("b", 1, None).unwrap();
        store.append_value("b", 2, None).unwrap();

        let names: Vec<_> = store.list().unwrap().into_iter().map(|g| g.name).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn remove_deletes_identity_and_history() {
        let store = SqliteGaugeStore::open_memory().unwrap();
        store.create("reading", 0).unwrap();
        store.append_value("reading", 1, None).unwrap();
        store.remove("reading").unwrap();

        assert!(matches!(store.get("reading"), Err(GaugeError::NotFound { .. })));
        let conn = store.conn.lock().unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM data", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[test]
    fn remove_missing_is_not_found_and_changes_nothing() {
        let store = SqliteGaugeStore::open_memory().unwrap();
        store.create("reading", 0).unwrap();
        assert!(matches!(store.remove("ghost"), Err(GaugeError::NotFound { .. })));
        assert_eq!(store.list().unwrap().len(), 1);
        assert_eq!(store.history_len("reading").unwrap(), 1);
    }

    #[test]
    fn recreated_gauge_starts_fresh() {
        let store = SqliteGaugeStore::open_memory().unwrap();
        store.create("reading", 0).unwrap();
        store.append_value("reading", 7, None).unwrap();
        store.remove("reading").unwrap();
        store.create("reading", 0).unwrap();
        assert_eq!(store.get("reading").unwrap().value, 0);
        assert_eq!(store.history_len("reading").unwrap(), 1);
    }

    #[test]
    fn cycle_day_is_stored() {
        let store = SqliteGaugeStore::open_memory().unwrap();
        assert_eq!(store.last_cycle_day().unwrap(), None);
        let day = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        store.set_last_cycle_day(day).unwrap();
        assert_eq!(store.last_cycle_day().unwrap(), Some(day));
    }

    #[test]
    fn reopening_a_file_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daygauge.db");
        {
            let store = SqliteGaugeStore::open_at(&path).unwrap();
            store.create("reading", 0).unwrap();
            store.append_value("reading", 3, None).unwrap();
        }
        let store = SqliteGaugeStore::open_at(&path).unwrap();
        assert_eq!(store.get("reading").unwrap().value, 3);
    }

    #[test]
    fn update_writes_only_when_asked() {
        let store = SqliteGaugeStore::open_memory().unwrap();
        store.create("reading", 0).unwrap();

        let kept = store.update("reading", &mut |_| None).unwrap();
        assert_eq!(kept, Gauge::new("reading", 0));
        assert_eq!(store.history_len("reading").unwrap(), 1);

        let at = ts("2024-06-10T09:00:00+02:00");
        let raised = store
            .update("reading", &mut |g| {
                Some(Gauge {
                    value: g.value + 1,
                    last_increase: Some(at),
                    ..g.clone()
                })
            })
            .unwrap();
        assert_eq!(raised.value, 1);
        assert_eq!(store.get("reading").unwrap(), raised);
        assert_eq!(store.history_len("reading").unwrap(), 2);
    }

    #[test]
    fn update_missing_gauge_is_not_found() {
        let store = SqliteGaugeStore::open_memory().unwrap();
        let mut called = false;
        let err = store
            .update("ghost", &mut |_| {
                called = true;
                None
            })
            .unwrap_err();
        assert!(matches!(err, GaugeError::NotFound { .. }));
        assert!(!called);
    }

    #[test]
    fn decay_once_marks_the_day() {
        let store = SqliteGaugeStore::open_memory().unwrap();
        store.create("sport", 8).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 6, 11).unwrap();
        let mut minus_two = |g: &Gauge| Some(Gauge::new(&g.name, g.value - 2));

        let first = store.decay_once("sport", day, false, &mut minus_two).unwrap();
        assert_eq!(first.map(|g| g.value), Some(6));
        assert_eq!(store.decay_once("sport", day, false, &mut minus_two).unwrap(), None);
        assert_eq!(store.get("sport").unwrap().value, 6);

        let forced = store.decay_once("sport", day, true, &mut minus_two).unwrap();
        assert_eq!(forced.map(|g| g.value), Some(4));

        let next_day = day.succ_opt().unwrap();
        let next = store.decay_once("sport", next_day, false, &mut minus_two).unwrap();
        assert_eq!(next.map(|g| g.value), Some(2));
    }

    /// The mark is set even when nothing is written.
    #[test]
    fn decay_once_marks_unchanged_gauges() {
        let store = SqliteGaugeStore::open_memory().unwrap();
        store.create("reading", 0).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 6, 11).unwrap();

        let kept = store.decay_once("reading", day, false, &mut |_| None).unwrap();
        assert_eq!(kept, Some(Gauge::new("reading", 0)));
        assert_eq!(store.history_len("reading").unwrap(), 1);

        let mut called = false;
        let again = store
            .decay_once("reading", day, false, &mut |_| {
                called = true;
                None
            })
            .unwrap();
        assert_eq!(again, None);
        assert!(!called);
    }

    /// A second handle on the same file sees the first handle's decay mark.
    #[test]
    fn decay_mark_is_shared_between_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daygauge.db");
        let first = SqliteGaugeStore::open_at(&path).unwrap();
        let second = SqliteGaugeStore::open_at(&path).unwrap();
        first.create("sport", 8).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 6, 11).unwrap();
        let mut minus_two = |g: &Gauge| Some(Gauge::new(&g.name, g.value - 2));

        assert!(first.decay_once("sport", day, false, &mut minus_two).unwrap().is_some());
        assert!(second.decay_once("sport", day, false, &mut minus_two).unwrap().is_none());
        assert_eq!(second.get("sport").unwrap().value, 6);
    }
}

//! Calendar-day arithmetic in a configured timezone.
//!
//! The engine never compares dates itself; it asks a [`Calendar`]. The stock
//! implementation, [`ZonedCalendar`], resolves IANA names (`Europe/Berlin`),
//! `UTC`, and fixed offsets (`+02:00`).

use chrono::{FixedOffset, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;

use crate::error::ConfigError;
use crate::timestamp::Timestamp;

/// Clock and calendar used by the engine.
pub trait Calendar: Send + Sync {
    /// Calendar date of `instant` in this calendar's timezone.
    fn day_of(&self, instant: &Timestamp) -> NaiveDate;

    /// Current instant, expressed in this calendar's timezone.
    fn now(&self) -> Timestamp;

    fn is_same_calendar_day(&self, a: &Timestamp, b: &Timestamp) -> bool {
        self.day_of(a) == self.day_of(b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Zone {
    Named(Tz),
    Fixed(FixedOffset),
}

/// A [`Calendar`] bound to one timezone.
#[derive(Debug, Clone)]
pub struct ZonedCalendar {
    zone: Zone,
    id: String,
}

impl ZonedCalendar {
    /// Resolve `timezone_id`.
    ///
    /// # Errors
    /// Returns [`ConfigError::UnknownTimezone`] if the identifier is neither an
    /// IANA zone, `UTC`/`Z`, nor a `±HH:MM` offset.
    pub fn new(timezone_id: &str) -> Result<Self, ConfigError> {
        let trimmed = timezone_id.trim();
        let zone = if trimmed.eq_ignore_ascii_case("utc") || trimmed == "Z" {
            Zone::Named(Tz::UTC)
        } else if let Some(offset) = parse_fixed_offset(trimmed) {
            Zone::Fixed(offset)
        } else {
            trimmed
                .parse::<Tz>()
                .map(Zone::Named)
                .map_err(|_| ConfigError::UnknownTimezone(timezone_id.to_string()))?
        };
        Ok(Self {
            zone,
            id: trimmed.to_string(),
        })
    }

    /// The identifier this calendar was built from.
    pub fn timezone_id(&self) -> &str {
        &self.id
    }
}

impl Calendar for ZonedCalendar {
    fn day_of(&self, instant: &Timestamp) -> NaiveDate {
        match self.zone {
            Zone::Named(tz) => instant.with_timezone(&tz).date_naive(),
            Zone::Fixed(offset) => instant.with_timezone(&offset).date_naive(),
        }
    }

    fn now(&self) -> Timestamp {
        let now = Utc::now();
        let now = now.with_nanosecond(0).unwrap_or(now);
        match self.zone {
            Zone::Named(tz) => now.with_timezone(&tz).fixed_offset(),
            Zone::Fixed(offset) => now.with_timezone(&offset),
        }
    }
}

/// One-shot comparison without keeping a calendar around.
///
/// # Errors
/// Fails loudly on an unknown timezone instead of answering `false`.
pub fn is_same_calendar_day(
    a: &Timestamp,
    b: &Timestamp,
    timezone_id: &str,
) -> Result<bool, ConfigError> {
    Ok(ZonedCalendar::new(timezone_id)?.is_same_calendar_day(a, b))
}

/// Parse `+HH:MM`, `-HH:MM`, `+HHMM` or `+HH`.
fn parse_fixed_offset(s: &str) -> Option<FixedOffset> {
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

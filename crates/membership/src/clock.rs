//! Calendar arithmetic on epoch-millisecond instants
//!
//! All instants are UTC milliseconds since the Unix epoch. Month arithmetic
//! is calendar-aware: adding one month to Jan 31 lands on the last day of
//! February rather than spilling into March.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::{Date, Month, OffsetDateTime};

use crate::error::{MembershipError, MembershipResult};

/// Milliseconds in one day
pub const DAY_MS: i64 = 86_400_000;

/// Default warning window before expiry
pub const WARN_WINDOW_MS: i64 = 3 * DAY_MS;

/// Source of "now" for the engine entry points
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        to_epoch_ms(OffsetDateTime::now_utc())
    }
}

/// Clock pinned to a single instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.0
    }
}

pub fn from_epoch_ms(ms: i64) -> MembershipResult<OffsetDateTime> {
    Ok(OffsetDateTime::from_unix_timestamp_nanos(
        i128::from(ms) * 1_000_000,
    )?)
}

pub fn to_epoch_ms(dt: OffsetDateTime) -> i64 {
    // Representable OffsetDateTime values always fit in i64 milliseconds
    (dt.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Add `months` calendar months, clamping the day to the target month's length
pub fn add_months(ms: i64, months: u32) -> MembershipResult<i64> {
    let dt = from_epoch_ms(ms)?;
    let target = YearMonth::from_datetime(dt).advance(months);
    let day = dt.day().min(target.days_in_month()?);
    let date = Date::from_calendar_date(target.year, target.calendar_month()?, day)?;
    Ok(to_epoch_ms(dt.replace_date(date)))
}

pub fn add_days(ms: i64, days: u32) -> MembershipResult<i64> {
    i64::from(days)
        .checked_mul(DAY_MS)
        .and_then(|offset| ms.checked_add(offset))
        .ok_or_else(|| MembershipError::InvalidArgument(format!("{} days overflows", days)))
}

/// A calendar month, ordered by `(year, month)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    /// 1-12
    pub month: u8,
}

impl YearMonth {
    pub fn new(year: i32, month: u8) -> MembershipResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(MembershipError::InvalidArgument(format!(
                "month must be between 1 and 12, got {}",
                month
            )));
        }
        Ok(Self { year, month })
    }

    pub fn from_datetime(dt: OffsetDateTime) -> Self {
        Self {
            year: dt.year(),
            month: u8::from(dt.month()),
        }
    }

    pub fn from_epoch_ms(ms: i64) -> MembershipResult<Self> {
        Ok(Self::from_datetime(from_epoch_ms(ms)?))
    }

    /// The month `n` months later, rolling the year over after December
    pub fn advance(self, n: u32) -> Self {
        let index = i64::from(self.year) * 12 + i64::from(self.month) - 1 + i64::from(n);
        Self {
            year: index.div_euclid(12) as i32,
            month: (index.rem_euclid(12) + 1) as u8,
        }
    }

    pub fn next(self) -> Self {
        self.advance(1)
    }

    pub fn calendar_month(self) -> MembershipResult<Month> {
        Ok(Month::try_from(self.month)?)
    }

    pub fn days_in_month(self) -> MembershipResult<u8> {
        Ok(time::util::days_in_year_month(
            self.year,
            self.calendar_month()?,
        ))
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = MembershipError;

    /// Parses `YYYY-MM`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MembershipError::InvalidArgument(format!("expected YYYY-MM, got '{}'", s));
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u8 = month.parse().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

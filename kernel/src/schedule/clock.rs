// Clock & Local Calendar
//
// Wall-clock access behind a trait, and the pure arithmetic that maps an
// instant to the reset boundaries of the scheduling timezone.

use chrono::{DateTime, Datelike, Duration, FixedOffset, Timelike, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Hours covered by one timed-record block.
pub const BLOCK_HOURS: u32 = 4;

/// Calendar fields of an instant in the scheduling timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalCalendar {
    /// Days since Sunday.
    pub weekday: u32,
    pub hour: u32,
    /// Most recent local midnight.
    pub midnight: DateTime<Utc>,
    /// Start of the current four-hour block.
    pub block_start: DateTime<Utc>,
}

impl LocalCalendar {
    /// Zero-based four-hour block of the day.
    pub fn block(&self) -> u32 {
        self.hour / BLOCK_HOURS
    }
}

pub fn local_calendar(now: DateTime<Utc>, offset: FixedOffset) -> LocalCalendar {
    let local = now.with_timezone(&offset);
    let hour = local.hour();

    let into_day = Duration::seconds(i64::from(local.num_seconds_from_midnight()))
        + Duration::nanoseconds(i64::from(local.nanosecond() % 1_000_000_000));
    let midnight = now - into_day;
    let block_start = midnight + Duration::hours(i64::from(hour - hour % BLOCK_HOURS));

    LocalCalendar {
        weekday: local.weekday().num_days_from_sunday(),
        hour,
        midnight,
        block_start,
    }
}

// 13.0 session.rs: when entries are allowed and when positions are forced out.
// us equities: weekdays 09:30-16:00 America/New_York, holidays excluded, 13:00 on half days.
// all checks take an explicit timestamp. the loop owns the clock.

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike, Weekday};
use chrono_tz::America::New_York;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

use crate::config::{CalendarKind, SessionParams};
use crate::types::Timestamp;

/// Source of "now" for the control loop. tests drive a manual clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

// settable clock for simulations and tests
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: AtomicI64::new(start.as_millis()),
        }
    }

    pub fn set(&self, ts: Timestamp) {
        self.millis.store(ts.as_millis(), Ordering::SeqCst);
    }

    pub fn advance_millis(&self, ms: i64) {
        self.millis.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

/// Where a timestamp falls relative to the trading day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Weekend, holiday, pre-market or after-hours.
    Closed,
    OpeningBlackout,
    Regular,
    /// Last minutes before the close. entries suppressed, eod exits forced.
    ClosingBlackout,
}

// 8.1: session rules derived from config
#[derive(Debug, Clone)]
pub struct MarketSession {
    calendar: CalendarKind,
    opening_blackout_minutes: u32,
    closing_blackout_minutes: u32,
    close_at_eod: bool,
}

const OPEN_MINUTE: u32 = 9 * 60 + 30;
const CLOSE_MINUTE: u32 = 16 * 60;
const EARLY_CLOSE_MINUTE: u32 = 13 * 60;

impl MarketSession {
    pub fn new(params: &SessionParams) -> Self {
        Self {
            calendar: params.calendar,
            opening_blackout_minutes: params.opening_blackout_minutes,
            closing_blackout_minutes: params.closing_blackout_minutes,
            close_at_eod: params.close_at_eod,
        }
    }

    pub fn always_on() -> Self {
        Self {
            calendar: CalendarKind::AlwaysOn,
            opening_blackout_minutes: 0,
            closing_blackout_minutes: 0,
            close_at_eod: false,
        }
    }

    pub fn phase(&self, ts: Timestamp) -> SessionPhase {
        match self.calendar {
            CalendarKind::AlwaysOn => SessionPhase::Regular,
            CalendarKind::UsEquities => self.us_equities_phase(ts),
        }
    }

    fn us_equities_phase(&self, ts: Timestamp) -> SessionPhase {
        let local = ts.to_datetime().with_timezone(&New_York);
        let Some(close) = close_minute(local.date_naive()) else {
            return SessionPhase::Closed;
        };

        let minute = minute_of_day(local.time());
        if minute < OPEN_MINUTE || minute >= close {
            return SessionPhase::Closed;
        }
        if minute < OPEN_MINUTE + self.opening_blackout_minutes {
            return SessionPhase::OpeningBlackout;
        }
        if minute >= close.saturating_sub(self.closing_blackout_minutes) {
            return SessionPhase::ClosingBlackout;
        }
        SessionPhase::Regular
    }

    /// Inside the regular session and outside both blackouts.
    pub fn entries_allowed(&self, ts: Timestamp) -> bool {
        self.phase(ts) == SessionPhase::Regular
    }

    /// Every open position must be exited now.
    ///
    /// Runs from the start of the closing blackout until the end of the local
    /// trading day, so a zero minute blackout still flattens at the bell and a
    /// position carried past the close is exited on the next tick.
    pub fn is_eod_close_window(&self, ts: Timestamp) -> bool {
        if !self.close_at_eod || self.calendar == CalendarKind::AlwaysOn {
            return false;
        }
        let local = ts.to_datetime().with_timezone(&New_York);
        match close_minute(local.date_naive()) {
            Some(close) => minute_of_day(local.time()) >= close.saturating_sub(self.closing_blackout_minutes),
            None => false,
        }
    }

    /// Trading day the timestamp belongs to. daily counters roll when this changes.
    pub fn session_day(&self, ts: Timestamp) -> NaiveDate {
        match self.calendar {
            CalendarKind::AlwaysOn => ts.to_datetime().date_naive(),
            CalendarKind::UsEquities => ts.to_datetime().with_timezone(&New_York).date_naive(),
        }
    }
}

fn minute_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

// closing minute of a us equities trading day, None when the market stays shut
fn close_minute(date: NaiveDate) -> Option<u32> {
    if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) || is_us_holiday(date) {
        return None;
    }
    if is_us_early_close(date) {
        Some(EARLY_CLOSE_MINUTE)
    } else {
        Some(CLOSE_MINUTE)
    }
}

fn ymd(date: NaiveDate) -> (i32, u32, u32) {
    (date.year(), date.month(), date.day())
}

// observed nyse holidays, 2025 through 2027. extend yearly.
fn is_us_holiday(date: NaiveDate) -> bool {
    const HOLIDAYS: &[(i32, u32, u32)] = &[
        (2025, 1, 1),
        (2025, 1, 20),
        (2025, 2, 17),
        (2025, 4, 18),
        (2025, 5, 26),
        (2025, 6, 19),
        (2025, 7, 4),
        (2025, 9, 1),
        (2025, 11, 27),
        (2025, 12, 25),
        (2026, 1, 1),
        (2026, 1, 19),
        (2026, 2, 16),
        (2026, 4, 3),
        (2026, 5, 25),
        (2026, 6, 19),
        (2026, 7, 3),
        (2026, 9, 7),
        (2026, 11, 26),
        (2026, 12, 25),
        (2027, 1, 1),
        (2027, 1, 18),
        (2027, 2, 15),
        (2027, 3, 26),
        (2027, 5, 31),
        (2027, 6, 18),
        (2027, 7, 5),
        (2027, 9, 6),
        (2027, 11, 25),
        (2027, 12, 24),
    ];
    HOLIDAYS.contains(&ymd(date))
}

// nyse half days, 13:00 close. same coverage as the holiday table.
fn is_us_early_close(date: NaiveDate) -> bool {
    const EARLY_CLOSES: &[(i32, u32, u32)] = &[
        (2025, 7, 3),
        (2025, 11, 28),
        (2025, 12, 24),
        (2026, 11, 27),
        (2026, 12, 24),
        (2027, 11, 26),
    ];
    EARLY_CLOSES.contains(&ymd(date))
}

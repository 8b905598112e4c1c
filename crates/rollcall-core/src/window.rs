//! Marking window arithmetic.
//!
//! A window is one wall-clock hour on one calendar date. Minutes 0..=50 are
//! the open phase in which marks are accepted; minutes 51..=59 are closed.
//! Windows are clock-aligned, not rolling: 10:49 and 10:51 share a window,
//! 10:59 and 11:01 do not.

use chrono::{Duration, NaiveDate, NaiveDateTime, SubsecRound, Timelike};
use serde::Serialize;
use std::fmt;

/// Last minute of the hour in which new marks are accepted.
pub const OPEN_UNTIL_MINUTE: u32 = 50;

/// True iff both instants fall on the same date and in the same hour.
pub fn same_window(a: &NaiveDateTime, b: &NaiveDateTime) -> bool {
    a.date() == b.date() && a.hour() == b.hour()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowPhase {
    Open,
    Closed,
}

impl WindowPhase {
    pub fn label(self) -> &'static str {
        match self {
            WindowPhase::Open => "open",
            WindowPhase::Closed => "closed",
        }
    }
}

impl fmt::Display for WindowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn phase_of(t: &NaiveDateTime) -> WindowPhase {
    if t.minute() <= OPEN_UNTIL_MINUTE {
        WindowPhase::Open
    } else {
        WindowPhase::Closed
    }
}

/// Start of the window containing `t` (top of the hour).
pub fn window_start(t: &NaiveDateTime) -> NaiveDateTime {
    let into_hour = i64::from(t.minute() * 60 + t.second());
    t.trunc_subsecs(0) - Duration::seconds(into_hour)
}

/// Identifies a window: a (date, hour) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct WindowKey {
    pub date: NaiveDate,
    pub hour: u32,
}

impl WindowKey {
    pub fn of(t: &NaiveDateTime) -> Self {
        Self {
            date: t.date(),
            hour: t.hour(),
        }
    }
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:02}:00", self.date.format("%Y-%m-%d"), self.hour)
    }
}

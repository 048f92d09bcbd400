//! Admission rules for daily lesson periods.
//!
//! Creation and editing use different policies. A new period only has a
//! start, so it is kept at least one school hour away from every existing
//! start. An edited period has both bounds and is checked for interior
//! overlap against its siblings.

use crate::error::{TimetableError, TimetableResult};
use chrono::{NaiveTime, Timelike};

pub const PERIOD_RESOURCE: &str = "LessonPeriod";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub finish: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, finish: NaiveTime) -> Self {
        Self { start, finish }
    }
}

pub fn second_of_day(t: NaiveTime) -> i64 {
    i64::from(t.num_seconds_from_midnight())
}

/// True when `start` falls strictly inside
/// `(existing - school_hour_minutes, existing + school_hour_minutes)`.
/// Compared in seconds, since starts may carry them.
pub fn within_guard_band(start: NaiveTime, existing: NaiveTime, school_hour_minutes: i64) -> bool {
    (second_of_day(start) - second_of_day(existing)).abs() < school_hour_minutes.saturating_mul(60)
}

pub fn ensure_spaced<I>(start: NaiveTime, existing_starts: I, school_hour_minutes: i64) -> TimetableResult<()>
where
    I: IntoIterator<Item = NaiveTime>,
{
    if existing_starts
        .into_iter()
        .any(|s| within_guard_band(start, s, school_hour_minutes))
    {
        return Err(TimetableError::overlap(PERIOD_RESOURCE));
    }
    Ok(())
}

/// Edit-time conflict test: `other` starts or ends strictly inside
/// `candidate`, or both windows are identical.
pub fn conflicts(candidate: TimeWindow, other: TimeWindow) -> bool {
    (other.start > candidate.start && other.start < candidate.finish)
        || (other.finish > candidate.start && other.finish < candidate.finish)
        || (other.start == candidate.start && other.finish == candidate.finish)
}

/// `others` must already exclude the period being edited.
pub fn ensure_no_overlap<I>(candidate: TimeWindow, others: I) -> TimetableResult<()>
where
    I: IntoIterator<Item = TimeWindow>,
{
    if candidate.start > candidate.finish {
        return Err(TimetableError::invalid_range("finish"));
    }
    if others.into_iter().any(|o| conflicts(candidate, o)) {
        return Err(TimetableError::TimeOverlap { resource: None });
    }
    Ok(())
}

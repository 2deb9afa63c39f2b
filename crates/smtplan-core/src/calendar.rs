//! Working-time calendar
//!
//! Defines which minutes of the wall clock are production time: working
//! weekdays, shifts with breaks, and holidays. Shifts can be overridden per
//! weekday or per line; holidays can be global or line-scoped, whole-day or
//! partial-day.
//!
//! This module answers day-level questions only (`is_working_day`,
//! `working_minutes_in_day`, the working intervals of a date). The anchored
//! conversion between wall-clock instants and the integer working-minutes
//! axis lives in the solver crate, which owns the reference date.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::LineId;

// ============================================================================
// Time ranges and shifts
// ============================================================================

/// Half-open time range within a day, in minutes from midnight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: u16,
    pub end: u16,
}

impl TimeRange {
    pub const fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    /// Length in minutes.
    pub fn minutes(&self) -> i64 {
        i64::from(self.end.saturating_sub(self.start))
    }

    /// Intersection with another range, if non-empty.
    pub fn intersect(&self, other: &TimeRange) -> Option<TimeRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(TimeRange { start, end })
    }
}

/// A working shift: one span per day, minus scheduled breaks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shift {
    /// Shift start, minutes from midnight
    pub start: u16,
    /// Shift end, minutes from midnight
    pub end: u16,
    /// Breaks inside the shift (not counted as working time)
    pub breaks: Vec<TimeRange>,
}

impl Default for Shift {
    fn default() -> Self {
        // 08:00-16:30 with a 30-minute lunch break: 480 working minutes
        Self {
            start: 8 * 60,
            end: 16 * 60 + 30,
            breaks: vec![TimeRange::new(12 * 60, 12 * 60 + 30)],
        }
    }
}

impl Shift {
    pub fn new(start: u16, end: u16) -> Self {
        Self {
            start,
            end,
            breaks: Vec::new(),
        }
    }

    /// Add a break interval (builder pattern)
    pub fn with_break(mut self, range: TimeRange) -> Self {
        self.breaks.push(range);
        self
    }

    /// The shift span minus its breaks, as sorted disjoint intervals.
    pub fn intervals(&self) -> Vec<TimeRange> {
        let mut intervals = vec![TimeRange::new(self.start, self.end)];
        for brk in &self.breaks {
            intervals = subtract_interval(&intervals, brk);
        }
        intervals
    }

    /// Net working minutes of the shift.
    pub fn working_minutes(&self) -> i64 {
        self.intervals().iter().map(TimeRange::minutes).sum()
    }
}

/// Remove `cut` from every interval in `intervals`, splitting where needed.
fn subtract_interval(intervals: &[TimeRange], cut: &TimeRange) -> Vec<TimeRange> {
    let mut result = Vec::with_capacity(intervals.len() + 1);
    for iv in intervals {
        match iv.intersect(cut) {
            None => result.push(*iv),
            Some(hit) => {
                if iv.start < hit.start {
                    result.push(TimeRange::new(iv.start, hit.start));
                }
                if hit.end < iv.end {
                    result.push(TimeRange::new(hit.end, iv.end));
                }
            }
        }
    }
    result
}

// ============================================================================
// Holidays
// ============================================================================

/// A holiday: whole-day unless `hours` is set, global unless `line` is set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holiday {
    pub name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Line this holiday applies to; `None` = every line
    pub line: Option<LineId>,
    /// Non-working interval for partial-day holidays; `None` = whole day
    pub hours: Option<TimeRange>,
}

impl Holiday {
    /// Whole-day holiday over a date range
    pub fn whole_day(name: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            name: name.into(),
            start,
            end,
            line: None,
            hours: None,
        }
    }

    /// Partial-day holiday: the given interval is not worked
    pub fn partial(name: impl Into<String>, date: NaiveDate, hours: TimeRange) -> Self {
        Self {
            name: name.into(),
            start: date,
            end: date,
            line: None,
            hours: Some(hours),
        }
    }

    /// Scope this holiday to a single line (builder pattern)
    pub fn for_line(mut self, line: impl Into<LineId>) -> Self {
        self.line = Some(line.into());
        self
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn is_whole_day(&self) -> bool {
        self.hours.is_none()
    }

    /// Does this holiday apply when scheduling for `line`?
    pub fn applies_to(&self, line: Option<&str>) -> bool {
        match &self.line {
            None => true,
            Some(scoped) => line == Some(scoped.as_str()),
        }
    }
}

// ============================================================================
// Shop calendar
// ============================================================================

/// Working-time definitions for the whole shop.
///
/// Shift resolution precedence: per-line override, then per-weekday
/// override, then the default shift.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShopCalendar {
    /// Working days of week (0 = Sunday .. 6 = Saturday)
    pub working_days: Vec<u8>,
    /// Shift used when no override matches
    pub default_shift: Shift,
    /// Per-weekday shift overrides (key: 0 = Sunday .. 6 = Saturday)
    pub weekday_shifts: HashMap<u8, Shift>,
    /// Per-line shift overrides
    pub line_shifts: HashMap<LineId, Shift>,
    /// Holiday list, whole-day and partial-day mixed
    pub holidays: Vec<Holiday>,
}

impl Default for ShopCalendar {
    fn default() -> Self {
        Self {
            working_days: vec![1, 2, 3, 4, 5], // Mon-Fri
            default_shift: Shift::default(),
            weekday_shifts: HashMap::new(),
            line_shifts: HashMap::new(),
            holidays: Vec::new(),
        }
    }
}

impl ShopCalendar {
    /// Resolve the shift in effect for `date` on `line`.
    pub fn shift_for(&self, date: NaiveDate, line: Option<&str>) -> &Shift {
        if let Some(line) = line {
            if let Some(shift) = self.line_shifts.get(line) {
                return shift;
            }
        }
        let weekday = date.weekday().num_days_from_sunday() as u8;
        self.weekday_shifts
            .get(&weekday)
            .unwrap_or(&self.default_shift)
    }

    /// True iff `date` is a configured weekday and no whole-day holiday
    /// (global or scoped to `line`) covers it.
    pub fn is_working_day(&self, date: NaiveDate, line: Option<&str>) -> bool {
        let weekday = date.weekday().num_days_from_sunday() as u8;
        if !self.working_days.contains(&weekday) {
            return false;
        }
        !self
            .holidays
            .iter()
            .any(|h| h.is_whole_day() && h.contains(date) && h.applies_to(line))
    }

    /// Sorted disjoint working intervals of `date` for `line`: the resolved
    /// shift minus breaks, minus any partial-holiday interval.
    pub fn working_intervals(&self, date: NaiveDate, line: Option<&str>) -> Vec<TimeRange> {
        if !self.is_working_day(date, line) {
            return Vec::new();
        }
        let mut intervals = self.shift_for(date, line).intervals();
        for holiday in &self.holidays {
            if let Some(hours) = &holiday.hours {
                if holiday.contains(date) && holiday.applies_to(line) {
                    intervals = subtract_interval(&intervals, hours);
                }
            }
        }
        intervals
    }

    /// Net working minutes of `date` for `line`; 0 on non-working days.
    pub fn working_minutes_in_day(&self, date: NaiveDate, line: Option<&str>) -> i64 {
        self.working_intervals(date, line)
            .iter()
            .map(TimeRange::minutes)
            .sum()
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Working-minutes timeline
//!
//! Anchors the shop calendar at a reference instant and converts between
//! wall-clock `NaiveDateTime` and a non-negative integer working-minutes
//! coordinate. All solver variables live on this axis; only the decoder
//! converts back to dates.
//!
//! Round-trip law: for any instant inside a working window,
//! `minutes_to_date(date_to_minutes(t)) == t` to the minute.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};

use smtplan_core::{ScheduleError, ShopCalendar};

/// Hard ceiling on calendar walking; exceeding it is an internal error.
pub const MAX_CALENDAR_DAYS: i64 = 1000;

/// The shop calendar anchored at a reference instant.
#[derive(Clone, Debug)]
pub struct WorkTimeline<'a> {
    calendar: &'a ShopCalendar,
    reference: NaiveDateTime,
}

impl<'a> WorkTimeline<'a> {
    pub fn new(calendar: &'a ShopCalendar, reference: NaiveDateTime) -> Self {
        Self {
            calendar,
            reference,
        }
    }

    /// The zero of the working-minutes axis.
    pub fn reference(&self) -> NaiveDateTime {
        self.reference
    }

    pub fn calendar(&self) -> &ShopCalendar {
        self.calendar
    }

    /// Working minutes of `date` elapsed strictly before `time`.
    fn elapsed_in_day(&self, date: NaiveDate, time: NaiveTime, line: Option<&str>) -> i64 {
        let minute_of_day = i64::from(time.hour()) * 60 + i64::from(time.minute());
        self.calendar
            .working_intervals(date, line)
            .iter()
            .map(|iv| {
                let end = minute_of_day.min(i64::from(iv.end));
                (end - i64::from(iv.start)).max(0)
            })
            .sum()
    }

    /// The wall-clock time at `offset` working minutes into `date`.
    ///
    /// `offset` must be strictly less than the day's working minutes; the
    /// caller guarantees this by construction.
    fn time_at_offset(&self, date: NaiveDate, mut offset: i64, line: Option<&str>) -> NaiveTime {
        let intervals = self.calendar.working_intervals(date, line);
        for iv in &intervals {
            if offset < iv.minutes() {
                let minute = i64::from(iv.start) + offset;
                return minute_to_time(minute);
            }
            offset -= iv.minutes();
        }
        // Unreachable when the offset invariant holds; clamp to day end.
        intervals
            .last()
            .map_or(NaiveTime::MIN, |iv| minute_to_time(i64::from(iv.end) - 1))
    }

    /// Working minutes from the reference instant to `instant`, clamped at 0.
    ///
    /// Whole working days in `[reference, instant)` contribute their full
    /// working minutes; the final day contributes the minutes elapsed inside
    /// its shift, clamped to the shift's working capacity.
    pub fn date_to_minutes(&self, instant: NaiveDateTime, line: Option<&str>) -> i64 {
        if instant <= self.reference {
            return 0;
        }

        let mut total = 0;
        let mut day = self.reference.date();
        while day < instant.date() {
            total += self.calendar.working_minutes_in_day(day, line);
            day = day + TimeDelta::days(1);
        }
        total + self.elapsed_in_day(instant.date(), instant.time(), line)
    }

    /// The wall-clock instant at `minutes` on the working axis.
    ///
    /// Walks forward one day at a time consuming each day's working minutes.
    /// A budget that would walk past [`MAX_CALENDAR_DAYS`] is a fatal
    /// consistency error.
    pub fn minutes_to_date(
        &self,
        minutes: i64,
        line: Option<&str>,
    ) -> Result<NaiveDateTime, ScheduleError> {
        let mut remaining = minutes.max(0);
        let mut day = self.reference.date();

        for _ in 0..MAX_CALENDAR_DAYS {
            let available = self.calendar.working_minutes_in_day(day, line);
            if remaining < available {
                return Ok(day.and_time(self.time_at_offset(day, remaining, line)));
            }
            remaining -= available;
            day = day + TimeDelta::days(1);
        }

        Err(ScheduleError::CalendarOverrun(MAX_CALENDAR_DAYS))
    }

    /// Advance `n` working days from `from`, counting working days only.
    pub fn add_working_days(&self, from: NaiveDate, n: i64, line: Option<&str>) -> NaiveDate {
        if n <= 0 {
            return from;
        }

        let mut current = from;
        let mut remaining = n;
        while remaining > 0 {
            current = current + TimeDelta::days(1);
            if self.calendar.is_working_day(current, line) {
                remaining -= 1;
            }
        }
        current
    }

    /// Number of working days in `(from, to]`.
    pub fn working_days_between(&self, from: NaiveDate, to: NaiveDate, line: Option<&str>) -> i64 {
        if to <= from {
            return 0;
        }
        let mut count = 0;
        let mut day = from;
        while day < to {
            day = day + TimeDelta::days(1);
            if self.calendar.is_working_day(day, line) {
                count += 1;
            }
        }
        count
    }

    /// Working minutes between two instants, clamped at 0.
    pub fn available_minutes_between(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
        line: Option<&str>,
    ) -> i64 {
        (self.date_to_minutes(to, line) - self.date_to_minutes(from, line)).max(0)
    }
}

fn minute_to_time(minute: i64) -> NaiveTime {
    let clamped = minute.clamp(0, 24 * 60 - 1) as u32;
    NaiveTime::from_hms_opt(clamped / 60, clamped % 60, 0).unwrap_or(NaiveTime::MIN)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use smtplan_core::{Holiday, Shift};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, hour: u32, minute: u32) -> NaiveDateTime {
        date(y, m, d).and_hms_opt(hour, minute, 0).unwrap()
    }

    /// Monday 2025-03-03 at midnight, default Mon-Fri calendar.
    fn monday_reference() -> NaiveDateTime {
        at(2025, 3, 3, 0, 0)
    }

    #[test]
    fn minute_zero_is_first_shift_start() {
        let calendar = ShopCalendar::default();
        let timeline = WorkTimeline::new(&calendar, monday_reference());

        let start = timeline.minutes_to_date(0, None).unwrap();
        assert_eq!(start, at(2025, 3, 3, 8, 0));
    }

    #[test]
    fn full_day_rolls_to_next_working_morning() {
        let calendar = ShopCalendar::default();
        let timeline = WorkTimeline::new(&calendar, monday_reference());

        // 480 working minutes = the whole Monday shift
        let next = timeline.minutes_to_date(480, None).unwrap();
        assert_eq!(next, at(2025, 3, 4, 8, 0));
    }

    #[test]
    fn weekend_is_skipped() {
        let calendar = ShopCalendar::default();
        let timeline = WorkTimeline::new(&calendar, monday_reference());

        // Five full days land on the next Monday morning
        let next_week = timeline.minutes_to_date(5 * 480, None).unwrap();
        assert_eq!(next_week, at(2025, 3, 10, 8, 0));
    }

    #[test]
    fn conversion_skips_lunch_break() {
        let calendar = ShopCalendar::default();
        let timeline = WorkTimeline::new(&calendar, monday_reference());

        // 240 working minutes from 08:00 reach the lunch break at 12:00;
        // the next working minute is 12:30
        assert_eq!(timeline.minutes_to_date(239, None).unwrap(), at(2025, 3, 3, 11, 59));
        assert_eq!(timeline.minutes_to_date(240, None).unwrap(), at(2025, 3, 3, 12, 30));
    }

    #[test]
    fn date_to_minutes_clamps_before_reference() {
        let calendar = ShopCalendar::default();
        let timeline = WorkTimeline::new(&calendar, monday_reference());

        assert_eq!(timeline.date_to_minutes(at(2025, 2, 28, 12, 0), None), 0);
    }

    #[test]
    fn date_to_minutes_counts_whole_days_plus_elapsed() {
        let calendar = ShopCalendar::default();
        let timeline = WorkTimeline::new(&calendar, monday_reference());

        // Tuesday 10:00: Monday contributes 480, Tuesday 08:00-10:00 is 120
        assert_eq!(timeline.date_to_minutes(at(2025, 3, 4, 10, 0), None), 600);
    }

    #[test]
    fn round_trip_inside_working_windows() {
        let mut calendar = ShopCalendar::default();
        calendar
            .holidays
            .push(Holiday::whole_day("Bridge day", date(2025, 3, 7), date(2025, 3, 7)));
        let timeline = WorkTimeline::new(&calendar, monday_reference());

        let instants = [
            at(2025, 3, 3, 8, 0),
            at(2025, 3, 3, 11, 59),
            at(2025, 3, 4, 14, 45),
            at(2025, 3, 10, 16, 29), // Friday was a holiday, still bijective
        ];
        for instant in instants {
            let minutes = timeline.date_to_minutes(instant, None);
            assert_eq!(
                timeline.minutes_to_date(minutes, None).unwrap(),
                instant,
                "round trip failed for {instant}"
            );
        }
    }

    #[test]
    fn per_line_shift_changes_the_axis() {
        let mut calendar = ShopCalendar::default();
        calendar
            .line_shifts
            .insert("SMT-2".into(), Shift::new(6 * 60, 18 * 60));
        let timeline = WorkTimeline::new(&calendar, monday_reference());

        // SMT-2 works 720 minutes per day with no break
        assert_eq!(
            timeline.minutes_to_date(720, Some("SMT-2")).unwrap(),
            at(2025, 3, 4, 6, 0)
        );
    }

    #[test]
    fn add_working_days_skips_weekends() {
        let calendar = ShopCalendar::default();
        let timeline = WorkTimeline::new(&calendar, monday_reference());

        // Friday + 1 working day = Monday
        assert_eq!(
            timeline.add_working_days(date(2025, 3, 7), 1, None),
            date(2025, 3, 10)
        );
        assert_eq!(timeline.add_working_days(date(2025, 3, 3), 0, None), date(2025, 3, 3));
    }

    #[test]
    fn working_days_between_counts_only_working() {
        let calendar = ShopCalendar::default();
        let timeline = WorkTimeline::new(&calendar, monday_reference());

        // Friday -> next Tuesday crosses a weekend: Mon + Tue = 2
        assert_eq!(
            timeline.working_days_between(date(2025, 3, 7), date(2025, 3, 11), None),
            2
        );
    }

    #[test]
    fn overrun_is_fatal() {
        let mut calendar = ShopCalendar::default();
        calendar.working_days.clear(); // nothing is ever worked
        let timeline = WorkTimeline::new(&calendar, monday_reference());

        let err = timeline.minutes_to_date(1, None).unwrap_err();
        assert!(matches!(err, ScheduleError::CalendarOverrun(_)));
    }
}

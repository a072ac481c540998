//! Weekly timetable predicates: operating window, last-approach cutoff,
//! termination-notice windows and the seasonal event.
//!
//! Everything here is a pure function of a [`ZonedTime`] and the timetable.
//! Weekdays always come from the configured zone's calendar day.

use crate::clock::ZonedTime;
use chrono::Weekday;

pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Half-open `[start, end)` range of minutes since local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinuteRange {
    pub start: u32,
    pub end: u32,
}

impl MinuteRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, minute: u32) -> bool {
        minute >= self.start && minute < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceDay {
    pub window: MinuteRange,
    /// No new approach may begin at or after this minute.
    pub last_approach: u32,
}

impl ServiceDay {
    pub fn closed() -> Self {
        Self {
            window: MinuteRange::new(0, 0),
            last_approach: 0,
        }
    }

    pub fn is_operating(&self) -> bool {
        !self.window.is_empty()
    }
}

/// One [`ServiceDay`] per weekday, indexed from Sunday.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklySchedule {
    days: [ServiceDay; 7],
}

impl WeeklySchedule {
    pub fn new(days: [ServiceDay; 7]) -> Self {
        Self { days }
    }

    pub fn day(&self, weekday: Weekday) -> &ServiceDay {
        &self.days[weekday.num_days_from_sunday() as usize]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminationWindow {
    pub name: String,
    pub days: Vec<Weekday>,
    pub range: MinuteRange,
}

impl TerminationWindow {
    pub fn is_open(&self, time: &ZonedTime) -> bool {
        self.days.contains(&time.weekday) && self.range.contains(time.minute_of_day())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonalEvent {
    pub name: String,
    /// Months 1..=12.
    pub months: Vec<u32>,
    pub days: Vec<Weekday>,
    pub range: MinuteRange,
}

impl SeasonalEvent {
    pub fn is_active(&self, time: &ZonedTime) -> bool {
        self.months.contains(&time.month)
            && self.days.contains(&time.weekday)
            && self.range.contains(time.minute_of_day())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timetable {
    pub schedule: WeeklySchedule,
    pub terminations: Vec<TerminationWindow>,
    pub seasonal_event: Option<SeasonalEvent>,
}

impl Timetable {
    pub fn service_day(&self, weekday: Weekday) -> &ServiceDay {
        self.schedule.day(weekday)
    }

    pub fn is_service_running(&self, time: &ZonedTime) -> bool {
        self.service_day(time.weekday)
            .window
            .contains(time.minute_of_day())
    }

    pub fn approach_cutoff(&self, time: &ZonedTime) -> u32 {
        self.service_day(time.weekday).last_approach
    }

    pub fn is_past_cutoff(&self, time: &ZonedTime) -> bool {
        time.minute_of_day() >= self.approach_cutoff(time)
    }

    /// Running and still before the last-approach cutoff.
    pub fn is_service_active(&self, time: &ZonedTime) -> bool {
        self.is_service_running(time) && !self.is_past_cutoff(time)
    }

    /// True before today's first service minute on a day that operates.
    pub fn is_before_service(&self, time: &ZonedTime) -> bool {
        let day = self.service_day(time.weekday);
        day.is_operating() && time.minute_of_day() < day.window.start
    }

    pub fn is_in_termination_window(&self, time: &ZonedTime) -> bool {
        self.terminations.iter().any(|window| window.is_open(time))
    }

    pub fn is_seasonal_event_active(&self, time: &ZonedTime) -> bool {
        self.seasonal_event
            .as_ref()
            .is_some_and(|event| event.is_active(time))
    }

    /// Next weekday whose service has not started yet: today when still
    /// before opening, otherwise the first operating day after today.
    pub fn next_operating_day(&self, time: &ZonedTime) -> Option<Weekday> {
        if self.is_before_service(time) {
            return Some(time.weekday);
        }
        let mut day = time.weekday;
        for _ in 0..7 {
            day = day.succ();
            if self.service_day(day).is_operating() {
                return Some(day);
            }
        }
        None
    }
}

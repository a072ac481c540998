//! Simulated line countdowns.
//!
//! A line has an arrival every `cycle_secs` seconds, phased by
//! `start_offset_secs` from local midnight. [`phase`] is the pure cycle
//! arithmetic; [`LineTracker`] holds the per-line runtime counters that the
//! board keeps between ticks.

use crate::clock::ZonedTime;
use crate::schedule::{MINUTES_PER_DAY, Timetable};
use serde::Deserialize;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineId {
    Inner,
    Outer,
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineId::Inner => write!(f, "inner"),
            LineId::Outer => write!(f, "outer"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineParams {
    /// Display name, e.g. "Inner".
    pub label: String,
    pub start_offset_secs: u32,
    pub cycle_secs: u32,
}

impl LineParams {
    /// First arrival at or after `minute_of_day`, in seconds since midnight.
    pub fn first_arrival_at_or_after(&self, minute_of_day: u32) -> u32 {
        let from = minute_of_day * 60;
        let position = phase(self, from).cycle_position;
        if position == 0 {
            from
        } else {
            from + (self.cycle_secs - position)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinePhase {
    pub cycle_position: u32,
    /// Seconds until the next arrival; `0` at the arrival instant itself.
    pub remaining_seconds: u32,
}

pub fn phase(params: &LineParams, seconds_since_midnight: u32) -> LinePhase {
    let cycle = i64::from(params.cycle_secs.max(1));
    let shifted = i64::from(seconds_since_midnight) - i64::from(params.start_offset_secs);
    let cycle_position = shifted.rem_euclid(cycle) as u32;
    let remaining_seconds = if cycle_position == 0 {
        0
    } else {
        params.cycle_secs - cycle_position
    };
    LinePhase {
        cycle_position,
        remaining_seconds,
    }
}

/// Minutes shown on the board for a remaining duration; the arrival instant
/// shows the full cycle again.
pub fn countdown_minutes(params: &LineParams, remaining_seconds: u32) -> u32 {
    let seconds = if remaining_seconds == 0 {
        params.cycle_secs
    } else {
        remaining_seconds
    };
    seconds.div_ceil(60)
}

/// What a line shows once its service has closed for the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AfterClose {
    #[default]
    ServiceComplete,
    NextFirstTrain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadlineState {
    /// Service has not started; `at` is seconds since midnight of the first arrival.
    FirstTrain { at: u32 },
    Countdown { minutes: u32 },
    Approaching,
    ServiceComplete,
}

impl HeadlineState {
    pub fn is_in_service(&self) -> bool {
        matches!(self, Self::Countdown { .. } | Self::Approaching)
    }

    pub fn texts(&self, label: &str) -> (String, String) {
        match self {
            Self::FirstTrain { at } => (
                format!("First {}", label.to_lowercase()),
                format_hhmm(*at),
            ),
            Self::Countdown { minutes } => (format!("{label} next arrival"), format!("{minutes}min")),
            Self::Approaching => (label.to_uppercase(), "APPROACHING".to_string()),
            Self::ServiceComplete => (format!("{label} service complete"), String::new()),
        }
    }
}

fn format_hhmm(seconds_since_midnight: u32) -> String {
    let minutes = (seconds_since_midnight / 60) % MINUTES_PER_DAY;
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Pure headline state for one line at `time`.
pub fn headline_state(
    params: &LineParams,
    timetable: &Timetable,
    time: &ZonedTime,
    approaching_threshold_secs: u32,
    after_close: AfterClose,
) -> HeadlineState {
    if !timetable.is_service_active(time) {
        if timetable.is_before_service(time) {
            let start = timetable.service_day(time.weekday).window.start;
            return HeadlineState::FirstTrain {
                at: params.first_arrival_at_or_after(start),
            };
        }
        return match after_close {
            AfterClose::ServiceComplete => HeadlineState::ServiceComplete,
            AfterClose::NextFirstTrain => match timetable.next_operating_day(time) {
                Some(day) => HeadlineState::FirstTrain {
                    at: params.first_arrival_at_or_after(timetable.service_day(day).window.start),
                },
                None => HeadlineState::ServiceComplete,
            },
        };
    }

    let remaining = phase(params, time.seconds_since_midnight()).remaining_seconds;
    if remaining > 0 && remaining <= approaching_threshold_secs {
        HeadlineState::Approaching
    } else {
        HeadlineState::Countdown {
            minutes: countdown_minutes(params, remaining),
        }
    }
}

/// Headline halves handed to the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Headline {
    pub left_text: String,
    pub right_text: String,
    pub is_approaching: bool,
    /// Set only on the tick the line entered the approaching state.
    pub just_became_approaching: bool,
}

/// Per-line runtime counters.
#[derive(Debug, Clone)]
pub struct LineTracker {
    id: LineId,
    remaining_seconds: u32,
    cycle_count: u64,
    is_approaching: bool,
    in_service: bool,
    last_second: Option<u32>,
}

impl LineTracker {
    pub fn new(id: LineId, params: &LineParams) -> Self {
        Self {
            id,
            remaining_seconds: params.start_offset_secs.min(params.cycle_secs),
            cycle_count: 0,
            is_approaching: false,
            in_service: false,
            last_second: None,
        }
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    pub fn is_approaching(&self) -> bool {
        self.is_approaching
    }

    /// Fold one tick's state into the counters and build the headline.
    pub fn update(
        &mut self,
        params: &LineParams,
        state: HeadlineState,
        time: &ZonedTime,
    ) -> Headline {
        let second = time.seconds_since_midnight();
        let moved_forward = self.last_second.is_some_and(|last| second > last);
        self.last_second = Some(second);
        if state.is_in_service() {
            let remaining = phase(params, second).remaining_seconds;
            let rolled_over = remaining == 0 || remaining > self.remaining_seconds;
            if self.in_service && moved_forward && rolled_over && self.remaining_seconds != 0 {
                self.cycle_count += 1;
                debug!(line = %self.id, cycle_count = self.cycle_count, "Line cycle completed");
            }
            self.remaining_seconds = remaining;
        }
        if self.in_service != state.is_in_service() {
            debug!(line = %self.id, in_service = state.is_in_service(), "Line service changed");
        }
        self.in_service = state.is_in_service();

        let approaching = matches!(state, HeadlineState::Approaching);
        let just_became_approaching = approaching && !self.is_approaching;
        if just_became_approaching {
            debug!(line = %self.id, remaining = self.remaining_seconds, "Line approaching");
        }
        self.is_approaching = approaching;

        let (left_text, right_text) = state.texts(&params.label);
        Headline {
            left_text,
            right_text,
            is_approaching: approaching,
            just_became_approaching,
        }
    }
}

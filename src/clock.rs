//! Wall-clock resolution in the board's configured timezone.
//!
//! Every calculation on the board works on [`ZonedTime`], never on the host's
//! local time. Conversion goes through `chrono-tz` so DST transitions in the
//! configured zone resolve the same way the zone's own clocks do.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::Tz;

/// Civil time fields for one instant, resolved in a fixed zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZonedTime {
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub weekday: Weekday,
    /// 1 = January .. 12 = December.
    pub month: u32,
    /// Instant in milliseconds since the Unix epoch. Drives advisory dwell timing.
    pub epoch_millis: i64,
}

impl ZonedTime {
    pub fn from_utc(instant: DateTime<Utc>, tz: Tz) -> Self {
        let local = instant.with_timezone(&tz);
        Self {
            hour: local.hour(),
            minute: local.minute(),
            second: local.second(),
            weekday: local.weekday(),
            month: local.month(),
            epoch_millis: instant.timestamp_millis(),
        }
    }

    pub fn minute_of_day(&self) -> u32 {
        self.hour * 60 + self.minute
    }

    pub fn seconds_since_midnight(&self) -> u32 {
        self.hour * 3600 + self.minute * 60 + self.second
    }
}

pub trait TimeSource: Send {
    fn now(&self) -> ZonedTime;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    tz: Tz,
}

impl SystemTimeSource {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> ZonedTime {
        ZonedTime::from_utc(Utc::now(), self.tz)
    }
}

pub fn format_clock(time: &ZonedTime) -> String {
    format!(
        "Time Now {:02}:{:02}:{:02}",
        time.hour, time.minute, time.second
    )
}

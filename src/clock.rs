//! Time policy: day-part classification and rotation indices.
//!
//! Everything here is a pure function of the time value passed in. The
//! caller decides which clock (and which time zone) "now" comes from.

use chrono::{Datelike, TimeDelta, Timelike};
use std::fmt;
use std::time::Duration;

/// First hour (inclusive) of the night band.
pub const NIGHT_START_HOUR: u32 = 1;
/// Last hour (inclusive) of the night band.
pub const NIGHT_END_HOUR: u32 = 6;
/// First hour (inclusive) of the evening band.
pub const EVENING_START_HOUR: u32 = 22;
/// Last hour (inclusive) of the evening band.
pub const EVENING_END_HOUR: u32 = 23;

/// Coarse classification of the hour of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayPart {
    /// 01:00–06:59.
    Night,
    /// 22:00–23:59.
    Evening,
    /// Everything else.
    Day,
}

impl fmt::Display for DayPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Night => "night",
            Self::Evening => "evening",
            Self::Day => "day",
        };
        f.write_str(label)
    }
}

/// Classify an hour of day (0–23).
pub fn day_part_for_hour(hour: u32) -> DayPart {
    if (NIGHT_START_HOUR..=NIGHT_END_HOUR).contains(&hour) {
        DayPart::Night
    } else if (EVENING_START_HOUR..=EVENING_END_HOUR).contains(&hour) {
        DayPart::Evening
    } else {
        DayPart::Day
    }
}

/// Classify a point in time.
pub fn day_part(now: &impl Timelike) -> DayPart {
    day_part_for_hour(now.hour())
}

/// `true` during the night band.
pub fn is_night(now: &impl Timelike) -> bool {
    day_part(now) == DayPart::Night
}

/// `true` during the evening band.
pub fn is_evening(now: &impl Timelike) -> bool {
    day_part(now) == DayPart::Evening
}

/// Message polling interval for a day-part.
pub fn poll_interval(part: DayPart, day_secs: u64, night_secs: u64) -> Duration {
    match part {
        DayPart::Night => Duration::from_secs(night_secs),
        DayPart::Evening | DayPart::Day => Duration::from_secs(day_secs),
    }
}

/// Day of week as 0 = Monday … 6 = Sunday.
pub fn weekday_index(now: &impl Datelike) -> usize {
    now.weekday().num_days_from_monday() as usize
}

/// Seconds as a [`TimeDelta`], saturating at [`TimeDelta::MAX`].
pub fn delta_secs(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

/// Round-robin index into a list of `len` items. Returns 0 for an empty list.
pub fn rotation_index(counter: u64, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    (counter % len as u64) as usize
}

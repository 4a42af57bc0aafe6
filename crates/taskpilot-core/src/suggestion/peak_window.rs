//! Peak window descriptors such as `"Monday 9:00"`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc, Weekday};

/// A recurring weekly slot, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeakWindow {
    pub weekday: Weekday,
    pub hour: u32,
    pub minute: u32,
}

impl PeakWindow {
    pub fn new(weekday: Weekday, hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { weekday, hour, minute })
    }

    /// Parse `"<weekday> <hour>[:<minute>][am|pm]"`.
    ///
    /// Weekdays may be full or three-letter names in any case. Returns
    /// `None` for anything else.
    pub fn parse(descriptor: &str) -> Option<Self> {
        let mut parts = descriptor.split_whitespace();
        let weekday = Weekday::from_str(parts.next()?).ok()?;
        let time = parts.collect::<String>().to_ascii_lowercase();
        if time.is_empty() {
            return None;
        }

        let (clock, meridiem) = if let Some(rest) = time.strip_suffix("am") {
            (rest, Some(false))
        } else if let Some(rest) = time.strip_suffix("pm") {
            (rest, Some(true))
        } else {
            (time.as_str(), None)
        };

        let (hour, minute) = match clock.split_once(':') {
            Some((h, m)) => (h.parse::<u32>().ok()?, m.parse::<u32>().ok()?),
            None => (clock.parse::<u32>().ok()?, 0),
        };

        let hour = match meridiem {
            None => hour,
            Some(_) if !(1..=12).contains(&hour) => return None,
            Some(false) => hour % 12,
            Some(true) => hour % 12 + 12,
        };

        Self::new(weekday, hour, minute)
    }

    /// First occurrence strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let days_ahead = (self.weekday.num_days_from_monday() + 7
            - now.weekday().num_days_from_monday())
            % 7;
        let time = NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN);
        let date = now.date_naive() + Duration::days(days_ahead as i64);
        let candidate = Utc.from_utc_datetime(&date.and_time(time));
        if candidate > now {
            candidate
        } else {
            candidate + Duration::weeks(1)
        }
    }
}

impl fmt::Display for PeakWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}:{:02}", self.weekday, self.hour, self.minute)
    }
}

/// Resolve a stored descriptor to its next concrete time after `now`.
pub fn resolve(descriptor: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    PeakWindow::parse(descriptor).map(|w| w.next_after(now))
}

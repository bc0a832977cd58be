//! Schedule windows: time-of-day ranges on a set of weekdays.
//!
//! A window is the half-open range `[start, end)` in minutes of the day. When
//! `end < start` the window wraps past midnight, and the part after midnight
//! belongs to the weekday on which the window opened: a Monday `23:30-00:30`
//! window is still active at `00:15` on Tuesday even when Tuesday is not in
//! the set.

use crate::error::{LockError, Result};
use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MINUTES_PER_DAY: u16 = 24 * 60;

/// Minute of the day, `0..1440`. Serialized as `"HH:MM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MinuteOfDay(u16);

impl MinuteOfDay {
    pub const MIDNIGHT: MinuteOfDay = MinuteOfDay(0);

    pub fn new(minutes: u16) -> Result<Self> {
        if minutes >= MINUTES_PER_DAY {
            return Err(LockError::InvalidTime(minutes.to_string()));
        }
        Ok(Self(minutes))
    }

    pub fn from_hm(hour: u16, minute: u16) -> Result<Self> {
        if hour >= 24 || minute >= 60 {
            return Err(LockError::InvalidTime(format!("{:02}:{:02}", hour, minute)));
        }
        Ok(Self(hour * 60 + minute))
    }

    /// Minute of the day of a local wall-clock instant
    pub fn of(local: &NaiveDateTime) -> Self {
        Self((local.hour() * 60 + local.minute()) as u16)
    }

    pub fn minutes(self) -> u16 {
        self.0
    }
}

impl fmt::Display for MinuteOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl FromStr for MinuteOfDay {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self> {
        let (hour, minute) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| LockError::InvalidTime(s.to_string()))?;
        let hour: u16 = hour
            .parse()
            .map_err(|_| LockError::InvalidTime(s.to_string()))?;
        let minute: u16 = minute
            .parse()
            .map_err(|_| LockError::InvalidTime(s.to_string()))?;
        Self::from_hm(hour, minute).map_err(|_| LockError::InvalidTime(s.to_string()))
    }
}

impl TryFrom<String> for MinuteOfDay {
    type Error = LockError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<MinuteOfDay> for String {
    fn from(value: MinuteOfDay) -> Self {
        value.to_string()
    }
}

/// Set of weekdays, stored as a 7-bit mask (Monday = bit 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Weekday>", into = "Vec<Weekday>")]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const ALL: WeekdaySet = WeekdaySet(0b111_1111);
    pub const WORKDAYS: WeekdaySet = WeekdaySet(0b001_1111);
    pub const WEEKEND: WeekdaySet = WeekdaySet(0b110_0000);

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= 1 << day.num_days_from_monday();
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ]
        .into_iter()
        .filter(move |day| self.contains(*day))
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = WeekdaySet::empty();
        for day in iter {
            set.insert(day);
        }
        set
    }
}

impl From<Vec<Weekday>> for WeekdaySet {
    fn from(days: Vec<Weekday>) -> Self {
        days.into_iter().collect()
    }
}

impl From<WeekdaySet> for Vec<Weekday> {
    fn from(set: WeekdaySet) -> Self {
        set.iter().collect()
    }
}

/// Parses `all`, `workdays`, `weekend`, or a comma-separated list such as `mon,wed,fri`.
impl FromStr for WeekdaySet {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "daily" | "everyday" => return Ok(WeekdaySet::ALL),
            "workdays" | "weekdays" => return Ok(WeekdaySet::WORKDAYS),
            "weekend" | "weekends" => return Ok(WeekdaySet::WEEKEND),
            _ => {}
        }

        let mut set = WeekdaySet::empty();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let day: Weekday = part
                .parse()
                .map_err(|_| LockError::InvalidWeekday(part.to_string()))?;
            set.insert(day);
        }
        if set.is_empty() {
            return Err(LockError::InvalidWeekday(s.to_string()));
        }
        Ok(set)
    }
}

/// One blocking window of a schedule lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleWindow {
    pub start: MinuteOfDay,
    pub end: MinuteOfDay,
    pub weekdays: WeekdaySet,
}

impl ScheduleWindow {
    pub fn new(start: MinuteOfDay, end: MinuteOfDay, weekdays: WeekdaySet) -> Self {
        Self {
            start,
            end,
            weekdays,
        }
    }

    /// Whether the window wraps past midnight
    pub fn wraps_midnight(&self) -> bool {
        self.end < self.start
    }

    /// Whether the window is active at `minute` on `weekday`.
    ///
    /// A zero-length window (`start == end`) is never active.
    pub fn is_active_at(&self, weekday: Weekday, minute: MinuteOfDay) -> bool {
        if self.start == self.end {
            return false;
        }

        if !self.wraps_midnight() {
            return self.weekdays.contains(weekday) && minute >= self.start && minute < self.end;
        }

        (minute >= self.start && self.weekdays.contains(weekday))
            || (minute < self.end && self.weekdays.contains(weekday.pred()))
    }

    /// Whether the window is active at a local wall-clock instant
    pub fn contains(&self, local: &NaiveDateTime) -> bool {
        self.is_active_at(local.weekday(), MinuteOfDay::of(local))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.start == self.end {
            return Err(LockError::invalid_terms(format!(
                "schedule window {}-{} is empty",
                self.start, self.end
            )));
        }
        if self.weekdays.is_empty() {
            return Err(LockError::invalid_terms(
                "schedule window has no active weekdays",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for ScheduleWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let days: Vec<String> = self.weekdays.iter().map(|d| d.to_string()).collect();
        write!(f, "{}-{} ({})", self.start, self.end, days.join(","))
    }
}

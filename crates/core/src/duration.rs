//! Signed, fractional ISO 8601 durations (`PnYnMnWnDTnHnMnS`) and their
//! calendar-aware application to UTC instants.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Months, NaiveDate, TimeDelta, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::BadInputError;

// "\d+(?:[.,]\d*)?" matches a number with an optional decimal dot or comma
static PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([+-])?P(\d+(?:[.,]\d*)?Y)?(\d+(?:[.,]\d*)?M)?(\d+(?:[.,]\d*)?W)?(\d+(?:[.,]\d*)?D)?(?:T(\d+(?:[.,]\d*)?H)?(\d+(?:[.,]\d*)?M)?(\d+(?:[.,]\d*)?S)?)?$",
    )
    .unwrap()
});

/// An immutable duration value. Magnitudes are never negative; the sign is
/// carried by `positive`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ISO8601Duration {
    pub positive: bool,
    pub years: f64,
    pub months: f64,
    pub weeks: f64,
    pub days: f64,
    pub hours: f64,
    pub minutes: f64,
    pub seconds: f64,
}

impl Default for ISO8601Duration {
    fn default() -> Self {
        Self {
            positive: true,
            years: 0.0,
            months: 0.0,
            weeks: 0.0,
            days: 0.0,
            hours: 0.0,
            minutes: 0.0,
            seconds: 0.0,
        }
    }
}

impl ISO8601Duration {
    pub fn parse(input: &str) -> Result<Self, BadInputError> {
        let captures = PATTERN
            .captures(input)
            .ok_or_else(|| BadInputError::new("invalid \"PT\" ISO 8601 duration given"))?;
        Ok(Self {
            positive: captures.get(1).map(|m| m.as_str()) != Some("-"),
            years: part(&captures, 2),
            months: part(&captures, 3),
            weeks: part(&captures, 4),
            days: part(&captures, 5),
            hours: part(&captures, 6),
            minutes: part(&captures, 7),
            seconds: part(&captures, 8),
        })
    }

    /// Parses a JSON literal, which must be a string.
    pub fn parse_value(value: &serde_json::Value) -> Result<Self, BadInputError> {
        match value.as_str() {
            Some(text) => Self::parse(text),
            None => Err(BadInputError::new(
                "\"PT\" ISO 8601 duration expects a string",
            )),
        }
    }

    /// A duration of exactly `millis` milliseconds, expressed in seconds.
    pub fn from_millis(millis: f64) -> Self {
        Self {
            positive: millis >= 0.0,
            seconds: if millis.is_finite() {
                millis.abs() / 1000.0
            } else {
                0.0
            },
            ..Self::default()
        }
    }

    pub fn is_zero(&self) -> bool {
        [
            self.years,
            self.months,
            self.weeks,
            self.days,
            self.hours,
            self.minutes,
            self.seconds,
        ]
        .iter()
        .all(|v| *v == 0.0)
    }

    /// Adds the duration to an instant given in epoch milliseconds.
    pub fn apply_to(&self, epoch_millis: i64) -> i64 {
        match Utc.timestamp_millis_opt(epoch_millis).single() {
            Some(start) => self.apply_to_datetime(start).timestamp_millis(),
            None => epoch_millis,
        }
    }

    /// Adds the duration to `start` in the UTC calendar.
    ///
    /// Every unit is split into an integer amount, added to the calendar
    /// right away, and a fractional remainder carried into the next smaller
    /// unit. The remainder of months is scaled by the length of the month
    /// reached after adding the integer months, so `P1.5M` from January 15th
    /// lands on March 1st in a non-leap year.
    pub fn apply_to_datetime(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        let sign = if self.positive { 1 } else { -1 };
        let mut cursor = start;

        let years = self.years.trunc();
        cursor = shift_months(cursor, sign * (years as i64).saturating_mul(12));
        let mut remainder = (self.years - years) * 12.0;

        let months_total = self.months + remainder;
        let months = months_total.trunc();
        cursor = shift_months(cursor, sign * months as i64);
        remainder = (months_total - months) * f64::from(days_in_month(&cursor));

        let days_total = self.days + self.weeks * 7.0 + remainder;
        let days = days_total.trunc();
        cursor = shift(cursor, TimeDelta::try_days(sign * days as i64));
        remainder = (days_total - days) * 24.0;

        let hours_total = self.hours + remainder;
        let hours = hours_total.trunc();
        cursor = shift(cursor, TimeDelta::try_hours(sign * hours as i64));
        remainder = (hours_total - hours) * 60.0;

        let minutes_total = self.minutes + remainder;
        let minutes = minutes_total.trunc();
        cursor = shift(cursor, TimeDelta::try_minutes(sign * minutes as i64));
        remainder = (minutes_total - minutes) * 60.0;

        let seconds_total = self.seconds + remainder;
        let seconds = seconds_total.trunc();
        cursor = shift(cursor, TimeDelta::try_seconds(sign * seconds as i64));
        remainder = (seconds_total - seconds) * 1000.0;

        shift(cursor, TimeDelta::try_milliseconds(sign * remainder.trunc() as i64))
    }
}

fn part(captures: &Captures<'_>, group: usize) -> f64 {
    let Some(m) = captures.get(group) else {
        return 0.0;
    };
    // Drop the unit designator
    let text = &m.as_str()[..m.as_str().len() - 1];
    match text.replace(',', ".").parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

fn shift(cursor: DateTime<Utc>, delta: Option<TimeDelta>) -> DateTime<Utc> {
    delta
        .and_then(|d| cursor.checked_add_signed(d))
        .unwrap_or(cursor)
}

fn shift_months(cursor: DateTime<Utc>, months: i64) -> DateTime<Utc> {
    let Ok(amount) = u32::try_from(months.unsigned_abs()) else {
        return cursor;
    };
    let shifted = if months >= 0 {
        cursor.checked_add_months(Months::new(amount))
    } else {
        cursor.checked_sub_months(Months::new(amount))
    };
    shifted.unwrap_or(cursor)
}

fn days_in_month(dt: &DateTime<Utc>) -> u32 {
    let (year, month) = (dt.year(), dt.month());
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first_next| first_next.pred_opt())
        .map(|last| last.day())
        .unwrap_or(30)
}

impl fmt::Display for ISO8601Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}P{}Y{}M{}W{}DT{}H{}M{}S",
            if self.positive { '+' } else { '-' },
            self.years,
            self.months,
            self.weeks,
            self.days,
            self.hours,
            self.minutes,
            self.seconds
        )
    }
}

impl FromStr for ISO8601Duration {
    type Err = BadInputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ISO8601Duration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ISO8601Duration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

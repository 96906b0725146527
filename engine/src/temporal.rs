//! FILENAME: engine/src/temporal.rs
//! PURPOSE: Calendar date, time of day and interval values with carry-aware arithmetic.
//! CONTEXT: Datetime Results hold a TemporalValue. Dates use the proleptic
//! Gregorian calendar with full years and 1-based months; intervals keep raw
//! field counts and never consult the calendar.
//!
//! DAY CARRY:
//! Adding months to a date whose day does not exist in the target month
//! truncates to the last day and remembers the surplus (0-3) in `day_carry`.
//! The next month addition adds the carry back before truncating again, so
//! (Jan 31 + 1 month) + 1 month == Jan 31 + 2 months == Mar 31.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

const DAYS_IN_MONTH: [[i32; 12]; 2] = [
    [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31],
    [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31],
];

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Number of days in `month` (1-12) of `year`.
pub fn days_in_month(year: i32, month: i32) -> i32 {
    let index = (month - 1).rem_euclid(12) as usize;
    DAYS_IN_MONTH[usize::from(is_leap_year(year))][index]
}

/// Field order used by slash separated dates the day-first forms reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DateOrder {
    #[default]
    DayFirst,
    MonthFirst,
}

impl DateOrder {
    pub fn for_locale(locale: &str) -> Self {
        if locale.starts_with("en_US") || locale.starts_with("en-US") {
            DateOrder::MonthFirst
        } else {
            DateOrder::DayFirst
        }
    }
}

/// A date, a time of day, both, or an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TemporalValue {
    pub year: i32,
    pub month: i32,
    pub day: i32,
    pub hour: i32,
    pub minute: i32,
    pub second: i32,
    pub date_valid: bool,
    pub time_valid: bool,
    pub interval: bool,
    /// Surplus days truncated by the last month addition, 0-3.
    pub day_carry: u8,
}

impl TemporalValue {
    pub fn date(year: i32, month: i32, day: i32) -> Self {
        TemporalValue {
            year,
            month,
            day,
            date_valid: true,
            ..Default::default()
        }
    }

    pub fn time(hour: i32, minute: i32, second: i32) -> Self {
        TemporalValue {
            hour,
            minute,
            second,
            time_valid: true,
            ..Default::default()
        }
    }

    pub fn datetime(year: i32, month: i32, day: i32, hour: i32, minute: i32, second: i32) -> Self {
        TemporalValue {
            year,
            month,
            day,
            hour,
            minute,
            second,
            date_valid: true,
            time_valid: true,
            ..Default::default()
        }
    }

    pub fn interval(
        years: i32,
        months: i32,
        days: i32,
        hours: i32,
        minutes: i32,
        seconds: i32,
    ) -> Self {
        TemporalValue {
            year: years,
            month: months,
            day: days,
            hour: hours,
            minute: minutes,
            second: seconds,
            interval: true,
            ..Default::default()
        }
    }

    pub fn from_naive(dt: NaiveDateTime) -> Self {
        TemporalValue::datetime(
            dt.year(),
            dt.month() as i32,
            dt.day() as i32,
            dt.hour() as i32,
            dt.minute() as i32,
            dt.second() as i32,
        )
    }

    /// The current local date and time.
    pub fn now() -> Self {
        Self::from_naive(chrono::Local::now().naive_local())
    }

    /// The current local date without time.
    pub fn today() -> Self {
        let today = chrono::Local::now().date_naive();
        TemporalValue::date(today.year(), today.month() as i32, today.day() as i32)
    }

    pub fn naive_date(&self) -> Option<NaiveDate> {
        if !self.date_valid {
            return None;
        }
        NaiveDate::from_ymd_opt(self.year, u32::try_from(self.month).ok()?, u32::try_from(self.day).ok()?)
    }

    pub fn naive_time(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(
            u32::try_from(self.hour).ok()?,
            u32::try_from(self.minute).ok()?,
            u32::try_from(self.second).ok()?,
        )
    }

    /// The value as a chrono datetime; a missing time reads as midnight.
    pub fn naive(&self) -> Option<NaiveDateTime> {
        let date = self.naive_date()?;
        let time = if self.time_valid {
            self.naive_time()?
        } else {
            NaiveTime::MIN
        };
        Some(NaiveDateTime::new(date, time))
    }

    /// Time of day in seconds.
    pub fn seconds_of_day(&self) -> i64 {
        i64::from(self.hour) * 3600 + i64::from(self.minute) * 60 + i64::from(self.second)
    }

    pub fn set_seconds_of_day(&mut self, seconds: i64) {
        self.hour = (seconds / 3600) as i32;
        self.minute = ((seconds % 3600) / 60) as i32;
        self.second = (seconds % 60) as i32;
        self.time_valid = true;
    }

    pub fn compare(&self, other: &Self) -> Ordering {
        let key = |t: &Self| (t.year, t.month, t.day, t.hour, t.minute, t.second);
        key(self).cmp(&key(other))
    }

    // ========================================
    // NORMALIZATION
    // ========================================

    /// Carries seconds into minutes, minutes into hours and hours into days.
    /// None when a field leaves the i32 range.
    fn fix_time_wrap(&mut self) -> Option<()> {
        self.minute = self.minute.checked_add(self.second.div_euclid(60))?;
        self.second = self.second.rem_euclid(60);
        self.hour = self.hour.checked_add(self.minute.div_euclid(60))?;
        self.minute = self.minute.rem_euclid(60);
        self.day = self.day.checked_add(self.hour.div_euclid(24))?;
        self.hour = self.hour.rem_euclid(24);
        Some(())
    }

    fn fix_month_wrap(&mut self) -> Option<()> {
        if self.interval {
            self.year = self.year.checked_add(self.month.div_euclid(12))?;
            self.month = self.month.rem_euclid(12);
        } else {
            let from_zero = self.month.checked_sub(1)?;
            self.year = self.year.checked_add(from_zero.div_euclid(12))?;
            self.month = from_zero.rem_euclid(12) + 1;
        }
        Some(())
    }

    /// Brings the day back into the month. With `carry`, a day past the end of
    /// the month is truncated and the surplus is returned instead of rolling
    /// over into the next month. None when the date leaves the calendar.
    fn fix_day_wrap(&mut self, carry: Option<&mut u8>) -> Option<()> {
        self.fix_month_wrap()?;

        if self.interval {
            return Some(());
        }

        let dim = days_in_month(self.year, self.month);
        if let Some(carry) = carry {
            *carry = 0;
            if self.day > dim {
                *carry = (self.day - dim).min(3) as u8;
                self.day = dim;
            }
        }
        if (1..=dim).contains(&self.day) {
            return Some(());
        }

        let first = NaiveDate::from_ymd_opt(self.year, u32::try_from(self.month).ok()?, 1)?;
        let date = first.checked_add_signed(Duration::try_days(i64::from(self.day) - 1)?)?;
        self.year = date.year();
        self.month = date.month() as i32;
        self.day = date.day() as i32;
        Some(())
    }

    // ========================================
    // ARITHMETIC
    // ========================================

    /// Adds a number: seconds for intervals, full datetimes and times,
    /// days for date-only values. None when the result leaves the range.
    pub fn add_number(&self, number: i64) -> Option<Self> {
        let mut result = *self;

        if self.interval {
            result.second = i32::try_from(i64::from(result.second).checked_add(number)?).ok()?;
            result.fix_time_wrap()?;
            result.fix_day_wrap(None)?;
            Some(result)
        } else if self.date_valid && self.time_valid {
            let shifted = self.naive()?.checked_add_signed(Duration::try_seconds(number)?)?;
            let mut shifted = Self::from_naive(shifted);
            shifted.day_carry = self.day_carry;
            Some(shifted)
        } else if self.date_valid {
            result.day = i32::try_from(i64::from(result.day).checked_add(number)?).ok()?;
            result.fix_day_wrap(None)?;
            Some(result)
        } else if self.time_valid {
            let seconds = (self.seconds_of_day() + number.rem_euclid(86_400)).rem_euclid(86_400);
            result.set_seconds_of_day(seconds);
            result.year = 0;
            result.month = 0;
            result.day = 0;
            Some(result)
        } else {
            None
        }
    }

    /// Adds an interval. Time fields are added first, then years and months
    /// together with the pending day carry, then the interval's days.
    /// None when a field overflows or the date leaves the calendar.
    pub fn add_interval(&self, interval: &Self) -> Option<Self> {
        let mut result = *self;

        if self.interval {
            result.year = result.year.checked_add(interval.year)?;
            result.month = result.month.checked_add(interval.month)?;
            result.day = result.day.checked_add(interval.day)?;
            result.hour = result.hour.checked_add(interval.hour)?;
            result.minute = result.minute.checked_add(interval.minute)?;
            result.second = result.second.checked_add(interval.second)?;
            result.fix_time_wrap()?;
            result.fix_day_wrap(None)?;
            result.day_carry = 0;
            return Some(result);
        }

        let adds_date = interval.year != 0 || interval.month != 0 || interval.day != 0;
        let adds_time = interval.hour != 0 || interval.minute != 0 || interval.second != 0;
        result.date_valid = self.date_valid || adds_date;
        result.time_valid = self.time_valid || adds_time;

        let mut extra_days = interval.day;

        if result.time_valid {
            let day_before = result.day;
            result.hour = result.hour.checked_add(interval.hour)?;
            result.minute = result.minute.checked_add(interval.minute)?;
            result.second = result.second.checked_add(interval.second)?;
            result.fix_time_wrap()?;
            extra_days = extra_days.checked_add(result.day.checked_sub(day_before)?)?;
            result.day = day_before;
        }

        if !result.date_valid {
            return Some(result);
        }

        result.year = result.year.checked_add(interval.year)?;
        result.month = result.month.checked_add(interval.month)?;
        result.day += i32::from(self.day_carry);

        let mut carry = 0u8;
        result.fix_day_wrap(Some(&mut carry))?;
        result.day_carry = carry;

        if extra_days != 0 {
            result.day_carry = 0;
            result.day = result.day.checked_add(extra_days)?;
            result.fix_day_wrap(None)?;
        }

        Some(result)
    }

    /// `self - other`: subtracting an interval negates it, subtracting
    /// two datetimes yields the interval between them. None for an interval
    /// minus a datetime and on overflow.
    pub fn sub(&self, other: &Self) -> Option<Self> {
        if other.interval {
            return self.add_interval(&other.negated()?);
        }
        if self.interval {
            return None;
        }

        let mut result = TemporalValue::interval(
            self.year.checked_sub(other.year)?,
            self.month.checked_sub(other.month)?,
            self.day.checked_sub(other.day)?,
            self.hour.checked_sub(other.hour)?,
            self.minute.checked_sub(other.minute)?,
            self.second.checked_sub(other.second)?,
        );
        result.fix_time_wrap()?;
        result.fix_day_wrap(None)?;
        Some(result)
    }

    pub fn negated(&self) -> Option<Self> {
        Some(TemporalValue {
            year: self.year.checked_neg()?,
            month: self.month.checked_neg()?,
            day: self.day.checked_neg()?,
            hour: self.hour.checked_neg()?,
            minute: self.minute.checked_neg()?,
            second: self.second.checked_neg()?,
            ..*self
        })
    }

    // ========================================
    // PARSING
    // ========================================

    /// Parses a datetime, falling back to an interval.
    pub fn parse(text: &str, order: DateOrder) -> Option<Self> {
        parse_datetime(text, order).or_else(|| parse_interval(text))
    }
}

impl fmt::Display for TemporalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.interval {
            let parts = [
                (self.year, "years"),
                (self.month, "months"),
                (self.day, "days"),
                (self.hour, "hours"),
                (self.minute, "minutes"),
                (self.second, "seconds"),
            ];
            let mut written = false;
            for (value, unit) in parts.iter().filter(|(v, _)| *v != 0) {
                if written {
                    write!(f, " ")?;
                }
                write!(f, "{} {}", value, unit)?;
                written = true;
            }
            if !written {
                write!(f, "0 seconds")?;
            }
            return Ok(());
        }

        if self.date_valid {
            write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)?;
        }
        if self.time_valid {
            if self.date_valid {
                write!(f, " ")?;
            }
            write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)?;
        }
        Ok(())
    }
}

// ========================================
// DATETIME PARSER
// ========================================

struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Scanner {
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    /// Reads 1..=max digits, returning the value and the digit count.
    fn number(&mut self, max: usize) -> Option<(i32, usize)> {
        let start = self.pos;
        let mut value: i32 = 0;
        while self.pos - start < max {
            match self.peek() {
                Some(b @ b'0'..=b'9') => {
                    value = value.checked_mul(10)?.checked_add(i32::from(b - b'0'))?;
                    self.pos += 1;
                }
                _ => break,
            }
        }
        let count = self.pos - start;
        if count == 0 {
            None
        } else {
            Some((value, count))
        }
    }

    fn rest_lowercase(&self) -> String {
        String::from_utf8_lossy(&self.bytes[self.pos..]).to_ascii_lowercase()
    }
}

fn valid_date(year: i32, month: i32, day: i32) -> bool {
    (1..=12).contains(&month) && day >= 1 && day <= days_in_month(year, month)
}

fn expand_two_digit_year(year: i32) -> i32 {
    if year < 69 {
        2000 + year
    } else {
        1900 + year
    }
}

fn parse_slash_date(s: &mut Scanner, order: DateOrder) -> Option<(i32, i32, i32)> {
    let start = s.pos;
    let parsed = (|| {
        let (first, _) = s.number(2)?;
        if !s.eat(b'/') {
            return None;
        }
        let (second, _) = s.number(2)?;
        if !s.eat(b'/') {
            return None;
        }
        let (year, digits) = s.number(4)?;
        let year = if digits <= 2 {
            expand_two_digit_year(year)
        } else {
            year
        };
        Some((first, second, year))
    })();

    let result = parsed.and_then(|(first, second, year)| {
        if valid_date(year, second, first) {
            Some((year, second, first))
        } else if order == DateOrder::MonthFirst && valid_date(year, first, second) {
            Some((year, first, second))
        } else {
            None
        }
    });

    if result.is_none() {
        s.pos = start;
    }
    result
}

fn parse_iso_date(s: &mut Scanner) -> Option<(i32, i32, i32)> {
    let start = s.pos;
    let parsed = (|| {
        let (year, _) = s.number(6)?;
        if !s.eat(b'-') {
            return None;
        }
        let (month, _) = s.number(2)?;
        if !s.eat(b'-') {
            return None;
        }
        let (day, _) = s.number(2)?;
        valid_date(year, month, day).then_some((year, month, day))
    })();
    if parsed.is_none() {
        s.pos = start;
    }
    parsed
}

/// Applies an am/pm marker to a 12 hour clock value.
fn apply_meridiem(hour: i32, pm: bool) -> Option<i32> {
    if !(1..=12).contains(&hour) {
        return None;
    }
    Some(match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, true) => h + 12,
        (h, false) => h,
    })
}

fn parse_meridiem(s: &mut Scanner) -> Option<bool> {
    let rest = s.rest_lowercase();
    for (marker, pm) in [("pm", true), ("am", false), ("p", true), ("a", false)] {
        if rest.starts_with(marker) {
            s.pos += marker.len();
            return Some(pm);
        }
    }
    None
}

/// Skips a trailing zone (Z, +HH, +HH:MM, -HHMM). Zones are not applied.
fn parse_zone(s: &mut Scanner) {
    if s.eat(b'Z') {
        return;
    }
    let start = s.pos;
    if (s.eat(b'+') || s.eat(b'-')) && s.number(2).is_some() {
        let after_hours = s.pos;
        s.eat(b':');
        if s.number(2).is_none() {
            s.pos = after_hours;
        }
        return;
    }
    s.pos = start;
}

fn parse_time(s: &mut Scanner) -> Option<(i32, i32, i32)> {
    let start = s.pos;
    let parsed = (|| {
        let (mut hour, _) = s.number(2)?;
        if !s.eat(b':') {
            return None;
        }
        let (minute, _) = s.number(2)?;
        let mut second = 0;
        if s.eat(b':') {
            second = s.number(2)?.0;
            // Fractional seconds are ignored
            if s.eat(b'.') {
                while matches!(s.peek(), Some(b'0'..=b'9')) {
                    s.pos += 1;
                }
            }
        }
        s.skip_spaces();
        if let Some(pm) = parse_meridiem(s) {
            hour = apply_meridiem(hour, pm)?;
            s.skip_spaces();
        }
        parse_zone(s);

        let valid = (0..24).contains(&hour) && (0..60).contains(&minute) && (0..60).contains(&second);
        valid.then_some((hour, minute, second))
    })();
    if parsed.is_none() {
        s.pos = start;
    }
    parsed
}

/// Legacy all-digit forms: YYYYmmddHHMMSS, YYYYmmdd, HHMMSS and HHMM, the
/// time forms optionally followed by an am/pm marker.
fn parse_all_digits(text: &str) -> Option<Option<TemporalValue>> {
    let lower = text.to_ascii_lowercase();
    let (digits, meridiem) = if let Some(d) = lower.strip_suffix('p') {
        (d, Some(true))
    } else if let Some(d) = lower.strip_suffix('a') {
        (d, Some(false))
    } else {
        (lower.as_str(), None)
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let field = |range: std::ops::Range<usize>| digits[range].parse::<i32>().ok();
    let hour_of = |h: i32| match meridiem {
        Some(pm) => apply_meridiem(h, pm),
        None => Some(h),
    };

    let value = match (digits.len(), meridiem) {
        (14, None) => (|| {
            let v = TemporalValue::datetime(
                field(0..4)?,
                field(4..6)?,
                field(6..8)?,
                field(8..10)?,
                field(10..12)?,
                field(12..14)?,
            );
            (valid_date(v.year, v.month, v.day) && v.hour < 24 && v.minute < 60 && v.second < 60)
                .then_some(v)
        })(),
        (8, None) => (|| {
            let v = TemporalValue::date(field(0..4)?, field(4..6)?, field(6..8)?);
            valid_date(v.year, v.month, v.day).then_some(v)
        })(),
        (6, _) => (|| {
            let v = TemporalValue::time(hour_of(field(0..2)?)?, field(2..4)?, field(4..6)?);
            (v.hour < 24 && v.minute < 60 && v.second < 60).then_some(v)
        })(),
        (4, _) => (|| {
            let v = TemporalValue::time(hour_of(field(0..2)?)?, field(2..4)?, 0);
            (v.hour < 24 && v.minute < 60).then_some(v)
        })(),
        _ => None,
    };
    Some(value)
}

/// Parses a date, a time, or a date followed by a time.
pub fn parse_datetime(text: &str, order: DateOrder) -> Option<TemporalValue> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(legacy) = parse_all_digits(text) {
        return legacy;
    }

    let mut s = Scanner::new(text);
    let date = parse_slash_date(&mut s, order).or_else(|| parse_iso_date(&mut s));

    if date.is_some() && !s.eat(b'T') {
        s.skip_spaces();
    }

    let time = if s.at_end() { None } else { parse_time(&mut s) };

    s.skip_spaces();
    if !s.at_end() {
        return None;
    }

    match (date, time) {
        (Some((y, mo, d)), Some((h, mi, sec))) => Some(TemporalValue::datetime(y, mo, d, h, mi, sec)),
        (Some((y, mo, d)), None) => Some(TemporalValue::date(y, mo, d)),
        (None, Some((h, mi, sec))) => Some(TemporalValue::time(h, mi, sec)),
        (None, None) => None,
    }
}

const UNITS: &[(&str, usize)] = &[
    ("years", 0),
    ("year", 0),
    ("yrs", 0),
    ("yr", 0),
    ("y", 0),
    ("months", 1),
    ("month", 1),
    ("mons", 1),
    ("mon", 1),
    ("mo", 1),
    ("days", 2),
    ("day", 2),
    ("d", 2),
    ("hours", 3),
    ("hour", 3),
    ("hrs", 3),
    ("hr", 3),
    ("h", 3),
    ("minutes", 4),
    ("minute", 4),
    ("mins", 4),
    ("min", 4),
    ("m", 4),
    ("seconds", 5),
    ("second", 5),
    ("secs", 5),
    ("sec", 5),
    ("s", 5),
];

/// Parses "<n> <unit>" pairs such as "1 year 2 months" or "3d 4h".
pub fn parse_interval(text: &str) -> Option<TemporalValue> {
    let lower = text.to_ascii_lowercase();
    let mut rest = lower.trim_start();
    let mut fields = [0i32; 6];

    while !rest.is_empty() {
        let sign_len = usize::from(rest.starts_with('-') || rest.starts_with('+'));
        let digits_len = rest[sign_len..]
            .bytes()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if digits_len == 0 {
            return None;
        }
        let number: i32 = rest[..sign_len + digits_len].parse().ok()?;
        rest = rest[sign_len + digits_len..].trim_start();

        let (unit, field) = UNITS.iter().find(|(unit, _)| rest.starts_with(unit))?;
        fields[*field] = number;
        rest = rest[unit.len()..].trim_start();
    }

    if fields.iter().all(|f| *f == 0) {
        return None;
    }

    Some(TemporalValue::interval(
        fields[0], fields[1], fields[2], fields[3], fields[4], fields[5],
    ))
}

//! FILENAME: engine/src/functions/datetime.rs
//! PURPOSE: Datetime builtins: conversion, field access, week numbers and
//! date/time part replacement.

use chrono::Datelike;

use super::{surface_errors, FnResult};
use crate::evaluator::EvalEnv;
use crate::temporal::{days_in_month, parse_datetime, parse_interval, TemporalValue};
use crate::value::{ResultValue, ValueKind};

/// The datetime operand, or "invalid operand(s)". Nulls are accepted here;
/// callers decide what a null produces.
fn datetime_operand(arg: &ResultValue) -> Result<&TemporalValue, ResultValue> {
    if arg.kind() != ValueKind::Datetime {
        return Err(ResultValue::invalid_operands());
    }
    arg.datetime_ref().ok_or_else(ResultValue::invalid_operands)
}

/// A datetime operand that must not be an interval.
fn calendar_operand(arg: &ResultValue) -> Result<&TemporalValue, ResultValue> {
    let dt = datetime_operand(arg)?;
    if dt.interval {
        return Err(ResultValue::invalid_operands());
    }
    Ok(dt)
}

/// stodt(s): parses a datetime, then an interval. Datetimes pass through.
pub(super) fn stodt(args: &[&ResultValue], env: &EvalEnv<'_>) -> FnResult {
    surface_errors(args)?;
    let arg = args[0];
    match arg.kind() {
        ValueKind::Datetime | ValueKind::String if arg.is_null() => {
            Err(ResultValue::null(ValueKind::Datetime))
        }
        ValueKind::Datetime => Ok(arg.clone()),
        ValueKind::String => {
            let text = arg.as_str().unwrap_or_default();
            parse_datetime(text, env.date_order)
                .or_else(|| parse_interval(text))
                .map(ResultValue::datetime)
                .ok_or_else(ResultValue::invalid_operands)
        }
        _ => Err(ResultValue::invalid_operands()),
    }
}

/// dtos(dt): the date part in the locale's date format.
pub(super) fn dtos(args: &[&ResultValue], env: &EvalEnv<'_>) -> FnResult {
    surface_errors(args)?;
    let dt = calendar_operand(args[0])?;
    if args[0].is_null() || !dt.date_valid {
        return Err(ResultValue::null(ValueKind::String));
    }
    let pattern = super::format::locale_date_pattern(env.date_order);
    super::format::strftime(dt, pattern)
        .map(ResultValue::string)
        .ok_or_else(ResultValue::invalid_operands)
}

/// year(), month(), day(): intervals report their raw field.
pub(super) fn date_part<F>(args: &[&ResultValue], field: F) -> FnResult
where
    F: Fn(&TemporalValue) -> i64,
{
    surface_errors(args)?;
    let dt = datetime_operand(args[0])?;
    if args[0].is_null() || (!dt.interval && !dt.date_valid) {
        return Err(ResultValue::null(ValueKind::Number));
    }
    Ok(ResultValue::from_i64(field(dt)))
}

/// dim(dt): days in the month of a date.
pub(super) fn dim(args: &[&ResultValue]) -> FnResult {
    surface_errors(args)?;
    let dt = calendar_operand(args[0])?;
    if args[0].is_null() || !dt.date_valid {
        return Err(ResultValue::null(ValueKind::Number));
    }
    Ok(ResultValue::from_i64(i64::from(days_in_month(dt.year, dt.month))))
}

#[derive(Debug, Clone, Copy)]
pub(super) enum WeekStart {
    /// Weeks start on Sunday; days before the first Sunday are week 0.
    Sunday,
    /// Weeks start on Monday; days before the first Monday are week 0.
    Monday,
    /// ISO 8601 week number.
    Iso,
}

fn week_number(date: chrono::NaiveDate, start: WeekStart) -> i64 {
    let yday = i64::from(date.ordinal0());
    match start {
        WeekStart::Sunday => {
            let wday = i64::from(date.weekday().num_days_from_sunday());
            (yday + 7 - wday) / 7
        }
        WeekStart::Monday => {
            let wday = i64::from(date.weekday().num_days_from_monday());
            (yday + 7 - wday) / 7
        }
        WeekStart::Iso => i64::from(date.iso_week().week()),
    }
}

/// A non-null calendar date operand, or the early null/error result.
fn week_date(arg: &ResultValue) -> Result<chrono::NaiveDate, ResultValue> {
    let dt = calendar_operand(arg)?;
    if arg.is_null() || !dt.date_valid {
        return Err(ResultValue::null(ValueKind::Number));
    }
    dt.naive_date().ok_or_else(ResultValue::invalid_operands)
}

/// wiy(), wiy1(), stdwiy().
pub(super) fn week_of_year(args: &[&ResultValue], start: WeekStart) -> FnResult {
    surface_errors(args)?;
    let date = week_date(args[0])?;
    Ok(ResultValue::from_i64(week_number(date, start)))
}

/// wiyo(dt, offset): week of year with weeks starting `offset` days after
/// Sunday. A shifted date falling back into the previous year counts as
/// week 0.
pub(super) fn wiyo(args: &[&ResultValue], env: &EvalEnv<'_>) -> FnResult {
    surface_errors(args)?;
    calendar_operand(args[0])?;
    if args[1].kind() != ValueKind::Number {
        return Err(ResultValue::invalid_operands());
    }
    if args.iter().any(|a| a.is_null()) {
        return Err(ResultValue::null(ValueKind::Number));
    }
    let date = week_date(args[0])?;
    let offset = args[1]
        .as_number()
        .and_then(|n| n.to_i64_rounded(env.numeric))
        .ok_or_else(ResultValue::invalid_operands)?
        .rem_euclid(7);

    let week = week_number(date, WeekStart::Sunday);
    let shifted = date
        .checked_sub_signed(chrono::Duration::days(offset))
        .ok_or_else(ResultValue::invalid_operands)?;
    let shifted_week = week_number(shifted, WeekStart::Sunday);

    Ok(ResultValue::from_i64(if shifted_week > week { 0 } else { shifted_week }))
}

/// dateof(dt): the date part; intervals keep their date fields.
pub(super) fn dateof(args: &[&ResultValue]) -> FnResult {
    surface_errors(args)?;
    let dt = datetime_operand(args[0])?;
    if args[0].is_null() || (!dt.interval && !dt.date_valid) {
        return Err(ResultValue::null(ValueKind::Datetime));
    }
    let mut result = *dt;
    result.hour = 0;
    result.minute = 0;
    result.second = 0;
    result.time_valid = false;
    Ok(ResultValue::datetime(result))
}

/// timeof(dt): the time part; intervals keep their time fields.
pub(super) fn timeof(args: &[&ResultValue]) -> FnResult {
    surface_errors(args)?;
    let dt = datetime_operand(args[0])?;
    if args[0].is_null() || (!dt.interval && !dt.time_valid) {
        return Err(ResultValue::null(ValueKind::Datetime));
    }
    let mut result = *dt;
    result.year = 0;
    result.month = 0;
    result.day = 0;
    result.date_valid = false;
    result.day_carry = 0;
    Ok(ResultValue::datetime(result))
}

fn replace_part<F>(args: &[&ResultValue], replace: F) -> FnResult
where
    F: Fn(&mut TemporalValue, &TemporalValue),
{
    surface_errors(args)?;
    let target = calendar_operand(args[0])?;
    let donor = calendar_operand(args[1])?;
    if args.iter().any(|a| a.is_null()) {
        return Err(ResultValue::null(ValueKind::Datetime));
    }
    let mut result = *target;
    replace(&mut result, donor);
    if !result.date_valid && !result.time_valid {
        return Err(ResultValue::null(ValueKind::Datetime));
    }
    Ok(ResultValue::datetime(result))
}

/// chgdateof(a, b): a with the date of b.
pub(super) fn chgdateof(args: &[&ResultValue]) -> FnResult {
    replace_part(args, |result, donor| {
        result.year = donor.year;
        result.month = donor.month;
        result.day = donor.day;
        result.date_valid = donor.date_valid;
        result.day_carry = 0;
    })
}

/// chgtimeof(a, b): a with the time of b.
pub(super) fn chgtimeof(args: &[&ResultValue]) -> FnResult {
    replace_part(args, |result, donor| {
        result.hour = donor.hour;
        result.minute = donor.minute;
        result.second = donor.second;
        result.time_valid = donor.time_valid;
    })
}

pub(super) fn gettimeinsecs(args: &[&ResultValue]) -> FnResult {
    surface_errors(args)?;
    let dt = calendar_operand(args[0])?;
    if args[0].is_null() || !dt.time_valid {
        return Err(ResultValue::null(ValueKind::Number));
    }
    Ok(ResultValue::from_i64(dt.seconds_of_day()))
}

/// settimeinsecs(dt, seconds): seconds must be within one day.
pub(super) fn settimeinsecs(args: &[&ResultValue], env: &EvalEnv<'_>) -> FnResult {
    surface_errors(args)?;
    let dt = calendar_operand(args[0])?;
    if args[1].kind() != ValueKind::Number {
        return Err(ResultValue::invalid_operands());
    }
    if args.iter().any(|a| a.is_null()) {
        return Err(ResultValue::null(ValueKind::Datetime));
    }
    let seconds = args[1]
        .as_number()
        .and_then(|n| n.to_i64_rounded(env.numeric))
        .filter(|s| (0..86_400).contains(s))
        .ok_or_else(ResultValue::invalid_operands)?;

    let mut result = *dt;
    result.set_seconds_of_day(seconds);
    Ok(ResultValue::datetime(result))
}

/// interval("1 year 2 months") or interval(y, mo, d, h, mi, s).
pub(super) fn interval(args: &[&ResultValue], env: &EvalEnv<'_>) -> FnResult {
    if args.len() != 1 && args.len() != 6 {
        return Err(ResultValue::invalid_operands());
    }
    surface_errors(args)?;

    let expected = if args.len() == 6 {
        ValueKind::Number
    } else {
        ValueKind::String
    };
    if args.iter().any(|a| a.kind() != expected) {
        return Err(ResultValue::invalid_operands());
    }
    if args.iter().any(|a| a.is_null()) {
        return Err(ResultValue::null(ValueKind::Datetime));
    }

    if let [text] = args {
        return parse_interval(text.as_str().unwrap_or_default())
            .map(ResultValue::datetime)
            .ok_or_else(ResultValue::invalid_operands);
    }

    let mut fields = [0i32; 6];
    for (field, arg) in fields.iter_mut().zip(args) {
        *field = arg
            .as_number()
            .and_then(|n| n.to_i64_rounded(env.numeric))
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(ResultValue::invalid_operands)?;
    }
    let [years, months, days, hours, minutes, seconds] = fields;
    Ok(ResultValue::datetime(TemporalValue::interval(
        years, months, days, hours, minutes, seconds,
    )))
}

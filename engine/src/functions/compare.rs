//! FILENAME: engine/src/functions/compare.rs
//! PURPOSE: Comparison, conditional and null/conversion builtins.

use std::cmp::Ordering;

use super::{null_if_any, surface_errors, FnResult};
use crate::evaluator::EvalEnv;
use crate::temporal::TemporalValue;
use crate::value::{Payload, ResultValue, ValueKind};

/// Datetimes compare on the parts both sides have: full values when both
/// carry date and time (or both are intervals), otherwise only the date or
/// only the time. Values with nothing in common are incomparable.
fn compare_datetimes(a: &TemporalValue, b: &TemporalValue) -> Option<Ordering> {
    let date_key = |t: &TemporalValue| (t.year, t.month, t.day);
    let time_key = |t: &TemporalValue| (t.hour, t.minute, t.second);

    if (a.date_valid && a.time_valid && b.date_valid && b.time_valid) || (a.interval && b.interval) {
        Some(a.compare(b))
    } else if a.date_valid && b.date_valid {
        Some(date_key(a).cmp(&date_key(b)))
    } else if a.time_valid && b.time_valid {
        Some(time_key(a).cmp(&time_key(b)))
    } else {
        None
    }
}

/// Compares two operands of the same kind. Mismatched kinds re-surface an
/// operand error or fail with "invalid operand(s)".
fn compare_operands(args: &[&ResultValue]) -> Result<Option<Ordering>, ResultValue> {
    let (a, b) = (args[0], args[1]);
    if a.kind() != b.kind() {
        surface_errors(args)?;
        return Err(ResultValue::invalid_operands());
    }
    surface_errors(args)?;
    null_if_any(args, ValueKind::Number)?;

    Ok(match (a.payload(), b.payload()) {
        (Payload::Number(x), Payload::Number(y)) => Some(x.compare(y)),
        (Payload::String(x), Payload::String(y)) => Some(x.as_str().cmp(y.as_str())),
        (Payload::Datetime(x), Payload::Datetime(y)) => compare_datetimes(x, y),
        _ => None,
    })
}

/// eq() and ne(): incomparable datetimes are unequal.
pub(super) fn equality<F>(args: &[&ResultValue], accept: F) -> FnResult
where
    F: Fn(Ordering) -> bool,
{
    let ordering = compare_operands(args)?;
    let equal = ordering == Some(Ordering::Equal);
    let result = accept(if equal { Ordering::Equal } else { Ordering::Less });
    Ok(ResultValue::from_bool(result))
}

/// lt(), le(), gt(), ge(): incomparable datetimes compare false.
pub(super) fn ordering<F>(args: &[&ResultValue], accept: F) -> FnResult
where
    F: Fn(Ordering) -> bool,
{
    let result = compare_operands(args)?.map(accept).unwrap_or(false);
    Ok(ResultValue::from_bool(result))
}

/// iif(cond, then, else). The condition is rounded to an integer first.
pub(super) fn iif(args: &[&ResultValue], env: &EvalEnv<'_>) -> FnResult {
    let condition = args[0]
        .as_number()
        .ok_or_else(ResultValue::invalid_operands)?;
    let truth = condition
        .to_i64_rounded(env.numeric)
        .map(|v| v != 0)
        .unwrap_or(true);

    let chosen = if truth { args[1] } else { args[2] };
    surface_errors(&[chosen])?;
    Ok(chosen.clone())
}

/// val(): numbers pass through, strings are parsed.
pub(super) fn val(args: &[&ResultValue], env: &EvalEnv<'_>) -> FnResult {
    if args[0].kind() == ValueKind::Datetime {
        return Err(ResultValue::invalid_operands());
    }
    Ok(args[0].to_number(env.numeric))
}

pub(super) fn isnull(args: &[&ResultValue]) -> FnResult {
    surface_errors(args)?;
    Ok(ResultValue::from_bool(args[0].is_null()))
}

/// null(x): a null of x's kind.
pub(super) fn null(args: &[&ResultValue]) -> FnResult {
    surface_errors(args)?;
    Ok(ResultValue::null(args[0].kind()))
}

/// error(message) turns a string into an Error.
pub(super) fn error(args: &[&ResultValue]) -> FnResult {
    let arg = args[0];
    if arg.is_null() {
        return Err(ResultValue::invalid_operands());
    }
    match arg.payload() {
        Payload::String(message) | Payload::Error(message) => {
            Ok(ResultValue::error(message.clone()))
        }
        _ => Err(ResultValue::invalid_operands()),
    }
}

//! FILENAME: engine/src/functions/arithmetic.rs
//! PURPOSE: Arithmetic, logical and bitwise builtins.
//! CONTEXT: `add` and `sub` also carry the datetime arithmetic: numbers
//! added to dates count days, numbers added to datetimes, times and
//! intervals count seconds, and intervals added to dates use calendar
//! addition with day carry.

use rand::Rng;

use super::{at_least, check_all, surface_errors, FnResult};
use crate::evaluator::EvalEnv;
use crate::numeric::NumericValue;
use crate::temporal::TemporalValue;
use crate::value::{ResultValue, ValueKind};

/// Operands that passed `check_all(.., Number, ..)`.
fn numbers<'a>(args: &[&'a ResultValue]) -> Vec<&'a NumericValue> {
    args.iter().filter_map(|a| a.as_number()).collect()
}

fn count_kind(args: &[&ResultValue], kind: ValueKind) -> usize {
    args.iter().filter(|a| a.kind() == kind).count()
}

/// Whole seconds or days for datetime arithmetic. Fractions are dropped.
fn whole(n: &NumericValue) -> Result<i64, ResultValue> {
    n.trunc().to_i64().ok_or_else(ResultValue::invalid_operands)
}

/// A running value of a mixed number/datetime fold.
enum Term {
    Number(NumericValue),
    Datetime(TemporalValue),
}

impl Term {
    fn of(value: &ResultValue) -> Result<Term, ResultValue> {
        if let Some(n) = value.as_number() {
            Ok(Term::Number(n.clone()))
        } else if let Some(dt) = value.as_datetime() {
            Ok(Term::Datetime(*dt))
        } else {
            Err(ResultValue::invalid_operands())
        }
    }

    fn into_value(self) -> ResultValue {
        match self {
            Term::Number(n) => ResultValue::number(n),
            Term::Datetime(dt) => ResultValue::datetime(dt),
        }
    }
}

fn out_of_range() -> ResultValue {
    ResultValue::error("datetime out of range")
}

fn shift_datetime(dt: &TemporalValue, by: i64) -> Result<TemporalValue, ResultValue> {
    dt.add_number(by).ok_or_else(out_of_range)
}

/// Null check for a mixed fold: a datetime result when any datetime takes part.
fn mixed_null_check(args: &[&ResultValue]) -> Result<(), ResultValue> {
    if args.iter().any(|a| a.is_null()) {
        Err(ResultValue::null(ValueKind::Datetime))
    } else {
        Ok(())
    }
}

pub(super) fn add(args: &[&ResultValue], env: &EvalEnv<'_>) -> FnResult {
    at_least(args, 2)?;
    surface_errors(args)?;

    let n_numbers = count_kind(args, ValueKind::Number);
    let n_strings = count_kind(args, ValueKind::String);
    let n_datetimes = count_kind(args, ValueKind::Datetime);

    if n_numbers == args.len() {
        check_all(args, ValueKind::Number, ValueKind::Number)?;
        let mut operands = numbers(args).into_iter();
        let first = operands.next().cloned().unwrap_or_else(NumericValue::zero);
        let sum = operands.fold(first, |acc, n| acc.add(n, env.numeric));
        return Ok(ResultValue::number(sum));
    }

    if n_strings == args.len() {
        check_all(args, ValueKind::String, ValueKind::String)?;
        let joined: String = args.iter().filter_map(|a| a.as_str()).collect();
        return Ok(ResultValue::string(joined));
    }

    if n_datetimes == 0 || n_datetimes + n_numbers != args.len() {
        return Err(ResultValue::invalid_operands());
    }
    mixed_null_check(args)?;

    let mut acc = Term::of(args[0])?;
    for arg in &args[1..] {
        acc = match (acc, Term::of(arg)?) {
            (Term::Number(a), Term::Number(b)) => Term::Number(a.add(&b, env.numeric)),
            (Term::Number(n), Term::Datetime(dt)) | (Term::Datetime(dt), Term::Number(n)) => {
                Term::Datetime(shift_datetime(&dt, whole(&n)?)?)
            }
            (Term::Datetime(a), Term::Datetime(b)) => {
                if !a.interval && !b.interval {
                    return Err(ResultValue::invalid_operands());
                }
                let sum = if a.interval && !b.interval {
                    b.add_interval(&a)
                } else {
                    a.add_interval(&b)
                };
                Term::Datetime(sum.ok_or_else(out_of_range)?)
            }
        };
    }
    Ok(acc.into_value())
}

pub(super) fn sub(args: &[&ResultValue], env: &EvalEnv<'_>) -> FnResult {
    at_least(args, 2)?;
    surface_errors(args)?;

    let n_numbers = count_kind(args, ValueKind::Number);
    let n_datetimes = count_kind(args, ValueKind::Datetime);

    if n_numbers == args.len() {
        check_all(args, ValueKind::Number, ValueKind::Number)?;
        let mut operands = numbers(args).into_iter();
        let first = operands.next().cloned().unwrap_or_else(NumericValue::zero);
        let difference = operands.fold(first, |acc, n| acc.sub(n, env.numeric));
        return Ok(ResultValue::number(difference));
    }

    if n_datetimes == 0 || n_datetimes + n_numbers != args.len() {
        return Err(ResultValue::invalid_operands());
    }
    mixed_null_check(args)?;

    let mut acc = Term::of(args[0])?;
    for arg in &args[1..] {
        acc = match (acc, Term::of(arg)?) {
            (Term::Number(a), Term::Number(b)) => Term::Number(a.sub(&b, env.numeric)),
            (Term::Datetime(dt), Term::Number(n)) => {
                let by = whole(&n)?.checked_neg().ok_or_else(out_of_range)?;
                Term::Datetime(shift_datetime(&dt, by)?)
            }
            (Term::Number(_), Term::Datetime(_)) => return Err(ResultValue::invalid_operands()),
            (Term::Datetime(a), Term::Datetime(b)) => {
                if a.interval && !b.interval {
                    return Err(ResultValue::invalid_operands());
                }
                Term::Datetime(a.sub(&b).ok_or_else(out_of_range)?)
            }
        };
    }
    Ok(acc.into_value())
}

pub(super) fn mul(args: &[&ResultValue], env: &EvalEnv<'_>) -> FnResult {
    at_least(args, 2)?;
    check_all(args, ValueKind::Number, ValueKind::Number)?;
    let mut operands = numbers(args).into_iter();
    let first = operands.next().cloned().unwrap_or_else(NumericValue::one);
    Ok(ResultValue::number(
        operands.fold(first, |acc, n| acc.mul(n, env.numeric)),
    ))
}

pub(super) fn div(args: &[&ResultValue], env: &EvalEnv<'_>) -> FnResult {
    at_least(args, 2)?;
    check_all(args, ValueKind::Number, ValueKind::Number)?;
    let operands = numbers(args);
    let mut quotient = operands[0].clone();
    for n in &operands[1..] {
        quotient = quotient
            .div(n, env.numeric)
            .ok_or_else(|| ResultValue::error("division by zero"))?;
    }
    Ok(ResultValue::number(quotient))
}

pub(super) fn remainder(args: &[&ResultValue], env: &EvalEnv<'_>) -> FnResult {
    check_all(args, ValueKind::Number, ValueKind::Number)?;
    let operands = numbers(args);
    operands[0]
        .rem(operands[1], env.numeric)
        .map(ResultValue::number)
        .ok_or_else(|| ResultValue::error("division by zero"))
}

pub(super) fn pow(args: &[&ResultValue], env: &EvalEnv<'_>) -> FnResult {
    check_all(args, ValueKind::Number, ValueKind::Number)?;
    let operands = numbers(args);
    operands[0]
        .pow(operands[1], env.numeric)
        .map(ResultValue::number)
        .ok_or_else(ResultValue::invalid_operands)
}

pub(super) fn factorial(args: &[&ResultValue], env: &EvalEnv<'_>) -> FnResult {
    check_all(args, ValueKind::Number, ValueKind::Number)?;
    numbers(args)[0]
        .factorial(env.numeric)
        .map(ResultValue::number)
        .ok_or_else(ResultValue::invalid_operands)
}

pub(super) fn sqr(args: &[&ResultValue], env: &EvalEnv<'_>) -> FnResult {
    check_all(args, ValueKind::Number, ValueKind::Number)?;
    let n = numbers(args)[0];
    Ok(ResultValue::number(n.mul(n, env.numeric)))
}

pub(super) fn sqrt(args: &[&ResultValue], env: &EvalEnv<'_>) -> FnResult {
    check_all(args, ValueKind::Number, ValueKind::Number)?;
    numbers(args)[0]
        .sqrt(env.numeric)
        .map(ResultValue::number)
        .ok_or_else(ResultValue::invalid_operands)
}

pub(super) fn uminus(args: &[&ResultValue]) -> FnResult {
    unary_number(args, |n| n.neg())
}

pub(super) fn abs(args: &[&ResultValue]) -> FnResult {
    unary_number(args, |n| n.abs())
}

/// A one-operand numeric function that cannot fail.
pub(super) fn unary_number<F>(args: &[&ResultValue], f: F) -> FnResult
where
    F: Fn(&NumericValue) -> NumericValue,
{
    check_all(args, ValueKind::Number, ValueKind::Number)?;
    Ok(ResultValue::number(f(numbers(args)[0])))
}

/// inc() and dec(): numbers step by one, datetimes by one day or second.
pub(super) fn step(args: &[&ResultValue], env: &EvalEnv<'_>, by: i64) -> FnResult {
    surface_errors(args)?;
    let arg = args[0];
    match arg.kind() {
        ValueKind::Number => {
            if arg.is_null() {
                return Err(ResultValue::null(ValueKind::Number));
            }
            let n = arg.as_number().ok_or_else(ResultValue::invalid_operands)?;
            Ok(ResultValue::number(n.add(&NumericValue::from_i64(by), env.numeric)))
        }
        ValueKind::Datetime => {
            if arg.is_null() {
                return Err(ResultValue::null(ValueKind::Datetime));
            }
            let dt = arg.as_datetime().ok_or_else(ResultValue::invalid_operands)?;
            Ok(ResultValue::datetime(shift_datetime(dt, by)?))
        }
        _ => Err(ResultValue::invalid_operands()),
    }
}

// ========================================
// LOGIC
// ========================================

pub(super) fn logical(args: &[&ResultValue], conjunction: bool) -> FnResult {
    at_least(args, 2)?;
    check_all(args, ValueKind::Number, ValueKind::Number)?;
    let truth = numbers(args).into_iter().map(|n| !n.is_zero());
    let result = if conjunction {
        truth.fold(true, |acc, t| acc && t)
    } else {
        truth.fold(false, |acc, t| acc || t)
    };
    Ok(ResultValue::from_bool(result))
}

pub(super) fn lnot(args: &[&ResultValue]) -> FnResult {
    check_all(args, ValueKind::Number, ValueKind::Number)?;
    Ok(ResultValue::from_bool(numbers(args)[0].is_zero()))
}

fn integers(args: &[&ResultValue]) -> Result<Vec<i64>, ResultValue> {
    numbers(args).into_iter().map(whole).collect()
}

pub(super) fn bitwise<F>(args: &[&ResultValue], f: F) -> FnResult
where
    F: Fn(i64, i64) -> i64,
{
    at_least(args, 2)?;
    check_all(args, ValueKind::Number, ValueKind::Number)?;
    let values = integers(args)?;
    let result = values[1..].iter().fold(values[0], |acc, &v| f(acc, v));
    Ok(ResultValue::from_i64(result))
}

pub(super) fn not(args: &[&ResultValue]) -> FnResult {
    check_all(args, ValueKind::Number, ValueKind::Number)?;
    Ok(ResultValue::from_i64(!integers(args)?[0]))
}

pub(super) fn shift(args: &[&ResultValue], left: bool) -> FnResult {
    check_all(args, ValueKind::Number, ValueKind::Number)?;
    let values = integers(args)?;
    let by = u32::try_from(values[1]).map_err(|_| ResultValue::invalid_operands())?;
    let shifted = if left {
        values[0].checked_shl(by)
    } else {
        values[0].checked_shr(by)
    };
    shifted
        .map(ResultValue::from_i64)
        .ok_or_else(ResultValue::invalid_operands)
}

pub(super) fn random(env: &EvalEnv<'_>) -> FnResult {
    let sample: f64 = rand::thread_rng().gen();
    NumericValue::from_f64(sample, env.numeric)
        .map(ResultValue::number)
        .ok_or_else(ResultValue::invalid_operands)
}

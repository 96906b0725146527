//! FILENAME: engine/src/functions/strings.rs
//! PURPOSE: String builtins. Lengths and offsets count characters, not bytes.

use super::{at_least, check_all, null_if_any, surface_errors, FnResult};
use crate::evaluator::EvalEnv;
use crate::numeric::NumericValue;
use crate::value::{ResultValue, ValueKind};

/// Checks a (string, number...) operand list and returns the string.
fn string_and_numbers<'a>(args: &[&'a ResultValue]) -> Result<&'a str, ResultValue> {
    surface_errors(args)?;
    if args[0].kind() != ValueKind::String
        || args[1..].iter().any(|a| a.kind() != ValueKind::Number)
    {
        return Err(ResultValue::invalid_operands());
    }
    null_if_any(args, ValueKind::String)?;
    args[0].as_str().ok_or_else(ResultValue::invalid_operands)
}

/// A count operand, rounded; negative counts become 0.
fn count(arg: &ResultValue, env: &EvalEnv<'_>) -> Result<i64, ResultValue> {
    arg.as_number()
        .and_then(|n| n.to_i64_rounded(env.numeric))
        .ok_or_else(ResultValue::invalid_operands)
}

fn char_count(text: &str) -> usize {
    text.chars().count()
}

pub(super) fn concat(args: &[&ResultValue]) -> FnResult {
    at_least(args, 2)?;
    check_all(args, ValueKind::String, ValueKind::String)?;
    Ok(ResultValue::string(
        args.iter().filter_map(|a| a.as_str()).collect::<String>(),
    ))
}

pub(super) fn left(args: &[&ResultValue], env: &EvalEnv<'_>) -> FnResult {
    let text = string_and_numbers(args)?;
    let n = count(args[1], env)?.max(0) as usize;
    Ok(ResultValue::string(text.chars().take(n).collect::<String>()))
}

pub(super) fn right(args: &[&ResultValue], env: &EvalEnv<'_>) -> FnResult {
    let text = string_and_numbers(args)?;
    let n = count(args[1], env)?.max(0) as usize;
    let skip = char_count(text).saturating_sub(n);
    Ok(ResultValue::string(text.chars().skip(skip).collect::<String>()))
}

/// mid(s, offset, length): a positive offset is 1-based from the start,
/// a negative one counts back from the end.
pub(super) fn mid(args: &[&ResultValue], env: &EvalEnv<'_>) -> FnResult {
    let text = string_and_numbers(args)?;
    let offset = count(args[1], env)?;
    let length = count(args[2], env)?.max(0) as usize;
    let total = char_count(text);

    let start = if offset < 0 {
        total.saturating_sub(offset.unsigned_abs() as usize)
    } else if offset > 0 {
        (offset as usize - 1).min(total)
    } else {
        0
    };
    Ok(ResultValue::string(
        text.chars().skip(start).take(length).collect::<String>(),
    ))
}

pub(super) fn map_string<F>(args: &[&ResultValue], f: F) -> FnResult
where
    F: Fn(&str) -> String,
{
    check_all(args, ValueKind::String, ValueKind::String)?;
    let text = args[0].as_str().ok_or_else(ResultValue::invalid_operands)?;
    Ok(ResultValue::string(f(text)))
}

/// First character upper case, the rest lower case.
pub(super) fn proper_case(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

pub(super) fn strlen(args: &[&ResultValue]) -> FnResult {
    check_all(args, ValueKind::String, ValueKind::Number)?;
    let text = args[0].as_str().ok_or_else(ResultValue::invalid_operands)?;
    Ok(ResultValue::from_i64(char_count(text) as i64))
}

/// str(number, width, decimals): fixed notation right-aligned in `width`.
pub(super) fn str(args: &[&ResultValue], env: &EvalEnv<'_>) -> FnResult {
    check_all(args, ValueKind::Number, ValueKind::String)?;
    let value = args[0].as_number().ok_or_else(ResultValue::invalid_operands)?;
    let width = count(args[1], env)?.max(0) as usize;
    let decimals = count(args[2], env)?.max(0) as usize;

    let text = value.to_fixed(decimals, env.numeric.rounding);
    Ok(ResultValue::string(format!("{:>width$}", text, width = width)))
}

/// fxpval(value, digits): a fixed-point value stored as an integer,
/// divided by 10^digits. The value may be given as a string.
pub(super) fn fxpval(args: &[&ResultValue], env: &EvalEnv<'_>) -> FnResult {
    surface_errors(args)?;
    let value_kind = args[0].kind();
    if (value_kind != ValueKind::String && value_kind != ValueKind::Number)
        || args[1].kind() != ValueKind::Number
    {
        return Err(ResultValue::invalid_operands());
    }
    null_if_any(args, ValueKind::Number)?;

    let value = match args[0].as_str() {
        Some(text) => NumericValue::parse(text.trim(), env.numeric).unwrap_or_else(NumericValue::zero),
        None => args[0]
            .as_number()
            .cloned()
            .ok_or_else(ResultValue::invalid_operands)?,
    };
    let digits = args[1].as_number().ok_or_else(ResultValue::invalid_operands)?;
    let scale = NumericValue::from_i64(10)
        .pow(digits, env.numeric)
        .ok_or_else(ResultValue::invalid_operands)?;
    value
        .div(&scale, env.numeric)
        .map(ResultValue::number)
        .ok_or_else(ResultValue::invalid_operands)
}

/// translate(s): no message catalog is loaded, so the text is returned as is.
pub(super) fn translate(args: &[&ResultValue]) -> FnResult {
    if args[0].kind() != ValueKind::String || args[0].is_null() {
        return Err(ResultValue::invalid_operands());
    }
    Ok(args[0].clone())
}

/// translate2(singular, plural, count): returns the singular form.
pub(super) fn translate2(args: &[&ResultValue]) -> FnResult {
    if args.iter().any(|a| a.is_null()) {
        return Err(ResultValue::invalid_operands());
    }
    surface_errors(args)?;
    if args[0].kind() != ValueKind::String
        || args[1].kind() != ValueKind::String
        || args[2].kind() != ValueKind::Number
    {
        return Err(ResultValue::invalid_operands());
    }
    Ok(args[0].clone())
}

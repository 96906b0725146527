//! FILENAME: engine/src/functions/format.rs
//! PURPOSE: printf-style formatting for format(), printf() and dtosf().
//! CONTEXT: A pattern is consumed left to right, one conversion per value.
//! Text before a conversion is copied (`%%` becomes `%`) and the text after
//! the last value's conversion is copied at the end.
//!
//! CONVERSIONS:
//! - numbers: `%d` (legacy: `%N.Pd` prints P decimals in N+P+1 columns),
//!   `%i`, `%x`, `%f`, `%e`, `%g` with the `-`, `0`, `+` and ` ` flags;
//!   `%$d` is the legacy grouping form and prints like `%d`
//! - strings: `%s`, where `%Ns` or `%.Ns` keeps N characters and `% Ns`
//!   also pads on the left to N
//! - datetimes: `!@{strftime}`, or a pattern that from its first `%` on
//!   is a strftime pattern
//! - `!#%...` / `!#{%...}` and `!&%...` / `!&{%...}` are the explicit
//!   number and string forms
//!
//! Null values print nothing. Error values make the whole result an error.

use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt::Write;

use super::{at_least, surface_errors, FnResult};
use crate::evaluator::EvalEnv;
use crate::numeric::{NumericContext, NumericValue};
use crate::temporal::{DateOrder, TemporalValue};
use crate::value::{ResultValue, ValueKind};

const FORMAT_ERROR: &str = "format error";

/// The date pattern `dtos()` and empty datetime formats use.
pub(crate) fn locale_date_pattern(order: DateOrder) -> &'static str {
    match order {
        DateOrder::MonthFirst => "%m/%d/%Y",
        DateOrder::DayFirst => "%d/%m/%Y",
    }
}

/// strftime through chrono. Intervals and invalid patterns give None.
pub(crate) fn strftime(dt: &TemporalValue, pattern: &str) -> Option<String> {
    if dt.interval {
        return None;
    }
    let date = if dt.date_valid {
        dt.naive_date()?
    } else {
        NaiveDate::from_ymd_opt(1900, 1, 1)?
    };
    let time = if dt.time_valid {
        dt.naive_time()?
    } else {
        NaiveTime::MIN
    };

    let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return None;
    }

    let mut out = String::new();
    write!(
        out,
        "{}",
        NaiveDateTime::new(date, time).format_with_items(items.into_iter())
    )
    .ok()?;
    Some(out)
}

// ========================================
// CONVERSION DIRECTIVES
// ========================================

#[derive(Debug, Default, Clone, Copy)]
struct Flags {
    left_align: bool,
    zero_pad: bool,
    plus: bool,
    space: bool,
    alternate: bool,
}

#[derive(Debug, Clone, Copy)]
struct Directive {
    flags: Flags,
    width: Option<usize>,
    precision: Option<usize>,
    conversion: char,
}

impl Directive {
    fn accepts(&self, kind: ValueKind) -> bool {
        match kind {
            ValueKind::Number => matches!(
                self.conversion,
                'd' | 'i' | 'x' | 'X' | 'f' | 'F' | 'e' | 'E' | 'g' | 'G'
            ),
            ValueKind::String => self.conversion == 's',
            _ => false,
        }
    }
}

fn take_digits(text: &str) -> (Option<usize>, &str) {
    let len = text.bytes().take_while(u8::is_ascii_digit).count();
    (text[..len].parse().ok(), &text[len..])
}

/// Parses the part of a conversion after `%`. Returns the directive and the rest.
fn parse_directive(text: &str) -> Option<(Directive, &str)> {
    let mut flags = Flags::default();
    let mut rest = text;
    loop {
        match rest.chars().next() {
            Some('-') => flags.left_align = true,
            Some('0') => flags.zero_pad = true,
            Some('+') => flags.plus = true,
            Some(' ') => flags.space = true,
            Some('#') => flags.alternate = true,
            // Grouping and alternate digits need locale data; accepted and ignored.
            Some('\'') | Some('$') | Some('I') => {}
            _ => break,
        }
        rest = &rest[1..];
    }

    let (width, after_width) = take_digits(rest);
    rest = after_width;
    let mut precision = None;
    if let Some(after_dot) = rest.strip_prefix('.') {
        let (digits, after_precision) = take_digits(after_dot);
        precision = Some(digits.unwrap_or(0));
        rest = after_precision;
    }

    let conversion = rest.chars().next()?;
    Some((
        Directive {
            flags,
            width,
            precision,
            conversion,
        },
        &rest[conversion.len_utf8()..],
    ))
}

// ========================================
// RENDERING
// ========================================

/// Rewrites Rust's `1.5e5` exponent form as C's `1.5e+05`.
fn c_exponent(text: &str, upper: bool) -> String {
    let (mantissa, exponent) = match text.split_once('e') {
        Some(parts) => parts,
        None => return text.to_string(),
    };
    let (sign, digits) = match exponent.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exponent),
    };
    let e = if upper { 'E' } else { 'e' };
    format!("{}{}{}{:0>2}", mantissa, e, sign, digits)
}

fn strip_fraction_zeros(text: &str) -> String {
    let (body, exponent) = match text.find(|c| c == 'e' || c == 'E') {
        Some(pos) => text.split_at(pos),
        None => (text, ""),
    };
    let body = if body.contains('.') {
        body.trim_end_matches('0').trim_end_matches('.')
    } else {
        body
    };
    format!("{}{}", body, exponent)
}

/// `%g`: the shorter of fixed and exponent notation for P significant digits.
fn general(x: f64, precision: usize, upper: bool, alternate: bool) -> String {
    let p = precision.max(1);
    if x == 0.0 {
        return if alternate {
            format!("{:.*}", p - 1, 0.0)
        } else {
            "0".to_string()
        };
    }
    let exponent = x.abs().log10().floor() as i64;
    let text = if exponent < -4 || exponent >= p as i64 {
        c_exponent(&format!("{:.*e}", p - 1, x), upper)
    } else {
        let decimals = (p as i64 - 1 - exponent).max(0) as usize;
        format!("{:.*}", decimals, x)
    };
    if alternate {
        text
    } else {
        strip_fraction_zeros(&text)
    }
}

fn pad_number(text: String, directive: &Directive, width: Option<usize>) -> String {
    let mut text = text;
    if !text.starts_with('-') {
        if directive.flags.plus {
            text.insert(0, '+');
        } else if directive.flags.space {
            text.insert(0, ' ');
        }
    }

    let width = width.unwrap_or(0);
    let len = text.chars().count();
    if len >= width {
        return text;
    }
    let fill = width - len;
    if directive.flags.left_align {
        format!("{}{}", text, " ".repeat(fill))
    } else if directive.flags.zero_pad {
        let sign_len = usize::from(text.starts_with(|c| c == '-' || c == '+' || c == ' '));
        let (sign, digits) = text.split_at(sign_len);
        format!("{}{}{}", sign, "0".repeat(fill), digits)
    } else {
        format!("{}{}", " ".repeat(fill), text)
    }
}

fn render_number(n: &NumericValue, directive: &Directive, ctx: &NumericContext) -> String {
    let mut width = directive.width;
    let text = match directive.conversion {
        'd' => {
            let places = directive.precision.unwrap_or(0);
            if places > 0 {
                width = width.map(|w| w + places + 1);
            }
            n.to_fixed(places, ctx.rounding)
        }
        'i' => n.to_fixed(0, ctx.rounding),
        'x' | 'X' => {
            let value = n.trunc().to_i64().unwrap_or(0);
            let hex = if directive.conversion == 'x' {
                format!("{:x}", value)
            } else {
                format!("{:X}", value)
            };
            if directive.flags.alternate && value != 0 {
                format!("0x{}", hex)
            } else {
                hex
            }
        }
        'e' | 'E' => c_exponent(
            &format!("{:.*e}", directive.precision.unwrap_or(6), n.to_f64()),
            directive.conversion == 'E',
        ),
        'g' | 'G' => general(
            n.to_f64(),
            directive.precision.unwrap_or(6),
            directive.conversion == 'G',
            directive.flags.alternate,
        ),
        _ => n.to_fixed(directive.precision.unwrap_or(6), ctx.rounding),
    };
    pad_number(text, directive, width)
}

fn render_string(s: &str, directive: &Directive) -> String {
    match directive.precision.or(directive.width).filter(|&n| n > 0) {
        Some(limit) => {
            let kept: String = s.chars().take(limit).collect();
            if directive.flags.space {
                let fill = limit - kept.chars().count();
                format!("{}{}", " ".repeat(fill), kept)
            } else {
                kept
            }
        }
        None => s.to_string(),
    }
}

fn render_datetime(value: &ResultValue, pattern: &str) -> String {
    match value.as_datetime() {
        Some(dt) => strftime(dt, pattern).unwrap_or_else(|| dt.to_string()),
        None => String::new(),
    }
}

fn render_directive(value: &ResultValue, directive: &Directive, ctx: &NumericContext) -> String {
    if let Some(n) = value.as_number() {
        render_number(n, directive, ctx)
    } else if let Some(s) = value.as_str() {
        render_string(s, directive)
    } else {
        String::new()
    }
}

/// Copies literal text up to the conversion that consumes `value`, renders
/// the value and returns the unconsumed rest of the pattern.
fn consume<'p>(
    out: &mut String,
    pattern: &'p str,
    value: &ResultValue,
    ctx: &NumericContext,
) -> Result<&'p str, ResultValue> {
    let kind = value.kind();
    let mut rest = pattern;

    while let Some(c) = rest.chars().next() {
        if let Some(after) = rest.strip_prefix("%%") {
            out.push('%');
            rest = after;
            continue;
        }

        if let Some(after) = rest.strip_prefix("!@") {
            if kind != ValueKind::Datetime {
                out.push_str("!@");
                rest = after;
                continue;
            }
            if let Some(bracketed) = after.strip_prefix('{') {
                let end = bracketed
                    .find('}')
                    .ok_or_else(|| ResultValue::error(FORMAT_ERROR))?;
                out.push_str(&render_datetime(value, &bracketed[..end]));
                return Ok(&bracketed[end + 1..]);
            }
            out.push_str(&render_datetime(value, after));
            return Ok("");
        }

        let explicit = if rest.starts_with("!#") {
            Some(ValueKind::Number)
        } else if rest.starts_with("!&") {
            Some(ValueKind::String)
        } else {
            None
        };
        if let Some(explicit_kind) = explicit {
            let after = &rest[2..];
            if explicit_kind != kind {
                out.push_str(&rest[..2]);
                rest = after;
                continue;
            }
            if let Some(bracketed) = after.strip_prefix('{') {
                let end = bracketed
                    .find('}')
                    .ok_or_else(|| ResultValue::error(FORMAT_ERROR))?;
                let inner = bracketed[..end]
                    .strip_prefix('%')
                    .ok_or_else(|| ResultValue::error(FORMAT_ERROR))?;
                let (directive, _) = parse_directive(inner)
                    .filter(|(directive, _)| directive.accepts(kind))
                    .ok_or_else(|| ResultValue::error(FORMAT_ERROR))?;
                out.push_str(&render_directive(value, &directive, ctx));
                return Ok(&bracketed[end + 1..]);
            }
            // Ornament characters before the conversion are dropped.
            let start = after
                .find('%')
                .ok_or_else(|| ResultValue::error(FORMAT_ERROR))?;
            let (directive, remaining) = parse_directive(&after[start + 1..])
                .filter(|(directive, _)| directive.accepts(kind))
                .ok_or_else(|| ResultValue::error(FORMAT_ERROR))?;
            out.push_str(&render_directive(value, &directive, ctx));
            return Ok(remaining);
        }

        if c == '%' {
            if rest.len() == 1 {
                out.push('%');
                return Ok("");
            }
            if kind == ValueKind::Datetime {
                out.push_str(&render_datetime(value, rest));
                return Ok("");
            }
            let (directive, remaining) = parse_directive(&rest[1..])
                .filter(|(directive, _)| directive.accepts(kind))
                .ok_or_else(|| ResultValue::error(FORMAT_ERROR))?;
            out.push_str(&render_directive(value, &directive, ctx));
            return Ok(remaining);
        }

        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    Ok("")
}

/// Formats `values` with `pattern`.
pub fn format_values(pattern: &str, values: &[&ResultValue], ctx: &NumericContext) -> ResultValue {
    let mut out = String::new();
    let mut rest = pattern;

    for value in values {
        if let Some(message) = value.error_message() {
            return ResultValue::error(message);
        }
        rest = match consume(&mut out, rest, value, ctx) {
            Ok(rest) => rest,
            Err(error) => return error,
        };
    }
    out.push_str(&rest.replace("%%", "%"));
    ResultValue::string(out)
}

// ========================================
// BUILTINS
// ========================================

/// The format operand, or None when it is null or empty.
fn pattern_operand(arg: &ResultValue) -> Result<Option<&str>, ResultValue> {
    if arg.kind() != ValueKind::String {
        return Err(ResultValue::invalid_operands());
    }
    Ok(arg.as_str().filter(|s| !s.is_empty()))
}

/// format(value, pattern). An empty pattern picks a default per kind.
pub(super) fn format(args: &[&ResultValue], env: &EvalEnv<'_>) -> FnResult {
    surface_errors(args)?;
    let value = args[0];
    let pattern = match pattern_operand(args[1])? {
        Some(pattern) => pattern,
        None => match value.kind() {
            ValueKind::Number => "%d",
            ValueKind::String => "%s",
            _ if value.is_interval() => return Ok(ResultValue::string("")),
            _ => locale_date_pattern(env.date_order),
        },
    };
    Ok(format_values(pattern, &[value], env.numeric))
}

/// dtosf(datetime, pattern).
pub(super) fn dtosf(args: &[&ResultValue], env: &EvalEnv<'_>) -> FnResult {
    surface_errors(args)?;
    if args[0].kind() != ValueKind::Datetime {
        return Err(ResultValue::invalid_operands());
    }
    let pattern = pattern_operand(args[1])?;
    if args[0].is_interval() {
        return Ok(ResultValue::string(""));
    }
    let pattern = pattern.unwrap_or_else(|| locale_date_pattern(env.date_order));
    Ok(format_values(pattern, &[args[0]], env.numeric))
}

/// printf(pattern, values...).
pub(super) fn printf(args: &[&ResultValue], env: &EvalEnv<'_>) -> FnResult {
    at_least(args, 2)?;
    surface_errors(args)?;
    let pattern = pattern_operand(args[0])?.unwrap_or_default();
    Ok(format_values(pattern, &args[1..], env.numeric))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> NumericContext {
        NumericContext::default()
    }

    fn num(text: &str) -> ResultValue {
        ResultValue::number(NumericValue::parse(text, &ctx()).unwrap())
    }

    fn fmt(pattern: &str, values: &[ResultValue]) -> String {
        let refs: Vec<&ResultValue> = values.iter().collect();
        format_values(pattern, &refs, &ctx()).to_string()
    }

    #[test]
    fn test_legacy_number_conversion() {
        assert_eq!(fmt("%d", &[num("42.7")]), "43");
        assert_eq!(fmt("%5.2d", &[num("3.14159")]), "    3.14");
        assert_eq!(fmt("%.3f", &[num("2.5")]), "2.500");
        assert_eq!(fmt("%05i", &[num("-42")]), "-0042");
        assert_eq!(fmt("%-5i|", &[num("7")]), "7    |");
        assert_eq!(fmt("%+i", &[num("7")]), "+7");
    }

    #[test]
    fn test_exponent_and_general() {
        assert_eq!(fmt("%e", &[num("150000")]), "1.500000e+05");
        assert_eq!(fmt("%.2E", &[num("0.00123")]), "1.23E-03");
        assert_eq!(fmt("%g", &[num("0.001")]), "0.001");
        assert_eq!(fmt("%g", &[num("1234567")]), "1.23457e+06");
        assert_eq!(fmt("%x", &[num("255")]), "ff");
    }

    #[test]
    fn test_string_truncation_and_padding() {
        assert_eq!(fmt("%3s", &[ResultValue::string("abcdef")]), "abc");
        assert_eq!(fmt("[% 5s]", &[ResultValue::string("ab")]), "[   ab]");
        assert_eq!(fmt("!&{%s}!", &[ResultValue::string("x")]), "x!");
    }

    #[test]
    fn test_literals_between_values() {
        let values = [
            num("6"),
            ResultValue::string("apples"),
            ResultValue::datetime(TemporalValue::date(2022, 3, 4)),
        ];
        assert_eq!(
            fmt("You had %d %s on !@{%Y-%m-%d} (100%%)", &values),
            "You had 6 apples on 2022-03-04 (100%)"
        );
    }

    #[test]
    fn test_datetime_rest_of_pattern() {
        let value = ResultValue::datetime(TemporalValue::datetime(2021, 12, 24, 18, 30, 0));
        assert_eq!(fmt("at %H:%M", &[value]), "at 18:30");
    }

    #[test]
    fn test_null_prints_nothing() {
        assert_eq!(
            fmt("[%d]", &[ResultValue::null(ValueKind::Number)]),
            "[]"
        );
    }

    #[test]
    fn test_errors() {
        let error = ResultValue::error("boom");
        assert_eq!(fmt("%d", &[error]), "boom");

        let refs = [&ResultValue::string("x")];
        let result = format_values("%d", &refs, &ctx());
        assert_eq!(result.error_message(), Some("format error"));
    }

    #[test]
    fn test_mismatched_explicit_form_is_literal() {
        assert_eq!(fmt("!#%s", &[ResultValue::string("x")]), "!#x");
    }
}

//! FILENAME: engine/src/value.rs
//! PURPOSE: The tagged, nullable Result every expression node and column produces.
//! CONTEXT: A ResultValue remembers the kind it was created with
//! (`declared_kind`). Evaluation may degrade the payload to an Error while
//! the declared kind stays, so a failed numeric column is still known to be
//! a numeric column. A null value keeps its declared kind too.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::numeric::{NumericContext, NumericValue};
use crate::temporal::{DateOrder, TemporalValue};

/// The four value kinds of the expression language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Error,
    String,
    Number,
    Datetime,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Error => "error",
            ValueKind::String => "string",
            ValueKind::Number => "number",
            ValueKind::Datetime => "datetime",
        };
        write!(f, "{}", name)
    }
}

/// The payload of a ResultValue. Null values carry the zero value of their kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Error(String),
    String(String),
    Number(NumericValue),
    Datetime(TemporalValue),
}

impl Payload {
    fn empty(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Error => Payload::Error(String::new()),
            ValueKind::String => Payload::String(String::new()),
            ValueKind::Number => Payload::Number(NumericValue::zero()),
            ValueKind::Datetime => Payload::Datetime(TemporalValue::default()),
        }
    }

    fn kind(&self) -> ValueKind {
        match self {
            Payload::Error(_) => ValueKind::Error,
            Payload::String(_) => ValueKind::String,
            Payload::Number(_) => ValueKind::Number,
            Payload::Datetime(_) => ValueKind::Datetime,
        }
    }
}

/// Settings used when text coming from a datasource is turned into a value.
#[derive(Debug, Clone, Copy)]
pub struct Coercion<'a> {
    pub numeric: &'a NumericContext,
    pub date_order: DateOrder,
    pub decimal_comma: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultValue {
    declared_kind: ValueKind,
    is_null: bool,
    payload: Payload,
}

impl ResultValue {
    // ========================================
    // CONSTRUCTORS
    // ========================================

    /// A number, or an overflow error when its magnitude is out of range.
    pub fn number(value: NumericValue) -> Self {
        if !value.in_range() {
            let mut overflow = Self::null(ValueKind::Number);
            overflow.degrade("numeric overflow");
            return overflow;
        }
        ResultValue {
            declared_kind: ValueKind::Number,
            is_null: false,
            payload: Payload::Number(value),
        }
    }

    pub fn from_i64(value: i64) -> Self {
        Self::number(NumericValue::from_i64(value))
    }

    pub fn from_bool(value: bool) -> Self {
        Self::number(NumericValue::from_bool(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        ResultValue {
            declared_kind: ValueKind::String,
            is_null: false,
            payload: Payload::String(value.into()),
        }
    }

    pub fn datetime(value: TemporalValue) -> Self {
        ResultValue {
            declared_kind: ValueKind::Datetime,
            is_null: false,
            payload: Payload::Datetime(value),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ResultValue {
            declared_kind: ValueKind::Error,
            is_null: false,
            payload: Payload::Error(message.into()),
        }
    }

    /// The generic evaluation failure.
    pub fn invalid_operands() -> Self {
        Self::error("invalid operand(s)")
    }

    /// A null value of the given kind.
    pub fn null(kind: ValueKind) -> Self {
        ResultValue {
            declared_kind: kind,
            is_null: true,
            payload: Payload::empty(kind),
        }
    }

    /// Converts column text into a value of `kind`.
    ///
    /// `None` is a SQL-style NULL. Text that does not convert degrades the
    /// value to an Error while the declared kind stays `kind`.
    pub fn from_text(kind: ValueKind, text: Option<&str>, coercion: &Coercion<'_>) -> Self {
        let text = match text {
            Some(text) => text,
            None => return Self::null(kind),
        };

        let converted = match kind {
            ValueKind::String => Some(Payload::String(text.to_string())),
            ValueKind::Error => Some(Payload::Error(text.to_string())),
            ValueKind::Number => parse_column_number(text, coercion).map(Payload::Number),
            ValueKind::Datetime => {
                TemporalValue::parse(text, coercion.date_order).map(Payload::Datetime)
            }
        };

        match converted {
            Some(payload) => ResultValue {
                declared_kind: kind,
                is_null: false,
                payload,
            },
            None => {
                let mut value = Self::null(kind);
                value.degrade(format!("invalid {} '{}'", kind, text));
                value
            }
        }
    }

    // ========================================
    // ACCESSORS
    // ========================================

    /// The current kind; Error if evaluation failed.
    pub fn kind(&self) -> ValueKind {
        self.payload.kind()
    }

    pub fn declared_kind(&self) -> ValueKind {
        self.declared_kind
    }

    pub fn is_null(&self) -> bool {
        self.is_null
    }

    pub fn is_error(&self) -> bool {
        matches!(self.payload, Payload::Error(_))
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.payload {
            Payload::Error(message) => Some(message),
            _ => None,
        }
    }

    /// The number, ignoring nullness.
    pub fn number_ref(&self) -> Option<&NumericValue> {
        match &self.payload {
            Payload::Number(n) => Some(n),
            _ => None,
        }
    }

    /// The number if this is a non-null Number.
    pub fn as_number(&self) -> Option<&NumericValue> {
        if self.is_null {
            return None;
        }
        self.number_ref()
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.payload {
            Payload::String(s) if !self.is_null => Some(s),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<&TemporalValue> {
        match &self.payload {
            Payload::Datetime(dt) if !self.is_null => Some(dt),
            _ => None,
        }
    }

    /// The datetime, ignoring nullness.
    pub fn datetime_ref(&self) -> Option<&TemporalValue> {
        match &self.payload {
            Payload::Datetime(dt) => Some(dt),
            _ => None,
        }
    }

    /// Whether this is a Datetime flagged as interval, null or not.
    pub fn is_interval(&self) -> bool {
        self.datetime_ref().map(|dt| dt.interval).unwrap_or(false)
    }

    /// Truth value used by iif() and the logical operators: a non-zero number.
    pub fn is_true(&self) -> bool {
        self.as_number().map(|n| !n.is_zero()).unwrap_or(false)
    }

    // ========================================
    // MUTATION
    // ========================================

    /// Replaces the payload with an error, keeping the declared kind.
    pub fn degrade(&mut self, message: impl Into<String>) {
        self.payload = Payload::Error(message.into());
        self.is_null = false;
    }

    /// Marks the value null without changing its kind.
    pub fn set_null(&mut self) {
        self.is_null = true;
    }

    // ========================================
    // COMPARISON AND CONVERSION
    // ========================================

    /// Equality as used by break detection: two nulls are equal, a null and
    /// a non-null differ, different kinds differ.
    pub fn same_as(&self, other: &ResultValue) -> bool {
        if self.is_null || other.is_null {
            return self.is_null == other.is_null && self.kind() == other.kind();
        }
        match (&self.payload, &other.payload) {
            (Payload::Number(a), Payload::Number(b)) => a.compare(b) == Ordering::Equal,
            (Payload::String(a), Payload::String(b)) => a == b,
            (Payload::Error(a), Payload::Error(b)) => a == b,
            (Payload::Datetime(a), Payload::Datetime(b)) => {
                a.date_valid == b.date_valid
                    && a.time_valid == b.time_valid
                    && a.interval == b.interval
                    && a.compare(b) == Ordering::Equal
            }
            _ => false,
        }
    }

    /// Numeric view of the value as val() sees it. Strings accept the
    /// boolean words yes/true/t and no/false/f in any case.
    pub fn to_number(&self, ctx: &NumericContext) -> ResultValue {
        match &self.payload {
            Payload::Error(message) => ResultValue::error(message.clone()),
            Payload::Datetime(_) => ResultValue::invalid_operands(),
            Payload::Number(n) => {
                if self.is_null {
                    ResultValue::null(ValueKind::Number)
                } else {
                    ResultValue::number(n.clone())
                }
            }
            Payload::String(s) => {
                if self.is_null {
                    return ResultValue::null(ValueKind::Number);
                }
                match boolean_word(s) {
                    Some(b) => ResultValue::from_bool(b),
                    None => match NumericValue::parse(s, ctx) {
                        Some(n) => ResultValue::number(n),
                        None => ResultValue::number(NumericValue::zero()),
                    },
                }
            }
        }
    }
}

impl fmt::Display for ResultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Payload::Error(message) => write!(f, "{}", message),
            _ if self.is_null => Ok(()),
            Payload::String(s) => write!(f, "{}", s),
            Payload::Number(n) => write!(f, "{}", n),
            Payload::Datetime(dt) => write!(f, "{}", dt),
        }
    }
}

fn boolean_word(text: &str) -> Option<bool> {
    let lower = text.trim().to_lowercase();
    match lower.as_str() {
        "yes" | "true" | "t" => Some(true),
        "no" | "false" | "f" => Some(false),
        _ => None,
    }
}

/// Parses a numeric column. Boolean words are accepted like in val(); a
/// decimal comma is accepted when the locale uses one.
fn parse_column_number(text: &str, coercion: &Coercion<'_>) -> Option<NumericValue> {
    if let Some(b) = boolean_word(text) {
        return Some(NumericValue::from_bool(b));
    }
    if coercion.decimal_comma && text.contains(',') {
        let swapped: String = text
            .chars()
            .filter(|c| *c != '.' && !c.is_whitespace())
            .map(|c| if c == ',' { '.' } else { c })
            .collect();
        return NumericValue::parse(&swapped, coercion.numeric);
    }
    NumericValue::parse(text, coercion.numeric)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coercion(ctx: &NumericContext, decimal_comma: bool) -> Coercion<'_> {
        Coercion {
            numeric: ctx,
            date_order: DateOrder::DayFirst,
            decimal_comma,
        }
    }

    #[test]
    fn test_null_keeps_kind() {
        let value = ResultValue::null(ValueKind::Datetime);
        assert!(value.is_null());
        assert_eq!(value.kind(), ValueKind::Datetime);
        assert_eq!(value.declared_kind(), ValueKind::Datetime);
        assert_eq!(value.as_datetime(), None);
        assert_eq!(value.to_string(), "");
    }

    #[test]
    fn test_degrade_keeps_declared_kind() {
        let mut value = ResultValue::from_i64(5);
        value.degrade("boom");
        assert_eq!(value.kind(), ValueKind::Error);
        assert_eq!(value.declared_kind(), ValueKind::Number);
        assert_eq!(value.error_message(), Some("boom"));
    }

    #[test]
    fn test_out_of_range_number_is_an_overflow_error() {
        let ctx = NumericContext::default();
        let huge = NumericValue::parse("1e100000", &ctx).unwrap();
        let value = ResultValue::number(huge.mul(&huge, &ctx));
        assert_eq!(value.kind(), ValueKind::Error);
        assert_eq!(value.declared_kind(), ValueKind::Number);
        assert_eq!(value.to_string(), "numeric overflow");
    }

    #[test]
    fn test_column_number_coercion() {
        let ctx = NumericContext::default();
        let c = coercion(&ctx, false);
        let v = ResultValue::from_text(ValueKind::Number, Some("5e-1"), &c);
        assert_eq!(v.as_number().unwrap().to_string(), "0.5");

        let v = ResultValue::from_text(ValueKind::Number, Some("Yes"), &c);
        assert_eq!(v.as_number().unwrap().to_string(), "1");

        let v = ResultValue::from_text(ValueKind::Number, None, &c);
        assert!(v.is_null());
        assert_eq!(v.kind(), ValueKind::Number);

        let v = ResultValue::from_text(ValueKind::Number, Some("abc"), &c);
        assert_eq!(v.kind(), ValueKind::Error);
        assert_eq!(v.declared_kind(), ValueKind::Number);
        assert_eq!(v.error_message(), Some("invalid number 'abc'"));
    }

    #[test]
    fn test_column_decimal_comma() {
        let ctx = NumericContext::default();
        let c = coercion(&ctx, true);
        let v = ResultValue::from_text(ValueKind::Number, Some("1.234,5"), &c);
        assert_eq!(v.as_number().unwrap().to_string(), "1234.5");
        let v = ResultValue::from_text(ValueKind::Number, Some("2.5"), &c);
        assert_eq!(v.as_number().unwrap().to_string(), "2.5");
    }

    #[test]
    fn test_column_datetime_coercion() {
        let ctx = NumericContext::default();
        let c = coercion(&ctx, false);
        let v = ResultValue::from_text(ValueKind::Datetime, Some("2022-05-08"), &c);
        let dt = v.as_datetime().unwrap();
        assert_eq!((dt.year, dt.month, dt.day), (2022, 5, 8));
        assert!(dt.date_valid && !dt.time_valid);
    }

    #[test]
    fn test_val_semantics() {
        let ctx = NumericContext::default();
        assert_eq!(ResultValue::string("TRUE").to_number(&ctx), ResultValue::from_i64(1));
        assert_eq!(ResultValue::string("f").to_number(&ctx), ResultValue::from_i64(0));
        assert_eq!(
            ResultValue::string("12.5").to_number(&ctx).to_string(),
            "12.5"
        );
        assert!(ResultValue::datetime(TemporalValue::date(2020, 1, 1))
            .to_number(&ctx)
            .is_error());
        assert_eq!(
            ResultValue::error("x").to_number(&ctx).error_message(),
            Some("x")
        );
    }

    #[test]
    fn test_same_as() {
        let a = ResultValue::string("A");
        assert!(a.same_as(&ResultValue::string("A")));
        assert!(!a.same_as(&ResultValue::string("B")));
        assert!(!a.same_as(&ResultValue::null(ValueKind::String)));
        assert!(ResultValue::null(ValueKind::String).same_as(&ResultValue::null(ValueKind::String)));
        assert!(!ResultValue::from_i64(1).same_as(&ResultValue::string("1")));

        let one = ResultValue::number(NumericValue::parse("1.0", &NumericContext::default()).unwrap());
        assert!(one.same_as(&ResultValue::from_i64(1)));
    }
}

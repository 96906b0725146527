//! FILENAME: engine/src/numeric.rs
//! PURPOSE: Arbitrary precision decimal numbers used by every numeric Result.
//! CONTEXT: Wraps `BigDecimal` and rounds every arithmetic result to the
//! significant digits derived from the report's configured precision in bits.
//! Transcendental functions go through f64 and are converted back.

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::{FromPrimitive, One, Signed, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Largest exponent computed by exact repeated multiplication.
const MAX_EXACT_POWER: i64 = 4096;

/// Largest operand accepted by factorial().
const MAX_FACTORIAL: u64 = 5000;

/// Largest decimal exponent a number may carry. Results beyond it overflow;
/// magnitudes below `10^-MAX_EXPONENT` flush to zero.
pub const MAX_EXPONENT: i64 = 100_000;

/// How results are rounded to the configured precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoundingMode {
    /// Round half to even.
    #[default]
    Nearest,
    TowardZero,
    /// Toward positive infinity.
    Up,
    /// Toward negative infinity.
    Down,
    AwayFromZero,
}

impl RoundingMode {
    /// Parses the names used in report definitions, e.g. "nearest" or "RNDZ".
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "nearest" | "rndn" => Some(RoundingMode::Nearest),
            "toward_zero" | "towardzero" | "rndz" => Some(RoundingMode::TowardZero),
            "up" | "rndu" => Some(RoundingMode::Up),
            "down" | "rndd" => Some(RoundingMode::Down),
            "away_from_zero" | "awayfromzero" | "rnda" => Some(RoundingMode::AwayFromZero),
            _ => None,
        }
    }
}

/// Precision and rounding shared by every number of one report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericContext {
    pub precision_bits: u32,
    pub rounding: RoundingMode,
    digits: u64,
}

impl NumericContext {
    pub fn new(precision_bits: u32, rounding: RoundingMode) -> Self {
        let bits = precision_bits.max(2);
        let digits = (f64::from(bits) * std::f64::consts::LOG10_2).ceil() as u64;
        NumericContext {
            precision_bits: bits,
            rounding,
            digits,
        }
    }

    /// Number of significant decimal digits kept after each operation.
    pub fn digits(&self) -> u64 {
        self.digits
    }
}

impl Default for NumericContext {
    fn default() -> Self {
        NumericContext::new(256, RoundingMode::Nearest)
    }
}

/// An arbitrary precision decimal number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NumericValue(BigDecimal);

impl NumericValue {
    pub fn zero() -> Self {
        NumericValue(BigDecimal::zero())
    }

    pub fn one() -> Self {
        NumericValue(BigDecimal::one())
    }

    pub fn from_i64(value: i64) -> Self {
        NumericValue(BigDecimal::from(value))
    }

    /// Converts an f64, returning None for NaN and infinities.
    pub fn from_f64(value: f64, ctx: &NumericContext) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        BigDecimal::from_f64(value).map(|d| NumericValue(d).rounded(ctx))
    }

    pub fn from_bool(value: bool) -> Self {
        if value {
            Self::one()
        } else {
            Self::zero()
        }
    }

    /// Parses decimal text: "1", "-1.5", ".5", "1e5", "1.5E-5".
    pub fn parse(text: &str, ctx: &NumericContext) -> Option<Self> {
        let trimmed = text.trim();
        let trimmed = trimmed.strip_prefix('+').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return None;
        }

        let valid = trimmed.chars().all(|c| {
            c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')
        });
        if !valid || !trimmed.chars().any(|c| c.is_ascii_digit()) {
            return None;
        }

        let normalized = if let Some(rest) = trimmed.strip_prefix("-.") {
            format!("-0.{}", rest)
        } else if trimmed.starts_with('.') {
            format!("0{}", trimmed)
        } else {
            trimmed.to_string()
        };

        let value = NumericValue(BigDecimal::from_str(&normalized).ok()?).rounded(ctx);
        value.in_range().then_some(value)
    }

    pub fn as_bigdecimal(&self) -> &BigDecimal {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    pub fn is_integer(&self) -> bool {
        let (mantissa, scale) = self.0.as_bigint_and_exponent();
        if scale <= 0 || mantissa.is_zero() {
            return true;
        }
        // Every digit is a fraction digit
        if scale as u64 >= digit_count(&mantissa) {
            return false;
        }
        let divisor = pow10(scale as u64);
        (&mantissa % &divisor).is_zero()
    }

    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(f64::NAN)
    }

    /// Truncates toward zero and converts, None if out of range.
    pub fn to_i64(&self) -> Option<i64> {
        if self.adjusted_exponent() > 18 {
            return None;
        }
        let (mantissa, _) = self.trunc().0.with_scale(0).as_bigint_and_exponent();
        mantissa.to_i64()
    }

    /// Exponent of the leading digit: 2 for 123, -3 for 0.00123, 0 for zero.
    pub fn adjusted_exponent(&self) -> i64 {
        if self.is_zero() {
            return 0;
        }
        let (mantissa, scale) = self.0.as_bigint_and_exponent();
        digit_count(&mantissa) as i64 - scale - 1
    }

    /// Whether the magnitude is within `MAX_EXPONENT`.
    pub fn in_range(&self) -> bool {
        self.adjusted_exponent() <= MAX_EXPONENT
    }

    /// Converts with the context's rounding mode, None if out of range.
    pub fn to_i64_rounded(&self, ctx: &NumericContext) -> Option<i64> {
        self.round_dp(0, ctx.rounding).to_i64()
    }

    // ========================================
    // ROUNDING
    // ========================================

    /// Rounds to the context's significant digits. Magnitudes below
    /// `10^-MAX_EXPONENT` become zero.
    pub fn rounded(self, ctx: &NumericContext) -> Self {
        let (mantissa, scale) = self.0.as_bigint_and_exponent();
        let ndigits = digit_count(&mantissa);
        let result = if ndigits <= ctx.digits {
            self
        } else {
            let drop = ndigits - ctx.digits;
            let rounded = round_div(&mantissa, &pow10(drop), ctx.rounding);
            NumericValue(BigDecimal::new(rounded, scale - drop as i64))
        };
        if result.adjusted_exponent() < -MAX_EXPONENT {
            return Self::zero();
        }
        result
    }

    /// Rounds to `places` decimal places.
    pub fn round_dp(&self, places: i64, mode: RoundingMode) -> Self {
        let (mantissa, scale) = self.0.as_bigint_and_exponent();
        if scale <= places {
            return self.clone();
        }
        // Dropping more digits than the mantissa has rounds the same way as
        // dropping one more than it has.
        let drop = ((scale - places) as u64).min(digit_count(&mantissa) + 1);
        let rounded = round_div(&mantissa, &pow10(drop), mode);
        NumericValue(BigDecimal::new(rounded, places))
    }

    pub fn floor(&self) -> Self {
        self.round_dp(0, RoundingMode::Down)
    }

    pub fn ceil(&self) -> Self {
        self.round_dp(0, RoundingMode::Up)
    }

    pub fn trunc(&self) -> Self {
        self.round_dp(0, RoundingMode::TowardZero)
    }

    /// Rounds half away from zero, like C round().
    pub fn round(&self) -> Self {
        if self.0.as_bigint_and_exponent().1 <= 0 {
            return self.clone();
        }
        let half_up = self.round_dp(1, RoundingMode::TowardZero);
        let (mantissa, _) = half_up.0.with_scale(1).as_bigint_and_exponent();
        let last = (&mantissa % BigInt::from(10)).abs();
        if last >= BigInt::from(5) {
            self.round_dp(0, RoundingMode::AwayFromZero)
        } else {
            self.trunc()
        }
    }

    /// Rounds to integer with the context's rounding mode.
    pub fn rint(&self, ctx: &NumericContext) -> Self {
        self.round_dp(0, ctx.rounding)
    }

    // ========================================
    // ARITHMETIC
    // ========================================

    pub fn add(&self, other: &Self, ctx: &NumericContext) -> Self {
        if let Some(dominant) = Self::dominant(self, other, ctx) {
            return dominant.clone().rounded(ctx);
        }
        NumericValue(&self.0 + &other.0).rounded(ctx)
    }

    pub fn sub(&self, other: &Self, ctx: &NumericContext) -> Self {
        self.add(&other.neg(), ctx)
    }

    /// The operand that alone decides a sum, when the other one lies below
    /// its last kept digit. Adding them would align both scales first.
    fn dominant<'a>(a: &'a Self, b: &'a Self, ctx: &NumericContext) -> Option<&'a Self> {
        if a.is_zero() {
            return Some(b);
        }
        if b.is_zero() {
            return Some(a);
        }
        let gap = a.adjusted_exponent() - b.adjusted_exponent();
        let limit = ctx.digits as i64 + 2;
        if gap > limit {
            Some(a)
        } else if gap < -limit {
            Some(b)
        } else {
            None
        }
    }

    pub fn mul(&self, other: &Self, ctx: &NumericContext) -> Self {
        NumericValue(&self.0 * &other.0).rounded(ctx)
    }

    /// Division, None when dividing by zero.
    pub fn div(&self, other: &Self, ctx: &NumericContext) -> Option<Self> {
        if other.is_zero() {
            return None;
        }
        let scale = ctx.digits as i64 + 2;
        let (mantissa, exp) = self.0.as_bigint_and_exponent();
        let (divisor_m, divisor_exp) = other.0.as_bigint_and_exponent();

        // Scale the dividend so the integer quotient keeps enough digits
        let shift = scale + digit_count(&divisor_m) as i64 - digit_count(&mantissa) as i64;
        let shift = shift.max(0) as u64;
        let numerator = mantissa * pow10(shift);
        let quotient = round_div(&numerator, &divisor_m, ctx.rounding);
        let result_scale = exp + shift as i64 - divisor_exp;
        Some(NumericValue(BigDecimal::new(quotient, result_scale)).rounded(ctx))
    }

    /// Truncated remainder (sign follows the dividend), None on zero divisor.
    pub fn rem(&self, other: &Self, ctx: &NumericContext) -> Option<Self> {
        if other.is_zero() {
            return None;
        }
        let quotient = self.div(other, ctx)?.trunc();
        Some(self.sub(&quotient.mul(other, ctx), ctx))
    }

    pub fn neg(&self) -> Self {
        NumericValue(-self.0.clone())
    }

    pub fn abs(&self) -> Self {
        NumericValue(self.0.abs())
    }

    /// Power. Integral exponents are exact up to precision, others use f64.
    pub fn pow(&self, exponent: &Self, ctx: &NumericContext) -> Option<Self> {
        if exponent.is_integer() {
            if let Some(n) = exponent.to_i64() {
                if n.abs() <= MAX_EXACT_POWER {
                    return self.powi(n, ctx);
                }
            }
        }
        let result = self.to_f64().powf(exponent.to_f64());
        Self::from_f64(result, ctx)
    }

    fn powi(&self, n: i64, ctx: &NumericContext) -> Option<Self> {
        if n < 0 {
            let positive = self.powi(-n, ctx)?;
            return Self::one().div(&positive, ctx);
        }
        let mut result = Self::one();
        let mut base = self.clone();
        let mut exp = n as u64;
        while exp > 0 {
            if exp & 1 == 1 {
                result = result.mul(&base, ctx);
            }
            exp >>= 1;
            if exp > 0 {
                base = base.mul(&base, ctx);
            }
        }
        Some(result)
    }

    pub fn sqrt(&self, ctx: &NumericContext) -> Option<Self> {
        if self.is_negative() {
            return None;
        }
        self.0.sqrt().map(|d| NumericValue(d).rounded(ctx))
    }

    /// n! for non-negative integers.
    pub fn factorial(&self, ctx: &NumericContext) -> Option<Self> {
        if self.is_negative() || !self.is_integer() {
            return None;
        }
        let n = self.to_i64()? as u64;
        if n > MAX_FACTORIAL {
            return None;
        }
        let mut product = BigInt::one();
        for i in 2..=n {
            product *= BigInt::from(i);
        }
        Some(NumericValue(BigDecimal::new(product, 0)).rounded(ctx))
    }

    /// Applies an f64 function, None if the result is not finite.
    pub fn map_f64(&self, ctx: &NumericContext, f: impl Fn(f64) -> f64) -> Option<Self> {
        Self::from_f64(f(self.to_f64()), ctx)
    }

    pub fn compare(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }

    // ========================================
    // FORMATTING
    // ========================================

    /// Plain decimal text without exponent and without trailing zeros.
    pub fn to_plain_string(&self) -> String {
        let (mantissa, scale) = self.0.as_bigint_and_exponent();
        let (mantissa, scale) = strip_trailing_zeros(mantissa, scale);
        format_mantissa(&mantissa, scale)
    }

    /// Fixed point text with exactly `places` decimals.
    pub fn to_fixed(&self, places: usize, mode: RoundingMode) -> String {
        let places = places.min(MAX_EXPONENT as usize);
        let rounded = self.round_dp(places as i64, mode);
        let (mantissa, _) = rounded.0.with_scale(places as i64).as_bigint_and_exponent();
        format_mantissa(&mantissa, places as i64)
    }
}

impl fmt::Display for NumericValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_plain_string())
    }
}

impl From<i64> for NumericValue {
    fn from(value: i64) -> Self {
        NumericValue::from_i64(value)
    }
}

// ========================================
// HELPERS
// ========================================

fn pow10(n: u64) -> BigInt {
    num_traits::pow(BigInt::from(10), n as usize)
}

fn digit_count(n: &BigInt) -> u64 {
    if n.is_zero() {
        return 1;
    }
    n.abs().to_string().len() as u64
}

/// Integer division of n by d rounded with `mode`. d must be non-zero.
fn round_div(n: &BigInt, d: &BigInt, mode: RoundingMode) -> BigInt {
    let quotient = n / d;
    let remainder = n % d;
    if remainder.is_zero() {
        return quotient;
    }

    // Sign of the exact quotient
    let negative = n.is_negative() != d.is_negative();
    let away = if negative {
        &quotient - BigInt::one()
    } else {
        &quotient + BigInt::one()
    };

    match mode {
        RoundingMode::TowardZero => quotient,
        RoundingMode::AwayFromZero => away,
        RoundingMode::Up => {
            if negative {
                quotient
            } else {
                away
            }
        }
        RoundingMode::Down => {
            if negative {
                away
            } else {
                quotient
            }
        }
        RoundingMode::Nearest => {
            let twice = remainder.abs() * BigInt::from(2);
            match twice.cmp(&d.abs()) {
                Ordering::Less => quotient,
                Ordering::Greater => away,
                Ordering::Equal => {
                    if (&quotient % BigInt::from(2)).is_zero() {
                        quotient
                    } else {
                        away
                    }
                }
            }
        }
    }
}

fn strip_trailing_zeros(mut mantissa: BigInt, mut scale: i64) -> (BigInt, i64) {
    if mantissa.is_zero() {
        return (mantissa, 0);
    }
    let ten = BigInt::from(10);
    while scale > 0 && (&mantissa % &ten).is_zero() {
        mantissa /= &ten;
        scale -= 1;
    }
    (mantissa, scale)
}

fn format_mantissa(mantissa: &BigInt, scale: i64) -> String {
    let negative = mantissa.is_negative();
    let mut digits = mantissa.abs().to_string();

    if scale <= 0 {
        digits.push_str(&"0".repeat((-scale) as usize));
    } else {
        let scale = scale as usize;
        if digits.len() <= scale {
            let padding = "0".repeat(scale + 1 - digits.len());
            digits.insert_str(0, &padding);
        }
        let point = digits.len() - scale;
        digits.insert(point, '.');
    }

    if negative && digits.chars().any(|c| c != '0' && c != '.') {
        digits.insert(0, '-');
    }
    digits
}

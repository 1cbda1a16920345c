//! Exact timestamp arithmetic for Chrome trace times.
//!
//! Chrome traces store `ts` and `dur` in microseconds, either as integers or
//! as fractional numbers with nanosecond precision. Going through `f64` would
//! let the same source value drift between passes, so every value is parsed
//! from its decimal text into integer nanoseconds (a rational microsecond
//! value with fixed denominator 1000).

use crate::utils::config::{FRACTION_DIGITS, TICKS_PER_MICRO};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// A point in time (or a duration) in nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    /// Create a timestamp from archive ticks (nanoseconds)
    pub const fn from_ticks(ticks: i64) -> Self {
        Self(ticks)
    }

    /// Create a timestamp from whole microseconds
    pub fn from_micros(micros: i64) -> Option<Self> {
        micros.checked_mul(TICKS_PER_MICRO).map(Self)
    }

    /// Value in archive ticks (nanoseconds)
    pub const fn ticks(self) -> i64 {
        self.0
    }

    pub fn checked_add(self, other: Timestamp) -> Option<Timestamp> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Parse a timestamp from a JSON number or numeric string
    ///
    /// **Public** - used by the event parser for `ts` and `dur`
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(micros) => Self::from_micros(micros),
                None => Self::parse_decimal(&n.to_string()),
            },
            Value::String(s) => Self::parse_decimal(s.trim()),
            _ => None,
        }
    }

    /// Parse a decimal microsecond string such as `"12.345"`, `"-3"` or `"1.5e3"`
    ///
    /// Digits below one nanosecond are rounded half away from zero.
    pub fn parse_decimal(text: &str) -> Option<Self> {
        let (negative, rest) = match text.as_bytes().first()? {
            b'-' => (true, &text[1..]),
            b'+' => (false, &text[1..]),
            _ => (false, text),
        };

        let (number, exponent) = match rest.find(['e', 'E']) {
            Some(pos) => (&rest[..pos], rest[pos + 1..].parse::<i32>().ok()?),
            None => (rest, 0),
        };

        let (int_part, frac_part) = match number.split_once('.') {
            Some((i, f)) => (i, f),
            None => (number, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }

        let mut mantissa: i128 = 0;
        for c in int_part.chars().chain(frac_part.chars()) {
            let digit = c.to_digit(10)? as i128;
            mantissa = mantissa.checked_mul(10)?.checked_add(digit)?;
        }

        // Power of ten that turns the mantissa into nanoseconds
        let scale = exponent
            .checked_add(FRACTION_DIGITS as i32)?
            .checked_sub(i32::try_from(frac_part.len()).ok()?)?;
        let nanos = if scale >= 0 {
            mantissa.checked_mul(10i128.checked_pow(scale as u32)?)?
        } else {
            let shift = scale.checked_neg()?;
            if shift > 38 {
                0
            } else {
                let divisor = 10i128.checked_pow(shift as u32)?;
                let quotient = mantissa / divisor;
                if (mantissa % divisor) * 2 >= divisor {
                    quotient + 1
                } else {
                    quotient
                }
            }
        };

        let nanos = i64::try_from(nanos).ok()?;
        Some(Self(if negative { -nanos } else { nanos }))
    }
}

impl fmt::Display for Timestamp {
    /// Formats as microseconds, e.g. `12.345us`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / TICKS_PER_MICRO as u64;
        let frac = abs % TICKS_PER_MICRO as u64;
        if frac == 0 {
            write!(f, "{}{}us", sign, whole)
        } else {
            write!(f, "{}{}.{:03}us", sign, whole, frac)
        }
    }
}

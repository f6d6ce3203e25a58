use std::fmt::{Display, Formatter};

use colwire_error::{ColwireResult, colwire_err};

/// A numeric literal, held in the narrowest representation that reproduces it exactly.
///
/// Integers prefer `i32`, then `i64`, then `u64`, then `i128`. Fractional or exponent forms
/// prefer `f32` when the value survives the round trip through `f32`, otherwise `f64`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// Fits in 32 signed bits.
    I32(i32),
    /// Fits in 64 signed bits.
    I64(i64),
    /// Positive and larger than `i64::MAX`.
    U64(u64),
    /// Needs 128 signed bits.
    I128(i128),
    /// A floating point value exactly representable as `f32`.
    F32(f32),
    /// Any other floating point value.
    F64(f64),
}

impl Number {
    /// Narrow an integer to the smallest variant that holds it.
    pub fn from_integer(value: i128) -> Self {
        if let Ok(v) = i32::try_from(value) {
            Self::I32(v)
        } else if let Ok(v) = i64::try_from(value) {
            Self::I64(v)
        } else if let Ok(v) = u64::try_from(value) {
            Self::U64(v)
        } else {
            Self::I128(value)
        }
    }

    /// Narrow a float to `f32` if that loses nothing.
    pub fn from_float(value: f64) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let narrow = value as f32;
        if value.is_finite() && f64::from(narrow) == value {
            Self::F32(narrow)
        } else {
            Self::F64(value)
        }
    }

    /// Parse the text of a numeric literal: optional sign, then hex (`0x`), binary (`0b`) or
    /// decimal digits with an optional fraction and exponent.
    pub fn parse(text: &str) -> ColwireResult<Self> {
        let (negative, digits) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        let radix = match digits.get(..2) {
            Some("0x") | Some("0X") => Some(16),
            Some("0b") | Some("0B") => Some(2),
            _ => None,
        };

        if let Some(radix) = radix {
            let magnitude = u128::from_str_radix(&digits[2..], radix)
                .map_err(|e| colwire_err!(Syntax: "invalid number literal '{}': {}", text, e))?;
            let value = i128::try_from(magnitude)
                .map_err(|_| colwire_err!(Syntax: "number literal '{}' is out of range", text))?;
            return Ok(Self::from_integer(if negative { -value } else { value }));
        }

        if digits.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(value) = text.parse::<i128>() {
                return Ok(Self::from_integer(value));
            }
        }
        let value = text
            .parse::<f64>()
            .map_err(|e| colwire_err!(Syntax: "invalid number literal '{}': {}", text, e))?;
        Ok(Self::from_float(value))
    }

    /// Whether this literal is an integer.
    pub fn is_integer(&self) -> bool {
        !matches!(self, Self::F32(_) | Self::F64(_))
    }

    /// The value as an `i128`, if it is an integer.
    pub fn as_i128(&self) -> Option<i128> {
        match *self {
            Self::I32(v) => Some(i128::from(v)),
            Self::I64(v) => Some(i128::from(v)),
            Self::U64(v) => Some(i128::from(v)),
            Self::I128(v) => Some(v),
            Self::F32(_) | Self::F64(_) => None,
        }
    }

    /// The value as an `f64`, possibly losing precision for large integers.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::I32(v) => f64::from(v),
            Self::I64(v) => v as f64,
            Self::U64(v) => v as f64,
            Self::I128(v) => v as f64,
            Self::F32(v) => f64::from(v),
            Self::F64(v) => v,
        }
    }
}

impl Display for Number {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::I32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::I128(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("0", Number::I32(0))]
    #[case("2147483648", Number::I64(2_147_483_648))]
    #[case("18446744073709551615", Number::U64(u64::MAX))]
    #[case("-9223372036854775809", Number::I128(-9_223_372_036_854_775_809))]
    #[case("0xFFFFFFFF", Number::I64(0xFFFF_FFFF))]
    #[case("-0b11", Number::I32(-3))]
    #[case("0.5", Number::F32(0.5))]
    #[case("0.1", Number::F64(0.1))]
    fn narrowing(#[case] text: &str, #[case] expected: Number) {
        assert_eq!(Number::parse(text).unwrap(), expected);
    }

    #[test]
    fn rejects_garbage() {
        assert!(Number::parse("0xZZ").is_err());
        assert!(Number::parse("1.2.3").is_err());
    }
}

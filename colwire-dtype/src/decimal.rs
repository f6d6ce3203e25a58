use std::fmt::{Display, Formatter};

use colwire_error::{ColwireResult, colwire_bail, colwire_err};

/// Maximum precision of a decimal column.
pub const MAX_DECIMAL_PRECISION: u8 = 38;

/// Maximum precision that fits a 32-bit mantissa.
pub const DECIMAL32_MAX_PRECISION: u8 = 9;

/// Maximum precision that fits a 64-bit mantissa.
pub const DECIMAL64_MAX_PRECISION: u8 = 18;

/// Parameters that define the precision and scale of a decimal type.
///
/// The precision decides the width of the mantissa on the wire: up to 9 digits travel as `i32`,
/// up to 18 as `i64` and up to 38 as `i128`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DecimalDType {
    precision: u8,
    scale: u8,
}

impl DecimalDType {
    /// Checked constructor for a `DecimalDType`.
    pub fn try_new(precision: u8, scale: u8) -> ColwireResult<Self> {
        if precision == 0 || precision > MAX_DECIMAL_PRECISION {
            colwire_bail!(
                DataType: "decimal precision {} must be between 1 and {}",
                precision,
                MAX_DECIMAL_PRECISION
            );
        }
        if scale > precision {
            colwire_bail!(
                DataType: "decimal scale {} exceeds precision {}",
                scale,
                precision
            );
        }
        Ok(Self { precision, scale })
    }

    /// The precision is the number of significant figures that the decimal tracks.
    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// The number of digits after the decimal point.
    pub fn scale(&self) -> u8 {
        self.scale
    }

    /// Number of bytes the mantissa occupies on the wire.
    pub fn byte_width(&self) -> usize {
        if self.precision <= DECIMAL32_MAX_PRECISION {
            4
        } else if self.precision <= DECIMAL64_MAX_PRECISION {
            8
        } else {
            16
        }
    }

    /// The largest mantissa magnitude this precision can hold.
    pub fn max_mantissa(&self) -> i128 {
        10i128.pow(u32::from(self.precision)) - 1
    }

    /// Rescale `mantissa` from `scale` to this type's scale, rejecting values that lose digits
    /// or exceed the precision.
    pub fn rescale(&self, mantissa: i128, scale: u8) -> ColwireResult<i128> {
        let rescaled = if scale <= self.scale {
            10i128
                .checked_pow(u32::from(self.scale - scale))
                .and_then(|factor| mantissa.checked_mul(factor))
        } else {
            let factor = 10i128
                .checked_pow(u32::from(scale - self.scale))
                .ok_or_else(|| colwire_err!(DataType: "decimal scale {} is too large", scale))?;
            if mantissa % factor != 0 {
                colwire_bail!(
                    DataType: "{} does not fit {} without rounding",
                    DecimalValue::new(mantissa, scale),
                    self
                );
            }
            Some(mantissa / factor)
        };
        match rescaled {
            Some(m) if m.abs() <= self.max_mantissa() => Ok(m),
            _ => Err(colwire_err!(
                DataType: "{} is out of range for {}",
                DecimalValue::new(mantissa, scale),
                self
            )),
        }
    }
}

impl Display for DecimalDType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Decimal({}, {})", self.precision, self.scale)
    }
}

/// An exact decimal number: `mantissa * 10^-scale`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DecimalValue {
    /// The unscaled integer digits.
    pub mantissa: i128,
    /// The number of digits after the decimal point.
    pub scale: u8,
}

impl DecimalValue {
    /// Create a decimal from its unscaled digits.
    pub fn new(mantissa: i128, scale: u8) -> Self {
        Self { mantissa, scale }
    }

    /// Parse plain decimal text such as `-12.340`; the scale is the number of fraction digits.
    pub fn parse(text: &str) -> ColwireResult<Self> {
        let invalid = || colwire_err!(Syntax: "invalid decimal literal '{}'", text);
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let scale = u8::try_from(frac_part.len()).map_err(|_| invalid())?;
        let mut mantissa: i128 = 0;
        for b in int_part.bytes().chain(frac_part.bytes()) {
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(i128::from(b - b'0')))
                .ok_or_else(|| colwire_err!(DataType: "decimal literal '{}' is out of range", text))?;
        }
        Ok(Self::new(if negative { -mantissa } else { mantissa }, scale))
    }

    /// The nearest floating point value.
    #[allow(clippy::cast_precision_loss)]
    pub fn to_f64(&self) -> f64 {
        self.mantissa as f64 / 10f64.powi(i32::from(self.scale))
    }
}

impl Display for DecimalValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let digits = self.mantissa.unsigned_abs().to_string();
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let scale = usize::from(self.scale);
        if scale == 0 {
            return write!(f, "{sign}{digits}");
        }
        let padded = format!("{digits:0>width$}", width = scale + 1);
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        write!(f, "{sign}{int_part}.{frac_part}")
    }
}

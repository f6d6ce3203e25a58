use std::fmt::{Display, Formatter};

use colwire_error::{ColwireResult, colwire_err};

/// Display peels off 19 decimal digits at a time.
const DECIMAL_CHUNK: u64 = 10_000_000_000_000_000_000;

/// An unsigned 256-bit integer, stored as two 128-bit halves.
///
/// Only the operations the codec needs are provided: wire conversion, decimal text and
/// conversion from narrower integers.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct U256 {
    high: u128,
    low: u128,
}

impl U256 {
    /// Zero.
    pub const ZERO: Self = Self { high: 0, low: 0 };
    /// The largest representable value.
    pub const MAX: Self = Self {
        high: u128::MAX,
        low: u128::MAX,
    };

    /// Build a value from its high and low halves.
    pub const fn from_parts(high: u128, low: u128) -> Self {
        Self { high, low }
    }

    /// The high and low halves.
    pub const fn into_parts(self) -> (u128, u128) {
        (self.high, self.low)
    }

    /// Little-endian byte representation, as sent on the wire.
    pub fn to_le_bytes(self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[..16].copy_from_slice(&self.low.to_le_bytes());
        out[16..].copy_from_slice(&self.high.to_le_bytes());
        out
    }

    /// Read a value from its little-endian byte representation.
    pub fn from_le_bytes(bytes: [u8; 32]) -> Self {
        let mut low = [0u8; 16];
        let mut high = [0u8; 16];
        low.copy_from_slice(&bytes[..16]);
        high.copy_from_slice(&bytes[16..]);
        Self {
            high: u128::from_le_bytes(high),
            low: u128::from_le_bytes(low),
        }
    }

    /// The value as a `u128`, if it fits.
    pub fn to_u128(self) -> Option<u128> {
        (self.high == 0).then_some(self.low)
    }

    fn checked_mul_small(self, rhs: u64) -> Option<Self> {
        let rhs = u128::from(rhs);
        let (low_hi, low_lo) = (self.low >> 64, self.low & u128::from(u64::MAX));
        let lo = low_lo * rhs;
        let mid = low_hi * rhs + (lo >> 64);
        let low = (mid << 64) | (lo & u128::from(u64::MAX));
        let high = self.high.checked_mul(rhs)?.checked_add(mid >> 64)?;
        Some(Self { high, low })
    }

    fn checked_add_small(self, rhs: u64) -> Option<Self> {
        let (low, carry) = self.low.overflowing_add(u128::from(rhs));
        let high = self.high.checked_add(u128::from(carry))?;
        Some(Self { high, low })
    }

    /// Divide by a small divisor, returning the quotient and remainder.
    fn div_rem_small(self, rhs: u64) -> (Self, u64) {
        let rhs = u128::from(rhs);
        let high = self.high / rhs;
        let mut rem = self.high % rhs;
        let mut low = 0u128;
        for shift in [96u32, 64, 32, 0] {
            let chunk = (rem << 32) | ((self.low >> shift) & u128::from(u32::MAX));
            low |= (chunk / rhs) << shift;
            rem = chunk % rhs;
        }
        #[allow(clippy::cast_possible_truncation)]
        let rem = rem as u64;
        (Self { high, low }, rem)
    }

    /// Parse unsigned decimal digits.
    pub fn parse_decimal(text: &str) -> ColwireResult<Self> {
        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(colwire_err!(Syntax: "invalid UInt256 literal '{}'", text));
        }
        text.bytes()
            .try_fold(Self::ZERO, |acc, b| {
                acc.checked_mul_small(10)?
                    .checked_add_small(u64::from(b - b'0'))
            })
            .ok_or_else(|| colwire_err!(DataType: "'{}' is out of range for UInt256", text))
    }
}

impl From<u128> for U256 {
    fn from(value: u128) -> Self {
        Self::from_parts(0, value)
    }
}

impl From<u64> for U256 {
    fn from(value: u64) -> Self {
        Self::from_parts(0, u128::from(value))
    }
}

impl Display for U256 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(v) = self.to_u128() {
            return write!(f, "{v}");
        }
        let mut chunks = Vec::new();
        let mut rest = *self;
        while rest != Self::ZERO {
            let (q, r) = rest.div_rem_small(DECIMAL_CHUNK);
            chunks.push(r);
            rest = q;
        }
        let mut iter = chunks.iter().rev();
        if let Some(first) = iter.next() {
            write!(f, "{first}")?;
        }
        for chunk in iter {
            write!(f, "{chunk:019}")?;
        }
        Ok(())
    }
}

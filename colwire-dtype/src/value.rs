use std::fmt::{Display, Formatter};
use std::net::{Ipv4Addr, Ipv6Addr};

use jiff::Timestamp;
use jiff::civil::Date;
use jiff::tz::TimeZone;
use paste::paste;
use roaring::RoaringTreemap;
use uuid::Uuid;

use crate::datetime::format_timestamp;
use crate::{DecimalValue, U256};

/// A single value read from or written to a column.
///
/// Enum columns hold the entry name as [`Value::String`]; booleans are carried as
/// [`Value::UInt8`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The absence of a value.
    Null,
    /// An `Int8` value.
    Int8(i8),
    /// An `Int16` value.
    Int16(i16),
    /// An `Int32` value.
    Int32(i32),
    /// An `Int64` value.
    Int64(i64),
    /// An `Int128` value.
    Int128(i128),
    /// A `UInt8` value.
    UInt8(u8),
    /// A `UInt16` value.
    UInt16(u16),
    /// A `UInt32` value.
    UInt32(u32),
    /// A `UInt64` value.
    UInt64(u64),
    /// A `UInt128` value.
    UInt128(u128),
    /// A `UInt256` value.
    UInt256(U256),
    /// A `Float32` value.
    Float32(f32),
    /// A `Float64` value.
    Float64(f64),
    /// An exact decimal.
    Decimal(DecimalValue),
    /// UTF-8 text.
    String(String),
    /// Raw bytes, as read from `String` or `FixedString` columns that are not valid UTF-8.
    Bytes(Vec<u8>),
    /// A calendar date.
    Date(Date),
    /// An instant, for `DateTime` and `DateTime64` columns.
    DateTime(Timestamp),
    /// A UUID.
    Uuid(Uuid),
    /// An IPv4 address.
    IPv4(Ipv4Addr),
    /// An IPv6 address.
    IPv6(Ipv6Addr),
    /// A 64-bit roaring bitmap.
    Bitmap(RoaringTreemap),
    /// The elements of an array.
    Array(Vec<Value>),
    /// The entries of a map, in wire order.
    Map(Vec<(Value, Value)>),
    /// The fields of a tuple.
    Tuple(Vec<Value>),
}

impl Value {
    /// Whether this is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// A short name for the kind of value, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int8(_)
            | Self::Int16(_)
            | Self::Int32(_)
            | Self::Int64(_)
            | Self::Int128(_)
            | Self::UInt8(_)
            | Self::UInt16(_)
            | Self::UInt32(_)
            | Self::UInt64(_)
            | Self::UInt128(_)
            | Self::UInt256(_) => "integer",
            Self::Float32(_) | Self::Float64(_) => "float",
            Self::Decimal(_) => "decimal",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Date(_) => "date",
            Self::DateTime(_) => "datetime",
            Self::Uuid(_) => "uuid",
            Self::IPv4(_) => "ipv4",
            Self::IPv6(_) => "ipv6",
            Self::Bitmap(_) => "bitmap",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
            Self::Tuple(_) => "tuple",
        }
    }

    /// The value as an `i128`, if it is an integer that fits.
    pub fn as_i128(&self) -> Option<i128> {
        match *self {
            Self::Int8(v) => Some(i128::from(v)),
            Self::Int16(v) => Some(i128::from(v)),
            Self::Int32(v) => Some(i128::from(v)),
            Self::Int64(v) => Some(i128::from(v)),
            Self::Int128(v) => Some(v),
            Self::UInt8(v) => Some(i128::from(v)),
            Self::UInt16(v) => Some(i128::from(v)),
            Self::UInt32(v) => Some(i128::from(v)),
            Self::UInt64(v) => Some(i128::from(v)),
            Self::UInt128(v) => i128::try_from(v).ok(),
            Self::UInt256(v) => v.to_u128().and_then(|v| i128::try_from(v).ok()),
            _ => None,
        }
    }

    /// The value as an `f64`, if it is numeric.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float32(v) => Some(f64::from(*v)),
            Self::Float64(v) => Some(*v),
            Self::Decimal(d) => Some(d.to_f64()),
            Self::UInt128(v) => Some(*v as f64),
            other => other.as_i128().map(|v| v as f64),
        }
    }

    /// The text of a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// The bytes of a string value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::String(s) => Some(s.as_bytes()),
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

macro_rules! value_from {
    ($($T:ty => $V:ident),* $(,)?) => {
        $(
            impl From<$T> for Value {
                fn from(value: $T) -> Self {
                    Self::$V(value)
                }
            }
        )*
    };
}

value_from!(
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    i128 => Int128,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    u128 => UInt128,
    U256 => UInt256,
    f32 => Float32,
    f64 => Float64,
    DecimalValue => Decimal,
    String => String,
    Date => Date,
    Timestamp => DateTime,
    Uuid => Uuid,
    Ipv4Addr => IPv4,
    Ipv6Addr => IPv6,
    RoaringTreemap => Bitmap,
);

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::UInt8(u8::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Self::Array(value.into_iter().map(Into::into).collect())
    }
}

macro_rules! value_as {
    ($($T:ident => $V:ident),* $(,)?) => {
        paste! {
            impl Value {
                $(
                    #[doc = "The value as `" $T "`, if it holds exactly that type."]
                    pub fn [<as_ $T>](&self) -> Option<$T> {
                        match self {
                            Self::$V(v) => Some(*v),
                            _ => None,
                        }
                    }
                )*
            }
        }
    };
}

value_as!(
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
);

fn write_escaped(f: &mut Formatter<'_>, text: &str) -> std::fmt::Result {
    f.write_str("'")?;
    for c in text.chars() {
        match c {
            '\'' => f.write_str("\\'")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("'")
}

/// Values display as SQL literals: strings and temporal values are quoted, containers use
/// `[..]`, `{..}` and `(..)`.
impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Int8(v) => write!(f, "{v}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Int128(v) => write!(f, "{v}"),
            Self::UInt8(v) => write!(f, "{v}"),
            Self::UInt16(v) => write!(f, "{v}"),
            Self::UInt32(v) => write!(f, "{v}"),
            Self::UInt64(v) => write!(f, "{v}"),
            Self::UInt128(v) => write!(f, "{v}"),
            Self::UInt256(v) => write!(f, "{v}"),
            Self::Float32(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Decimal(v) => write!(f, "{v}"),
            Self::String(s) => write_escaped(f, s),
            Self::Bytes(b) => write_escaped(f, &String::from_utf8_lossy(b)),
            Self::Date(d) => write!(f, "'{d}'"),
            Self::DateTime(ts) => write!(f, "'{}'", format_timestamp(*ts, &TimeZone::UTC)),
            Self::Uuid(u) => write!(f, "'{u}'"),
            Self::IPv4(ip) => write!(f, "'{ip}'"),
            Self::IPv6(ip) => write!(f, "'{ip}'"),
            Self::Bitmap(bitmap) => {
                f.write_str("[")?;
                for (i, v) in bitmap.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
            Self::Array(values) => {
                f.write_str("[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
            Self::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{k}:{v}")?;
                }
                f.write_str("}")
            }
            Self::Tuple(values) => {
                f.write_str("(")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(Value::from(true), Value::UInt8(1));
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(
            Value::from(vec![1i32, 2]),
            Value::Array(vec![Value::Int32(1), Value::Int32(2)])
        );
        assert_eq!(Value::UInt64(u64::MAX).as_i128(), Some(i128::from(u64::MAX)));
        assert_eq!(Value::Int16(-3).as_i16(), Some(-3));
        assert_eq!(Value::Int16(-3).as_i32(), None);
    }

    #[test]
    fn display_as_literal() {
        let value = Value::Map(vec![(
            Value::from("it's"),
            Value::Array(vec![Value::Int32(1), Value::Null]),
        )]);
        assert_eq!(value.to_string(), "{'it\\'s':[1,NULL]}");
        assert_eq!(
            Value::Tuple(vec![Value::Date(jiff::civil::date(2000, 1, 1)), Value::Float64(0.5)])
                .to_string(),
            "('2000-01-01',0.5)"
        );
    }
}

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use colwire_error::{ColwireResult, colwire_bail, colwire_err};
use itertools::Itertools;
use DataType::*;

use crate::datetime;
use crate::decimal::DecimalDType;
use crate::value::Value;

/// A name for a field in a named tuple.
pub type FieldName = Arc<str>;

/// The wire type of a column.
///
/// A `DataType` is fully determined by its type name: two equal names always produce equal
/// descriptors, and [`Display`] prints the canonical name that parses back to the same
/// descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Signed 8-bit integer.
    Int8,
    /// Signed 16-bit integer.
    Int16,
    /// Signed 32-bit integer.
    Int32,
    /// Signed 64-bit integer.
    Int64,
    /// Signed 128-bit integer.
    Int128,
    /// Unsigned 8-bit integer, also used for booleans.
    UInt8,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Unsigned 32-bit integer.
    UInt32,
    /// Unsigned 64-bit integer.
    UInt64,
    /// Unsigned 128-bit integer.
    UInt128,
    /// Unsigned 256-bit integer.
    UInt256,
    /// IEEE 754 single precision.
    Float32,
    /// IEEE 754 double precision.
    Float64,
    /// Fixed-point decimal.
    Decimal(DecimalDType),
    /// Length-prefixed bytes, usually UTF-8 text.
    String,
    /// Exactly `n` bytes per value, zero padded.
    FixedString(usize),
    /// Days since the epoch.
    Date,
    /// Seconds since the epoch, with an optional display timezone.
    DateTime(Option<Arc<str>>),
    /// Sub-second ticks since the epoch: precision, then an optional display timezone.
    DateTime64(u8, Option<Arc<str>>),
    /// 128-bit UUID.
    Uuid,
    /// IPv4 address.
    IPv4,
    /// IPv6 address.
    IPv6,
    /// A set of 64-bit integers in roaring bitmap encoding.
    BitMap64,
    /// The type of `NULL` literals; carries no data.
    Nothing,
    /// A string drawn from a fixed set, stored as an `i8` code.
    Enum8(Arc<EnumDType>),
    /// A string drawn from a fixed set, stored as an `i16` code.
    Enum16(Arc<EnumDType>),
    /// A value of the nested type, or null.
    Nullable(Arc<DataType>),
    /// A variable-length list of the nested type.
    Array(Arc<DataType>),
    /// A dictionary-coded column of the nested type.
    LowCardinality(Arc<DataType>),
    /// A list of key/value pairs.
    Map(Arc<DataType>, Arc<DataType>),
    /// A fixed sequence of fields, optionally named.
    Tuple(Arc<[TupleField]>),
}

/// One field of a [`DataType::Tuple`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleField {
    /// The field name, present for named tuples.
    pub name: Option<FieldName>,
    /// The field type.
    pub dtype: DataType,
}

impl TupleField {
    /// An unnamed field.
    pub fn unnamed(dtype: DataType) -> Self {
        Self { name: None, dtype }
    }

    /// A named field.
    pub fn named(name: impl Into<FieldName>, dtype: DataType) -> Self {
        Self {
            name: Some(name.into()),
            dtype,
        }
    }
}

/// The entries of an enum type, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumDType {
    entries: Vec<(std::string::String, i16)>,
}

impl EnumDType {
    /// Create an enum from `(name, code)` pairs. Names and codes must be unique.
    pub fn try_new(entries: Vec<(std::string::String, i16)>) -> ColwireResult<Self> {
        if entries.is_empty() {
            colwire_bail!(DataType: "an enum needs at least one entry");
        }
        if let Some((name, _)) = entries.iter().duplicates_by(|(name, _)| name).next() {
            colwire_bail!(DataType: "duplicate enum name '{}'", name);
        }
        if let Some((_, code)) = entries.iter().duplicates_by(|(_, code)| code).next() {
            colwire_bail!(DataType: "duplicate enum value {}", code);
        }
        Ok(Self { entries })
    }

    /// The `(name, code)` pairs.
    pub fn entries(&self) -> &[(std::string::String, i16)] {
        &self.entries
    }

    /// The name of `code`, if declared.
    pub fn name_of(&self, code: i16) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(name, _)| name.as_str())
    }

    /// The code of `name`, if declared.
    pub fn code_of(&self, name: &str) -> Option<i16> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, code)| *code)
    }

    /// The entry with the smallest code, used as the default value.
    pub fn min_entry(&self) -> Option<&(std::string::String, i16)> {
        self.entries.iter().min_by_key(|(_, code)| *code)
    }
}

impl DataType {
    /// Wrap `inner` in `Nullable`, rejecting types that cannot be null.
    pub fn nullable(inner: DataType) -> ColwireResult<Self> {
        match inner {
            Nullable(_) | Array(_) | Map(..) | Tuple(_) | LowCardinality(_) => Err(colwire_err!(
                DataType: "nested type {} cannot be inside Nullable type",
                inner
            )),
            _ => Ok(Nullable(Arc::new(inner))),
        }
    }

    /// Wrap `inner` in `LowCardinality`, rejecting types that cannot be dictionary coded.
    pub fn low_cardinality(inner: DataType) -> ColwireResult<Self> {
        let dictionary_type = match &inner {
            Nullable(nested) => nested.as_ref(),
            other => other,
        };
        if !dictionary_type.is_dictionary_key() {
            colwire_bail!(DataType: "LowCardinality({}) is not supported", inner);
        }
        Ok(LowCardinality(Arc::new(inner)))
    }

    /// Create a `Map` type. Keys cannot be nullable or compound.
    pub fn map(key: DataType, value: DataType) -> ColwireResult<Self> {
        let key_type = match &key {
            LowCardinality(nested) => nested.as_ref(),
            other => other,
        };
        if !key_type.is_dictionary_key() {
            colwire_bail!(DataType: "{} cannot be a Map key", key);
        }
        Ok(Map(Arc::new(key), Arc::new(value)))
    }

    /// Create a `Decimal(precision, scale)` type.
    pub fn decimal(precision: u8, scale: u8) -> ColwireResult<Self> {
        DecimalDType::try_new(precision, scale).map(Decimal)
    }

    /// Create a `DateTime64(precision[, tz])` type.
    pub fn datetime64(precision: u8, tz: Option<&str>) -> ColwireResult<Self> {
        if precision > datetime::MAX_DATETIME64_PRECISION {
            colwire_bail!(
                DataType: "DateTime64 precision {} exceeds {}",
                precision,
                datetime::MAX_DATETIME64_PRECISION
            );
        }
        Ok(DateTime64(precision, tz.map(Arc::from)))
    }

    fn is_dictionary_key(&self) -> bool {
        matches!(
            self,
            Int8 | Int16
                | Int32
                | Int64
                | Int128
                | UInt8
                | UInt16
                | UInt32
                | UInt64
                | UInt128
                | UInt256
                | Float32
                | Float64
                | Decimal(_)
                | String
                | FixedString(_)
                | Date
                | DateTime(_)
                | DateTime64(..)
                | Uuid
                | IPv4
                | IPv6
                | Enum8(_)
                | Enum16(_)
        )
    }

    /// The canonical type name.
    pub fn name(&self) -> std::string::String {
        self.to_string()
    }

    /// Whether values of this type can be null.
    pub fn is_nullable(&self) -> bool {
        match self {
            Nullable(_) | Nothing => true,
            LowCardinality(inner) => inner.is_nullable(),
            _ => false,
        }
    }

    /// The type inside `Nullable`, or `self`.
    pub fn unwrap_nullable(&self) -> &DataType {
        match self {
            Nullable(inner) => inner,
            other => other,
        }
    }

    /// Whether this is a signed integer type.
    pub fn is_signed_int(&self) -> bool {
        matches!(self, Int8 | Int16 | Int32 | Int64 | Int128)
    }

    /// Whether this is an unsigned integer type.
    pub fn is_unsigned_int(&self) -> bool {
        matches!(self, UInt8 | UInt16 | UInt32 | UInt64 | UInt128 | UInt256)
    }

    /// The number of bytes each value occupies on the wire, for fixed-width types.
    pub fn byte_width(&self) -> Option<usize> {
        Some(match self {
            Int8 | UInt8 | Enum8(_) => 1,
            Int16 | UInt16 | Enum16(_) | Date => 2,
            Int32 | UInt32 | Float32 | DateTime(_) | IPv4 => 4,
            Int64 | UInt64 | Float64 | DateTime64(..) => 8,
            Int128 | UInt128 | Uuid | IPv6 => 16,
            UInt256 => 32,
            Decimal(d) => d.byte_width(),
            FixedString(n) => *n,
            Nothing => 1,
            _ => return None,
        })
    }

    /// Display precision, reported to clients as column metadata.
    pub fn precision(&self) -> u32 {
        match self.unwrap_nullable() {
            Int8 => 4,
            Int16 => 6,
            Int32 => 11,
            Int64 => 20,
            Int128 => 40,
            UInt8 => 3,
            UInt16 => 5,
            UInt32 => 10,
            UInt64 => 20,
            UInt128 => 39,
            UInt256 => 78,
            Float32 => 8,
            Float64 => 17,
            Decimal(d) => u32::from(d.precision()),
            Date => 10,
            DateTime(_) => 19,
            DateTime64(p, _) => 20 + u32::from(*p),
            Uuid => 36,
            IPv4 => 15,
            IPv6 => 39,
            FixedString(n) => u32::try_from(*n).unwrap_or(u32::MAX),
            LowCardinality(inner) => inner.precision(),
            _ => 0,
        }
    }

    /// Display scale, reported to clients as column metadata.
    pub fn scale(&self) -> u32 {
        match self.unwrap_nullable() {
            Float32 => 8,
            Float64 => 17,
            Decimal(d) => u32::from(d.scale()),
            DateTime64(p, _) => u32::from(*p),
            LowCardinality(inner) => inner.scale(),
            _ => 0,
        }
    }

    /// The value a column of this type holds when none was supplied.
    pub fn default_value(&self) -> Value {
        match self {
            Int8 => Value::Int8(0),
            Int16 => Value::Int16(0),
            Int32 => Value::Int32(0),
            Int64 => Value::Int64(0),
            Int128 => Value::Int128(0),
            UInt8 => Value::UInt8(0),
            UInt16 => Value::UInt16(0),
            UInt32 => Value::UInt32(0),
            UInt64 => Value::UInt64(0),
            UInt128 => Value::UInt128(0),
            UInt256 => Value::UInt256(crate::U256::ZERO),
            Float32 => Value::Float32(0.0),
            Float64 => Value::Float64(0.0),
            Decimal(d) => Value::Decimal(crate::DecimalValue::new(0, d.scale())),
            String => Value::String(std::string::String::new()),
            FixedString(n) => Value::Bytes(vec![0; *n]),
            Date => Value::Date(jiff::civil::date(1970, 1, 1)),
            DateTime(_) | DateTime64(..) => Value::DateTime(jiff::Timestamp::UNIX_EPOCH),
            Uuid => Value::Uuid(uuid::Uuid::nil()),
            IPv4 => Value::IPv4(std::net::Ipv4Addr::UNSPECIFIED),
            IPv6 => Value::IPv6(std::net::Ipv6Addr::UNSPECIFIED),
            BitMap64 => Value::Bitmap(roaring::RoaringTreemap::new()),
            Enum8(e) | Enum16(e) => e
                .min_entry()
                .map_or(Value::Null, |(name, _)| Value::String(name.clone())),
            Nothing | Nullable(_) => Value::Null,
            LowCardinality(inner) => inner.default_value(),
            Array(_) => Value::Array(Vec::new()),
            Map(..) => Value::Map(Vec::new()),
            Tuple(fields) => Value::Tuple(fields.iter().map(|f| f.dtype.default_value()).collect()),
        }
    }
}

fn write_quoted(f: &mut Formatter<'_>, text: &str) -> std::fmt::Result {
    f.write_str("'")?;
    for c in text.chars() {
        match c {
            '\'' => f.write_str("\\'")?,
            '\\' => f.write_str("\\\\")?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("'")
}

fn write_field_name(f: &mut Formatter<'_>, name: &str) -> std::fmt::Result {
    let plain = name.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    if plain {
        f.write_str(name)
    } else {
        f.write_str("`")?;
        for c in name.chars() {
            match c {
                '`' => f.write_str("\\`")?,
                '\\' => f.write_str("\\\\")?,
                c => write!(f, "{c}")?,
            }
        }
        f.write_str("`")
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Int8 => write!(f, "Int8"),
            Int16 => write!(f, "Int16"),
            Int32 => write!(f, "Int32"),
            Int64 => write!(f, "Int64"),
            Int128 => write!(f, "Int128"),
            UInt8 => write!(f, "UInt8"),
            UInt16 => write!(f, "UInt16"),
            UInt32 => write!(f, "UInt32"),
            UInt64 => write!(f, "UInt64"),
            UInt128 => write!(f, "UInt128"),
            UInt256 => write!(f, "UInt256"),
            Float32 => write!(f, "Float32"),
            Float64 => write!(f, "Float64"),
            Decimal(d) => write!(f, "{d}"),
            String => write!(f, "String"),
            FixedString(n) => write!(f, "FixedString({n})"),
            Date => write!(f, "Date"),
            DateTime(None) => write!(f, "DateTime"),
            DateTime(Some(tz)) => {
                f.write_str("DateTime(")?;
                write_quoted(f, tz)?;
                f.write_str(")")
            }
            DateTime64(p, None) => write!(f, "DateTime64({p})"),
            DateTime64(p, Some(tz)) => {
                write!(f, "DateTime64({p}, ")?;
                write_quoted(f, tz)?;
                f.write_str(")")
            }
            Uuid => write!(f, "UUID"),
            IPv4 => write!(f, "IPv4"),
            IPv6 => write!(f, "IPv6"),
            BitMap64 => write!(f, "BitMap64"),
            Nothing => write!(f, "Nothing"),
            Enum8(e) | Enum16(e) => {
                f.write_str(if matches!(self, Enum8(_)) { "Enum8(" } else { "Enum16(" })?;
                for (i, (name, code)) in e.entries().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_quoted(f, name)?;
                    write!(f, " = {code}")?;
                }
                f.write_str(")")
            }
            Nullable(inner) => write!(f, "Nullable({inner})"),
            Array(inner) => write!(f, "Array({inner})"),
            LowCardinality(inner) => write!(f, "LowCardinality({inner})"),
            Map(k, v) => write!(f, "Map({k}, {v})"),
            Tuple(fields) => {
                f.write_str("Tuple(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    if let Some(name) = &field.name {
                        write_field_name(f, name)?;
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", field.dtype)?;
                }
                f.write_str(")")
            }
        }
    }
}

//! Row-at-a-time binary encoding of single values.
//!
//! Fixed-width scalars are little-endian, strings are varint-length prefixed, and compound
//! values nest: a `Nullable` value is a null flag followed by the value when present, an
//! `Array` or `Map` is a varint count followed by its elements (keys and values interleaved
//! per entry), and a `Tuple` is its fields in order.

use std::net::{Ipv4Addr, Ipv6Addr};

use colwire_error::{ColwireError, ColwireResult, colwire_bail, colwire_err};
use colwire_io::{WireRead, WireWrite};
use roaring::RoaringTreemap;
use uuid::Uuid;

use crate::datetime::{
    date_to_days, days_to_date, seconds_to_timestamp, ticks_to_timestamp, timestamp_to_seconds,
    timestamp_to_ticks,
};
use crate::{DataType, DecimalValue, EnumDType, U256, Value};

/// Collections larger than this are grown as they are read rather than reserved up front.
const MAX_RESERVE: usize = 4096;

impl DataType {
    /// Write one value. The value must already be coerced to this type.
    pub fn serialize_one<W: WireWrite>(&self, value: &Value, out: &mut W) -> ColwireResult<()> {
        match (self, value) {
            (DataType::Int8, Value::Int8(v)) => out.write_i8(*v),
            (DataType::Int16, Value::Int16(v)) => out.write_i16(*v),
            (DataType::Int32, Value::Int32(v)) => out.write_i32(*v),
            (DataType::Int64, Value::Int64(v)) => out.write_i64(*v),
            (DataType::Int128, Value::Int128(v)) => out.write_i128(*v),
            (DataType::UInt8, Value::UInt8(v)) => out.write_u8(*v),
            (DataType::UInt16, Value::UInt16(v)) => out.write_u16(*v),
            (DataType::UInt32, Value::UInt32(v)) => out.write_u32(*v),
            (DataType::UInt64, Value::UInt64(v)) => out.write_u64(*v),
            (DataType::UInt128, Value::UInt128(v)) => out.write_u128(*v),
            (DataType::UInt256, Value::UInt256(v)) => out.write_all_bytes(&v.to_le_bytes()),
            (DataType::Float32, Value::Float32(v)) => out.write_f32(*v),
            (DataType::Float64, Value::Float64(v)) => out.write_f64(*v),
            (DataType::Decimal(d), Value::Decimal(v)) => {
                let mantissa = d.rescale(v.mantissa, v.scale)?;
                match d.byte_width() {
                    4 => out.write_i32(self.mantissa_fits(mantissa)?),
                    8 => out.write_i64(self.mantissa_fits(mantissa)?),
                    _ => out.write_i128(mantissa),
                }
            }
            (DataType::String, Value::String(s)) => out.write_string(s),
            (DataType::String, Value::Bytes(b)) => out.write_binary(b),
            (DataType::FixedString(n), v @ (Value::String(_) | Value::Bytes(_))) => {
                let bytes = v.as_bytes().unwrap_or_default();
                if bytes.len() > *n {
                    colwire_bail!(DataType: "{} bytes do not fit {}", bytes.len(), self);
                }
                out.write_all_bytes(bytes)?;
                out.write_all_bytes(&vec![0; n - bytes.len()])
            }
            (DataType::Date, Value::Date(d)) => out.write_u16(date_to_days(*d)?),
            (DataType::DateTime(_), Value::DateTime(ts)) => {
                out.write_u32(timestamp_to_seconds(*ts)?)
            }
            (DataType::DateTime64(precision, _), Value::DateTime(ts)) => {
                out.write_i64(timestamp_to_ticks(*ts, *precision)?)
            }
            (DataType::Uuid, Value::Uuid(u)) => {
                let (high, low) = u.as_u64_pair();
                out.write_u64(high)?;
                out.write_u64(low)
            }
            (DataType::IPv4, Value::IPv4(ip)) => out.write_u32(u32::from(*ip)),
            (DataType::IPv6, Value::IPv6(ip)) => out.write_all_bytes(&ip.octets()),
            (DataType::BitMap64, Value::Bitmap(bitmap)) => {
                let mut bytes = Vec::with_capacity(bitmap.serialized_size());
                bitmap.serialize_into(&mut bytes)?;
                out.write_binary(&bytes)
            }
            (DataType::Nothing, _) => out.write_u8(b'0'),
            (DataType::Enum8(e), Value::String(name)) => {
                let code = enum_code(e, name, self)?;
                out.write_i8(i8::try_from(code).map_err(|_| self.bad_value(value))?)
            }
            (DataType::Enum16(e), Value::String(name)) => out.write_i16(enum_code(e, name, self)?),
            (DataType::Nullable(_), Value::Null) => out.write_u8(1),
            (DataType::Nullable(inner), v) => {
                out.write_u8(0)?;
                inner.serialize_one(v, out)
            }
            (DataType::LowCardinality(inner), v) => inner.serialize_one(v, out),
            (DataType::Array(element), Value::Array(values)) => {
                out.write_length(values.len())?;
                values.iter().try_for_each(|v| element.serialize_one(v, out))
            }
            (DataType::Map(key, val), Value::Map(entries)) => {
                out.write_length(entries.len())?;
                entries.iter().try_for_each(|(k, v)| {
                    key.serialize_one(k, out)?;
                    val.serialize_one(v, out)
                })
            }
            (DataType::Tuple(fields), Value::Tuple(values)) if fields.len() == values.len() => fields
                .iter()
                .zip(values)
                .try_for_each(|(field, v)| field.dtype.serialize_one(v, out)),
            _ => Err(self.bad_value(value)),
        }
    }

    /// Read one value.
    pub fn deserialize_one<R: WireRead>(&self, input: &mut R) -> ColwireResult<Value> {
        Ok(match self {
            DataType::Int8 => Value::Int8(input.read_i8()?),
            DataType::Int16 => Value::Int16(input.read_i16()?),
            DataType::Int32 => Value::Int32(input.read_i32()?),
            DataType::Int64 => Value::Int64(input.read_i64()?),
            DataType::Int128 => Value::Int128(input.read_i128()?),
            DataType::UInt8 => Value::UInt8(input.read_u8()?),
            DataType::UInt16 => Value::UInt16(input.read_u16()?),
            DataType::UInt32 => Value::UInt32(input.read_u32()?),
            DataType::UInt64 => Value::UInt64(input.read_u64()?),
            DataType::UInt128 => Value::UInt128(input.read_u128()?),
            DataType::UInt256 => {
                let mut bytes = [0u8; 32];
                input.read_exact_bytes(&mut bytes)?;
                Value::UInt256(U256::from_le_bytes(bytes))
            }
            DataType::Float32 => Value::Float32(input.read_f32()?),
            DataType::Float64 => Value::Float64(input.read_f64()?),
            DataType::Decimal(d) => {
                let mantissa = match d.byte_width() {
                    4 => i128::from(input.read_i32()?),
                    8 => i128::from(input.read_i64()?),
                    _ => input.read_i128()?,
                };
                Value::Decimal(DecimalValue::new(mantissa, d.scale()))
            }
            DataType::String => match String::from_utf8(input.read_binary()?) {
                Ok(s) => Value::String(s),
                Err(e) => Value::Bytes(e.into_bytes()),
            },
            DataType::FixedString(n) => Value::Bytes(input.read_bytes(*n)?),
            DataType::Date => Value::Date(days_to_date(input.read_u16()?)?),
            DataType::DateTime(_) => Value::DateTime(seconds_to_timestamp(input.read_u32()?)?),
            DataType::DateTime64(precision, _) => {
                Value::DateTime(ticks_to_timestamp(input.read_i64()?, *precision)?)
            }
            DataType::Uuid => {
                let high = input.read_u64()?;
                let low = input.read_u64()?;
                Value::Uuid(Uuid::from_u64_pair(high, low))
            }
            DataType::IPv4 => Value::IPv4(Ipv4Addr::from(input.read_u32()?)),
            DataType::IPv6 => {
                let mut octets = [0u8; 16];
                input.read_exact_bytes(&mut octets)?;
                Value::IPv6(Ipv6Addr::from(octets))
            }
            DataType::BitMap64 => {
                let bytes = input.read_binary()?;
                let bitmap = RoaringTreemap::deserialize_from(bytes.as_slice())
                    .map_err(|e| colwire_err!(Protocol: "invalid BitMap64 value: {}", e))?;
                Value::Bitmap(bitmap)
            }
            DataType::Nothing => {
                input.read_u8()?;
                Value::Null
            }
            DataType::Enum8(e) => enum_name(e, i16::from(input.read_i8()?), self)?,
            DataType::Enum16(e) => enum_name(e, input.read_i16()?, self)?,
            DataType::Nullable(inner) => {
                if input.read_bool()? {
                    Value::Null
                } else {
                    inner.deserialize_one(input)?
                }
            }
            DataType::LowCardinality(inner) => inner.deserialize_one(input)?,
            DataType::Array(element) => {
                let len = input.read_length()?;
                let mut values = Vec::with_capacity(len.min(MAX_RESERVE));
                for _ in 0..len {
                    values.push(element.deserialize_one(input)?);
                }
                Value::Array(values)
            }
            DataType::Map(key, val) => {
                let len = input.read_length()?;
                let mut entries = Vec::with_capacity(len.min(MAX_RESERVE));
                for _ in 0..len {
                    let k = key.deserialize_one(input)?;
                    let v = val.deserialize_one(input)?;
                    entries.push((k, v));
                }
                Value::Map(entries)
            }
            DataType::Tuple(fields) => Value::Tuple(
                fields
                    .iter()
                    .map(|field| field.dtype.deserialize_one(input))
                    .collect::<ColwireResult<_>>()?,
            ),
        })
    }

    fn bad_value(&self, value: &Value) -> ColwireError {
        colwire_err!(DataType: "cannot write {} {} as {}", value.kind(), value, self)
    }

    fn mantissa_fits<T: TryFrom<i128>>(&self, mantissa: i128) -> ColwireResult<T> {
        T::try_from(mantissa)
            .map_err(|_| colwire_err!(DataType: "mantissa {} does not fit {}", mantissa, self))
    }
}

fn enum_code(e: &EnumDType, name: &str, dtype: &DataType) -> ColwireResult<i16> {
    e.code_of(name)
        .ok_or_else(|| colwire_err!(DataType: "'{}' is not a member of {}", name, dtype))
}

fn enum_name(e: &EnumDType, code: i16, dtype: &DataType) -> ColwireResult<Value> {
    e.name_of(code)
        .map(|name| Value::String(name.to_string()))
        .ok_or_else(|| colwire_err!(Protocol: "unknown value {} for {}", code, dtype))
}

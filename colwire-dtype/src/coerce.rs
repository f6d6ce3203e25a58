use std::net::{IpAddr, Ipv4Addr};

use colwire_error::{ColwireError, ColwireResult, colwire_bail, colwire_err};
use jiff::tz::TimeZone;
use roaring::RoaringTreemap;
use uuid::Uuid;

use crate::datetime::{
    days_to_date, parse_date, parse_datetime, seconds_to_timestamp, ticks_to_timestamp,
    timestamp_to_seconds, timestamp_to_ticks, timezone,
};
use crate::{DataType, DecimalValue, Number, U256, Value};

impl DataType {
    /// Convert `value` into the canonical [`Value`] variant for this type.
    ///
    /// Null becomes the type's default unless the type is nullable. Numbers convert between
    /// widths when the value fits, and text converts into dates, UUIDs, addresses, decimals and
    /// numbers. The result is exactly what [`DataType::deserialize_one`] yields after a round
    /// trip through [`DataType::serialize_one`].
    pub fn coerce(&self, value: Value) -> ColwireResult<Value> {
        if value.is_null() {
            return Ok(if self.is_nullable() {
                Value::Null
            } else {
                self.default_value()
            });
        }

        match self {
            DataType::Int8 => self.integer(&value).and_then(|v| self.narrow(v).map(Value::Int8)),
            DataType::Int16 => self.integer(&value).and_then(|v| self.narrow(v).map(Value::Int16)),
            DataType::Int32 => self.integer(&value).and_then(|v| self.narrow(v).map(Value::Int32)),
            DataType::Int64 => self.integer(&value).and_then(|v| self.narrow(v).map(Value::Int64)),
            DataType::Int128 => self.integer(&value).map(Value::Int128),
            DataType::UInt8 => self.integer(&value).and_then(|v| self.narrow(v).map(Value::UInt8)),
            DataType::UInt16 => self.integer(&value).and_then(|v| self.narrow(v).map(Value::UInt16)),
            DataType::UInt32 => self.integer(&value).and_then(|v| self.narrow(v).map(Value::UInt32)),
            DataType::UInt64 => self.integer(&value).and_then(|v| self.narrow(v).map(Value::UInt64)),
            DataType::UInt128 => match value {
                Value::UInt128(v) => Ok(Value::UInt128(v)),
                Value::UInt256(v) => v
                    .to_u128()
                    .map(Value::UInt128)
                    .ok_or_else(|| self.out_of_range(&value)),
                Value::String(ref s) => s
                    .trim()
                    .parse::<u128>()
                    .map(Value::UInt128)
                    .map_err(|_| self.mismatch(&value)),
                _ => self.integer(&value).and_then(|v| self.narrow(v).map(Value::UInt128)),
            },
            DataType::UInt256 => match value {
                Value::UInt256(v) => Ok(Value::UInt256(v)),
                Value::UInt128(v) => Ok(Value::UInt256(U256::from(v))),
                Value::String(ref s) => U256::parse_decimal(s.trim()).map(Value::UInt256),
                _ => self
                    .integer(&value)
                    .and_then(|v| self.narrow::<u128>(v))
                    .map(|v| Value::UInt256(U256::from(v))),
            },
            DataType::Float32 => self.float(&value).map(|v| {
                #[allow(clippy::cast_possible_truncation)]
                let narrow = v as f32;
                Value::Float32(narrow)
            }),
            DataType::Float64 => self.float(&value).map(Value::Float64),
            DataType::Decimal(d) => {
                let decimal = match value {
                    Value::Decimal(v) => v,
                    Value::String(ref s) => DecimalValue::parse(s.trim())?,
                    Value::Float32(_) | Value::Float64(_) => {
                        let v = value.as_f64().ok_or_else(|| self.mismatch(&value))?;
                        if !v.is_finite() {
                            return Err(self.mismatch(&value));
                        }
                        DecimalValue::parse(&v.to_string())?
                    }
                    ref other => DecimalValue::new(self.integer(other)?, 0),
                };
                Ok(Value::Decimal(DecimalValue::new(
                    d.rescale(decimal.mantissa, decimal.scale)?,
                    d.scale(),
                )))
            }
            DataType::String => match value {
                Value::String(_) | Value::Bytes(_) => Ok(value),
                Value::Uuid(u) => Ok(Value::String(u.to_string())),
                Value::IPv4(ip) => Ok(Value::String(ip.to_string())),
                Value::IPv6(ip) => Ok(Value::String(ip.to_string())),
                ref v if v.as_i128().is_some() || v.as_f64().is_some() => {
                    Ok(Value::String(v.to_string()))
                }
                _ => Err(self.mismatch(&value)),
            },
            DataType::FixedString(n) => {
                let mut bytes = match value {
                    Value::String(s) => s.into_bytes(),
                    Value::Bytes(b) => b,
                    other => return Err(self.mismatch(&other)),
                };
                if bytes.len() > *n {
                    colwire_bail!(
                        DataType: "{} bytes do not fit {}",
                        bytes.len(),
                        self
                    );
                }
                bytes.resize(*n, 0);
                Ok(Value::Bytes(bytes))
            }
            DataType::Date => match value {
                Value::Date(d) => Ok(Value::Date(d)),
                Value::String(ref s) => parse_date(s).map(Value::Date),
                Value::DateTime(ts) => Ok(Value::Date(ts.to_zoned(TimeZone::UTC).date())),
                _ => {
                    let days = self.integer(&value).and_then(|v| self.narrow::<u16>(v))?;
                    days_to_date(days).map(Value::Date)
                }
            },
            DataType::DateTime(tz) => {
                let ts = match value {
                    Value::DateTime(ts) => ts,
                    _ if self.integer(&value).is_ok() => {
                        let seconds = self.integer(&value).and_then(|v| self.narrow::<u32>(v))?;
                        seconds_to_timestamp(seconds)?
                    }
                    _ => self.instant(value, tz.as_deref())?,
                };
                seconds_to_timestamp(timestamp_to_seconds(ts)?).map(Value::DateTime)
            }
            DataType::DateTime64(precision, tz) => {
                let ts = match value {
                    Value::DateTime(ts) => ts,
                    _ if self.integer(&value).is_ok() => {
                        let ticks = self.integer(&value).and_then(|v| self.narrow::<i64>(v))?;
                        ticks_to_timestamp(ticks, *precision)?
                    }
                    _ => self.instant(value, tz.as_deref())?,
                };
                ticks_to_timestamp(timestamp_to_ticks(ts, *precision)?, *precision)
                    .map(Value::DateTime)
            }
            DataType::Uuid => match value {
                Value::Uuid(u) => Ok(Value::Uuid(u)),
                Value::String(ref s) => Uuid::parse_str(s.trim())
                    .map(Value::Uuid)
                    .map_err(|e| colwire_err!(DataType: "invalid UUID '{}': {}", s, e)),
                _ => Err(self.mismatch(&value)),
            },
            DataType::IPv4 => match value {
                Value::IPv4(ip) => Ok(Value::IPv4(ip)),
                Value::UInt32(v) => Ok(Value::IPv4(Ipv4Addr::from(v))),
                Value::String(ref s) => s
                    .trim()
                    .parse::<Ipv4Addr>()
                    .map(Value::IPv4)
                    .map_err(|e| colwire_err!(DataType: "invalid IPv4 address '{}': {}", s, e)),
                _ => Err(self.mismatch(&value)),
            },
            DataType::IPv6 => match value {
                Value::IPv6(ip) => Ok(Value::IPv6(ip)),
                Value::IPv4(ip) => Ok(Value::IPv6(ip.to_ipv6_mapped())),
                Value::String(ref s) => match s.trim().parse::<IpAddr>() {
                    Ok(IpAddr::V4(ip)) => Ok(Value::IPv6(ip.to_ipv6_mapped())),
                    Ok(IpAddr::V6(ip)) => Ok(Value::IPv6(ip)),
                    Err(e) => Err(colwire_err!(DataType: "invalid IPv6 address '{}': {}", s, e)),
                },
                _ => Err(self.mismatch(&value)),
            },
            DataType::BitMap64 => match value {
                Value::Bitmap(b) => Ok(Value::Bitmap(b)),
                Value::Array(values) => values
                    .iter()
                    .map(|v| self.integer(v).and_then(|v| self.narrow::<u64>(v)))
                    .collect::<ColwireResult<RoaringTreemap>>()
                    .map(Value::Bitmap),
                _ => Err(self.mismatch(&value)),
            },
            DataType::Nothing => Err(self.mismatch(&value)),
            DataType::Enum8(e) | DataType::Enum16(e) => match value {
                Value::String(name) => match e.code_of(&name) {
                    Some(_) => Ok(Value::String(name)),
                    None => Err(colwire_err!(DataType: "'{}' is not a member of {}", name, self)),
                },
                _ => {
                    let code = self.integer(&value).and_then(|v| self.narrow::<i16>(v))?;
                    e.name_of(code)
                        .map(|name| Value::String(name.to_string()))
                        .ok_or_else(|| colwire_err!(DataType: "{} is not a value of {}", code, self))
                }
            },
            DataType::Nullable(inner) | DataType::LowCardinality(inner) => inner.coerce(value),
            DataType::Array(element) => match value {
                Value::Array(values) => values
                    .into_iter()
                    .map(|v| element.coerce(v))
                    .collect::<ColwireResult<Vec<_>>>()
                    .map(Value::Array),
                _ => Err(self.mismatch(&value)),
            },
            DataType::Map(key, val) => match value {
                Value::Map(entries) => entries
                    .into_iter()
                    .map(|(k, v)| Ok((key.coerce(k)?, val.coerce(v)?)))
                    .collect::<ColwireResult<Vec<_>>>()
                    .map(Value::Map),
                _ => Err(self.mismatch(&value)),
            },
            DataType::Tuple(fields) => match value {
                Value::Tuple(values) | Value::Array(values) if values.len() == fields.len() => {
                    fields
                        .iter()
                        .zip(values)
                        .map(|(field, v)| field.dtype.coerce(v))
                        .collect::<ColwireResult<Vec<_>>>()
                        .map(Value::Tuple)
                }
                _ => Err(self.mismatch(&value)),
            },
        }
    }

    fn mismatch(&self, value: &Value) -> ColwireError {
        colwire_err!(DataType: "cannot convert {} {} to {}", value.kind(), value, self)
    }

    fn out_of_range(&self, value: &Value) -> ColwireError {
        colwire_err!(DataType: "{} is out of range for {}", value, self)
    }

    fn integer(&self, value: &Value) -> ColwireResult<i128> {
        if let Some(v) = value.as_i128() {
            return Ok(v);
        }
        match value {
            Value::Float32(_) | Value::Float64(_) => {
                let v = value.as_f64().unwrap_or(f64::NAN);
                if v.fract() == 0.0 && v.abs() < 1e38 {
                    #[allow(clippy::cast_possible_truncation)]
                    let integral = v as i128;
                    Ok(integral)
                } else {
                    Err(self.mismatch(value))
                }
            }
            Value::Decimal(d) if d.scale == 0 => Ok(d.mantissa),
            Value::String(s) => match Number::parse(s.trim()) {
                Ok(n) => n.as_i128().ok_or_else(|| self.mismatch(value)),
                Err(_) => Err(self.mismatch(value)),
            },
            _ => Err(self.mismatch(value)),
        }
    }

    fn narrow<T: TryFrom<i128>>(&self, value: i128) -> ColwireResult<T> {
        T::try_from(value).map_err(|_| colwire_err!(DataType: "{} is out of range for {}", value, self))
    }

    fn float(&self, value: &Value) -> ColwireResult<f64> {
        match value {
            Value::String(s) => {
                let text = s.trim();
                match text.to_ascii_lowercase().as_str() {
                    "nan" => Ok(f64::NAN),
                    "inf" | "+inf" => Ok(f64::INFINITY),
                    "-inf" => Ok(f64::NEG_INFINITY),
                    _ => Number::parse(text)
                        .map(|n| n.as_f64())
                        .map_err(|_| self.mismatch(value)),
                }
            }
            other => other.as_f64().ok_or_else(|| self.mismatch(other)),
        }
    }

    fn instant(&self, value: Value, tz: Option<&str>) -> ColwireResult<jiff::Timestamp> {
        let tz = tz.map(timezone).transpose()?.unwrap_or(TimeZone::UTC);
        match value {
            Value::String(ref s) => parse_datetime(s, &tz),
            Value::Date(d) => d
                .to_zoned(tz)
                .map(|z| z.timestamp())
                .map_err(|e| colwire_err!(DataType: "invalid date {}: {}", d, e)),
            other => Err(self.mismatch(&other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::rstest;

    use super::*;
    use crate::TypeRegistry;

    fn dtype(name: &str) -> DataType {
        TypeRegistry::default().get(name).unwrap()
    }

    #[rstest]
    #[case("Int8", Value::Int64(-128), Value::Int8(-128))]
    #[case("UInt16", Value::from("65535"), Value::UInt16(u16::MAX))]
    #[case("UInt64", Value::Float64(3.0), Value::UInt64(3))]
    #[case("Int32", Value::Null, Value::Int32(0))]
    #[case("Nullable(Int32)", Value::Null, Value::Null)]
    #[case("Float32", Value::Int32(2), Value::Float32(2.0))]
    #[case("Decimal(10, 2)", Value::from("12.3"), Value::Decimal(DecimalValue::new(1230, 2)))]
    #[case("Decimal(10, 2)", Value::Int32(7), Value::Decimal(DecimalValue::new(700, 2)))]
    #[case("FixedString(3)", Value::from("ab"), Value::Bytes(b"ab\0".to_vec()))]
    #[case("UInt256", Value::UInt64(9), Value::UInt256(U256::from(9u64)))]
    #[case("IPv6", Value::from("10.0.0.1"), Value::IPv6(Ipv4Addr::new(10, 0, 0, 1).to_ipv6_mapped()))]
    #[case("Array(Nullable(Int8))", Value::Array(vec![Value::Int32(1), Value::Null]), Value::Array(vec![Value::Int8(1), Value::Null]))]
    fn coercions(#[case] name: &str, #[case] input: Value, #[case] expected: Value) {
        assert_eq!(dtype(name).coerce(input).unwrap(), expected);
    }

    #[rstest]
    #[case("Int8", Value::Int32(128))]
    #[case("UInt8", Value::Int32(-1))]
    #[case("Int32", Value::Float64(1.5))]
    #[case("FixedString(2)", Value::from("abc"))]
    #[case("Decimal(4, 2)", Value::from("123.45"))]
    #[case("Decimal(10, 2)", Value::from("1.234"))]
    #[case("UUID", Value::from("not-a-uuid"))]
    #[case("Enum8('a' = 1)", Value::from("b"))]
    #[case("Enum8('a' = 1)", Value::Int8(2))]
    #[case("Tuple(Int8, String)", Value::Tuple(vec![Value::Int8(1)]))]
    #[case("DateTime", Value::from("2200-01-01 00:00:00"))]
    fn rejections(#[case] name: &str, #[case] input: Value) {
        assert!(dtype(name).coerce(input).is_err());
    }

    #[test]
    fn enums_accept_codes() {
        let e = dtype("Enum16('x' = -5, 'y' = 300)");
        assert_eq!(e.coerce(Value::Int32(300)).unwrap(), Value::from("y"));
        assert_eq!(e.coerce(Value::Null).unwrap(), Value::from("x"));
    }

    #[test]
    fn datetimes_truncate_to_precision() {
        let dt64 = dtype("DateTime64(3, 'UTC')");
        let value = dt64.coerce(Value::from("2000-01-01 00:00:00.123456")).unwrap();
        let expected = parse_datetime("2000-01-01 00:00:00.123", &TimeZone::UTC).unwrap();
        assert_eq!(value, Value::DateTime(expected));

        let dt = DataType::DateTime(Some(Arc::from("UTC")));
        assert_eq!(
            dt.coerce(Value::UInt32(946_684_800)).unwrap(),
            Value::DateTime(parse_datetime("2000-01-01", &TimeZone::UTC).unwrap())
        );
    }
}

//! Column buffers, one variant per wire layout.
//!
//! A [`Column`] accumulates the values of one column of a block, row by row, and encodes them
//! in bulk. Each variant owns its children outright; a parent sequences its children's bulk
//! writes in the order the wire expects.

mod array;
mod dict;
mod map;
mod nullable;
mod scalar;
mod tuple;

use std::ops::Range;

pub use array::*;
use colwire_dtype::{DataType, Value};
use colwire_error::{ColwireResult, colwire_bail, colwire_err};
use colwire_io::{WireRead, WireWrite};
pub use dict::*;
pub use map::*;
pub use nullable::*;
pub use scalar::*;
pub use tuple::*;

/// Offsets beyond this are not addressable in memory.
const MAX_OFFSET: u64 = u64::MAX >> 1;

/// Reads larger than this are grown as values arrive rather than reserved up front.
const MAX_RESERVE: usize = 4096;

/// The values of one column, in the layout the column's type is encoded with.
#[derive(Debug, Clone)]
pub enum Column {
    /// A type encoded as one value after another.
    Scalar(ScalarColumn),
    /// A null map followed by the nested values.
    Nullable(NullableColumn),
    /// Offsets followed by the flattened elements.
    Array(ArrayColumn),
    /// Offsets followed by all keys, then all values.
    Map(MapColumn),
    /// A dictionary followed by per-row indices.
    LowCardinality(LowCardinalityColumn),
    /// Each field as its own column.
    Tuple(TupleColumn),
}

impl Column {
    /// An empty column for `dtype`.
    pub fn new(dtype: &DataType) -> Self {
        match dtype {
            DataType::Nullable(inner) => Self::Nullable(NullableColumn::new(dtype.clone(), inner)),
            DataType::Array(element) => Self::Array(ArrayColumn::new(dtype.clone(), element)),
            DataType::Map(key, value) => Self::Map(MapColumn::new(dtype.clone(), key, value)),
            DataType::LowCardinality(inner) => {
                Self::LowCardinality(LowCardinalityColumn::new(dtype.clone(), inner))
            }
            DataType::Tuple(_) => Self::Tuple(TupleColumn::new(dtype.clone())),
            _ => Self::Scalar(ScalarColumn::new(dtype.clone())),
        }
    }

    /// The type of the column's values.
    pub fn dtype(&self) -> &DataType {
        match self {
            Self::Scalar(c) => c.dtype(),
            Self::Nullable(c) => c.dtype(),
            Self::Array(c) => c.dtype(),
            Self::Map(c) => c.dtype(),
            Self::LowCardinality(c) => c.dtype(),
            Self::Tuple(c) => c.dtype(),
        }
    }

    /// The number of rows.
    pub fn len(&self) -> usize {
        match self {
            Self::Scalar(c) => c.len(),
            Self::Nullable(c) => c.len(),
            Self::Array(c) => c.len(),
            Self::Map(c) => c.len(),
            Self::LowCardinality(c) => c.len(),
            Self::Tuple(c) => c.len(),
        }
    }

    /// Whether the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append one row, coercing the value to the column's type. Nulls written to a column
    /// that cannot hold them become the type's default value.
    pub fn push(&mut self, value: Value) -> ColwireResult<()> {
        let value = self.dtype().coerce(value)?;
        self.push_coerced(value)
    }

    /// Append a value already coerced to the column's type. On error the column is left as
    /// it was.
    pub fn push_coerced(&mut self, value: Value) -> ColwireResult<()> {
        match self {
            Self::Scalar(c) => {
                c.push(value);
                Ok(())
            }
            Self::Nullable(c) => c.push(value),
            Self::Array(c) => c.push(value),
            Self::Map(c) => c.push(value),
            Self::LowCardinality(c) => c.push(value),
            Self::Tuple(c) => c.push(value),
        }
    }

    /// The value at `row`.
    pub fn get(&self, row: usize) -> ColwireResult<Value> {
        if row >= self.len() {
            return Err(colwire_err!(OutOfBounds: row, 0, self.len()));
        }
        match self {
            Self::Scalar(c) => c.get(row),
            Self::Nullable(c) => c.get(row),
            Self::Array(c) => c.get(row),
            Self::Map(c) => c.get(row),
            Self::LowCardinality(c) => c.get(row),
            Self::Tuple(c) => c.get(row),
        }
    }

    /// Every row's value, in order.
    pub fn values(&self) -> ColwireResult<Vec<Value>> {
        (0..self.len()).map(|row| self.get(row)).collect()
    }

    /// Drop every row from `len` onwards.
    pub fn truncate(&mut self, len: usize) {
        match self {
            Self::Scalar(c) => c.truncate(len),
            Self::Nullable(c) => c.truncate(len),
            Self::Array(c) => c.truncate(len),
            Self::Map(c) => c.truncate(len),
            Self::LowCardinality(c) => c.truncate(len),
            Self::Tuple(c) => c.truncate(len),
        }
    }

    /// Drop every row, including the state of nested columns and dictionaries, keeping the
    /// allocations for reuse.
    pub fn clear(&mut self) {
        match self {
            Self::Scalar(c) => c.clear(),
            Self::Nullable(c) => c.clear(),
            Self::Array(c) => c.clear(),
            Self::Map(c) => c.clear(),
            Self::LowCardinality(c) => c.clear(),
            Self::Tuple(c) => c.clear(),
        }
    }

    /// Check that every auxiliary structure (null map, offsets, indices, nested columns)
    /// agrees with the row count.
    pub fn check_consistency(&self) -> ColwireResult<()> {
        match self {
            Self::Scalar(_) => Ok(()),
            Self::Nullable(c) => c.check_consistency(),
            Self::Array(c) => c.check_consistency(),
            Self::Map(c) => c.check_consistency(),
            Self::LowCardinality(c) => c.check_consistency(),
            Self::Tuple(c) => c.check_consistency(),
        }
    }

    /// Write every row in the column's bulk layout.
    pub fn serialize_bulk<W: WireWrite>(&self, out: &mut W) -> ColwireResult<()> {
        match self {
            Self::Scalar(c) => c.serialize_bulk(out),
            Self::Nullable(c) => c.serialize_bulk(out),
            Self::Array(c) => c.serialize_bulk(out),
            Self::Map(c) => c.serialize_bulk(out),
            Self::LowCardinality(c) => c.serialize_bulk(out),
            Self::Tuple(c) => c.serialize_bulk(out),
        }
    }

    /// Read `rows` rows of `dtype` in bulk layout.
    pub fn deserialize_bulk<R: WireRead>(
        dtype: &DataType,
        rows: usize,
        input: &mut R,
    ) -> ColwireResult<Self> {
        Ok(match dtype {
            DataType::Nullable(inner) => {
                Self::Nullable(NullableColumn::deserialize_bulk(dtype.clone(), inner, rows, input)?)
            }
            DataType::Array(element) => {
                Self::Array(ArrayColumn::deserialize_bulk(dtype.clone(), element, rows, input)?)
            }
            DataType::Map(key, value) => {
                Self::Map(MapColumn::deserialize_bulk(dtype.clone(), key, value, rows, input)?)
            }
            DataType::LowCardinality(inner) => Self::LowCardinality(
                LowCardinalityColumn::deserialize_bulk(dtype.clone(), inner, rows, input)?,
            ),
            DataType::Tuple(_) => {
                Self::Tuple(TupleColumn::deserialize_bulk(dtype.clone(), rows, input)?)
            }
            _ => Self::Scalar(ScalarColumn::deserialize_bulk(dtype.clone(), rows, input)?),
        })
    }

    /// Write the column as part of a block. An exported column, one with a name, is preceded
    /// by its name and type name; nested columns pass `None`. A column without rows writes no
    /// data.
    pub fn flush_to_wire<W: WireWrite>(&self, name: Option<&str>, out: &mut W) -> ColwireResult<()> {
        if let Some(name) = name {
            out.write_string(name)?;
            out.write_string(&self.dtype().name())?;
        }
        if self.is_empty() {
            return Ok(());
        }
        self.check_consistency()?;
        self.serialize_bulk(out)
    }
}

/// The element range of `row` given cumulative end offsets.
fn offset_range(offsets: &[usize], row: usize) -> Range<usize> {
    let start = row.checked_sub(1).map_or(0, |prev| offsets[prev]);
    start..offsets[row]
}

fn write_offsets<W: WireWrite>(offsets: &[usize], out: &mut W) -> ColwireResult<()> {
    offsets
        .iter()
        .try_for_each(|&offset| out.write_u64(offset as u64))
}

/// Read `rows` end offsets, which must not decrease and must stay addressable.
fn read_offsets<R: WireRead>(rows: usize, input: &mut R) -> ColwireResult<Vec<usize>> {
    let mut offsets = Vec::with_capacity(rows.min(MAX_RESERVE));
    let mut previous = 0u64;
    for row in 0..rows {
        let offset = input.read_u64()?;
        if offset < previous {
            colwire_bail!(Protocol: "offset {} at row {} is below the previous offset {}", offset, row, previous);
        }
        if offset > MAX_OFFSET {
            colwire_bail!(Protocol: "offset {} at row {} exceeds the addressable range", offset, row);
        }
        previous = offset;
        let offset = usize::try_from(offset)
            .map_err(|_| colwire_err!(Protocol: "offset {} at row {} does not fit in memory", offset, row))?;
        offsets.push(offset);
    }
    Ok(offsets)
}

fn check_offsets(offsets: &[usize], elements: usize, what: &str) -> ColwireResult<()> {
    let end = offsets.last().copied().unwrap_or_default();
    if end != elements {
        colwire_bail!(InvalidArgument: "offsets end at {} but there are {} {}", end, elements, what);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use colwire_dtype::TypeRegistry;
    use colwire_error::ErrorCode;
    use rstest::rstest;

    use super::*;

    fn column(name: &str, values: Vec<Value>) -> Column {
        let dtype = TypeRegistry::default().get(name).unwrap();
        let mut column = Column::new(&dtype);
        for value in values {
            column.push(value).unwrap();
        }
        column
    }

    fn round_trip(column: &Column) -> Column {
        let mut out = Vec::new();
        column.serialize_bulk(&mut out).unwrap();
        let mut input = Bytes::from(out);
        let read = Column::deserialize_bulk(column.dtype(), column.len(), &mut input).unwrap();
        assert!(input.is_empty(), "{} left {} bytes", column.dtype(), input.len());
        assert_eq!(read.values().unwrap(), column.values().unwrap());
        read
    }

    #[rstest]
    #[case("Int64", vec![Value::Int64(i64::MIN), Value::Int64(0), Value::Int64(i64::MAX)])]
    #[case("Nullable(String)", vec![Value::Null, Value::from("a"), Value::Null])]
    #[case("Array(Array(UInt8))", vec![Value::from(vec![vec![1u8], vec![]]), Value::from(Vec::<u8>::new())])]
    #[case("Map(String, Nullable(Int32))", vec![Value::Map(vec![(Value::from("a"), Value::Null), (Value::from("b"), Value::Int32(2))])])]
    #[case("Tuple(a Int8, b Array(String))", vec![Value::Tuple(vec![Value::Int8(1), Value::from(vec!["x", "y"])])])]
    #[case("LowCardinality(Nullable(String))", vec![Value::from("a"), Value::Null, Value::from("a"), Value::from("")])]
    #[case("Array(LowCardinality(String))", vec![Value::from(vec!["a", "b", "a"]), Value::from(vec!["b"])])]
    #[case("Array(Nullable(Map(String, Array(Int32))))", vec![Value::Array(vec![Value::Null, Value::Map(vec![(Value::from("k"), Value::from(vec![1i32, 2]))])])])]
    fn columns_round_trip(#[case] name: &str, #[case] values: Vec<Value>) {
        round_trip(&column(name, values));
    }

    #[test]
    fn empty_columns_round_trip() {
        for name in ["Array(Int8)", "Map(String, String)", "LowCardinality(String)", "Nullable(UInt8)"] {
            let read = round_trip(&column(name, vec![]));
            assert!(read.is_empty());
        }
    }

    #[test]
    fn out_of_range_row() {
        let column = column("Int8", vec![Value::Int8(1)]);
        assert_eq!(column.get(1).unwrap_err().code(), ErrorCode::OutOfBounds);
    }

    #[test]
    fn rejected_value_leaves_column_unchanged() {
        let first = Value::from(vec![Value::Tuple(vec![Value::Int8(1)])]);
        let mut column = column("Array(Tuple(Int8))", vec![first.clone()]);
        let mixed = Value::from(vec![Value::Tuple(vec![Value::Int8(2)]), Value::Int8(3)]);
        assert!(column.push_coerced(mixed).is_err());
        assert_eq!(column.len(), 1);
        column.check_consistency().unwrap();
        assert_eq!(column.values().unwrap(), vec![first]);
    }

    #[test]
    fn decreasing_offsets_are_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&2u64.to_le_bytes());
        bytes.extend_from_slice(&1u64.to_le_bytes());
        let mut input = Bytes::from(bytes);
        let dtype = TypeRegistry::default().get("Array(UInt8)").unwrap();
        let err = Column::deserialize_bulk(&dtype, 2, &mut input).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Protocol);
    }

    #[test]
    fn flush_writes_header_only_for_exported_columns() {
        let column = column("UInt8", vec![Value::UInt8(7)]);
        let mut exported = Vec::new();
        column.flush_to_wire(Some("x"), &mut exported).unwrap();
        assert_eq!(exported, b"\x01x\x05UInt8\x07");
        let mut nested = Vec::new();
        column.flush_to_wire(None, &mut nested).unwrap();
        assert_eq!(nested, [7]);
    }
}

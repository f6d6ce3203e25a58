use colwire_dtype::{DataType, Value};
use colwire_error::{ColwireResult, colwire_bail};
use colwire_io::{WireRead, WireWrite};

use super::{Column, MAX_RESERVE};

/// A column that can hold nulls: one null flag per row, written for the whole column before
/// the nested values. Null rows hold the nested type's default so the nested column stays
/// decodable.
#[derive(Debug, Clone)]
pub struct NullableColumn {
    dtype: DataType,
    nulls: Vec<bool>,
    nested: Box<Column>,
}

impl NullableColumn {
    pub fn new(dtype: DataType, inner: &DataType) -> Self {
        Self {
            dtype,
            nulls: Vec::new(),
            nested: Box::new(Column::new(inner)),
        }
    }

    pub fn dtype(&self) -> &DataType {
        &self.dtype
    }

    pub fn len(&self) -> usize {
        self.nulls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nulls.is_empty()
    }

    /// Whether `row` is null.
    pub fn is_null(&self, row: usize) -> bool {
        self.nulls.get(row).copied().unwrap_or_default()
    }

    /// The column of non-null values, with defaults in the null rows.
    pub fn nested(&self) -> &Column {
        &self.nested
    }

    pub(super) fn push(&mut self, value: Value) -> ColwireResult<()> {
        let is_null = value.is_null();
        let value = if is_null {
            self.nested.dtype().default_value()
        } else {
            value
        };
        self.nested.push_coerced(value)?;
        self.nulls.push(is_null);
        Ok(())
    }

    pub(super) fn get(&self, row: usize) -> ColwireResult<Value> {
        if self.nulls[row] {
            Ok(Value::Null)
        } else {
            self.nested.get(row)
        }
    }

    pub(super) fn truncate(&mut self, len: usize) {
        self.nulls.truncate(len);
        self.nested.truncate(len);
    }

    pub(super) fn clear(&mut self) {
        self.nulls.clear();
        self.nested.clear();
    }

    pub(super) fn check_consistency(&self) -> ColwireResult<()> {
        if self.nested.len() != self.nulls.len() {
            colwire_bail!(
                InvalidArgument: "null map of {} has {} rows but the nested column has {}",
                self.dtype,
                self.nulls.len(),
                self.nested.len()
            );
        }
        self.nested.check_consistency()
    }

    pub(super) fn serialize_bulk<W: WireWrite>(&self, out: &mut W) -> ColwireResult<()> {
        let null_map: Vec<u8> = self.nulls.iter().map(|&null| u8::from(null)).collect();
        out.write_all_bytes(&null_map)?;
        self.nested.serialize_bulk(out)
    }

    pub(super) fn deserialize_bulk<R: WireRead>(
        dtype: DataType,
        inner: &DataType,
        rows: usize,
        input: &mut R,
    ) -> ColwireResult<Self> {
        let mut nulls = Vec::with_capacity(rows.min(MAX_RESERVE));
        for _ in 0..rows {
            nulls.push(input.read_u8()? != 0);
        }
        let nested = Column::deserialize_bulk(inner, rows, input)?;
        Ok(Self {
            dtype,
            nulls,
            nested: Box::new(nested),
        })
    }
}

use colwire_dtype::{DataType, Value};
use colwire_error::ColwireResult;
use colwire_io::{WireRead, WireWrite};

use super::MAX_RESERVE;

/// A column of a type without nested structure, encoded as one value after another.
#[derive(Debug, Clone)]
pub struct ScalarColumn {
    dtype: DataType,
    values: Vec<Value>,
}

impl ScalarColumn {
    pub fn new(dtype: DataType) -> Self {
        Self {
            dtype,
            values: Vec::new(),
        }
    }

    pub fn dtype(&self) -> &DataType {
        &self.dtype
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The stored values.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub(super) fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    pub(super) fn get(&self, row: usize) -> ColwireResult<Value> {
        Ok(self.values[row].clone())
    }

    pub(super) fn truncate(&mut self, len: usize) {
        self.values.truncate(len);
    }

    pub(super) fn clear(&mut self) {
        self.values.clear();
    }

    pub(super) fn serialize_bulk<W: WireWrite>(&self, out: &mut W) -> ColwireResult<()> {
        self.values
            .iter()
            .try_for_each(|value| self.dtype.serialize_one(value, out))
    }

    pub(super) fn deserialize_bulk<R: WireRead>(
        dtype: DataType,
        rows: usize,
        input: &mut R,
    ) -> ColwireResult<Self> {
        let mut values = Vec::with_capacity(rows.min(MAX_RESERVE));
        for _ in 0..rows {
            values.push(dtype.deserialize_one(input)?);
        }
        Ok(Self { dtype, values })
    }
}

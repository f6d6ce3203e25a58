use colwire_dtype::{DataType, Value};
use colwire_error::{ColwireResult, colwire_bail};
use colwire_io::{WireRead, WireWrite};

use super::{Column, check_offsets, offset_range, read_offsets, write_offsets};

/// A map column: one cumulative end offset per row, then every row's keys flattened into one
/// column and every row's values flattened into another.
#[derive(Debug, Clone)]
pub struct MapColumn {
    dtype: DataType,
    offsets: Vec<usize>,
    keys: Box<Column>,
    values: Box<Column>,
}

impl MapColumn {
    pub fn new(dtype: DataType, key: &DataType, value: &DataType) -> Self {
        Self {
            dtype,
            offsets: Vec::new(),
            keys: Box::new(Column::new(key)),
            values: Box::new(Column::new(value)),
        }
    }

    pub fn dtype(&self) -> &DataType {
        &self.dtype
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// The end offset of each row within [`Self::keys`] and [`Self::values`].
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn keys(&self) -> &Column {
        &self.keys
    }

    pub fn values(&self) -> &Column {
        &self.values
    }

    pub(super) fn push(&mut self, value: Value) -> ColwireResult<()> {
        let Value::Map(entries) = value else {
            colwire_bail!(DataType: "cannot write {} {} as {}", value.kind(), value, self.dtype);
        };
        let start = self.keys.len();
        let pushed = entries.into_iter().try_for_each(|(k, v)| {
            self.keys.push_coerced(k)?;
            self.values.push_coerced(v)
        });
        if let Err(e) = pushed {
            self.keys.truncate(start);
            self.values.truncate(start);
            return Err(e);
        }
        self.offsets.push(self.keys.len());
        Ok(())
    }

    pub(super) fn get(&self, row: usize) -> ColwireResult<Value> {
        offset_range(&self.offsets, row)
            .map(|i| -> ColwireResult<(Value, Value)> {
                Ok((self.keys.get(i)?, self.values.get(i)?))
            })
            .collect::<ColwireResult<_>>()
            .map(Value::Map)
    }

    pub(super) fn truncate(&mut self, len: usize) {
        self.offsets.truncate(len);
        let end = self.offsets.last().copied().unwrap_or_default();
        self.keys.truncate(end);
        self.values.truncate(end);
    }

    pub(super) fn clear(&mut self) {
        self.offsets.clear();
        self.keys.clear();
        self.values.clear();
    }

    pub(super) fn check_consistency(&self) -> ColwireResult<()> {
        check_offsets(&self.offsets, self.keys.len(), "keys")?;
        check_offsets(&self.offsets, self.values.len(), "values")?;
        self.keys.check_consistency()?;
        self.values.check_consistency()
    }

    pub(super) fn serialize_bulk<W: WireWrite>(&self, out: &mut W) -> ColwireResult<()> {
        write_offsets(&self.offsets, out)?;
        self.keys.serialize_bulk(out)?;
        self.values.serialize_bulk(out)
    }

    pub(super) fn deserialize_bulk<R: WireRead>(
        dtype: DataType,
        key: &DataType,
        value: &DataType,
        rows: usize,
        input: &mut R,
    ) -> ColwireResult<Self> {
        let offsets = read_offsets(rows, input)?;
        let total = offsets.last().copied().unwrap_or_default();
        let keys = Column::deserialize_bulk(key, total, input)?;
        let values = Column::deserialize_bulk(value, total, input)?;
        Ok(Self {
            dtype,
            offsets,
            keys: Box::new(keys),
            values: Box::new(values),
        })
    }
}

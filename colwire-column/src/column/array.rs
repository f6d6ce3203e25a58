use colwire_dtype::{DataType, Value};
use colwire_error::{ColwireResult, colwire_bail};
use colwire_io::{WireRead, WireWrite};

use super::{Column, check_offsets, offset_range, read_offsets, write_offsets};

/// An array column: one cumulative end offset per row, then every row's elements flattened
/// into a single nested column.
#[derive(Debug, Clone)]
pub struct ArrayColumn {
    dtype: DataType,
    offsets: Vec<usize>,
    elements: Box<Column>,
}

impl ArrayColumn {
    pub fn new(dtype: DataType, element: &DataType) -> Self {
        Self {
            dtype,
            offsets: Vec::new(),
            elements: Box::new(Column::new(element)),
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

    /// The end offset of each row within [`Self::elements`].
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// The flattened elements of every row.
    pub fn elements(&self) -> &Column {
        &self.elements
    }

    pub(super) fn push(&mut self, value: Value) -> ColwireResult<()> {
        let Value::Array(items) = value else {
            colwire_bail!(DataType: "cannot write {} {} as {}", value.kind(), value, self.dtype);
        };
        let start = self.elements.len();
        for item in items {
            if let Err(e) = self.elements.push_coerced(item) {
                self.elements.truncate(start);
                return Err(e);
            }
        }
        self.offsets.push(self.elements.len());
        Ok(())
    }

    pub(super) fn get(&self, row: usize) -> ColwireResult<Value> {
        offset_range(&self.offsets, row)
            .map(|i| self.elements.get(i))
            .collect::<ColwireResult<_>>()
            .map(Value::Array)
    }

    pub(super) fn truncate(&mut self, len: usize) {
        self.offsets.truncate(len);
        let end = self.offsets.last().copied().unwrap_or_default();
        self.elements.truncate(end);
    }

    pub(super) fn clear(&mut self) {
        self.offsets.clear();
        self.elements.clear();
    }

    pub(super) fn check_consistency(&self) -> ColwireResult<()> {
        check_offsets(&self.offsets, self.elements.len(), "elements")?;
        self.elements.check_consistency()
    }

    pub(super) fn serialize_bulk<W: WireWrite>(&self, out: &mut W) -> ColwireResult<()> {
        write_offsets(&self.offsets, out)?;
        self.elements.serialize_bulk(out)
    }

    pub(super) fn deserialize_bulk<R: WireRead>(
        dtype: DataType,
        element: &DataType,
        rows: usize,
        input: &mut R,
    ) -> ColwireResult<Self> {
        let offsets = read_offsets(rows, input)?;
        let total = offsets.last().copied().unwrap_or_default();
        let elements = Column::deserialize_bulk(element, total, input)?;
        Ok(Self {
            dtype,
            offsets,
            elements: Box::new(elements),
        })
    }
}

#[cfg(test)]
mod tests {
    use colwire_dtype::TypeRegistry;

    use super::*;

    #[test]
    fn offsets_are_cumulative() {
        let dtype = TypeRegistry::default().get("Array(UInt8)").unwrap();
        let mut column = Column::new(&dtype);
        for value in [vec![1u8, 2], vec![], vec![3]] {
            column.push(Value::from(value)).unwrap();
        }
        let Column::Array(array) = &column else {
            unreachable!()
        };
        assert_eq!(array.offsets(), [2, 2, 3]);
        assert_eq!(array.elements().len(), 3);

        let mut out = Vec::new();
        column.serialize_bulk(&mut out).unwrap();
        let mut expected = Vec::new();
        for offset in [2u64, 2, 3] {
            expected.extend_from_slice(&offset.to_le_bytes());
        }
        expected.extend_from_slice(&[1, 2, 3]);
        assert_eq!(out, expected);
    }
}

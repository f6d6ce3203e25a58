use colwire_dtype::{DataType, Value};
use colwire_error::{ColwireResult, colwire_bail};
use colwire_io::{WireRead, WireWrite};

use super::Column;

/// A tuple column: each field is its own column, written one after another.
#[derive(Debug, Clone)]
pub struct TupleColumn {
    dtype: DataType,
    fields: Vec<Column>,
    len: usize,
}

impl TupleColumn {
    pub fn new(dtype: DataType) -> Self {
        let fields = match &dtype {
            DataType::Tuple(fields) => fields.iter().map(|f| Column::new(&f.dtype)).collect(),
            _ => Vec::new(),
        };
        Self {
            dtype,
            fields,
            len: 0,
        }
    }

    pub fn dtype(&self) -> &DataType {
        &self.dtype
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The column of each field, in declared order.
    pub fn fields(&self) -> &[Column] {
        &self.fields
    }

    pub(super) fn push(&mut self, value: Value) -> ColwireResult<()> {
        let values = match value {
            Value::Tuple(values) if values.len() == self.fields.len() => values,
            other => {
                colwire_bail!(DataType: "cannot write {} {} as {}", other.kind(), other, self.dtype)
            }
        };
        let pushed = self
            .fields
            .iter_mut()
            .zip(values)
            .try_for_each(|(field, value)| field.push_coerced(value));
        if let Err(e) = pushed {
            self.truncate(self.len);
            return Err(e);
        }
        self.len += 1;
        Ok(())
    }

    pub(super) fn get(&self, row: usize) -> ColwireResult<Value> {
        self.fields
            .iter()
            .map(|field| field.get(row))
            .collect::<ColwireResult<_>>()
            .map(Value::Tuple)
    }

    pub(super) fn truncate(&mut self, len: usize) {
        self.fields.iter_mut().for_each(|field| field.truncate(len));
        self.len = self.len.min(len);
    }

    pub(super) fn clear(&mut self) {
        self.fields.iter_mut().for_each(Column::clear);
        self.len = 0;
    }

    pub(super) fn check_consistency(&self) -> ColwireResult<()> {
        for field in &self.fields {
            if field.len() != self.len {
                colwire_bail!(
                    InvalidArgument: "{} field {} has {} rows, expected {}",
                    self.dtype,
                    field.dtype(),
                    field.len(),
                    self.len
                );
            }
            field.check_consistency()?;
        }
        Ok(())
    }

    pub(super) fn serialize_bulk<W: WireWrite>(&self, out: &mut W) -> ColwireResult<()> {
        self.fields
            .iter()
            .try_for_each(|field| field.serialize_bulk(out))
    }

    pub(super) fn deserialize_bulk<R: WireRead>(
        dtype: DataType,
        rows: usize,
        input: &mut R,
    ) -> ColwireResult<Self> {
        let fields = match &dtype {
            DataType::Tuple(fields) => fields
                .iter()
                .map(|f| Column::deserialize_bulk(&f.dtype, rows, input))
                .collect::<ColwireResult<_>>()?,
            _ => Vec::new(),
        };
        Ok(Self {
            dtype,
            fields,
            len: rows,
        })
    }
}

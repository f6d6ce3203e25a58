//! Columnar encoding for the native protocol.
//!
//! A [`Column`] buffers the values of one column and writes them in the bulk layout of its
//! type; a [`Block`] groups named columns into the batch of rows exchanged with the server.

mod block;
mod column;

pub use block::*;
use colwire_dtype::{DataType, Value};
use colwire_error::ColwireResult;
use colwire_io::{WireRead, WireWrite};
pub use column::*;

/// Bulk encoding of values of a [`DataType`], without building a [`Column`] by hand.
pub trait BulkSerde {
    /// Write `values` in the bulk layout of this type.
    fn serialize_bulk<W: WireWrite>(&self, values: &[Value], out: &mut W) -> ColwireResult<()>;

    /// Read `rows` values in the bulk layout of this type.
    fn deserialize_bulk<R: WireRead>(&self, rows: usize, input: &mut R)
    -> ColwireResult<Vec<Value>>;
}

impl BulkSerde for DataType {
    fn serialize_bulk<W: WireWrite>(&self, values: &[Value], out: &mut W) -> ColwireResult<()> {
        let mut column = Column::new(self);
        for value in values {
            column.push(value.clone())?;
        }
        column.serialize_bulk(out)
    }

    fn deserialize_bulk<R: WireRead>(
        &self,
        rows: usize,
        input: &mut R,
    ) -> ColwireResult<Vec<Value>> {
        Column::deserialize_bulk(self, rows, input)?.values()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use colwire_dtype::TypeRegistry;

    use super::*;

    #[test]
    fn bulk_serde_matches_column() {
        let dtype = TypeRegistry::global()
            .get("Array(Nullable(Map(String, Array(Int32))))")
            .unwrap();
        let values = vec![
            Value::Array(vec![]),
            Value::Array(vec![
                Value::Null,
                Value::Map(vec![(Value::from("a"), Value::from(vec![1i32, -1]))]),
            ]),
        ];
        let mut out = Vec::new();
        dtype.serialize_bulk(&values, &mut out).unwrap();
        let mut input = Bytes::from(out);
        assert_eq!(dtype.deserialize_bulk(2, &mut input).unwrap(), values);
        assert!(input.is_empty());
    }
}

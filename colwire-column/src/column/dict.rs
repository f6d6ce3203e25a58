use colwire_dtype::{DataType, Value};
use colwire_error::{ColwireResult, colwire_bail, colwire_err};
use colwire_io::{WireRead, WireWrite};
use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;

use super::{Column, MAX_RESERVE};

/// Version of the dictionary serialization, written in the first header byte.
pub const LOW_CARDINALITY_VERSION: u8 = 1;
/// Header flag: the dictionary follows inline.
pub const HAS_ADDITIONAL_KEYS: u8 = 0x02;
/// Size of the header preceding the dictionary.
pub const LOW_CARDINALITY_HEADER_SIZE: usize = 24;

/// The smallest index width, in bytes, able to address a dictionary of `dictionary_len`
/// entries.
pub fn index_width(dictionary_len: usize) -> usize {
    match dictionary_len {
        0..=0x100 => 1,
        0x101..=0x1_0000 => 2,
        // 2^24 entries still fit 3-byte indices, the last one being 0xFF_FFFF.
        0x1_0001..=0x100_0000 => 3,
        _ => 4,
    }
}

/// A dictionary-coded column: the distinct values in first-seen order, then one index per
/// row.
///
/// When the nested type is nullable, dictionary entry 0 holds the default value and stands
/// for null.
#[derive(Debug, Clone)]
pub struct LowCardinalityColumn {
    dtype: DataType,
    nullable: bool,
    dictionary: Box<Column>,
    lookup: HashMap<Vec<u8>, u32, FxBuildHasher>,
    indices: Vec<u32>,
}

impl LowCardinalityColumn {
    pub fn new(dtype: DataType, inner: &DataType) -> Self {
        let mut column = Self {
            dtype,
            nullable: inner.is_nullable(),
            dictionary: Box::new(Column::new(inner.unwrap_nullable())),
            lookup: HashMap::default(),
            indices: Vec::new(),
        };
        column.reserve_null_entry();
        column
    }

    pub fn dtype(&self) -> &DataType {
        &self.dtype
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// The distinct values, including the null entry of a nullable column.
    pub fn dictionary(&self) -> &Column {
        &self.dictionary
    }

    /// The dictionary index of every row.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// The width, in bytes, of each index on the wire.
    pub fn index_width(&self) -> usize {
        index_width(self.dictionary.len())
    }

    fn reserve_null_entry(&mut self) {
        if self.nullable && self.dictionary.is_empty() {
            let default = self.dictionary.dtype().default_value();
            if self.dictionary.push_coerced(default).is_err() {
                log::warn!("cannot reserve the null entry of {}", self.dtype);
            }
        }
    }

    fn key(&self, value: &Value) -> ColwireResult<Vec<u8>> {
        let mut key = Vec::new();
        self.dictionary.dtype().serialize_one(value, &mut key)?;
        Ok(key)
    }

    pub(super) fn push(&mut self, value: Value) -> ColwireResult<()> {
        if value.is_null() && self.nullable {
            self.indices.push(0);
            return Ok(());
        }
        let key = self.key(&value)?;
        if let Some(&index) = self.lookup.get(&key) {
            self.indices.push(index);
            return Ok(());
        }
        let index = u32::try_from(self.dictionary.len())
            .map_err(|_| colwire_err!(InvalidArgument: "dictionary of {} is full", self.dtype))?;
        self.dictionary.push_coerced(value)?;
        self.lookup.insert(key, index);
        self.indices.push(index);
        Ok(())
    }

    pub(super) fn get(&self, row: usize) -> ColwireResult<Value> {
        let index = self.indices[row];
        if self.nullable && index == 0 {
            return Ok(Value::Null);
        }
        self.dictionary.get(index as usize)
    }

    /// Drop rows past `len`, and the dictionary entries only those rows referenced.
    pub(super) fn truncate(&mut self, len: usize) {
        self.indices.truncate(len);
        let reserved = usize::from(self.nullable);
        let keep = self
            .indices
            .iter()
            .max()
            .map_or(reserved, |&max| (max as usize + 1).max(reserved));
        if keep < self.dictionary.len() {
            self.dictionary.truncate(keep);
            self.lookup.retain(|_, index| (*index as usize) < keep);
        }
    }

    pub(super) fn clear(&mut self) {
        self.indices.clear();
        self.lookup.clear();
        self.dictionary.clear();
        self.reserve_null_entry();
    }

    pub(super) fn check_consistency(&self) -> ColwireResult<()> {
        let dictionary_len = self.dictionary.len();
        if let Some(index) = self.indices.iter().find(|&&i| i as usize >= dictionary_len) {
            colwire_bail!(
                InvalidArgument: "index {} is outside the dictionary of {} entries",
                index,
                dictionary_len
            );
        }
        self.dictionary.check_consistency()
    }

    pub(super) fn serialize_bulk<W: WireWrite>(&self, out: &mut W) -> ColwireResult<()> {
        let width = self.index_width();
        let mut header = [0u8; LOW_CARDINALITY_HEADER_SIZE];
        header[0] = LOW_CARDINALITY_VERSION;
        #[allow(clippy::cast_possible_truncation)]
        let width_code = (width - 1) as u8;
        header[8] = width_code;
        header[9] = HAS_ADDITIONAL_KEYS;
        header[16..].copy_from_slice(&(self.dictionary.len() as u64).to_le_bytes());
        out.write_all_bytes(&header)?;

        self.dictionary.serialize_bulk(out)?;

        out.write_u64(self.indices.len() as u64)?;
        let mut indices = Vec::with_capacity(self.indices.len() * width);
        for index in &self.indices {
            indices.extend_from_slice(&index.to_le_bytes()[..width]);
        }
        out.write_all_bytes(&indices)
    }

    pub(super) fn deserialize_bulk<R: WireRead>(
        dtype: DataType,
        inner: &DataType,
        rows: usize,
        input: &mut R,
    ) -> ColwireResult<Self> {
        let mut header = [0u8; LOW_CARDINALITY_HEADER_SIZE];
        input.read_exact_bytes(&mut header)?;
        if header[0] != LOW_CARDINALITY_VERSION {
            colwire_bail!(Protocol: "unsupported dictionary version {} for {}", header[0], dtype);
        }
        let width = usize::from(header[8]) + 1;
        if width > 4 {
            colwire_bail!(Protocol: "invalid dictionary index width {} for {}", width, dtype);
        }
        let mut count = [0u8; 8];
        count.copy_from_slice(&header[16..]);
        let dictionary_len = usize::try_from(u64::from_le_bytes(count))
            .map_err(|_| colwire_err!(Protocol: "dictionary of {} does not fit in memory", dtype))?;

        let dictionary = Column::deserialize_bulk(inner.unwrap_nullable(), dictionary_len, input)?;

        let written = input.read_u64()?;
        if written != rows as u64 {
            colwire_bail!(Protocol: "{} has {} indices, expected {} rows", dtype, written, rows);
        }
        let mut indices = Vec::with_capacity(rows.min(MAX_RESERVE));
        let mut raw = [0u8; 4];
        for row in 0..rows {
            input.read_exact_bytes(&mut raw[..width])?;
            let index = u32::from_le_bytes(raw);
            if index as usize >= dictionary_len {
                colwire_bail!(
                    Protocol: "index {} at row {} is outside the dictionary of {} entries",
                    index,
                    row,
                    dictionary_len
                );
            }
            indices.push(index);
        }

        let mut column = Self {
            dtype,
            nullable: inner.is_nullable(),
            dictionary: Box::new(dictionary),
            lookup: HashMap::default(),
            indices,
        };
        column.rebuild_lookup()?;
        Ok(column)
    }

    /// Index the dictionary read from the wire so the column can be appended to.
    fn rebuild_lookup(&mut self) -> ColwireResult<()> {
        let first = usize::from(self.nullable);
        for index in first..self.dictionary.len() {
            let key = self.key(&self.dictionary.get(index)?)?;
            let index = u32::try_from(index)
                .map_err(|_| colwire_err!(Protocol: "dictionary of {} is too large", self.dtype))?;
            self.lookup.entry(key).or_insert(index);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use colwire_dtype::TypeRegistry;
    use colwire_error::ErrorCode;
    use rstest::rstest;

    use super::*;

    fn lc_string() -> DataType {
        TypeRegistry::default().get("LowCardinality(String)").unwrap()
    }

    #[rstest]
    #[case(0, 1)]
    #[case(256, 1)]
    #[case(257, 2)]
    #[case(65536, 2)]
    #[case(65537, 3)]
    #[case(16_777_216, 3)]
    #[case(16_777_217, 4)]
    fn index_widths(#[case] dictionary_len: usize, #[case] width: usize) {
        assert_eq!(index_width(dictionary_len), width);
    }

    #[test]
    fn header_dictionary_then_indices() {
        let mut column = Column::new(&lc_string());
        for value in ["b", "a", "b", "b"] {
            column.push(Value::from(value)).unwrap();
        }
        let mut out = Vec::new();
        column.serialize_bulk(&mut out).unwrap();

        let mut expected = vec![0u8; LOW_CARDINALITY_HEADER_SIZE];
        expected[0] = 1;
        expected[8] = 0;
        expected[9] = HAS_ADDITIONAL_KEYS;
        expected[16] = 2;
        expected.extend_from_slice(b"\x01b\x01a");
        expected.extend_from_slice(&4u64.to_le_bytes());
        expected.extend_from_slice(&[0, 1, 0, 0]);
        assert_eq!(out, expected);
    }

    #[test]
    fn wide_dictionary_round_trips() {
        let dtype = TypeRegistry::default().get("LowCardinality(UInt32)").unwrap();
        let mut column = Column::new(&dtype);
        for i in 0..65537u32 {
            column.push(Value::UInt32(i)).unwrap();
        }
        column.push(Value::UInt32(7)).unwrap();
        let Column::LowCardinality(lc) = &column else {
            unreachable!()
        };
        assert_eq!(lc.index_width(), 3);
        assert_eq!(lc.dictionary().len(), 65537);

        let mut out = Vec::new();
        column.serialize_bulk(&mut out).unwrap();
        assert_eq!(out[8], 2);
        let read = Column::deserialize_bulk(&dtype, column.len(), &mut Bytes::from(out)).unwrap();
        assert_eq!(read.get(65537).unwrap(), Value::UInt32(7));
        assert_eq!(read.get(65536).unwrap(), Value::UInt32(65536));
    }

    #[test]
    fn nullable_dictionary_reserves_entry_zero() {
        let dtype = TypeRegistry::default()
            .get("LowCardinality(Nullable(String))")
            .unwrap();
        let mut column = Column::new(&dtype);
        column.push(Value::Null).unwrap();
        column.push(Value::from("")).unwrap();
        let Column::LowCardinality(lc) = &column else {
            unreachable!()
        };
        assert_eq!(lc.indices(), [0, 1]);
        assert_eq!(lc.dictionary().len(), 2);
        assert_eq!(column.values().unwrap(), vec![Value::Null, Value::from("")]);
    }

    #[test]
    fn clear_resets_dictionary() {
        let mut column = Column::new(&lc_string());
        column.push(Value::from("x")).unwrap();
        column.clear();
        column.push(Value::from("y")).unwrap();
        let Column::LowCardinality(lc) = &column else {
            unreachable!()
        };
        assert_eq!(lc.dictionary().values().unwrap(), vec![Value::from("y")]);
        assert_eq!(lc.indices(), [0]);
    }

    #[test]
    fn truncate_drops_unreferenced_entries() {
        let mut column = Column::new(&lc_string());
        for value in ["a", "b", "a", "c", "d"] {
            column.push(Value::from(value)).unwrap();
        }
        column.truncate(3);
        let Column::LowCardinality(lc) = &column else {
            unreachable!()
        };
        assert_eq!(lc.dictionary().values().unwrap(), vec![Value::from("a"), Value::from("b")]);
        assert_eq!(lc.index_width(), 1);

        column.push(Value::from("d")).unwrap();
        column.push(Value::from("b")).unwrap();
        let Column::LowCardinality(lc) = &column else {
            unreachable!()
        };
        assert_eq!(lc.indices(), [0, 1, 0, 2, 1]);
        assert_eq!(lc.dictionary().len(), 3);
        assert_eq!(column.get(3).unwrap(), Value::from("d"));
        column.check_consistency().unwrap();
    }

    #[test]
    fn truncating_every_row_keeps_the_null_entry() {
        let dtype = TypeRegistry::default()
            .get("LowCardinality(Nullable(String))")
            .unwrap();
        let mut column = Column::new(&dtype);
        column.push(Value::from("x")).unwrap();
        column.push(Value::Null).unwrap();
        column.truncate(0);
        let Column::LowCardinality(lc) = &column else {
            unreachable!()
        };
        assert_eq!(lc.dictionary().len(), 1);
        column.push(Value::from("y")).unwrap();
        assert_eq!(column.values().unwrap(), vec![Value::from("y")]);
    }

    #[test]
    fn read_columns_accept_more_rows() {
        let mut column = Column::new(&lc_string());
        column.push(Value::from("x")).unwrap();
        let mut out = Vec::new();
        column.serialize_bulk(&mut out).unwrap();
        let mut read = Column::deserialize_bulk(&lc_string(), 1, &mut Bytes::from(out)).unwrap();
        read.push(Value::from("x")).unwrap();
        let Column::LowCardinality(lc) = &read else {
            unreachable!()
        };
        assert_eq!(lc.dictionary().len(), 1);
    }

    #[rstest]
    #[case(0, 2)]
    #[case(8, 9)]
    fn corrupt_headers_are_rejected(#[case] byte: usize, #[case] value: u8) {
        let mut column = Column::new(&lc_string());
        column.push(Value::from("x")).unwrap();
        let mut out = Vec::new();
        column.serialize_bulk(&mut out).unwrap();
        out[byte] = value;
        let err = Column::deserialize_bulk(&lc_string(), 1, &mut Bytes::from(out)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Protocol);
    }
}

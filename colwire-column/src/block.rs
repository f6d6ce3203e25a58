use colwire_dtype::{DataType, TypeRegistry, Value};
use colwire_error::{ColwireResult, ResultExt, colwire_bail, colwire_err};
use colwire_io::{WireRead, WireWrite};
use hashbrown::HashMap;
use itertools::Itertools;
use rustc_hash::FxBuildHasher;

use crate::Column;

const FIELD_END: u64 = 0;
const FIELD_IS_OVERFLOWS: u64 = 1;
const FIELD_BUCKET_NUM: u64 = 2;

/// Per-block settings sent ahead of the columns, as numbered fields closed by field 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Whether the block holds the rows that overflowed a `GROUP BY` limit.
    pub is_overflows: bool,
    /// The bucket of a two-level aggregation, or -1.
    pub bucket_num: i32,
}

impl Default for BlockInfo {
    fn default() -> Self {
        Self {
            is_overflows: false,
            bucket_num: -1,
        }
    }
}

impl BlockInfo {
    pub fn read_from<R: WireRead>(input: &mut R) -> ColwireResult<Self> {
        let mut info = Self::default();
        loop {
            match input.read_varint()? {
                FIELD_END => return Ok(info),
                FIELD_IS_OVERFLOWS => info.is_overflows = input.read_bool()?,
                FIELD_BUCKET_NUM => info.bucket_num = input.read_i32()?,
                field => colwire_bail!(Protocol: "unknown block info field {}", field),
            }
        }
    }

    pub fn write_to<W: WireWrite>(&self, out: &mut W) -> ColwireResult<()> {
        out.write_varint(FIELD_IS_OVERFLOWS)?;
        out.write_bool(self.is_overflows)?;
        out.write_varint(FIELD_BUCKET_NUM)?;
        out.write_i32(self.bucket_num)?;
        out.write_varint(FIELD_END)
    }
}

/// A named column of a [`Block`].
#[derive(Debug, Clone)]
pub struct BlockColumn {
    name: String,
    column: Column,
}

impl BlockColumn {
    pub fn new(name: impl Into<String>, dtype: &DataType) -> Self {
        Self {
            name: name.into(),
            column: Column::new(dtype),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> &DataType {
        self.column.dtype()
    }

    pub fn column(&self) -> &Column {
        &self.column
    }
}

/// A batch of rows stored column by column, the unit exchanged with the server.
///
/// A block is either read from the wire, after which its values can be queried, or filled row
/// by row for an insert with [`Block::set_value`] and [`Block::append_row`], then written and
/// recycled with [`Block::reuse_block`].
#[derive(Debug, Clone)]
pub struct Block {
    info: BlockInfo,
    columns: Vec<BlockColumn>,
    rows: usize,
    positions: HashMap<String, usize, FxBuildHasher>,
    staged: Vec<Option<Value>>,
    placeholders: Vec<usize>,
}

impl Default for Block {
    fn default() -> Self {
        Self::from_columns(Vec::new())
    }
}

impl Block {
    /// An empty block with the given column names and types.
    pub fn new<N: Into<String>>(columns: impl IntoIterator<Item = (N, DataType)>) -> Self {
        Self::from_columns(
            columns
                .into_iter()
                .map(|(name, dtype)| BlockColumn::new(name, &dtype))
                .collect(),
        )
    }

    /// An empty write-mode block with the columns of `sample`.
    pub fn from_sample(sample: &Block) -> Self {
        Self::new(
            sample
                .columns
                .iter()
                .map(|c| (c.name.clone(), c.dtype().clone())),
        )
    }

    fn from_columns(columns: Vec<BlockColumn>) -> Self {
        let mut positions = HashMap::default();
        for (i, column) in columns.iter().enumerate() {
            positions.entry(column.name.clone()).or_insert(i);
        }
        let staged = vec![None; columns.len()];
        let placeholders = (0..columns.len()).collect();
        Self {
            info: BlockInfo::default(),
            columns,
            rows: 0,
            positions,
            staged,
            placeholders,
        }
    }

    /// Read a block, resolving column type names through `registry`. Older servers send no
    /// [`BlockInfo`].
    pub fn read_from<R: WireRead>(
        input: &mut R,
        registry: &TypeRegistry,
        with_info: bool,
    ) -> ColwireResult<Self> {
        let info = if with_info {
            BlockInfo::read_from(input)?
        } else {
            BlockInfo::default()
        };
        let column_count = input.read_length()?;
        let rows = input.read_length()?;
        let mut columns = Vec::with_capacity(column_count.min(1024));
        for _ in 0..column_count {
            let name = input.read_string()?;
            let type_name = input.read_string()?;
            let column = registry
                .get(&type_name)
                .and_then(|dtype| {
                    if rows == 0 {
                        Ok(Column::new(&dtype))
                    } else {
                        Column::deserialize_bulk(&dtype, rows, input)
                    }
                })
                .with_context(|| format!("reading column '{name}' of type {type_name}"))?;
            columns.push(BlockColumn { name, column });
        }
        log::trace!("read block of {column_count} columns and {rows} rows");

        let mut block = Self::from_columns(columns);
        block.info = info;
        block.rows = rows;
        Ok(block)
    }

    /// Write the block. Every column must hold exactly [`Block::row_count`] rows.
    pub fn write_to<W: WireWrite>(&self, out: &mut W, with_info: bool) -> ColwireResult<()> {
        if with_info {
            self.info.write_to(out)?;
        }
        out.write_length(self.columns.len())?;
        out.write_length(self.rows)?;
        for column in &self.columns {
            if column.column.len() != self.rows {
                colwire_bail!(
                    InvalidArgument: "column '{}' has {} rows but the block has {}",
                    column.name,
                    column.column.len(),
                    self.rows
                );
            }
            column
                .column
                .flush_to_wire(Some(&column.name), out)
                .with_context(|| format!("writing column '{}'", column.name))?;
        }
        Ok(())
    }

    pub fn info(&self) -> &BlockInfo {
        &self.info
    }

    pub fn set_info(&mut self, info: BlockInfo) {
        self.info = info;
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[BlockColumn] {
        &self.columns
    }

    /// The column at 0-based `index`.
    pub fn get_column(&self, index: usize) -> ColwireResult<&BlockColumn> {
        self.columns
            .get(index)
            .ok_or_else(|| colwire_err!(OutOfBounds: index, 0, self.columns.len()))
    }

    /// The value at `row` of the column at 0-based `index`.
    pub fn get_object(&self, row: usize, index: usize) -> ColwireResult<Value> {
        self.get_column(index)?.column.get(row)
    }

    /// The 1-based position of the first column named `name`.
    pub fn get_position_by_name(&self, name: &str) -> ColwireResult<usize> {
        self.positions
            .get(name)
            .map(|&i| i + 1)
            .ok_or_else(|| colwire_err!(InvalidArgument: "block has no column named '{}'", name))
    }

    /// Iterate the rows as vectors of values.
    pub fn rows(&self) -> impl Iterator<Item = ColwireResult<Vec<Value>>> + '_ {
        (0..self.rows).map(|row| {
            self.columns
                .iter()
                .map(|c| c.column.get(row))
                .try_collect()
        })
    }

    /// Stage `value` for the column at 0-based `index` in the row being assembled.
    pub fn set_value(&mut self, index: usize, value: Value) -> ColwireResult<()> {
        let len = self.staged.len();
        let slot = self
            .staged
            .get_mut(index)
            .ok_or_else(|| colwire_err!(OutOfBounds: index, 0, len))?;
        *slot = Some(value);
        Ok(())
    }

    /// Stage `value` for the 0-based `placeholder` of a parameterized insert.
    pub fn set_placeholder_value(&mut self, placeholder: usize, value: Value) -> ColwireResult<()> {
        let index = *self
            .placeholders
            .get(placeholder)
            .ok_or_else(|| colwire_err!(OutOfBounds: placeholder, 0, self.placeholders.len()))?;
        self.set_value(index, value)
    }

    /// Record that the column at 0-based `index` has no placeholder. Every placeholder mapped
    /// to that column or a later one shifts to the next column.
    pub fn inc_placeholder_indexes(&mut self, index: usize) {
        for position in &mut self.placeholders {
            if *position >= index {
                *position += 1;
            }
        }
    }

    /// The column index each placeholder currently maps to.
    pub fn placeholder_indexes(&self) -> &[usize] {
        &self.placeholders
    }

    /// Commit the staged row to every column. Either every column takes its value or none
    /// does; the error names the column and value that was rejected.
    pub fn append_row(&mut self) -> ColwireResult<()> {
        let mut row = Vec::with_capacity(self.columns.len());
        for (column, staged) in self.columns.iter().zip(&self.staged) {
            let Some(value) = staged else {
                colwire_bail!(InvalidArgument: "no value set for column '{}'", column.name);
            };
            let coerced = column.dtype().coerce(value.clone()).with_context(|| {
                format!("column '{}' of type {} rejected {}", column.name, column.dtype(), value)
            })?;
            row.push(coerced);
        }

        for (i, value) in row.into_iter().enumerate() {
            if let Err(e) = self.columns[i].column.push_coerced(value) {
                for column in &mut self.columns[..=i] {
                    column.column.truncate(self.rows);
                }
                return Err(e.with_context(format!(
                    "column '{}' of type {} rejected the row",
                    self.columns[i].name,
                    self.columns[i].dtype()
                )));
            }
        }
        self.staged.iter_mut().for_each(|slot| *slot = None);
        self.rows += 1;
        Ok(())
    }

    /// Empty every column, including dictionaries and nested state, to fill the block again.
    pub fn reuse_block(&mut self) {
        self.columns.iter_mut().for_each(|c| c.column.clear());
        self.staged.iter_mut().for_each(|slot| *slot = None);
        self.rows = 0;
    }
}

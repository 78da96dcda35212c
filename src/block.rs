//! Data blocks: the unit of transfer in both directions.
//!
//! A block is an ordered set of named, typed columns sharing one row count,
//! plus a small [`BlockInfo`] header. Column order is significant -- it
//! mirrors INSERT column order. Empty blocks (no columns, no rows) are
//! valid and serve as control signals: the client finalizes every query
//! with one, and an insert is closed by one.
//!
//! Wire layout:
//!
//! ```text
//! [block info]        // (field_num: varint, value) pairs, 0 terminates
//! [columns: varint]
//! [rows: varint]
//! per column:
//!   [name: string] [type expression: string] [body]   // body only if rows > 0
//! ```

use bytes::{BufMut, BytesMut};

use crate::column::{new_column, ColumnBuffer, ColumnData};
use crate::types::Type;
use crate::value::Value;
use crate::wire::{self, WireReader};
use crate::{Error, Result};

/// Tagged header attached to every block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    /// Set by the server for blocks that overflowed a GROUP BY limit.
    pub is_overflows: bool,
    /// Two-level aggregation bucket, -1 when not bucketed.
    pub bucket_num: i32,
}

impl Default for BlockInfo {
    fn default() -> Self {
        Self { is_overflows: false, bucket_num: -1 }
    }
}

/// Sanity cap on columns per block.
const MAX_COLUMNS: u64 = 1 << 20;
/// Sanity cap on rows per block.
const MAX_ROWS: u64 = 1 << 32;

const INFO_FIELD_END: u64 = 0;
const INFO_FIELD_IS_OVERFLOWS: u64 = 1;
const INFO_FIELD_BUCKET_NUM: u64 = 2;

impl BlockInfo {
    /// Writes the tagged field list, in field-number order, known fields
    /// only.
    pub fn write(&self, buf: &mut BytesMut) {
        wire::put_varint(buf, INFO_FIELD_IS_OVERFLOWS);
        wire::put_bool(buf, self.is_overflows);
        wire::put_varint(buf, INFO_FIELD_BUCKET_NUM);
        buf.put_i32_le(self.bucket_num);
        wire::put_varint(buf, INFO_FIELD_END);
    }

    /// Reads the tagged field list. Unknown field numbers are rejected:
    /// there is no way to skip a value of unknown width.
    pub fn read(reader: &mut WireReader<'_>) -> Result<Self> {
        let mut info = BlockInfo::default();
        loop {
            match reader.read_varint()? {
                INFO_FIELD_END => return Ok(info),
                INFO_FIELD_IS_OVERFLOWS => {
                    info.is_overflows = reader.read_bool()?;
                }
                INFO_FIELD_BUCKET_NUM => {
                    info.bucket_num = reader.read_i32()?;
                }
                other => {
                    return Err(Error::ProtocolViolation(format!(
                        "unknown block info field {}",
                        other
                    )));
                }
            }
        }
    }
}

/// An ordered set of named, typed columns with one shared row count.
pub struct Block {
    columns: Vec<(String, ColumnBuffer)>,
    rows: usize,
    info: BlockInfo,
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field(
                "columns",
                &self.columns.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .field("rows", &self.rows)
            .field("info", &self.info)
            .finish()
    }
}

impl Block {
    /// Creates an empty block.
    pub fn new() -> Self {
        Self { columns: Vec::new(), rows: 0, info: BlockInfo::default() }
    }

    /// Appends a named column.
    ///
    /// The name must be non-empty and unique within the block
    /// (case-insensitively), and the column's row count must match the
    /// block's unless this is the first column.
    pub fn append_column(
        &mut self,
        name: impl Into<String>,
        column: ColumnBuffer,
    ) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidState(
                "column names must be non-empty".into(),
            ));
        }
        if self
            .columns
            .iter()
            .any(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            return Err(Error::InvalidState(format!(
                "duplicate column name {:?}",
                name
            )));
        }
        if self.columns.is_empty() {
            self.rows = column.len();
        } else if column.len() != self.rows {
            return Err(Error::InvalidState(format!(
                "column {:?} has {} rows, block has {}",
                name,
                column.len(),
                self.rows
            )));
        }
        self.columns.push((name, column));
        Ok(())
    }

    /// Builds a block of empty columns from `(name, type)` pairs.
    pub fn with_schema<'a>(
        schema: impl IntoIterator<Item = (&'a str, &'a Type)>,
    ) -> Result<Self> {
        let mut block = Block::new();
        for (name, ty) in schema {
            block.append_column(name, new_column(ty)?)?;
        }
        Ok(block)
    }

    /// Appends one row across all columns; the value count must match the
    /// column count.
    pub fn append_row(&mut self, values: Vec<Value>) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(Error::InvalidState(format!(
                "row has {} values, block has {} columns",
                values.len(),
                self.columns.len()
            )));
        }
        for ((name, column), value) in self.columns.iter_mut().zip(values) {
            column.append_value(value).map_err(|e| {
                Error::UnsupportedType(format!("column {:?}: {}", name, e))
            })?;
        }
        self.rows += 1;
        Ok(())
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// True when the block carries no columns and no rows -- the control
    /// signal form.
    pub fn is_empty(&self) -> bool {
        self.rows == 0 && self.columns.is_empty()
    }

    /// Column name at `index`, if in range.
    pub fn column_name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(|(name, _)| name.as_str())
    }

    /// Column at `index`, if in range.
    pub fn column(&self, index: usize) -> Option<&dyn ColumnData> {
        self.columns.get(index).map(|(_, col)| col.as_ref())
    }

    /// Ordinal of the column with the given name, matched
    /// case-insensitively.
    pub fn column_ordinal(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }

    /// Column with the given name, matched case-insensitively.
    pub fn column_by_name(&self, name: &str) -> Option<&dyn ColumnData> {
        self.column_ordinal(name).and_then(|i| self.column(i))
    }

    /// The block header.
    pub fn info(&self) -> &BlockInfo {
        &self.info
    }

    /// Replaces the block header.
    pub fn set_info(&mut self, info: BlockInfo) {
        self.info = info;
    }

    /// Iterates `(name, column)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn ColumnData)> {
        self.columns.iter().map(|(name, col)| (name.as_str(), col.as_ref()))
    }

    /// Serializes the block.
    pub fn write(&self, buf: &mut BytesMut) -> Result<()> {
        self.info.write(buf);
        wire::put_varint(buf, self.columns.len() as u64);
        wire::put_varint(buf, self.rows as u64);
        for (name, column) in &self.columns {
            wire::put_string(buf, name);
            wire::put_string(buf, column.data_type().to_string());
            if self.rows > 0 {
                column.write_body(buf)?;
            }
        }
        Ok(())
    }

    /// Deserializes a block.
    pub fn read(reader: &mut WireReader<'_>) -> Result<Block> {
        let info = BlockInfo::read(reader)?;
        let column_count = reader.read_varint()?;
        let rows = reader.read_varint()?;
        if column_count > MAX_COLUMNS || rows > MAX_ROWS {
            return Err(Error::ProtocolViolation(format!(
                "implausible block header: {} columns, {} rows",
                column_count, rows
            )));
        }
        let column_count = column_count as usize;
        let rows = rows as usize;

        let mut block = Block::new();
        block.info = info;
        for _ in 0..column_count {
            let name = reader.read_string_lossy()?;
            let type_expr = reader.read_string_lossy()?;
            let ty = Type::parse(&type_expr)?;
            let mut column = new_column(&ty)?;
            if rows > 0 {
                column.read_body(reader, rows)?;
                if column.len() != rows {
                    return Err(Error::ProtocolViolation(format!(
                        "column {:?} decoded {} rows, block header says {}",
                        name,
                        column.len(),
                        rows
                    )));
                }
            }
            block.append_column(name, column).map_err(|e| {
                Error::ProtocolViolation(format!("invalid block: {}", e))
            })?;
        }
        // A block with columns but no column rows still carries the header
        // row count (zero); trust the header for the empty-columns case.
        if block.columns.is_empty() {
            block.rows = rows;
        }
        Ok(block)
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}

//! Map columns.
//!
//! `Map(K, V)` is stored exactly like `Array(Tuple(K, V))`: cumulative
//! UInt64 offsets per row, then the flattened key column, then the
//! flattened value column.

use bytes::{BufMut, BytesMut};

use super::{new_column, value_mismatch, ColumnBuffer, ColumnData};
use crate::types::Type;
use crate::value::Value;
use crate::wire::WireReader;
use crate::{Error, Result};

/// Column for `Map(K, V)`.
pub struct ColumnMap {
    type_: Type,
    offsets: Vec<u64>,
    keys: ColumnBuffer,
    values: ColumnBuffer,
}

impl ColumnMap {
    /// Creates an empty column for a `Map(K, V)` type.
    pub fn new(type_: Type) -> Result<Self> {
        let (keys, values) = match &type_ {
            Type::Map(key, value) => (new_column(key)?, new_column(value)?),
            other => {
                return Err(Error::InvalidType(format!(
                    "ColumnMap requires Map, got {}",
                    other
                )))
            }
        };
        Ok(Self { type_, offsets: Vec::new(), keys, values })
    }

    /// Appends one map row from entries in insertion order.
    pub fn append(&mut self, entries: Vec<(Value, Value)>) -> Result<()> {
        let count = entries.len() as u64;
        for (key, value) in entries {
            self.keys.append_value(key)?;
            self.values.append_value(value)?;
        }
        let base = self.offsets.last().copied().unwrap_or(0);
        self.offsets.push(base + count);
        Ok(())
    }

    /// Number of entries in the row at `index`.
    ///
    /// # Panics
    ///
    /// Panics if out of range.
    pub fn entry_count(&self, index: usize) -> usize {
        let end = self.offsets[index];
        let start = if index == 0 { 0 } else { self.offsets[index - 1] };
        (end - start) as usize
    }
}

impl ColumnData for ColumnMap {
    fn data_type(&self) -> &Type {
        &self.type_
    }

    fn len(&self) -> usize {
        self.offsets.len()
    }

    fn clear(&mut self) {
        self.offsets.clear();
        self.keys.clear();
        self.values.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.offsets.reserve(additional);
    }

    fn read_body(
        &mut self,
        reader: &mut WireReader<'_>,
        rows: usize,
    ) -> Result<()> {
        let raw = reader.read_raw(rows * 8)?;
        let base = self.offsets.last().copied().unwrap_or(0);
        let mut batch_total = 0u64;
        self.offsets.reserve(rows);
        for chunk in raw.chunks_exact(8) {
            let offset = u64::from_le_bytes(chunk.try_into().unwrap());
            if offset < batch_total {
                return Err(Error::ProtocolViolation(
                    "map offsets must be non-decreasing".into(),
                ));
            }
            batch_total = offset;
            self.offsets.push(base + offset);
        }
        if batch_total > u32::MAX as u64 {
            return Err(Error::ProtocolViolation(format!(
                "implausible map entry count {}",
                batch_total
            )));
        }
        self.keys.read_body(reader, batch_total as usize)?;
        self.values.read_body(reader, batch_total as usize)
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        for &offset in &self.offsets {
            buf.put_u64_le(offset);
        }
        self.keys.write_body(buf)?;
        self.values.write_body(buf)
    }

    fn append_value(&mut self, value: Value) -> Result<()> {
        match value {
            Value::Map(entries) => self.append(entries),
            other => Err(value_mismatch(&other, &self.type_)),
        }
    }

    fn value_at(&self, index: usize) -> Value {
        let end = self.offsets[index] as usize;
        let start =
            if index == 0 { 0 } else { self.offsets[index - 1] as usize };
        Value::Map(
            (start..end)
                .map(|i| (self.keys.value_at(i), self.values.value_at(i)))
                .collect(),
        )
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

//! String and FixedString columns.
//!
//! `String` rows are varint-length-prefixed byte strings; `FixedString(N)`
//! rows are exactly N raw bytes, right-padded with zeros on write. Both
//! store raw bytes: the protocol does not require UTF-8, so `&str` access
//! goes through lossy conversion at the accessor and trailing NUL trimming
//! of fixed strings is left to the row consumer.

use bytes::{BufMut, BytesMut};

use super::{value_mismatch, ColumnData};
use crate::types::Type;
use crate::value::Value;
use crate::wire::{self, WireReader};
use crate::{Error, Result};

/// Variable-length string column.
pub struct ColumnString {
    type_: Type,
    data: Vec<Vec<u8>>,
}

impl ColumnString {
    /// Creates an empty String column.
    pub fn new() -> Self {
        Self { type_: Type::String, data: Vec::new() }
    }

    /// Appends a value; anything byte-like works.
    pub fn append(&mut self, value: impl AsRef<[u8]>) {
        self.data.push(value.as_ref().to_vec());
    }

    /// Raw bytes at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.data.get(index).map(|v| v.as_slice())
    }

    /// Lossy UTF-8 view of the value at `index`.
    ///
    /// # Panics
    ///
    /// Panics if out of range.
    pub fn at_str(&self, index: usize) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.data[index])
    }

    /// Iterates the raw byte values.
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.data.iter().map(|v| v.as_slice())
    }
}

impl Default for ColumnString {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnData for ColumnString {
    fn data_type(&self) -> &Type {
        &self.type_
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn clear(&mut self) {
        self.data.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional);
    }

    fn read_body(
        &mut self,
        reader: &mut WireReader<'_>,
        rows: usize,
    ) -> Result<()> {
        self.data.reserve(rows.min(65_536));
        for _ in 0..rows {
            self.data.push(reader.read_string_bytes()?.to_vec());
        }
        Ok(())
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        for value in &self.data {
            wire::put_string(buf, value);
        }
        Ok(())
    }

    fn append_value(&mut self, value: Value) -> Result<()> {
        match value {
            Value::String(bytes) => {
                self.data.push(bytes);
                Ok(())
            }
            other => Err(value_mismatch(&other, &self.type_)),
        }
    }

    fn value_at(&self, index: usize) -> Value {
        Value::String(self.data[index].clone())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Fixed-length string column; contiguous `rows * size` bytes.
pub struct ColumnFixedString {
    type_: Type,
    size: usize,
    data: Vec<u8>,
}

impl ColumnFixedString {
    /// Creates an empty column for a `FixedString(N)` type.
    pub fn new(type_: Type) -> Result<Self> {
        let size = match &type_ {
            Type::FixedString(size) => *size,
            other => {
                return Err(Error::InvalidType(format!(
                    "ColumnFixedString requires FixedString, got {}",
                    other
                )))
            }
        };
        Ok(Self { type_, size, data: Vec::new() })
    }

    /// The fixed width N in bytes.
    pub fn fixed_size(&self) -> usize {
        self.size
    }

    /// Appends a value, right-padding with zeros.
    ///
    /// Values longer than N are rejected.
    pub fn append(&mut self, value: impl AsRef<[u8]>) -> Result<()> {
        let bytes = value.as_ref();
        if bytes.len() > self.size {
            return Err(Error::UnsupportedType(format!(
                "value of {} bytes does not fit FixedString({})",
                bytes.len(),
                self.size
            )));
        }
        self.data.extend_from_slice(bytes);
        self.data.resize(self.data.len() + (self.size - bytes.len()), 0);
        Ok(())
    }

    /// Raw bytes at `index`, padding included, if in range.
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        if index >= self.len() {
            return None;
        }
        let start = index * self.size;
        Some(&self.data[start..start + self.size])
    }
}

impl ColumnData for ColumnFixedString {
    fn data_type(&self) -> &Type {
        &self.type_
    }

    fn len(&self) -> usize {
        if self.size == 0 {
            0
        } else {
            self.data.len() / self.size
        }
    }

    fn clear(&mut self) {
        self.data.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional * self.size);
    }

    fn read_body(
        &mut self,
        reader: &mut WireReader<'_>,
        rows: usize,
    ) -> Result<()> {
        let raw = reader.read_raw(rows * self.size)?;
        self.data.extend_from_slice(raw);
        Ok(())
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_slice(&self.data);
        Ok(())
    }

    fn append_value(&mut self, value: Value) -> Result<()> {
        match value {
            Value::FixedString(bytes) | Value::String(bytes) => {
                self.append(bytes)
            }
            other => Err(value_mismatch(&other, &self.type_)),
        }
    }

    fn value_at(&self, index: usize) -> Value {
        Value::FixedString(self.get(index).expect("row index in range").to_vec())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

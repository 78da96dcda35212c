//! Array columns.
//!
//! Element data is flattened into a single child column; a cumulative
//! UInt64 offset per row marks where each array ends. Offsets on the wire
//! are relative to the batch being encoded; `read_body` rebases them when
//! appending to a non-empty column.

use bytes::{BufMut, BytesMut};

use super::{new_column, value_mismatch, ColumnBuffer, ColumnData};
use crate::types::Type;
use crate::value::Value;
use crate::wire::WireReader;
use crate::{Error, Result};

/// Column for `Array(T)`.
pub struct ColumnArray {
    type_: Type,
    offsets: Vec<u64>,
    items: ColumnBuffer,
}

impl ColumnArray {
    /// Creates an empty column for an `Array(T)` type.
    pub fn new(type_: Type) -> Result<Self> {
        let items = match &type_ {
            Type::Array(item) => new_column(item)?,
            other => {
                return Err(Error::InvalidType(format!(
                    "ColumnArray requires Array, got {}",
                    other
                )))
            }
        };
        Ok(Self { type_, offsets: Vec::new(), items })
    }

    /// Appends one array row from element values.
    pub fn append(&mut self, elements: Vec<Value>) -> Result<()> {
        let count = elements.len() as u64;
        for element in elements {
            self.items.append_value(element)?;
        }
        let base = self.offsets.last().copied().unwrap_or(0);
        self.offsets.push(base + count);
        Ok(())
    }

    /// Number of elements in the row at `index`.
    ///
    /// # Panics
    ///
    /// Panics if out of range.
    pub fn array_len(&self, index: usize) -> usize {
        let end = self.offsets[index];
        let start = if index == 0 { 0 } else { self.offsets[index - 1] };
        (end - start) as usize
    }

    /// The cumulative offsets.
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// The flattened element column.
    pub fn items(&self) -> &dyn ColumnData {
        self.items.as_ref()
    }
}

impl ColumnData for ColumnArray {
    fn data_type(&self) -> &Type {
        &self.type_
    }

    fn len(&self) -> usize {
        self.offsets.len()
    }

    fn clear(&mut self) {
        self.offsets.clear();
        self.items.clear();
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
                    "array offsets must be non-decreasing".into(),
                ));
            }
            batch_total = offset;
            self.offsets.push(base + offset);
        }
        if batch_total > u32::MAX as u64 {
            return Err(Error::ProtocolViolation(format!(
                "implausible array element count {}",
                batch_total
            )));
        }
        self.items.read_body(reader, batch_total as usize)
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        for &offset in &self.offsets {
            buf.put_u64_le(offset);
        }
        self.items.write_body(buf)
    }

    fn append_value(&mut self, value: Value) -> Result<()> {
        match value {
            Value::Array(elements) => self.append(elements),
            other => Err(value_mismatch(&other, &self.type_)),
        }
    }

    fn value_at(&self, index: usize) -> Value {
        let end = self.offsets[index] as usize;
        let start =
            if index == 0 { 0 } else { self.offsets[index - 1] as usize };
        Value::Array((start..end).map(|i| self.items.value_at(i)).collect())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_array(values: &[i32]) -> Value {
        Value::Array(values.iter().map(|&v| Value::Int32(v)).collect())
    }

    #[test]
    fn test_offsets_layout() {
        // [[1,2],[],[3]] => offsets [2,2,3], elements [1,2,3].
        let ty = Type::parse("Array(Int32)").unwrap();
        let mut col = ColumnArray::new(ty).unwrap();
        col.append_value(int_array(&[1, 2])).unwrap();
        col.append_value(int_array(&[])).unwrap();
        col.append_value(int_array(&[3])).unwrap();

        assert_eq!(col.offsets(), &[2, 2, 3]);
        assert_eq!(col.array_len(0), 2);
        assert_eq!(col.array_len(1), 0);

        let mut buf = BytesMut::new();
        col.write_body(&mut buf).unwrap();
        // 3 offsets * 8 bytes + 3 elements * 4 bytes.
        assert_eq!(buf.len(), 36);
        assert_eq!(&buf[..8], &2u64.to_le_bytes());
        assert_eq!(&buf[8..16], &2u64.to_le_bytes());
        assert_eq!(&buf[16..24], &3u64.to_le_bytes());
    }

    #[test]
    fn test_roundtrip() {
        let ty = Type::parse("Array(String)").unwrap();
        let mut col = ColumnArray::new(ty.clone()).unwrap();
        col.append_value(Value::Array(vec![
            Value::from("x"),
            Value::from("yz"),
        ]))
        .unwrap();
        col.append_value(Value::Array(vec![])).unwrap();

        let mut buf = BytesMut::new();
        col.write_body(&mut buf).unwrap();

        let mut decoded = ColumnArray::new(ty).unwrap();
        decoded.read_body(&mut WireReader::new(&buf), 2).unwrap();
        assert_eq!(decoded.value_at(0), col.value_at(0));
        assert_eq!(decoded.value_at(1), Value::Array(vec![]));
    }

    #[test]
    fn test_nested_arrays() {
        let ty = Type::parse("Array(Array(UInt8))").unwrap();
        let mut col = ColumnArray::new(ty.clone()).unwrap();
        let row = Value::Array(vec![
            Value::Array(vec![Value::UInt8(1)]),
            Value::Array(vec![Value::UInt8(2), Value::UInt8(3)]),
        ]);
        col.append_value(row.clone()).unwrap();

        let mut buf = BytesMut::new();
        col.write_body(&mut buf).unwrap();

        let mut decoded = ColumnArray::new(ty).unwrap();
        decoded.read_body(&mut WireReader::new(&buf), 1).unwrap();
        assert_eq!(decoded.value_at(0), row);
    }

    #[test]
    fn test_decreasing_offsets_rejected() {
        let ty = Type::parse("Array(UInt8)").unwrap();
        let mut buf = BytesMut::new();
        buf.put_u64_le(2);
        buf.put_u64_le(1); // goes backwards
        let mut col = ColumnArray::new(ty).unwrap();
        let err = col.read_body(&mut WireReader::new(&buf), 2).unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
    }
}

//! The Nothing column, produced by NULL-only literals.
//!
//! Carries no information; one placeholder byte per row on the wire.

use bytes::{BufMut, BytesMut};

use super::{value_mismatch, ColumnData};
use crate::types::Type;
use crate::value::Value;
use crate::wire::WireReader;
use crate::Result;

/// Column for the `Nothing` type.
pub struct ColumnNothing {
    type_: Type,
    rows: usize,
}

impl ColumnNothing {
    /// Creates an empty Nothing column.
    pub fn new() -> Self {
        Self { type_: Type::Nothing, rows: 0 }
    }
}

impl Default for ColumnNothing {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnData for ColumnNothing {
    fn data_type(&self) -> &Type {
        &self.type_
    }

    fn len(&self) -> usize {
        self.rows
    }

    fn clear(&mut self) {
        self.rows = 0;
    }

    fn reserve(&mut self, _additional: usize) {}

    fn read_body(
        &mut self,
        reader: &mut WireReader<'_>,
        rows: usize,
    ) -> Result<()> {
        reader.read_raw(rows)?;
        self.rows += rows;
        Ok(())
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_bytes(0, self.rows);
        Ok(())
    }

    fn append_value(&mut self, value: Value) -> Result<()> {
        match value {
            Value::Null => {
                self.rows += 1;
                Ok(())
            }
            other => Err(value_mismatch(&other, &self.type_)),
        }
    }

    fn value_at(&self, index: usize) -> Value {
        assert!(index < self.rows, "row index in range");
        Value::Null
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

    #[test]
    fn test_placeholder_bytes() {
        let mut col = ColumnNothing::new();
        col.append_value(Value::Null).unwrap();
        col.append_value(Value::Null).unwrap();

        let mut buf = BytesMut::new();
        col.write_body(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0, 0]);

        let mut decoded = ColumnNothing::new();
        decoded.read_body(&mut WireReader::new(&buf), 2).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded.value_at(1), Value::Null);
    }
}

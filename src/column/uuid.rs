//! UUID column.
//!
//! The wire layout is two little-endian UInt64 halves with the high half
//! first -- not the RFC big-endian byte order.

use bytes::{BufMut, BytesMut};
use uuid::Uuid;

use super::{value_mismatch, ColumnData};
use crate::types::Type;
use crate::value::Value;
use crate::wire::WireReader;
use crate::Result;

/// UUID column; 16 bytes per row as two LE u64 halves, high first.
pub struct ColumnUuid {
    type_: Type,
    data: Vec<Uuid>,
}

impl ColumnUuid {
    /// Creates an empty UUID column.
    pub fn new() -> Self {
        Self { type_: Type::Uuid, data: Vec::new() }
    }

    /// Appends a value.
    pub fn append(&mut self, value: Uuid) {
        self.data.push(value);
    }

    /// Value at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<Uuid> {
        self.data.get(index).copied()
    }
}

impl Default for ColumnUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnData for ColumnUuid {
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
            let high = reader.read_u64()?;
            let low = reader.read_u64()?;
            self.data
                .push(Uuid::from_u128(((high as u128) << 64) | low as u128));
        }
        Ok(())
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        for value in &self.data {
            let bits = value.as_u128();
            buf.put_u64_le((bits >> 64) as u64);
            buf.put_u64_le(bits as u64);
        }
        Ok(())
    }

    fn append_value(&mut self, value: Value) -> Result<()> {
        match value {
            Value::Uuid(v) => {
                self.data.push(v);
                Ok(())
            }
            other => Err(value_mismatch(&other, &self.type_)),
        }
    }

    fn value_at(&self, index: usize) -> Value {
        Value::Uuid(self.data[index])
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
    fn test_wire_layout_swaps_halves() {
        let id = Uuid::parse_str("00112233-4455-6677-8899-aabbccddeeff")
            .unwrap();
        let mut col = ColumnUuid::new();
        col.append(id);

        let mut buf = BytesMut::new();
        col.write_body(&mut buf).unwrap();
        // High half (00112233-4455-6677) little-endian first.
        assert_eq!(
            &buf[..],
            &[
                0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11, 0x00, // high LE
                0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA, 0x99, 0x88, // low LE
            ]
        );
    }

    #[test]
    fn test_roundtrip() {
        let mut col = ColumnUuid::new();
        for _ in 0..4 {
            col.append(Uuid::new_v4());
        }

        let mut buf = BytesMut::new();
        col.write_body(&mut buf).unwrap();

        let mut decoded = ColumnUuid::new();
        decoded.read_body(&mut WireReader::new(&buf), 4).unwrap();
        for i in 0..4 {
            assert_eq!(decoded.get(i), col.get(i));
        }
    }
}

//! IPv4 and IPv6 columns.
//!
//! IPv4 is the address in network (big-endian) integer form stored as a
//! little-endian UInt32; IPv6 is the 16 address octets verbatim.

use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::{BufMut, BytesMut};

use super::{value_mismatch, ColumnData};
use crate::types::Type;
use crate::value::Value;
use crate::wire::WireReader;
use crate::Result;

/// IPv4 column; UInt32 per row.
pub struct ColumnIpv4 {
    type_: Type,
    data: Vec<Ipv4Addr>,
}

impl ColumnIpv4 {
    /// Creates an empty IPv4 column.
    pub fn new() -> Self {
        Self { type_: Type::Ipv4, data: Vec::new() }
    }

    /// Appends an address.
    pub fn append(&mut self, addr: Ipv4Addr) {
        self.data.push(addr);
    }

    /// Address at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<Ipv4Addr> {
        self.data.get(index).copied()
    }
}

impl Default for ColumnIpv4 {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnData for ColumnIpv4 {
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
            self.data.push(Ipv4Addr::from(reader.read_u32()?));
        }
        Ok(())
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        for addr in &self.data {
            buf.put_u32_le(u32::from(*addr));
        }
        Ok(())
    }

    fn append_value(&mut self, value: Value) -> Result<()> {
        match value {
            Value::Ipv4(addr) => {
                self.data.push(addr);
                Ok(())
            }
            other => Err(value_mismatch(&other, &self.type_)),
        }
    }

    fn value_at(&self, index: usize) -> Value {
        Value::Ipv4(self.data[index])
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// IPv6 column; 16 raw bytes per row.
pub struct ColumnIpv6 {
    type_: Type,
    data: Vec<Ipv6Addr>,
}

impl ColumnIpv6 {
    /// Creates an empty IPv6 column.
    pub fn new() -> Self {
        Self { type_: Type::Ipv6, data: Vec::new() }
    }

    /// Appends an address.
    pub fn append(&mut self, addr: Ipv6Addr) {
        self.data.push(addr);
    }

    /// Address at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<Ipv6Addr> {
        self.data.get(index).copied()
    }
}

impl Default for ColumnIpv6 {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnData for ColumnIpv6 {
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
            let octets: [u8; 16] =
                reader.read_raw(16)?.try_into().unwrap();
            self.data.push(Ipv6Addr::from(octets));
        }
        Ok(())
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        for addr in &self.data {
            buf.put_slice(&addr.octets());
        }
        Ok(())
    }

    fn append_value(&mut self, value: Value) -> Result<()> {
        match value {
            Value::Ipv6(addr) => {
                self.data.push(addr);
                Ok(())
            }
            other => Err(value_mismatch(&other, &self.type_)),
        }
    }

    fn value_at(&self, index: usize) -> Value {
        Value::Ipv6(self.data[index])
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

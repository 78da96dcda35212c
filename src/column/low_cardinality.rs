//! LowCardinality columns (dictionary encoding).
//!
//! Wire layout:
//!
//! ```text
//! [version: varint]            // 1 = shared dictionaries with additional keys
//! [flags: varint]              // low nibble = index width code (0..3 =>
//!                              // u8/u16/u32/u64), bit 9 = has additional
//!                              // keys, bit 10 = need update dictionary
//! [dictionary size: varint]
//! [dictionary values]          // the unwrapped inner type, one per entry
//! [index count: varint]        // equals the row count
//! [indices]                    // row -> dictionary slot, at the flagged width
//! ```
//!
//! For a `LowCardinality(Nullable(T))` column, NULL is dictionary index 0,
//! which holds the inner type's default as a sentinel; the null mask is
//! never written. The writer always sets the additional-keys bit and picks
//! the narrowest index width that addresses the dictionary. Dictionary
//! order is an encoding detail -- only the value mapping is stable.

use std::collections::HashMap;

use bytes::{BufMut, BytesMut};

use super::{new_column, value_mismatch, ColumnBuffer, ColumnData};
use crate::types::Type;
use crate::value::Value;
use crate::wire::{self, WireReader};
use crate::{Error, Result};

/// Serialization version: shared dictionaries with additional keys.
const DICT_VERSION: u64 = 1;
/// Flag: the dictionary is carried inline with the column body.
const HAS_ADDITIONAL_KEYS: u64 = 1 << 9;
/// Flag: the receiver should refresh a shared dictionary. Tolerated on
/// reads, never set on writes.
const NEED_UPDATE_DICTIONARY: u64 = 1 << 10;
/// Low nibble of the flags word: index width code.
const INDEX_WIDTH_MASK: u64 = 0x0F;

/// Column for `LowCardinality(T)`.
pub struct ColumnLowCardinality {
    type_: Type,
    nullable: bool,
    dict: ColumnBuffer,
    indices: Vec<u64>,
    lookup: HashMap<Vec<u8>, u64>,
}

impl ColumnLowCardinality {
    /// Creates an empty column for a `LowCardinality(T)` type.
    pub fn new(type_: Type) -> Result<Self> {
        type_.validate()?;
        let (nullable, dict) = match &type_ {
            Type::LowCardinality(inner) => {
                (inner.is_nullable(), new_column(inner.unwrapped())?)
            }
            other => {
                return Err(Error::InvalidType(format!(
                    "ColumnLowCardinality requires LowCardinality, got {}",
                    other
                )))
            }
        };
        Ok(Self {
            type_,
            nullable,
            dict,
            indices: Vec::new(),
            lookup: HashMap::new(),
        })
    }

    /// Number of dictionary entries, the null sentinel included.
    pub fn dictionary_len(&self) -> usize {
        self.dict.len()
    }

    /// Dictionary slot of the row at `index`.
    ///
    /// # Panics
    ///
    /// Panics if out of range.
    pub fn index_at(&self, index: usize) -> u64 {
        self.indices[index]
    }

    /// Nullable columns reserve slot 0 for the sentinel before any value.
    fn ensure_sentinel(&mut self) -> Result<()> {
        if self.nullable && self.dict.is_empty() {
            let sentinel = self.dict.data_type().default_value();
            self.dict.append_value(sentinel)?;
        }
        Ok(())
    }

    fn intern(&mut self, value: Value) -> Result<u64> {
        self.ensure_sentinel()?;
        let key = dict_key(&value);
        if let Some(&slot) = self.lookup.get(&key) {
            return Ok(slot);
        }
        let slot = self.dict.len() as u64;
        self.dict.append_value(value)?;
        self.lookup.insert(key, slot);
        Ok(slot)
    }
}

/// Canonical byte key for dictionary deduplication. Equal values map to
/// equal keys; floats are keyed by their bit pattern.
fn dict_key(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_key(value, &mut out);
    out
}

fn encode_key(value: &Value, out: &mut Vec<u8>) {
    out.push(discriminant_tag(value));
    match value {
        Value::Null => {}
        Value::Bool(v) => out.push(*v as u8),
        Value::UInt8(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::UInt16(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::UInt32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::UInt64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::UInt128(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::UInt256(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Int8(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Int16(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Int64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Int128(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Int256(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Float32(v) => out.extend_from_slice(&v.to_bits().to_le_bytes()),
        Value::Float64(v) => out.extend_from_slice(&v.to_bits().to_le_bytes()),
        Value::String(b) | Value::FixedString(b) => out.extend_from_slice(b),
        Value::Date(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Date32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::DateTime(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::DateTime64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Decimal32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Decimal64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Decimal128(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Decimal256(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Uuid(v) => out.extend_from_slice(v.as_bytes()),
        Value::Ipv4(v) => out.extend_from_slice(&v.octets()),
        Value::Ipv6(v) => out.extend_from_slice(&v.octets()),
        Value::Enum8(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Enum16(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Array(items) | Value::Tuple(items) => {
            out.extend_from_slice(&(items.len() as u64).to_le_bytes());
            for item in items {
                encode_key(item, out);
            }
        }
        Value::Map(entries) => {
            out.extend_from_slice(&(entries.len() as u64).to_le_bytes());
            for (k, v) in entries {
                encode_key(k, out);
                encode_key(v, out);
            }
        }
    }
}

fn discriminant_tag(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::UInt8(_) => 2,
        Value::UInt16(_) => 3,
        Value::UInt32(_) => 4,
        Value::UInt64(_) => 5,
        Value::UInt128(_) => 6,
        Value::UInt256(_) => 7,
        Value::Int8(_) => 8,
        Value::Int16(_) => 9,
        Value::Int32(_) => 10,
        Value::Int64(_) => 11,
        Value::Int128(_) => 12,
        Value::Int256(_) => 13,
        Value::Float32(_) => 14,
        Value::Float64(_) => 15,
        Value::String(_) => 16,
        Value::FixedString(_) => 17,
        Value::Date(_) => 18,
        Value::Date32(_) => 19,
        Value::DateTime(_) => 20,
        Value::DateTime64(_) => 21,
        Value::Decimal32(_) => 22,
        Value::Decimal64(_) => 23,
        Value::Decimal128(_) => 24,
        Value::Decimal256(_) => 25,
        Value::Uuid(_) => 26,
        Value::Ipv4(_) => 27,
        Value::Ipv6(_) => 28,
        Value::Enum8(_) => 29,
        Value::Enum16(_) => 30,
        Value::Array(_) => 31,
        Value::Tuple(_) => 32,
        Value::Map(_) => 33,
    }
}

fn index_width_code(dictionary_len: usize) -> u64 {
    if dictionary_len <= u8::MAX as usize + 1 {
        0
    } else if dictionary_len <= u16::MAX as usize + 1 {
        1
    } else if dictionary_len <= u32::MAX as usize + 1 {
        2
    } else {
        3
    }
}

impl ColumnData for ColumnLowCardinality {
    fn data_type(&self) -> &Type {
        &self.type_
    }

    fn len(&self) -> usize {
        self.indices.len()
    }

    fn clear(&mut self) {
        self.dict.clear();
        self.indices.clear();
        self.lookup.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.indices.reserve(additional);
    }

    fn read_body(
        &mut self,
        reader: &mut WireReader<'_>,
        rows: usize,
    ) -> Result<()> {
        // A block-local dictionary cannot be merged into existing rows.
        if !self.is_empty() || !self.dict.is_empty() {
            return Err(Error::InvalidState(
                "LowCardinality columns decode into an empty buffer".into(),
            ));
        }

        let version = reader.read_varint()?;
        if version != DICT_VERSION {
            return Err(Error::ProtocolViolation(format!(
                "unsupported LowCardinality serialization version {}",
                version
            )));
        }

        let flags = reader.read_varint()?;
        if flags & HAS_ADDITIONAL_KEYS == 0 {
            return Err(Error::ProtocolViolation(
                "LowCardinality without additional keys (global dictionary) \
                 is not supported"
                    .into(),
            ));
        }
        // NEED_UPDATE_DICTIONARY only matters for shared server-side
        // dictionaries; nothing to do for a per-block read.
        let _ = flags & NEED_UPDATE_DICTIONARY;
        let width = flags & INDEX_WIDTH_MASK;
        if width > 3 {
            return Err(Error::ProtocolViolation(format!(
                "invalid LowCardinality index width code {}",
                width
            )));
        }

        let dict_size = reader.read_varint()?;
        if dict_size > u32::MAX as u64 {
            return Err(Error::ProtocolViolation(format!(
                "implausible LowCardinality dictionary size {}",
                dict_size
            )));
        }
        let dict_size = dict_size as usize;
        self.dict.read_body(reader, dict_size)?;

        let index_count = reader.read_varint()? as usize;
        if index_count != rows {
            return Err(Error::ProtocolViolation(format!(
                "LowCardinality index count {} does not match row count {}",
                index_count, rows
            )));
        }

        self.indices.reserve(rows.min(65_536));
        for _ in 0..rows {
            let index = match width {
                0 => reader.read_u8()? as u64,
                1 => reader.read_u16()? as u64,
                2 => reader.read_u32()? as u64,
                _ => reader.read_u64()?,
            };
            if index as usize >= dict_size {
                return Err(Error::ProtocolViolation(format!(
                    "LowCardinality index {} out of dictionary range {}",
                    index, dict_size
                )));
            }
            self.indices.push(index);
        }

        // Rebuild the dedup table so further appends reuse server slots.
        // Slot 0 of a nullable dictionary is the sentinel, not a value.
        let first_value_slot = if self.nullable { 1 } else { 0 };
        for slot in first_value_slot..self.dict.len() {
            let key = dict_key(&self.dict.value_at(slot));
            self.lookup.entry(key).or_insert(slot as u64);
        }
        Ok(())
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        wire::put_varint(buf, DICT_VERSION);

        let width = index_width_code(self.dict.len());
        wire::put_varint(buf, width | HAS_ADDITIONAL_KEYS);

        wire::put_varint(buf, self.dict.len() as u64);
        self.dict.write_body(buf)?;

        wire::put_varint(buf, self.indices.len() as u64);
        for &index in &self.indices {
            match width {
                0 => buf.put_u8(index as u8),
                1 => buf.put_u16_le(index as u16),
                2 => buf.put_u32_le(index as u32),
                _ => buf.put_u64_le(index),
            }
        }
        Ok(())
    }

    fn append_value(&mut self, value: Value) -> Result<()> {
        let slot = match value {
            Value::Null if self.nullable => {
                self.ensure_sentinel()?;
                0
            }
            Value::Null => {
                return Err(value_mismatch(&Value::Null, &self.type_))
            }
            other => self.intern(other)?,
        };
        self.indices.push(slot);
        Ok(())
    }

    fn value_at(&self, index: usize) -> Value {
        let slot = self.indices[index];
        if self.nullable && slot == 0 {
            Value::Null
        } else {
            self.dict.value_at(slot as usize)
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

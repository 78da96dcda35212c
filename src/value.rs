//! Dynamic values used at the row boundary.
//!
//! Columns store their data in typed buffers; [`Value`] is the boxed form
//! used when rows cross the API: appending rows in the insert pipeline,
//! reading cells through [`Row`](crate::row::Row), and carrying
//! LowCardinality dictionary entries. Wire values stay raw here -- a
//! `DateTime` is its epoch seconds, an `Enum8` is its code; the typed
//! column accessors do the chrono/name conversions.

use std::net::{Ipv4Addr, Ipv6Addr};

use uuid::Uuid;

/// A signed 256-bit integer as 32 little-endian bytes.
///
/// Matches the wire shape: four little-endian 64-bit limbs in ascending
/// significance. Arithmetic is out of scope; this is a transport container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Int256(pub [u8; 32]);

/// An unsigned 256-bit integer as 32 little-endian bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct UInt256(pub [u8; 32]);

impl Int256 {
    /// Zero.
    pub const ZERO: Int256 = Int256([0; 32]);

    /// Sign-extends an `i128` into the low limbs.
    pub fn from_i128(v: i128) -> Self {
        let fill = if v < 0 { 0xFF } else { 0x00 };
        let mut bytes = [fill; 32];
        bytes[..16].copy_from_slice(&v.to_le_bytes());
        Int256(bytes)
    }

    /// Truncates to an `i128`, dropping the high limbs.
    pub fn low_i128(&self) -> i128 {
        i128::from_le_bytes(self.0[..16].try_into().unwrap())
    }

    /// True when the value is a sign extension of its low 128 bits, i.e.
    /// `low_i128` loses nothing.
    pub fn fits_i128(&self) -> bool {
        *self == Int256::from_i128(self.low_i128())
    }

    /// Builds from 32 little-endian bytes.
    pub fn from_le_bytes(bytes: [u8; 32]) -> Self {
        Int256(bytes)
    }

    /// The 32 little-endian bytes.
    pub fn to_le_bytes(self) -> [u8; 32] {
        self.0
    }
}

impl Default for Int256 {
    fn default() -> Self {
        Int256::ZERO
    }
}

impl From<i128> for Int256 {
    fn from(v: i128) -> Self {
        Int256::from_i128(v)
    }
}

impl UInt256 {
    /// Zero-extends a `u128` into the low limbs.
    pub fn from_u128(v: u128) -> Self {
        let mut bytes = [0u8; 32];
        bytes[..16].copy_from_slice(&v.to_le_bytes());
        UInt256(bytes)
    }

    /// Truncates to a `u128`, dropping the high limbs.
    pub fn low_u128(&self) -> u128 {
        u128::from_le_bytes(self.0[..16].try_into().unwrap())
    }

    /// Builds from 32 little-endian bytes.
    pub fn from_le_bytes(bytes: [u8; 32]) -> Self {
        UInt256(bytes)
    }

    /// The 32 little-endian bytes.
    pub fn to_le_bytes(self) -> [u8; 32] {
        self.0
    }
}

impl From<u128> for UInt256 {
    fn from(v: u128) -> Self {
        UInt256::from_u128(v)
    }
}

/// One cell of a column, in its raw wire representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL, valid only inside Nullable and LowCardinality(Nullable).
    Null,
    /// Bool stored as one byte.
    Bool(bool),
    /// UInt8.
    UInt8(u8),
    /// UInt16.
    UInt16(u16),
    /// UInt32.
    UInt32(u32),
    /// UInt64.
    UInt64(u64),
    /// UInt128.
    UInt128(u128),
    /// UInt256.
    UInt256(UInt256),
    /// Int8.
    Int8(i8),
    /// Int16.
    Int16(i16),
    /// Int32.
    Int32(i32),
    /// Int64.
    Int64(i64),
    /// Int128.
    Int128(i128),
    /// Int256.
    Int256(Int256),
    /// Float32.
    Float32(f32),
    /// Float64.
    Float64(f64),
    /// String as raw bytes; not required to be UTF-8.
    String(Vec<u8>),
    /// FixedString(N) payload, exactly N bytes (zero-padded on write).
    FixedString(Vec<u8>),
    /// Days since 1970-01-01 (Date).
    Date(u16),
    /// Days since 1970-01-01, signed (Date32).
    Date32(i32),
    /// Seconds since the Unix epoch (DateTime).
    DateTime(u32),
    /// Ticks at the column's precision since the Unix epoch (DateTime64).
    DateTime64(i64),
    /// Decimal mantissa in a 32-bit container.
    Decimal32(i32),
    /// Decimal mantissa in a 64-bit container.
    Decimal64(i64),
    /// Decimal mantissa in a 128-bit container.
    Decimal128(i128),
    /// Decimal mantissa in a 256-bit container.
    Decimal256(Int256),
    /// UUID.
    Uuid(Uuid),
    /// IPv4 address.
    Ipv4(Ipv4Addr),
    /// IPv6 address.
    Ipv6(Ipv6Addr),
    /// Enum8 code.
    Enum8(i8),
    /// Enum16 code.
    Enum16(i16),
    /// Array elements.
    Array(Vec<Value>),
    /// Tuple elements, one per tuple field.
    Tuple(Vec<Value>),
    /// Map entries in insertion order.
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// True for SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrows string-ish payloads as bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(b) | Value::FixedString(b) => Some(b),
            _ => None,
        }
    }

    /// String payload decoded lossily; `None` for non-string values.
    pub fn as_str_lossy(&self) -> Option<std::borrow::Cow<'_, str>> {
        self.as_bytes().map(String::from_utf8_lossy)
    }

    /// Short name of the variant, used in mismatch diagnostics.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::UInt8(_) => "UInt8",
            Value::UInt16(_) => "UInt16",
            Value::UInt32(_) => "UInt32",
            Value::UInt64(_) => "UInt64",
            Value::UInt128(_) => "UInt128",
            Value::UInt256(_) => "UInt256",
            Value::Int8(_) => "Int8",
            Value::Int16(_) => "Int16",
            Value::Int32(_) => "Int32",
            Value::Int64(_) => "Int64",
            Value::Int128(_) => "Int128",
            Value::Int256(_) => "Int256",
            Value::Float32(_) => "Float32",
            Value::Float64(_) => "Float64",
            Value::String(_) => "String",
            Value::FixedString(_) => "FixedString",
            Value::Date(_) => "Date",
            Value::Date32(_) => "Date32",
            Value::DateTime(_) => "DateTime",
            Value::DateTime64(_) => "DateTime64",
            Value::Decimal32(_) => "Decimal32",
            Value::Decimal64(_) => "Decimal64",
            Value::Decimal128(_) => "Decimal128",
            Value::Decimal256(_) => "Decimal256",
            Value::Uuid(_) => "UUID",
            Value::Ipv4(_) => "IPv4",
            Value::Ipv6(_) => "IPv6",
            Value::Enum8(_) => "Enum8",
            Value::Enum16(_) => "Enum16",
            Value::Array(_) => "Array",
            Value::Tuple(_) => "Tuple",
            Value::Map(_) => "Map",
        }
    }
}

macro_rules! impl_from {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for Value {
            fn from(v: $ty) -> Value {
                Value::$variant(v)
            }
        }
    };
}

impl_from!(bool, Bool);
impl_from!(u8, UInt8);
impl_from!(u16, UInt16);
impl_from!(u32, UInt32);
impl_from!(u64, UInt64);
impl_from!(u128, UInt128);
impl_from!(i8, Int8);
impl_from!(i16, Int16);
impl_from!(i32, Int32);
impl_from!(i64, Int64);
impl_from!(i128, Int128);
impl_from!(f32, Float32);
impl_from!(f64, Float64);
impl_from!(Uuid, Uuid);
impl_from!(Ipv4Addr, Ipv4);
impl_from!(Ipv6Addr, Ipv6);

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::String(s.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::String(s.into_bytes())
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Value {
        Value::String(b.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Value {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

//! The server type system.
//!
//! [`Type`] is the parsed form of a server type expression such as
//! `LowCardinality(Nullable(String))` or `Decimal(12, 4)`. It drives column
//! construction ([`crate::column::new_column`]), knows each type's storage
//! layout (fixed width, decimal container, DateTime64 tick scale), and
//! renders back to the canonical expression via [`std::fmt::Display`].
//!
//! Nesting rules are enforced when parsing and may be re-checked with
//! [`Type::validate`]: `Nullable` cannot wrap `Array`, `Map`,
//! `LowCardinality`, or another `Nullable`.

mod parser;

use std::fmt;

use crate::value::{Int256, UInt256, Value};
use crate::{Error, Result};

/// One named variant of an `Enum8` or `Enum16` type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumItem {
    /// Variant name, stored verbatim (unescaped).
    pub name: String,
    /// Variant code. Enum8 restricts this to the `i8` range.
    pub value: i16,
}

/// A parsed server type expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    /// One-byte boolean.
    Bool,
    /// Unsigned 8-bit integer.
    UInt8,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Unsigned 32-bit integer.
    UInt32,
    /// Unsigned 64-bit integer.
    UInt64,
    /// Unsigned 128-bit integer.
    UInt128,
    /// Unsigned 256-bit integer.
    UInt256,
    /// Signed 8-bit integer.
    Int8,
    /// Signed 16-bit integer.
    Int16,
    /// Signed 32-bit integer.
    Int32,
    /// Signed 64-bit integer.
    Int64,
    /// Signed 128-bit integer.
    Int128,
    /// Signed 256-bit integer.
    Int256,
    /// IEEE-754 single precision float.
    Float32,
    /// IEEE-754 double precision float.
    Float64,
    /// Variable-length byte string.
    String,
    /// Fixed-length byte string of the given size.
    FixedString(usize),
    /// Days since 1970-01-01 as UInt16.
    Date,
    /// Days since 1970-01-01 as Int32.
    Date32,
    /// Seconds since the Unix epoch as UInt32, with an optional timezone.
    /// The timezone is presentation metadata only.
    DateTime {
        /// IANA timezone name from the type expression, if any.
        timezone: Option<String>,
    },
    /// Ticks at `10^precision` per second since the epoch, as Int64.
    DateTime64 {
        /// Sub-second decimal digits (0..=9).
        precision: u32,
        /// IANA timezone name from the type expression, if any.
        timezone: Option<String>,
    },
    /// Fixed-point decimal; the container width follows the precision.
    Decimal {
        /// Total significant digits (1..=76).
        precision: u32,
        /// Digits after the decimal point.
        scale: u32,
    },
    /// 128-bit UUID.
    Uuid,
    /// IPv4 address as a UInt32 in network order.
    Ipv4,
    /// IPv6 address as 16 raw bytes.
    Ipv6,
    /// Enumeration with Int8 codes.
    Enum8(Vec<EnumItem>),
    /// Enumeration with Int16 codes.
    Enum16(Vec<EnumItem>),
    /// NULL wrapper around a scalar type.
    Nullable(Box<Type>),
    /// Variable-length array of one element type.
    Array(Box<Type>),
    /// Fixed-arity tuple of heterogeneous element types.
    Tuple(Vec<Type>),
    /// Key-value map, laid out as `Array(Tuple(K, V))`.
    Map(Box<Type>, Box<Type>),
    /// Dictionary-encoded wrapper.
    LowCardinality(Box<Type>),
    /// The type of no values; used by NULL-only literals.
    Nothing,
}

impl Type {
    /// Parses a server type expression.
    pub fn parse(expr: &str) -> Result<Type> {
        parser::parse(expr)
    }

    /// Convenience constructor for `Nullable(inner)`.
    pub fn nullable(inner: Type) -> Type {
        Type::Nullable(Box::new(inner))
    }

    /// Convenience constructor for `Array(item)`.
    pub fn array(item: Type) -> Type {
        Type::Array(Box::new(item))
    }

    /// Convenience constructor for `Map(key, value)`.
    pub fn map(key: Type, value: Type) -> Type {
        Type::Map(Box::new(key), Box::new(value))
    }

    /// Convenience constructor for `LowCardinality(inner)`.
    pub fn low_cardinality(inner: Type) -> Type {
        Type::LowCardinality(Box::new(inner))
    }

    /// Convenience constructor for `Decimal(precision, scale)`.
    pub fn decimal(precision: u32, scale: u32) -> Type {
        Type::Decimal { precision, scale }
    }

    /// Convenience constructor for `DateTime64(precision)`.
    pub fn datetime64(precision: u32, timezone: Option<String>) -> Type {
        Type::DateTime64 { precision, timezone }
    }

    /// Storage bytes per row for fixed-width types, `None` otherwise.
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            Type::Bool | Type::UInt8 | Type::Int8 | Type::Enum8(_) => Some(1),
            Type::UInt16 | Type::Int16 | Type::Date | Type::Enum16(_) => {
                Some(2)
            }
            Type::UInt32
            | Type::Int32
            | Type::Float32
            | Type::Date32
            | Type::DateTime { .. }
            | Type::Ipv4 => Some(4),
            Type::UInt64
            | Type::Int64
            | Type::Float64
            | Type::DateTime64 { .. } => Some(8),
            Type::UInt128 | Type::Int128 | Type::Uuid | Type::Ipv6 => Some(16),
            Type::UInt256 | Type::Int256 => Some(32),
            Type::FixedString(size) => Some(*size),
            Type::Decimal { precision, .. } => {
                Some(decimal_container_width(*precision))
            }
            _ => None,
        }
    }

    /// Sub-second ticks per second for `DateTime64`, `None` otherwise.
    pub fn tick_scale(&self) -> Option<i64> {
        match self {
            Type::DateTime64 { precision, .. } => {
                Some(10i64.pow(*precision))
            }
            _ => None,
        }
    }

    /// True for `Nullable(_)`.
    pub fn is_nullable(&self) -> bool {
        matches!(self, Type::Nullable(_))
    }

    /// The wrapped type for `Nullable`/`LowCardinality`, `self` otherwise.
    pub fn unwrapped(&self) -> &Type {
        match self {
            Type::Nullable(inner) | Type::LowCardinality(inner) => {
                inner.unwrapped()
            }
            other => other,
        }
    }

    /// Resolves an enum code to its name, if this is an enum type and the
    /// code is mapped. Unknown codes are passed through by the column layer.
    pub fn enum_name(&self, code: i16) -> Option<&str> {
        let items = match self {
            Type::Enum8(items) | Type::Enum16(items) => items,
            _ => return None,
        };
        items.iter().find(|i| i.value == code).map(|i| i.name.as_str())
    }

    /// Resolves an enum name to its code.
    pub fn enum_value(&self, name: &str) -> Option<i16> {
        let items = match self {
            Type::Enum8(items) | Type::Enum16(items) => items,
            _ => return None,
        };
        items.iter().find(|i| i.name == name).map(|i| i.value)
    }

    /// Recursively checks the nesting rules.
    pub fn validate(&self) -> Result<()> {
        match self {
            Type::Nullable(inner) => {
                match inner.as_ref() {
                    Type::Array(_)
                    | Type::Map(_, _)
                    | Type::LowCardinality(_)
                    | Type::Nullable(_) => {
                        return Err(Error::InvalidType(format!(
                            "Nullable cannot wrap {}",
                            inner
                        )));
                    }
                    _ => {}
                }
                inner.validate()
            }
            Type::Array(item) | Type::LowCardinality(item) => item.validate(),
            Type::Map(key, value) => {
                key.validate()?;
                value.validate()
            }
            Type::Tuple(items) => {
                for item in items {
                    item.validate()?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// The default value of this type, used for null slots in nullable
    /// columns and for the LowCardinality null sentinel at index 0.
    pub fn default_value(&self) -> Value {
        match self {
            Type::Bool => Value::Bool(false),
            Type::UInt8 => Value::UInt8(0),
            Type::UInt16 => Value::UInt16(0),
            Type::UInt32 => Value::UInt32(0),
            Type::UInt64 => Value::UInt64(0),
            Type::UInt128 => Value::UInt128(0),
            Type::UInt256 => Value::UInt256(UInt256::default()),
            Type::Int8 => Value::Int8(0),
            Type::Int16 => Value::Int16(0),
            Type::Int32 => Value::Int32(0),
            Type::Int64 => Value::Int64(0),
            Type::Int128 => Value::Int128(0),
            Type::Int256 => Value::Int256(Int256::ZERO),
            Type::Float32 => Value::Float32(0.0),
            Type::Float64 => Value::Float64(0.0),
            Type::String => Value::String(Vec::new()),
            Type::FixedString(size) => Value::FixedString(vec![0; *size]),
            Type::Date => Value::Date(0),
            Type::Date32 => Value::Date32(0),
            Type::DateTime { .. } => Value::DateTime(0),
            Type::DateTime64 { .. } => Value::DateTime64(0),
            Type::Decimal { precision, .. } => {
                match decimal_container_width(*precision) {
                    4 => Value::Decimal32(0),
                    8 => Value::Decimal64(0),
                    16 => Value::Decimal128(0),
                    _ => Value::Decimal256(Int256::ZERO),
                }
            }
            Type::Uuid => Value::Uuid(uuid::Uuid::nil()),
            Type::Ipv4 => Value::Ipv4(std::net::Ipv4Addr::UNSPECIFIED),
            Type::Ipv6 => Value::Ipv6(std::net::Ipv6Addr::UNSPECIFIED),
            Type::Enum8(items) => {
                Value::Enum8(items.first().map(|i| i.value as i8).unwrap_or(0))
            }
            Type::Enum16(items) => {
                Value::Enum16(items.first().map(|i| i.value).unwrap_or(0))
            }
            Type::Nullable(_) => Value::Null,
            Type::Array(_) => Value::Array(Vec::new()),
            Type::Tuple(items) => {
                Value::Tuple(items.iter().map(|t| t.default_value()).collect())
            }
            Type::Map(_, _) => Value::Map(Vec::new()),
            Type::LowCardinality(inner) => inner.default_value(),
            Type::Nothing => Value::Null,
        }
    }
}

/// Decimal container width in bytes for the given precision.
///
/// The narrowest container that holds `precision` digits: 4 bytes up to 9
/// digits, 8 up to 18, 16 up to 38, 32 up to 76.
pub fn decimal_container_width(precision: u32) -> usize {
    match precision {
        0..=9 => 4,
        10..=18 => 8,
        19..=38 => 16,
        _ => 32,
    }
}

fn escape_enum_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out
}

fn fmt_enum_items(f: &mut fmt::Formatter<'_>, items: &[EnumItem]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "'{}' = {}", escape_enum_name(&item.name), item.value)?;
    }
    Ok(())
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "Bool"),
            Type::UInt8 => write!(f, "UInt8"),
            Type::UInt16 => write!(f, "UInt16"),
            Type::UInt32 => write!(f, "UInt32"),
            Type::UInt64 => write!(f, "UInt64"),
            Type::UInt128 => write!(f, "UInt128"),
            Type::UInt256 => write!(f, "UInt256"),
            Type::Int8 => write!(f, "Int8"),
            Type::Int16 => write!(f, "Int16"),
            Type::Int32 => write!(f, "Int32"),
            Type::Int64 => write!(f, "Int64"),
            Type::Int128 => write!(f, "Int128"),
            Type::Int256 => write!(f, "Int256"),
            Type::Float32 => write!(f, "Float32"),
            Type::Float64 => write!(f, "Float64"),
            Type::String => write!(f, "String"),
            Type::FixedString(size) => write!(f, "FixedString({})", size),
            Type::Date => write!(f, "Date"),
            Type::Date32 => write!(f, "Date32"),
            Type::DateTime { timezone: None } => write!(f, "DateTime"),
            Type::DateTime { timezone: Some(tz) } => {
                write!(f, "DateTime('{}')", tz)
            }
            Type::DateTime64 { precision, timezone: None } => {
                write!(f, "DateTime64({})", precision)
            }
            Type::DateTime64 { precision, timezone: Some(tz) } => {
                write!(f, "DateTime64({}, '{}')", precision, tz)
            }
            Type::Decimal { precision, scale } => {
                write!(f, "Decimal({}, {})", precision, scale)
            }
            Type::Uuid => write!(f, "UUID"),
            Type::Ipv4 => write!(f, "IPv4"),
            Type::Ipv6 => write!(f, "IPv6"),
            Type::Enum8(items) => {
                write!(f, "Enum8(")?;
                fmt_enum_items(f, items)?;
                write!(f, ")")
            }
            Type::Enum16(items) => {
                write!(f, "Enum16(")?;
                fmt_enum_items(f, items)?;
                write!(f, ")")
            }
            Type::Nullable(inner) => write!(f, "Nullable({})", inner),
            Type::Array(item) => write!(f, "Array({})", item),
            Type::Tuple(items) => {
                write!(f, "Tuple(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Type::Map(key, value) => write!(f, "Map({}, {})", key, value),
            Type::LowCardinality(inner) => {
                write!(f, "LowCardinality({})", inner)
            }
            Type::Nothing => write!(f, "Nothing"),
        }
    }
}

//! Recursive-descent parser for server type expressions.
//!
//! The grammar is small: an identifier head, optionally followed by a
//! parenthesised argument list whose members are types, integers, or quoted
//! strings. Quoted strings accept `\'`, `\\`, and doubled-quote escapes.

use super::{EnumItem, Type};
use crate::{Error, Result};

/// Parses a full type expression; trailing input is an error.
pub fn parse(expr: &str) -> Result<Type> {
    let mut p = Parser { input: expr.as_bytes(), pos: 0 };
    let ty = p.parse_type()?;
    p.skip_ws();
    if !p.at_end() {
        return Err(p.error("trailing input after type expression"));
    }
    ty.validate()?;
    Ok(ty)
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, msg: &str) -> Error {
        Error::InvalidType(format!(
            "{} at offset {} in {:?}",
            msg,
            self.pos,
            String::from_utf8_lossy(self.input)
        ))
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, expected: u8) -> bool {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: u8) -> Result<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", expected as char)))
        }
    }

    fn parse_ident(&mut self) -> Result<&'a str> {
        self.skip_ws();
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'_')
        {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected a type name"));
        }
        // Identifier bytes are ASCII by construction.
        Ok(std::str::from_utf8(&self.input[start..self.pos]).unwrap())
    }

    fn parse_integer(&mut self) -> Result<i64> {
        self.skip_ws();
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.input[start..self.pos]).unwrap();
        text.parse::<i64>().map_err(|_| self.error("expected an integer"))
    }

    fn parse_quoted(&mut self) -> Result<String> {
        self.skip_ws();
        if self.bump() != Some(b'\'') {
            return Err(self.error("expected a quoted string"));
        }
        let mut out = Vec::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated quoted string")),
                Some(b'\\') => match self.bump() {
                    Some(b'\'') => out.push(b'\''),
                    Some(b'\\') => out.push(b'\\'),
                    Some(other) => {
                        // Unknown escapes keep both bytes verbatim.
                        out.push(b'\\');
                        out.push(other);
                    }
                    None => {
                        return Err(self.error("unterminated escape"));
                    }
                },
                Some(b'\'') => {
                    // Doubled quote is an escaped quote.
                    if self.peek() == Some(b'\'') {
                        self.pos += 1;
                        out.push(b'\'');
                    } else {
                        break;
                    }
                }
                Some(other) => out.push(other),
            }
        }
        String::from_utf8(out)
            .map_err(|_| self.error("quoted string is not UTF-8"))
    }

    fn parse_enum_items(&mut self, code_range: (i64, i64)) -> Result<Vec<EnumItem>> {
        self.expect(b'(')?;
        let mut items = Vec::new();
        loop {
            let name = self.parse_quoted()?;
            self.expect(b'=')?;
            let value = self.parse_integer()?;
            if value < code_range.0 || value > code_range.1 {
                return Err(self.error("enum code out of range"));
            }
            items.push(EnumItem { name, value: value as i16 });
            if !self.eat(b',') {
                break;
            }
        }
        self.expect(b')')?;
        if items.is_empty() {
            return Err(self.error("enum requires at least one variant"));
        }
        Ok(items)
    }

    fn parse_optional_timezone(&mut self) -> Result<Option<String>> {
        if self.eat(b'(') {
            let tz = self.parse_quoted()?;
            self.expect(b')')?;
            Ok(Some(tz))
        } else {
            Ok(None)
        }
    }

    fn parse_type(&mut self) -> Result<Type> {
        let head = self.parse_ident()?;
        match head {
            "Bool" => Ok(Type::Bool),
            "UInt8" => Ok(Type::UInt8),
            "UInt16" => Ok(Type::UInt16),
            "UInt32" => Ok(Type::UInt32),
            "UInt64" => Ok(Type::UInt64),
            "UInt128" => Ok(Type::UInt128),
            "UInt256" => Ok(Type::UInt256),
            "Int8" => Ok(Type::Int8),
            "Int16" => Ok(Type::Int16),
            "Int32" => Ok(Type::Int32),
            "Int64" => Ok(Type::Int64),
            "Int128" => Ok(Type::Int128),
            "Int256" => Ok(Type::Int256),
            "Float32" => Ok(Type::Float32),
            "Float64" => Ok(Type::Float64),
            "String" => Ok(Type::String),
            "Date" => Ok(Type::Date),
            "Date32" => Ok(Type::Date32),
            "UUID" => Ok(Type::Uuid),
            "IPv4" => Ok(Type::Ipv4),
            "IPv6" => Ok(Type::Ipv6),
            "Nothing" => Ok(Type::Nothing),

            "FixedString" => {
                self.expect(b'(')?;
                let size = self.parse_integer()?;
                self.expect(b')')?;
                if size <= 0 || size > crate::wire::MAX_STRING_LEN as i64 {
                    return Err(self.error("FixedString size out of range"));
                }
                Ok(Type::FixedString(size as usize))
            }

            "DateTime" => {
                let timezone = self.parse_optional_timezone()?;
                Ok(Type::DateTime { timezone })
            }

            "DateTime64" => {
                self.expect(b'(')?;
                let precision = self.parse_integer()?;
                if !(0..=9).contains(&precision) {
                    return Err(self.error("DateTime64 precision out of range"));
                }
                let timezone = if self.eat(b',') {
                    Some(self.parse_quoted()?)
                } else {
                    None
                };
                self.expect(b')')?;
                Ok(Type::DateTime64 { precision: precision as u32, timezone })
            }

            "Decimal" => {
                self.expect(b'(')?;
                let precision = self.parse_integer()?;
                self.expect(b',')?;
                let scale = self.parse_integer()?;
                self.expect(b')')?;
                self.make_decimal(precision, scale)
            }
            "Decimal32" => self.sized_decimal(9),
            "Decimal64" => self.sized_decimal(18),
            "Decimal128" => self.sized_decimal(38),
            "Decimal256" => self.sized_decimal(76),

            "Enum8" => Ok(Type::Enum8(
                self.parse_enum_items((i8::MIN as i64, i8::MAX as i64))?,
            )),
            "Enum16" => Ok(Type::Enum16(
                self.parse_enum_items((i16::MIN as i64, i16::MAX as i64))?,
            )),

            "Nullable" => {
                self.expect(b'(')?;
                let inner = self.parse_type()?;
                self.expect(b')')?;
                Ok(Type::nullable(inner))
            }
            "Array" => {
                self.expect(b'(')?;
                let item = self.parse_type()?;
                self.expect(b')')?;
                Ok(Type::array(item))
            }
            "LowCardinality" => {
                self.expect(b'(')?;
                let inner = self.parse_type()?;
                self.expect(b')')?;
                Ok(Type::low_cardinality(inner))
            }
            "Tuple" => {
                self.expect(b'(')?;
                let mut items = vec![self.parse_type()?];
                while self.eat(b',') {
                    items.push(self.parse_type()?);
                }
                self.expect(b')')?;
                Ok(Type::Tuple(items))
            }
            "Map" => {
                self.expect(b'(')?;
                let key = self.parse_type()?;
                self.expect(b',')?;
                let value = self.parse_type()?;
                self.expect(b')')?;
                Ok(Type::map(key, value))
            }

            other => {
                Err(Error::InvalidType(format!("unknown type head: {}", other)))
            }
        }
    }

    /// `Decimal32(S)`-style heads: a single scale argument, precision fixed.
    fn sized_decimal(&mut self, precision: i64) -> Result<Type> {
        self.expect(b'(')?;
        let scale = self.parse_integer()?;
        self.expect(b')')?;
        self.make_decimal(precision, scale)
    }

    fn make_decimal(&mut self, precision: i64, scale: i64) -> Result<Type> {
        if !(1..=76).contains(&precision) {
            return Err(self.error("Decimal precision out of range"));
        }
        if scale < 0 || scale > precision {
            return Err(self.error("Decimal scale out of range"));
        }
        Ok(Type::Decimal { precision: precision as u32, scale: scale as u32 })
    }
}

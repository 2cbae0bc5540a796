//! Conversions between the computational data types (`Integer`, `String` and `Buffer`), as described in §19.3.5
//! of the ACPI specification. The implicit conversions are applied whenever an operand of one type is used
//! where another is expected; the explicit ones back the `ToXXX` family of operators.

use crate::{
    method::Executor,
    object::{Object, ObjectRef, ObjectType, TypeMask},
    AmlError,
};
use alloc::{
    format,
    string::{String, ToString},
    vec::Vec,
};
use core::{cmp::Ordering, fmt::Write};

impl Executor<'_> {
    /// Convert `source` to one of the types in `allowed`. If it already is one, the same object is returned.
    /// Otherwise, the first of Integer, String and Buffer in `allowed` that `source` can become is used.
    pub(crate) fn convert(&mut self, source: ObjectRef, allowed: TypeMask) -> Result<ObjectRef, AmlError> {
        let source = if allowed.contains(ObjectType::Reference) { source } else { self.follow_reference(source)? };
        let source = self.read_object(source)?;
        let typ = source.typ();

        if allowed.contains(typ) {
            return Ok(source);
        }
        if typ == ObjectType::Uninitialized {
            return Err(AmlError::UninitializedValue);
        }

        let width = self.integer_width();
        let converted = {
            let object = source.lock();
            if allowed.contains(ObjectType::Integer) && typ != ObjectType::Package {
                Object::Integer(to_integer(&object, width)?)
            } else if allowed.contains(ObjectType::String) {
                Object::String(to_string(&object, width)?)
            } else if allowed.contains(ObjectType::Buffer) {
                Object::Buffer(to_buffer(&object, width)?)
            } else {
                return Err(AmlError::InvalidConversion);
            }
        };
        Ok(self.wrap(converted))
    }
}

/// Implicitly convert an object to an integer. Strings are parsed as hexadecimal, and buffers are read as
/// little-endian integers, truncated to the integer width.
pub fn to_integer(object: &Object, integer_width: usize) -> Result<u64, AmlError> {
    match object {
        Object::Integer(value) => Ok(*value),
        Object::String(string) => Ok(parse_hex(string.trim_start(), integer_width)),
        Object::Buffer(bytes) | Object::RawDataBuffer(bytes) => Ok(buffer_to_integer(bytes, integer_width)),
        Object::Uninitialized => Err(AmlError::UninitializedValue),
        _ => Err(AmlError::InvalidConversion),
    }
}

/// Explicitly convert an object to an integer, as `ToInteger` does. Unlike the implicit conversion, strings are
/// decimal unless they start with `0x`.
pub fn to_integer_explicit(object: &Object, integer_width: usize) -> Result<u64, AmlError> {
    match object {
        Object::String(string) => {
            let string = string.trim_start();
            match string.strip_prefix("0x").or_else(|| string.strip_prefix("0X")) {
                Some(hex) => Ok(parse_hex(hex, integer_width)),
                None => Ok(parse_decimal(string, integer_width)),
            }
        }
        other => to_integer(other, integer_width),
    }
}

pub fn to_buffer(object: &Object, integer_width: usize) -> Result<Vec<u8>, AmlError> {
    match object {
        Object::Integer(value) => Ok(value.to_le_bytes()[..(integer_width / 8)].to_vec()),
        Object::String(string) => Ok(string.as_bytes().to_vec()),
        Object::Buffer(bytes) | Object::RawDataBuffer(bytes) => Ok(bytes.clone()),
        Object::Uninitialized => Err(AmlError::UninitializedValue),
        _ => Err(AmlError::InvalidConversion),
    }
}

/// Implicitly convert an object to a string. Integers become zero-padded upper-case hex, and buffers become a
/// list of hex bytes separated by spaces.
pub fn to_string(object: &Object, integer_width: usize) -> Result<String, AmlError> {
    match object {
        Object::Integer(value) => Ok(format!("{:01$X}", value, integer_width / 4)),
        Object::String(string) => Ok(string.clone()),
        Object::Buffer(bytes) | Object::RawDataBuffer(bytes) => Ok(join_bytes(bytes, " ", |s, b| write!(s, "{:02X}", b))),
        Object::Uninitialized => Err(AmlError::UninitializedValue),
        _ => Err(AmlError::InvalidConversion),
    }
}

/// `ToHexString`: integers become upper-case hex without a prefix, buffers a comma separated list of hex bytes.
pub fn to_hex_string(object: &Object) -> Result<String, AmlError> {
    match object {
        Object::Integer(value) => Ok(format!("{:X}", value)),
        Object::String(string) => Ok(string.clone()),
        Object::Buffer(bytes) | Object::RawDataBuffer(bytes) => Ok(join_bytes(bytes, ",", |s, b| write!(s, "{:02X}", b))),
        Object::Uninitialized => Err(AmlError::UninitializedValue),
        _ => Err(AmlError::InvalidConversion),
    }
}

/// `ToDecimalString`: integers become decimal, buffers a comma separated list of decimal bytes.
pub fn to_decimal_string(object: &Object) -> Result<String, AmlError> {
    match object {
        Object::Integer(value) => Ok(value.to_string()),
        Object::String(string) => Ok(string.clone()),
        Object::Buffer(bytes) | Object::RawDataBuffer(bytes) => Ok(join_bytes(bytes, ",", |s, b| write!(s, "{}", b))),
        Object::Uninitialized => Err(AmlError::UninitializedValue),
        _ => Err(AmlError::InvalidConversion),
    }
}

/// `ToString`: copy bytes from a buffer, up to a null byte or `max_length` bytes, into a string.
pub fn buffer_to_string(bytes: &[u8], max_length: Option<usize>) -> String {
    let limit = max_length.map_or(bytes.len(), |max| usize::min(max, bytes.len()));
    let length = bytes[..limit].iter().position(|&b| b == 0).unwrap_or(limit);
    String::from_utf8_lossy(&bytes[..length]).into_owned()
}

pub fn to_bcd(mut value: u64) -> u64 {
    let mut result = 0;
    let mut shift = 0;
    while value != 0 && shift < 64 {
        result |= (value % 10) << shift;
        value /= 10;
        shift += 4;
    }
    result
}

pub fn from_bcd(value: u64) -> Result<u64, AmlError> {
    let mut result: u64 = 0;
    for nibble in (0..16).rev() {
        let digit = (value >> (nibble * 4)) & 0xf;
        if digit > 9 {
            return Err(AmlError::InvalidBcd(value));
        }
        result = result * 10 + digit;
    }
    Ok(result)
}

/// Concatenate two objects, as `Concat` does. The type of the result is decided by the first operand, and the
/// second is converted to match it.
pub fn concat(a: &Object, b: &Object, integer_width: usize) -> Result<Object, AmlError> {
    if matches!(a, Object::Uninitialized) || matches!(b, Object::Uninitialized) {
        return Err(AmlError::UninitializedValue);
    }

    match a {
        Object::Integer(_) => {
            let mut bytes = to_buffer(a, integer_width)?;
            let b = Object::Integer(to_integer(b, integer_width)?);
            bytes.extend(to_buffer(&b, integer_width)?);
            Ok(Object::Buffer(bytes))
        }
        Object::String(a) => {
            let mut string = a.clone();
            string.push_str(&operand_as_string(b, integer_width)?);
            Ok(Object::String(string))
        }
        Object::Buffer(a) | Object::RawDataBuffer(a) => {
            let mut bytes = a.clone();
            match b {
                Object::Integer(_) | Object::Buffer(_) | Object::RawDataBuffer(_) => {
                    bytes.extend(to_buffer(b, integer_width)?)
                }
                other => bytes.extend(operand_as_string(other, integer_width)?.into_bytes()),
            }
            Ok(Object::Buffer(bytes))
        }
        other => {
            let mut string = other.descriptive_name().to_string();
            string.push_str(&operand_as_string(b, integer_width)?);
            Ok(Object::String(string))
        }
    }
}

/// The second operand of a string concatenation. Anything that can't be converted to a string is represented
/// by the name of its type.
fn operand_as_string(object: &Object, integer_width: usize) -> Result<String, AmlError> {
    match object {
        Object::Integer(_) | Object::String(_) | Object::Buffer(_) | Object::RawDataBuffer(_) => {
            to_string(object, integer_width)
        }
        Object::Uninitialized => Err(AmlError::UninitializedValue),
        other => Ok(other.descriptive_name().to_string()),
    }
}

/// Concatenate two resource templates, as `ConcatRes` does. Each template's end tag is removed, and a new one
/// is appended with a checksum covering the whole result.
pub fn concat_resources(a: &[u8], b: &[u8]) -> Result<Vec<u8>, AmlError> {
    fn strip_end_tag(template: &[u8]) -> Result<&[u8], AmlError> {
        match template.len() {
            0 => Ok(template),
            1 => Err(AmlError::InvalidResourceDescriptor),
            len if template[len - 2] == 0x79 => Ok(&template[..(len - 2)]),
            _ => Err(AmlError::InvalidResourceDescriptor),
        }
    }

    let mut result = Vec::with_capacity(a.len() + b.len());
    result.extend_from_slice(strip_end_tag(a)?);
    result.extend_from_slice(strip_end_tag(b)?);
    result.push(0x79);
    let checksum = result.iter().fold(0u8, |sum, &byte| sum.wrapping_add(byte)).wrapping_neg();
    result.push(checksum);
    Ok(result)
}

/// Compare two objects, as the logical comparison operators do. The second operand is converted to the type of
/// the first.
pub fn compare(a: &Object, b: &Object, integer_width: usize) -> Result<Ordering, AmlError> {
    match a {
        Object::Integer(a) => Ok(a.cmp(&to_integer(b, integer_width)?)),
        Object::String(a) => Ok(a.as_bytes().cmp(to_string(b, integer_width)?.as_bytes())),
        Object::Buffer(a) | Object::RawDataBuffer(a) => Ok(a.as_slice().cmp(to_buffer(b, integer_width)?.as_slice())),
        Object::Uninitialized => Err(AmlError::UninitializedValue),
        _ => Err(AmlError::InvalidConversion),
    }
}

fn parse_hex(string: &str, integer_width: usize) -> u64 {
    let value = string
        .chars()
        .map_while(|c| c.to_digit(16))
        .take(integer_width / 4)
        .fold(0u64, |value, digit| (value << 4) | digit as u64);
    value
}

fn parse_decimal(string: &str, integer_width: usize) -> u64 {
    let value = string.chars().map_while(|c| c.to_digit(10)).fold(0u64, |value, digit| {
        value.wrapping_mul(10).wrapping_add(digit as u64)
    });
    if integer_width == 32 {
        value & 0xffff_ffff
    } else {
        value
    }
}

fn buffer_to_integer(bytes: &[u8], integer_width: usize) -> u64 {
    let mut value = [0u8; 8];
    let length = usize::min(bytes.len(), integer_width / 8);
    value[..length].copy_from_slice(&bytes[..length]);
    u64::from_le_bytes(value)
}

fn join_bytes<F>(bytes: &[u8], separator: &str, mut f: F) -> String
where
    F: FnMut(&mut String, u8) -> core::fmt::Result,
{
    let mut string = String::with_capacity(bytes.len() * 3);
    for (i, &byte) in bytes.iter().enumerate() {
        if i > 0 {
            string.push_str(separator);
        }
        // Writing to a `String` can't fail
        let _ = f(&mut string, byte);
    }
    string
}

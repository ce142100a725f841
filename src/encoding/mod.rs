//! Typed values and their fixed-width primitive byte forms.
//!
//! Every logical store declares one [`ValueType`] for its keys and one for
//! its values. This module owns that closed set of types, the runtime
//! [`Value`] representation, and the raw byte layout of the primitive kinds.
//! Time suffixes and lookup interning are layered on top by
//! [`crate::codec`].
//!
//! # Wire format
//!
//! | Value type | Encoding                                     |
//! |------------|----------------------------------------------|
//! | `Boolean`  | 1 byte (`0x00` = false, `0x01` = true)       |
//! | `Byte`     | 1 byte, two's complement                     |
//! | `Short`    | 2 bytes, big-endian                          |
//! | `Int`      | 4 bytes, big-endian                          |
//! | `Long`     | 8 bytes, big-endian                          |
//! | `Float`    | 4 bytes, IEEE-754 bits, big-endian           |
//! | `Double`   | 8 bytes, IEEE-754 bits, big-endian           |
//! | `String`   | raw UTF-8 bytes (no length prefix)           |
//!
//! Multi-byte integers are **big-endian** so that unsigned-comparable
//! encodings sort the way the engine orders keys.
//!
//! # Zero-panic guarantee
//!
//! No function in this module uses `unwrap()`, `expect()`, or slice
//! indexing that can go out of bounds. All errors are propagated via
//! [`EncodingError`].


use std::fmt;

use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors produced while encoding or decoding a value.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// The buffer ran out of bytes before decoding completed.
    #[error("unexpected end of buffer (need {needed} bytes, have {available})")]
    UnexpectedEof {
        /// Bytes required to continue decoding.
        needed: usize,
        /// Bytes actually remaining.
        available: usize,
    },

    /// A type or variant tag was not recognised.
    #[error("invalid tag {tag} for {type_name}")]
    InvalidTag {
        /// The tag value that was read.
        tag: u8,
        /// The type being decoded.
        type_name: &'static str,
    },

    /// A boolean field contained a byte other than `0x00` or `0x01`.
    #[error("invalid bool byte: 0x{0:02X} (expected 0x00 or 0x01)")]
    InvalidBool(u8),

    /// A byte-sequence decoded as a string was not valid UTF-8.
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// The value's kind cannot be stored under the declared type.
    #[error("cannot store {found} value as {expected}")]
    TypeMismatch {
        /// The declared value type of the store.
        expected: ValueType,
        /// The kind of the supplied value.
        found: &'static str,
    },

    /// The value is of a compatible kind but does not fit the declared width.
    #[error("value {value} does not fit in {expected}")]
    OutOfRange {
        /// The declared value type of the store.
        expected: ValueType,
        /// Display form of the rejected value.
        value: String,
    },

    /// An instant cannot be represented by the configured time encoding.
    #[error("instant {0} is outside the range of the time encoding")]
    TimeOutOfRange(String),

    /// An encoded field has a length its format does not allow.
    #[error("invalid {what} length: {len} bytes")]
    InvalidLength {
        /// The field being decoded.
        what: &'static str,
        /// Length that was found.
        len: usize,
    },

    /// A value is too long for an encoding that indexes it by its bytes.
    #[error("value of {len} bytes exceeds the maximum of {max} bytes")]
    ValueTooLong {
        /// Length of the rejected value.
        len: usize,
        /// Largest accepted length.
        max: usize,
    },
}

// ------------------------------------------------------------------------------------------------
// Value types
// ------------------------------------------------------------------------------------------------

/// The declared type of the keys or values held by one logical store.
///
/// The tag is chosen once per store and persisted with its schema.
/// `UidLookup`, `HashLookup` and `Variable` hold text; the first two always
/// intern through the respective lookup table, `Variable` picks an encoding
/// per value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    String,
    UidLookup,
    HashLookup,
    Variable,
}

impl ValueType {
    /// All value types, in tag order.
    pub const ALL: [ValueType; 11] = [
        ValueType::Boolean,
        ValueType::Byte,
        ValueType::Short,
        ValueType::Int,
        ValueType::Long,
        ValueType::Float,
        ValueType::Double,
        ValueType::String,
        ValueType::UidLookup,
        ValueType::HashLookup,
        ValueType::Variable,
    ];

    /// Persisted one-byte tag.
    pub fn tag(self) -> u8 {
        match self {
            ValueType::Boolean => 0,
            ValueType::Byte => 1,
            ValueType::Short => 2,
            ValueType::Int => 3,
            ValueType::Long => 4,
            ValueType::Float => 5,
            ValueType::Double => 6,
            ValueType::String => 7,
            ValueType::UidLookup => 8,
            ValueType::HashLookup => 9,
            ValueType::Variable => 10,
        }
    }

    /// Inverse of [`ValueType::tag`].
    pub fn from_tag(tag: u8) -> Result<Self, EncodingError> {
        Self::ALL
            .get(usize::from(tag))
            .copied()
            .ok_or(EncodingError::InvalidTag {
                tag,
                type_name: "ValueType",
            })
    }

    /// Width in bytes of the fixed-width primitive encoding, or `None` for
    /// the text-bearing types.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            ValueType::Boolean | ValueType::Byte => Some(1),
            ValueType::Short => Some(2),
            ValueType::Int | ValueType::Float => Some(4),
            ValueType::Long | ValueType::Double => Some(8),
            ValueType::String
            | ValueType::UidLookup
            | ValueType::HashLookup
            | ValueType::Variable => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ------------------------------------------------------------------------------------------------
// Runtime values
// ------------------------------------------------------------------------------------------------

/// A single application-level value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

impl Value {
    /// Short name of the value's kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "boolean",
            Value::Byte(_) => "byte",
            Value::Short(_) => "short",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::String(_) => "string",
        }
    }

    /// Returns the integer payload widened to `i64`, if this is an integer.
    fn as_integer(&self) -> Option<i64> {
        match *self {
            Value::Byte(v) => Some(i64::from(v)),
            Value::Short(v) => Some(i64::from(v)),
            Value::Int(v) => Some(i64::from(v)),
            Value::Long(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Long(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

// ------------------------------------------------------------------------------------------------
// Internal helpers
// ------------------------------------------------------------------------------------------------

/// Verify that `buf` has at least `needed` bytes, returning
/// [`EncodingError::UnexpectedEof`] if not.
#[inline]
pub(crate) fn require(buf: &[u8], needed: usize) -> Result<(), EncodingError> {
    if buf.len() < needed {
        Err(EncodingError::UnexpectedEof {
            needed,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

/// Copy the first `N` bytes of `buf` into an array.
#[inline]
fn take<const N: usize>(buf: &[u8]) -> Result<[u8; N], EncodingError> {
    require(buf, N)?;
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[..N]);
    Ok(out)
}

fn out_of_range(expected: ValueType, value: &Value) -> EncodingError {
    EncodingError::OutOfRange {
        expected,
        value: value.to_string(),
    }
}

fn mismatch(expected: ValueType, value: &Value) -> EncodingError {
    EncodingError::TypeMismatch {
        expected,
        found: value.kind(),
    }
}

// ------------------------------------------------------------------------------------------------
// Primitive encoding
// ------------------------------------------------------------------------------------------------

/// Append the fixed-width encoding of `value` as `value_type` to `out`.
///
/// Integer values are accepted by any integer type they fit into. A
/// `Double` is accepted by a `Float` store only when it converts without
/// loss.
///
/// # Errors
///
/// - [`EncodingError::TypeMismatch`] if the kind cannot be stored as
///   `value_type`, or if `value_type` is not a fixed-width type.
/// - [`EncodingError::OutOfRange`] if the value does not fit the width.
pub fn write_fixed(
    value_type: ValueType,
    value: &Value,
    out: &mut Vec<u8>,
) -> Result<(), EncodingError> {
    match value_type {
        ValueType::Boolean => match value {
            Value::Boolean(v) => out.push(u8::from(*v)),
            _ => return Err(mismatch(value_type, value)),
        },
        ValueType::Byte | ValueType::Short | ValueType::Int | ValueType::Long => {
            let wide = value
                .as_integer()
                .ok_or_else(|| mismatch(value_type, value))?;
            match value_type {
                ValueType::Byte => {
                    let v = i8::try_from(wide).map_err(|_| out_of_range(value_type, value))?;
                    out.extend_from_slice(&v.to_be_bytes());
                }
                ValueType::Short => {
                    let v = i16::try_from(wide).map_err(|_| out_of_range(value_type, value))?;
                    out.extend_from_slice(&v.to_be_bytes());
                }
                ValueType::Int => {
                    let v = i32::try_from(wide).map_err(|_| out_of_range(value_type, value))?;
                    out.extend_from_slice(&v.to_be_bytes());
                }
                _ => out.extend_from_slice(&wide.to_be_bytes()),
            }
        }
        ValueType::Float => {
            let v = match *value {
                Value::Float(v) => v,
                Value::Double(d) => {
                    let f = d as f32;
                    if f64::from(f) != d && !d.is_nan() {
                        return Err(out_of_range(value_type, value));
                    }
                    f
                }
                _ => return Err(mismatch(value_type, value)),
            };
            out.extend_from_slice(&v.to_bits().to_be_bytes());
        }
        ValueType::Double => {
            let v = match *value {
                Value::Float(v) => f64::from(v),
                Value::Double(v) => v,
                _ => return Err(mismatch(value_type, value)),
            };
            out.extend_from_slice(&v.to_bits().to_be_bytes());
        }
        ValueType::String | ValueType::UidLookup | ValueType::HashLookup | ValueType::Variable => {
            return Err(mismatch(value_type, value));
        }
    }
    Ok(())
}

/// Decode a fixed-width value of `value_type` from the start of `buf`.
///
/// Returns the value and the number of bytes consumed.
pub fn read_fixed(value_type: ValueType, buf: &[u8]) -> Result<(Value, usize), EncodingError> {
    let value = match value_type {
        ValueType::Boolean => match take::<1>(buf)?[0] {
            0x00 => Value::Boolean(false),
            0x01 => Value::Boolean(true),
            b => return Err(EncodingError::InvalidBool(b)),
        },
        ValueType::Byte => Value::Byte(i8::from_be_bytes(take(buf)?)),
        ValueType::Short => Value::Short(i16::from_be_bytes(take(buf)?)),
        ValueType::Int => Value::Int(i32::from_be_bytes(take(buf)?)),
        ValueType::Long => Value::Long(i64::from_be_bytes(take(buf)?)),
        ValueType::Float => Value::Float(f32::from_bits(u32::from_be_bytes(take(buf)?))),
        ValueType::Double => Value::Double(f64::from_bits(u64::from_be_bytes(take(buf)?))),
        ValueType::String | ValueType::UidLookup | ValueType::HashLookup | ValueType::Variable => {
            return Err(EncodingError::InvalidTag {
                tag: value_type.tag(),
                type_name: "fixed-width ValueType",
            });
        }
    };
    let width = value_type.fixed_width().unwrap_or(0);
    Ok((value, width))
}

/// Borrow the UTF-8 bytes of a text value.
///
/// # Errors
///
/// Returns [`EncodingError::TypeMismatch`] for non-string values.
pub fn text_bytes(value_type: ValueType, value: &Value) -> Result<&[u8], EncodingError> {
    match value {
        Value::String(s) => Ok(s.as_bytes()),
        other => Err(mismatch(value_type, other)),
    }
}

/// Decode raw bytes as a text value.
pub fn read_text(buf: &[u8]) -> Result<Value, EncodingError> {
    Ok(Value::String(std::str::from_utf8(buf)?.to_owned()))
}

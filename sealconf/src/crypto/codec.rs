//! Scalar type tags. A cell stores its scalar as text plus a one-digit tag so
//! decryption hands back a number or a boolean instead of its string form.

use std::fmt;

use serde_json::Number;

use super::error::CipherError;
use crate::value::Value;

/// Serialized discriminant of a sealed scalar. String is tag 0 and is also the
/// reading for untagged legacy cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TypeTag {
    String = 0,
    Number = 1,
    Boolean = 2,
}

impl TypeTag {
    pub fn from_byte(byte: u8) -> Result<Self, CipherError> {
        match byte {
            0 => Ok(TypeTag::String),
            1 => Ok(TypeTag::Number),
            2 => Ok(TypeTag::Boolean),
            other => Err(CipherError::UnknownTypeTag(other)),
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeTag::String => "string",
            TypeTag::Number => "number",
            TypeTag::Boolean => "boolean",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tag for a scalar; `None` for sequences and mappings.
pub fn tag_of(value: &Value) -> Option<TypeTag> {
    match value {
        Value::String(_) => Some(TypeTag::String),
        Value::Number(_) => Some(TypeTag::Number),
        Value::Bool(_) => Some(TypeTag::Boolean),
        Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

/// Text form that `restore` reads back. Numbers use serde_json's shortest
/// round-trip formatting, so integers stay integers and floats keep every bit.
pub fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

pub fn restore(tag: TypeTag, raw: &str) -> Result<Value, CipherError> {
    match tag {
        TypeTag::String => Ok(Value::String(raw.to_string())),
        TypeTag::Number => raw
            .parse::<Number>()
            .map(Value::Number)
            .map_err(|e| CipherError::InvalidScalar {
                tag: tag.name(),
                reason: format!("{e}"),
            }),
        TypeTag::Boolean => match raw {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            other => Err(CipherError::InvalidScalar {
                tag: tag.name(),
                reason: format!("expected true or false, got {other:?}"),
            }),
        },
    }
}

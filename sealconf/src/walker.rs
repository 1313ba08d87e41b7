//! Recursive sealing of whole configuration trees. Mapping keys are sealed
//! deterministically at every depth so lookups keep working; every scalar
//! value, including sequence elements, gets a random IV. The output has the
//! same shape as the input with every scalar replaced by a cell string.
//!
//! Absent values never reach the walker: callers hold them as `None` and pass
//! them through with `Option::map`.

use std::collections::BTreeMap;

use crate::crypto::cell::{open, seal};
use crate::crypto::codec::stringify;
use crate::crypto::{CipherError, KeyManager};
use crate::value::Value;

pub fn encrypt_tree(keys: &KeyManager, value: &Value) -> Result<Value, CipherError> {
    keys.validate(None)?;
    seal_node(keys, value)
}

/// Opens a sealed tree. The first cell that fails aborts the walk and its
/// error is returned.
pub fn decrypt_tree(keys: &KeyManager, tree: &Value) -> Result<Value, CipherError> {
    keys.validate(None)?;
    open_node(keys, tree)
}

/// Seals one mapping key.
pub fn seal_key(keys: &KeyManager, key: &str) -> Result<String, CipherError> {
    seal(keys, &Value::String(key.to_string()), true)
}

/// Seals a scalar used as a key. Numbers and booleans are keyed by their text,
/// so `1` and `"1"` address the same entry.
pub fn encrypt_key(keys: &KeyManager, key: &Value) -> Result<String, CipherError> {
    match stringify(key) {
        Some(text) => seal_key(keys, &text),
        None => Err(CipherError::UnsupportedKeyShape(key.kind())),
    }
}

pub fn decrypt_key(keys: &KeyManager, wire: &str) -> Result<String, CipherError> {
    match open(keys, wire)? {
        Value::String(text) => Ok(text),
        scalar => stringify(&scalar).ok_or(CipherError::UnsupportedKeyShape(scalar.kind())),
    }
}

fn seal_node(keys: &KeyManager, value: &Value) -> Result<Value, CipherError> {
    match value {
        Value::Mapping(map) => {
            let mut sealed = BTreeMap::new();
            for (key, member) in map {
                sealed.insert(seal_key(keys, key)?, seal_node(keys, member)?);
            }
            Ok(Value::Mapping(sealed))
        }
        Value::Sequence(items) => items
            .iter()
            .map(|item| seal_node(keys, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Sequence),
        Value::String(_) | Value::Number(_) | Value::Bool(_) => {
            seal(keys, value, false).map(Value::String)
        }
    }
}

fn open_node(keys: &KeyManager, tree: &Value) -> Result<Value, CipherError> {
    match tree {
        Value::Mapping(map) => {
            let mut opened = BTreeMap::new();
            for (key, member) in map {
                opened.insert(decrypt_key(keys, key)?, open_node(keys, member)?);
            }
            Ok(Value::Mapping(opened))
        }
        Value::Sequence(items) => items
            .iter()
            .map(|item| open_node(keys, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Sequence),
        Value::String(wire) => open(keys, wire),
        Value::Number(_) | Value::Bool(_) => Err(CipherError::MalformedCell(format!(
            "plaintext {} found where a cell was expected",
            tree.kind()
        ))),
    }
}

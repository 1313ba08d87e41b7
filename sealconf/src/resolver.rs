//! Key-path lookups against a sealed store. Each path segment is sealed
//! deterministically and matched against the sealed tree; only the subtree the
//! final segment lands on is ever decrypted.

use tracing::debug;

use crate::crypto::{CipherError, KeyManager};
use crate::store::StoreEngine;
use crate::value::Value;
use crate::walker::{decrypt_tree, seal_key};

pub const PATH_SEPARATOR: char = ':';

pub fn split_path(path: &str) -> Vec<&str> {
    path.split(PATH_SEPARATOR).collect()
}

/// Seals every segment of `path`, in order.
pub fn encrypt_path(keys: &KeyManager, path: &str) -> Result<Vec<String>, CipherError> {
    split_path(path)
        .into_iter()
        .map(|segment| seal_key(keys, segment))
        .collect()
}

/// Looks up `path` (`a`, or `a:b:c` for nested keys). A segment that is
/// missing, or a parent that is not a mapping, yields `Ok(None)`.
pub fn resolve<S>(keys: &KeyManager, store: &S, path: &str) -> Result<Option<Value>, CipherError>
where
    S: StoreEngine + ?Sized,
{
    let mut segments = split_path(path).into_iter();
    let Some(first) = segments.next() else {
        return Ok(None);
    };

    let Some(mut current) = store.get(&seal_key(keys, first)?) else {
        return Ok(None);
    };

    for segment in segments {
        let sealed = seal_key(keys, segment)?;
        current = match current {
            Value::Mapping(mut map) => match map.remove(&sealed) {
                Some(child) => child,
                None => return Ok(None),
            },
            other => {
                debug!(kind = other.kind(), "path descends into a non-mapping");
                return Ok(None);
            }
        };
    }

    decrypt_tree(keys, &current).map(Some)
}

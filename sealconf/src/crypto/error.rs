//! Failure kinds shared by the key manager, the type codec and the cell cipher.
//! None of these are transient: they signal a configuration or programming
//! mistake and are surfaced to the caller as soon as they occur.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("encryption key must be set before encrypting or decrypting")]
    KeyNotSet,
    #[error("invalid key length; expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
    #[error("malformed cell: {0}")]
    MalformedCell(String),
    #[error("decryption failed: wrong key or corrupted ciphertext")]
    DecryptionFailed,
    #[error("unknown type tag: {0}")]
    UnknownTypeTag(u8),
    #[error("{0} is not a scalar and cannot be sealed into a single cell")]
    NotScalar(&'static str),
    #[error("unsupported key shape: {0} cannot be used as a mapping key")]
    UnsupportedKeyShape(&'static str),
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("cell payload is not a valid {tag}: {reason}")]
    InvalidScalar { tag: &'static str, reason: String },
}

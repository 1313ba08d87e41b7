//! Authenticated cell cipher built on ChaCha20-Poly1305.
//!
//! A cell is `tag digit + 32 hex chars of IV + '|' + hex(nonce || ciphertext || auth tag)`.
//! Each IV selects a pair of HKDF subkeys: the nonce is an HMAC of the tagged
//! plaintext under one, the AEAD runs under the other. Mapping keys use the manager's fixed IV and so
//! seal deterministically, leaking only equality. Values draw a fresh random IV
//! on every call.

use std::fmt;
use std::str::FromStr;

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

use super::codec::{restore, stringify, tag_of, TypeTag};
use super::error::CipherError;
use super::integrity::{cell_subkeys, hmac_sha256};
use super::keys::{KeyManager, IV_LEN};
use crate::value::Value;

const NONCE_LEN: usize = 12;
const TAG_SIZE: usize = 16;
const SEPARATOR: char = '|';

/// One sealed scalar. Only its wire string ever reaches a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueCell {
    pub tag: TypeTag,
    pub iv: [u8; IV_LEN],
    /// Synthetic nonce followed by the AEAD output (ciphertext and auth tag).
    pub ciphertext: Vec<u8>,
}

impl OpaqueCell {
    pub fn to_wire(&self) -> String {
        format!(
            "{}{}{}{}",
            self.tag.as_byte(),
            hex::encode(self.iv),
            SEPARATOR,
            hex::encode(&self.ciphertext)
        )
    }

    /// Parses the wire form. A head of bare IV hex (no tag digit) is read as a
    /// string cell.
    pub fn parse(wire: &str) -> Result<Self, CipherError> {
        let (head, body) = wire
            .split_once(SEPARATOR)
            .ok_or_else(|| CipherError::MalformedCell("missing separator".to_string()))?;

        let (tag, iv_hex) = match head.len() {
            len if len == IV_LEN * 2 + 1 => {
                let digit = head.as_bytes()[0];
                if !digit.is_ascii_digit() {
                    return Err(CipherError::MalformedCell(
                        "type tag is not a digit".to_string(),
                    ));
                }
                (TypeTag::from_byte(digit - b'0')?, &head[1..])
            }
            len if len == IV_LEN * 2 => (TypeTag::String, head),
            len => {
                return Err(CipherError::MalformedCell(format!(
                    "iv section has {len} characters"
                )))
            }
        };

        let mut iv = [0u8; IV_LEN];
        hex::decode_to_slice(iv_hex, &mut iv)
            .map_err(|e| CipherError::MalformedCell(format!("iv: {e}")))?;
        let ciphertext =
            hex::decode(body).map_err(|e| CipherError::MalformedCell(format!("payload: {e}")))?;
        if ciphertext.len() < NONCE_LEN + TAG_SIZE {
            return Err(CipherError::MalformedCell(
                "payload shorter than nonce and authentication tag".to_string(),
            ));
        }

        Ok(Self {
            tag,
            iv,
            ciphertext,
        })
    }
}

impl fmt::Display for OpaqueCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl FromStr for OpaqueCell {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Seals one scalar. `deterministic` selects the manager's fixed key IV and is
/// meant for mapping keys only.
pub fn encrypt_scalar(
    keys: &KeyManager,
    value: &Value,
    deterministic: bool,
) -> Result<OpaqueCell, CipherError> {
    let key = keys.current_key()?;
    let tag = tag_of(value).ok_or(CipherError::NotScalar(value.kind()))?;
    let plaintext = stringify(value).ok_or(CipherError::NotScalar(value.kind()))?;

    let iv = if deterministic {
        *keys.key_iv()
    } else {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);
        iv
    };

    let tag_byte = [tag.as_byte()];
    let subkeys = cell_subkeys(key.as_bytes(), &iv)?;
    let synthetic = hmac_sha256(&subkeys.nonce, &[&tag_byte[..], plaintext.as_bytes()])?;
    let nonce = Nonce::from_slice(&synthetic[..NONCE_LEN]);

    let cipher = ChaCha20Poly1305::new_from_slice(&subkeys.enc)
        .map_err(|e| CipherError::EncryptionFailed(format!("{e}")))?;
    let sealed = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext.as_bytes(),
                aad: &tag_byte,
            },
        )
        .map_err(|e| CipherError::EncryptionFailed(format!("{e}")))?;

    let mut ciphertext = Vec::with_capacity(NONCE_LEN + sealed.len());
    ciphertext.extend_from_slice(nonce);
    ciphertext.extend_from_slice(&sealed);

    Ok(OpaqueCell {
        tag,
        iv,
        ciphertext,
    })
}

/// Opens one cell and restores the scalar's original type.
pub fn decrypt_scalar(keys: &KeyManager, cell: &OpaqueCell) -> Result<Value, CipherError> {
    let key = keys.current_key()?;
    if cell.ciphertext.len() < NONCE_LEN + TAG_SIZE {
        return Err(CipherError::MalformedCell(
            "payload shorter than nonce and authentication tag".to_string(),
        ));
    }
    let (nonce, sealed) = cell.ciphertext.split_at(NONCE_LEN);

    let subkeys = cell_subkeys(key.as_bytes(), &cell.iv)?;
    let cipher = ChaCha20Poly1305::new_from_slice(&subkeys.enc)
        .map_err(|_| CipherError::DecryptionFailed)?;
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: sealed,
                aad: &[cell.tag.as_byte()],
            },
        )
        .map_err(|_| CipherError::DecryptionFailed)?;

    let text = String::from_utf8(plaintext).map_err(|_| CipherError::DecryptionFailed)?;
    restore(cell.tag, &text)
}

/// Seals a scalar straight to its wire string.
pub fn seal(keys: &KeyManager, value: &Value, deterministic: bool) -> Result<String, CipherError> {
    encrypt_scalar(keys, value, deterministic).map(|cell| cell.to_wire())
}

/// Parses and opens a wire string.
pub fn open(keys: &KeyManager, wire: &str) -> Result<Value, CipherError> {
    decrypt_scalar(keys, &OpaqueCell::parse(wire)?)
}

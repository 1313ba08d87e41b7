//! Key material and its manager. A `KeyManager` holds the active 32-byte key
//! plus the fixed IV reserved for deterministic (mapping key) encryption.
//! Replacing the key never re-encrypts existing cells; anything sealed under the
//! previous key stops decrypting.

use std::fmt;
use std::sync::{PoisonError, RwLock};

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;
use zeroize::Zeroize;

use super::error::CipherError;
use super::integrity::sha256_hex;

/// Key material is exactly 256 bits: 32 raw bytes or 32 ASCII characters.
pub const KEY_LEN: usize = 32;
/// Every cell IV, random or fixed, is 16 bytes.
pub const IV_LEN: usize = 16;

/// A validated symmetric key. Zeroed on drop.
#[derive(Clone)]
pub struct KeyMaterial {
    bytes: [u8; KEY_LEN],
}

impl KeyMaterial {
    /// Accepts raw bytes or the bytes of a 32 character string.
    pub fn new(material: impl AsRef<[u8]>) -> Result<Self, CipherError> {
        let material = material.as_ref();
        check_length(material)?;
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(material);
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Short, non-reversible identifier used in logs to tell keys apart.
    pub fn fingerprint(&self) -> String {
        sha256_hex(&self.bytes)[..16].to_string()
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyMaterial([REDACTED] {})", self.fingerprint())
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

fn check_length(material: &[u8]) -> Result<(), CipherError> {
    if material.len() != KEY_LEN {
        return Err(CipherError::InvalidKeyLength {
            expected: KEY_LEN,
            actual: material.len(),
        });
    }
    Ok(())
}

/// Owns the active key and the fixed key IV. Share one instance (by reference
/// or `Arc`) between everything that must read the same cells.
///
/// Key replacement is not atomic with respect to in-flight operations: callers
/// rotating keys concurrently with reads must serialize that themselves.
pub struct KeyManager {
    key: RwLock<Option<KeyMaterial>>,
    key_iv: [u8; IV_LEN],
}

impl KeyManager {
    /// Manager without a key. The fixed key IV is drawn once here and never
    /// regenerated for the lifetime of the manager.
    pub fn new() -> Self {
        let mut key_iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut key_iv);
        Self {
            key: RwLock::new(None),
            key_iv,
        }
    }

    pub fn with_key(material: impl AsRef<[u8]>) -> Result<Self, CipherError> {
        let manager = Self::new();
        manager.set_key(material)?;
        Ok(manager)
    }

    /// Pins the key IV, so encrypted mapping keys stay matchable across
    /// processes that share the same key material.
    pub fn with_key_iv(mut self, key_iv: [u8; IV_LEN]) -> Self {
        self.key_iv = key_iv;
        self
    }

    /// Replaces the active key. Takes effect for every later operation.
    pub fn set_key(&self, material: impl AsRef<[u8]>) -> Result<(), CipherError> {
        let material = KeyMaterial::new(material)?;
        debug!(fingerprint = %material.fingerprint(), "encryption key set");
        *self.key.write().unwrap_or_else(PoisonError::into_inner) = Some(material);
        Ok(())
    }

    /// Copy of the active key, validated.
    pub fn current_key(&self) -> Result<KeyMaterial, CipherError> {
        let guard = self.key.read().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(key) => {
                check_length(key.as_bytes())?;
                Ok(key.clone())
            }
            None => Err(CipherError::KeyNotSet),
        }
    }

    /// Checks `material` when given, otherwise the active key.
    pub fn validate(&self, material: Option<&[u8]>) -> Result<(), CipherError> {
        match material {
            Some(candidate) => check_length(candidate),
            None => self.current_key().map(|_| ()),
        }
    }

    pub fn is_set(&self) -> bool {
        self.validate(None).is_ok()
    }

    pub fn key_iv(&self) -> &[u8; IV_LEN] {
        &self.key_iv
    }
}

impl Default for KeyManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyManager")
            .field("key_set", &self.is_set())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{KeyManager, KeyMaterial, KEY_LEN};
    use crate::crypto::CipherError;

    #[test]
    fn rejects_short_and_long_keys() {
        let manager = KeyManager::new();
        for len in [31usize, 33, 0] {
            let err = manager.set_key(vec![b'k'; len]).unwrap_err();
            assert_eq!(
                err,
                CipherError::InvalidKeyLength {
                    expected: KEY_LEN,
                    actual: len
                }
            );
        }
        assert!(!manager.is_set());
    }

    #[test]
    fn accepts_thirty_two_characters() {
        let manager = KeyManager::new();
        manager
            .set_key("0123456789abcdef0123456789abcdef")
            .expect("32 characters is a valid key");
        assert!(manager.is_set());
        assert_eq!(
            manager.current_key().expect("key is set").as_bytes(),
            b"0123456789abcdef0123456789abcdef"
        );
    }

    #[test]
    fn unset_key_fails_validation() {
        let manager = KeyManager::new();
        assert_eq!(manager.validate(None), Err(CipherError::KeyNotSet));
        assert_eq!(manager.current_key().unwrap_err(), CipherError::KeyNotSet);
    }

    #[test]
    fn validates_candidate_material_without_installing_it() {
        let manager = KeyManager::new();
        assert!(manager.validate(Some([1u8; 32].as_slice())).is_ok());
        assert!(manager.validate(Some(b"tooshort".as_slice())).is_err());
        assert!(!manager.is_set());
    }

    #[test]
    fn replacement_is_immediate_and_iv_is_stable() {
        let manager = KeyManager::with_key([1u8; 32]).expect("valid key");
        let iv = *manager.key_iv();
        manager.set_key([2u8; 32]).expect("valid key");
        assert_eq!(manager.current_key().expect("set").as_bytes(), &[2u8; 32]);
        assert_eq!(manager.key_iv(), &iv);
    }

    #[test]
    fn failed_replacement_keeps_previous_key() {
        let manager = KeyManager::with_key([3u8; 32]).expect("valid key");
        assert!(manager.set_key("tooshort").is_err());
        assert_eq!(manager.current_key().expect("set").as_bytes(), &[3u8; 32]);
    }

    #[test]
    fn debug_output_redacts_key() {
        let key = KeyMaterial::new([0x41u8; 32]).expect("valid key");
        let printed = format!("{key:?}");
        assert!(printed.contains("REDACTED"));
        assert!(!printed.contains("AAAA"));
    }

    #[test]
    fn each_manager_draws_its_own_key_iv() {
        let a = KeyManager::new();
        let b = KeyManager::new();
        assert_ne!(a.key_iv(), b.key_iv());
    }
}

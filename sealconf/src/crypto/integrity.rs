//! Key-derivation and hashing helpers for the cell cipher. Every cell IV gets
//! two subkeys derived from the key material: one keys the MAC that produces
//! the AEAD nonce, the other keys the AEAD itself.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::error::CipherError;

type HmacSha256 = Hmac<Sha256>;

const CELL_NONCE_INFO: &[u8] = b"sealconf cell v1 nonce";
const CELL_ENC_INFO: &[u8] = b"sealconf cell v1 enc";
pub(crate) const SUBKEY_LEN: usize = 32;

/// Produces a raw SHA-256 digest of the provided bytes.
pub fn sha256_digest(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Returns the hexadecimal representation of a SHA-256 digest.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256_digest(data))
}

/// Generates an HMAC-SHA256 tag over the concatenation of `parts`.
pub fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> Result<[u8; 32], CipherError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| CipherError::EncryptionFailed(format!("hmac: {e}")))?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().into())
}

/// Derives key material using HKDF-SHA256.
pub fn hkdf_expand(
    input_key_material: &[u8],
    salt: &[u8],
    info: &[u8],
    length: usize,
) -> Result<Zeroizing<Vec<u8>>, CipherError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), input_key_material);
    let mut okm = Zeroizing::new(vec![0u8; length]);
    hk.expand(info, &mut okm)
        .map_err(|e| CipherError::EncryptionFailed(format!("hkdf: {e}")))?;
    Ok(okm)
}

/// Independent nonce and encryption subkeys for the cells carrying `iv`.
pub(crate) struct CellKeys {
    pub nonce: Zeroizing<Vec<u8>>,
    pub enc: Zeroizing<Vec<u8>>,
}

pub(crate) fn cell_subkeys(key: &[u8], iv: &[u8]) -> Result<CellKeys, CipherError> {
    Ok(CellKeys {
        nonce: hkdf_expand(key, iv, CELL_NONCE_INFO, SUBKEY_LEN)?,
        enc: hkdf_expand(key, iv, CELL_ENC_INFO, SUBKEY_LEN)?,
    })
}

#[cfg(test)]
mod tests {
    use super::{cell_subkeys, hkdf_expand, hmac_sha256, sha256_hex};
    use hex::ToHex;

    #[test]
    fn hashes_to_hex() {
        assert_eq!(
            sha256_hex(b"squire"),
            "e4cf19cc9404a46c3edfff5611431c858956acdb08beb667a5617fdfd90378e4"
        );
    }

    #[test]
    fn builds_hmac_over_parts() {
        let whole = hmac_sha256(b"key", &[b"payload".as_slice()]).expect("hmac should succeed");
        assert_eq!(
            whole.encode_hex::<String>(),
            "5d98b45c90a207fa998ce639fea6f02ecc8cc3f36fef81d694fb856b4d0a28ca"
        );
        let split = hmac_sha256(b"key", &[b"pay".as_slice(), b"load".as_slice()]).expect("hmac should succeed");
        assert_eq!(whole, split);
    }

    #[test]
    fn expands_with_hkdf() {
        let okm = hkdf_expand(b"ikm", b"salt", b"info", 42).expect("hkdf should work");
        assert_eq!(okm.len(), 42);
    }

    #[test]
    fn hmac_matches_rfc4231_case_2() {
        let tag = hmac_sha256(b"Jefe", &[b"what do ya want ".as_slice(), b"for nothing?".as_slice()])
            .expect("hmac should succeed");
        assert_eq!(
            tag.encode_hex::<String>(),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn subkeys_differ_per_iv() {
        let key = [9u8; 32];
        let a = cell_subkeys(&key, &[1u8; 16]).expect("subkeys");
        let b = cell_subkeys(&key, &[2u8; 16]).expect("subkeys");
        let again = cell_subkeys(&key, &[1u8; 16]).expect("subkeys");
        assert_ne!(*a.enc, *b.enc);
        assert_eq!(*a.enc, *again.enc);
        assert_eq!(*a.nonce, *again.nonce);
    }

    #[test]
    fn nonce_and_encryption_subkeys_are_separate() {
        let keys = cell_subkeys(&[9u8; 32], &[1u8; 16]).expect("subkeys");
        assert_eq!(keys.nonce.len(), 32);
        assert_eq!(keys.enc.len(), 32);
        assert_ne!(*keys.nonce, *keys.enc);
    }
}

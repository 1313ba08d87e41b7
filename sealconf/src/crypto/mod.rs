//! Cryptography for sealed configuration: key management, scalar type tagging,
//! the per-scalar cell cipher, and the HKDF/HMAC helpers it is built on.

pub mod cell;
pub mod codec;
pub mod error;
pub mod integrity;
pub mod keys;

pub use cell::{decrypt_scalar, encrypt_scalar, OpaqueCell};
pub use error::CipherError;
pub use keys::{KeyManager, KeyMaterial};

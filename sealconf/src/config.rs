//! Key-source configuration. Describes where a process finds its encryption
//! key so the key itself never has to live in the configuration it protects.

use std::fs;
use std::path::{Path, PathBuf};

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};
use serde::Deserialize;
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::keys::{IV_LEN, KEY_LEN};
use crate::crypto::{CipherError, KeyManager};

/// Environment variable the CLI reads a pinned key IV (hex) from.
pub const KEY_IV_ENV: &str = "SEALCONF_KEY_IV";

const MEMORY_COST_KIB: u32 = 19 * 1024;
const TIME_COST: u32 = 3;
const PARALLELISM: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file unreadable: {0}")]
    Io(String),
    #[error("config parse failed: {0}")]
    Parse(String),
    #[error("key source unusable: {0}")]
    KeySource(String),
    #[error("no usable key source configured")]
    MissingKeySource,
    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct KeySourceConfig {
    /// Environment variable holding the key: 32 characters, or base64 of 32 bytes.
    pub key_env: Option<String>,
    /// Path to a file holding the key in the same encodings.
    pub key_path: Option<PathBuf>,
    /// Environment variable that stores a local passphrase (for Argon2id KDF).
    pub passphrase_env: Option<String>,
    /// Base64-encoded salt used alongside the passphrase.
    pub salt_b64: Option<String>,
    /// Hex of a 16-byte IV for mapping keys. Pin it when sealed stores must be
    /// looked up by a later process; otherwise each process draws its own.
    pub key_iv_hex: Option<String>,
}

impl KeySourceConfig {
    pub fn from_env_var(var: impl Into<String>) -> Self {
        Self {
            key_env: Some(var.into()),
            ..Self::default()
        }
    }

    /// Key argument as the CLI takes it: `@path` loads a key-source file,
    /// anything else names the env var holding the key. `key_iv_hex` fills in
    /// the key IV when the file does not pin one.
    pub fn from_cli_arg(arg: &str, key_iv_hex: Option<String>) -> Result<Self, ConfigError> {
        let mut config = match arg.strip_prefix('@') {
            Some(path) => Self::load(path)?,
            None => Self::from_env_var(arg),
        };
        if config.key_iv_hex.is_none() {
            config.key_iv_hex = key_iv_hex;
        }
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(&path).map_err(|e| ConfigError::Io(format!("{e}")))?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(format!("{e}")))
    }

    /// Resolves the key: `key_env` first, then `key_path`, then the passphrase.
    pub fn build_key_manager(&self) -> Result<KeyManager, ConfigError> {
        let key = self.read_key()?;
        let mut manager = KeyManager::with_key(key.as_slice())?;
        if let Some(iv_hex) = &self.key_iv_hex {
            let mut iv = [0u8; IV_LEN];
            hex::decode_to_slice(iv_hex.trim(), &mut iv)
                .map_err(|e| ConfigError::Parse(format!("key_iv_hex: {e}")))?;
            manager = manager.with_key_iv(iv);
        }
        Ok(manager)
    }

    fn read_key(&self) -> Result<Zeroizing<Vec<u8>>, ConfigError> {
        if let Some(var) = &self.key_env {
            let text = Zeroizing::new(
                std::env::var(var).map_err(|e| ConfigError::KeySource(format!("{var}: {e}")))?,
            );
            return decode_key_text(&text);
        }
        if let Some(path) = &self.key_path {
            let text = Zeroizing::new(
                fs::read_to_string(path)
                    .map_err(|e| ConfigError::KeySource(format!("{}: {e}", path.display())))?,
            );
            return decode_key_text(text.trim());
        }
        if let (Some(pass_env), Some(salt_b64)) = (&self.passphrase_env, &self.salt_b64) {
            let passphrase = Zeroizing::new(
                std::env::var(pass_env)
                    .map_err(|e| ConfigError::KeySource(format!("{pass_env}: {e}")))?,
            );
            let salt = STANDARD_NO_PAD
                .decode(salt_b64.trim_end_matches('=').as_bytes())
                .map_err(|e| ConfigError::KeySource(format!("salt: {e}")))?;
            return derive_from_passphrase(&passphrase, &salt);
        }
        Err(ConfigError::MissingKeySource)
    }
}

/// 32 characters are taken as-is; anything else must be base64 of 32 bytes.
pub fn decode_key_text(text: &str) -> Result<Zeroizing<Vec<u8>>, ConfigError> {
    if text.len() == KEY_LEN {
        return Ok(Zeroizing::new(text.as_bytes().to_vec()));
    }
    let decoded = STANDARD_NO_PAD
        .decode(text.trim_end_matches('=').as_bytes())
        .map_err(|e| ConfigError::KeySource(format!("base64: {e}")))?;
    Ok(Zeroizing::new(decoded))
}

/// Derives a key from a local passphrase using Argon2id. Salt must be random
/// and unique per deployment; store it alongside the sealed configuration.
pub fn derive_from_passphrase(
    passphrase: &str,
    salt: &[u8],
) -> Result<Zeroizing<Vec<u8>>, ConfigError> {
    let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, Some(KEY_LEN))
        .map_err(|e| ConfigError::KeySource(format!("argon2 params: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = [0u8; KEY_LEN];
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut output)
        .map_err(|e| ConfigError::KeySource(format!("argon2 derivation failed: {e}")))?;
    let key = Zeroizing::new(output.to_vec());
    output.zeroize();
    Ok(key)
}

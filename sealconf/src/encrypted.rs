//! `EncryptedConfig`: the chaining front end. Callers read and write plaintext
//! paths and values; the store underneath only ever receives sealed keys and
//! cells.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::crypto::{CipherError, KeyManager};
use crate::resolver::{encrypt_path, resolve};
use crate::sources::{self, ArgvOptions, EnvOptions};
use crate::store::{
    MemoryStore, Priority, StoreEngine, StoreError, DEFAULTS_SOURCE, OVERRIDES_SOURCE,
};
use crate::value::Value;
use crate::walker::{decrypt_tree, encrypt_tree};

/// Where a named source comes from.
#[derive(Debug, Clone)]
pub enum Source {
    Literal(Value),
    File(PathBuf),
    /// JSON already sealed under this configuration's key and key IV.
    Sealed(PathBuf),
}

pub struct EncryptedConfig<S: StoreEngine = MemoryStore> {
    keys: Arc<KeyManager>,
    store: S,
}

impl EncryptedConfig<MemoryStore> {
    /// Unkeyed configuration; call `set_encryption_key` before using it.
    pub fn new() -> Self {
        Self::with_parts(Arc::new(KeyManager::new()), MemoryStore::new())
    }

    pub fn with_key(material: impl AsRef<[u8]>) -> Result<Self, CipherError> {
        Ok(Self::with_parts(
            Arc::new(KeyManager::with_key(material)?),
            MemoryStore::new(),
        ))
    }
}

impl Default for EncryptedConfig<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StoreEngine> EncryptedConfig<S> {
    pub fn with_parts(keys: Arc<KeyManager>, store: S) -> Self {
        Self { keys, store }
    }

    pub fn key_manager(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    /// Installs a new key. Cells already in the store stay sealed under the
    /// previous key and will no longer open.
    pub fn set_encryption_key(&mut self, material: impl AsRef<[u8]>) -> Result<&mut Self, StoreError> {
        self.keys.validate(Some(material.as_ref()))?;
        let sources = self.store.source_names();
        if self.keys.is_set() && !sources.is_empty() {
            warn!(
                count = sources.len(),
                "replacing the encryption key while sources hold cells sealed under the previous key"
            );
        }
        self.keys.set_key(material)?;
        Ok(self)
    }

    /// Seals a source and registers it under `name`. Sealed sources are
    /// checked to open under the current key and stored as they are.
    pub fn use_source(&mut self, name: &str, source: Source) -> Result<&mut Self, StoreError> {
        let plain = match source {
            Source::Literal(value) => sources::require_mapping(value)?,
            Source::File(path) => sources::load_json_file(path)?,
            Source::Sealed(path) => {
                let sealed = sources::load_json_file(path)?;
                decrypt_tree(&self.keys, &Value::Mapping(sealed.clone()))?;
                self.store.use_source(name, Priority::Standard, sealed);
                return Ok(self);
            }
        };
        self.register(name, Priority::Standard, Value::Mapping(plain))
    }

    pub fn add(&mut self, name: &str, source: Source) -> Result<&mut Self, StoreError> {
        self.use_source(name, source)
    }

    pub fn use_literal(&mut self, name: &str, value: Value) -> Result<&mut Self, StoreError> {
        self.use_source(name, Source::Literal(value))
    }

    pub fn use_file(&mut self, name: &str, path: impl AsRef<Path>) -> Result<&mut Self, StoreError> {
        self.use_source(name, Source::File(path.as_ref().to_path_buf()))
    }

    pub fn use_sealed_file(&mut self, name: &str, path: impl AsRef<Path>) -> Result<&mut Self, StoreError> {
        self.use_source(name, Source::Sealed(path.as_ref().to_path_buf()))
    }

    /// File source named after its own path.
    pub fn file(&mut self, path: impl AsRef<Path>) -> Result<&mut Self, StoreError> {
        let path = path.as_ref();
        let name = path.display().to_string();
        self.use_file(&name, path)
    }

    pub fn defaults(&mut self, value: Value) -> Result<&mut Self, StoreError> {
        self.register(DEFAULTS_SOURCE, Priority::Defaults, value)
    }

    pub fn overrides(&mut self, value: Value) -> Result<&mut Self, StoreError> {
        self.register(OVERRIDES_SOURCE, Priority::Overrides, value)
    }

    /// Reads the process environment. Variables that are not valid UTF-8 are skipped.
    pub fn env(&mut self, options: EnvOptions) -> Result<&mut Self, StoreError> {
        let vars = std::env::vars_os().filter_map(|(name, value)| {
            Some((name.into_string().ok()?, value.into_string().ok()?))
        });
        self.env_from(vars, options)
    }

    pub fn env_from<I>(&mut self, vars: I, options: EnvOptions) -> Result<&mut Self, StoreError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let plain = sources::from_env(vars, &options);
        self.register("env", Priority::Standard, Value::Mapping(plain))
    }

    /// Reads the process arguments, skipping the program name.
    pub fn argv(&mut self, options: ArgvOptions) -> Result<&mut Self, StoreError> {
        self.argv_from(std::env::args().skip(1), options)
    }

    pub fn argv_from<I>(&mut self, args: I, options: ArgvOptions) -> Result<&mut Self, StoreError>
    where
        I: IntoIterator<Item = String>,
    {
        let plain = sources::from_argv(args, &options);
        self.register("argv", Priority::Standard, Value::Mapping(plain))
    }

    /// Plaintext value at `path`; an empty path returns everything.
    pub fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        if path.is_empty() {
            return self.get_all();
        }
        Ok(resolve(self.keys.as_ref(), &self.store, path)?)
    }

    pub fn get_all(&self) -> Result<Option<Value>, StoreError> {
        self.keys.validate(None)?;
        Ok(self
            .store
            .get_all()
            .map(|tree| decrypt_tree(&self.keys, &tree))
            .transpose()?)
    }

    /// The merged store exactly as persisted: sealed keys and cells.
    pub fn raw(&self) -> Option<Value> {
        self.store.get_all()
    }

    pub fn set(&mut self, path: &str, value: Value) -> Result<&mut Self, StoreError> {
        let sealed_path = encrypt_path(&self.keys, path)?;
        let sealed = encrypt_tree(&self.keys, &value)?;
        self.store.set(&sealed_path, sealed);
        Ok(self)
    }

    /// Value of the first path that has one.
    pub fn any<P: AsRef<str>>(&self, paths: &[P]) -> Result<Option<Value>, StoreError> {
        for path in paths {
            if let Some(value) = self.get(path.as_ref())? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Fails with every path that has no value.
    pub fn required<P: AsRef<str>>(&mut self, paths: &[P]) -> Result<&mut Self, StoreError> {
        let mut missing = Vec::new();
        for path in paths {
            if self.get(path.as_ref())?.is_none() {
                missing.push(path.as_ref().to_string());
            }
        }
        if !missing.is_empty() {
            return Err(StoreError::MissingRequired(missing));
        }
        Ok(self)
    }

    pub fn remove(&mut self, name: &str) -> Result<&mut Self, StoreError> {
        if !self.store.remove_source(name) {
            return Err(StoreError::UnknownSource(name.to_string()));
        }
        Ok(self)
    }

    /// Deletes `path` from every source.
    pub fn clear(&mut self, path: &str) -> Result<&mut Self, StoreError> {
        let sealed_path = encrypt_path(&self.keys, path)?;
        if !self.store.clear(&sealed_path) {
            debug!("clear matched nothing");
        }
        Ok(self)
    }

    pub fn reset(&mut self) -> &mut Self {
        self.store.reset();
        self
    }

    fn register(&mut self, name: &str, priority: Priority, plain: Value) -> Result<&mut Self, StoreError> {
        let sealed = sources::require_mapping(encrypt_tree(&self.keys, &plain)?)?;
        self.store.use_source(name, priority, sealed);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::{EncryptedConfig, Source};
    use crate::crypto::CipherError;
    use crate::store::StoreError;
    use crate::value::Value;
    use serde_json::json;

    const KEY: &str = "0123456789abcdef0123456789abcdef";

    fn value(json: serde_json::Value) -> Value {
        Value::try_from(json).expect("valid json")
    }

    #[test]
    fn literal_sources_resolve_and_chain() {
        let mut config = EncryptedConfig::with_key(KEY).expect("valid key");
        config
            .use_literal("one", value(json!({ "a": { "b": 1 } })))
            .expect("registers")
            .defaults(value(json!({ "a": { "c": "d" }, "e": true })))
            .expect("registers");

        assert_eq!(config.get("a:b").expect("get"), Some(Value::from(1i64)));
        assert_eq!(config.get("a:c").expect("get"), Some(Value::from("d")));
        assert_eq!(config.get("e").expect("get"), Some(Value::from(true)));
    }

    #[test]
    fn non_mapping_literals_are_rejected() {
        let mut config = EncryptedConfig::with_key(KEY).expect("valid key");
        let err = config
            .use_source("bad", Source::Literal(Value::from("scalar")))
            .err()
            .expect("should fail");
        assert!(matches!(err, StoreError::UnsupportedValue(_)));
    }

    #[test]
    fn set_then_get_and_clear() {
        let mut config = EncryptedConfig::with_key(KEY).expect("valid key");
        config
            .set("db:host", Value::from("example.org"))
            .expect("sets")
            .set("db:port", Value::from(5432i64))
            .expect("sets");
        assert_eq!(
            config.get("db").expect("get"),
            Some(value(json!({ "host": "example.org", "port": 5432 })))
        );

        config.clear("db:host").expect("clears");
        assert_eq!(config.get("db:host").expect("get"), None);
        assert_eq!(config.get("db:port").expect("get"), Some(Value::from(5432i64)));
    }

    #[test]
    fn overrides_beat_set_values() {
        let mut config = EncryptedConfig::with_key(KEY).expect("valid key");
        config.set("mode", Value::from("memory")).expect("sets");
        config.overrides(value(json!({ "mode": "forced" }))).expect("registers");
        assert_eq!(config.get("mode").expect("get"), Some(Value::from("forced")));
    }

    #[test]
    fn any_and_required() {
        let mut config = EncryptedConfig::with_key(KEY).expect("valid key");
        config
            .use_literal("one", value(json!({ "b": "second" })))
            .expect("registers");
        assert_eq!(
            config.any(&["a", "b"]).expect("any"),
            Some(Value::from("second"))
        );
        assert_eq!(config.any(&["x", "y"]).expect("any"), None);

        assert!(config.required(&["b"]).is_ok());
        match config.required(&["a", "b", "c:d"]) {
            Err(StoreError::MissingRequired(missing)) => assert_eq!(missing, vec!["a", "c:d"]),
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("expected missing keys"),
        }
    }

    #[test]
    fn remove_drops_named_sources() {
        let mut config = EncryptedConfig::with_key(KEY).expect("valid key");
        config
            .use_literal("one", value(json!({ "a": 1 })))
            .expect("registers");
        config.remove("one").expect("removes");
        assert_eq!(config.get("a").expect("get"), None);
        assert!(matches!(config.remove("one"), Err(StoreError::UnknownSource(_))));
    }

    #[test]
    fn empty_path_returns_everything() {
        let mut config = EncryptedConfig::with_key(KEY).expect("valid key");
        assert_eq!(config.get("").expect("get"), None);
        config
            .use_literal("one", value(json!({ "a": [1, 2] })))
            .expect("registers");
        assert_eq!(config.get("").expect("get"), Some(value(json!({ "a": [1, 2] }))));
    }

    #[test]
    fn unkeyed_configs_refuse_to_work() {
        let mut config = EncryptedConfig::new();
        let err = config
            .use_literal("one", value(json!({ "a": 1 })))
            .err()
            .expect("should fail");
        assert!(matches!(err, StoreError::Cipher(CipherError::KeyNotSet)));
        assert!(matches!(
            config.get("a"),
            Err(StoreError::Cipher(CipherError::KeyNotSet))
        ));
    }

    #[test]
    fn rotating_the_key_strands_existing_cells() {
        let mut config = EncryptedConfig::with_key(KEY).expect("valid key");
        config
            .use_literal("one", value(json!({ "a": "x" })))
            .expect("registers");
        config
            .set_encryption_key("fedcba9876543210fedcba9876543210")
            .expect("valid key");
        // sealed keys no longer match, so the lookup simply misses
        assert_eq!(config.get("a").expect("get"), None);
        assert!(matches!(
            config.get_all(),
            Err(StoreError::Cipher(CipherError::DecryptionFailed))
        ));
    }

    #[test]
    fn invalid_keys_are_rejected_and_previous_key_kept() {
        let mut config = EncryptedConfig::with_key(KEY).expect("valid key");
        assert!(matches!(
            config.set_encryption_key("tooshort"),
            Err(StoreError::Cipher(CipherError::InvalidKeyLength { .. }))
        ));
        config
            .use_literal("one", value(json!({ "a": "x" })))
            .expect("registers");
        assert_eq!(config.get("a").expect("get"), Some(Value::from("x")));
    }
}

//! Transparent encryption for hierarchical configuration. Keys and scalar
//! values are sealed before they reach the store and opened on the way out,
//! so the store (and anything that dumps it) only ever holds ciphertext.

pub mod config;
pub mod crypto;
pub mod encrypted;
pub mod resolver;
pub mod sources;
pub mod store;
pub mod value;
pub mod walker;

pub use encrypted::{EncryptedConfig, Source};
pub use store::{MemoryStore, StoreEngine, StoreError};
pub use value::Value;

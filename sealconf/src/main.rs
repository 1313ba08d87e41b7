//! Small CLI around the sealed configuration layer. Every command names the
//! environment variable that holds the key (or `@file` for a key-source
//! config), so keys never appear in argv. `SEALCONF_KEY_IV` pins the key IV
//! so sealed files stay addressable by path.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use sealconf::config::{KeySourceConfig, KEY_IV_ENV};
use sealconf::crypto::cell::{open, seal};
use sealconf::crypto::KeyManager;
use sealconf::sources::load_json_file;
use sealconf::walker::{decrypt_tree, encrypt_tree};
use sealconf::{EncryptedConfig, MemoryStore, Value};
use tracing_subscriber::EnvFilter;

fn print_usage() {
    eprintln!("Commands:\n  encrypt-file <key> <plain.json>\n  decrypt-file <key> <sealed.json>\n  get <key> <plain.json> <path>\n  get-sealed <key> <sealed.json> <path>\n  encrypt-value <key> <json-scalar>\n  decrypt-value <key> <cell>\n  fingerprint <key>\n<key> is an env var name or @key-source.json; {KEY_IV_ENV} pins the key IV (32 hex chars)");
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .try_init();
}

fn key_config(arg: &str) -> Result<KeySourceConfig, String> {
    KeySourceConfig::from_cli_arg(arg, env::var(KEY_IV_ENV).ok())
        .map_err(|e| format!("key setup failed: {e}"))
}

fn key_manager(arg: &str) -> Result<KeyManager, String> {
    key_config(arg)?
        .build_key_manager()
        .map_err(|e| format!("key setup failed: {e}"))
}

fn query(config: &EncryptedConfig, path: &str) -> Result<(), String> {
    match config.get(path).map_err(|e| format!("{e}"))? {
        Some(value) => print_json(&value),
        None => Err(format!("{path} is not set")),
    }
}

fn print_json(value: &Value) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| format!("output failed: {e}"))?;
    println!("{text}");
    Ok(())
}

fn run(args: &[String]) -> Result<(), String> {
    match (args[1].as_str(), args.len()) {
        ("encrypt-file", 4) => {
            let source = key_config(&args[2])?;
            let keys = source
                .build_key_manager()
                .map_err(|e| format!("key setup failed: {e}"))?;
            if source.key_iv_hex.is_none() {
                eprintln!(
                    "key iv {} is not pinned; set {KEY_IV_ENV} to it to look keys up later",
                    hex::encode(keys.key_iv())
                );
            }
            let plain = load_json_file(&args[3]).map_err(|e| format!("{e}"))?;
            let sealed = encrypt_tree(&keys, &Value::Mapping(plain))
                .map_err(|e| format!("encryption failed: {e}"))?;
            print_json(&sealed)
        }
        ("decrypt-file", 4) => {
            let keys = key_manager(&args[2])?;
            let sealed = load_json_file(&args[3]).map_err(|e| format!("{e}"))?;
            let plain = decrypt_tree(&keys, &Value::Mapping(sealed))
                .map_err(|e| format!("decryption failed: {e}"))?;
            print_json(&plain)
        }
        ("get", 5) => {
            let keys = key_manager(&args[2])?;
            let mut config = EncryptedConfig::with_parts(Arc::new(keys), MemoryStore::new());
            config
                .use_file("file", &args[3])
                .map_err(|e| format!("{e}"))?;
            query(&config, &args[4])
        }
        ("get-sealed", 5) => {
            let keys = key_manager(&args[2])?;
            let mut config = EncryptedConfig::with_parts(Arc::new(keys), MemoryStore::new());
            config
                .use_sealed_file("file", &args[3])
                .map_err(|e| format!("{e}"))?;
            query(&config, &args[4])
        }
        ("encrypt-value", 4) => {
            let keys = key_manager(&args[2])?;
            let json: serde_json::Value = serde_json::from_str(&args[3])
                .unwrap_or_else(|_| serde_json::Value::String(args[3].clone()));
            let value = Value::try_from(json).map_err(|e| format!("{e}"))?;
            let wire = seal(&keys, &value, false).map_err(|e| format!("encryption failed: {e}"))?;
            println!("{wire}");
            Ok(())
        }
        ("decrypt-value", 4) => {
            let keys = key_manager(&args[2])?;
            let value = open(&keys, &args[3]).map_err(|e| format!("decryption failed: {e}"))?;
            print_json(&value)
        }
        ("fingerprint", 3) => {
            let keys = key_manager(&args[2])?;
            let key = keys.current_key().map_err(|e| format!("{e}"))?;
            println!("{}", key.fingerprint());
            Ok(())
        }
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    init_logging();
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        return ExitCode::SUCCESS;
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

//! Plaintext source loaders: JSON files, environment variables and command
//! line arguments. Everything here produces a plain mapping; sealing happens
//! afterwards in `EncryptedConfig`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_json::Number;

use crate::store::StoreError;
use crate::value::Value;

/// Controls how environment variables become configuration keys.
#[derive(Debug, Clone, Default)]
pub struct EnvOptions {
    /// Splits variable names into nested keys, e.g. `__` turns `DB__HOST`
    /// into `DB:HOST`.
    pub separator: Option<String>,
    /// Only variables starting with this prefix are read; the prefix is stripped.
    pub prefix: Option<String>,
    pub lower_case: bool,
    /// When non-empty, only these names (after prefix stripping) are read.
    pub whitelist: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ArgvOptions {
    /// Splits flag names into nested keys, e.g. `.` turns `--db.host` into `db:host`.
    pub separator: Option<String>,
}

/// Reads a JSON object from disk.
pub fn load_json_file(path: impl AsRef<Path>) -> Result<BTreeMap<String, Value>, StoreError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .map_err(|e| StoreError::Io(format!("{}: {e}", path.display())))?;
    let json: serde_json::Value =
        serde_json::from_str(&raw).map_err(|e| StoreError::Parse(format!("{}: {e}", path.display())))?;
    into_mapping(json)
}

/// Converts a JSON document into a source mapping. The top level must be an object.
pub fn into_mapping(json: serde_json::Value) -> Result<BTreeMap<String, Value>, StoreError> {
    let value = Value::try_from(json).map_err(|e| StoreError::UnsupportedValue(e.0))?;
    require_mapping(value)
}

pub(crate) fn require_mapping(value: Value) -> Result<BTreeMap<String, Value>, StoreError> {
    match value {
        Value::Mapping(map) => Ok(map),
        other => Err(StoreError::UnsupportedValue(format!(
            "a source must be a mapping, got a {}",
            other.kind()
        ))),
    }
}

pub fn from_env<I>(vars: I, options: &EnvOptions) -> BTreeMap<String, Value>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut map = BTreeMap::new();
    for (name, value) in vars {
        let name = match &options.prefix {
            Some(prefix) => match name.strip_prefix(prefix.as_str()) {
                Some(rest) if !rest.is_empty() => rest.to_string(),
                _ => continue,
            },
            None => name,
        };
        if !options.whitelist.is_empty() && !options.whitelist.iter().any(|w| *w == name) {
            continue;
        }
        let name = if options.lower_case {
            name.to_lowercase()
        } else {
            name
        };
        let segments = split_name(&name, options.separator.as_deref());
        insert_nested(&mut map, &segments, Value::String(value));
    }
    map
}

/// Parses `--key=value`, `--key value`, `--flag` and `--no-flag`. Positional
/// arguments are collected as a sequence under `_`.
pub fn from_argv<I>(args: I, options: &ArgvOptions) -> BTreeMap<String, Value>
where
    I: IntoIterator<Item = String>,
{
    let mut map = BTreeMap::new();
    let mut positional = Vec::new();
    let mut args = args.into_iter().peekable();

    while let Some(arg) = args.next() {
        let Some(flag) = arg.strip_prefix("--").filter(|f| !f.is_empty()) else {
            positional.push(parse_scalar(&arg));
            continue;
        };

        let (name, value) = match flag.split_once('=') {
            Some((name, raw)) => (name.to_string(), parse_scalar(raw)),
            None => match flag.strip_prefix("no-") {
                Some(negated) => (negated.to_string(), Value::Bool(false)),
                None => match args.next_if(|next| !next.starts_with("--")) {
                    Some(raw) => (flag.to_string(), parse_scalar(&raw)),
                    None => (flag.to_string(), Value::Bool(true)),
                },
            },
        };
        let segments = split_name(&name, options.separator.as_deref());
        insert_nested(&mut map, &segments, value);
    }

    if !positional.is_empty() {
        map.insert("_".to_string(), Value::Sequence(positional));
    }
    map
}

/// Booleans and finite numbers are recognised; anything else stays a string.
fn parse_scalar(raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(int) = raw.parse::<i64>() {
        return Value::Number(int.into());
    }
    match raw.parse::<f64>().ok().and_then(Number::from_f64) {
        Some(number) => Value::Number(number),
        None => Value::String(raw.to_string()),
    }
}

fn split_name<'a>(name: &'a str, separator: Option<&str>) -> Vec<&'a str> {
    match separator {
        Some(sep) if !sep.is_empty() => name.split(sep).collect(),
        _ => vec![name],
    }
}

fn insert_nested(map: &mut BTreeMap<String, Value>, segments: &[&str], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut node = map;
    for segment in parents {
        let slot = node
            .entry(segment.to_string())
            .or_insert_with(Value::empty_mapping);
        if !matches!(slot, Value::Mapping(_)) {
            *slot = Value::empty_mapping();
        }
        node = match slot {
            Value::Mapping(child) => child,
            _ => return,
        };
    }
    node.insert(last.to_string(), value);
}

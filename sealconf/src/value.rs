//! Configuration values: the plaintext shape callers read and write, and the
//! encrypted shape the store holds (same type, every scalar replaced by a cell
//! string and every mapping key by an encrypted key).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Number;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unsupported value: {0}")]
pub struct UnsupportedValue(pub String);

/// A configuration value. Absence is modelled as `Option<Value>::None`, never
/// as a variant, so an absent value can never be sealed into a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    String(String),
    Number(Number),
    Bool(bool),
    Sequence(Vec<Value>),
    Mapping(BTreeMap<String, Value>),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
            Value::Sequence(_) => "sequence",
            Value::Mapping(_) => "mapping",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn empty_mapping() -> Self {
        Value::Mapping(BTreeMap::new())
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = UnsupportedValue;

    /// `null` members of an object are dropped (absent); `null` anywhere else
    /// has no configuration meaning and is rejected.
    fn try_from(json: serde_json::Value) -> Result<Self, Self::Error> {
        match json {
            serde_json::Value::Null => Err(UnsupportedValue("null".to_string())),
            serde_json::Value::Bool(flag) => Ok(Value::Bool(flag)),
            serde_json::Value::Number(number) => Ok(Value::Number(number)),
            serde_json::Value::String(text) => Ok(Value::String(text)),
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(Value::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Sequence),
            serde_json::Value::Object(members) => {
                let mut map = BTreeMap::new();
                for (key, member) in members {
                    if member.is_null() {
                        continue;
                    }
                    map.insert(key, Value::try_from(member)?);
                }
                Ok(Value::Mapping(map))
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => serde_json::Value::String(text),
            Value::Number(number) => serde_json::Value::Number(number),
            Value::Bool(flag) => serde_json::Value::Bool(flag),
            Value::Sequence(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Mapping(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::String(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::String(text)
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Value::Bool(flag)
    }
}

impl From<i64> for Value {
    fn from(number: i64) -> Self {
        Value::Number(number.into())
    }
}

impl From<u64> for Value {
    fn from(number: u64) -> Self {
        Value::Number(number.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Sequence(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Mapping(map)
    }
}

#[cfg(test)]
mod tests {
    use super::Value;
    use serde_json::json;

    #[test]
    fn converts_nested_json() {
        let value = Value::try_from(json!({
            "name": "squire",
            "port": 8080,
            "ratio": 0.25,
            "enabled": true,
            "tags": ["a", "b"],
            "nested": { "deep": { "leaf": "x" } }
        }))
        .expect("valid configuration json");

        let map = value.as_mapping().expect("top level is a mapping");
        assert_eq!(map["name"], Value::from("squire"));
        assert_eq!(map["port"], Value::from(8080i64));
        assert_eq!(map["enabled"], Value::from(true));
        assert_eq!(map["tags"], Value::from(vec![Value::from("a"), Value::from("b")]));
        assert_eq!(map["ratio"].kind(), "number");
    }

    #[test]
    fn drops_null_members_and_rejects_other_nulls() {
        let value = Value::try_from(json!({ "kept": "yes", "gone": null })).expect("valid");
        let map = value.as_mapping().expect("mapping");
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("kept"));

        assert!(Value::try_from(json!(["a", null])).is_err());
        assert!(Value::try_from(json!(null)).is_err());
    }

    #[test]
    fn serializes_as_plain_json() {
        let value = Value::try_from(json!({ "a": [1, "two", false] })).expect("valid");
        let text = serde_json::to_string(&value).expect("serializes");
        assert_eq!(text, r#"{"a":[1,"two",false]}"#);
        let back: Value = serde_json::from_str(&text).expect("deserializes");
        assert_eq!(back, value);
    }
}

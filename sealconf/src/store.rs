//! The store engine the sealed layer sits on: named sources merged by
//! priority. It never sees plaintext; every key it is handed is already a
//! sealed key and every leaf a cell.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::crypto::CipherError;
use crate::value::Value;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),
    #[error("source unreadable: {0}")]
    Io(String),
    #[error("source parse failed: {0}")]
    Parse(String),
    #[error("missing required keys: {}", .0.join(", "))]
    MissingRequired(Vec<String>),
    #[error("no source named {0}")]
    UnknownSource(String),
    #[error("unsupported value: {0}")]
    UnsupportedValue(String),
}

/// Where a source sits in the lookup order. Lower sorts first and wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Overrides,
    Memory,
    Standard,
    Defaults,
}

pub const OVERRIDES_SOURCE: &str = "overrides";
pub const MEMORY_SOURCE: &str = "memory";
pub const DEFAULTS_SOURCE: &str = "defaults";

/// Get/set contract of a hierarchical, multi-source configuration store.
pub trait StoreEngine {
    /// Registers a source, replacing any source already using `name`.
    fn use_source(&mut self, name: &str, priority: Priority, data: BTreeMap<String, Value>);
    fn remove_source(&mut self, name: &str) -> bool;
    /// Highest-priority value under a top-level key; mappings are merged with
    /// the same key's mappings from lower-priority sources.
    fn get(&self, key: &str) -> Option<Value>;
    /// Every source merged into one mapping; `None` when there are no sources.
    fn get_all(&self) -> Option<Value>;
    /// Writes into the runtime memory source, creating it and any intermediate
    /// mappings as needed.
    fn set(&mut self, path: &[String], value: Value);
    /// Deletes `path` from every source. Reports whether anything was removed.
    fn clear(&mut self, path: &[String]) -> bool;
    fn reset(&mut self);
    fn source_names(&self) -> Vec<String>;
}

#[derive(Debug, Clone)]
struct Source {
    name: String,
    priority: Priority,
    data: BTreeMap<String, Value>,
}

/// In-process store: an ordered list of named sources.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    sources: Vec<Source>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl StoreEngine for MemoryStore {
    fn use_source(&mut self, name: &str, priority: Priority, data: BTreeMap<String, Value>) {
        if let Some(existing) = self.sources.iter_mut().find(|s| s.name == name) {
            existing.priority = priority;
            existing.data = data;
        } else {
            self.sources.push(Source {
                name: name.to_string(),
                priority,
                data,
            });
        }
        // stable: equal priorities keep registration order
        self.sources.sort_by_key(|s| s.priority);
        debug!(source = name, ?priority, "source registered");
    }

    fn remove_source(&mut self, name: &str) -> bool {
        let before = self.sources.len();
        self.sources.retain(|s| s.name != name);
        let removed = self.sources.len() != before;
        if removed {
            debug!(source = name, "source removed");
        }
        removed
    }

    fn get(&self, key: &str) -> Option<Value> {
        let mut hits = self.sources.iter().filter_map(|s| s.data.get(key));
        let mut found = hits.next()?.clone();
        if let Value::Mapping(top) = &mut found {
            for lower in hits {
                if let Value::Mapping(lower) = lower {
                    merge_beneath(top, lower);
                }
            }
        }
        Some(found)
    }

    fn get_all(&self) -> Option<Value> {
        let (first, rest) = self.sources.split_first()?;
        let mut merged = first.data.clone();
        for lower in rest {
            merge_beneath(&mut merged, &lower.data);
        }
        Some(Value::Mapping(merged))
    }

    fn set(&mut self, path: &[String], value: Value) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };
        if !self.sources.iter().any(|s| s.name == MEMORY_SOURCE) {
            self.use_source(MEMORY_SOURCE, Priority::Memory, BTreeMap::new());
        }
        let Some(memory) = self.sources.iter_mut().find(|s| s.name == MEMORY_SOURCE) else {
            return;
        };

        let mut node = &mut memory.data;
        for segment in parents {
            let slot = node
                .entry(segment.clone())
                .or_insert_with(Value::empty_mapping);
            if !matches!(slot, Value::Mapping(_)) {
                *slot = Value::empty_mapping();
            }
            node = match slot {
                Value::Mapping(child) => child,
                _ => return,
            };
        }
        node.insert(last.clone(), value);
    }

    fn clear(&mut self, path: &[String]) -> bool {
        let Some((last, parents)) = path.split_last() else {
            return false;
        };
        let mut removed = false;
        for source in &mut self.sources {
            let mut node = Some(&mut source.data);
            for segment in parents {
                node = match node.and_then(|map| map.get_mut(segment)) {
                    Some(Value::Mapping(child)) => Some(child),
                    _ => None,
                };
            }
            if let Some(map) = node {
                removed |= map.remove(last).is_some();
            }
        }
        removed
    }

    fn reset(&mut self) {
        debug!(count = self.sources.len(), "all sources dropped");
        self.sources.clear();
    }

    fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name.clone()).collect()
    }
}

/// Fills `top` with entries from `lower` it does not already have, recursing
/// where both sides hold a mapping.
fn merge_beneath(top: &mut BTreeMap<String, Value>, lower: &BTreeMap<String, Value>) {
    for (key, value) in lower {
        match (top.get_mut(key), value) {
            (None, _) => {
                top.insert(key.clone(), value.clone());
            }
            (Some(Value::Mapping(upper)), Value::Mapping(under)) => merge_beneath(upper, under),
            (Some(_), _) => {}
        }
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Identity of one harvested record within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(String);

impl ItemKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ItemKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Derives the dedup key of a raw record.
///
/// Implementations must be deterministic and free of side effects: the same
/// record always yields the same key. `None` means the record cannot be keyed
/// and is dropped by the extractor.
pub trait KeyStrategy: Send + Sync {
    fn derive(&self, record: &Value) -> Option<ItemKey>;
}

/// Provided identifier when present and non-empty, otherwise a SHA-256 hash of
/// the normalized primary content field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdOrContentHash {
    pub id_field: String,
    pub content_field: String,
}

impl IdOrContentHash {
    pub fn new(id_field: impl Into<String>, content_field: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
            content_field: content_field.into(),
        }
    }
}

impl KeyStrategy for IdOrContentHash {
    fn derive(&self, record: &Value) -> Option<ItemKey> {
        let fields = record.as_object()?;

        if let Some(id) = fields.get(&self.id_field).and_then(scalar_text) {
            let id = id.trim();
            if !id.is_empty() {
                return Some(ItemKey::new(id));
            }
        }

        let content = fields.get(&self.content_field).and_then(scalar_text)?;
        let normalized = normalize_content(&content);
        if normalized.is_empty() {
            return None;
        }
        Some(content_key(&normalized))
    }
}

/// Whole-record equality: two records share a key exactly when their
/// canonical JSON forms (object keys sorted) are equal.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ContentEquality;

impl KeyStrategy for ContentEquality {
    fn derive(&self, record: &Value) -> Option<ItemKey> {
        let canonical = serde_json::to_string(&canonicalize(record)).ok()?;
        Some(content_key(&canonical))
    }
}

/// Trim and collapse every whitespace run to a single space.
pub fn normalize_content(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Hex SHA-256 of `input`, used as a key for records without an identifier.
pub fn content_key(input: &str) -> ItemKey {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    ItemKey(hex)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(values) => Value::Array(values.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

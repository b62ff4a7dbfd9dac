use serde_json::Value;

use crate::key::{ItemKey, KeyStrategy};

/// One harvested record. Fields beyond the key are passed through untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub key: ItemKey,
    pub record: Value,
}

impl Item {
    pub fn new(key: impl Into<ItemKey>, record: Value) -> Self {
        Self {
            key: key.into(),
            record,
        }
    }

    /// Key the record with `strategy`; `None` when no key can be derived.
    pub fn from_record(record: Value, strategy: &dyn KeyStrategy) -> Option<Self> {
        let key = strategy.derive(&record)?;
        Some(Self { key, record })
    }
}

use std::collections::HashSet;

use crate::item::Item;
use crate::key::ItemKey;

/// Seen-key set scoped to a single harvest session.
///
/// The first occurrence of a key is accepted; later occurrences, including ones
/// that drift onto a later page, are rejected. Rejected items are never merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deduplicator {
    seen: HashSet<ItemKey>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the item's key had not been seen before.
    pub fn insert(&mut self, item: &Item) -> bool {
        self.insert_key(&item.key)
    }

    pub fn insert_key(&mut self, key: &ItemKey) -> bool {
        if self.seen.contains(key) {
            return false;
        }
        self.seen.insert(key.clone())
    }

    pub fn contains(&self, key: &ItemKey) -> bool {
        self.seen.contains(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

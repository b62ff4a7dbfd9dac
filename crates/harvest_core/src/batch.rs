use std::collections::HashSet;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A fixed-size, ordered slice of a harvested key list, handed to an
/// independent downstream harvest.
///
/// Serializes with the interchange field names used by the task orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch<K> {
    #[serde(rename = "batch_index")]
    pub index: usize,
    #[serde(rename = "item_ids")]
    pub item_keys: Vec<K>,
    #[serde(rename = "batch_size")]
    pub size: usize,
    /// Offset of the first key in the source list.
    #[serde(rename = "start_index")]
    pub start_offset: usize,
    /// Offset one past the last key in the source list.
    #[serde(rename = "end_index")]
    pub end_offset: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("max batch size must be at least 1")]
    ZeroBatchSize,
    #[error("expected batch index {expected}, found {found}")]
    NonContiguousIndex { expected: usize, found: usize },
    #[error("batch {index} starts at offset {found}, expected {expected}")]
    OffsetMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error("batch {index} declares {declared} keys but carries {actual}")]
    SizeMismatch {
        index: usize,
        declared: usize,
        actual: usize,
    },
}

/// Slice `keys` in order into batches of at most `max_batch_size`.
///
/// Pure and deterministic: the same keys and size always give the same batches.
/// Every batch carries a copy of `context`.
pub fn partition<K: Clone>(
    keys: &[K],
    max_batch_size: usize,
    context: Option<&Value>,
) -> Result<Vec<Batch<K>>, BatchError> {
    if max_batch_size == 0 {
        return Err(BatchError::ZeroBatchSize);
    }

    let batches = keys
        .chunks(max_batch_size)
        .enumerate()
        .map(|(index, chunk)| {
            let start_offset = index * max_batch_size;
            Batch {
                index,
                item_keys: chunk.to_vec(),
                size: chunk.len(),
                start_offset,
                end_offset: start_offset + chunk.len(),
                context: context.cloned(),
            }
        })
        .collect();
    Ok(batches)
}

/// Concatenate batches back into the source list, checking that they are
/// contiguous and consistent.
pub fn reassemble<K: Clone>(batches: &[Batch<K>]) -> Result<Vec<K>, BatchError> {
    let mut keys = Vec::new();
    for (expected, batch) in batches.iter().enumerate() {
        if batch.index != expected {
            return Err(BatchError::NonContiguousIndex {
                expected,
                found: batch.index,
            });
        }
        if batch.start_offset != keys.len() {
            return Err(BatchError::OffsetMismatch {
                index: batch.index,
                expected: keys.len(),
                found: batch.start_offset,
            });
        }
        if batch.size != batch.item_keys.len()
            || batch.end_offset != batch.start_offset + batch.item_keys.len()
        {
            return Err(BatchError::SizeMismatch {
                index: batch.index,
                declared: batch.size,
                actual: batch.item_keys.len(),
            });
        }
        keys.extend(batch.item_keys.iter().cloned());
    }
    Ok(keys)
}

/// Drop repeated keys, keeping the first occurrence of each.
pub fn unique_keys<K: Clone + Eq + Hash>(keys: &[K]) -> Vec<K> {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.iter()
        .filter(|key| seen.insert((*key).clone()))
        .cloned()
        .collect()
}

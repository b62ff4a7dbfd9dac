//! Harvest core: pure pagination state machine, deduplication, flattening and batching.
mod batch;
mod dedup;
mod effect;
mod error;
mod flatten;
mod item;
mod key;
mod msg;
mod state;
mod update;

pub use batch::{partition, reassemble, unique_keys, Batch, BatchError};
pub use dedup::Deduplicator;
pub use effect::{Effect, PageCursor};
pub use error::{FetchError, FetchErrorKind};
pub use flatten::{align, flatten_value, Flattener, Row};
pub use item::Item;
pub use key::{content_key, normalize_content, ContentEquality, IdOrContentHash, ItemKey, KeyStrategy};
pub use msg::{PageFetch, SessionEvent};
pub use state::{
    HarvestOutcome, HarvestSession, PageStats, SessionLimits, SessionStatus, TerminationReason,
};
pub use update::update;

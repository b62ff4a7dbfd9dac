pub use harvest_core::{FetchError, FetchErrorKind};
use harvest_core::{HarvestOutcome, Item};
use serde_json::Value;

use crate::worker::BatchReport;

pub type JobId = u64;

/// Decoded body of one fetched page.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Json(Value),
}

/// Opaque page payload handed from a fetcher to an extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPage {
    /// Where the page came from, for logs (usually the request URL).
    pub source: String,
    pub content_type: Option<String>,
    pub body: Payload,
}

impl RawPage {
    pub fn text(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            content_type: None,
            body: Payload::Text(text.into()),
        }
    }

    pub fn json(source: impl Into<String>, value: Value) -> Self {
        Self {
            source: source.into(),
            content_type: Some("application/json".to_string()),
            body: Payload::Json(value),
        }
    }
}

/// Successful fetch of one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult {
    pub raw: RawPage,
    /// Continuation token for sources that paginate by cursor.
    pub next_token: Option<String>,
    /// Set when the source itself reports that nothing follows this page.
    pub is_last: bool,
}

impl PageResult {
    pub fn new(raw: RawPage) -> Self {
        Self {
            raw,
            next_token: None,
            is_last: false,
        }
    }
}

/// A fetched page after extraction, before deduplication.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub ordinal: u32,
    pub items: Vec<Item>,
    pub raw: RawPage,
    pub is_empty: bool,
}

impl Page {
    pub fn new(ordinal: u32, items: Vec<Item>, raw: RawPage) -> Self {
        Self {
            ordinal,
            is_empty: items.is_empty(),
            items,
            raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    pub job_id: JobId,
    pub ordinal: u32,
    pub fetched: usize,
    pub accepted: usize,
    pub duplicates: usize,
    /// Items accumulated so far in the session.
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Progress(SessionProgress),
    SessionCompleted {
        job_id: JobId,
        outcome: HarvestOutcome,
    },
    BatchCompleted {
        job_id: JobId,
        report: BatchReport,
    },
    /// The job could not be started at all.
    JobFailed { job_id: JobId, message: String },
}

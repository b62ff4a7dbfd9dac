use crate::error::FetchError;
use crate::item::Item;

/// Result of fetching and extracting the page the session asked for.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageFetch {
    /// Extracted items in page order, before deduplication.
    pub items: Vec<Item>,
    /// Continuation token for the following page.
    pub next_token: Option<String>,
    /// The source reported that no further pages exist.
    pub is_last: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Begin the session; requests page 1.
    Start,
    /// The requested page was fetched and extracted.
    PageFetched(PageFetch),
    /// The requested page could not be fetched.
    FetchFailed(FetchError),
    /// The caller cancelled the session.
    Cancelled,
}

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dedup::Deduplicator;
use crate::error::FetchError;
use crate::item::Item;
use crate::key::ItemKey;

/// Why a session stopped. Always reported explicitly alongside the items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TerminationReason {
    /// The empty-page streak reached its threshold, or the source declared its last page.
    Exhausted,
    /// Two consecutive pages started with the same item.
    Stall,
    /// The configured page cap was reached.
    MaxPages,
    /// The configured item cap was reached.
    MaxItems,
    /// A fetch failed.
    Error,
    /// The caller cancelled the session.
    Cancelled,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Exhausted => "exhausted",
            TerminationReason::Stall => "stall",
            TerminationReason::MaxPages => "maxPages",
            TerminationReason::MaxItems => "maxItems",
            TerminationReason::Error => "error",
            TerminationReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Termination heuristics for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLimits {
    /// Last ordinal that may be fetched. `None` leaves the session unbounded.
    pub max_pages: Option<u32>,
    /// Consecutive pages without new items that end the session. Clamped to at least 1.
    pub empty_page_threshold: u32,
    pub detect_stall: bool,
    pub max_items: Option<usize>,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_pages: None,
            empty_page_threshold: 1,
            detect_stall: true,
            max_items: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Terminated(TerminationReason),
}

/// Counters for the most recently processed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageStats {
    pub ordinal: u32,
    /// Items the extractor produced for the page.
    pub fetched: usize,
    /// Items that were new and got accumulated.
    pub accepted: usize,
    /// Items rejected as already seen.
    pub duplicates: usize,
}

/// Terminal result of a session: items, count and reason always travel together.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestOutcome {
    /// Accumulated items in page order, then in-page order.
    pub items: Vec<Item>,
    pub total: usize,
    pub reason: TerminationReason,
    pub pages_fetched: u32,
    /// The fetch failure that ended the session when `reason` is `Error`.
    pub failure: Option<FetchError>,
}

/// Mutable state of one logical harvest. Owned by exactly one driver.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestSession {
    limits: SessionLimits,
    /// Ordinal of the page most recently requested; 0 before the session starts.
    ordinal: u32,
    pages_fetched: u32,
    seen: Deduplicator,
    empty_streak: u32,
    last_first_key: Option<ItemKey>,
    items: Vec<Item>,
    status: SessionStatus,
    failure: Option<FetchError>,
    last_page: Option<PageStats>,
}

impl HarvestSession {
    pub fn new(mut limits: SessionLimits) -> Self {
        limits.empty_page_threshold = limits.empty_page_threshold.max(1);
        Self {
            limits,
            ordinal: 0,
            pages_fetched: 0,
            seen: Deduplicator::new(),
            empty_streak: 0,
            last_first_key: None,
            items: Vec::new(),
            status: SessionStatus::Running,
            failure: None,
            last_page: None,
        }
    }

    pub fn limits(&self) -> &SessionLimits {
        &self.limits
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.status, SessionStatus::Terminated(_))
    }

    pub fn reason(&self) -> Option<TerminationReason> {
        match self.status {
            SessionStatus::Running => None,
            SessionStatus::Terminated(reason) => Some(reason),
        }
    }

    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    pub fn empty_streak(&self) -> u32 {
        self.empty_streak
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn last_page(&self) -> Option<PageStats> {
        self.last_page
    }

    /// Consumes the session. A session that is still running is reported as cancelled,
    /// since its driver stopped before a termination rule fired.
    pub fn into_outcome(self) -> HarvestOutcome {
        let reason = self.reason().unwrap_or(TerminationReason::Cancelled);
        HarvestOutcome {
            total: self.items.len(),
            items: self.items,
            reason,
            pages_fetched: self.pages_fetched,
            failure: self.failure,
        }
    }

    pub(crate) fn advance(&mut self) -> u32 {
        self.ordinal += 1;
        self.ordinal
    }

    pub(crate) fn record_fetch(&mut self) {
        self.pages_fetched += 1;
    }

    pub(crate) fn terminate(&mut self, reason: TerminationReason) {
        self.status = SessionStatus::Terminated(reason);
    }

    pub(crate) fn fail(&mut self, error: FetchError) {
        self.failure = Some(error);
        self.terminate(TerminationReason::Error);
    }

    /// Swaps in the first key of the current page, returning the previous page's.
    pub(crate) fn replace_first_key(&mut self, key: Option<ItemKey>) -> Option<ItemKey> {
        std::mem::replace(&mut self.last_first_key, key)
    }

    pub(crate) fn cap_reached(&self) -> bool {
        self.limits
            .max_items
            .is_some_and(|cap| self.items.len() >= cap)
    }

    /// Accept new items until the item cap is hit. Items past the cap are dropped.
    pub(crate) fn accumulate(&mut self, items: Vec<Item>) -> PageStats {
        let mut stats = PageStats {
            ordinal: self.ordinal,
            fetched: items.len(),
            ..PageStats::default()
        };
        for item in items {
            if self.cap_reached() {
                break;
            }
            if self.seen.insert(&item) {
                self.items.push(item);
                stats.accepted += 1;
            } else {
                stats.duplicates += 1;
            }
        }
        self.last_page = Some(stats);
        stats
    }

    pub(crate) fn record_stalled_page(&mut self, fetched: usize) {
        self.last_page = Some(PageStats {
            ordinal: self.ordinal,
            fetched,
            ..PageStats::default()
        });
    }

    pub(crate) fn bump_empty_streak(&mut self) -> u32 {
        self.empty_streak += 1;
        self.empty_streak
    }

    pub(crate) fn reset_empty_streak(&mut self) {
        self.empty_streak = 0;
    }
}

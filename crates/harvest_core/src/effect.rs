use crate::state::TerminationReason;

/// Where the next fetch should resume. Opaque to the session beyond the ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    /// 1-based page ordinal.
    pub ordinal: u32,
    /// Continuation token handed back by the previous page, if the source uses one.
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Fetch and extract the page at `cursor`.
    Fetch { cursor: PageCursor },
    /// Politeness pause before fetching `before_ordinal`.
    Delay { before_ordinal: u32 },
    /// The session terminated; no further effects follow.
    Finish { reason: TerminationReason },
}

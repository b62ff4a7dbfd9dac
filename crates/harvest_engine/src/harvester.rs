use std::collections::VecDeque;
use std::sync::Arc;

use harvest_core::{update, Effect, HarvestOutcome, HarvestSession, PageCursor, PageFetch, SessionEvent};
use harvest_logging::{harvest_debug, harvest_info, harvest_warn, with_session_label};
use tokio_util::sync::CancellationToken;

use crate::config::HarvestConfig;
use crate::extract::ItemExtractor;
use crate::fetch::{PageFetcher, ProgressSink};
use crate::{EngineEvent, JobId, Page, SessionProgress};

/// Drives one pagination session: runs the effects the session asks for until
/// it terminates, then hands back everything it accumulated.
#[derive(Clone)]
pub struct Harvester {
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn ItemExtractor>,
    config: HarvestConfig,
    job_id: JobId,
    label: Option<String>,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl Harvester {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn ItemExtractor>,
        config: HarvestConfig,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            config,
            job_id: 0,
            label: None,
            progress: None,
        }
    }

    pub fn with_job_id(mut self, job_id: JobId) -> Self {
        self.job_id = job_id;
        self
    }

    /// Prefix for every log line of the session, e.g. the category being harvested.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub async fn run(&self) -> HarvestOutcome {
        self.run_until_cancelled(&CancellationToken::new()).await
    }

    /// Like [`Harvester::run`], but stops at the next fetch or delay once
    /// `cancel` fires. Pages completed before that are kept.
    pub async fn run_until_cancelled(&self, cancel: &CancellationToken) -> HarvestOutcome {
        match &self.label {
            Some(label) => with_session_label(label.clone(), self.drive(cancel)).await,
            None => self.drive(cancel).await,
        }
    }

    async fn drive(&self, cancel: &CancellationToken) -> HarvestOutcome {
        harvest_info!(
            "harvest started: max_pages={:?} empty_page_threshold={}",
            self.config.limits.max_pages,
            self.config.limits.empty_page_threshold
        );
        let (mut session, effects) =
            update(HarvestSession::new(self.config.limits.clone()), SessionEvent::Start);
        let mut pending: VecDeque<Effect> = effects.into();

        while let Some(effect) = pending.pop_front() {
            let event = match effect {
                Effect::Fetch { cursor } => Some(self.fetch_page(&cursor, cancel).await),
                Effect::Delay { before_ordinal } => {
                    if self.pause(before_ordinal, cancel).await {
                        None
                    } else {
                        Some(SessionEvent::Cancelled)
                    }
                }
                Effect::Finish { reason } => {
                    harvest_info!(
                        "harvest finished: reason={} total={} pages={}",
                        reason,
                        session.items().len(),
                        session.pages_fetched()
                    );
                    None
                }
            };

            if let Some(event) = event {
                let page_done = matches!(event, SessionEvent::PageFetched(_));
                let (next, effects) = update(session, event);
                session = next;
                if page_done {
                    if let Some(stats) = session.last_page() {
                        harvest_debug!(
                            "page {}: {} new, {} duplicate, {} total",
                            stats.ordinal,
                            stats.accepted,
                            stats.duplicates,
                            session.items().len()
                        );
                    }
                    self.emit_progress(&session);
                }
                // Anything still queued belonged to the previous step.
                pending.clear();
                pending.extend(effects);
            }
        }

        session.into_outcome()
    }

    async fn fetch_page(&self, cursor: &PageCursor, cancel: &CancellationToken) -> SessionEvent {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return SessionEvent::Cancelled,
            result = self.fetcher.fetch(cursor) => result,
        };

        match result {
            Ok(fetched) => {
                let items = self.extractor.extract(&fetched.raw);
                let page = Page::new(cursor.ordinal, items, fetched.raw);
                if page.is_empty {
                    harvest_debug!("page {} from {} had no items", page.ordinal, page.raw.source);
                }
                SessionEvent::PageFetched(PageFetch {
                    items: page.items,
                    next_token: fetched.next_token,
                    is_last: fetched.is_last,
                })
            }
            Err(err) => {
                harvest_warn!("page {} failed: {}", cursor.ordinal, err);
                SessionEvent::FetchFailed(err)
            }
        }
    }

    /// Returns `false` when cancelled during the pause.
    async fn pause(&self, before_ordinal: u32, cancel: &CancellationToken) -> bool {
        let duration = match self.config.delay.duration_before(before_ordinal) {
            Ok(duration) => duration,
            Err(message) => {
                harvest_warn!("delay before page {} skipped: {}", before_ordinal, message);
                return !cancel.is_cancelled();
            }
        };
        if duration.is_zero() {
            return !cancel.is_cancelled();
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    fn emit_progress(&self, session: &HarvestSession) {
        let (Some(sink), Some(stats)) = (&self.progress, session.last_page()) else {
            return;
        };
        sink.emit(EngineEvent::Progress(SessionProgress {
            job_id: self.job_id,
            ordinal: stats.ordinal,
            fetched: stats.fetched,
            accepted: stats.accepted,
            duplicates: stats.duplicates,
            total: session.items().len(),
        }));
    }
}

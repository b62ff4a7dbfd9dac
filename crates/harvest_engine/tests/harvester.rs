use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use harvest_core::{IdOrContentHash, PageCursor, SessionLimits, TerminationReason};
use harvest_engine::{
    DelayPolicy, EngineEvent, FetchError, FetchErrorKind, HarvestConfig, Harvester,
    JsonItemExtractor, PageFetcher, PageResult, ProgressSink, RawPage,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(harvest_logging::initialize_for_tests);
}

enum Step {
    Page(Vec<String>),
    Fail(FetchError),
}

/// Serves a fixed script of pages, then empty pages forever.
struct ScriptedFetcher {
    steps: Vec<Step>,
    calls: AtomicUsize,
    cursors: Mutex<Vec<PageCursor>>,
    cancel_on_call: Option<(usize, CancellationToken)>,
}

impl ScriptedFetcher {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            calls: AtomicUsize::new(0),
            cursors: Mutex::new(Vec::new()),
            cancel_on_call: None,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, cursor: &PageCursor) -> Result<PageResult, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.cursors.lock().unwrap().push(cursor.clone());
        if let Some((at, token)) = &self.cancel_on_call {
            if *at == call {
                token.cancel();
            }
        }

        let ids = match self.steps.get(call - 1) {
            Some(Step::Fail(err)) => return Err(err.clone()),
            Some(Step::Page(ids)) => ids.clone(),
            None => Vec::new(),
        };
        let items: Vec<_> = ids.iter().map(|id| json!({ "id": id, "text": "t" })).collect();
        Ok(PageResult::new(RawPage::json(
            format!("fake://page/{}", cursor.ordinal),
            json!({ "data": { "items": items } }),
        )))
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn ids(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{prefix}-{i}")).collect()
}

fn harvester(fetcher: Arc<ScriptedFetcher>, limits: SessionLimits) -> Harvester {
    harvester_with_delay(fetcher, limits, DelayPolicy::None)
}

fn harvester_with_delay(
    fetcher: Arc<ScriptedFetcher>,
    limits: SessionLimits,
    delay: DelayPolicy,
) -> Harvester {
    let extractor = JsonItemExtractor::new("/data/items", Arc::new(IdOrContentHash::new("id", "text")));
    Harvester::new(fetcher, Arc::new(extractor), HarvestConfig { limits, delay })
}

#[tokio::test]
async fn three_pages_of_ten_then_empty_page_gives_thirty_items() {
    init_logging();
    let fetcher = Arc::new(ScriptedFetcher::new(vec![
        Step::Page(ids("a", 10)),
        Step::Page(ids("b", 10)),
        Step::Page(ids("c", 10)),
        Step::Page(Vec::new()),
    ]));

    let outcome = harvester(fetcher.clone(), SessionLimits::default()).run().await;

    assert_eq!(outcome.reason, TerminationReason::Exhausted);
    assert_eq!(outcome.total, 30);
    assert_eq!(outcome.items.len(), 30);
    assert_eq!(fetcher.calls(), 4);
    assert_eq!(outcome.items[10].key.as_str(), "b-0");
}

#[tokio::test]
async fn repeated_first_item_stalls_within_two_fetches() {
    init_logging();
    let fetcher = Arc::new(ScriptedFetcher::new(vec![
        Step::Page(vec!["x".into(), "y".into()]),
        Step::Page(vec!["x".into(), "z".into()]),
        Step::Page(ids("never", 5)),
    ]));
    let limits = SessionLimits {
        max_pages: Some(1_000),
        ..SessionLimits::default()
    };

    let outcome = harvester(fetcher.clone(), limits).run().await;

    assert_eq!(outcome.reason, TerminationReason::Stall);
    assert!(fetcher.calls() <= 2);
    assert_eq!(outcome.total, 2);
}

#[tokio::test]
async fn fetch_error_returns_partial_results() {
    init_logging();
    let fetcher = Arc::new(ScriptedFetcher::new(vec![
        Step::Page(ids("a", 10)),
        Step::Fail(FetchError::new(FetchErrorKind::RateLimited, "429 Too Many Requests").with_status(429)),
        Step::Page(ids("b", 10)),
    ]));

    let outcome = harvester(fetcher.clone(), SessionLimits::default()).run().await;

    assert_eq!(outcome.reason, TerminationReason::Error);
    assert_eq!(outcome.total, 10);
    assert_eq!(fetcher.calls(), 2);
    let failure = outcome.failure.expect("failure is reported");
    assert_eq!(failure.kind, FetchErrorKind::RateLimited);
    assert_eq!(failure.status, Some(429));
    assert_eq!(failure.message, "429 Too Many Requests");
}

#[tokio::test]
async fn network_and_rate_limit_failures_stay_distinguishable() {
    init_logging();
    let network = Arc::new(ScriptedFetcher::new(vec![Step::Fail(FetchError::new(
        FetchErrorKind::Network,
        "boom",
    ))]));
    let limited = Arc::new(ScriptedFetcher::new(vec![Step::Fail(FetchError::new(
        FetchErrorKind::RateLimited,
        "boom",
    ))]));

    let network = harvester(network, SessionLimits::default()).run().await;
    let limited = harvester(limited, SessionLimits::default()).run().await;

    assert_eq!(network.reason, TerminationReason::Error);
    assert_eq!(limited.reason, TerminationReason::Error);
    assert_eq!(network.failure.map(|f| f.kind), Some(FetchErrorKind::Network));
    assert!(limited.failure.is_some_and(|f| f.is_rate_limited()));
}

#[tokio::test]
async fn zero_item_cap_makes_no_requests() {
    init_logging();
    let fetcher = Arc::new(ScriptedFetcher::new(vec![Step::Page(ids("a", 3))]));
    let limits = SessionLimits {
        max_items: Some(0),
        ..SessionLimits::default()
    };

    let outcome = harvester(fetcher.clone(), limits).run().await;

    assert_eq!(outcome.reason, TerminationReason::MaxItems);
    assert_eq!(outcome.total, 0);
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn page_cap_stops_after_last_allowed_page() {
    init_logging();
    let fetcher = Arc::new(ScriptedFetcher::new(
        (0..5).map(|p| Step::Page(ids(&format!("p{p}"), 3))).collect(),
    ));
    let limits = SessionLimits {
        max_pages: Some(2),
        ..SessionLimits::default()
    };

    let outcome = harvester(fetcher.clone(), limits).run().await;

    assert_eq!(outcome.reason, TerminationReason::MaxPages);
    assert_eq!(outcome.total, 6);
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn cursors_carry_consecutive_ordinals() {
    init_logging();
    let fetcher = Arc::new(ScriptedFetcher::new(vec![
        Step::Page(ids("a", 1)),
        Step::Page(ids("b", 1)),
    ]));

    harvester(fetcher.clone(), SessionLimits::default()).run().await;

    let ordinals: Vec<u32> = fetcher.cursors.lock().unwrap().iter().map(|c| c.ordinal).collect();
    assert_eq!(ordinals, vec![1, 2, 3]);
}

#[tokio::test]
async fn cancellation_keeps_completed_pages() {
    init_logging();
    let cancel = CancellationToken::new();
    let mut fetcher = ScriptedFetcher::new(vec![
        Step::Page(ids("a", 4)),
        Step::Page(ids("b", 4)),
        Step::Page(ids("c", 4)),
    ]);
    fetcher.cancel_on_call = Some((2, cancel.clone()));
    let fetcher = Arc::new(fetcher);

    let outcome = harvester(fetcher.clone(), SessionLimits::default())
        .run_until_cancelled(&cancel)
        .await;

    assert_eq!(outcome.reason, TerminationReason::Cancelled);
    assert_eq!(outcome.total, 8);
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn already_cancelled_session_fetches_nothing() {
    init_logging();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let fetcher = Arc::new(ScriptedFetcher::new(vec![Step::Page(ids("a", 4))]));

    let outcome = harvester(fetcher.clone(), SessionLimits::default())
        .run_until_cancelled(&cancel)
        .await;

    assert_eq!(outcome.reason, TerminationReason::Cancelled);
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn progress_is_reported_after_every_page() {
    init_logging();
    let fetcher = Arc::new(ScriptedFetcher::new(vec![
        Step::Page(vec!["a".into(), "b".into()]),
        Step::Page(vec!["b".into(), "c".into()]),
    ]));
    let sink = Arc::new(RecordingSink::default());

    harvester(fetcher, SessionLimits::default())
        .with_job_id(7)
        .with_progress(sink.clone())
        .run()
        .await;

    let progress: Vec<_> = sink
        .events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event {
            EngineEvent::Progress(p) => Some((p.job_id, p.ordinal, p.accepted, p.duplicates, p.total)),
            _ => None,
        })
        .collect();
    assert_eq!(
        progress,
        vec![(7, 1, 2, 0, 2), (7, 2, 1, 1, 3), (7, 3, 0, 0, 3)]
    );
}

#[tokio::test]
async fn failing_delay_policy_does_not_block_the_session() {
    init_logging();
    let fetcher = Arc::new(ScriptedFetcher::new(vec![
        Step::Page(ids("a", 2)),
        Step::Page(ids("b", 2)),
    ]));
    let delay = DelayPolicy::custom(|ordinal| {
        if ordinal == 2 {
            Err("clock unavailable".to_string())
        } else {
            Ok(Duration::ZERO)
        }
    });
    let session = harvester_with_delay(fetcher.clone(), SessionLimits::default(), delay);

    let outcome = session.run().await;

    assert_eq!(outcome.reason, TerminationReason::Exhausted);
    assert_eq!(outcome.total, 4);
    assert_eq!(fetcher.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn fixed_delay_pauses_between_pages() {
    init_logging();
    let fetcher = Arc::new(ScriptedFetcher::new(vec![
        Step::Page(ids("a", 2)),
        Step::Page(ids("b", 2)),
    ]));
    let session = harvester_with_delay(
        fetcher,
        SessionLimits::default(),
        DelayPolicy::Fixed(Duration::from_secs(2)),
    );

    let started = tokio::time::Instant::now();
    let outcome = session.run().await;

    assert_eq!(outcome.total, 4);
    // Two pauses: before page 2 and before page 3.
    assert!(started.elapsed() >= Duration::from_secs(4));
}

/// Two pages of one item, then empty; remembers the log label seen on each fetch.
struct LabelRecordingFetcher {
    product: &'static str,
    labels: Mutex<Vec<Option<String>>>,
}

#[async_trait::async_trait]
impl PageFetcher for LabelRecordingFetcher {
    async fn fetch(&self, cursor: &PageCursor) -> Result<PageResult, FetchError> {
        tokio::task::yield_now().await;
        self.labels.lock().unwrap().push(harvest_logging::session_label());
        let items = if cursor.ordinal <= 2 {
            vec![json!({ "id": format!("{}-{}", self.product, cursor.ordinal) })]
        } else {
            Vec::new()
        };
        Ok(PageResult::new(RawPage::json(
            "fake://labels",
            json!({ "data": { "items": items } }),
        )))
    }
}

fn labelled_session(fetcher: Arc<LabelRecordingFetcher>) -> Harvester {
    let extractor = JsonItemExtractor::new("/data/items", Arc::new(IdOrContentHash::new("id", "text")));
    Harvester::new(
        fetcher.clone(),
        Arc::new(extractor),
        HarvestConfig {
            limits: SessionLimits::default(),
            delay: DelayPolicy::None,
        },
    )
    .with_label(fetcher.product)
}

#[tokio::test]
async fn joined_sessions_on_one_thread_keep_their_own_labels() {
    init_logging();
    let first = Arc::new(LabelRecordingFetcher {
        product: "P1",
        labels: Mutex::new(Vec::new()),
    });
    let second = Arc::new(LabelRecordingFetcher {
        product: "P2",
        labels: Mutex::new(Vec::new()),
    });
    let first_session = labelled_session(first.clone());
    let second_session = labelled_session(second.clone());

    let (a, b) = tokio::join!(first_session.run(), second_session.run());

    assert_eq!(a.total, 2);
    assert_eq!(b.total, 2);
    let p1 = Some("P1".to_string());
    let p2 = Some("P2".to_string());
    assert_eq!(*first.labels.lock().unwrap(), vec![p1.clone(), p1.clone(), p1]);
    assert_eq!(*second.labels.lock().unwrap(), vec![p2.clone(), p2.clone(), p2]);
    assert_eq!(harvest_logging::session_label(), None);
}

/// Never answers.
struct HangingFetcher;

#[async_trait::async_trait]
impl PageFetcher for HangingFetcher {
    async fn fetch(&self, _cursor: &PageCursor) -> Result<PageResult, FetchError> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn abandoned_session_leaves_the_thread_label_alone() {
    init_logging();
    harvest_logging::set_session_label("orchestrator");
    let extractor = JsonItemExtractor::new("/data/items", Arc::new(IdOrContentHash::new("id", "text")));
    let session = Harvester::new(
        Arc::new(HangingFetcher),
        Arc::new(extractor),
        HarvestConfig::default(),
    )
    .with_label("P1");

    let result = tokio::time::timeout(Duration::from_secs(5), session.run()).await;

    assert!(result.is_err());
    assert_eq!(harvest_logging::session_label().as_deref(), Some("orchestrator"));
    harvest_logging::clear_session_label();
}

use crate::{Effect, HarvestSession, PageCursor, PageFetch, SessionEvent, TerminationReason};

/// Pure update function: applies an event to the session and returns the effects to run.
///
/// Once the session has terminated every event is ignored, so no fetch can follow
/// a `Finish` effect.
pub fn update(mut session: HarvestSession, event: SessionEvent) -> (HarvestSession, Vec<Effect>) {
    if session.is_terminated() {
        return (session, Vec::new());
    }

    let effects = match event {
        SessionEvent::Start => {
            if session.ordinal() != 0 {
                return (session, Vec::new());
            }
            if session.limits().max_pages == Some(0) {
                finish(&mut session, TerminationReason::MaxPages)
            } else if session.cap_reached() {
                finish(&mut session, TerminationReason::MaxItems)
            } else {
                let ordinal = session.advance();
                vec![Effect::Fetch {
                    cursor: PageCursor {
                        ordinal,
                        token: None,
                    },
                }]
            }
        }
        SessionEvent::PageFetched(page) => on_page(&mut session, page),
        SessionEvent::FetchFailed(error) => {
            session.fail(error);
            vec![Effect::Finish {
                reason: TerminationReason::Error,
            }]
        }
        SessionEvent::Cancelled => finish(&mut session, TerminationReason::Cancelled),
    };

    (session, effects)
}

fn on_page(session: &mut HarvestSession, page: PageFetch) -> Vec<Effect> {
    session.record_fetch();
    let PageFetch {
        items,
        next_token,
        is_last,
    } = page;

    // Stall: the remote stopped advancing and served the same leading item again.
    let first_key = items.first().map(|item| item.key.clone());
    let previous_first = session.replace_first_key(first_key.clone());
    if session.limits().detect_stall {
        if let (Some(previous), Some(current)) = (previous_first, first_key) {
            if previous == current {
                session.record_stalled_page(items.len());
                return finish(session, TerminationReason::Stall);
            }
        }
    }

    let stats = session.accumulate(items);
    if session.cap_reached() {
        return finish(session, TerminationReason::MaxItems);
    }

    if stats.accepted == 0 {
        let streak = session.bump_empty_streak();
        if streak >= session.limits().empty_page_threshold {
            return finish(session, TerminationReason::Exhausted);
        }
    } else {
        session.reset_empty_streak();
    }

    if session.limits().max_pages == Some(session.ordinal()) {
        return finish(session, TerminationReason::MaxPages);
    }

    if is_last {
        return finish(session, TerminationReason::Exhausted);
    }

    let ordinal = session.advance();
    vec![
        Effect::Delay {
            before_ordinal: ordinal,
        },
        Effect::Fetch {
            cursor: PageCursor {
                ordinal,
                token: next_token,
            },
        },
    ]
}

fn finish(session: &mut HarvestSession, reason: TerminationReason) -> Vec<Effect> {
    session.terminate(reason);
    vec![Effect::Finish { reason }]
}

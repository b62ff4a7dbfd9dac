use std::sync::Arc;

use harvest_core::{Batch, HarvestOutcome, ItemKey};
use harvest_logging::{harvest_info, harvest_warn};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::Harvester;

/// A harvester could not be built for a key, so nothing was fetched for it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot harvest {key}: {message}")]
pub struct SessionSetupError {
    pub key: ItemKey,
    pub message: String,
}

impl SessionSetupError {
    pub fn new(key: &ItemKey, message: impl Into<String>) -> Self {
        Self {
            key: key.clone(),
            message: message.into(),
        }
    }
}

/// Builds the follow-up harvester for one key of a batch, e.g. the review
/// pages of one product.
pub trait SessionFactory: Send + Sync {
    fn harvester_for(
        &self,
        key: &ItemKey,
        context: Option<&Value>,
    ) -> Result<Harvester, SessionSetupError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyOutcome {
    pub key: ItemKey,
    /// `Err` when the session never started.
    pub outcome: Result<HarvestOutcome, SessionSetupError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub batch_index: usize,
    /// One entry per key that was started, in batch order.
    pub outcomes: Vec<KeyOutcome>,
    /// Keys never started because the batch was cancelled first.
    pub skipped: Vec<ItemKey>,
}

impl BatchReport {
    pub fn total_items(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|entry| entry.outcome.as_ref().ok())
            .map(|outcome| outcome.total)
            .sum()
    }

    /// Keys whose harvester could not be built.
    pub fn setup_failures(&self) -> impl Iterator<Item = &SessionSetupError> {
        self.outcomes
            .iter()
            .filter_map(|entry| entry.outcome.as_ref().err())
    }
}

/// Runs one independent harvest per key of a batch, one after another.
/// Every key gets a fresh session, so deduplication never crosses keys.
pub struct BatchWorker<F: ?Sized> {
    factory: Arc<F>,
}

impl<F: SessionFactory + ?Sized> BatchWorker<F> {
    pub fn new(factory: Arc<F>) -> Self {
        Self { factory }
    }

    pub async fn run(&self, batch: &Batch<ItemKey>, cancel: &CancellationToken) -> BatchReport {
        let mut outcomes = Vec::with_capacity(batch.item_keys.len());
        let mut skipped = Vec::new();

        for key in &batch.item_keys {
            if cancel.is_cancelled() {
                skipped.push(key.clone());
                continue;
            }

            let outcome = match self.factory.harvester_for(key, batch.context.as_ref()) {
                Ok(harvester) => Ok(harvester.run_until_cancelled(cancel).await),
                Err(err) => {
                    harvest_warn!("batch {}: {}", batch.index, err);
                    Err(err)
                }
            };
            outcomes.push(KeyOutcome {
                key: key.clone(),
                outcome,
            });
        }

        let report = BatchReport {
            batch_index: batch.index,
            outcomes,
            skipped,
        };
        harvest_info!(
            "batch {} done: {} keys, {} items, {} skipped",
            report.batch_index,
            report.outcomes.len(),
            report.total_items(),
            report.skipped.len()
        );
        report
    }
}

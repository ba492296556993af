//! Structured logging for report runs
//!
//! Every significant step of a run is logged as a `tracing` event with an
//! `event` field so JSON log output can be filtered by event type.

use crate::collector::Collection;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Structured logger for run events
#[derive(Clone, Debug, Default)]
pub struct RunLogger;

impl RunLogger {
    pub fn new() -> Self {
        Self
    }

    /// Log the start of a subscription
    pub fn log_subscription_started(&self, subscription: &str, index: usize, total: usize) {
        info!(
            event = "subscription_started",
            subscription = %subscription,
            index = index,
            total = total,
            "Processing subscription"
        );
    }

    /// Log a completed subscription
    pub fn log_subscription_completed(&self, subscription: &str, rows: usize, gaps: usize) {
        info!(
            event = "subscription_completed",
            subscription = %subscription,
            rows = rows,
            rows_with_gaps = gaps,
            "Subscription processed"
        );
    }

    /// Log a fatal subscription failure
    pub fn log_subscription_failed(&self, subscription: &str, reason: &str) {
        warn!(
            event = "subscription_failed",
            subscription = %subscription,
            reason = %reason,
            "Subscription skipped"
        );
    }

    /// Log the outcome of a collector
    pub fn log_collection<T>(&self, collector: &str, subscription: &str, collection: &Collection<T>) {
        let samples = collection.samples.len();
        if !collection.is_partial() {
            info!(
                event = "collection_complete",
                collector = %collector,
                subscription = %subscription,
                samples = samples,
                "Collector finished"
            );
            return;
        }
        match &collection.batch_failure {
            Some(reason) => warn!(
                event = "collection_failed",
                collector = %collector,
                subscription = %subscription,
                samples = samples,
                reason = %reason,
                "Collector failed, affected rows are marked"
            ),
            None => warn!(
                event = "collection_partial",
                collector = %collector,
                subscription = %subscription,
                samples = samples,
                failures = collection.failures.len(),
                "Collector returned partial results"
            ),
        }
    }

    /// Log a throttled request that will be retried
    pub fn log_throttled(&self, path: &str, attempt: u32, delay: Duration) {
        warn!(
            event = "request_throttled",
            path = %path,
            attempt = attempt,
            retry_in_ms = delay.as_millis() as u64,
            "Rate limited, retrying"
        );
    }

    /// Log a price cache lookup
    pub fn log_price_lookup(&self, key: &str, hit: bool) {
        debug!(
            event = "price_lookup",
            key = %key,
            cache_hit = hit,
            "Price quote lookup"
        );
    }

    /// Log a failed price resolution
    pub fn log_price_failure(&self, key: &str, reason: &str) {
        warn!(
            event = "price_lookup_failed",
            key = %key,
            reason = %reason,
            "Could not resolve price quote"
        );
    }

    /// Log the end of a run
    pub fn log_run_completed(&self, succeeded: usize, total: usize, rows: usize) {
        if succeeded == total {
            info!(
                event = "run_completed",
                succeeded = succeeded,
                total = total,
                rows = rows,
                "All subscriptions processed"
            );
        } else {
            warn!(
                event = "run_completed",
                succeeded = succeeded,
                total = total,
                rows = rows,
                "Some subscriptions failed"
            );
        }
    }
}

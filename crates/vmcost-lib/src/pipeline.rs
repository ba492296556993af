//! Per-subscription orchestration
//!
//! Subscriptions are processed one after another. Within a subscription the
//! inventory is listed first, then cost, utilization and pricing are
//! collected before the rows are aggregated. A fatal error ends only the
//! current subscription.

use crate::aggregate::aggregate;
use crate::arm::ArmClient;
use crate::collector::{
    CostCollector, InventoryCollector, UtilizationCollector, DEFAULT_UTILIZATION_WINDOW_DAYS,
};
use crate::error::SubscriptionError;
use crate::models::{AggregatedVmRow, DataStatus};
use crate::observability::RunLogger;
use crate::pricing::{PriceCache, PriceSource};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Rows of one successfully processed subscription
#[derive(Debug, Clone)]
pub struct SubscriptionReport {
    pub subscription_id: String,
    pub rows: Vec<AggregatedVmRow>,
}

impl SubscriptionReport {
    /// Rows where at least one source failed or was incomplete
    pub fn rows_with_gaps(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| {
                [r.cost_status, r.utilization_status, r.pricing_status]
                    .iter()
                    .any(|s| matches!(s, DataStatus::Failed | DataStatus::Partial))
            })
            .count()
    }
}

/// A subscription that could not be processed
#[derive(Debug, Clone)]
pub struct SubscriptionFailure {
    pub subscription_id: String,
    pub reason: String,
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub reports: Vec<SubscriptionReport>,
    pub failures: Vec<SubscriptionFailure>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.reports.len()
    }

    pub fn total(&self) -> usize {
        self.reports.len() + self.failures.len()
    }

    /// Rows of every successful subscription, in processing order
    pub fn all_rows(&self) -> Vec<&AggregatedVmRow> {
        self.reports.iter().flat_map(|r| r.rows.iter()).collect()
    }

    /// "N of M subscriptions succeeded"
    pub fn tally(&self) -> String {
        format!(
            "{} of {} subscriptions succeeded",
            self.succeeded(),
            self.total()
        )
    }
}

/// Parse and normalize a subscription id
pub fn validate_subscription_id(raw: &str) -> Result<String, SubscriptionError> {
    let trimmed = raw.trim();
    Uuid::parse_str(trimmed)
        .map(|id| id.hyphenated().to_string())
        .map_err(|_| SubscriptionError::InvalidId(trimmed.to_string()))
}

/// Split a comma or whitespace separated list of subscription ids
pub fn parse_subscription_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Progress of a run, reported as each subscription starts and ends
#[derive(Debug)]
pub enum Progress<'a> {
    Started {
        subscription_id: &'a str,
        index: usize,
        total: usize,
    },
    Completed(&'a SubscriptionReport),
    Failed(&'a SubscriptionFailure),
}

/// Runs the collectors and the aggregation for each subscription
pub struct Pipeline {
    arm: ArmClient,
    prices: Box<dyn PriceSource>,
    utilization_window_days: i64,
    logger: RunLogger,
}

impl Pipeline {
    pub fn new(arm: ArmClient, prices: Box<dyn PriceSource>) -> Self {
        Self {
            arm,
            prices,
            utilization_window_days: DEFAULT_UTILIZATION_WINDOW_DAYS,
            logger: RunLogger::new(),
        }
    }

    pub fn with_utilization_window(mut self, days: i64) -> Self {
        self.utilization_window_days = days;
        self
    }

    /// Process one subscription end to end
    pub async fn run_subscription(
        &self,
        raw_id: &str,
        cache: &mut PriceCache,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionReport, SubscriptionError> {
        let subscription_id = validate_subscription_id(raw_id)?;

        let inventory = InventoryCollector::new(&self.arm)
            .collect(&subscription_id)
            .await?;

        let costs = CostCollector::new(&self.arm)
            .collect(&subscription_id, &inventory, now)
            .await;

        let utilization = UtilizationCollector::with_window(&self.arm, self.utilization_window_days)
            .collect(&subscription_id, &inventory, now)
            .await;

        let keys: BTreeSet<_> = inventory.iter().map(|vm| vm.price_key()).collect();
        for key in &keys {
            cache.quote(self.prices.as_ref(), key).await;
        }

        let rows = aggregate(&inventory, &costs, &utilization, cache, now);
        Ok(SubscriptionReport {
            subscription_id,
            rows,
        })
    }

    /// Process every subscription; failures are recorded and skipped
    pub async fn run(&self, ids: &[String], cache: &mut PriceCache, now: DateTime<Utc>) -> RunSummary {
        self.run_with_progress(ids, cache, now, |_| {}).await
    }

    /// Like [`Pipeline::run`], calling `on_progress` as each subscription
    /// starts and ends
    pub async fn run_with_progress<F>(
        &self,
        ids: &[String],
        cache: &mut PriceCache,
        now: DateTime<Utc>,
        mut on_progress: F,
    ) -> RunSummary
    where
        F: FnMut(Progress<'_>),
    {
        let mut summary = RunSummary::default();
        let total = ids.len();

        for (idx, raw_id) in ids.iter().enumerate() {
            self.logger.log_subscription_started(raw_id, idx + 1, total);
            on_progress(Progress::Started {
                subscription_id: raw_id.trim(),
                index: idx + 1,
                total,
            });

            match self.run_subscription(raw_id, cache, now).await {
                Ok(report) => {
                    self.logger.log_subscription_completed(
                        &report.subscription_id,
                        report.rows.len(),
                        report.rows_with_gaps(),
                    );
                    on_progress(Progress::Completed(&report));
                    summary.reports.push(report);
                }
                Err(e) => {
                    let reason = e.to_string();
                    self.logger.log_subscription_failed(raw_id, &reason);
                    let failure = SubscriptionFailure {
                        subscription_id: raw_id.trim().to_string(),
                        reason,
                    };
                    on_progress(Progress::Failed(&failure));
                    summary.failures.push(failure);
                }
            }
        }

        self.logger.log_run_completed(
            summary.succeeded(),
            summary.total(),
            summary.all_rows().len(),
        );
        summary
    }
}

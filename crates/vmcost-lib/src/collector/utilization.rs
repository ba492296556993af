//! CPU utilization collection from Azure Monitor
//!
//! Requests hourly `Percentage CPU` averages and maxima for each VM. One
//! failing VM never stops the others.

use super::Collection;
use crate::arm::ArmClient;
use crate::models::{UtilizationSample, VmRecord};
use crate::observability::RunLogger;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Deserialize;
use tracing::{debug, info};

const METRICS_API_VERSION: &str = "2023-10-01";
const CPU_METRIC: &str = "Percentage CPU";

/// Default length of the utilization window
pub const DEFAULT_UTILIZATION_WINDOW_DAYS: i64 = 30;

/// Azure Monitor metrics response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsResponse {
    #[serde(default)]
    pub value: Vec<Metric>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Metric {
    #[serde(default)]
    pub timeseries: Vec<TimeSeries>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeSeries {
    #[serde(default)]
    pub data: Vec<MetricValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricValue {
    #[serde(default)]
    pub time_stamp: Option<String>,
    #[serde(default)]
    pub average: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

/// Reduce a metrics response to average and peak CPU.
///
/// Returns `None` when no hourly average was reported, which happens for
/// deallocated VMs. Peak falls back to the average when no maxima exist.
pub fn normalize_metrics(resource_id: &str, response: &MetricsResponse) -> Option<UtilizationSample> {
    let points: Vec<&MetricValue> = response
        .value
        .iter()
        .flat_map(|m| m.timeseries.iter())
        .flat_map(|t| t.data.iter())
        .collect();

    let averages: Vec<f64> = points.iter().filter_map(|p| p.average).collect();
    if averages.is_empty() {
        return None;
    }

    let avg_cpu = averages.iter().sum::<f64>() / averages.len() as f64;
    let peak_cpu = points
        .iter()
        .filter_map(|p| p.maximum)
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
        .unwrap_or(avg_cpu);

    Some(UtilizationSample {
        resource_id: resource_id.to_string(),
        avg_cpu,
        peak_cpu,
        sample_count: averages.len(),
    })
}

/// Queries CPU metrics per VM
pub struct UtilizationCollector<'a> {
    arm: &'a ArmClient,
    window_days: i64,
    logger: RunLogger,
}

impl<'a> UtilizationCollector<'a> {
    pub fn new(arm: &'a ArmClient) -> Self {
        Self::with_window(arm, DEFAULT_UTILIZATION_WINDOW_DAYS)
    }

    pub fn with_window(arm: &'a ArmClient, window_days: i64) -> Self {
        Self {
            arm,
            window_days,
            logger: RunLogger::new(),
        }
    }

    /// Collect CPU samples for every VM in the inventory
    pub async fn collect(
        &self,
        subscription_id: &str,
        inventory: &[VmRecord],
        now: DateTime<Utc>,
    ) -> Collection<UtilizationSample> {
        let start = now - Duration::days(self.window_days);
        let timespan = format!(
            "{}/{}",
            start.to_rfc3339_opts(SecondsFormat::Secs, true),
            now.to_rfc3339_opts(SecondsFormat::Secs, true)
        );

        let mut collection = Collection::new();
        let total = inventory.len();

        for (idx, vm) in inventory.iter().enumerate() {
            if (idx + 1) % 10 == 0 {
                info!(subscription = %subscription_id, done = idx + 1, total = total, "Utilization progress");
            }

            let key = vm.join_key();
            let path = format!("{}/providers/Microsoft.Insights/metrics", vm.id);
            let mut url = match self.arm.url(&path) {
                Ok(url) => url,
                Err(e) => {
                    collection.record_failure(key, e.to_string());
                    continue;
                }
            };
            url.query_pairs_mut()
                .append_pair("api-version", METRICS_API_VERSION)
                .append_pair("metricnames", CPU_METRIC)
                .append_pair("timespan", &timespan)
                .append_pair("interval", "PT1H")
                .append_pair("aggregation", "Average,Maximum");

            match self.arm.get::<MetricsResponse>(url).await {
                Ok(response) => match normalize_metrics(&key, &response) {
                    Some(sample) => collection.insert(key, sample),
                    None => debug!(vm = %vm.name, "No CPU datapoints"),
                },
                Err(e) => {
                    debug!(vm = %vm.name, error = %e, "CPU metrics request failed");
                    collection.record_failure(key, e.to_string());
                }
            }
        }

        self.logger.log_collection("utilization", subscription_id, &collection);
        collection
    }
}

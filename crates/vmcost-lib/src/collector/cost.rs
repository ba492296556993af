//! Actual cost collection from Cost Management
//!
//! Issues one daily-granularity query per subscription grouped by resource
//! id, then folds the rows into one [`CostSample`] per VM.

use super::Collection;
use crate::arm::ArmClient;
use crate::models::{resource_key, CostSample, VmRecord};
use crate::observability::RunLogger;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use tracing::debug;

const COST_API_VERSION: &str = "2023-11-01";

/// Length of the cost window
pub const COST_WINDOW_DAYS: i64 = 90;

/// Upper bound on `nextLink` pages followed per query
const MAX_PAGES: usize = 100;

const COST_COLUMNS: &[&str] = &["cost", "pretaxcost", "totalcost", "costusd"];
const RESOURCE_COLUMNS: &[&str] = &["resourceid"];
const DATE_COLUMNS: &[&str] = &["usagedate", "date"];
const CURRENCY_COLUMNS: &[&str] = &["currency", "billingcurrency"];

/// Cost Management query response
#[derive(Debug, Clone, Deserialize)]
pub struct CostQueryResponse {
    #[serde(default)]
    pub properties: CostQueryProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostQueryProperties {
    #[serde(default)]
    pub next_link: Option<String>,
    #[serde(default)]
    pub columns: Vec<CostColumn>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CostColumn {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

fn column_index(columns: &[CostColumn], candidates: &[&str]) -> Option<usize> {
    columns
        .iter()
        .position(|c| candidates.contains(&c.name.to_ascii_lowercase().as_str()))
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Default)]
struct Accumulator {
    total: f64,
    currency: Option<String>,
    active_days: HashSet<String>,
    active_rows: u32,
}

/// Fold query pages into per-resource cost samples.
///
/// Columns are located by name. Rows with an unreadable cost or resource id
/// are skipped.
pub fn normalize_rows(
    pages: &[CostQueryProperties],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    complete: bool,
) -> Result<HashMap<String, CostSample>, String> {
    let mut totals: HashMap<String, Accumulator> = HashMap::new();

    for page in pages {
        if page.rows.is_empty() {
            continue;
        }
        let cost_idx = column_index(&page.columns, COST_COLUMNS)
            .ok_or_else(|| "cost column missing from query result".to_string())?;
        let resource_idx = column_index(&page.columns, RESOURCE_COLUMNS)
            .ok_or_else(|| "ResourceId column missing from query result".to_string())?;
        let date_idx = column_index(&page.columns, DATE_COLUMNS);
        let currency_idx = column_index(&page.columns, CURRENCY_COLUMNS);

        for row in &page.rows {
            let Some(cost) = row.get(cost_idx).and_then(as_f64) else {
                continue;
            };
            let Some(resource_id) = row.get(resource_idx).and_then(|v| v.as_str()) else {
                continue;
            };

            let entry = totals.entry(resource_key(resource_id)).or_default();
            entry.total += cost;
            if entry.currency.is_none() {
                entry.currency = currency_idx
                    .and_then(|i| row.get(i))
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
            }
            if cost > 0.0 {
                match date_idx.and_then(|i| row.get(i)) {
                    Some(date) => {
                        entry.active_days.insert(date.to_string());
                    }
                    None => entry.active_rows += 1,
                }
            }
        }
    }

    Ok(totals
        .into_iter()
        .map(|(key, acc)| {
            let active_days = if acc.active_days.is_empty() {
                acc.active_rows
            } else {
                acc.active_days.len() as u32
            };
            let sample = CostSample {
                resource_id: key.clone(),
                total_cost: acc.total,
                currency: acc.currency.unwrap_or_else(|| "USD".to_string()),
                window_start,
                window_end,
                active_days,
                complete,
            };
            (key, sample)
        })
        .collect())
}

/// Queries 90-day actual cost per VM
pub struct CostCollector<'a> {
    arm: &'a ArmClient,
    logger: RunLogger,
}

impl<'a> CostCollector<'a> {
    pub fn new(arm: &'a ArmClient) -> Self {
        Self {
            arm,
            logger: RunLogger::new(),
        }
    }

    fn query_body(window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Value {
        json!({
            "type": "ActualCost",
            "timeframe": "Custom",
            "timePeriod": {
                "from": window_start.to_rfc3339(),
                "to": window_end.to_rfc3339()
            },
            "dataset": {
                "granularity": "Daily",
                "aggregation": {
                    "totalCost": {"name": "Cost", "function": "Sum"}
                },
                "grouping": [
                    {"type": "Dimension", "name": "ResourceId"}
                ],
                "filter": {
                    "dimensions": {
                        "name": "ResourceType",
                        "operator": "In",
                        "values": ["microsoft.compute/virtualmachines"]
                    }
                }
            }
        })
    }

    /// Collect cost samples for the inventory of one subscription.
    ///
    /// Only resources present in `inventory` are kept. A failed query marks
    /// every VM as failed instead of reporting zero cost.
    pub async fn collect(
        &self,
        subscription_id: &str,
        inventory: &[VmRecord],
        now: DateTime<Utc>,
    ) -> Collection<CostSample> {
        let window_start = now - Duration::days(COST_WINDOW_DAYS);
        let body = Self::query_body(window_start, now);
        let path = format!(
            "/subscriptions/{}/providers/Microsoft.CostManagement/query",
            subscription_id
        );

        let mut url = match self.arm.url(&path) {
            Ok(url) => url,
            Err(e) => return Collection::failed(e.to_string()),
        };
        url.query_pairs_mut()
            .append_pair("api-version", COST_API_VERSION);

        let mut pages = Vec::new();
        let mut page_error = None;
        let mut next = Some(url);

        while let Some(page_url) = next.take() {
            if pages.len() >= MAX_PAGES {
                page_error = Some(format!("cost query exceeded {} pages", MAX_PAGES));
                break;
            }
            match self.arm.post::<CostQueryResponse, _>(page_url, &body).await {
                Ok(response) => {
                    let link = response.properties.next_link.clone();
                    pages.push(response.properties);
                    if let Some(link) = link.filter(|l| !l.is_empty()) {
                        match self.arm.url(&link) {
                            Ok(url) => next = Some(url),
                            Err(e) => page_error = Some(e.to_string()),
                        }
                    }
                }
                Err(e) => {
                    page_error = Some(e.to_string());
                }
            }
        }

        if pages.is_empty() {
            let reason = page_error.unwrap_or_else(|| "cost query returned nothing".to_string());
            let collection = Collection::failed(reason);
            self.logger.log_collection("cost", subscription_id, &collection);
            return collection;
        }

        let complete = page_error.is_none();
        let mut samples = match normalize_rows(&pages, window_start, now, complete) {
            Ok(samples) => samples,
            Err(reason) => {
                let collection = Collection::failed(reason);
                self.logger.log_collection("cost", subscription_id, &collection);
                return collection;
            }
        };

        let mut collection = Collection::new();
        for vm in inventory {
            let key = vm.join_key();
            if let Some(sample) = samples.remove(&key) {
                collection.insert(key, sample);
            }
        }
        debug!(
            subscription = %subscription_id,
            unmatched = samples.len(),
            "Cost rows without a matching VM ignored"
        );

        if let Some(reason) = page_error {
            collection.batch_failure = Some(format!("cost data incomplete: {}", reason));
        }

        self.logger.log_collection("cost", subscription_id, &collection);
        collection
    }
}
